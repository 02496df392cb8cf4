//! Spatial accelerators.
//!
//! `WideBvh` is the production structure, instantiated 4-wide (`Qbvh`) or
//! 8-wide (`Obvh`); `LinearList` is the brute-force oracle the property
//! tests compare against.

use ember_core::{BssrdfIntersections, Intersection, MaterialId, Scene};
use ember_math::simd::{
    Bbox4, Bbox8, LaneHit, Line4, Line8, RayPack4, RayPack8, Tri4, Tri8,
};
use ember_math::{Aabb, Ray, Vec3};

mod wide;

pub use wide::{Obvh, Qbvh, WideBvh};

/// Ray queries every accelerator answers.
///
/// Accelerators hold primitive indices, never references; the scene is
/// passed per query.
pub trait Accelerator: Send + Sync {
    /// Nearest hit along the ray, or a default record when nothing is hit.
    fn intersect(&self, scene: &Scene, ray: &Ray) -> Intersection;

    /// True when anything at all blocks the ray.
    fn is_occluded(&self, scene: &Scene, ray: &Ray) -> bool;

    /// Collect hits on primitives with the given material along the ray,
    /// for subsurface probes.
    fn intersect_multi(
        &self,
        scene: &Scene,
        ray: &Ray,
        material: MaterialId,
        out: &mut BssrdfIntersections,
    );
}

/// Brute force over every primitive. The oracle for accelerator tests and
/// the sane default for tiny scenes.
#[derive(Default)]
pub struct LinearList;

impl Accelerator for LinearList {
    fn intersect(&self, scene: &Scene, ray: &Ray) -> Intersection {
        scene.intersect(ray)
    }

    fn is_occluded(&self, scene: &Scene, ray: &Ray) -> bool {
        scene.is_occluded(ray)
    }

    fn intersect_multi(
        &self,
        scene: &Scene,
        ray: &Ray,
        material: MaterialId,
        out: &mut BssrdfIntersections,
    ) {
        for (i, prim) in scene.primitives.iter().enumerate() {
            if prim.material != material {
                continue;
            }
            let mut isect = Intersection::default();
            if prim.shape.intersect(ray, &mut isect) && isect.t < out.max_t() {
                isect.primitive = Some(i as u32);
                out.add(isect);
            }
        }
    }
}

/// The SIMD width bundle a `WideBvh` is instantiated over.
///
/// Fixed-size scratch arrays are dimensioned for the widest pack; only the
/// first `WIDTH` lanes are meaningful.
pub trait LanePack: Send + Sync + 'static {
    const WIDTH: usize;

    type Boxes: Send + Sync + Clone;
    type Tris: Send + Sync + Clone;
    type Lines: Send + Sync + Clone;
    type RayPack;

    fn make_ray(ray: &Ray) -> Self::RayPack;

    fn pack_boxes(boxes: &[Aabb]) -> Self::Boxes;
    fn intersect_boxes(boxes: &Self::Boxes, ray: &Self::RayPack, t_max: f32) -> (u32, [f32; 8]);

    fn pack_tris(tris: &[(Vec3, Vec3, Vec3, u32)]) -> Self::Tris;
    fn intersect_tris(tris: &Self::Tris, ray: &Self::RayPack, t_max: f32) -> Option<LaneHit>;
    fn tris_any(tris: &Self::Tris, ray: &Self::RayPack, t_max: f32) -> bool;
    fn tris_each(
        tris: &Self::Tris,
        ray: &Self::RayPack,
        t_max: f32,
        visit: &mut dyn FnMut(LaneHit),
    );

    fn pack_lines(lines: &[(Vec3, Vec3, f32, f32, u32)]) -> Self::Lines;
    fn intersect_lines(lines: &Self::Lines, ray: &Self::RayPack, t_max: f32) -> Option<LaneHit>;
    fn lines_any(lines: &Self::Lines, ray: &Self::RayPack, t_max: f32) -> bool;
}

macro_rules! lane_pack {
    ($name:ident, $width:literal, $ray:ident, $bbox:ident, $tri:ident, $line:ident) => {
        pub struct $name;

        impl LanePack for $name {
            const WIDTH: usize = $width;

            type Boxes = $bbox;
            type Tris = $tri;
            type Lines = $line;
            type RayPack = $ray;

            fn make_ray(ray: &Ray) -> Self::RayPack {
                $ray::new(ray)
            }

            fn pack_boxes(boxes: &[Aabb]) -> Self::Boxes {
                $bbox::from_boxes(boxes)
            }

            fn intersect_boxes(
                boxes: &Self::Boxes,
                ray: &Self::RayPack,
                t_max: f32,
            ) -> (u32, [f32; 8]) {
                let (mask, near) = boxes.intersect(ray, t_max);
                let mut out = [f32::INFINITY; 8];
                out[..$width].copy_from_slice(&near);
                (mask, out)
            }

            fn pack_tris(tris: &[(Vec3, Vec3, Vec3, u32)]) -> Self::Tris {
                $tri::pack(tris)
            }

            fn intersect_tris(
                tris: &Self::Tris,
                ray: &Self::RayPack,
                t_max: f32,
            ) -> Option<LaneHit> {
                tris.intersect(ray, t_max)
            }

            fn tris_any(tris: &Self::Tris, ray: &Self::RayPack, t_max: f32) -> bool {
                tris.intersect_any(ray, t_max)
            }

            fn tris_each(
                tris: &Self::Tris,
                ray: &Self::RayPack,
                t_max: f32,
                visit: &mut dyn FnMut(LaneHit),
            ) {
                tris.intersect_each(ray, t_max, visit)
            }

            fn pack_lines(lines: &[(Vec3, Vec3, f32, f32, u32)]) -> Self::Lines {
                $line::pack(lines)
            }

            fn intersect_lines(
                lines: &Self::Lines,
                ray: &Self::RayPack,
                t_max: f32,
            ) -> Option<LaneHit> {
                lines.intersect(ray, t_max)
            }

            fn lines_any(lines: &Self::Lines, ray: &Self::RayPack, t_max: f32) -> bool {
                lines.intersect_any(ray, t_max)
            }
        }
    };
}

lane_pack!(Pack4, 4, RayPack4, Bbox4, Tri4, Line4);
lane_pack!(Pack8, 8, RayPack8, Bbox8, Tri8, Line8);
