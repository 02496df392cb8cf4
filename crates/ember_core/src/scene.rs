//! The scene: owner of primitives, materials, lights and the camera.
//!
//! Built once, immutable during rendering. Also provides the brute-force
//! intersection queries that double as the oracle for accelerator tests.

use ember_math::{Aabb, Ray, Vec3};
use thiserror::Error;

use crate::camera::PerspectiveCamera;
use crate::light::Light;
use crate::material::{Material, MaterialId};
use crate::primitive::{Intersection, Primitive};
use crate::shape::Shape;
use crate::spectrum::Spectrum;

/// Errors raised while loading or validating a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a scene stream (bad magic)")]
    BadMagic,

    #[error("unsupported scene stream version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown closure tag {0}")]
    UnknownClosure(u32),

    #[error("unknown light tag {0}")]
    UnknownLight(u32),

    #[error("unknown shape tag {0}")]
    UnknownShape(u32),

    #[error("unknown integrator tag {0}")]
    UnknownIntegrator(u32),

    #[error("scene has no camera")]
    MissingCamera,

    #[error("scene has no primitives")]
    EmptyScene,

    #[error("mesh '{0}' has degenerate faces")]
    DegenerateMesh(String),

    #[error("light {0} references primitive {1} which does not exist")]
    DanglingLight(u32, u32),

    #[error("primitive {0} references material {1} which does not exist")]
    DanglingMaterial(u32, u32),
}

pub struct Scene {
    pub camera: PerspectiveCamera,
    pub primitives: Vec<Primitive>,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
}

impl Scene {
    pub fn new(camera: PerspectiveCamera) -> Self {
        Self {
            camera,
            primitives: Vec::new(),
            materials: vec![Material::default_grey()],
            lights: Vec::new(),
        }
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        (self.materials.len() - 1) as MaterialId
    }

    pub fn add_primitive(&mut self, primitive: Primitive) -> u32 {
        self.primitives.push(primitive);
        (self.primitives.len() - 1) as u32
    }

    /// Add a non-area light.
    pub fn add_light(&mut self, light: Light) -> u32 {
        debug_assert!(!matches!(light, Light::Area { .. }));
        self.lights.push(light);
        (self.lights.len() - 1) as u32
    }

    /// Add an emissive primitive and the area light wrapping it, wiring the
    /// back-references both ways.
    pub fn add_area_light(
        &mut self,
        shape: Shape,
        material: MaterialId,
        radiance: Spectrum,
        two_sided: bool,
    ) -> u32 {
        let prim_index = self.primitives.len() as u32;
        let light_index = self.lights.len() as u32;
        self.primitives
            .push(Primitive::new(shape.clone(), material).with_light(light_index));
        self.lights.push(Light::Area {
            primitive: prim_index,
            shape,
            radiance,
            two_sided,
        });
        light_index
    }

    pub fn material(&self, id: MaterialId) -> &Material {
        self.materials
            .get(id as usize)
            .unwrap_or(&self.materials[0])
    }

    /// The area light attached to an intersected primitive, if any.
    pub fn light_at(&self, isect: &Intersection) -> Option<&Light> {
        let prim = self.primitives.get(isect.primitive? as usize)?;
        self.lights.get(prim.light? as usize)
    }

    /// Sum of environment radiance for a ray that left the scene.
    pub fn background(&self, ray: &Ray) -> Spectrum {
        self.lights.iter().map(|l| l.le(ray)).sum()
    }

    /// World bounds over all primitives.
    pub fn world_bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for p in &self.primitives {
            bounds.union(&p.shape.bounds());
        }
        bounds
    }

    /// Bounding sphere of the world, for lights that need scene extent.
    pub fn world_sphere(&self) -> (Vec3, f32) {
        let bounds = self.world_bounds();
        if bounds.x.min > bounds.x.max {
            return (Vec3::ZERO, 1.0);
        }
        let center = bounds.centroid();
        let radius = (bounds.max() - center).length().max(1e-3);
        (center, radius)
    }

    /// Brute-force nearest hit over every primitive. This is the oracle the
    /// accelerators are tested against.
    pub fn intersect(&self, ray: &Ray) -> Intersection {
        let mut isect = Intersection::default();
        for (i, prim) in self.primitives.iter().enumerate() {
            if prim.shape.intersect(ray, &mut isect) {
                isect.primitive = Some(i as u32);
            }
        }
        isect
    }

    /// Brute-force occlusion test.
    pub fn is_occluded(&self, ray: &Ray) -> bool {
        self.primitives.iter().any(|p| p.shape.intersect_p(ray))
    }

    /// Structural validation run after loading.
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.primitives.is_empty() {
            return Err(SceneError::EmptyScene);
        }
        for (i, prim) in self.primitives.iter().enumerate() {
            if prim.material as usize >= self.materials.len() {
                return Err(SceneError::DanglingMaterial(i as u32, prim.material));
            }
            if let Shape::Triangle { mesh, .. } = &prim.shape {
                if mesh.has_degenerate_faces() {
                    return Err(SceneError::DegenerateMesh(format!("primitive {i}")));
                }
            }
        }
        for (i, light) in self.lights.iter().enumerate() {
            if let Light::Area { primitive, .. } = light {
                if *primitive as usize >= self.primitives.len() {
                    return Err(SceneError::DanglingLight(i as u32, *primitive));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn test_camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            FRAC_PI_2,
            64,
            64,
        )
    }

    #[test]
    fn test_scene_brute_force_nearest() {
        let mut scene = Scene::new(test_camera());
        for z in [0.0f32, -2.0, 2.0] {
            scene.add_primitive(Primitive::new(
                Shape::Sphere {
                    center: Vec3::new(0.0, 0.0, z),
                    radius: 0.5,
                },
                0,
            ));
        }
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        let isect = scene.intersect(&ray);
        assert!(isect.is_hit());
        // Nearest sphere surface is at z = 2.5.
        assert!((isect.t - 2.5).abs() < 1e-4);
        assert_eq!(isect.primitive, Some(2));
        assert!(scene.is_occluded(&ray));
    }

    #[test]
    fn test_scene_validation() {
        let scene = Scene::new(test_camera());
        assert!(matches!(scene.validate(), Err(SceneError::EmptyScene)));

        let mut scene = Scene::new(test_camera());
        scene.add_primitive(Primitive::new(
            Shape::Sphere {
                center: Vec3::ZERO,
                radius: 1.0,
            },
            99,
        ));
        assert!(matches!(
            scene.validate(),
            Err(SceneError::DanglingMaterial(0, 99))
        ));
    }

    #[test]
    fn test_area_light_back_reference() {
        let mut scene = Scene::new(test_camera());
        scene.add_area_light(
            Shape::Square {
                center: Vec3::new(0.0, 3.0, 0.0),
                eu: Vec3::X,
                ev: Vec3::Z,
            },
            0,
            Spectrum::ONE,
            false,
        );
        assert!(scene.validate().is_ok());

        let ray = Ray::spawn(Vec3::ZERO, Vec3::Y);
        let isect = scene.intersect(&ray);
        assert!(isect.is_hit());
        assert!(scene.light_at(&isect).is_some());
    }
}
