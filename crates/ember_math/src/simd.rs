//! Lane-packed geometry for the wide BVH.
//!
//! Child bounding boxes, triangle batches and line batches are rearranged
//! into structure-of-arrays form at build time so traversal tests one ray
//! against K boxes or K primitives per instruction, without gathers. The
//! 4-wide types back the QBVH, the 8-wide types the OBVH; both are generated
//! from the same source by `lane_pack_impl!`.
//!
//! Every pack carries its real lane count and clips hit masks to it.
//! Zeroed triangle/line padding also fails the determinant or radius test
//! on its own; box padding cannot self-reject (an all-infinite slab still
//! passes under an unbounded `t_max`), so the count mask is load-bearing
//! there.

use wide::{f32x4, f32x8, CmpGe, CmpGt, CmpLe, CmpLt};

use crate::{Aabb, Ray, Vec3};

/// Index value marking a padding lane in a primitive batch.
pub const INVALID_PRIM: u32 = u32::MAX;

/// A single lane hit extracted from a packed primitive test.
#[derive(Debug, Copy, Clone)]
pub struct LaneHit {
    /// Primitive index the lane was packed from.
    pub prim: u32,
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

macro_rules! lane_pack_impl {
    ($width:literal, $fx:ident, $ray:ident, $bbox:ident, $tri:ident, $line:ident) => {
        /// One ray replicated across all lanes.
        #[derive(Debug, Copy, Clone)]
        pub struct $ray {
            ox: $fx,
            oy: $fx,
            oz: $fx,
            dx: $fx,
            dy: $fx,
            dz: $fx,
            inv_dx: $fx,
            inv_dy: $fx,
            inv_dz: $fx,
            t_min: $fx,
        }

        impl $ray {
            pub fn new(ray: &Ray) -> Self {
                Self {
                    ox: $fx::splat(ray.origin.x),
                    oy: $fx::splat(ray.origin.y),
                    oz: $fx::splat(ray.origin.z),
                    dx: $fx::splat(ray.direction.x),
                    dy: $fx::splat(ray.direction.y),
                    dz: $fx::splat(ray.direction.z),
                    inv_dx: $fx::splat(ray.inv_direction.x),
                    inv_dy: $fx::splat(ray.inv_direction.y),
                    inv_dz: $fx::splat(ray.inv_direction.z),
                    t_min: $fx::splat(ray.t_min),
                }
            }
        }

        /// Child bounding boxes of one interior node in SoA layout.
        ///
        /// Like the primitive batches, the pack carries how many lanes are
        /// real. Padding lanes cannot be made self-rejecting here: the
        /// min/max slab ordering repairs an inverted empty box, and an
        /// all-infinite box still satisfies `t_enter <= t_exit` when the
        /// query runs with an unbounded `t_max`. The hit mask is therefore
        /// clipped to the packed count.
        #[derive(Debug, Copy, Clone)]
        pub struct $bbox {
            min_x: $fx,
            min_y: $fx,
            min_z: $fx,
            max_x: $fx,
            max_y: $fx,
            max_z: $fx,
            count: usize,
        }

        impl $bbox {
            /// Pack up to `$width` boxes; excess slots are dead lanes.
            pub fn from_boxes(boxes: &[Aabb]) -> Self {
                let mut min = [[f32::INFINITY; $width]; 3];
                let mut max = [[f32::INFINITY; $width]; 3];
                let count = boxes.len().min($width);
                for (i, b) in boxes.iter().take($width).enumerate() {
                    min[0][i] = b.x.min;
                    min[1][i] = b.y.min;
                    min[2][i] = b.z.min;
                    max[0][i] = b.x.max;
                    max[1][i] = b.y.max;
                    max[2][i] = b.z.max;
                }
                Self {
                    min_x: $fx::from(min[0]),
                    min_y: $fx::from(min[1]),
                    min_z: $fx::from(min[2]),
                    max_x: $fx::from(max[0]),
                    max_y: $fx::from(max[1]),
                    max_z: $fx::from(max[2]),
                    count,
                }
            }

            pub fn len(&self) -> usize {
                self.count
            }

            pub fn is_empty(&self) -> bool {
                self.count == 0
            }

            /// Slab test against all lanes at once.
            ///
            /// Bit `i` of the returned mask is set iff box `i` is hit inside
            /// `[ray.t_min, t_max]`; the matching entry parameter (clamped to
            /// zero for inside-origin rays) is in lane `i` of the array.
            /// Padding lanes never set their bit.
            #[inline]
            pub fn intersect(&self, ray: &$ray, t_max: f32) -> (u32, [f32; $width]) {
                let tx0 = (self.min_x - ray.ox) * ray.inv_dx;
                let tx1 = (self.max_x - ray.ox) * ray.inv_dx;
                let ty0 = (self.min_y - ray.oy) * ray.inv_dy;
                let ty1 = (self.max_y - ray.oy) * ray.inv_dy;
                let tz0 = (self.min_z - ray.oz) * ray.inv_dz;
                let tz1 = (self.max_z - ray.oz) * ray.inv_dz;

                let t_enter = tx0
                    .min(tx1)
                    .max(ty0.min(ty1))
                    .max(tz0.min(tz1))
                    .max(ray.t_min);
                let t_exit = tx0
                    .max(tx1)
                    .min(ty0.max(ty1))
                    .min(tz0.max(tz1))
                    .min($fx::splat(t_max));

                let hit = t_enter.cmp_le(t_exit);
                let t_near = t_enter.max($fx::ZERO);

                (
                    hit.move_mask() as u32 & ((1u32 << self.count) - 1),
                    t_near.to_array(),
                )
            }
        }

        /// A batch of up to `$width` triangles in SoA layout.
        ///
        /// Stores the first vertex and the two edges per component, plus the
        /// primitive index each lane came from. Zeroed padding lanes produce
        /// a zero determinant and reject themselves.
        #[derive(Debug, Clone)]
        pub struct $tri {
            v0x: $fx,
            v0y: $fx,
            v0z: $fx,
            e1x: $fx,
            e1y: $fx,
            e1z: $fx,
            e2x: $fx,
            e2y: $fx,
            e2z: $fx,
            prim: [u32; $width],
            count: usize,
        }

        impl $tri {
            /// Pack triangles given as (v0, v1, v2, primitive index).
            ///
            /// At most `$width` entries are taken; the tail is padding.
            pub fn pack(tris: &[(Vec3, Vec3, Vec3, u32)]) -> Self {
                let mut v0 = [[0.0f32; $width]; 3];
                let mut e1 = [[0.0f32; $width]; 3];
                let mut e2 = [[0.0f32; $width]; 3];
                let mut prim = [INVALID_PRIM; $width];
                let count = tris.len().min($width);
                for (i, (a, b, c, p)) in tris.iter().take($width).enumerate() {
                    let edge1 = *b - *a;
                    let edge2 = *c - *a;
                    v0[0][i] = a.x;
                    v0[1][i] = a.y;
                    v0[2][i] = a.z;
                    e1[0][i] = edge1.x;
                    e1[1][i] = edge1.y;
                    e1[2][i] = edge1.z;
                    e2[0][i] = edge2.x;
                    e2[1][i] = edge2.y;
                    e2[2][i] = edge2.z;
                    prim[i] = *p;
                }
                Self {
                    v0x: $fx::from(v0[0]),
                    v0y: $fx::from(v0[1]),
                    v0z: $fx::from(v0[2]),
                    e1x: $fx::from(e1[0]),
                    e1y: $fx::from(e1[1]),
                    e1z: $fx::from(e1[2]),
                    e2x: $fx::from(e2[0]),
                    e2y: $fx::from(e2[1]),
                    e2z: $fx::from(e2[2]),
                    prim,
                    count,
                }
            }

            pub fn len(&self) -> usize {
                self.count
            }

            pub fn is_empty(&self) -> bool {
                self.count == 0
            }

            /// Möller-Trumbore across all lanes; hit lanes closer than
            /// `t_max` have their bit set in the returned mask.
            #[inline]
            fn test(&self, ray: &$ray, t_max: f32) -> (u32, [f32; $width], [f32; $width], [f32; $width]) {
                // h = dir x e2
                let hx = ray.dy * self.e2z - ray.dz * self.e2y;
                let hy = ray.dz * self.e2x - ray.dx * self.e2z;
                let hz = ray.dx * self.e2y - ray.dy * self.e2x;

                let det = self.e1x * hx + self.e1y * hy + self.e1z * hz;
                let parallel = det.abs().cmp_lt($fx::splat(1e-8));

                let inv_det = $fx::ONE / det;
                let sx = ray.ox - self.v0x;
                let sy = ray.oy - self.v0y;
                let sz = ray.oz - self.v0z;

                let u = (sx * hx + sy * hy + sz * hz) * inv_det;

                // q = s x e1
                let qx = sy * self.e1z - sz * self.e1y;
                let qy = sz * self.e1x - sx * self.e1z;
                let qz = sx * self.e1y - sy * self.e1x;

                let v = (ray.dx * qx + ray.dy * qy + ray.dz * qz) * inv_det;
                let t = (self.e2x * qx + self.e2y * qy + self.e2z * qz) * inv_det;

                let inside = u.cmp_ge($fx::ZERO)
                    & v.cmp_ge($fx::ZERO)
                    & (u + v).cmp_le($fx::ONE)
                    & t.cmp_gt(ray.t_min)
                    & t.cmp_lt($fx::splat(t_max))
                    & !parallel;

                (
                    inside.move_mask() as u32 & ((1u32 << $width) - 1),
                    t.to_array(),
                    u.to_array(),
                    v.to_array(),
                )
            }

            /// Nearest hit among the lanes, if any lane beats `t_max`.
            pub fn intersect(&self, ray: &$ray, t_max: f32) -> Option<LaneHit> {
                let (mask, t, u, v) = self.test(ray, t_max);
                if mask == 0 {
                    return None;
                }
                let mut best: Option<usize> = None;
                for lane in 0..self.count {
                    if mask & (1 << lane) != 0 {
                        if best.is_none_or(|b| t[lane] < t[b]) {
                            best = Some(lane);
                        }
                    }
                }
                best.map(|lane| LaneHit {
                    prim: self.prim[lane],
                    t: t[lane],
                    u: u[lane],
                    v: v[lane],
                })
            }

            /// Occlusion test: true as soon as any lane hits.
            pub fn intersect_any(&self, ray: &$ray, t_max: f32) -> bool {
                let (mask, _, _, _) = self.test(ray, t_max);
                mask & ((1u32 << self.count) - 1) != 0
            }

            /// Invoke `visit` for every lane that hits, for multi-hit queries.
            pub fn intersect_each<F: FnMut(LaneHit)>(&self, ray: &$ray, t_max: f32, mut visit: F) {
                let (mask, t, u, v) = self.test(ray, t_max);
                for lane in 0..self.count {
                    if mask & (1 << lane) != 0 {
                        visit(LaneHit {
                            prim: self.prim[lane],
                            t: t[lane],
                            u: u[lane],
                            v: v[lane],
                        });
                    }
                }
            }
        }

        /// A batch of up to `$width` line segments (hair) in SoA layout.
        ///
        /// Each lane is a segment with linearly interpolated half width. The
        /// test finds the closest approach between the ray and the segment
        /// axis and accepts when it is inside the interpolated width; zeroed
        /// padding lanes have zero width and reject themselves.
        #[derive(Debug, Clone)]
        pub struct $line {
            p0x: $fx,
            p0y: $fx,
            p0z: $fx,
            // axis = p1 - p0, not normalized
            ax: $fx,
            ay: $fx,
            az: $fx,
            len_sq: $fx,
            w0: $fx,
            w1: $fx,
            prim: [u32; $width],
            count: usize,
        }

        impl $line {
            /// Pack segments given as (p0, p1, half width at p0, half width
            /// at p1, primitive index).
            pub fn pack(lines: &[(Vec3, Vec3, f32, f32, u32)]) -> Self {
                let mut p0 = [[0.0f32; $width]; 3];
                let mut axis = [[0.0f32; $width]; 3];
                let mut len_sq = [0.0f32; $width];
                let mut w0 = [0.0f32; $width];
                let mut w1 = [0.0f32; $width];
                let mut prim = [INVALID_PRIM; $width];
                let count = lines.len().min($width);
                for (i, (a, b, r0, r1, p)) in lines.iter().take($width).enumerate() {
                    let d = *b - *a;
                    p0[0][i] = a.x;
                    p0[1][i] = a.y;
                    p0[2][i] = a.z;
                    axis[0][i] = d.x;
                    axis[1][i] = d.y;
                    axis[2][i] = d.z;
                    len_sq[i] = d.length_squared();
                    w0[i] = *r0;
                    w1[i] = *r1;
                    prim[i] = *p;
                }
                Self {
                    p0x: $fx::from(p0[0]),
                    p0y: $fx::from(p0[1]),
                    p0z: $fx::from(p0[2]),
                    ax: $fx::from(axis[0]),
                    ay: $fx::from(axis[1]),
                    az: $fx::from(axis[2]),
                    len_sq: $fx::from(len_sq),
                    w0: $fx::from(w0),
                    w1: $fx::from(w1),
                    prim,
                    count,
                }
            }

            pub fn len(&self) -> usize {
                self.count
            }

            pub fn is_empty(&self) -> bool {
                self.count == 0
            }

            #[inline]
            fn test(&self, ray: &$ray, t_max: f32) -> (u32, [f32; $width], [f32; $width]) {
                // Closest approach between the ray and each segment axis:
                // minimize |o + t*d - (p0 + s*axis)| over t and s.
                let rx = self.p0x - ray.ox;
                let ry = self.p0y - ray.oy;
                let rz = self.p0z - ray.oz;

                let d_dot_a = ray.dx * self.ax + ray.dy * self.ay + ray.dz * self.az;
                let r_dot_d = rx * ray.dx + ry * ray.dy + rz * ray.dz;
                let r_dot_a = rx * self.ax + ry * self.ay + rz * self.az;

                // denom = |d|^2 |a|^2 - (d.a)^2, ray direction is unit.
                let denom = self.len_sq - d_dot_a * d_dot_a;
                let degenerate = denom.abs().cmp_lt($fx::splat(1e-12));
                let inv_denom = $fx::ONE / denom;

                let s = (r_dot_d * d_dot_a - r_dot_a) * inv_denom;
                let s = s.max($fx::ZERO).min($fx::ONE);
                let t = r_dot_d + s * d_dot_a;

                // Distance from the ray point to the axis point at s.
                let cx = rx + s * self.ax - t * ray.dx;
                let cy = ry + s * self.ay - t * ray.dy;
                let cz = rz + s * self.az - t * ray.dz;
                let dist_sq = cx * cx + cy * cy + cz * cz;

                let width = self.w0 + (self.w1 - self.w0) * s;
                let inside = dist_sq.cmp_le(width * width)
                    & t.cmp_gt(ray.t_min)
                    & t.cmp_lt($fx::splat(t_max))
                    & !degenerate;

                (
                    inside.move_mask() as u32 & ((1u32 << $width) - 1),
                    t.to_array(),
                    s.to_array(),
                )
            }

            /// Nearest hit among the lanes; `v` of the hit is the axis
            /// parameter of the segment, `u` is unused and zero.
            pub fn intersect(&self, ray: &$ray, t_max: f32) -> Option<LaneHit> {
                let (mask, t, s) = self.test(ray, t_max);
                if mask == 0 {
                    return None;
                }
                let mut best: Option<usize> = None;
                for lane in 0..self.count {
                    if mask & (1 << lane) != 0 {
                        if best.is_none_or(|b| t[lane] < t[b]) {
                            best = Some(lane);
                        }
                    }
                }
                best.map(|lane| LaneHit {
                    prim: self.prim[lane],
                    t: t[lane],
                    u: 0.0,
                    v: s[lane],
                })
            }

            /// Occlusion test: true as soon as any lane hits.
            pub fn intersect_any(&self, ray: &$ray, t_max: f32) -> bool {
                let (mask, _, _) = self.test(ray, t_max);
                mask & ((1u32 << self.count) - 1) != 0
            }
        }
    };
}

lane_pack_impl!(4, f32x4, RayPack4, Bbox4, Tri4, Line4);
lane_pack_impl!(8, f32x8, RayPack8, Bbox8, Tri8, Line8);

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_boxes() -> Vec<Aabb> {
        // Four unit boxes along +Z at increasing distance.
        (0..4)
            .map(|i| {
                let z = 2.0 + 3.0 * i as f32;
                Aabb::from_points(Vec3::new(-1.0, -1.0, z), Vec3::new(1.0, 1.0, z + 1.0))
            })
            .collect()
    }

    #[test]
    fn test_bbox4_matches_scalar() {
        let boxes = unit_boxes();
        let packed = Bbox4::from_boxes(&boxes);
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        let pack = RayPack4::new(&ray);

        let (mask, t_near) = packed.intersect(&pack, f32::INFINITY);
        for (i, b) in boxes.iter().enumerate() {
            let scalar = b.intersect(&ray);
            let lane_hit = mask & (1 << i) != 0;
            assert_eq!(lane_hit, scalar >= 0.0, "lane {i}");
            if lane_hit {
                assert!((t_near[i] - scalar).abs() < 1e-4, "lane {i}");
            }
        }
    }

    #[test]
    fn test_bbox4_padding_misses() {
        let packed = Bbox4::from_boxes(&unit_boxes()[..2]);
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        let (mask, _) = packed.intersect(&RayPack4::new(&ray), f32::INFINITY);
        assert_eq!(mask & 0b1100, 0);

        // The dangerous configuration: every direction component
        // non-negative and an unbounded range, where an all-infinite
        // padding slab would otherwise report a hit.
        let diagonal = Ray::spawn(Vec3::ZERO, Vec3::ONE.normalize());
        let (mask, _) = packed.intersect(&RayPack4::new(&diagonal), f32::INFINITY);
        assert_eq!(mask & 0b1100, 0);
    }

    #[test]
    fn test_bbox8_prunes_by_tmax() {
        let boxes = unit_boxes();
        let packed = Bbox8::from_boxes(&boxes);
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        // Only the first box is closer than t_max = 4.
        let (mask, _) = packed.intersect(&RayPack8::new(&ray), 4.0);
        assert_eq!(mask, 0b0001);
    }

    #[test]
    fn test_tri4_nearest() {
        // Two triangles facing the ray, nearest at z = 2.
        let tris = vec![
            (
                Vec3::new(-1.0, -1.0, 5.0),
                Vec3::new(1.0, -1.0, 5.0),
                Vec3::new(0.0, 1.0, 5.0),
                7u32,
            ),
            (
                Vec3::new(-1.0, -1.0, 2.0),
                Vec3::new(1.0, -1.0, 2.0),
                Vec3::new(0.0, 1.0, 2.0),
                9u32,
            ),
        ];
        let packed = Tri4::pack(&tris);
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, 0.0), Vec3::Z);
        let hit = packed.intersect(&RayPack4::new(&ray), f32::INFINITY).unwrap();
        assert_eq!(hit.prim, 9);
        assert!((hit.t - 2.0).abs() < 1e-5);
        assert!(packed.intersect_any(&RayPack4::new(&ray), f32::INFINITY));
    }

    #[test]
    fn test_tri8_padding_rejects() {
        let tris = vec![(
            Vec3::new(-1.0, -1.0, 2.0),
            Vec3::new(1.0, -1.0, 2.0),
            Vec3::new(0.0, 1.0, 2.0),
            0u32,
        )];
        let packed = Tri8::pack(&tris);
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        let hit = packed.intersect(&RayPack8::new(&ray), f32::INFINITY).unwrap();
        assert_eq!(hit.prim, 0);

        // A ray that misses the single real lane must not report padding.
        let miss = Ray::spawn(Vec3::new(5.0, 5.0, 0.0), Vec3::Z);
        assert!(packed.intersect(&RayPack8::new(&miss), f32::INFINITY).is_none());
    }

    #[test]
    fn test_line4_perpendicular_hit() {
        // Vertical segment at z = 3 with half width 0.1.
        let lines = vec![(
            Vec3::new(0.0, -1.0, 3.0),
            Vec3::new(0.0, 1.0, 3.0),
            0.1f32,
            0.1f32,
            3u32,
        )];
        let packed = Line4::pack(&lines);
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        let hit = packed.intersect(&RayPack4::new(&ray), f32::INFINITY).unwrap();
        assert_eq!(hit.prim, 3);
        assert!((hit.t - 3.0).abs() < 0.1 + 1e-4);

        // Passing wider than the half width misses.
        let miss = Ray::spawn(Vec3::new(0.5, 0.0, 0.0), Vec3::Z);
        assert!(packed.intersect(&RayPack4::new(&miss), f32::INFINITY).is_none());
    }
}
