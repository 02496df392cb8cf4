//! EMBER math - geometric foundation of the renderer.
//!
//! Re-exports `glam` for vector/matrix types and adds the ray tracing
//! primitives built on top of them: intervals, rays with cached reciprocal
//! directions, slab-tested bounding boxes, orthonormal bases, the sampling
//! distributions shared by every BxDF, and the SIMD lane packs used by the
//! wide BVH.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod onb;
mod ray;

pub mod sampling;
pub mod simd;

pub use aabb::Aabb;
pub use interval::Interval;
pub use onb::Onb;
pub use ray::Ray;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_reexport() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v + Vec3::ONE, Vec3::new(2.0, 3.0, 4.0));
    }
}
