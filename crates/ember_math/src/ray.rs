use crate::Vec3;

/// Computes the inverse of `x` avoiding division by zero.
///
/// Zero direction components map to a huge finite value of the right sign so
/// the slab test still produces usable (if degenerate) parameters.
#[inline]
pub fn safe_inverse(x: f32) -> f32 {
    if x.abs() <= f32::EPSILON {
        x.signum() / f32::EPSILON
    } else {
        1.0 / x
    }
}

/// A ray in 3D space with a parametric range.
///
/// The direction is expected to be unit length. The reciprocal direction and
/// per-axis sign bits are cached at construction so that every slab test
/// along the traversal avoids divisions and branches.
#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Componentwise reciprocal of `direction`, for slab tests.
    pub inv_direction: Vec3,
    /// Sign of each direction component: 1 if negative, 0 otherwise.
    pub sign: [usize; 3],
    /// Minimum parameter for a valid intersection.
    pub t_min: f32,
    /// Maximum parameter for a valid intersection.
    pub t_max: f32,
}

impl Ray {
    /// Create a new ray with the given parametric range.
    pub fn new(origin: Vec3, direction: Vec3, t_min: f32, t_max: f32) -> Self {
        let inv_direction = Vec3::new(
            safe_inverse(direction.x),
            safe_inverse(direction.y),
            safe_inverse(direction.z),
        );
        Self {
            origin,
            direction,
            inv_direction,
            sign: [
                (direction.x < 0.0) as usize,
                (direction.y < 0.0) as usize,
                (direction.z < 0.0) as usize,
            ],
            t_min,
            t_max,
        }
    }

    /// Create a ray with the default epsilon-to-infinity range.
    pub fn spawn(origin: Vec3, direction: Vec3) -> Self {
        Self::new(origin, direction, 1e-3, f32::INFINITY)
    }

    /// Get the point along the ray at parameter t.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}
