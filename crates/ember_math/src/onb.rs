use crate::Vec3;

/// An orthonormal basis describing a local shading frame.
///
/// The local convention throughout the renderer is y-up: the shading normal
/// maps to the local +Y axis, so `cos_theta` of a local direction is its y
/// component.
#[derive(Debug, Copy, Clone)]
pub struct Onb {
    pub tangent: Vec3,
    pub normal: Vec3,
    pub bitangent: Vec3,
}

impl Onb {
    /// Build a basis from a unit normal, choosing arbitrary tangents.
    ///
    /// Branchless construction after Duff et al., "Building an Orthonormal
    /// Basis, Revisited".
    pub fn from_normal(n: Vec3) -> Self {
        let sign = if n.z >= 0.0 { 1.0 } else { -1.0 };
        let a = -1.0 / (sign + n.z);
        let b = n.x * n.y * a;

        let tangent = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
        let bitangent = Vec3::new(b, sign + n.y * n.y * a, -n.y);

        Self {
            tangent,
            normal: n,
            bitangent,
        }
    }

    /// Build a basis from a normal and a preferred tangent direction.
    ///
    /// The tangent is re-orthogonalized against the normal; falls back to the
    /// arbitrary construction when the two are nearly parallel.
    pub fn from_normal_tangent(n: Vec3, t: Vec3) -> Self {
        let tangent = t - n * n.dot(t);
        if tangent.length_squared() < 1e-8 {
            return Self::from_normal(n);
        }
        let tangent = tangent.normalize();
        Self {
            tangent,
            normal: n,
            bitangent: n.cross(tangent),
        }
    }

    /// Transform a world direction into the local frame.
    #[inline]
    pub fn to_local(&self, w: Vec3) -> Vec3 {
        Vec3::new(w.dot(self.tangent), w.dot(self.normal), w.dot(self.bitangent))
    }

    /// Transform a local direction into world space.
    #[inline]
    pub fn to_world(&self, w: Vec3) -> Vec3 {
        self.tangent * w.x + self.normal * w.y + self.bitangent * w.z
    }
}
