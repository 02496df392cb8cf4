use crate::{Interval, Ray, Vec3};

/// Axis-aligned bounding box used by the spatial accelerators.
///
/// Defined by three intervals, one per axis. The empty box is the identity
/// for `surrounding` and fails every ray test.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    /// Create an AABB from two corner points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            x: Interval::new(a.x.min(b.x), a.x.max(b.x)),
            y: Interval::new(a.y.min(b.y), a.y.max(b.y)),
            z: Interval::new(a.z.min(b.z), a.z.max(b.z)),
        }
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            x: Interval::surrounding(&box0.x, &box1.x),
            y: Interval::surrounding(&box0.y, &box1.y),
            z: Interval::surrounding(&box0.z, &box1.z),
        }
    }

    /// Grow this box to contain a point.
    pub fn grow(&mut self, p: Vec3) {
        self.x = Interval::surrounding(&self.x, &Interval::new(p.x, p.x));
        self.y = Interval::surrounding(&self.y, &Interval::new(p.y, p.y));
        self.z = Interval::surrounding(&self.z, &Interval::new(p.z, p.z));
    }

    /// Grow this box to contain another box.
    pub fn union(&mut self, other: &Aabb) {
        self.x = Interval::surrounding(&self.x, &other.x);
        self.y = Interval::surrounding(&self.y, &other.y);
        self.z = Interval::surrounding(&self.z, &other.z);
    }

    /// Minimum corner.
    #[inline]
    pub fn min(&self) -> Vec3 {
        Vec3::new(self.x.min, self.y.min, self.z.min)
    }

    /// Maximum corner.
    #[inline]
    pub fn max(&self) -> Vec3 {
        Vec3::new(self.x.max, self.y.max, self.z.max)
    }

    /// Get the interval for a specific axis (0=X, 1=Y, 2=Z).
    pub fn axis_interval(&self, n: usize) -> Interval {
        match n {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Surface area of the box, used by the SAH cost function.
    pub fn surface_area(&self) -> f32 {
        let dx = self.x.size().max(0.0);
        let dy = self.y.size().max(0.0);
        let dz = self.z.size().max(0.0);
        2.0 * (dx * dy + dy * dz + dz * dx)
    }

    /// Returns the index (0=X, 1=Y, 2=Z) of the axis with the longest extent.
    pub fn longest_axis(&self) -> usize {
        let x_size = self.x.size();
        let y_size = self.y.size();
        let z_size = self.z.size();

        if x_size > y_size && x_size > z_size {
            0
        } else if y_size > z_size {
            1
        } else {
            2
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        Vec3::new(
            (self.x.min + self.x.max) * 0.5,
            (self.y.min + self.y.max) * 0.5,
            (self.z.min + self.z.max) * 0.5,
        )
    }

    /// Slab test returning the entry parameter along the ray.
    ///
    /// Returns a negative value when the ray misses the box within its
    /// `[t_min, t_max]` range. When the origin is inside the box the entry
    /// parameter is 0. Uses the ray's cached reciprocal direction and sign
    /// bits so each axis is a multiply and two compares.
    pub fn intersect(&self, ray: &Ray) -> f32 {
        let bounds = [self.min(), self.max()];

        let mut t0 = (bounds[ray.sign[0]].x - ray.origin.x) * ray.inv_direction.x;
        let mut t1 = (bounds[1 - ray.sign[0]].x - ray.origin.x) * ray.inv_direction.x;

        let ty0 = (bounds[ray.sign[1]].y - ray.origin.y) * ray.inv_direction.y;
        let ty1 = (bounds[1 - ray.sign[1]].y - ray.origin.y) * ray.inv_direction.y;
        t0 = t0.max(ty0);
        t1 = t1.min(ty1);

        let tz0 = (bounds[ray.sign[2]].z - ray.origin.z) * ray.inv_direction.z;
        let tz1 = (bounds[1 - ray.sign[2]].z - ray.origin.z) * ray.inv_direction.z;
        t0 = t0.max(tz0);
        t1 = t1.min(tz1);

        t0 = t0.max(ray.t_min);
        t1 = t1.min(ray.t_max);

        if t0 > t1 {
            return -1.0;
        }
        t0.max(0.0)
    }

    /// An empty box (contains nothing, fails every ray test).
    pub const EMPTY: Aabb = Aabb {
        x: Interval::EMPTY,
        y: Interval::EMPTY,
        z: Interval::EMPTY,
    };

    /// A box that contains everything.
    pub const UNIVERSE: Aabb = Aabb {
        x: Interval::UNIVERSE,
        y: Interval::UNIVERSE,
        z: Interval::UNIVERSE,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_intersect_entry() {
        let aabb = Aabb::from_points(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));

        // Frontal hit: entry at t = 4.
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let t = aabb.intersect(&ray);
        assert!((t - 4.0).abs() < 1e-5);

        // Origin inside the box: entry parameter is 0.
        let ray = Ray::new(Vec3::ZERO, Vec3::Z, 0.0, f32::INFINITY);
        assert_eq!(aabb.intersect(&ray), 0.0);

        // Pointing away: miss.
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, -5.0), -Vec3::Z);
        assert!(aabb.intersect(&ray) < 0.0);

        // Offset parallel ray: miss.
        let ray = Ray::spawn(Vec3::new(10.0, 0.0, -5.0), Vec3::Z);
        assert!(aabb.intersect(&ray) < 0.0);
    }

    #[test]
    fn test_aabb_empty_misses() {
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        assert!(Aabb::EMPTY.intersect(&ray) < 0.0);
    }

    #[test]
    fn test_aabb_surface_area() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert!((aabb.surface_area() - 22.0).abs() < 1e-5);
    }

    #[test]
    fn test_aabb_longest_axis() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::new(10.0, 1.0, 1.0));
        assert_eq!(aabb.longest_axis(), 0);
    }

    #[test]
    fn test_aabb_union() {
        let mut a = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::from_points(Vec3::new(2.0, 2.0, 2.0), Vec3::new(3.0, 3.0, 3.0));
        a.union(&b);
        assert_eq!(a.max(), Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(a.min(), Vec3::ZERO);
    }
}
