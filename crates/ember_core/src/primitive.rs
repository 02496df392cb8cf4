//! Primitives and intersection records.

use ember_math::{Vec2, Vec3};

use crate::material::MaterialId;
use crate::shape::Shape;

/// Everything an integrator needs to know about a surface hit.
///
/// `t = +INFINITY` together with `primitive = None` encodes "no hit"; after a
/// successful nearest-hit query `t` is the smallest parameter of any
/// intersected primitive along the ray.
#[derive(Debug, Clone, Copy)]
pub struct Intersection {
    /// The intersection point.
    pub point: Vec3,
    /// The shading normal.
    pub normal: Vec3,
    /// The geometric normal.
    pub gnormal: Vec3,
    /// Tangent vector of the shading frame.
    pub tangent: Vec3,
    /// Surface parameterization.
    pub uv: Vec2,
    /// Ray parameter of the hit.
    pub t: f32,
    /// Index of the intersected primitive in the scene.
    pub primitive: Option<u32>,
}

impl Default for Intersection {
    fn default() -> Self {
        Self {
            point: Vec3::ZERO,
            normal: Vec3::Y,
            gnormal: Vec3::Y,
            tangent: Vec3::X,
            uv: Vec2::ZERO,
            t: f32::INFINITY,
            primitive: None,
        }
    }
}

impl Intersection {
    /// Clear the fields that make this record a hit, so intersection tests
    /// can treat it as fresh while keeping the allocation.
    pub fn reset(&mut self) {
        self.t = f32::INFINITY;
        self.primitive = None;
    }

    /// True when the record holds an actual hit.
    #[inline]
    pub fn is_hit(&self) -> bool {
        self.primitive.is_some()
    }
}

/// A shape bound to a material, optionally acting as an area light.
///
/// The scene owns its primitives; accelerators and intersection records refer
/// to them by index so the references stay valid across relocations and the
/// leaves stay compact.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub shape: Shape,
    pub material: MaterialId,
    /// Index of the area light this primitive emits for, if any.
    pub light: Option<u32>,
}

impl Primitive {
    pub fn new(shape: Shape, material: MaterialId) -> Self {
        Self {
            shape,
            material,
            light: None,
        }
    }

    pub fn with_light(mut self, light: u32) -> Self {
        self.light = Some(light);
        self
    }
}

/// Capacity of the subsurface-probe hit bag.
pub const MAX_SSS_INTERSECTIONS: usize = 4;

/// A fixed-capacity bag of hits along one ray, used by subsurface probes.
///
/// While the bag has free slots `max_t` stays infinite so traversal cannot
/// prune; once full it tracks the largest stored `t` and new closer hits
/// evict the farthest one.
#[derive(Debug, Clone)]
pub struct BssrdfIntersections {
    hits: [Intersection; MAX_SSS_INTERSECTIONS],
    count: usize,
    max_t: f32,
}

impl Default for BssrdfIntersections {
    fn default() -> Self {
        Self {
            hits: [Intersection::default(); MAX_SSS_INTERSECTIONS],
            count: 0,
            max_t: f32::INFINITY,
        }
    }
}

impl BssrdfIntersections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest `t` the bag will still accept; traversal prunes nodes whose
    /// entry parameter exceeds this.
    #[inline]
    pub fn max_t(&self) -> f32 {
        self.max_t
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Stored hits, unordered.
    pub fn hits(&self) -> &[Intersection] {
        &self.hits[..self.count]
    }

    /// Insert a hit, evicting the farthest stored hit when full.
    pub fn add(&mut self, isect: Intersection) {
        if self.count < MAX_SSS_INTERSECTIONS {
            self.hits[self.count] = isect;
            self.count += 1;
            if self.count == MAX_SSS_INTERSECTIONS {
                self.resolve_max_t();
            }
            return;
        }

        let mut farthest = 0;
        for i in 1..self.count {
            if self.hits[i].t > self.hits[farthest].t {
                farthest = i;
            }
        }
        if isect.t < self.hits[farthest].t {
            self.hits[farthest] = isect;
            self.resolve_max_t();
        }
    }

    fn resolve_max_t(&mut self) {
        self.max_t = self.hits[..self.count]
            .iter()
            .map(|h| h.t)
            .fold(0.0, f32::max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit_at(t: f32) -> Intersection {
        Intersection {
            t,
            primitive: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_hit_encoding() {
        let isect = Intersection::default();
        assert!(!isect.is_hit());
        assert_eq!(isect.t, f32::INFINITY);
    }

    #[test]
    fn test_bag_unbounded_until_full() {
        let mut bag = BssrdfIntersections::new();
        bag.add(hit_at(5.0));
        bag.add(hit_at(2.0));
        assert_eq!(bag.max_t(), f32::INFINITY);
        bag.add(hit_at(9.0));
        bag.add(hit_at(1.0));
        assert_eq!(bag.len(), 4);
        assert_eq!(bag.max_t(), 9.0);
    }

    #[test]
    fn test_bag_evicts_farthest() {
        let mut bag = BssrdfIntersections::new();
        for t in [5.0, 2.0, 9.0, 1.0] {
            bag.add(hit_at(t));
        }
        // 3.0 replaces 9.0; a farther hit is ignored.
        bag.add(hit_at(3.0));
        assert_eq!(bag.max_t(), 5.0);
        bag.add(hit_at(100.0));
        assert_eq!(bag.max_t(), 5.0);
        assert_eq!(bag.len(), 4);

        let mut ts: Vec<f32> = bag.hits().iter().map(|h| h.t).collect();
        ts.sort_by(f32::total_cmp);
        assert_eq!(ts, vec![1.0, 2.0, 3.0, 5.0]);
    }
}
