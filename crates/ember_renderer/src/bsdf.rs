//! BSDF: the ordered set of weighted lobes at one shading point.
//!
//! Lobes live in the local y-up frame derived from the shading normal and
//! tangent; the BSDF transforms directions at the boundary and delegates to
//! the shared lobe-list logic. Up to eight lobes are stored inline, so
//! building a BSDF on the shading path does not touch the heap.

use ember_core::{Intersection, Spectrum};
use ember_math::{Onb, Vec2, Vec3};
use rand::RngCore;
use smallvec::SmallVec;

use crate::bxdf::{
    list_f, list_pdf, list_sample, Bxdf, BxdfSample, BxdfType, Lobe, WeightedLobe, MAX_LOBES,
};

#[derive(Clone)]
pub struct Bsdf {
    lobes: SmallVec<[WeightedLobe; MAX_LOBES]>,
    frame: Onb,
    /// Geometric normal, for light-leak prevention at the frame boundary.
    gnormal: Vec3,
}

impl Bsdf {
    pub fn new(isect: &Intersection) -> Self {
        Self {
            frame: Onb::from_normal_tangent(isect.normal, isect.tangent),
            gnormal: isect.gnormal,
            lobes: SmallVec::new(),
        }
    }

    /// A BSDF in an explicit frame, mostly for tests.
    pub fn with_frame(frame: Onb) -> Self {
        Self {
            gnormal: frame.normal,
            frame,
            lobes: SmallVec::new(),
        }
    }

    pub fn add(&mut self, weight: Spectrum, lobe: Lobe) {
        if self.lobes.len() < MAX_LOBES {
            self.lobes.push(WeightedLobe { weight, lobe });
        }
    }

    pub fn len(&self) -> usize {
        self.lobes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobes.is_empty()
    }

    /// True if any lobe can be evaluated for arbitrary direction pairs.
    pub fn has_non_specular(&self) -> bool {
        self.lobes
            .iter()
            .any(|wl| !wl.lobe.bxdf_type().is_delta())
    }

    /// True if every lobe is a delta distribution.
    pub fn is_delta(&self) -> bool {
        !self.is_empty() && !self.has_non_specular()
    }

    #[inline]
    pub fn to_local(&self, w: Vec3) -> Vec3 {
        self.frame.to_local(w)
    }

    #[inline]
    pub fn to_world(&self, w: Vec3) -> Vec3 {
        self.frame.to_world(w)
    }

    /// Evaluate the full BSDF for world-space directions.
    pub fn f(&self, wo_world: Vec3, wi_world: Vec3) -> Spectrum {
        let wo = self.to_local(wo_world);
        let wi = self.to_local(wi_world);
        if wo.y == 0.0 {
            return Spectrum::ZERO;
        }
        list_f(&self.lobes, wo, wi)
    }

    /// Mixture PDF for world-space directions.
    pub fn pdf(&self, wo_world: Vec3, wi_world: Vec3) -> f32 {
        let wo = self.to_local(wo_world);
        let wi = self.to_local(wi_world);
        list_pdf(&self.lobes, wo, wi)
    }

    /// Sample a world-space incident direction.
    pub fn sample_f(&self, wo_world: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let wo = self.to_local(wo_world);
        let s = list_sample(&self.lobes, wo, u, rng);
        if s.pdf == 0.0 {
            return s;
        }
        let wi_world = self.to_world(s.wi);

        // Kill samples that tunnel through the geometric surface while the
        // shading frame says they do not.
        let shading_side = s.wi.y > 0.0;
        let geometric_side = wi_world.dot(self.gnormal) > 0.0;
        let wo_side = wo_world.dot(self.gnormal) > 0.0;
        if shading_side == (wo.y > 0.0) && geometric_side != wo_side {
            return BxdfSample::rejected();
        }

        BxdfSample {
            wi: wi_world,
            pdf: s.pdf,
            f: s.f,
        }
    }

    /// Union of the lobe type masks.
    pub fn bxdf_type(&self) -> BxdfType {
        let mut t = BxdfType(0);
        for wl in &self.lobes {
            t = t.union(wl.lobe.bxdf_type());
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::{Lambert, Mirror};
    use ember_math::sampling::INV_PI;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn up_frame() -> Onb {
        Onb::from_normal(Vec3::Y)
    }

    #[test]
    fn test_bsdf_single_lambert() {
        let mut bsdf = Bsdf::with_frame(up_frame());
        bsdf.add(Spectrum::ONE, Lobe::Lambert(Lambert::new(Spectrum::ONE)));

        let wo = Vec3::new(0.0, 1.0, 0.0);
        let wi = Vec3::new(0.3, 0.9, 0.0).normalize();
        let f = bsdf.f(wo, wi);
        assert!((f.x - INV_PI * wi.y).abs() < 1e-5);
        assert!((bsdf.pdf(wo, wi) - wi.y * INV_PI).abs() < 1e-5);
    }

    #[test]
    fn test_bsdf_weighted_mixture() {
        // Two half-weight lambert lobes behave like one full lobe.
        let mut two = Bsdf::with_frame(up_frame());
        two.add(Spectrum::splat(0.5), Lobe::Lambert(Lambert::new(Spectrum::ONE)));
        two.add(Spectrum::splat(0.5), Lobe::Lambert(Lambert::new(Spectrum::ONE)));

        let mut one = Bsdf::with_frame(up_frame());
        one.add(Spectrum::ONE, Lobe::Lambert(Lambert::new(Spectrum::ONE)));

        let wo = Vec3::new(0.2, 0.9, 0.1).normalize();
        let wi = Vec3::new(-0.3, 0.8, 0.2).normalize();
        assert!((two.f(wo, wi) - one.f(wo, wi)).length() < 1e-5);
        assert!((two.pdf(wo, wi) - one.pdf(wo, wi)).abs() < 1e-5);
    }

    #[test]
    fn test_bsdf_delta_detection() {
        let mut bsdf = Bsdf::with_frame(up_frame());
        bsdf.add(Spectrum::ONE, Lobe::Mirror(Mirror::new(Spectrum::ONE)));
        assert!(bsdf.is_delta());
        assert!(!bsdf.has_non_specular());

        bsdf.add(Spectrum::ONE, Lobe::Lambert(Lambert::new(Spectrum::ONE)));
        assert!(!bsdf.is_delta());
        assert!(bsdf.has_non_specular());
    }

    #[test]
    fn test_bsdf_sample_in_frame() {
        // A tilted frame still produces directions on the shading
        // hemisphere.
        let n = Vec3::new(0.5, 0.7, 0.5).normalize();
        let mut bsdf = Bsdf::with_frame(Onb::from_normal(n));
        bsdf.add(Spectrum::ONE, Lobe::Lambert(Lambert::new(Spectrum::ONE)));

        let mut rng = StdRng::seed_from_u64(11);
        let wo = n;
        for i in 0..256 {
            let u = Vec2::new(
                (i % 16) as f32 / 16.0 + 0.03,
                (i / 16) as f32 / 16.0 + 0.03,
            );
            let s = bsdf.sample_f(wo, u, &mut rng);
            if s.pdf > 0.0 {
                assert!(s.wi.dot(n) > 0.0);
            }
        }
    }
}
