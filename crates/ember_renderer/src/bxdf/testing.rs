//! Property checks shared by the BxDF unit tests and the embedded
//! `--unittest` suite.
//!
//! Four universal properties: reciprocity, energy conservation, consistency
//! between `sample_f` and `pdf`/`f`, and sampling coverage of the
//! integration domain.

use ember_core::Spectrum;
use ember_math::sampling::{
    uniform_sample_hemisphere, uniform_sample_sphere, uniform_sphere_pdf, TWO_PI,
};
use ember_math::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{abs_cos_theta, Bxdf};

/// Sample counts and tolerances of one property run.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub seed: u64,
    pub reciprocity_samples: usize,
    pub pdf_samples: usize,
    pub energy_samples: usize,
    pub coverage_samples: usize,
    /// Expected value of `E[1/pdf]` over accepted samples; `None` skips the
    /// coverage check for lobes that scatter over both hemispheres.
    pub expected_measure: Option<f32>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            reciprocity_samples: 256,
            pdf_samples: 2048,
            energy_samples: 200_000,
            coverage_samples: 400_000,
            expected_measure: Some(TWO_PI),
        }
    }
}

impl TestConfig {
    /// A cheaper profile for the embedded self-test binary.
    pub fn quick() -> Self {
        Self {
            energy_samples: 50_000,
            coverage_samples: 100_000,
            pdf_samples: 512,
            ..Self::default()
        }
    }

    pub fn without_coverage(mut self) -> Self {
        self.expected_measure = None;
        self
    }
}

/// `f(wo, wi) |cos_o|` must equal `f(wi, wo) |cos_i|` for random direction
/// pairs over the sphere.
pub fn check_reciprocity(bxdf: &dyn Bxdf, cfg: &TestConfig) {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    for _ in 0..cfg.reciprocity_samples {
        let wi = uniform_sample_sphere(rng.random(), rng.random());
        let wo = uniform_sample_sphere(rng.random(), rng.random());

        let f0 = bxdf.f(wo, wi) * abs_cos_theta(wo);
        let f1 = bxdf.f(wi, wo) * abs_cos_theta(wi);

        assert!(
            (f0 - f1).abs().max_element() < 1e-3,
            "reciprocity violated: {f0:?} vs {f1:?} for wo={wo:?} wi={wi:?}"
        );
    }
}

/// From straight-on incidence, `E[f / pdf]` must not exceed one per channel
/// (within Monte Carlo tolerance).
pub fn check_energy_conservation(bxdf: &dyn Bxdf, cfg: &TestConfig) {
    let mut rng = StdRng::seed_from_u64(cfg.seed ^ 0xE4E3);
    let wo = Vec3::Y;
    let mut total = Spectrum::ZERO;
    for _ in 0..cfg.energy_samples {
        let u = Vec2::new(rng.random(), rng.random());
        let s = bxdf.sample_f(wo, u, &mut rng);
        if s.pdf > 0.0 {
            total += s.f / s.pdf;
        }
    }
    let avg = total / cfg.energy_samples as f32;
    assert!(
        avg.max_element() <= 1.01,
        "energy conservation violated: average throughput {avg:?}"
    );
}

/// The PDF reported by `sample_f` must match `pdf()` within one percent, the
/// spectrum must match `f()`, and the PDF integrated over the sphere must
/// not exceed one.
pub fn check_pdf_consistency(bxdf: &dyn Bxdf, cfg: &TestConfig) {
    let mut rng = StdRng::seed_from_u64(cfg.seed ^ 0x9D0F);
    let wo = uniform_sample_hemisphere(rng.random(), rng.random());

    for _ in 0..cfg.pdf_samples {
        let u = Vec2::new(rng.random(), rng.random());
        let s = bxdf.sample_f(wo, u, &mut rng);
        let queried = bxdf.pdf(wo, s.wi);
        if queried == 0.0 {
            continue;
        }
        assert!(!s.pdf.is_nan() && s.pdf >= 0.0);
        assert!(
            (s.pdf / queried - 1.0).abs() <= 0.01,
            "sampled pdf {} disagrees with queried pdf {}",
            s.pdf,
            queried
        );
        let f = bxdf.f(wo, s.wi);
        assert!(
            (s.f - f).abs().max_element() < 1e-3,
            "sampled spectrum {:?} disagrees with f() {f:?}",
            s.f
        );
    }

    // The pdf must not sum to more than the full density; rejection of
    // below-horizon samples may make it sum to less.
    let mut total = 0.0f64;
    let n = cfg.coverage_samples / 2;
    for _ in 0..n {
        let wi = uniform_sample_sphere(rng.random(), rng.random());
        total += (bxdf.pdf(wo, wi) / uniform_sphere_pdf()) as f64;
    }
    let integral = total / n as f64;
    assert!(
        integral <= 1.03,
        "pdf integrates to {integral}, more than the full density"
    );
}

/// `E[1/pdf]` over accepted samples approaches the measure of the sampled
/// domain (2 pi for a hemisphere) within three percent.
pub fn check_sampling_coverage(bxdf: &dyn Bxdf, cfg: &TestConfig) {
    let Some(expected) = cfg.expected_measure else {
        return;
    };
    let mut rng = StdRng::seed_from_u64(cfg.seed ^ 0xC07E);
    let wo = uniform_sample_hemisphere(rng.random(), rng.random());
    let mut total = 0.0f64;
    for _ in 0..cfg.coverage_samples {
        let u = Vec2::new(rng.random(), rng.random());
        let s = bxdf.sample_f(wo, u, &mut rng);
        if s.pdf > 0.0 {
            total += 1.0 / s.pdf as f64;
        }
    }
    let measure = total / cfg.coverage_samples as f64;
    assert!(
        (measure - expected as f64).abs() / (expected as f64) < 0.03,
        "sampling coverage {measure} does not match domain measure {expected}"
    );
}

/// Run every universal property.
pub fn check_all(bxdf: &dyn Bxdf, cfg: &TestConfig) {
    check_pdf_consistency(bxdf, cfg);
    check_reciprocity(bxdf, cfg);
    check_energy_conservation(bxdf, cfg);
    check_sampling_coverage(bxdf, cfg);
}
