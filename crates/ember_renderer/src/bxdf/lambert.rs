//! Lambertian reflection and transmission.

use ember_core::Spectrum;
use ember_math::sampling::{cosine_sample_hemisphere, INV_PI};
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::{abs_cos_theta, pointing_up, same_hemisphere, Bxdf, BxdfSample, BxdfType};

/// Ideal diffuse reflection: `f = R/pi` on the matching hemisphere, sampled
/// cosine-weighted.
#[derive(Debug, Clone)]
pub struct Lambert {
    pub albedo: Spectrum,
}

impl Lambert {
    pub fn new(albedo: Spectrum) -> Self {
        Self { albedo }
    }
}

impl Bxdf for Lambert {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION.union(BxdfType::DIFFUSE)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if !same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        self.albedo * INV_PI * abs_cos_theta(wi)
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, _rng: &mut dyn RngCore) -> BxdfSample {
        let mut wi = cosine_sample_hemisphere(u.x, u.y);
        if !pointing_up(wo) {
            wi.y = -wi.y;
        }
        BxdfSample {
            wi,
            pdf: self.pdf(wo, wi),
            f: self.f(wo, wi),
        }
    }

    fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        if !same_hemisphere(wo, wi) {
            return 0.0;
        }
        abs_cos_theta(wi) * INV_PI
    }
}

/// Diffuse transmission through a thin surface: `f = T/pi` on the opposite
/// hemisphere.
#[derive(Debug, Clone)]
pub struct LambertTransmission {
    pub transmittance: Spectrum,
}

impl LambertTransmission {
    pub fn new(transmittance: Spectrum) -> Self {
        Self { transmittance }
    }
}

impl Bxdf for LambertTransmission {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::TRANSMISSION.union(BxdfType::DIFFUSE)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        self.transmittance * INV_PI * abs_cos_theta(wi)
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, _rng: &mut dyn RngCore) -> BxdfSample {
        let mut wi = cosine_sample_hemisphere(u.x, u.y);
        if pointing_up(wo) {
            wi.y = -wi.y;
        }
        BxdfSample {
            wi,
            pdf: self.pdf(wo, wi),
            f: self.f(wo, wi),
        }
    }

    fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        if same_hemisphere(wo, wi) {
            return 0.0;
        }
        abs_cos_theta(wi) * INV_PI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::testing::{check_all, TestConfig};

    #[test]
    fn test_lambert_properties() {
        let lambert = Lambert::new(Spectrum::ONE);
        check_all(&lambert, &TestConfig::default());
    }

    #[test]
    fn test_lambert_transmission_properties() {
        let lt = LambertTransmission::new(Spectrum::ONE);
        check_all(&lt, &TestConfig::default());
    }

    #[test]
    fn test_lambert_hemisphere_gate() {
        let lambert = Lambert::new(Spectrum::ONE);
        let wo = Vec3::new(0.0, 1.0, 0.0);
        let below = Vec3::new(0.0, -1.0, 0.0);
        assert_eq!(lambert.f(wo, below), Spectrum::ZERO);
        assert_eq!(lambert.pdf(wo, below), 0.0);
    }
}
