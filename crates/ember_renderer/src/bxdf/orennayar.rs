//! Oren-Nayar rough diffuse reflection.

use ember_core::Spectrum;
use ember_math::sampling::{cosine_sample_hemisphere, INV_PI};
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::{
    abs_cos_theta, cos_phi, pointing_up, same_hemisphere, sin_phi, sin_theta, Bxdf, BxdfSample,
    BxdfType,
};

/// Diffuse reflection from a rough surface (Oren-Nayar), parameterized by
/// the slope standard deviation `sigma` in radians. Sampling is the same
/// cosine hemisphere as Lambert.
#[derive(Debug, Clone)]
pub struct OrenNayar {
    albedo: Spectrum,
    a: f32,
    b: f32,
}

impl OrenNayar {
    pub fn new(albedo: Spectrum, sigma: f32) -> Self {
        let sigma2 = sigma * sigma;
        Self {
            albedo,
            a: 1.0 - 0.5 * sigma2 / (sigma2 + 0.33),
            b: 0.45 * sigma2 / (sigma2 + 0.09),
        }
    }
}

impl Bxdf for OrenNayar {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION.union(BxdfType::DIFFUSE)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if !same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }

        let sin_theta_i = sin_theta(wi);
        let sin_theta_o = sin_theta(wo);

        // max(0, cos(phi_i - phi_o)) via the angle-difference identity.
        let max_cos = if sin_theta_i > 1e-4 && sin_theta_o > 1e-4 {
            (cos_phi(wi) * cos_phi(wo) + sin_phi(wi) * sin_phi(wo)).max(0.0)
        } else {
            0.0
        };

        let abs_cos_i = abs_cos_theta(wi);
        let abs_cos_o = abs_cos_theta(wo);
        let (sin_alpha, tan_beta) = if abs_cos_i > abs_cos_o {
            (sin_theta_o, sin_theta_i / abs_cos_i)
        } else {
            (sin_theta_i, sin_theta_o / abs_cos_o)
        };

        self.albedo * INV_PI * (self.a + self.b * max_cos * sin_alpha * tan_beta) * abs_cos_i
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::testing::{check_all, TestConfig};

    #[test]
    fn test_oren_nayar_properties() {
        let on = OrenNayar::new(Spectrum::ONE, 0.35);
        check_all(&on, &TestConfig::default());
    }

    #[test]
    fn test_zero_sigma_matches_lambert() {
        let on = OrenNayar::new(Spectrum::ONE, 0.0);
        let lambert = super::super::Lambert::new(Spectrum::ONE);
        let wo = Vec3::new(0.3, 0.8, 0.2).normalize();
        let wi = Vec3::new(-0.4, 0.6, 0.1).normalize();
        let a = on.f(wo, wi);
        let b = lambert.f(wo, wi);
        assert!((a - b).length() < 1e-5);
    }
}
