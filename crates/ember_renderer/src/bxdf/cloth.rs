//! Cloth lobes: the fabric sheen lobe and the distribution-based BRDF.

use ember_core::Spectrum;
use ember_math::sampling::{cosine_sample_hemisphere, INV_PI, INV_TWO_PI};
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::fresnel::Fresnel;
use super::microfacet::{Distribution, MicrofacetReflection, VisTerm};
use super::{abs_cos_theta, canonical, pointing_up, same_hemisphere, Bxdf, BxdfSample, BxdfType};

/// Woven-cloth sheen: an inverted-Gaussian grazing lobe over the half-vector
/// sine, cosine-sampled. Softness grows with roughness.
#[derive(Debug, Clone)]
pub struct Fabric {
    pub base_color: Spectrum,
    exponent: f32,
}

impl Fabric {
    pub fn new(base_color: Spectrum, roughness: f32) -> Self {
        let r = roughness.clamp(0.05, 1.0);
        Self {
            base_color,
            exponent: 1.0 / r,
        }
    }
}

impl Bxdf for Fabric {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION.union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if !same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        let n_o_i = abs_cos_theta(wi);
        let n_o_v = abs_cos_theta(wo);
        if n_o_i == 0.0 || n_o_v == 0.0 {
            return Spectrum::ZERO;
        }

        let wh = (wo + wi).normalize();
        let sin2_h = (1.0 - wh.y * wh.y).max(0.0);
        // Sine-powered distribution peaks at grazing half vectors, which is
        // what gives cloth its rim highlight.
        let n = self.exponent;
        let d = (2.0 + n) * INV_TWO_PI * sin2_h.powf(0.5 * n);

        self.base_color * (d / (4.0 * n_o_i.max(n_o_v).max(1e-6))) * n_o_i
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

/// Distribution-based BRDF: a diffuse floor blended with a specular lobe by
/// a scalar specular amount, the rough lobe driven by GGX.
#[derive(Debug, Clone)]
pub struct DistributionBrdf {
    pub albedo: Spectrum,
    pub specular: f32,
    specular_lobe: MicrofacetReflection,
}

impl DistributionBrdf {
    pub fn new(albedo: Spectrum, specular: f32, roughness: f32) -> Self {
        let specular = specular.clamp(0.0, 1.0);
        Self {
            albedo,
            specular,
            specular_lobe: MicrofacetReflection::new(
                Spectrum::ONE,
                Fresnel::Schlick {
                    f0: Spectrum::splat(0.04 + 0.96 * specular),
                },
                Distribution::ggx(roughness, roughness),
                VisTerm::Smith { roughness },
            ),
        }
    }
}

impl Bxdf for DistributionBrdf {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION
            .union(BxdfType::DIFFUSE)
            .union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if !same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        let diffuse = self.albedo * (1.0 - self.specular) * INV_PI * abs_cos_theta(wi);
        diffuse + self.specular * self.specular_lobe.f(wo, wi)
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let wi = if canonical(rng) >= self.specular {
            let mut wi = cosine_sample_hemisphere(u.x, u.y);
            if !pointing_up(wo) {
                wi.y = -wi.y;
            }
            wi
        } else {
            let s = self.specular_lobe.sample_f(wo, u, rng);
            if s.pdf == 0.0 {
                return BxdfSample::rejected();
            }
            s.wi
        };
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
        let diffuse = abs_cos_theta(wi) * INV_PI;
        (1.0 - self.specular) * diffuse + self.specular * self.specular_lobe.pdf(wo, wi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::testing::{check_all, TestConfig};

    #[test]
    fn test_fabric_properties() {
        let fabric = Fabric::new(Spectrum::splat(0.8), 0.4);
        check_all(&fabric, &TestConfig::default());
    }

    #[test]
    fn test_fabric_rim_highlight() {
        let fabric = Fabric::new(Spectrum::ONE, 0.3);
        let wo = Vec3::new(0.0, 1.0, 0.0);
        // Grazing incidence excites the sheen more than retro-reflection.
        let grazing = Vec3::new(0.98, 0.2, 0.0).normalize();
        let retro = Vec3::new(0.0, 1.0, 0.0);
        assert!(fabric.f(wo, grazing).x / grazing.y.max(1e-3)
            > fabric.f(wo, retro).x / retro.y);
    }

    #[test]
    fn test_distribution_brdf_properties() {
        let brdf = DistributionBrdf::new(Spectrum::splat(0.7), 0.4, 0.5);
        check_all(&brdf, &TestConfig::default());
    }
}
