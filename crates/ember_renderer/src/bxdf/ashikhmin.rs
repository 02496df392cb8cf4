//! Ashikhmin-Shirley anisotropic BRDF.
//!
//! A coupled diffuse + anisotropic specular model. The specular exponent
//! pair comes from the two roughness values; sampling splits evenly between
//! the two terms and reports the mixture PDF.

use ember_core::Spectrum;
use ember_math::sampling::{cosine_sample_hemisphere, INV_PI, TWO_PI};
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::{
    abs_cos_theta, canonical, pointing_up, reflect, same_hemisphere, schlick_weight, Bxdf,
    BxdfSample, BxdfType,
};

#[derive(Debug, Clone)]
pub struct AshikhminShirley {
    pub diffuse: Spectrum,
    pub specular: f32,
    nu: f32,
    nv: f32,
}

fn roughness_to_exponent(r: f32) -> f32 {
    let r = r.clamp(1e-2, 1.0);
    2.0 / (r * r * r * r) - 2.0
}

impl AshikhminShirley {
    pub fn new(diffuse: Spectrum, specular: f32, roughness_u: f32, roughness_v: f32) -> Self {
        Self {
            diffuse,
            specular: specular.clamp(0.0, 1.0),
            nu: roughness_to_exponent(roughness_u),
            nv: roughness_to_exponent(roughness_v),
        }
    }

    fn sample_wh(&self, u: f32, v: f32) -> Vec3 {
        // Quadrant-wise sampling of the anisotropic exponent lobe.
        let mut u1 = u;
        let mut flip_x = false;
        let mut flip_z = false;
        if u1 < 0.5 {
            u1 *= 2.0;
        } else {
            u1 = (u1 - 0.5) * 2.0;
            flip_x = true;
        }
        let mut u2 = v;
        if u2 < 0.5 {
            u2 *= 2.0;
        } else {
            u2 = (u2 - 0.5) * 2.0;
            flip_z = true;
        }

        let phi = ((self.nu + 1.0) / (self.nv + 1.0)).sqrt()
            * (std::f32::consts::FRAC_PI_2 * u1).tan();
        let phi = phi.atan();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let exponent = self.nu * cos_phi * cos_phi + self.nv * sin_phi * sin_phi;
        let cos_theta = u2.powf(1.0 / (exponent + 1.0));
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

        let mut wh = Vec3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi);
        if flip_x {
            wh.x = -wh.x;
        }
        if flip_z {
            wh.z = -wh.z;
        }
        wh
    }

    fn pdf_wh(&self, wh: Vec3) -> f32 {
        let cos_h = abs_cos_theta(wh);
        let sin2 = (1.0 - cos_h * cos_h).max(0.0);
        let exponent = if sin2 > 1e-8 {
            (self.nu * wh.x * wh.x + self.nv * wh.z * wh.z) / sin2
        } else {
            0.0
        };
        ((self.nu + 1.0) * (self.nv + 1.0)).sqrt() / TWO_PI * cos_h.powf(exponent)
    }
}

impl Bxdf for AshikhminShirley {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION
            .union(BxdfType::DIFFUSE)
            .union(BxdfType::GLOSSY)
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

        // Coupled diffuse term.
        let rd = self.diffuse * (28.0 / (23.0 * std::f32::consts::PI))
            * (1.0 - self.specular)
            * (1.0 - (1.0 - n_o_i * 0.5).powi(5))
            * (1.0 - (1.0 - n_o_v * 0.5).powi(5));

        // Anisotropic specular term with Schlick Fresnel.
        let wh = (wo + wi).normalize();
        let v_o_h = wi.dot(wh).abs().max(1e-6);
        let d = self.pdf_wh(wh);
        let fresnel = self.specular + (1.0 - self.specular) * schlick_weight(v_o_h);
        let rs = d / (v_o_h * n_o_i.max(n_o_v).max(1e-6) * 4.0) * fresnel;

        (rd + Spectrum::splat(rs)) * n_o_i
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let wi = if canonical(rng) < 0.5 {
            let mut wi = cosine_sample_hemisphere(u.x, u.y);
            if !pointing_up(wo) {
                wi.y = -wi.y;
            }
            wi
        } else {
            let mut wh = self.sample_wh(u.x, u.y);
            if !pointing_up(wo) {
                wh.y = -wh.y;
            }
            let wi = reflect(wo, wh);
            if !same_hemisphere(wo, wi) {
                return BxdfSample::rejected();
            }
            wi
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
        let wh = (wo + wi).normalize();
        let pdf_spec = self.pdf_wh(wh) / (4.0 * wo.dot(wh).abs()).max(1e-8);
        0.5 * (abs_cos_theta(wi) * INV_PI + pdf_spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::testing::{check_pdf_consistency, check_sampling_coverage, TestConfig};

    #[test]
    fn test_ashikhmin_pdf_consistency() {
        let a = AshikhminShirley::new(Spectrum::splat(0.7), 0.3, 0.4, 0.4);
        check_pdf_consistency(&a, &TestConfig::default());
        check_sampling_coverage(&a, &TestConfig::default());
    }

    #[test]
    fn test_ashikhmin_anisotropy() {
        let a = AshikhminShirley::new(Spectrum::splat(0.5), 0.5, 0.2, 0.8);
        let wo = Vec3::new(0.0, 0.8, 0.6).normalize();
        let wi_x = Vec3::new(0.6, 0.8, 0.0).normalize();
        let wi_z = Vec3::new(0.0, 0.8, -0.6).normalize();
        assert!((a.f(wo, wi_x) - a.f(wo, wi_z)).abs().max_element() > 1e-5);
    }
}
