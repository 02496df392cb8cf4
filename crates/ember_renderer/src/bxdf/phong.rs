//! Modified Phong reflection with separate diffuse and specular weights.

use ember_core::spectrum::luminance;
use ember_core::Spectrum;
use ember_math::sampling::{cosine_sample_hemisphere, INV_PI, INV_TWO_PI, TWO_PI};
use ember_math::{Onb, Vec2, Vec3};
use rand::RngCore;

use super::{
    abs_cos_theta, canonical, pointing_up, same_hemisphere, Bxdf, BxdfSample, BxdfType,
};

#[derive(Debug, Clone)]
pub struct Phong {
    pub diffuse: Spectrum,
    pub specular: Spectrum,
    pub specular_power: f32,
}

impl Phong {
    pub fn new(diffuse: Spectrum, specular: Spectrum, specular_power: f32) -> Self {
        Self {
            diffuse,
            specular,
            specular_power: specular_power.max(1.0),
        }
    }

    fn diffuse_ratio(&self) -> f32 {
        let d = luminance(self.diffuse);
        let s = luminance(self.specular);
        if d + s == 0.0 {
            1.0
        } else {
            d / (d + s)
        }
    }

    /// Ideal mirror direction of `wo` about the local normal.
    fn mirror(wo: Vec3) -> Vec3 {
        Vec3::new(-wo.x, wo.y, -wo.z)
    }
}

impl Bxdf for Phong {
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
        let mut ret = self.diffuse * INV_PI;

        let cos_alpha = wi.dot(Self::mirror(wo)).max(0.0);
        if cos_alpha > 0.0 {
            let n = self.specular_power;
            ret += self.specular * ((n + 2.0) * INV_TWO_PI * cos_alpha.powf(n));
        }
        ret * n_o_i
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let wi = if canonical(rng) < self.diffuse_ratio() {
            let mut wi = cosine_sample_hemisphere(u.x, u.y);
            if !pointing_up(wo) {
                wi.y = -wi.y;
            }
            wi
        } else {
            // Power-cosine lobe around the mirror direction.
            let n = self.specular_power;
            let cos_alpha = u.x.powf(1.0 / (n + 1.0));
            let sin_alpha = (1.0 - cos_alpha * cos_alpha).max(0.0).sqrt();
            let phi = TWO_PI * u.y;
            let frame = Onb::from_normal(Self::mirror(wo));
            let wi = frame.to_world(Vec3::new(
                sin_alpha * phi.cos(),
                cos_alpha,
                sin_alpha * phi.sin(),
            ));
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
        let ratio = self.diffuse_ratio();
        let pdf_diffuse = abs_cos_theta(wi) * INV_PI;

        let n = self.specular_power;
        let cos_alpha = wi.dot(Self::mirror(wo)).max(0.0);
        let pdf_specular = (n + 1.0) * INV_TWO_PI * cos_alpha.powf(n);

        ratio * pdf_diffuse + (1.0 - ratio) * pdf_specular
    }
}
