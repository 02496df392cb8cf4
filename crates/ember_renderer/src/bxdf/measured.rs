//! Data-driven lobes: measured MERL tables and Fourier series BRDFs.
//!
//! Both evaluate tabulated data and fall back to cosine-weighted sampling,
//! which keeps the sampler/PDF pair trivially consistent regardless of the
//! table contents.

use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

use ember_core::material::{FourierTable, MerlTable};
use ember_core::Spectrum;
use ember_math::sampling::{cosine_sample_hemisphere, INV_PI};
use ember_math::{Onb, Vec2, Vec3};
use rand::RngCore;

use super::{abs_cos_theta, pointing_up, same_hemisphere, Bxdf, BxdfSample, BxdfType};

/// Measured isotropic BRDF in the half/difference-angle parameterization.
#[derive(Clone)]
pub struct MerlBrdf {
    table: Arc<MerlTable>,
}

impl MerlBrdf {
    pub fn new(table: Arc<MerlTable>) -> Self {
        Self { table }
    }

    /// Table lookup with the measurement grid's square-root mapping on the
    /// half angle.
    fn lookup(&self, theta_h: f32, theta_d: f32, phi_d: f32) -> Spectrum {
        let res_h = MerlTable::RES_THETA_H;
        let res_d = MerlTable::RES_THETA_D;
        let res_p = MerlTable::RES_PHI_D;

        let ih = ((theta_h / FRAC_PI_2).max(0.0).sqrt() * res_h as f32) as usize;
        let ih = ih.min(res_h - 1);
        let id = ((theta_d / FRAC_PI_2) * res_d as f32) as usize;
        let id = id.min(res_d - 1);
        let mut phi = phi_d;
        if phi < 0.0 {
            phi += PI;
        }
        let ip = ((phi / PI) * res_p as f32) as usize;
        let ip = ip.min(res_p - 1);

        let idx = (ih * res_d + id) * res_p + ip;
        let n = res_h * res_d * res_p;
        if self.table.data.len() < 3 * n {
            return Spectrum::ZERO;
        }
        Spectrum::new(
            (self.table.data[idx] * MerlTable::SCALE[0]).max(0.0),
            (self.table.data[idx + n] * MerlTable::SCALE[1]).max(0.0),
            (self.table.data[idx + 2 * n] * MerlTable::SCALE[2]).max(0.0),
        )
    }
}

impl Bxdf for MerlBrdf {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION.union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if !same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        let wh = (wo + wi).normalize();
        let theta_h = wh.y.clamp(-1.0, 1.0).acos();

        // Difference angles: wi expressed in the frame of the half vector.
        let frame = Onb::from_normal(wh);
        let wd = frame.to_local(wi);
        let theta_d = wd.y.clamp(-1.0, 1.0).acos();
        let phi_d = wd.z.atan2(wd.x);

        self.lookup(theta_h, theta_d, phi_d) * abs_cos_theta(wi)
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

/// Isotropic Fourier BRDF: an azimuthal cosine series per zenith bin pair.
#[derive(Clone)]
pub struct FourierBrdf {
    table: Arc<FourierTable>,
}

impl FourierBrdf {
    pub fn new(table: Arc<FourierTable>) -> Self {
        Self { table }
    }

    fn series(&self, bin_i: usize, bin_o: usize, cos_phi_d: f32) -> f32 {
        let pair = bin_i * self.table.mu.len() + bin_o;
        let (Some(&order), Some(&offset)) =
            (self.table.orders.get(pair), self.table.offsets.get(pair))
        else {
            return 0.0;
        };

        // Evaluate sum(a_k cos(k phi)) by the cosine recurrence.
        let mut value = 0.0;
        let mut cos_k_minus_one = cos_phi_d;
        let mut cos_k = 1.0;
        for k in 0..order as usize {
            let Some(&a) = self.table.coeffs.get(offset as usize + k) else {
                break;
            };
            value += a * cos_k;
            let next = 2.0 * cos_phi_d * cos_k - cos_k_minus_one;
            cos_k_minus_one = cos_k;
            cos_k = next;
        }
        value.max(0.0)
    }
}

impl Bxdf for FourierBrdf {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION.union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if !same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        if self.table.mu.is_empty() {
            return Spectrum::ZERO;
        }
        let bin_i = self.table.bin(abs_cos_theta(wi));
        let bin_o = self.table.bin(abs_cos_theta(wo));

        // Azimuth difference between the two directions.
        let phi_i = wi.z.atan2(wi.x);
        let phi_o = wo.z.atan2(wo.x);
        let value = self.series(bin_i, bin_o, (phi_i - phi_o).cos());

        Spectrum::splat(value) * abs_cos_theta(wi)
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
    use crate::bxdf::testing::{check_pdf_consistency, check_sampling_coverage, TestConfig};

    fn flat_merl(value: f32) -> MerlBrdf {
        // A constant table: every cell holds value / scale so the lookup
        // returns exactly `value` per channel.
        let n = MerlTable::RES_THETA_H * MerlTable::RES_THETA_D * MerlTable::RES_PHI_D;
        let mut data = vec![0.0f32; 3 * n];
        for c in 0..3 {
            for i in 0..n {
                data[c * n + i] = value / MerlTable::SCALE[c];
            }
        }
        MerlBrdf::new(Arc::new(MerlTable { data }))
    }

    #[test]
    fn test_merl_constant_table_is_lambertian() {
        let brdf = flat_merl(INV_PI * 0.5);
        let wo = Vec3::new(0.3, 0.8, 0.2).normalize();
        let wi = Vec3::new(-0.2, 0.9, 0.1).normalize();
        let f = brdf.f(wo, wi);
        let expected = INV_PI * 0.5 * wi.normalize().y;
        assert!((f.x - expected).abs() < 1e-4);
        check_pdf_consistency(&brdf, &TestConfig::default());
        check_sampling_coverage(&brdf, &TestConfig::default());
    }

    #[test]
    fn test_fourier_constant_term() {
        // A single order-one series with coefficient a0 acts like a
        // constant-albedo lobe.
        let table = FourierTable {
            mu: vec![0.5, 1.0],
            orders: vec![1; 4],
            offsets: vec![0, 1, 2, 3],
            coeffs: vec![0.25; 4],
        };
        let brdf = FourierBrdf::new(Arc::new(table));
        let wo = Vec3::new(0.1, 0.9, 0.2).normalize();
        let wi = Vec3::new(0.4, 0.7, -0.1).normalize();
        let f = brdf.f(wo, wi);
        assert!((f.x - 0.25 * wi.y).abs() < 1e-4);
        check_pdf_consistency(&brdf, &TestConfig::default());
    }
}
