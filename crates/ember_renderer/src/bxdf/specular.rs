//! Perfect specular lobes: mirror reflection and smooth dielectric glass.
//!
//! Delta distributions: `f` and `pdf` are zero for any concrete direction
//! pair; the full weight travels through `sample_f` with a pdf of one (or
//! the lobe-selection probability for glass).

use ember_core::Spectrum;
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::fresnel::dielectric;
use super::{canonical, cos_theta, Bxdf, BxdfSample, BxdfType};

/// Ideal mirror.
#[derive(Debug, Clone)]
pub struct Mirror {
    pub reflectance: Spectrum,
}

impl Mirror {
    pub fn new(reflectance: Spectrum) -> Self {
        Self { reflectance }
    }
}

impl Bxdf for Mirror {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION.union(BxdfType::SPECULAR)
    }

    fn f(&self, _wo: Vec3, _wi: Vec3) -> Spectrum {
        Spectrum::ZERO
    }

    fn sample_f(&self, wo: Vec3, _u: Vec2, _rng: &mut dyn RngCore) -> BxdfSample {
        let wi = Vec3::new(-wo.x, wo.y, -wo.z);
        BxdfSample {
            wi,
            pdf: 1.0,
            f: self.reflectance,
        }
    }

    fn pdf(&self, _wo: Vec3, _wi: Vec3) -> f32 {
        0.0
    }
}

/// Smooth glass: Fresnel-weighted choice between delta reflection and delta
/// refraction.
#[derive(Debug, Clone)]
pub struct Dielectric {
    pub reflectance: Spectrum,
    pub transmittance: Spectrum,
    pub eta_i: f32,
    pub eta_t: f32,
}

impl Dielectric {
    pub fn new(reflectance: Spectrum, transmittance: Spectrum, eta_i: f32, eta_t: f32) -> Self {
        Self {
            reflectance,
            transmittance,
            eta_i,
            eta_t,
        }
    }
}

impl Bxdf for Dielectric {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION
            .union(BxdfType::TRANSMISSION)
            .union(BxdfType::SPECULAR)
    }

    fn f(&self, _wo: Vec3, _wi: Vec3) -> Spectrum {
        Spectrum::ZERO
    }

    fn sample_f(&self, wo: Vec3, _u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let fr = dielectric(cos_theta(wo), self.eta_i, self.eta_t);
        if canonical(rng) < fr {
            // Reflect; pdf is the selection probability so the Fresnel
            // factor cancels from the throughput.
            BxdfSample {
                wi: Vec3::new(-wo.x, wo.y, -wo.z),
                pdf: fr,
                f: self.reflectance * fr,
            }
        } else {
            let entering = cos_theta(wo) > 0.0;
            let (ei, et) = if entering {
                (self.eta_i, self.eta_t)
            } else {
                (self.eta_t, self.eta_i)
            };
            let eta = ei / et;
            let cos_i = cos_theta(wo).abs();
            let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
            if sin2_t >= 1.0 {
                // Fresnel said refract but the geometry disagrees; only
                // possible through float round-off at the critical angle.
                return BxdfSample::rejected();
            }
            let cos_t = (1.0 - sin2_t).sqrt();
            let sign = if entering { -1.0 } else { 1.0 };
            let wi = Vec3::new(-wo.x * eta, sign * cos_t, -wo.z * eta).normalize();

            // Radiance scales by the squared relative IOR on refraction.
            let scale = eta * eta;
            BxdfSample {
                wi,
                pdf: 1.0 - fr,
                f: self.transmittance * (1.0 - fr) * scale,
            }
        }
    }

    fn pdf(&self, _wo: Vec3, _wi: Vec3) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mirror_reflects_about_normal() {
        let mirror = Mirror::new(Spectrum::ONE);
        let wo = Vec3::new(0.6, 0.8, 0.0).normalize();
        let mut rng = StdRng::seed_from_u64(0);
        let s = mirror.sample_f(wo, Vec2::ZERO, &mut rng);
        assert!((s.wi - Vec3::new(-0.6, 0.8, 0.0).normalize()).length() < 1e-5);
        assert_eq!(s.pdf, 1.0);
        assert_eq!(mirror.pdf(wo, s.wi), 0.0);
    }

    #[test]
    fn test_dielectric_throughput_conserves() {
        // Averaged over the reflect/refract choice, a lossless interface
        // transmits all energy: E[f/pdf] = 1.
        let glass = Dielectric::new(Spectrum::ONE, Spectrum::ONE, 1.0, 1.5);
        let wo = Vec3::new(0.3, 0.9, 0.1).normalize();
        let mut rng = StdRng::seed_from_u64(7);
        let mut total = Spectrum::ZERO;
        let n = 20_000;
        for _ in 0..n {
            let s = glass.sample_f(wo, Vec2::ZERO, &mut rng);
            if s.pdf > 0.0 {
                // Undo the radiance compression for the energy audit.
                let compensate = if s.wi.y * wo.y < 0.0 {
                    let eta = if wo.y > 0.0 { 1.0 / 1.5 } else { 1.5 };
                    1.0 / (eta * eta)
                } else {
                    1.0
                };
                total += s.f / s.pdf * compensate;
            }
        }
        let avg = total / n as f32;
        assert!((avg.x - 1.0).abs() < 0.02, "glass throughput {avg:?}");
    }

    #[test]
    fn test_dielectric_snell() {
        let glass = Dielectric::new(Spectrum::ONE, Spectrum::ONE, 1.0, 1.5);
        let wo = Vec3::new(0.5, 0.866, 0.0).normalize();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..64 {
            let s = glass.sample_f(wo, Vec2::ZERO, &mut rng);
            if s.wi.y < 0.0 {
                // Refracted: sin_t = sin_i / 1.5.
                let sin_i = wo.x;
                let sin_t = (s.wi.x * s.wi.x + s.wi.z * s.wi.z).sqrt();
                assert!((sin_t - sin_i / 1.5).abs() < 1e-4);
                return;
            }
        }
        panic!("no refraction sampled in 64 draws");
    }
}
