//! Layered lobes: a clear coating over a base, and a double-sided wrapper.

use ember_core::Spectrum;
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::fresnel::Fresnel;
use super::microfacet::{Distribution, MicrofacetReflection, VisTerm};
use super::{
    abs_cos_theta, canonical, list_f, list_pdf, list_sample, pointing_up, Bxdf, BxdfSample,
    BxdfType, WeightedLobe,
};

/// A smooth-ish dielectric coating over an arbitrary base lobe list.
///
/// Light either reflects off the coating or passes through it twice,
/// attenuated by Beer-Lambert absorption along both path legs.
pub struct Coat {
    coating: MicrofacetReflection,
    base: Vec<WeightedLobe>,
    thickness: f32,
    sigma: Spectrum,
}

impl Coat {
    pub fn new(
        base: Vec<WeightedLobe>,
        thickness: f32,
        ior: f32,
        sigma: Spectrum,
        roughness: f32,
    ) -> Self {
        Self {
            coating: MicrofacetReflection::new(
                Spectrum::ONE,
                Fresnel::Dielectric {
                    eta_i: 1.0,
                    eta_t: ior.max(1.0),
                },
                Distribution::ggx(roughness, roughness),
                VisTerm::Smith { roughness },
            ),
            base,
            thickness: thickness.max(0.0),
            sigma,
        }
    }

    /// Absorption along both legs of the path through the coating.
    fn attenuation(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        let cos_o = abs_cos_theta(wo).max(1e-4);
        let cos_i = abs_cos_theta(wi).max(1e-4);
        let path = self.thickness * (1.0 / cos_o + 1.0 / cos_i);
        Spectrum::new(
            (-self.sigma.x * path).exp(),
            (-self.sigma.y * path).exp(),
            (-self.sigma.z * path).exp(),
        )
    }
}

impl Clone for Coat {
    fn clone(&self) -> Self {
        Self {
            coating: self.coating.clone(),
            base: self.base.to_vec(),
            thickness: self.thickness,
            sigma: self.sigma,
        }
    }
}

impl Bxdf for Coat {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION
            .union(BxdfType::GLOSSY)
            .union(BxdfType::DIFFUSE)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        let coat = self.coating.f(wo, wi);
        let base = list_f(&self.base, wo, wi) * self.attenuation(wo, wi);
        coat + base
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let wi = if canonical(rng) < 0.5 {
            let s = self.coating.sample_f(wo, u, rng);
            if s.pdf == 0.0 {
                return BxdfSample::rejected();
            }
            s.wi
        } else {
            let s = list_sample(&self.base, wo, u, rng);
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
        0.5 * self.coating.pdf(wo, wi) + 0.5 * list_pdf(&self.base, wo, wi)
    }
}

/// Different materials on the two sides of a surface.
///
/// The side `wo` arrives from picks the active lobe list; the back side is
/// evaluated in its own flipped frame.
pub struct DoubleSided {
    front: Vec<WeightedLobe>,
    back: Vec<WeightedLobe>,
}

impl DoubleSided {
    pub fn new(front: Vec<WeightedLobe>, back: Vec<WeightedLobe>) -> Self {
        Self { front, back }
    }
}

impl Clone for DoubleSided {
    fn clone(&self) -> Self {
        Self {
            front: self.front.to_vec(),
            back: self.back.to_vec(),
        }
    }
}

impl Bxdf for DoubleSided {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION
            .union(BxdfType::DIFFUSE)
            .union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if pointing_up(wo) {
            list_f(&self.front, wo, wi)
        } else {
            list_f(&self.back, -wo, -wi)
        }
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        if pointing_up(wo) {
            let s = list_sample(&self.front, wo, u, rng);
            return s;
        }
        let s = list_sample(&self.back, -wo, u, rng);
        if s.pdf == 0.0 {
            return BxdfSample::rejected();
        }
        BxdfSample {
            wi: -s.wi,
            pdf: s.pdf,
            f: s.f,
        }
    }

    fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        if pointing_up(wo) {
            list_pdf(&self.front, wo, wi)
        } else {
            list_pdf(&self.back, -wo, -wi)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::lambert::Lambert;
    use crate::bxdf::testing::{check_pdf_consistency, TestConfig};
    use crate::bxdf::Lobe;

    fn white_base() -> Vec<WeightedLobe> {
        vec![WeightedLobe {
            weight: Spectrum::ONE,
            lobe: Lobe::Lambert(Lambert::new(Spectrum::ONE)),
        }]
    }

    #[test]
    fn test_coat_attenuates_base() {
        let thin = Coat::new(white_base(), 0.1, 1.5, Spectrum::splat(0.5), 0.2);
        let thick = Coat::new(white_base(), 2.0, 1.5, Spectrum::splat(0.5), 0.2);
        let wo = Vec3::new(0.2, 0.9, 0.1).normalize();
        let wi = Vec3::new(-0.3, 0.8, 0.2).normalize();
        assert!(thin.f(wo, wi).x > thick.f(wo, wi).x);
    }

    #[test]
    fn test_coat_pdf_consistency() {
        let coat = Coat::new(white_base(), 0.5, 1.5, Spectrum::splat(0.2), 0.3);
        check_pdf_consistency(&coat, &TestConfig::default());
    }

    #[test]
    fn test_double_sided_dispatch() {
        let ds = DoubleSided::new(
            vec![WeightedLobe {
                weight: Spectrum::ONE,
                lobe: Lobe::Lambert(Lambert::new(Spectrum::X)),
            }],
            vec![WeightedLobe {
                weight: Spectrum::ONE,
                lobe: Lobe::Lambert(Lambert::new(Spectrum::Z)),
            }],
        );
        let up = Vec3::new(0.1, 0.9, 0.1).normalize();
        let down = -up;
        // Front side reflects red, back side blue.
        assert!(ds.f(up, Vec3::new(-0.2, 0.9, 0.0).normalize()).x > 0.0);
        assert!(ds.f(down, Vec3::new(-0.2, -0.9, 0.0).normalize()).z > 0.0);
        check_pdf_consistency(&ds, &TestConfig::default());
    }
}
