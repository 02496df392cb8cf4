//! Disney principled BRDF.
//!
//! Layered composite over diffuse, retro-reflection, sheen, anisotropic
//! specular GGX, clearcoat, specular transmission and thin-surface diffuse
//! transmission. One lobe is chosen proportionally to its approximate
//! contribution and the reported PDF is the mixture over all lobes with the
//! same weights; this is what keeps multi-lobe samples energy-consistent.

use ember_core::spectrum::luminance;
use ember_core::Spectrum;
use ember_math::sampling::{cosine_hemisphere_pdf, cosine_sample_hemisphere, INV_PI};
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::fresnel::Fresnel;
use super::lambert::LambertTransmission;
use super::microfacet::{Distribution, MicrofacetReflection, MicrofacetRefraction, VisTerm};
use super::{
    canonical, cos_theta, pointing_up, reflect, schlick_r0_from_eta, schlick_weight, Bxdf,
    BxdfSample, BxdfType,
};

// Index of refraction above and below the surface is fixed by the model.
const IOR_IN: f32 = 1.5;
const IOR_EX: f32 = 1.0;
const ETA: f32 = IOR_EX / IOR_IN;
const INV_ETA: f32 = 1.0 / ETA;

#[derive(Debug, Clone)]
pub struct Disney {
    pub base_color: Spectrum,
    pub metallic: f32,
    pub roughness: f32,
    pub specular: f32,
    pub specular_tint: f32,
    pub anisotropic: f32,
    pub sheen: f32,
    pub sheen_tint: f32,
    pub clearcoat: f32,
    pub clearcoat_gloss: f32,
    pub spec_trans: f32,
    pub flatness: f32,
    pub diff_trans: f32,
    pub scatter_distance: Spectrum,
    pub thin_surface: bool,
}

/// Per-lobe selection weights derived from the approximate contributions.
struct LobeWeights {
    clearcoat: f32,
    spec_reflect: f32,
    spec_trans: f32,
    diff_reflect: f32,
    diff_trans: f32,
    total: f32,
}

impl Disney {
    fn aspect(&self) -> f32 {
        (1.0 - self.anisotropic * 0.9).sqrt().sqrt()
    }

    fn tint(&self) -> Spectrum {
        let lum = luminance(self.base_color);
        if lum > 0.0 {
            self.base_color / lum
        } else {
            Spectrum::ONE
        }
    }

    fn cspec0(&self) -> Spectrum {
        let min_specular = schlick_r0_from_eta(IOR_EX / IOR_IN);
        let tinted = Spectrum::ONE.lerp(self.tint(), self.specular_tint);
        let dielectric = tinted * (self.specular * min_specular);
        dielectric.lerp(self.base_color, self.metallic)
    }

    fn specular_distribution(&self) -> Distribution {
        let aspect = self.aspect();
        Distribution::ggx(self.roughness / aspect, self.roughness * aspect)
    }

    fn clearcoat_distribution(&self) -> Distribution {
        let alpha = (0.1 + (0.001 - 0.1) * self.clearcoat_gloss).sqrt();
        Distribution::clearcoat(alpha)
    }

    /// Transmission distribution; thin surfaces scale roughness by the IOR.
    fn transmission_distribution(&self) -> Distribution {
        if self.thin_surface {
            let rscaled = (0.65 * INV_ETA - 0.35) * self.roughness;
            let aspect = self.aspect();
            Distribution::ggx(rscaled * rscaled / aspect, rscaled * rscaled * aspect)
        } else {
            self.specular_distribution()
        }
    }

    fn refraction(&self, transmittance: Spectrum) -> MicrofacetRefraction {
        MicrofacetRefraction::new(
            transmittance,
            self.transmission_distribution(),
            IOR_IN,
            IOR_EX,
        )
        .with_vis(VisTerm::Smith {
            roughness: self.roughness,
        })
    }

    fn weights(&self) -> LobeWeights {
        let base = luminance(self.base_color);
        let clearcoat = self.clearcoat * 0.04;
        let spec_reflect = luminance(self.cspec0()) * self.metallic;
        let spec_trans = base * (1.0 - self.metallic) * self.spec_trans;
        let diff_base = base * (1.0 - self.metallic) * (1.0 - self.spec_trans);
        let diff_reflect = diff_base
            * if self.thin_surface {
                1.0 - self.diff_trans
            } else {
                1.0
            };
        let diff_trans = if self.thin_surface {
            diff_base * self.diff_trans
        } else {
            0.0
        };
        LobeWeights {
            clearcoat,
            spec_reflect,
            spec_trans,
            diff_reflect,
            diff_trans,
            total: clearcoat + spec_reflect + spec_trans + diff_reflect + diff_trans,
        }
    }
}

impl Bxdf for Disney {
    fn bxdf_type(&self) -> BxdfType {
        let mut t = BxdfType::REFLECTION
            .union(BxdfType::DIFFUSE)
            .union(BxdfType::GLOSSY);
        if self.spec_trans > 0.0 || (self.thin_surface && self.diff_trans > 0.0) {
            t = t.union(BxdfType::TRANSMISSION);
        }
        t
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        let diffuse_weight = (1.0 - self.metallic) * (1.0 - self.spec_trans);

        let half = wo + wi;
        let wh = if half.length_squared() > 1e-12 {
            half.normalize()
        } else {
            Vec3::Y
        };
        let h_o_o = wo.dot(wh);
        let h_o_o2_by_roughness = h_o_o * h_o_o * self.roughness;

        let evaluate_reflection = pointing_up(wo) && pointing_up(wi);

        let mut ret = Spectrum::ZERO;

        if diffuse_weight > 0.0 {
            let n_o_o = cos_theta(wo);
            let n_o_i = cos_theta(wi);
            let clamped_n_o_i = n_o_i.clamp(0.0, 1.0);
            let f_o = schlick_weight(n_o_o);
            let f_i = schlick_weight(n_o_i);

            if self.thin_surface {
                if evaluate_reflection {
                    if self.flatness < 1.0 {
                        let dd = self.base_color
                            * (INV_PI * (1.0 - f_o * 0.5) * (1.0 - f_i * 0.5));
                        ret += diffuse_weight
                            * (1.0 - self.flatness)
                            * (1.0 - self.diff_trans)
                            * dd
                            * clamped_n_o_i;
                    }
                    if self.flatness > 0.0 && n_o_o + n_o_i > 1e-6 {
                        // Hanrahan-Krueger approximation of an isotropic
                        // BSSRDF; the 1.25 scale roughly preserves albedo.
                        let fss90 = h_o_o2_by_roughness;
                        let fss = (1.0 + (fss90 - 1.0) * f_o) * (1.0 + (fss90 - 1.0) * f_i);
                        let fake_ss = self.base_color
                            * (1.25
                                * (fss * (1.0 / (n_o_o + n_o_i) - 0.5) + 0.5)
                                * INV_PI);
                        ret += diffuse_weight
                            * self.flatness
                            * (1.0 - self.diff_trans)
                            * fake_ss
                            * clamped_n_o_i;
                    }
                }
            } else if evaluate_reflection {
                // The scatter-distance branch (true subsurface transport)
                // falls back to the same diffuse term; see DESIGN.md.
                let dd =
                    self.base_color * (INV_PI * (1.0 - f_o * 0.5) * (1.0 - f_i * 0.5));
                ret += diffuse_weight * dd * clamped_n_o_i;
            }

            if evaluate_reflection {
                // Retro-reflection.
                let rr = 2.0 * h_o_o2_by_roughness;
                let frr = self.base_color
                    * (INV_PI * rr * (f_o + f_i + f_o * f_i * (rr - 1.0)));
                ret += diffuse_weight * frr * clamped_n_o_i;

                // Sheen compensates the energy the dielectric lobe loses to
                // missing microfacet inter-reflection.
                if self.sheen > 0.0 {
                    let csheen = Spectrum::ONE.lerp(self.tint(), self.sheen_tint);
                    let fh = schlick_weight(h_o_o);
                    ret += diffuse_weight * (fh * self.sheen) * csheen * clamped_n_o_i;
                }
            }
        }

        // Anisotropic specular reflection.
        let cspec0 = self.cspec0();
        if cspec0.max_element() > 0.0 && evaluate_reflection {
            let mf = MicrofacetReflection::new(
                Spectrum::ONE,
                Fresnel::Composite {
                    r0: cspec0,
                    eta_i: IOR_EX,
                    eta_t: IOR_IN,
                    metallic: self.metallic,
                },
                self.specular_distribution(),
                VisTerm::Smith {
                    roughness: self.roughness,
                },
            );
            ret += mf.f(wo, wi);
        }

        // Clearcoat layer on top of everything below.
        if self.clearcoat > 0.0 && evaluate_reflection {
            let mf = MicrofacetReflection::new(
                Spectrum::ONE,
                Fresnel::Schlick {
                    f0: Spectrum::splat(0.04),
                },
                self.clearcoat_distribution(),
                VisTerm::Smith { roughness: 0.5 },
            );
            ret += self.clearcoat * mf.f(wo, wi);
        }

        // Specular transmission.
        if self.spec_trans > 0.0 {
            let transmittance = if self.thin_surface {
                Spectrum::new(
                    self.base_color.x.sqrt(),
                    self.base_color.y.sqrt(),
                    self.base_color.z.sqrt(),
                )
            } else {
                self.base_color
            };
            let mr = self.refraction(transmittance);
            ret += self.spec_trans * (1.0 - self.metallic) * mr.f(wo, wi);
        }

        // Diffuse transmission, thin surfaces only.
        if self.thin_surface && self.diff_trans > 0.0 && diffuse_weight > 0.0 {
            let lt = LambertTransmission::new(self.base_color);
            ret += self.diff_trans * diffuse_weight * lt.f(wo, wi);
        }

        ret
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let w = self.weights();
        if w.total <= 0.0 {
            return BxdfSample::rejected();
        }

        let inv_total = 1.0 / w.total;
        let cc = w.clearcoat * inv_total;
        let sr = w.spec_reflect * inv_total + cc;
        let st = w.spec_trans * inv_total + sr;
        let dr = w.diff_reflect * inv_total + st;

        let r = canonical(rng);
        let wi = if r <= cc {
            let wh = self.clearcoat_distribution().sample_wh(u.x, u.y);
            reflect(wo, wh)
        } else if r <= sr {
            let wh = self.specular_distribution().sample_wh(u.x, u.y);
            reflect(wo, wh)
        } else if r <= st {
            let mr = self.refraction(Spectrum::ONE);
            let s = mr.sample_f(wo, u, rng);
            if s.pdf == 0.0 {
                // Total internal reflection: standard rejection path.
                return BxdfSample::rejected();
            }
            s.wi
        } else if r <= dr {
            cosine_sample_hemisphere(u.x, u.y)
        } else {
            let lt = LambertTransmission::new(self.base_color);
            lt.sample_f(wo, u, rng).wi
        };

        BxdfSample {
            wi,
            pdf: self.pdf(wo, wi),
            f: self.f(wo, wi),
        }
    }

    fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        let w = self.weights();
        if w.total <= 0.0 {
            return 0.0;
        }

        let half = wo + wi;
        let wh = if half.length_squared() > 1e-12 {
            half.normalize()
        } else {
            Vec3::Y
        };
        let a_o_h = wo.dot(wh).abs().max(1e-8);

        let mut total_pdf = 0.0;
        if w.clearcoat > 0.0 {
            total_pdf +=
                w.clearcoat * self.clearcoat_distribution().pdf_wh(wh) / (4.0 * a_o_h);
        }
        if w.spec_reflect > 0.0 {
            total_pdf +=
                w.spec_reflect * self.specular_distribution().pdf_wh(wh) / (4.0 * a_o_h);
        }
        if w.spec_trans > 0.0 {
            let mr = self.refraction(Spectrum::ONE);
            total_pdf += w.spec_trans * mr.pdf(wo, wi);
        }
        if w.diff_reflect > 0.0 {
            total_pdf += w.diff_reflect * cosine_hemisphere_pdf(wi);
        }
        if w.diff_trans > 0.0 {
            let lt = LambertTransmission::new(self.base_color);
            total_pdf += w.diff_trans * lt.pdf(wo, wi);
        }

        total_pdf / w.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::testing::{check_pdf_consistency, TestConfig};

    fn disney(metallic: f32, roughness: f32, clearcoat: f32) -> Disney {
        Disney {
            base_color: Spectrum::new(0.8, 0.6, 0.4),
            metallic,
            roughness,
            specular: 0.5,
            specular_tint: 0.0,
            anisotropic: 0.0,
            sheen: 0.3,
            sheen_tint: 0.5,
            clearcoat,
            clearcoat_gloss: 0.8,
            spec_trans: 0.0,
            flatness: 0.0,
            diff_trans: 0.0,
            scatter_distance: Spectrum::ZERO,
            thin_surface: false,
        }
    }

    #[test]
    fn test_disney_pdf_consistency_metallic() {
        // The mixture PDF must match the density the weighted one-sample
        // scheme actually draws from.
        let d = disney(0.8, 0.3, 0.5);
        check_pdf_consistency(&d, &TestConfig::default());
    }

    #[test]
    fn test_disney_pdf_consistency_diffuse() {
        let d = disney(0.0, 0.9, 0.0);
        check_pdf_consistency(&d, &TestConfig::default());
    }

    #[test]
    fn test_disney_thin_surface_transmits() {
        let mut d = disney(0.0, 0.5, 0.0);
        d.thin_surface = true;
        d.diff_trans = 0.5;
        let wo = Vec3::new(0.2, 0.9, 0.1).normalize();
        let wi = Vec3::new(0.1, -0.95, 0.2).normalize();
        assert!(d.f(wo, wi).max_element() > 0.0);
        assert!(d.pdf(wo, wi) > 0.0);
        check_pdf_consistency(&d, &TestConfig::default());
    }

    #[test]
    fn test_disney_anisotropy_breaks_symmetry() {
        let mut d = disney(1.0, 0.4, 0.0);
        d.anisotropic = 0.8;
        let wo = Vec3::new(0.0, 0.8, 0.6).normalize();
        // Two incident directions mirrored between tangent axes see
        // different lobes under anisotropy.
        let wi_x = Vec3::new(0.6, 0.8, 0.0).normalize();
        let wi_z = Vec3::new(0.0, 0.8, -0.6).normalize();
        let fx = d.f(wo, wi_x).max_element();
        let fz = d.f(wo, wi_z).max_element();
        assert!((fx - fz).abs() > 1e-4);
    }
}
