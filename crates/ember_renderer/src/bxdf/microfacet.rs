//! Torrance-Sparrow microfacet reflection and refraction.
//!
//! The normal distribution, geometric visibility term and Fresnel model are
//! all pluggable. Visibility terms fold the `1 / (4 cos_i cos_o)` of the
//! Torrance-Sparrow denominator into themselves, so the lobe value is
//! `R * D * F * Vis` with the incident cosine applied on top.

use std::f32::consts::PI;

use ember_core::Spectrum;
use ember_math::sampling::{spherical_direction, INV_TWO_PI, TWO_PI};
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::fresnel::Fresnel;
use super::{abs_cos_theta, cos_theta, reflect, same_hemisphere, Bxdf, BxdfSample, BxdfType};

/// Microfacet normal distributions.
///
/// Roughness-to-alpha mappings follow the constructors; `sample_wh` draws a
/// half vector with density `d(wh) * |cos theta_h|` in solid angle.
#[derive(Debug, Clone, Copy)]
pub enum Distribution {
    Blinn { exp: f32 },
    Beckmann { alpha: f32 },
    Ggx { alpha_u: f32, alpha_v: f32 },
    /// The clearcoat distribution with its analytic log normalization.
    Clearcoat { alpha2: f32 },
}

impl Distribution {
    pub fn blinn(roughness: f32) -> Self {
        let r = roughness.clamp(1e-2, 1.0);
        Self::Blinn {
            exp: 2.0 / (r * r * r * r) - 2.0,
        }
    }

    pub fn beckmann(roughness: f32) -> Self {
        let r = roughness.clamp(1e-3, 1.0);
        Self::Beckmann { alpha: r * r }
    }

    pub fn ggx(roughness_u: f32, roughness_v: f32) -> Self {
        let ru = roughness_u.clamp(1e-3, 1.0);
        let rv = roughness_v.clamp(1e-3, 1.0);
        Self::Ggx {
            alpha_u: ru * ru,
            alpha_v: rv * rv,
        }
    }

    /// Clearcoat roughness is already an alpha; it stays well below one by
    /// construction of the gloss mapping.
    pub fn clearcoat(alpha: f32) -> Self {
        let a = alpha.clamp(1e-3, 0.999);
        Self::Clearcoat { alpha2: a * a }
    }

    /// Distribution value for a half vector in the local frame.
    pub fn d(&self, h: Vec3) -> f32 {
        let cos_h = abs_cos_theta(h);
        if cos_h == 0.0 {
            return 0.0;
        }
        match *self {
            Distribution::Blinn { exp } => (exp + 2.0) * INV_TWO_PI * cos_h.powf(exp),
            Distribution::Beckmann { alpha } => {
                let a2 = alpha * alpha;
                let cos2 = cos_h * cos_h;
                ((cos2 - 1.0) / (a2 * cos2)).exp() / (PI * a2 * cos2 * cos2)
            }
            Distribution::Ggx { alpha_u, alpha_v } => {
                let base = (h.x / alpha_u) * (h.x / alpha_u)
                    + (h.z / alpha_v) * (h.z / alpha_v)
                    + h.y * h.y;
                1.0 / (PI * alpha_u * alpha_v * base * base)
            }
            Distribution::Clearcoat { alpha2 } => {
                (alpha2 - 1.0) / (PI * alpha2.ln() * (1.0 + (alpha2 - 1.0) * cos_h * cos_h))
            }
        }
    }

    /// Draw a half vector with density `d(wh) |cos wh|`.
    pub fn sample_wh(&self, u: f32, v: f32) -> Vec3 {
        match *self {
            Distribution::Blinn { exp } => {
                let cos_theta = u.powf(1.0 / (exp + 2.0));
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let phi = TWO_PI * v;
                Vec3::new(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
            }
            Distribution::Beckmann { alpha } => {
                let tan2 = -alpha * alpha * (1.0 - u).max(1e-8).ln();
                let phi = TWO_PI * v;
                spherical_direction(tan2.sqrt().atan(), phi)
            }
            Distribution::Ggx { alpha_u, alpha_v } => {
                let (phi, tan2) = if alpha_u == alpha_v {
                    (TWO_PI * u, alpha_u * alpha_u * v / (1.0 - v).max(1e-8))
                } else {
                    let mut phi =
                        (alpha_v / alpha_u * (TWO_PI * u + 0.5 * PI).tan()).atan();
                    if u > 0.5 {
                        phi += PI;
                    }
                    let (sin_phi, cos_phi) = phi.sin_cos();
                    let a2 = 1.0
                        / (cos_phi * cos_phi / (alpha_u * alpha_u)
                            + sin_phi * sin_phi / (alpha_v * alpha_v));
                    (phi, a2 * v / (1.0 - v).max(1e-8))
                };
                let cos_theta = 1.0 / (1.0 + tan2).sqrt();
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                Vec3::new(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
            }
            Distribution::Clearcoat { alpha2 } => {
                let phi = TWO_PI * u;
                let cos2 = ((alpha2.ln() * v).exp() - 1.0) / (alpha2 - 1.0);
                let cos_theta = cos2.clamp(0.0, 1.0).sqrt();
                let sin_theta = (1.0 - cos2).max(0.0).sqrt();
                Vec3::new(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
            }
        }
    }

    /// Density of `sample_wh` in solid angle.
    #[inline]
    pub fn pdf_wh(&self, h: Vec3) -> f32 {
        self.d(h) * abs_cos_theta(h)
    }
}

/// Geometric visibility terms, each including the Torrance-Sparrow
/// `1 / (4 cos_i cos_o)`.
#[derive(Debug, Clone, Copy)]
pub enum VisTerm {
    Implicit,
    Neumann,
    Kelemen,
    Schlick { roughness: f32 },
    Smith { roughness: f32 },
    SmithJointApprox { roughness: f32 },
    CookTorrance,
}

impl VisTerm {
    pub fn evaluate(&self, n_o_l: f32, n_o_v: f32, v_o_h: f32, n_o_h: f32) -> f32 {
        match *self {
            VisTerm::Implicit => 0.25,
            VisTerm::Neumann => 1.0 / (4.0 * n_o_l.max(n_o_v)).max(1e-8),
            VisTerm::Kelemen => 1.0 / (4.0 * v_o_h * v_o_h).max(1e-8),
            VisTerm::Schlick { roughness } => {
                let k = roughness * roughness * 0.5;
                let vis_v = n_o_v * (1.0 - k) + k;
                let vis_l = n_o_l * (1.0 - k) + k;
                0.25 / (vis_v * vis_l).max(1e-8)
            }
            VisTerm::Smith { roughness } => {
                let a = roughness * roughness;
                let a2 = a * a;
                let vis_v = n_o_v + (n_o_v * (n_o_v - n_o_v * a2) + a2).sqrt();
                let vis_l = n_o_l + (n_o_l * (n_o_l - n_o_l * a2) + a2).sqrt();
                1.0 / (vis_v * vis_l).max(1e-8)
            }
            VisTerm::SmithJointApprox { roughness } => {
                let a = roughness * roughness;
                let vis_v = n_o_l * (n_o_v * (1.0 - a) + a);
                let vis_l = n_o_v * (n_o_l * (1.0 - a) + a);
                0.5 / (vis_v + vis_l).max(1e-8)
            }
            VisTerm::CookTorrance => {
                let g = (2.0 * (n_o_h * n_o_v / v_o_h).min(n_o_h * n_o_l / v_o_h)).min(1.0);
                g / (4.0 * n_o_l * n_o_v).max(1e-8)
            }
        }
    }
}

/// Glossy reflection from a microfacet surface.
#[derive(Debug, Clone)]
pub struct MicrofacetReflection {
    pub reflectance: Spectrum,
    pub fresnel: Fresnel,
    pub distribution: Distribution,
    pub vis: VisTerm,
}

impl MicrofacetReflection {
    pub fn new(
        reflectance: Spectrum,
        fresnel: Fresnel,
        distribution: Distribution,
        vis: VisTerm,
    ) -> Self {
        Self {
            reflectance,
            fresnel,
            distribution,
            vis,
        }
    }
}

impl Bxdf for MicrofacetReflection {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION.union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if !same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        let n_o_l = abs_cos_theta(wi);
        let n_o_v = abs_cos_theta(wo);
        if n_o_l == 0.0 || n_o_v == 0.0 {
            return Spectrum::ZERO;
        }

        let wh = (wi + wo).normalize();
        let v_o_h = wi.dot(wh);
        let n_o_h = abs_cos_theta(wh);
        let f = self.fresnel.evaluate(v_o_h);

        self.reflectance
            * self.distribution.d(wh)
            * f
            * self.vis.evaluate(n_o_l, n_o_v, v_o_h.abs(), n_o_h)
            * n_o_l
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, _rng: &mut dyn RngCore) -> BxdfSample {
        let wh = self.distribution.sample_wh(u.x, u.y);
        let wi = reflect(wo, wh);
        if !same_hemisphere(wo, wi) {
            return BxdfSample::rejected();
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
        let wh = (wo + wi).normalize();
        self.distribution.pdf_wh(wh) / (4.0 * wo.dot(wh).abs()).max(1e-8)
    }
}

/// Glossy refraction through a rough dielectric interface.
///
/// Uses the generalized half vector `wh = normalize(wo + eta * wi)`; total
/// internal reflection during sampling reports a rejected sample with zero
/// spectrum and zero pdf.
#[derive(Debug, Clone)]
pub struct MicrofacetRefraction {
    pub transmittance: Spectrum,
    pub distribution: Distribution,
    pub vis: VisTerm,
    pub eta_in: f32,
    pub eta_ext: f32,
}

impl MicrofacetRefraction {
    pub fn new(
        transmittance: Spectrum,
        distribution: Distribution,
        eta_in: f32,
        eta_ext: f32,
    ) -> Self {
        Self {
            transmittance,
            distribution,
            vis: VisTerm::Smith { roughness: 0.5 },
            eta_in,
            eta_ext,
        }
    }

    pub fn with_vis(mut self, vis: VisTerm) -> Self {
        self.vis = vis;
        self
    }
}

impl Bxdf for MicrofacetRefraction {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::TRANSMISSION.union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        if same_hemisphere(wo, wi) {
            return Spectrum::ZERO;
        }
        let n_o_l = abs_cos_theta(wi);
        let n_o_v = abs_cos_theta(wo);
        if n_o_l == 0.0 || n_o_v == 0.0 {
            return Spectrum::ZERO;
        }

        let eta = if cos_theta(wo) > 0.0 {
            self.eta_in / self.eta_ext
        } else {
            self.eta_ext / self.eta_in
        };
        let mut wh = (wo + wi * eta).normalize();
        if wh.y < 0.0 {
            wh = -wh;
        }

        let n_o_h = abs_cos_theta(wh);
        let v_o_h = wo.dot(wh).abs();
        let fr = Fresnel::Dielectric {
            eta_i: self.eta_ext,
            eta_t: self.eta_in,
        }
        .evaluate(wo.dot(wh));

        let sqrt_denom = wo.dot(wh) + eta * wi.dot(wh);
        if sqrt_denom * sqrt_denom < 1e-10 {
            return Spectrum::ZERO;
        }

        (Spectrum::ONE - fr)
            * self.transmittance
            * self.distribution.d(wh)
            * self.vis.evaluate(n_o_l, n_o_v, v_o_h, n_o_h)
            * (eta * eta * wi.dot(wh).abs() * wo.dot(wh).abs() * 4.0
                / (sqrt_denom * sqrt_denom))
            * n_o_l
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, _rng: &mut dyn RngCore) -> BxdfSample {
        let wh = self.distribution.sample_wh(u.x, u.y);

        let cos_o = wo.dot(wh);
        let eta = if cos_o > 0.0 {
            self.eta_ext / self.eta_in
        } else {
            self.eta_in / self.eta_ext
        };
        let t = 1.0 - eta * eta * (1.0 - cos_o * cos_o);
        if t < 0.0 {
            // Total internal reflection.
            return BxdfSample::rejected();
        }

        let sign = if cos_o < 0.0 { 1.0 } else { -1.0 };
        let wi = (-wo * eta + (eta * cos_o + sign * t.sqrt()) * wh).normalize();
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
        let eta = if cos_theta(wo) > 0.0 {
            self.eta_in / self.eta_ext
        } else {
            self.eta_ext / self.eta_in
        };
        let mut wh = (wo + wi * eta).normalize();
        if wh.y < 0.0 {
            wh = -wh;
        }

        let sqrt_denom = wo.dot(wh) + eta * wi.dot(wh);
        if sqrt_denom * sqrt_denom < 1e-10 {
            return 0.0;
        }
        let dwh_dwi = eta * eta * wi.dot(wh).abs() / (sqrt_denom * sqrt_denom);
        self.distribution.pdf_wh(wh) * dwh_dwi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bxdf::testing::{check_all, check_energy_conservation, TestConfig};
    use ember_math::sampling::FOUR_PI;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_distributions_normalized() {
        // Monte Carlo check that D(h) cos(h) integrates to one over the
        // hemisphere for every distribution.
        let dists = [
            Distribution::blinn(0.6),
            Distribution::beckmann(0.5),
            Distribution::ggx(0.5, 0.5),
            Distribution::ggx(0.3, 0.7),
            Distribution::clearcoat(0.1),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        for dist in dists {
            let n = 400_000;
            let mut sum = 0.0f64;
            for _ in 0..n {
                let w = ember_math::sampling::uniform_sample_sphere(rng.random(), rng.random());
                if w.y <= 0.0 {
                    continue;
                }
                sum += (dist.d(w) * w.y) as f64 * FOUR_PI as f64;
            }
            let integral = sum / n as f64;
            assert!(
                (integral - 1.0).abs() < 0.05,
                "distribution {dist:?} integrates to {integral}"
            );
        }
    }

    #[test]
    fn test_sample_wh_matches_pdf_wh() {
        // E[1 / pdf_wh] over sampled half vectors recovers the hemisphere.
        let dist = Distribution::ggx(0.5, 0.5);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 200_000;
        let mut sum = 0.0f64;
        for _ in 0..n {
            let wh = dist.sample_wh(rng.random(), rng.random());
            let pdf = dist.pdf_wh(wh);
            if pdf > 0.0 {
                sum += 1.0 / pdf as f64;
            }
        }
        let measure = sum / n as f64;
        assert!((measure - TWO_PI as f64).abs() / (TWO_PI as f64) < 0.03);
    }

    #[test]
    fn test_ggx_reflection_properties() {
        // Conductor-backed GGX at alpha 0.5 obeys all three universal
        // properties.
        let mf = MicrofacetReflection::new(
            Spectrum::ONE,
            Fresnel::Conductor { eta: 1.0, k: 1.5 },
            Distribution::ggx(0.5, 0.5),
            VisTerm::Smith { roughness: 0.5 },
        );
        check_all(&mf, &TestConfig::default());
    }

    #[test]
    fn test_refraction_energy() {
        let mr = MicrofacetRefraction::new(
            Spectrum::ONE,
            Distribution::ggx(0.6, 0.6),
            1.5,
            1.0,
        );
        check_energy_conservation(&mr, &TestConfig::default());
    }

    #[test]
    fn test_refraction_opposite_hemisphere_only() {
        let mr = MicrofacetRefraction::new(
            Spectrum::ONE,
            Distribution::ggx(0.4, 0.4),
            1.5,
            1.0,
        );
        let wo = Vec3::new(0.2, 0.9, 0.1).normalize();
        let wi = Vec3::new(-0.1, 0.8, 0.2).normalize();
        assert_eq!(mr.f(wo, wi), Spectrum::ZERO);
        assert_eq!(mr.pdf(wo, wi), 0.0);
    }
}
