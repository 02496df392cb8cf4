//! Hair scattering.
//!
//! Longitudinal/azimuthal decomposition parameterized by absorption, the
//! longitudinal and azimuthal roughnesses and the fiber IOR. The fiber runs
//! along the local +X axis; the azimuth lives in the Y-Z plane. The model is
//! importance-sampled exactly, so with zero absorption the PDF equals the
//! lobe intensity - the furnace-test property the tests pin down.

use std::f32::consts::PI;

use ember_core::spectrum::luminance;
use ember_core::Spectrum;
use ember_math::sampling::TWO_PI;
use ember_math::{Vec2, Vec3};
use rand::RngCore;

use super::fresnel::dielectric;
use super::{canonical, Bxdf, BxdfSample, BxdfType};

/// Number of separately handled internal path segments; everything deeper is
/// folded into the last attenuation term.
const P_MAX: usize = 3;

const SQRT_PI_OVER_8: f32 = 0.626_657_07;

#[derive(Debug, Clone)]
pub struct Hair {
    sigma_a: Spectrum,
    eta: f32,
    /// Longitudinal variance per path segment.
    v: [f32; P_MAX + 1],
    /// Azimuthal logistic scale.
    s: f32,
}

impl Hair {
    pub fn new(sigma_a: Spectrum, beta_m: f32, beta_n: f32, eta: f32) -> Self {
        let bm = beta_m.clamp(0.0, 1.0);
        let bn = beta_n.clamp(0.0, 1.0);

        let v0 = (0.726 * bm + 0.812 * bm * bm + 3.7 * bm.powi(20)).powi(2);
        let v = [v0.max(1e-5), (0.25 * v0).max(1e-5), (4.0 * v0).max(1e-5), (4.0 * v0).max(1e-5)];

        let s = SQRT_PI_OVER_8 * (0.265 * bn + 1.194 * bn * bn + 5.372 * bn.powi(22));

        Self {
            sigma_a,
            eta,
            v,
            s: s.max(1e-4),
        }
    }

    /// Attenuation of each path segment: R, TT, TRT and the folded rest.
    fn ap(&self, cos_theta_o: f32) -> [Spectrum; P_MAX + 1] {
        let sin_theta_o = (1.0 - cos_theta_o * cos_theta_o).max(0.0).sqrt();
        let sin_theta_t = sin_theta_o / self.eta;
        let cos_theta_t = (1.0 - sin_theta_t * sin_theta_t).max(0.0).sqrt();

        let f = dielectric(cos_theta_o, 1.0, self.eta);
        let t = Spectrum::new(
            (-self.sigma_a.x * 2.0 / cos_theta_t.max(1e-4)).exp(),
            (-self.sigma_a.y * 2.0 / cos_theta_t.max(1e-4)).exp(),
            (-self.sigma_a.z * 2.0 / cos_theta_t.max(1e-4)).exp(),
        );

        let mut ap = [Spectrum::ZERO; P_MAX + 1];
        ap[0] = Spectrum::splat(f);
        ap[1] = t * ((1.0 - f) * (1.0 - f));
        ap[2] = ap[1] * t * f;
        // Geometric series for every deeper bounce.
        let denom = Spectrum::ONE - t * f;
        ap[3] = Spectrum::new(
            ap[2].x * f * t.x / denom.x.max(1e-5),
            ap[2].y * f * t.y / denom.y.max(1e-5),
            ap[2].z * f * t.z / denom.z.max(1e-5),
        );
        ap
    }

    fn ap_pdf(&self, cos_theta_o: f32) -> [f32; P_MAX + 1] {
        let ap = self.ap(cos_theta_o);
        let sum: f32 = ap.iter().map(|a| luminance(*a)).sum();
        let mut pdf = [0.0; P_MAX + 1];
        if sum > 0.0 {
            for (p, a) in ap.iter().enumerate() {
                pdf[p] = luminance(*a) / sum;
            }
        }
        pdf
    }

    /// Shared evaluation of value and pdf; they differ only in whether the
    /// attenuation is spectral or normalized.
    fn eval(&self, wo: Vec3, wi: Vec3) -> (Spectrum, f32) {
        let sin_theta_o = wo.x.clamp(-1.0, 1.0);
        let cos_theta_o = (1.0 - sin_theta_o * sin_theta_o).max(0.0).sqrt();
        let phi_o = wo.z.atan2(wo.y);

        let sin_theta_i = wi.x.clamp(-1.0, 1.0);
        let cos_theta_i = (1.0 - sin_theta_i * sin_theta_i).max(0.0).sqrt();
        let phi_i = wi.z.atan2(wi.y);

        let phi = phi_i - phi_o;
        let ap = self.ap(cos_theta_o);
        let ap_pdf = self.ap_pdf(cos_theta_o);

        let mut value = Spectrum::ZERO;
        let mut pdf = 0.0;
        for p in 0..P_MAX {
            let m = mp(cos_theta_i, cos_theta_o, sin_theta_i, sin_theta_o, self.v[p]);
            let n = trimmed_logistic(wrap_phi(phi - phi_fn(p)), self.s);
            value += ap[p] * (m * n);
            pdf += ap_pdf[p] * m * n;
        }
        let m_rest = mp(
            cos_theta_i,
            cos_theta_o,
            sin_theta_i,
            sin_theta_o,
            self.v[P_MAX],
        );
        value += ap[P_MAX] * (m_rest / TWO_PI);
        pdf += ap_pdf[P_MAX] * m_rest / TWO_PI;

        (value, pdf)
    }
}

impl Bxdf for Hair {
    fn bxdf_type(&self) -> BxdfType {
        BxdfType::REFLECTION
            .union(BxdfType::TRANSMISSION)
            .union(BxdfType::GLOSSY)
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        self.eval(wo, wi).0
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        let sin_theta_o = wo.x.clamp(-1.0, 1.0);
        let cos_theta_o = (1.0 - sin_theta_o * sin_theta_o).max(0.0).sqrt();
        let phi_o = wo.z.atan2(wo.y);

        // Pick the path segment by attenuation.
        let ap_pdf = self.ap_pdf(cos_theta_o);
        let mut p = P_MAX;
        let mut r = canonical(rng);
        for (i, w) in ap_pdf.iter().enumerate() {
            if r < *w {
                p = i;
                break;
            }
            r -= w;
        }

        // Longitudinal angle from the segment's variance.
        let v = self.v[p.min(2)];
        let u0 = u.x.max(1e-5);
        let cos_theta = 1.0 + v * (u0 + (1.0 - u0) * (-2.0 / v).exp()).ln();
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let cos_phi_l = (TWO_PI * u.y).cos();
        let sin_theta_i =
            (-cos_theta * sin_theta_o + sin_theta * cos_phi_l * cos_theta_o).clamp(-1.0, 1.0);
        let cos_theta_i = (1.0 - sin_theta_i * sin_theta_i).max(0.0).sqrt();

        // Azimuth from the trimmed logistic around the segment's offset.
        let u2 = canonical(rng);
        let dphi = if p < P_MAX {
            phi_fn(p) + sample_trimmed_logistic(u2, self.s)
        } else {
            TWO_PI * u2 - PI
        };

        let phi_i = phi_o + dphi;
        let wi = Vec3::new(
            sin_theta_i,
            cos_theta_i * phi_i.cos(),
            cos_theta_i * phi_i.sin(),
        );

        let (f, pdf) = self.eval(wo, wi);
        BxdfSample { wi, pdf, f }
    }

    fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        self.eval(wo, wi).1
    }
}

/// Azimuthal offset of path segment `p` for a centered fiber intersection.
#[inline]
fn phi_fn(p: usize) -> f32 {
    p as f32 * PI
}

/// Wrap an angle to [-pi, pi].
fn wrap_phi(mut phi: f32) -> f32 {
    while phi > PI {
        phi -= TWO_PI;
    }
    while phi < -PI {
        phi += TWO_PI;
    }
    phi
}

/// Modified Bessel function of the first kind, order zero.
fn bessel_i0(x: f32) -> f32 {
    let mut val = 0.0f32;
    let mut x2i = 1.0f32;
    let mut ifact = 1.0f32;
    let mut i4 = 1.0f32;
    for i in 0..10 {
        if i > 1 {
            ifact *= i as f32;
        }
        val += x2i / (i4 * ifact * ifact);
        x2i *= x * x;
        i4 *= 4.0;
    }
    val
}

fn log_bessel_i0(x: f32) -> f32 {
    if x > 12.0 {
        x + 0.5 * (-(TWO_PI).ln() + (1.0 / x).ln() + 1.0 / (8.0 * x))
    } else {
        bessel_i0(x).ln()
    }
}

/// Longitudinal scattering lobe.
fn mp(cos_i: f32, cos_o: f32, sin_i: f32, sin_o: f32, v: f32) -> f32 {
    let a = cos_i * cos_o / v;
    let b = sin_i * sin_o / v;
    if v <= 0.1 {
        (log_bessel_i0(a) - b - 1.0 / v + 0.6931 + (1.0 / (2.0 * v)).ln()).exp()
    } else {
        ((-b).exp() * bessel_i0(a)) / ((1.0 / v).sinh() * 2.0 * v)
    }
}

fn logistic(x: f32, s: f32) -> f32 {
    let x = x.abs();
    let e = (-x / s).exp();
    e / (s * (1.0 + e) * (1.0 + e))
}

fn logistic_cdf(x: f32, s: f32) -> f32 {
    1.0 / (1.0 + (-x / s).exp())
}

/// Logistic restricted to [-pi, pi] and renormalized.
fn trimmed_logistic(x: f32, s: f32) -> f32 {
    logistic(x, s) / (logistic_cdf(PI, s) - logistic_cdf(-PI, s))
}

fn sample_trimmed_logistic(u: f32, s: f32) -> f32 {
    let k = logistic_cdf(PI, s) - logistic_cdf(-PI, s);
    let x = -s * (1.0 / (u * k + logistic_cdf(-PI, s)) - 1.0).ln();
    x.clamp(-PI, PI)
}
