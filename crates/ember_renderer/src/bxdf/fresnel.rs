//! Fresnel reflectance models.

use ember_core::Spectrum;

use super::{schlick_r0_from_eta, schlick_weight};

/// Pluggable Fresnel term for the microfacet lobes.
#[derive(Debug, Clone, Copy)]
pub enum Fresnel {
    /// Constant one, for lobes that carry reflectance elsewhere.
    NoOp,
    /// Schlick approximation from reflectance at normal incidence.
    Schlick { f0: Spectrum },
    /// Exact dielectric Fresnel; `cos` may be negative when the direction
    /// leaves the medium, which swaps the indices.
    Dielectric { eta_i: f32, eta_t: f32 },
    /// Conductor with complex index (eta, k), applied to all channels.
    Conductor { eta: f32, k: f32 },
    /// The layered-material blend: dielectric response faded toward a
    /// Schlick metal response by `metallic`.
    Composite {
        r0: Spectrum,
        eta_i: f32,
        eta_t: f32,
        metallic: f32,
    },
}

impl Fresnel {
    pub fn evaluate(&self, cos_i: f32) -> Spectrum {
        match *self {
            Fresnel::NoOp => Spectrum::ONE,
            Fresnel::Schlick { f0 } => f0 + (Spectrum::ONE - f0) * schlick_weight(cos_i.abs()),
            Fresnel::Dielectric { eta_i, eta_t } => {
                Spectrum::splat(dielectric(cos_i, eta_i, eta_t))
            }
            Fresnel::Conductor { eta, k } => Spectrum::splat(conductor(cos_i.abs(), eta, k)),
            Fresnel::Composite {
                r0,
                eta_i,
                eta_t,
                metallic,
            } => {
                let d = Spectrum::splat(dielectric(cos_i, eta_i, eta_t));
                let m = r0 + (Spectrum::ONE - r0) * schlick_weight(cos_i.abs());
                d + (m - d) * metallic
            }
        }
    }
}

/// Exact Fresnel for dielectrics. Handles both orientations.
pub fn dielectric(cos_i: f32, eta_i: f32, eta_t: f32) -> f32 {
    let mut cos_i = cos_i.clamp(-1.0, 1.0);
    let (eta_i, eta_t) = if cos_i > 0.0 {
        (eta_i, eta_t)
    } else {
        cos_i = -cos_i;
        (eta_t, eta_i)
    };

    let sin_t = eta_i / eta_t * (1.0 - cos_i * cos_i).max(0.0).sqrt();
    if sin_t >= 1.0 {
        return 1.0;
    }
    let cos_t = (1.0 - sin_t * sin_t).max(0.0).sqrt();

    let r_parl = (eta_t * cos_i - eta_i * cos_t) / (eta_t * cos_i + eta_i * cos_t);
    let r_perp = (eta_i * cos_i - eta_t * cos_t) / (eta_i * cos_i + eta_t * cos_t);
    0.5 * (r_parl * r_parl + r_perp * r_perp)
}

/// Fresnel for conductors with complex index of refraction.
pub fn conductor(cos_i: f32, eta: f32, k: f32) -> f32 {
    let cos2 = cos_i * cos_i;
    let tmp = (eta * eta + k * k) * cos2;
    let r_parl2 = (tmp - 2.0 * eta * cos_i + 1.0) / (tmp + 2.0 * eta * cos_i + 1.0);
    let tmp_f = eta * eta + k * k;
    let r_perp2 = (tmp_f - 2.0 * eta * cos_i + cos2) / (tmp_f + 2.0 * eta * cos_i + cos2);
    0.5 * (r_parl2 + r_perp2)
}

/// Schlick F0 for a dielectric interface, as a spectrum.
pub fn f0_from_ior(eta: f32) -> Spectrum {
    Spectrum::splat(schlick_r0_from_eta(eta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dielectric_normal_incidence() {
        // Glass from air: about 4 percent at normal incidence.
        let f = dielectric(1.0, 1.0, 1.5);
        assert!((f - 0.04).abs() < 0.005);
    }

    #[test]
    fn test_dielectric_grazing_goes_to_one() {
        let f = dielectric(0.01, 1.0, 1.5);
        assert!(f > 0.9);
    }

    #[test]
    fn test_dielectric_tir_from_inside() {
        // Leaving glass beyond the critical angle reflects everything.
        let cos = 0.2; // theta about 78 degrees, critical is about 42
        let f = dielectric(-cos, 1.0, 1.5);
        assert_eq!(f, 1.0);
    }

    #[test]
    fn test_conductor_bright_at_normal() {
        let f = conductor(1.0, 0.2, 3.0);
        assert!(f > 0.9);
    }

    #[test]
    fn test_schlick_matches_dielectric_at_normal() {
        let f0 = f0_from_ior(1.0 / 1.5);
        let schlick = Fresnel::Schlick { f0 }.evaluate(1.0);
        let exact = dielectric(1.0, 1.0, 1.5);
        assert!((schlick.x - exact).abs() < 0.01);
    }
}
