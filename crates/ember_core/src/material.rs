//! Materials as closure trees.
//!
//! The shader layer hands the core a tree of weighted closures; the renderer
//! walks it, multiplying weights down and appending one concrete BxDF per
//! leaf to the scattering event. The set of leaf kinds is closed and
//! versioned with the scene stream.

use std::sync::Arc;

use crate::spectrum::Spectrum;

/// Index of a material in the scene's material array.
pub type MaterialId = u32;

/// Microfacet normal distributions selectable from a closure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistributionKind {
    Blinn,
    Beckmann,
    Ggx,
}

/// Fresnel models selectable from a closure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FresnelKind {
    /// Constant 1, for pre-weighted lobes.
    NoOp,
    Schlick { f0: Spectrum },
    Dielectric { eta_i: f32, eta_t: f32 },
    Conductor { eta: f32, k: f32 },
}

/// One node of a material's closure tree.
#[derive(Debug, Clone)]
pub enum Closure {
    Lambert {
        albedo: Spectrum,
    },
    LambertTransmission {
        transmittance: Spectrum,
    },
    OrenNayar {
        albedo: Spectrum,
        sigma: f32,
    },
    Disney {
        base_color: Spectrum,
        metallic: f32,
        roughness: f32,
        specular: f32,
        specular_tint: f32,
        anisotropic: f32,
        sheen: f32,
        sheen_tint: f32,
        clearcoat: f32,
        clearcoat_gloss: f32,
        spec_trans: f32,
        flatness: f32,
        diff_trans: f32,
        scatter_distance: Spectrum,
        thin_surface: bool,
    },
    MicrofacetReflection {
        albedo: Spectrum,
        distribution: DistributionKind,
        roughness_u: f32,
        roughness_v: f32,
        fresnel: FresnelKind,
    },
    MicrofacetRefraction {
        transmittance: Spectrum,
        distribution: DistributionKind,
        roughness_u: f32,
        roughness_v: f32,
        eta_in: f32,
        eta_ext: f32,
    },
    AshikhminShirley {
        diffuse: Spectrum,
        specular: f32,
        roughness_u: f32,
        roughness_v: f32,
    },
    Phong {
        diffuse: Spectrum,
        specular: Spectrum,
        specular_power: f32,
    },
    Mirror {
        reflectance: Spectrum,
    },
    Dielectric {
        reflectance: Spectrum,
        transmittance: Spectrum,
        eta_i: f32,
        eta_t: f32,
    },
    MicrofacetReflectionDielectric {
        albedo: Spectrum,
        roughness_u: f32,
        roughness_v: f32,
        eta_i: f32,
        eta_t: f32,
    },
    Hair {
        sigma_a: Spectrum,
        beta_m: f32,
        beta_n: f32,
        eta: f32,
    },
    FourierBrdf {
        /// Azimuthal cosine-series coefficients per (mu_i, mu_o) bin pair.
        data: Arc<FourierTable>,
    },
    MerlBrdf {
        /// Measured isotropic table in half/difference-angle layout.
        data: Arc<MerlTable>,
    },
    Coat {
        base: Box<Closure>,
        thickness: f32,
        ior: f32,
        sigma: Spectrum,
        roughness: f32,
    },
    DoubleSided {
        front: Box<Closure>,
        back: Box<Closure>,
    },
    DistributionBrdf {
        albedo: Spectrum,
        specular: f32,
        roughness: f32,
    },
    Fabric {
        base_color: Spectrum,
        roughness: f32,
    },
    Subsurface {
        base_color: Spectrum,
        scatter_distance: Spectrum,
    },
    /// Scale an inner closure by a spectral weight.
    Weighted {
        weight: Spectrum,
        inner: Box<Closure>,
    },
    /// Sum of sub-closures.
    Add { items: Vec<Closure> },
}

/// Coefficients of a reduced isotropic Fourier BRDF.
///
/// `mu` holds the discretized zenith cosines; `orders`/`coeffs` hold, per
/// (i, o) bin pair, the number of azimuthal cosine orders and the packed
/// coefficients. Built by the material system from measured data.
#[derive(Debug, Clone)]
pub struct FourierTable {
    pub mu: Vec<f32>,
    pub orders: Vec<u32>,
    pub offsets: Vec<u32>,
    pub coeffs: Vec<f32>,
}

impl FourierTable {
    pub fn bin(&self, cos_theta: f32) -> usize {
        let c = cos_theta.abs().clamp(0.0, 1.0);
        match self.mu.iter().position(|&m| m >= c) {
            Some(i) => i,
            None => self.mu.len() - 1,
        }
    }
}

/// Measured isotropic BRDF in the standard 90 x 90 x 180 half/difference
/// angle layout, one f64-derived f32 triple per cell.
#[derive(Debug, Clone)]
pub struct MerlTable {
    pub data: Vec<f32>,
}

impl MerlTable {
    pub const RES_THETA_H: usize = 90;
    pub const RES_THETA_D: usize = 90;
    pub const RES_PHI_D: usize = 180;

    /// Channel scale factors of the measurement rig.
    pub const SCALE: [f32; 3] = [1.0 / 1500.0, 1.15 / 1500.0, 1.66 / 1500.0];

    pub fn expected_len() -> usize {
        Self::RES_THETA_H * Self::RES_THETA_D * Self::RES_PHI_D * 3
    }
}

/// A named material owning one closure tree.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub closure: Closure,
}

impl Material {
    pub fn new(name: impl Into<String>, closure: Closure) -> Self {
        Self {
            name: name.into(),
            closure,
        }
    }

    /// A neutral grey fallback used when a primitive references no material.
    pub fn default_grey() -> Self {
        Self::new(
            "default",
            Closure::Lambert {
                albedo: Spectrum::splat(0.5),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_tree_composition() {
        let tree = Closure::Add {
            items: vec![
                Closure::Weighted {
                    weight: Spectrum::splat(0.7),
                    inner: Box::new(Closure::Lambert {
                        albedo: Spectrum::ONE,
                    }),
                },
                Closure::Mirror {
                    reflectance: Spectrum::splat(0.3),
                },
            ],
        };
        let material = Material::new("layered", tree);
        assert_eq!(material.name, "layered");
    }

    #[test]
    fn test_merl_table_len() {
        assert_eq!(MerlTable::expected_len(), 90 * 90 * 180 * 3);
    }
}
