//! Scattering events: the per-hit aggregate of BSDF, emission and the
//! optional subsurface slot, built by walking the material's closure tree.

use ember_core::material::{Closure, DistributionKind, FresnelKind};
use ember_core::spectrum::luminance;
use ember_core::{Intersection, Scene, Spectrum};
use ember_math::Vec3;

use crate::bsdf::Bsdf;
use crate::bxdf::{
    AshikhminShirley, Coat, Dielectric, Disney, DistributionBrdf, Fabric, FourierBrdf, Fresnel,
    Hair, Lambert, LambertTransmission, Lobe, MerlBrdf, MicrofacetReflection,
    MicrofacetRefraction, Mirror, OrenNayar, Phong, VisTerm, WeightedLobe,
};

/// Parameters of a deferred subsurface-scattering term.
///
/// The diffusion solve itself is not implemented; the multi-hit probe
/// machinery and this carrier exist so materials round-trip (see
/// DESIGN.md).
#[derive(Debug, Clone)]
pub struct BssrdfParams {
    pub base_color: Spectrum,
    pub scatter_distance: Spectrum,
}

/// Everything shading needs at one hit point.
#[derive(Clone)]
pub struct ScatteringEvent {
    pub bsdf: Bsdf,
    pub bssrdf: Option<BssrdfParams>,
    /// Emitted radiance toward the viewer, for hits on area lights.
    pub emission: Spectrum,
}

impl ScatteringEvent {
    /// Build the event for a hit: resolve the material's closure tree into
    /// lobes and look up emission from the primitive's light back-reference.
    pub fn new(scene: &Scene, isect: &Intersection, wo: Vec3) -> Self {
        let mut bsdf = Bsdf::new(isect);
        let mut bssrdf = None;

        if let Some(prim) = isect.primitive {
            let material = scene.material(scene.primitives[prim as usize].material);
            process_closure(
                &material.closure,
                Spectrum::ONE,
                &mut |weight, lobe| bsdf.add(weight, lobe),
                &mut bssrdf,
            );
        }

        let emission = scene
            .light_at(isect)
            .map(|l| l.emission(isect.gnormal, wo))
            .unwrap_or(Spectrum::ZERO);

        Self {
            bsdf,
            bssrdf,
            emission,
        }
    }
}

/// Walk a closure tree, multiplying weights down and appending one concrete
/// lobe per leaf.
pub fn process_closure(
    closure: &Closure,
    weight: Spectrum,
    emit: &mut dyn FnMut(Spectrum, Lobe),
    bssrdf: &mut Option<BssrdfParams>,
) {
    if luminance(weight) <= 0.0 {
        return;
    }
    match closure {
        Closure::Weighted { weight: w, inner } => {
            process_closure(inner, weight * *w, emit, bssrdf)
        }
        Closure::Add { items } => {
            for item in items {
                process_closure(item, weight, emit, bssrdf);
            }
        }
        leaf => {
            if let Some(lobe) = build_lobe(leaf, bssrdf) {
                emit(weight, lobe);
            }
        }
    }
}

/// Flatten an arbitrary closure into a lobe list, for the layered lobes
/// that carry sub-materials.
fn flatten(closure: &Closure) -> Vec<WeightedLobe> {
    let mut lobes = Vec::new();
    let mut bssrdf = None;
    process_closure(
        closure,
        Spectrum::ONE,
        &mut |weight, lobe| lobes.push(WeightedLobe { weight, lobe }),
        &mut bssrdf,
    );
    lobes
}

fn distribution(kind: DistributionKind, ru: f32, rv: f32) -> crate::bxdf::Distribution {
    use crate::bxdf::Distribution;
    match kind {
        DistributionKind::Blinn => Distribution::blinn(ru),
        DistributionKind::Beckmann => Distribution::beckmann(ru),
        DistributionKind::Ggx => Distribution::ggx(ru, rv),
    }
}

fn fresnel(kind: FresnelKind) -> Fresnel {
    match kind {
        FresnelKind::NoOp => Fresnel::NoOp,
        FresnelKind::Schlick { f0 } => Fresnel::Schlick { f0 },
        FresnelKind::Dielectric { eta_i, eta_t } => Fresnel::Dielectric { eta_i, eta_t },
        FresnelKind::Conductor { eta, k } => Fresnel::Conductor { eta, k },
    }
}

fn build_lobe(closure: &Closure, bssrdf: &mut Option<BssrdfParams>) -> Option<Lobe> {
    Some(match closure {
        Closure::Lambert { albedo } => Lobe::Lambert(Lambert::new(*albedo)),
        Closure::LambertTransmission { transmittance } => {
            Lobe::LambertTransmission(LambertTransmission::new(*transmittance))
        }
        Closure::OrenNayar { albedo, sigma } => Lobe::OrenNayar(OrenNayar::new(*albedo, *sigma)),
        Closure::Disney {
            base_color,
            metallic,
            roughness,
            specular,
            specular_tint,
            anisotropic,
            sheen,
            sheen_tint,
            clearcoat,
            clearcoat_gloss,
            spec_trans,
            flatness,
            diff_trans,
            scatter_distance,
            thin_surface,
        } => {
            if !*thin_surface && scatter_distance.max_element() > 0.0 {
                *bssrdf = Some(BssrdfParams {
                    base_color: *base_color,
                    scatter_distance: *scatter_distance,
                });
            }
            Lobe::Disney(Box::new(Disney {
                base_color: *base_color,
                metallic: *metallic,
                roughness: *roughness,
                specular: *specular,
                specular_tint: *specular_tint,
                anisotropic: *anisotropic,
                sheen: *sheen,
                sheen_tint: *sheen_tint,
                clearcoat: *clearcoat,
                clearcoat_gloss: *clearcoat_gloss,
                spec_trans: *spec_trans,
                flatness: *flatness,
                diff_trans: *diff_trans,
                scatter_distance: *scatter_distance,
                thin_surface: *thin_surface,
            }))
        }
        Closure::MicrofacetReflection {
            albedo,
            distribution: dist,
            roughness_u,
            roughness_v,
            fresnel: fr,
        } => Lobe::MicrofacetReflection(MicrofacetReflection::new(
            *albedo,
            fresnel(*fr),
            distribution(*dist, *roughness_u, *roughness_v),
            VisTerm::Smith {
                roughness: *roughness_u,
            },
        )),
        Closure::MicrofacetRefraction {
            transmittance,
            distribution: dist,
            roughness_u,
            roughness_v,
            eta_in,
            eta_ext,
        } => Lobe::MicrofacetRefraction(
            MicrofacetRefraction::new(
                *transmittance,
                distribution(*dist, *roughness_u, *roughness_v),
                *eta_in,
                *eta_ext,
            )
            .with_vis(VisTerm::Smith {
                roughness: *roughness_u,
            }),
        ),
        Closure::AshikhminShirley {
            diffuse,
            specular,
            roughness_u,
            roughness_v,
        } => Lobe::AshikhminShirley(AshikhminShirley::new(
            *diffuse,
            *specular,
            *roughness_u,
            *roughness_v,
        )),
        Closure::Phong {
            diffuse,
            specular,
            specular_power,
        } => Lobe::Phong(Phong::new(*diffuse, *specular, *specular_power)),
        Closure::Mirror { reflectance } => Lobe::Mirror(Mirror::new(*reflectance)),
        Closure::Dielectric {
            reflectance,
            transmittance,
            eta_i,
            eta_t,
        } => Lobe::Dielectric(Dielectric::new(
            *reflectance,
            *transmittance,
            *eta_i,
            *eta_t,
        )),
        Closure::MicrofacetReflectionDielectric {
            albedo,
            roughness_u,
            roughness_v,
            eta_i,
            eta_t,
        } => Lobe::MicrofacetReflection(MicrofacetReflection::new(
            *albedo,
            Fresnel::Dielectric {
                eta_i: *eta_i,
                eta_t: *eta_t,
            },
            crate::bxdf::Distribution::ggx(*roughness_u, *roughness_v),
            VisTerm::Smith {
                roughness: *roughness_u,
            },
        )),
        Closure::Hair {
            sigma_a,
            beta_m,
            beta_n,
            eta,
        } => Lobe::Hair(Box::new(Hair::new(*sigma_a, *beta_m, *beta_n, *eta))),
        Closure::FourierBrdf { data } => Lobe::Fourier(FourierBrdf::new(data.clone())),
        Closure::MerlBrdf { data } => Lobe::Merl(MerlBrdf::new(data.clone())),
        Closure::Coat {
            base,
            thickness,
            ior,
            sigma,
            roughness,
        } => Lobe::Coat(Box::new(Coat::new(
            flatten(base),
            *thickness,
            *ior,
            *sigma,
            *roughness,
        ))),
        Closure::DoubleSided { front, back } => {
            Lobe::DoubleSided(Box::new(crate::bxdf::DoubleSided::new(
                flatten(front),
                flatten(back),
            )))
        }
        Closure::DistributionBrdf {
            albedo,
            specular,
            roughness,
        } => Lobe::DistributionBrdf(DistributionBrdf::new(*albedo, *specular, *roughness)),
        Closure::Fabric {
            base_color,
            roughness,
        } => Lobe::Fabric(Fabric::new(*base_color, *roughness)),
        Closure::Subsurface {
            base_color,
            scatter_distance,
        } => {
            // The diffusion term is the documented gap; surface transport
            // falls back to diffuse so the material stays visible.
            *bssrdf = Some(BssrdfParams {
                base_color: *base_color,
                scatter_distance: *scatter_distance,
            });
            Lobe::Lambert(Lambert::new(*base_color))
        }
        Closure::Weighted { .. } | Closure::Add { .. } => return None,
    })
}
