//! Light-transport integrators.
//!
//! Every integrator answers `li(ray, pixel_sample) -> spectrum`; the
//! shared direct-lighting step draws one light sample and one BSDF sample
//! and combines them with the balance heuristic.

use ember_core::spectrum::is_black;
use ember_core::{Intersection, Light, Scene, Spectrum};
use ember_math::sampling::balance_heuristic;
use ember_math::{Ray, Vec2, Vec3};
use rand::RngCore;

use crate::accel::Accelerator;
use crate::film::Film;
use crate::sampler::{PixelSample, SampleRequests};
use crate::scattering::ScatteringEvent;

pub mod ao;
pub mod bdpt;
pub mod direct;
pub mod instant_radiosity;
pub mod light_tracing;
pub mod path;
pub mod whitted;

pub use ao::AmbientOcclusion;
pub use bdpt::Bdpt;
pub use direct::DirectLighting;
pub use instant_radiosity::InstantRadiosity;
pub use light_tracing::LightTracing;
pub use path::PathTracing;
pub use whitted::Whitted;

/// The read-only world an integrator runs against.
pub struct RenderContext<'a> {
    pub scene: &'a Scene,
    pub accel: &'a dyn Accelerator,
}

impl RenderContext<'_> {
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> Intersection {
        self.accel.intersect(self.scene, ray)
    }

    #[inline]
    pub fn is_occluded(&self, ray: &Ray) -> bool {
        self.accel.is_occluded(self.scene, ray)
    }

    /// Shadow-test from a surface point toward a light sample.
    pub fn unoccluded(&self, isect: &Intersection, wi: Vec3, dist: f32) -> bool {
        let mut ray = spawn_ray(isect, wi);
        if dist.is_finite() {
            ray.t_max = dist * (1.0 - 1e-3);
        }
        !self.is_occluded(&ray)
    }
}

/// An integrator. Construction happens before rendering; `li` runs
/// concurrently from many worker threads.
pub trait Integrator: Send + Sync {
    /// Register the per-pixel sample tables this integrator indexes.
    fn request_samples(&mut self, _scene: &Scene, _req: &mut SampleRequests) {}

    /// One-time setup that may trace rays (virtual point lights and such).
    fn preprocess(&mut self, _ctx: &RenderContext, _rng: &mut dyn RngCore) {}

    /// Radiance arriving along a primary ray. Integrators whose strategies
    /// cross pixel boundaries splat through `film` instead of returning.
    fn li(
        &self,
        ctx: &RenderContext,
        ray: &Ray,
        sample: &PixelSample,
        rng: &mut dyn RngCore,
        film: &Film,
    ) -> Spectrum;
}

/// Continue a ray from a surface, nudged off the geometry along the facing
/// side of the geometric normal.
pub fn spawn_ray(isect: &Intersection, dir: Vec3) -> Ray {
    let side = if isect.gnormal.dot(dir) >= 0.0 { 1.0 } else { -1.0 };
    Ray::new(
        isect.point + isect.gnormal * (1e-4 * side),
        dir,
        1e-4,
        f32::INFINITY,
    )
}

/// One-light direct illumination with multiple importance sampling: one
/// sample from the light, one from the BSDF, balance-heuristic weighted.
pub fn estimate_direct(
    ctx: &RenderContext,
    isect: &Intersection,
    se: &ScatteringEvent,
    wo: Vec3,
    light: &Light,
    u_light: Vec2,
    u_bsdf: Vec2,
    rng: &mut dyn RngCore,
) -> Spectrum {
    let mut l = Spectrum::ZERO;
    let p = isect.point;

    // Light strategy.
    let ls = light.sample_li(p, u_light.x, u_light.y);
    if ls.pdf > 0.0 && !is_black(ls.radiance) {
        let f = se.bsdf.f(wo, ls.wi);
        if !is_black(f) && ctx.unoccluded(isect, ls.wi, ls.dist) {
            let weight = if light.is_delta() {
                1.0
            } else {
                balance_heuristic(1.0, ls.pdf, 1.0, se.bsdf.pdf(wo, ls.wi))
            };
            l += f * ls.radiance * (weight / ls.pdf);
        }
    }

    // BSDF strategy; pointless for delta lights, which a BSDF sample can
    // never hit.
    if !light.is_delta() && se.bsdf.has_non_specular() {
        let s = se.bsdf.sample_f(wo, u_bsdf, rng);
        if s.pdf > 0.0 && !is_black(s.f) {
            let light_pdf = light.pdf_li(p, s.wi);
            if light_pdf > 0.0 {
                let ray = spawn_ray(isect, s.wi);
                let hit = ctx.intersect(&ray);
                let le = match (hit.is_hit(), light) {
                    (true, Light::Area { primitive, .. }) => {
                        if hit.primitive == Some(*primitive) {
                            light.emission(hit.gnormal, -s.wi)
                        } else {
                            Spectrum::ZERO
                        }
                    }
                    (false, _) => light.le(&ray),
                    _ => Spectrum::ZERO,
                };
                if !is_black(le) {
                    let weight = balance_heuristic(1.0, s.pdf, 1.0, light_pdf);
                    l += s.f * le * (weight / s.pdf);
                }
            }
        }
    }

    l
}

/// Direct lighting from one uniformly chosen light, scaled by the light
/// count so the estimator stays unbiased.
pub fn sample_one_light(
    ctx: &RenderContext,
    isect: &Intersection,
    se: &ScatteringEvent,
    wo: Vec3,
    u_pick: f32,
    u_light: Vec2,
    u_bsdf: Vec2,
    rng: &mut dyn RngCore,
) -> Spectrum {
    let n = ctx.scene.lights.len();
    if n == 0 {
        return Spectrum::ZERO;
    }
    let index = ((u_pick * n as f32) as usize).min(n - 1);
    estimate_direct(
        ctx,
        isect,
        se,
        wo,
        &ctx.scene.lights[index],
        u_light,
        u_bsdf,
        rng,
    ) * n as f32
}
