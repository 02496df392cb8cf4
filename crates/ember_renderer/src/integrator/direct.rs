//! Direct lighting with multiple importance sampling over every light.

use ember_core::{Scene, Spectrum};
use ember_math::{Ray, Vec2};
use rand::RngCore;

use super::{estimate_direct, Integrator, RenderContext};
use crate::film::Film;
use crate::sampler::{Offset2D, PixelSample, SampleRequests};
use crate::scattering::ScatteringEvent;

/// One light sample plus one BSDF sample per light per pixel sample,
/// balance-heuristic weighted. No indirect bounces.
pub struct DirectLighting {
    light_samples: Option<Offset2D>,
    bsdf_samples: Option<Offset2D>,
}

impl DirectLighting {
    pub fn new() -> Self {
        Self {
            light_samples: None,
            bsdf_samples: None,
        }
    }
}

impl Default for DirectLighting {
    fn default() -> Self {
        Self::new()
    }
}

impl Integrator for DirectLighting {
    fn request_samples(&mut self, scene: &Scene, req: &mut SampleRequests) {
        let n = scene.lights.len().max(1);
        self.light_samples = Some(req.request_2d(n));
        self.bsdf_samples = Some(req.request_2d(n));
    }

    fn li(
        &self,
        ctx: &RenderContext,
        ray: &Ray,
        sample: &PixelSample,
        rng: &mut dyn RngCore,
        _film: &Film,
    ) -> Spectrum {
        let isect = ctx.intersect(ray);
        if !isect.is_hit() {
            return ctx.scene.background(ray);
        }

        let wo = -ray.direction;
        let se = ScatteringEvent::new(ctx.scene, &isect, wo);
        let mut l = se.emission;

        for (i, light) in ctx.scene.lights.iter().enumerate() {
            let (u_light, u_bsdf) = match (self.light_samples, self.bsdf_samples) {
                (Some(ls), Some(bs)) => {
                    let light_data = sample.data_2d(ls);
                    let bsdf_data = sample.data_2d(bs);
                    (light_data[i % light_data.len()], bsdf_data[i % bsdf_data.len()])
                }
                _ => (
                    Vec2::new(crate::bxdf::canonical(rng), crate::bxdf::canonical(rng)),
                    Vec2::new(crate::bxdf::canonical(rng), crate::bxdf::canonical(rng)),
                ),
            };
            l += estimate_direct(ctx, &isect, &se, wo, light, u_light, u_bsdf, rng);
        }

        l
    }
}
