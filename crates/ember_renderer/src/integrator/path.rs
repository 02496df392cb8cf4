//! Unidirectional path tracing with Russian roulette.

use ember_core::spectrum::is_black;
use ember_core::{Scene, Spectrum};
use ember_math::{Ray, Vec2};
use rand::RngCore;

use super::{sample_one_light, spawn_ray, Integrator, RenderContext};
use crate::bxdf::canonical;
use crate::film::Film;
use crate::sampler::{Offset1D, Offset2D, PixelSample, SampleRequests};
use crate::scattering::ScatteringEvent;

/// Bounces before Russian roulette starts.
const RR_START_DEPTH: u32 = 3;

pub struct PathTracing {
    max_depth: u32,
    light_pick: Option<Offset1D>,
    light_samples: Option<Offset2D>,
    bsdf_samples: Option<Offset2D>,
}

impl PathTracing {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
            light_pick: None,
            light_samples: None,
            bsdf_samples: None,
        }
    }
}

impl Integrator for PathTracing {
    fn request_samples(&mut self, _scene: &Scene, req: &mut SampleRequests) {
        // Tables cover the first vertex, where stratification matters most;
        // deeper bounces fall back to the auxiliary stream.
        self.light_pick = Some(req.request_1d(1));
        self.light_samples = Some(req.request_2d(1));
        self.bsdf_samples = Some(req.request_2d(1));
    }

    fn li(
        &self,
        ctx: &RenderContext,
        ray: &Ray,
        sample: &PixelSample,
        rng: &mut dyn RngCore,
        _film: &Film,
    ) -> Spectrum {
        let mut l = Spectrum::ZERO;
        let mut beta = Spectrum::ONE;
        let mut ray = *ray;
        let mut specular_bounce = true;

        for bounce in 0..self.max_depth {
            let isect = ctx.intersect(&ray);
            if !isect.is_hit() {
                // Escaped radiance is only added where direct lighting has
                // not already accounted for it.
                if specular_bounce {
                    l += beta * ctx.scene.background(&ray);
                }
                break;
            }

            let wo = -ray.direction;
            let se = ScatteringEvent::new(ctx.scene, &isect, wo);

            if specular_bounce {
                l += beta * se.emission;
            }

            if se.bsdf.is_empty() {
                break;
            }

            // Next-event estimation at every non-delta vertex.
            if se.bsdf.has_non_specular() {
                let (u_pick, u_light, u_bsdf) = if bounce == 0 {
                    (
                        self.light_pick.map(|o| sample.data_1d(o)[0]).unwrap_or(0.5),
                        self.light_samples
                            .map(|o| sample.data_2d(o)[0])
                            .unwrap_or(Vec2::new(0.5, 0.5)),
                        self.bsdf_samples
                            .map(|o| sample.data_2d(o)[0])
                            .unwrap_or(Vec2::new(0.5, 0.5)),
                    )
                } else {
                    (
                        canonical(rng),
                        Vec2::new(canonical(rng), canonical(rng)),
                        Vec2::new(canonical(rng), canonical(rng)),
                    )
                };
                l += beta * sample_one_light(ctx, &isect, &se, wo, u_pick, u_light, u_bsdf, rng);
            }

            // Extend the path.
            let u = Vec2::new(canonical(rng), canonical(rng));
            let s = se.bsdf.sample_f(wo, u, rng);
            if s.pdf == 0.0 || is_black(s.f) {
                break;
            }
            beta *= s.f / s.pdf;
            specular_bounce = se.bsdf.is_delta();
            ray = spawn_ray(&isect, s.wi);

            // Russian roulette on the surviving throughput.
            if bounce >= RR_START_DEPTH {
                let q = beta.max_element().min(0.95);
                if canonical(rng) >= q {
                    break;
                }
                beta /= q;
            }
        }

        l
    }
}
