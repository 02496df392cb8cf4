//! Instant radiosity: virtual point lights traced ahead of rendering.

use ember_core::spectrum::is_black;
use ember_core::{Intersection, Scene, Spectrum};
use ember_math::{Ray, Vec2, Vec3};
use rand::RngCore;

use super::light_tracing::start_light_walk;
use super::{sample_one_light, spawn_ray, Integrator, RenderContext};
use crate::bxdf::canonical;
use crate::film::Film;
use crate::sampler::{Offset1D, Offset2D, PixelSample, SampleRequests};
use crate::scattering::ScatteringEvent;

/// One deposited virtual point light.
struct Vpl {
    isect: Intersection,
    /// Direction the depositing walk arrived from.
    wo: Vec3,
    /// Path throughput up to this vertex.
    beta: Spectrum,
}

pub struct InstantRadiosity {
    paths: usize,
    bounces: u32,
    /// Upper bound on the `1/d^2` coupling, controlling the fireflies the
    /// method is infamous for.
    geometry_clamp: f32,
    vpls: Vec<Vpl>,
    light_pick: Option<Offset1D>,
    light_samples: Option<Offset2D>,
    bsdf_samples: Option<Offset2D>,
}

impl InstantRadiosity {
    pub fn new(paths: usize, bounces: u32, geometry_clamp: f32) -> Self {
        Self {
            paths: paths.max(1),
            bounces: bounces.max(1),
            geometry_clamp,
            vpls: Vec::new(),
            light_pick: None,
            light_samples: None,
            bsdf_samples: None,
        }
    }
}

impl Integrator for InstantRadiosity {
    fn request_samples(&mut self, _scene: &Scene, req: &mut SampleRequests) {
        self.light_pick = Some(req.request_1d(1));
        self.light_samples = Some(req.request_2d(1));
        self.bsdf_samples = Some(req.request_2d(1));
    }

    /// Deposit the VPL set. Runs once, before any tile is rendered.
    fn preprocess(&mut self, ctx: &RenderContext, rng: &mut dyn RngCore) {
        self.vpls.clear();
        for _ in 0..self.paths {
            let Some((mut ray, mut beta)) = start_light_walk(ctx, rng) else {
                return;
            };
            for _ in 0..self.bounces {
                let isect = ctx.intersect(&ray);
                if !isect.is_hit() {
                    break;
                }
                let wo = -ray.direction;
                let se = ScatteringEvent::new(ctx.scene, &isect, wo);
                if se.bsdf.is_empty() {
                    break;
                }
                if se.bsdf.has_non_specular() {
                    self.vpls.push(Vpl {
                        isect,
                        wo,
                        beta,
                    });
                }

                let u = Vec2::new(canonical(rng), canonical(rng));
                let s = se.bsdf.sample_f(wo, u, rng);
                if s.pdf == 0.0 || is_black(s.f) {
                    break;
                }
                beta *= s.f / s.pdf;
                ray = spawn_ray(&isect, s.wi);
            }
        }
        log::info!("instant radiosity deposited {} VPLs", self.vpls.len());
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

        // Direct lighting the usual way.
        let u_pick = self.light_pick.map(|o| sample.data_1d(o)[0]).unwrap_or(0.5);
        let u_light = self
            .light_samples
            .map(|o| sample.data_2d(o)[0])
            .unwrap_or(Vec2::new(0.5, 0.5));
        let u_bsdf = self
            .bsdf_samples
            .map(|o| sample.data_2d(o)[0])
            .unwrap_or(Vec2::new(0.5, 0.5));
        l += sample_one_light(ctx, &isect, &se, wo, u_pick, u_light, u_bsdf, rng);

        // Indirect lighting from the VPL set with a clamped coupling term.
        if !self.vpls.is_empty() && se.bsdf.has_non_specular() {
            let mut indirect = Spectrum::ZERO;
            for vpl in &self.vpls {
                let to_vpl = vpl.isect.point - isect.point;
                let dist_sq = to_vpl.length_squared();
                if dist_sq < 1e-8 {
                    continue;
                }
                let dist = dist_sq.sqrt();
                let dir = to_vpl / dist;

                let f_here = se.bsdf.f(wo, dir);
                if is_black(f_here) {
                    continue;
                }
                let vpl_se = ScatteringEvent::new(ctx.scene, &vpl.isect, vpl.wo);
                let f_there = vpl_se.bsdf.f(vpl.wo, -dir);
                if is_black(f_there) {
                    continue;
                }

                // Both cosines of the connecting segment live inside the
                // two BSDF values; the clamp bounds the remaining inverse
                // square.
                let g = (1.0 / dist_sq).min(self.geometry_clamp);
                if !ctx.unoccluded(&isect, dir, dist) {
                    continue;
                }
                indirect += vpl.beta * f_here * f_there * g;
            }
            l += indirect / self.paths as f32;
        }

        l
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::LinearList;
    use crate::sampler::Sampler;
    use ember_core::camera::PerspectiveCamera;
    use ember_core::material::Closure;
    use ember_core::{Material, Primitive, Shape};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn boxy_scene() -> Scene {
        // A floor and a wall so one indirect bounce has something to do.
        let mut scene = Scene::new(PerspectiveCamera::new(
            Vec3::new(0.0, 1.0, 4.0),
            Vec3::ZERO,
            Vec3::Y,
            1.2,
            8,
            8,
        ));
        let white = scene.add_material(Material::new(
            "white",
            Closure::Lambert {
                albedo: Spectrum::splat(0.7),
            },
        ));
        scene.add_primitive(Primitive::new(
            Shape::Square {
                center: Vec3::ZERO,
                eu: Vec3::X * 3.0,
                ev: Vec3::Z * 3.0,
            },
            white,
        ));
        scene.add_primitive(Primitive::new(
            Shape::Square {
                center: Vec3::new(0.0, 1.5, -3.0),
                eu: Vec3::X * 3.0,
                ev: Vec3::Y * 1.5,
            },
            white,
        ));
        scene.add_area_light(
            Shape::Square {
                center: Vec3::new(0.0, 4.0, 0.0),
                eu: Vec3::X * 0.5,
                ev: Vec3::Z * 0.5,
            },
            0,
            Spectrum::splat(20.0),
            false,
        );
        scene
    }

    #[test]
    fn test_vpls_deposited_and_add_energy() {
        let scene = boxy_scene();
        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };

        let mut ir = InstantRadiosity::new(64, 3, 100.0);
        let mut req = SampleRequests::new();
        ir.request_samples(&scene, &mut req);
        let mut rng = StdRng::seed_from_u64(8);
        ir.preprocess(&ctx, &mut rng);
        assert!(!ir.vpls.is_empty());

        let film = Film::new(8, 8);
        let samples = Sampler::Random.generate_pixel(&req, 64, &mut rng);
        let ray = Ray::spawn(Vec3::new(0.0, 1.0, 4.0), (Vec3::ZERO - Vec3::new(0.0, 1.0, 4.0)).normalize());
        let mut with_vpl = Spectrum::ZERO;
        for s in &samples {
            with_vpl += ir.li(&ctx, &ray, s, &mut rng, &film);
        }
        with_vpl /= 64.0;

        // The same scene with only direct lighting is darker.
        let mut direct_only = InstantRadiosity::new(1, 1, 100.0);
        let mut req2 = SampleRequests::new();
        direct_only.request_samples(&scene, &mut req2);
        // Deliberately skip preprocess: no VPLs.
        let samples2 = Sampler::Random.generate_pixel(&req2, 64, &mut rng);
        let mut without_vpl = Spectrum::ZERO;
        for s in &samples2 {
            without_vpl += direct_only.li(&ctx, &ray, s, &mut rng, &film);
        }
        without_vpl /= 64.0;

        assert!(with_vpl.x >= without_vpl.x);
    }
}
