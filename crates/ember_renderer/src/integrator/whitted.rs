//! Whitted-style ray tracing: direct lighting plus perfect specular
//! reflection and refraction.

use ember_core::spectrum::is_black;
use ember_core::{Scene, Spectrum};
use ember_math::{Ray, Vec2};
use rand::RngCore;

use super::{spawn_ray, Integrator, RenderContext};
use crate::bxdf::BxdfType;
use crate::film::Film;
use crate::sampler::{Offset2D, PixelSample, SampleRequests};
use crate::scattering::ScatteringEvent;

pub struct Whitted {
    max_depth: u32,
    light_samples: Option<Offset2D>,
}

impl Whitted {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
            light_samples: None,
        }
    }

    fn trace(
        &self,
        ctx: &RenderContext,
        ray: &Ray,
        sample: &PixelSample,
        rng: &mut dyn RngCore,
        depth: u32,
    ) -> Spectrum {
        let isect = ctx.intersect(ray);
        if !isect.is_hit() {
            return ctx.scene.background(ray);
        }

        let wo = -ray.direction;
        let se = ScatteringEvent::new(ctx.scene, &isect, wo);
        let mut l = se.emission;

        // Direct illumination from every light, light samples only.
        for (i, light) in ctx.scene.lights.iter().enumerate() {
            let u = match self.light_samples {
                Some(off) => {
                    let data = sample.data_2d(off);
                    data[i % data.len()]
                }
                None => Vec2::new(crate::bxdf::canonical(rng), crate::bxdf::canonical(rng)),
            };
            let ls = light.sample_li(isect.point, u.x, u.y);
            if ls.pdf <= 0.0 || is_black(ls.radiance) {
                continue;
            }
            let f = se.bsdf.f(wo, ls.wi);
            if !is_black(f) && ctx.unoccluded(&isect, ls.wi, ls.dist) {
                l += f * ls.radiance / ls.pdf;
            }
        }

        // Recurse through perfect specular lobes only.
        if depth < self.max_depth && se.bsdf.bxdf_type().contains(BxdfType::SPECULAR) {
            let s = se.bsdf.sample_f(wo, Vec2::new(0.5, 0.5), rng);
            if s.pdf > 0.0 && !is_black(s.f) {
                let next = spawn_ray(&isect, s.wi);
                l += s.f / s.pdf * self.trace(ctx, &next, sample, rng, depth + 1);
            }
        }

        l
    }
}

impl Integrator for Whitted {
    fn request_samples(&mut self, scene: &Scene, req: &mut SampleRequests) {
        self.light_samples = Some(req.request_2d(scene.lights.len().max(1)));
    }

    fn li(
        &self,
        ctx: &RenderContext,
        ray: &Ray,
        sample: &PixelSample,
        rng: &mut dyn RngCore,
        _film: &Film,
    ) -> Spectrum {
        self.trace(ctx, ray, sample, rng, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::LinearList;
    use crate::sampler::Sampler;
    use ember_core::camera::PerspectiveCamera;
    use ember_core::material::Closure;
    use ember_core::{Light, Material, Primitive, Shape};
    use ember_math::Vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_point_light_direct() {
        // Lambertian floor lit by a point light straight above.
        let mut scene = Scene::new(PerspectiveCamera::new(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::ZERO,
            Vec3::Z,
            1.0,
            8,
            8,
        ));
        let mat = scene.add_material(Material::new(
            "white",
            Closure::Lambert {
                albedo: Spectrum::ONE,
            },
        ));
        scene.add_primitive(Primitive::new(
            Shape::Square {
                center: Vec3::ZERO,
                eu: Vec3::X * 10.0,
                ev: Vec3::Z * 10.0,
            },
            mat,
        ));
        scene.add_light(Light::Point {
            position: Vec3::new(0.0, 4.0, 0.0),
            intensity: Spectrum::splat(16.0),
        });

        let mut whitted = Whitted::new(4);
        let mut req = SampleRequests::new();
        whitted.request_samples(&scene, &mut req);

        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };
        let mut rng = StdRng::seed_from_u64(4);
        let samples = Sampler::Random.generate_pixel(&req, 1, &mut rng);
        let film = Film::new(8, 8);

        let ray = Ray::spawn(Vec3::new(0.0, 2.0, 0.0), -Vec3::Y);
        let l = whitted.li(&ctx, &ray, &samples[0], &mut rng, &film);

        // Analytic: albedo/pi * I/d^2 * cos, with d = 4 and cos = 1.
        let expected = (1.0 / std::f32::consts::PI) * (16.0 / 16.0);
        assert!((l.x - expected).abs() < 1e-3, "{l:?} vs {expected}");
    }

    #[test]
    fn test_mirror_recursion_sees_light() {
        // Camera looks at a mirror floor; the reflection path reaches the
        // emissive square overhead.
        let mut scene = Scene::new(PerspectiveCamera::new(
            Vec3::new(0.0, 1.0, 2.0),
            Vec3::ZERO,
            Vec3::Y,
            1.0,
            8,
            8,
        ));
        let mirror = scene.add_material(Material::new(
            "mirror",
            Closure::Mirror {
                reflectance: Spectrum::ONE,
            },
        ));
        scene.add_primitive(Primitive::new(
            Shape::Square {
                center: Vec3::ZERO,
                eu: Vec3::X * 4.0,
                ev: Vec3::Z * 4.0,
            },
            mirror,
        ));
        scene.add_area_light(
            Shape::Square {
                center: Vec3::new(0.0, 5.0, 0.0),
                eu: Vec3::X * 4.0,
                ev: Vec3::Z * 4.0,
            },
            0,
            Spectrum::splat(2.0),
            true,
        );

        let mut whitted = Whitted::new(4);
        let mut req = SampleRequests::new();
        whitted.request_samples(&scene, &mut req);

        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };
        let mut rng = StdRng::seed_from_u64(9);
        let samples = Sampler::Random.generate_pixel(&req, 1, &mut rng);
        let film = Film::new(8, 8);

        // Straight down at the mirror: the bounce goes straight up into
        // the light.
        let ray = Ray::spawn(Vec3::new(0.0, 1.0, 0.0), -Vec3::Y);
        let l = whitted.li(&ctx, &ray, &samples[0], &mut rng, &film);
        assert!((l.x - 2.0).abs() < 1e-3, "{l:?}");
    }
}
