//! Light tracing: walks start at the lights and splat onto the film
//! through explicit camera connections.

use ember_core::spectrum::is_black;
use ember_core::{Light, Scene, Spectrum};
use ember_math::{Ray, Vec2, Vec3};
use rand::RngCore;

use super::{spawn_ray, Integrator, RenderContext};
use crate::bxdf::canonical;
use crate::film::Film;
use crate::sampler::{PixelSample, SampleRequests};
use crate::scattering::ScatteringEvent;

/// Start one walk at a uniformly chosen light. Returns the emitted ray and
/// the path throughput with every start PDF already divided out.
pub(crate) fn start_light_walk(
    ctx: &RenderContext,
    rng: &mut dyn RngCore,
) -> Option<(Ray, Spectrum)> {
    let n = ctx.scene.lights.len();
    if n == 0 {
        return None;
    }
    let index = ((canonical(rng) * n as f32) as usize).min(n - 1);
    let light = &ctx.scene.lights[index];
    let pick_pdf = 1.0 / n as f32;

    let (center, radius) = ctx.scene.world_sphere();
    let le = light.sample_le(
        [
            canonical(rng),
            canonical(rng),
            canonical(rng),
            canonical(rng),
        ],
        center,
        radius,
    );
    let pdf = pick_pdf * le.pdf_pos * le.pdf_dir;
    if pdf <= 0.0 || is_black(le.radiance) {
        return None;
    }

    // Surface emitters radiate by the projected area.
    let cos_term = match light {
        Light::Area { .. } => le.normal.dot(le.ray.direction).abs(),
        _ => 1.0,
    };

    Some((le.ray, le.radiance * (cos_term / pdf)))
}

/// Splat the camera connection of one light-path vertex.
///
/// The pixel response combines the camera importance, the geometric
/// coupling of the connection and the pixel count that converts the
/// film-wide measure to a per-pixel one.
pub(crate) fn connect_to_camera(
    ctx: &RenderContext,
    film: &Film,
    se: &ScatteringEvent,
    isect: &ember_core::Intersection,
    wo: Vec3,
    beta: Spectrum,
) {
    let Some(conn) = ctx.scene.camera.connect(isect.point) else {
        return;
    };
    let f = se.bsdf.f(wo, conn.wi);
    if is_black(f) {
        return;
    }
    if !ctx.unoccluded(isect, conn.wi, conn.dist) {
        return;
    }
    let num_pixels = (film.width * film.height) as f32;
    let scale = conn.we * num_pixels / conn.pdf;
    film.splat_raster(conn.raster, beta * f * scale);
}

pub struct LightTracing {
    max_depth: u32,
}

impl LightTracing {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }
}

impl Integrator for LightTracing {
    fn request_samples(&mut self, _scene: &Scene, _req: &mut SampleRequests) {}

    fn li(
        &self,
        ctx: &RenderContext,
        _ray: &Ray,
        _sample: &PixelSample,
        rng: &mut dyn RngCore,
        film: &Film,
    ) -> Spectrum {
        // One light walk per pixel sample; everything lands on the film via
        // splats, nothing flows back along the camera ray.
        let Some((mut ray, mut beta)) = start_light_walk(ctx, rng) else {
            return Spectrum::ZERO;
        };

        for _ in 0..self.max_depth {
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
                connect_to_camera(ctx, film, &se, &isect, wo, beta);
            }

            let u = Vec2::new(canonical(rng), canonical(rng));
            let s = se.bsdf.sample_f(wo, u, rng);
            if s.pdf == 0.0 || is_black(s.f) {
                break;
            }
            beta *= s.f / s.pdf;
            ray = spawn_ray(&isect, s.wi);

            // Roulette keeps long walks honest without biasing them.
            let q = beta.max_element().min(0.95);
            if canonical(rng) >= q {
                break;
            }
            beta /= q;
        }

        Spectrum::ZERO
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

    #[test]
    fn test_light_tracing_splats_energy() {
        // A lit diffuse floor in front of the camera must leave some energy
        // on the film through splats alone.
        let mut scene = Scene::new(PerspectiveCamera::new(
            Vec3::new(0.0, 2.0, 4.0),
            Vec3::ZERO,
            Vec3::Y,
            1.2,
            16,
            16,
        ));
        let mat = scene.add_material(Material::new(
            "floor",
            Closure::Lambert {
                albedo: Spectrum::splat(0.8),
            },
        ));
        scene.add_primitive(Primitive::new(
            Shape::Square {
                center: Vec3::ZERO,
                eu: Vec3::X * 3.0,
                ev: Vec3::Z * 3.0,
            },
            mat,
        ));
        scene.add_area_light(
            Shape::Square {
                center: Vec3::new(0.0, 4.0, 0.0),
                eu: Vec3::X,
                ev: Vec3::Z,
            },
            0,
            Spectrum::splat(5.0),
            false,
        );

        let lt = LightTracing::new(4);
        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };
        let film = Film::new(16, 16);
        let mut rng = StdRng::seed_from_u64(12);
        let req = SampleRequests::new();
        let samples = Sampler::Random.generate_pixel(&req, 256, &mut rng);

        let camera_ray = Ray::spawn(Vec3::new(0.0, 2.0, 4.0), -Vec3::Z);
        for s in &samples {
            let l = lt.li(&ctx, &camera_ray, s, &mut rng, &film);
            assert_eq!(l, Spectrum::ZERO);
        }

        let total: f32 = film.develop(1.0 / 256.0).iter().sum();
        assert!(total > 0.0, "light tracing deposited no energy");
    }

    #[test]
    fn test_no_lights_no_walk() {
        let scene = Scene::new(PerspectiveCamera::new(
            Vec3::ZERO,
            Vec3::Z,
            Vec3::Y,
            1.0,
            4,
            4,
        ));
        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(start_light_walk(&ctx, &mut rng).is_none());
    }
}
