//! Ambient occlusion.

use ember_core::{Scene, Spectrum};
use ember_math::sampling::cosine_sample_hemisphere;
use ember_math::{Onb, Ray};
use rand::RngCore;

use super::{spawn_ray, Integrator, RenderContext};
use crate::film::Film;
use crate::sampler::{Offset2D, PixelSample, SampleRequests};

/// Fraction of the cosine-weighted hemisphere that escapes within
/// `max_distance`.
pub struct AmbientOcclusion {
    probes: usize,
    max_distance: f32,
    probe_samples: Option<Offset2D>,
}

impl AmbientOcclusion {
    pub fn new(probes: usize, max_distance: f32) -> Self {
        Self {
            probes: probes.max(1),
            max_distance,
            probe_samples: None,
        }
    }
}

impl Integrator for AmbientOcclusion {
    fn request_samples(&mut self, _scene: &Scene, req: &mut SampleRequests) {
        self.probe_samples = Some(req.request_2d(self.probes));
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
            return Spectrum::ZERO;
        }

        // Probe around the shading normal on the viewer's side.
        let n = if isect.normal.dot(ray.direction) > 0.0 {
            -isect.normal
        } else {
            isect.normal
        };
        let frame = Onb::from_normal(n);

        let mut unoccluded = 0usize;
        for i in 0..self.probes {
            let u = match self.probe_samples {
                Some(off) => sample.data_2d(off)[i],
                None => ember_math::Vec2::new(
                    crate::bxdf::canonical(rng),
                    crate::bxdf::canonical(rng),
                ),
            };
            let dir = frame.to_world(cosine_sample_hemisphere(u.x, u.y));
            let mut probe = spawn_ray(&isect, dir);
            probe.t_max = self.max_distance;
            if !ctx.is_occluded(&probe) {
                unoccluded += 1;
            }
        }

        Spectrum::splat(unoccluded as f32 / self.probes as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::LinearList;
    use crate::sampler::Sampler;
    use ember_core::camera::PerspectiveCamera;
    use ember_core::{Primitive, Shape};
    use ember_math::Vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_open_plane_is_white() {
        // A single ground square with nothing above it: every probe
        // escapes.
        let mut scene = Scene::new(PerspectiveCamera::new(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::ZERO,
            Vec3::Z,
            1.0,
            8,
            8,
        ));
        scene.add_primitive(Primitive::new(
            Shape::Square {
                center: Vec3::ZERO,
                eu: Vec3::X * 5.0,
                ev: Vec3::Z * 5.0,
            },
            0,
        ));

        let mut ao = AmbientOcclusion::new(16, 100.0);
        let mut req = SampleRequests::new();
        ao.request_samples(&scene, &mut req);

        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let samples = Sampler::Stratified.generate_pixel(&req, 1, &mut rng);
        let film = Film::new(8, 8);

        let ray = Ray::spawn(Vec3::new(0.0, 2.0, 0.0), -Vec3::Y);
        let l = ao.li(&ctx, &ray, &samples[0], &mut rng, &film);
        assert_eq!(l, Spectrum::ONE);
    }

    #[test]
    fn test_enclosed_point_is_black() {
        // Inside a sphere every probe hits the shell.
        let mut scene = Scene::new(PerspectiveCamera::new(
            Vec3::ZERO,
            Vec3::Z,
            Vec3::Y,
            1.0,
            8,
            8,
        ));
        scene.add_primitive(Primitive::new(
            Shape::Sphere {
                center: Vec3::ZERO,
                radius: 2.0,
            },
            0,
        ));

        let mut ao = AmbientOcclusion::new(8, 100.0);
        let mut req = SampleRequests::new();
        ao.request_samples(&scene, &mut req);

        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };
        let mut rng = StdRng::seed_from_u64(2);
        let samples = Sampler::Random.generate_pixel(&req, 1, &mut rng);
        let film = Film::new(8, 8);

        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        let l = ao.li(&ctx, &ray, &samples[0], &mut rng, &film);
        assert_eq!(l, Spectrum::ZERO);
    }
}
