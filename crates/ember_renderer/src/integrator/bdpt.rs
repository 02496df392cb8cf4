//! Bidirectional path tracing.
//!
//! One camera subpath and one light subpath per pixel sample; every pairing
//! of their vertices is a strategy, weighted by the balance heuristic over
//! all decompositions of the same path length. Forward and reverse vertex
//! densities are tracked in area measure; the junction densities of each
//! strategy override the stored ones when the weight is evaluated.

use ember_core::spectrum::is_black;
use ember_core::{Intersection, Light, Scene, Spectrum};
use ember_math::{Ray, Vec2, Vec3};
use rand::RngCore;

use super::light_tracing::start_light_walk;
use super::{spawn_ray, Integrator, RenderContext};
use crate::bxdf::canonical;
use crate::film::Film;
use crate::sampler::{PixelSample, SampleRequests};
use crate::scattering::ScatteringEvent;

#[derive(Clone, Copy, PartialEq)]
enum VertexKind {
    Camera,
    Light { index: usize },
    Surface,
}

struct Vertex {
    kind: VertexKind,
    isect: Intersection,
    se: Option<ScatteringEvent>,
    /// Direction toward the previous vertex of the walk.
    wo: Vec3,
    beta: Spectrum,
    /// Area-measure density of reaching this vertex along the walk.
    pdf_fwd: f32,
    /// Area-measure density of reaching it from the opposite walk.
    pdf_rev: f32,
    delta: bool,
}

impl Vertex {
    fn point(&self) -> Vec3 {
        self.isect.point
    }

    fn normal(&self) -> Vec3 {
        self.isect.normal
    }

    fn f(&self, dir: Vec3) -> Spectrum {
        match &self.se {
            Some(se) => se.bsdf.f(self.wo, dir),
            None => Spectrum::ZERO,
        }
    }

    fn pdf_dir(&self, wo: Vec3, wi: Vec3) -> f32 {
        match &self.se {
            Some(se) => se.bsdf.pdf(wo, wi),
            None => 0.0,
        }
    }

    fn connectible(&self) -> bool {
        match self.kind {
            VertexKind::Surface => self
                .se
                .as_ref()
                .map(|se| se.bsdf.has_non_specular())
                .unwrap_or(false),
            _ => !self.delta,
        }
    }
}

/// Convert a solid-angle density at `from` into an area density at `to`.
fn convert_pdf(pdf_dir: f32, from: Vec3, to_point: Vec3, to_normal: Vec3) -> f32 {
    let d = to_point - from;
    let dist_sq = d.length_squared();
    if dist_sq < 1e-10 {
        return 0.0;
    }
    let dir = d / dist_sq.sqrt();
    pdf_dir * to_normal.dot(dir).abs() / dist_sq
}

fn synthetic_isect(point: Vec3, normal: Vec3) -> Intersection {
    Intersection {
        point,
        normal,
        gnormal: normal,
        t: 0.0,
        primitive: None,
        ..Default::default()
    }
}

pub struct Bdpt {
    max_depth: u32,
}

impl Bdpt {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    fn max_vertices(&self) -> usize {
        self.max_depth as usize + 1
    }

    fn camera_subpath(
        &self,
        ctx: &RenderContext,
        ray: &Ray,
        rng: &mut dyn RngCore,
    ) -> Vec<Vertex> {
        let mut path = Vec::with_capacity(self.max_vertices() + 1);
        path.push(Vertex {
            kind: VertexKind::Camera,
            isect: synthetic_isect(ray.origin, ray.direction),
            se: None,
            wo: Vec3::ZERO,
            beta: Spectrum::ONE,
            pdf_fwd: 1.0,
            pdf_rev: 0.0,
            delta: false,
        });
        let pdf_dir = ctx.scene.camera.pdf_we(ray.direction);
        self.random_walk(ctx, &mut path, *ray, Spectrum::ONE, pdf_dir, rng);
        path
    }

    fn light_subpath(&self, ctx: &RenderContext, rng: &mut dyn RngCore) -> Vec<Vertex> {
        let mut path: Vec<Vertex> = Vec::with_capacity(self.max_vertices() + 1);
        let n = ctx.scene.lights.len();
        if n == 0 {
            return path;
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
        if le.pdf_pos <= 0.0 || le.pdf_dir <= 0.0 || is_black(le.radiance) {
            return path;
        }

        let origin_beta = le.radiance / (pick_pdf * le.pdf_pos);
        path.push(Vertex {
            kind: VertexKind::Light { index },
            isect: synthetic_isect(le.ray.origin, le.normal),
            se: None,
            wo: Vec3::ZERO,
            beta: origin_beta,
            pdf_fwd: pick_pdf * le.pdf_pos,
            pdf_rev: 0.0,
            delta: light.is_delta(),
        });

        let cos_term = match light {
            Light::Area { .. } => le.normal.dot(le.ray.direction).abs(),
            _ => 1.0,
        };
        let walk_beta = origin_beta * (cos_term / le.pdf_dir);
        self.random_walk(ctx, &mut path, le.ray, walk_beta, le.pdf_dir, rng);
        path
    }

    fn random_walk(
        &self,
        ctx: &RenderContext,
        path: &mut Vec<Vertex>,
        mut ray: Ray,
        mut beta: Spectrum,
        mut pdf_dir: f32,
        rng: &mut dyn RngCore,
    ) {
        if pdf_dir <= 0.0 {
            return;
        }
        while path.len() <= self.max_vertices() {
            let isect = ctx.intersect(&ray);
            if !isect.is_hit() {
                break;
            }
            let wo = -ray.direction;
            let se = ScatteringEvent::new(ctx.scene, &isect, wo);
            let prev_point = path.last().map(|v| v.point()).unwrap_or(ray.origin);
            let pdf_fwd = convert_pdf(pdf_dir, prev_point, isect.point, isect.normal);

            let delta = se.bsdf.is_delta();
            path.push(Vertex {
                kind: VertexKind::Surface,
                isect,
                se: Some(se),
                wo,
                beta,
                pdf_fwd,
                pdf_rev: 0.0,
                delta,
            });
            if path.len() > self.max_vertices() {
                break;
            }

            let cur = path.len() - 1;
            let u = Vec2::new(canonical(rng), canonical(rng));
            let s = path[cur].se.as_ref().unwrap().bsdf.sample_f(wo, u, rng);
            if s.pdf == 0.0 || is_black(s.f) {
                break;
            }

            // Reverse density of the previous vertex, seen from here.
            let rev_dir = path[cur].pdf_dir(s.wi, wo);
            let (cur_point, prev_point, prev_normal) = (
                path[cur].point(),
                path[cur - 1].point(),
                path[cur - 1].normal(),
            );
            path[cur - 1].pdf_rev = convert_pdf(rev_dir, cur_point, prev_point, prev_normal);

            beta *= s.f / s.pdf;
            pdf_dir = s.pdf;
            ray = spawn_ray(&path[cur].isect, s.wi);
        }
    }

    /// Balance-heuristic weight of strategy (s, t). Junction overrides are
    /// (light[s-1], light[s-2], cam[t-1], cam[t-2]) reverse densities.
    #[allow(clippy::too_many_arguments)]
    fn mis_weight(
        &self,
        cam: &[Vertex],
        light: &[Vertex],
        s: usize,
        t: usize,
        qs_rev: Option<f32>,
        qs_minus_rev: Option<f32>,
        qt_rev: Option<f32>,
        qt_minus_rev: Option<f32>,
    ) -> f32 {
        if s + t == 2 {
            return 1.0;
        }

        let remap = |p: f32| if p > 0.0 { p } else { 1.0 };
        let cam_rev = |i: usize| {
            if i == t - 1 {
                qt_rev.unwrap_or(cam[i].pdf_rev)
            } else if i + 2 == t && qt_minus_rev.is_some() {
                qt_minus_rev.unwrap()
            } else {
                cam[i].pdf_rev
            }
        };
        let light_rev = |i: usize| {
            if s > 0 && i == s - 1 {
                qs_rev.unwrap_or(light[i].pdf_rev)
            } else if s > 1 && i + 2 == s && qs_minus_rev.is_some() {
                qs_minus_rev.unwrap()
            } else {
                light[i].pdf_rev
            }
        };

        let mut sum_ri = 0.0f32;

        // Alternative strategies that shorten the camera side.
        let mut ri = 1.0f32;
        for i in (1..t).rev() {
            ri *= remap(cam_rev(i)) / remap(cam[i].pdf_fwd);
            if !cam[i].delta && !cam[i - 1].delta {
                sum_ri += ri;
            }
        }

        // Alternative strategies that shorten the light side.
        let mut ri = 1.0f32;
        for i in (0..s).rev() {
            ri *= remap(light_rev(i)) / remap(light[i].pdf_fwd);
            let prev_delta = if i > 0 { light[i - 1].delta } else { false };
            if !light[i].delta && !prev_delta {
                sum_ri += ri;
            }
        }

        1.0 / (1.0 + sum_ri)
    }
}

impl Integrator for Bdpt {
    fn request_samples(&mut self, _scene: &Scene, _req: &mut SampleRequests) {}

    fn li(
        &self,
        ctx: &RenderContext,
        ray: &Ray,
        _sample: &PixelSample,
        rng: &mut dyn RngCore,
        film: &Film,
    ) -> Spectrum {
        let cam = self.camera_subpath(ctx, ray, rng);
        if cam.len() == 1 {
            return ctx.scene.background(ray);
        }
        let light = self.light_subpath(ctx, rng);

        let mut l = Spectrum::ZERO;
        let num_pixels = (film.width * film.height) as f32;

        for t in 2..=cam.len() {
            // Strategy s = 0: the camera path found an emitter on its own.
            let qt = &cam[t - 1];
            if let Some(light_ref) = ctx.scene.light_at(&qt.isect) {
                let le = light_ref.emission(qt.isect.gnormal, qt.wo);
                if !is_black(le) {
                    let (_, radius) = ctx.scene.world_sphere();
                    let pick_pdf = 1.0 / ctx.scene.lights.len().max(1) as f32;
                    let (pdf_pos, pdf_dir) =
                        light_ref.pdf_le(qt.isect.gnormal, -qt.wo, radius);
                    let qt_rev = Some(pick_pdf * pdf_pos);
                    let qt_minus_rev = Some(convert_pdf(
                        pdf_dir,
                        qt.point(),
                        cam[t - 2].point(),
                        cam[t - 2].normal(),
                    ));
                    let w =
                        self.mis_weight(&cam, &light, 0, t, None, None, qt_rev, qt_minus_rev);
                    l += qt.beta * le * w;
                }
            }

            // Connection strategies against every light vertex.
            for s in 1..=light.len() {
                let depth = s + t;
                if depth < 3 || depth > self.max_vertices() + 2 {
                    continue;
                }
                let qt = &cam[t - 1];
                let qs = &light[s - 1];
                if !qt.connectible() || !qs.connectible() {
                    continue;
                }

                let to_light = qs.point() - qt.point();
                let dist_sq = to_light.length_squared();
                if dist_sq < 1e-8 {
                    continue;
                }
                let dist = dist_sq.sqrt();
                let dir = to_light / dist;

                let f_t = qt.f(dir);
                if is_black(f_t) {
                    continue;
                }

                // Endpoint factor on the light side.
                let (endpoint, qs_pdf_dir_toward_qt) = match (s, qs.kind) {
                    (1, VertexKind::Light { index }) => {
                        let light_ref = &ctx.scene.lights[index];
                        let side = light_ref.emission(qs.normal(), -dir);
                        if is_black(side) {
                            continue;
                        }
                        let cos_l = qs.normal().dot(-dir).abs();
                        let (_, radius) = ctx.scene.world_sphere();
                        let (_, pdf_dir) = light_ref.pdf_le(qs.normal(), -dir, radius);
                        (Spectrum::ONE * (cos_l / dist_sq), pdf_dir)
                    }
                    _ => {
                        let f_s = qs.f(-dir);
                        if is_black(f_s) {
                            continue;
                        }
                        (f_s / dist_sq, qs.pdf_dir(qs.wo, -dir))
                    }
                };

                if !ctx.unoccluded(&qt.isect, dir, dist) {
                    continue;
                }

                // Junction reverse densities for the weight.
                let qt_rev = Some(convert_pdf(
                    qs_pdf_dir_toward_qt,
                    qs.point(),
                    qt.point(),
                    qt.normal(),
                ));
                let qs_rev = Some(convert_pdf(
                    qt.pdf_dir(qt.wo, dir),
                    qt.point(),
                    qs.point(),
                    qs.normal(),
                ));
                let qt_minus_rev = {
                    let rev_dir = qt.pdf_dir(dir, qt.wo);
                    Some(convert_pdf(
                        rev_dir,
                        qt.point(),
                        cam[t - 2].point(),
                        cam[t - 2].normal(),
                    ))
                };
                let qs_minus_rev = if s >= 2 {
                    let rev_dir = qs.pdf_dir(-dir, qs.wo);
                    Some(convert_pdf(
                        rev_dir,
                        qs.point(),
                        light[s - 2].point(),
                        light[s - 2].normal(),
                    ))
                } else {
                    None
                };

                let w = self.mis_weight(
                    &cam,
                    &light,
                    s,
                    t,
                    qs_rev,
                    qs_minus_rev,
                    qt_rev,
                    qt_minus_rev,
                );
                l += qt.beta * f_t * endpoint * qs.beta * w;
            }
        }

        // Strategies with t = 1: splat light vertices through the lens.
        for s in 2..=light.len() {
            let qs = &light[s - 1];
            if !qs.connectible() {
                continue;
            }
            let Some(conn) = ctx.scene.camera.connect(qs.point()) else {
                continue;
            };
            let f = qs.f(conn.wi);
            if is_black(f) {
                continue;
            }
            if !ctx.unoccluded(&qs.isect, conn.wi, conn.dist) {
                continue;
            }

            let qs_rev = Some(convert_pdf(
                ctx.scene.camera.pdf_we(-conn.wi),
                ctx.scene.camera.eye,
                qs.point(),
                qs.normal(),
            ));
            let qs_minus_rev = {
                let rev_dir = qs.pdf_dir(conn.wi, qs.wo);
                Some(convert_pdf(
                    rev_dir,
                    qs.point(),
                    light[s - 2].point(),
                    light[s - 2].normal(),
                ))
            };
            let w = self.mis_weight(&cam[..1], &light, s, 1, qs_rev, qs_minus_rev, None, None);

            let scale = conn.we * num_pixels / conn.pdf;
            film.splat_raster(conn.raster, qs.beta * f * (scale * w));
        }

        l
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::LinearList;
    use crate::integrator::PathTracing;
    use crate::sampler::Sampler;
    use ember_core::camera::PerspectiveCamera;
    use ember_core::material::Closure;
    use ember_core::{Material, Primitive, Shape};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lit_floor_scene() -> Scene {
        let mut scene = Scene::new(PerspectiveCamera::new(
            Vec3::new(0.0, 2.0, 6.0),
            Vec3::ZERO,
            Vec3::Y,
            1.0,
            16,
            16,
        ));
        let mat = scene.add_material(Material::new(
            "floor",
            Closure::Lambert {
                albedo: Spectrum::splat(0.6),
            },
        ));
        scene.add_primitive(Primitive::new(
            Shape::Square {
                center: Vec3::ZERO,
                eu: Vec3::X * 4.0,
                ev: Vec3::Z * 4.0,
            },
            mat,
        ));
        scene.add_area_light(
            Shape::Square {
                center: Vec3::new(0.0, 5.0, 0.0),
                eu: Vec3::X,
                ev: Vec3::Z,
            },
            0,
            Spectrum::splat(8.0),
            false,
        );
        scene
    }

    #[test]
    fn test_bdpt_agrees_with_path_tracing() {
        // Both unbiased integrators must converge to the same image for a
        // diffuse floor under an area light. Compare whole films so the
        // splatted strategies are counted.
        use crate::renderer::render_with;
        use crate::sampler::SampleRequests as Req;
        use ember_core::{IntegratorKind, RenderSettings, SamplerKind};
        use std::sync::atomic::AtomicBool;

        let scene = lit_floor_scene();
        let accel = LinearList;
        let settings = |kind| RenderSettings {
            width: 16,
            height: 16,
            samples_per_pixel: 512,
            max_depth: 5,
            integrator: kind,
            sampler: SamplerKind::Random,
        };
        let cancel = AtomicBool::new(false);

        let bdpt = Bdpt::new(5);
        let bdpt_settings = settings(IntegratorKind::Bdpt);
        let bdpt_film = render_with(
            &scene,
            &accel,
            &bdpt,
            &Req::new(),
            &bdpt_settings,
            &cancel,
        );

        let mut path = PathTracing::new(5);
        let mut preq = Req::new();
        path.request_samples(&scene, &mut preq);
        let path_settings = settings(IntegratorKind::Path);
        let path_film = render_with(&scene, &accel, &path, &preq, &path_settings, &cancel);

        let scale = 1.0 / 512.0;
        let bdpt_mean: f32 =
            bdpt_film.develop(scale).iter().sum::<f32>() / (16.0 * 16.0 * 3.0);
        let path_mean: f32 =
            path_film.develop(scale).iter().sum::<f32>() / (16.0 * 16.0 * 3.0);

        assert!(
            (bdpt_mean - path_mean).abs() < 0.12 * path_mean.max(0.05),
            "bdpt mean {bdpt_mean} vs path mean {path_mean}"
        );
    }

    #[test]
    fn test_bdpt_direct_light_hit() {
        // Looking straight at the emitter: only the s=0 strategy fires and
        // carries full weight.
        let scene = lit_floor_scene();
        let accel = LinearList;
        let ctx = RenderContext {
            scene: &scene,
            accel: &accel,
        };
        let film = Film::new(16, 16);
        let req = SampleRequests::new();
        let mut rng = StdRng::seed_from_u64(5);
        let samples = Sampler::Random.generate_pixel(&req, 64, &mut rng);

        let origin = Vec3::new(0.0, 2.0, 6.0);
        let to_light = (Vec3::new(0.0, 5.0, 0.0) - origin).normalize();
        let ray = Ray::spawn(origin, to_light);

        let bdpt = Bdpt::new(4);
        let mut total = Spectrum::ZERO;
        for s in &samples {
            total += bdpt.li(&ctx, &ray, s, &mut rng, &film);
        }
        let avg = total / 64.0;
        // The light is one-sided; from below the camera sees the emitting
        // face.
        assert!((avg.x - 8.0).abs() < 0.5, "{avg:?}");
    }
}
