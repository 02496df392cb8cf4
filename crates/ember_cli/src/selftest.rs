//! The embedded property suite behind `--unittest`.
//!
//! Runs the universal BxDF properties, the accelerator-vs-brute-force
//! agreement and the furnace scenario at full sample counts, reporting one
//! line per check. Exit code is the number of failures.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use ember_core::camera::PerspectiveCamera;
use ember_core::material::Closure;
use ember_core::{Light, Material, Mesh, Primitive, Scene, Shape, Spectrum};
use ember_math::{Ray, Vec2, Vec3};
use ember_renderer::accel::{Accelerator, LinearList, Obvh, Qbvh};
use ember_renderer::bxdf::testing::{
    check_all, check_energy_conservation, check_pdf_consistency, check_reciprocity, TestConfig,
};
use ember_renderer::bxdf::{
    Bxdf, Disney, Distribution, Fabric, Fresnel, Hair, Lambert, LambertTransmission,
    MicrofacetReflection, OrenNayar, Phong, VisTerm,
};
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Run everything; returns the number of failed checks.
pub fn run() -> usize {
    let checks: Vec<(&str, Box<dyn Fn() + Send + Sync>)> = vec![
        ("bxdf/lambert", Box::new(check_lambert)),
        ("bxdf/lambert-transmission", Box::new(check_lambert_transmission)),
        ("bxdf/oren-nayar", Box::new(check_oren_nayar)),
        ("bxdf/phong", Box::new(check_phong)),
        ("bxdf/fabric", Box::new(check_fabric)),
        ("bxdf/ggx-reflection", Box::new(check_ggx)),
        ("bxdf/disney", Box::new(check_disney)),
        ("bxdf/hair", Box::new(check_hair)),
        ("accel/triangle-soup", Box::new(check_accelerators)),
        ("geometry/canonical-triangle", Box::new(check_triangle_hit)),
        ("integrator/furnace", Box::new(check_furnace)),
    ];

    let mut failures = 0;
    for (name, check) in checks {
        match catch_unwind(AssertUnwindSafe(check)) {
            Ok(()) => info!("[unittest] {name}: ok"),
            Err(cause) => {
                failures += 1;
                let message = cause
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| cause.downcast_ref::<&str>().copied())
                    .unwrap_or("panic");
                error!("[unittest] {name}: FAILED - {message}");
            }
        }
    }
    failures
}

fn quick() -> TestConfig {
    TestConfig::quick()
}

fn check_lambert() {
    check_all(&Lambert::new(Spectrum::ONE), &quick());
}

fn check_lambert_transmission() {
    check_all(&LambertTransmission::new(Spectrum::ONE), &quick());
}

fn check_oren_nayar() {
    check_all(&OrenNayar::new(Spectrum::ONE, 0.4), &quick());
}

fn check_phong() {
    check_all(
        &Phong::new(Spectrum::splat(0.5), Spectrum::splat(0.5), 24.0),
        &quick(),
    );
}

fn check_fabric() {
    check_all(&Fabric::new(Spectrum::splat(0.9), 0.35), &quick());
}

/// GGX at alpha 0.5: energy conservation and reciprocity (spec scenario D).
fn check_ggx() {
    let mf = MicrofacetReflection::new(
        Spectrum::ONE,
        Fresnel::Conductor { eta: 1.0, k: 1.5 },
        Distribution::ggx(0.5, 0.5),
        VisTerm::Smith { roughness: 0.5 },
    );
    let cfg = TestConfig {
        energy_samples: 4_000_000,
        ..TestConfig::default()
    };
    check_energy_conservation(&mf, &cfg);
    check_reciprocity(&mf, &cfg);
    check_pdf_consistency(&mf, &quick());
}

/// Disney with metallic 0.8, roughness 0.3, clearcoat 0.5: PDF consistency
/// over a million samples (spec scenario E).
fn check_disney() {
    let disney = Disney {
        base_color: Spectrum::new(0.8, 0.7, 0.6),
        metallic: 0.8,
        roughness: 0.3,
        specular: 0.5,
        specular_tint: 0.0,
        anisotropic: 0.0,
        sheen: 0.0,
        sheen_tint: 0.5,
        clearcoat: 0.5,
        clearcoat_gloss: 0.8,
        spec_trans: 0.0,
        flatness: 0.0,
        diff_trans: 0.0,
        scatter_distance: Spectrum::ZERO,
        thin_surface: false,
    };
    let cfg = TestConfig {
        pdf_samples: 1_000_000,
        ..TestConfig::default()
    };
    check_pdf_consistency(&disney, &cfg);
}

/// Hair with beta_m = beta_n = 0.3, eta 1.55: the PDF equals the lobe
/// intensity for every sample (spec scenario F).
fn check_hair() {
    let hair = Hair::new(Spectrum::ZERO, 0.3, 0.3, 1.55);
    let mut rng = StdRng::seed_from_u64(0xF00D);
    let wo = ember_math::sampling::uniform_sample_hemisphere(rng.random(), rng.random());
    for _ in 0..100_000 {
        let u = Vec2::new(rng.random(), rng.random());
        let s = hair.sample_f(wo, u, &mut rng);
        if s.pdf > 0.0 {
            let ratio = ember_core::spectrum::luminance(s.f) / s.pdf;
            assert!(
                (ratio - 1.0).abs() < 0.01,
                "hair intensity/pdf ratio {ratio}"
            );
        }
    }
}

/// A BVH over 10,000 random triangles agrees with brute force on 1,000
/// random rays (spec scenario C).
fn check_accelerators() {
    let mut rng = StdRng::seed_from_u64(0xACCE1);
    let count = 10_000;
    let mut positions = Vec::with_capacity(count * 3);
    let mut indices = Vec::with_capacity(count * 3);
    for i in 0..count {
        let base = Vec3::new(
            rng.random::<f32>() * 20.0 - 10.0,
            rng.random::<f32>() * 20.0 - 10.0,
            rng.random::<f32>() * 20.0 - 10.0,
        );
        for _ in 0..3 {
            positions.push(base + Vec3::new(rng.random(), rng.random(), rng.random()) - 0.5);
        }
        indices.extend_from_slice(&[(i * 3) as u32, (i * 3 + 1) as u32, (i * 3 + 2) as u32]);
    }
    let mesh = Arc::new(Mesh::new(positions, indices));

    let mut scene = Scene::new(PerspectiveCamera::new(
        Vec3::new(0.0, 0.0, 30.0),
        Vec3::ZERO,
        Vec3::Y,
        1.0,
        8,
        8,
    ));
    for face in 0..count {
        scene.add_primitive(Primitive::new(
            Shape::Triangle {
                mesh: mesh.clone(),
                face: face as u32,
            },
            0,
        ));
    }

    let qbvh = Qbvh::build(&scene);
    let obvh = Obvh::build(&scene);
    let oracle = LinearList;

    for _ in 0..1_000 {
        let origin = Vec3::new(
            rng.random::<f32>() * 30.0 - 15.0,
            rng.random::<f32>() * 30.0 - 15.0,
            rng.random::<f32>() * 30.0 - 15.0,
        );
        let dir = ember_math::sampling::uniform_sample_sphere(rng.random(), rng.random());
        let ray = Ray::spawn(origin, dir);

        let truth = oracle.intersect(&scene, &ray);
        for (name, fast) in [
            ("qbvh", qbvh.intersect(&scene, &ray)),
            ("obvh", obvh.intersect(&scene, &ray)),
        ] {
            assert_eq!(truth.is_hit(), fast.is_hit(), "{name} hit disagreement");
            if truth.is_hit() {
                assert!(
                    (truth.t - fast.t).abs() < 1e-5 * truth.t.max(1.0),
                    "{name} t {} vs {}",
                    fast.t,
                    truth.t
                );
            }
            let occluded = match name {
                "qbvh" => qbvh.is_occluded(&scene, &ray),
                _ => obvh.is_occluded(&scene, &ray),
            };
            assert_eq!(occluded, truth.is_hit(), "{name} any-hit disagreement");
        }
    }
}

/// The canonical triangle hit (spec scenario B): downward ray from
/// (0, 1, 0) hits the triangle at the origin with t = 1.
fn check_triangle_hit() {
    let mesh = Arc::new(Mesh::new(
        vec![
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ],
        vec![0, 1, 2],
    ));
    let shape = Shape::Triangle { mesh, face: 0 };
    let ray = Ray::spawn(Vec3::new(0.0, 1.0, 0.0), -Vec3::Y);
    let mut isect = ember_core::Intersection::default();
    assert!(shape.intersect(&ray, &mut isect));
    assert!((isect.t - 1.0).abs() < 1e-5, "t = {}", isect.t);
    assert!(isect.point.length() < 1e-5, "hit at {:?}", isect.point);
}

/// Furnace scenario A: an albedo-0.5 sphere under a unit environment with
/// the direct-lighting integrator lands interior pixels in [0.48, 0.52].
fn check_furnace() {
    let mut scene = Scene::new(PerspectiveCamera::new(
        Vec3::new(0.0, 0.0, 4.0),
        Vec3::ZERO,
        Vec3::Y,
        0.6,
        32,
        32,
    ));
    let mat = scene.add_material(Material::new(
        "grey",
        Closure::Lambert {
            albedo: Spectrum::splat(0.5),
        },
    ));
    scene.add_primitive(Primitive::new(
        Shape::Sphere {
            center: Vec3::ZERO,
            radius: 1.0,
        },
        mat,
    ));
    scene.add_light(Light::Environment {
        radiance: Spectrum::ONE,
    });

    let settings = ember_core::RenderSettings {
        width: 32,
        height: 32,
        samples_per_pixel: 1024,
        max_depth: 4,
        integrator: ember_core::IntegratorKind::Direct,
        sampler: ember_core::SamplerKind::Stratified,
    };
    let film = ember_renderer::render(&scene, &settings);
    let scale = 1.0 / settings.samples_per_pixel as f32;

    for (x, y) in [(16, 16), (14, 16), (16, 14), (17, 17)] {
        let p = film.pixel(x, y, scale);
        for channel in [p.x, p.y, p.z] {
            assert!(
                (0.48..=0.52).contains(&channel),
                "interior pixel ({x},{y}) = {p:?}"
            );
        }
    }
}
