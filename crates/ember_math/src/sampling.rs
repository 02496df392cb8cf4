//! Sampling distributions and their PDFs.
//!
//! Directions are expressed in the local y-up shading frame. Every sampler
//! here has a matching `*_pdf` so integrators can form consistent Monte
//! Carlo estimators; the pairing is load-bearing for unbiasedness and is
//! exercised by the BxDF property tests.

use std::f32::consts::PI;

use crate::{Vec2, Vec3};

pub const INV_PI: f32 = 1.0 / PI;
pub const TWO_PI: f32 = 2.0 * PI;
pub const INV_TWO_PI: f32 = 1.0 / TWO_PI;
pub const FOUR_PI: f32 = 4.0 * PI;

/// Direction from spherical angles, y-up.
#[inline]
pub fn spherical_direction(theta: f32, phi: f32) -> Vec3 {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_phi, cos_phi) = phi.sin_cos();
    Vec3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi)
}

/// Map two uniforms to the unit disk with low distortion.
pub fn concentric_sample_disk(u: f32, v: f32) -> Vec2 {
    let offset = 2.0 * Vec2::new(u, v) - Vec2::ONE;
    if offset.x == 0.0 && offset.y == 0.0 {
        return Vec2::ZERO;
    }

    let (r, theta) = if offset.x.abs() > offset.y.abs() {
        (offset.x, (PI / 4.0) * (offset.y / offset.x))
    } else {
        (offset.y, (PI / 2.0) - (PI / 4.0) * (offset.x / offset.y))
    };
    r * Vec2::new(theta.cos(), theta.sin())
}

/// Cosine-weighted hemisphere sample around local +Y.
pub fn cosine_sample_hemisphere(u: f32, v: f32) -> Vec3 {
    let d = concentric_sample_disk(u, v);
    let y = (1.0 - d.x * d.x - d.y * d.y).max(0.0).sqrt();
    Vec3::new(d.x, y, d.y)
}

/// PDF of `cosine_sample_hemisphere` for a local direction.
#[inline]
pub fn cosine_hemisphere_pdf(w: Vec3) -> f32 {
    w.y.max(0.0) * INV_PI
}

/// Uniform hemisphere sample around local +Y.
pub fn uniform_sample_hemisphere(u: f32, v: f32) -> Vec3 {
    let cos_theta = u;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = TWO_PI * v;
    Vec3::new(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
}

#[inline]
pub fn uniform_hemisphere_pdf() -> f32 {
    INV_TWO_PI
}

/// Uniform sample over the full sphere.
pub fn uniform_sample_sphere(u: f32, v: f32) -> Vec3 {
    let cos_theta = 1.0 - 2.0 * u;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = TWO_PI * v;
    Vec3::new(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
}

#[inline]
pub fn uniform_sphere_pdf() -> f32 {
    1.0 / FOUR_PI
}

/// Uniform barycentric coordinates over a triangle.
pub fn uniform_sample_triangle(u: f32, v: f32) -> (f32, f32) {
    let su = u.sqrt();
    (1.0 - su, v * su)
}

/// Balance heuristic for two-strategy multiple importance sampling.
#[inline]
pub fn balance_heuristic(nf: f32, f_pdf: f32, ng: f32, g_pdf: f32) -> f32 {
    let f = nf * f_pdf;
    let g = ng * g_pdf;
    if f + g == 0.0 {
        return 0.0;
    }
    f / (f + g)
}

/// Power heuristic (exponent 2).
#[inline]
pub fn power_heuristic(nf: f32, f_pdf: f32, ng: f32, g_pdf: f32) -> f32 {
    let f = nf * f_pdf;
    let g = ng * g_pdf;
    if f + g == 0.0 {
        return 0.0;
    }
    (f * f) / (f * f + g * g)
}
