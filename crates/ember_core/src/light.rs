//! Light sources.
//!
//! Area lights wrap an emissive primitive's shape and sample it in area
//! measure, converting to solid angle at the receiver. The environment light
//! answers escaped rays and closes the furnace-test loop. Delta lights
//! (point, distant) report `pdf_li = 0` for directions chosen by anything
//! but themselves, which keeps the MIS weights correct.

use std::f32::consts::PI;

use ember_math::sampling::{
    concentric_sample_disk, cosine_hemisphere_pdf, cosine_sample_hemisphere, uniform_sample_sphere,
    uniform_sphere_pdf, FOUR_PI, INV_PI,
};
use ember_math::{Onb, Ray, Vec3};

use crate::shape::Shape;
use crate::spectrum::{luminance, Spectrum};

/// Result of sampling a light from a shading point.
#[derive(Debug, Clone, Copy)]
pub struct LightSample {
    /// Direction from the shading point toward the light.
    pub wi: Vec3,
    /// Distance to the sampled point (infinite for distant/environment).
    pub dist: f32,
    /// Solid-angle PDF at the shading point; zero means unusable.
    pub pdf: f32,
    /// Incident radiance along `wi`, not yet shadow-tested.
    pub radiance: Spectrum,
}

/// Result of sampling an emitted ray from a light (light tracing, BDPT,
/// instant radiosity).
#[derive(Debug, Clone)]
pub struct LightEmission {
    pub ray: Ray,
    /// Surface normal at the emission point (direction of travel for delta
    /// directional emitters).
    pub normal: Vec3,
    /// Area-measure PDF of the origin point.
    pub pdf_pos: f32,
    /// Solid-angle PDF of the emitted direction.
    pub pdf_dir: f32,
    pub radiance: Spectrum,
}

#[derive(Debug, Clone)]
pub enum Light {
    Point {
        position: Vec3,
        intensity: Spectrum,
    },
    /// Parallel light arriving from `-direction`; `direction` is the travel
    /// direction of the emitted light.
    Distant {
        direction: Vec3,
        radiance: Spectrum,
    },
    /// Emissive primitive. `primitive` is the scene index carrying the
    /// back-reference; the shape is shared with it.
    Area {
        primitive: u32,
        shape: Shape,
        radiance: Spectrum,
        two_sided: bool,
    },
    /// Constant-radiance dome over the whole sphere of directions.
    Environment { radiance: Spectrum },
}

impl Light {
    /// Delta lights cannot be hit by BSDF samples.
    pub fn is_delta(&self) -> bool {
        matches!(self, Light::Point { .. } | Light::Distant { .. })
    }

    /// Sample an incident direction from the shading point `p`.
    pub fn sample_li(&self, p: Vec3, u: f32, v: f32) -> LightSample {
        match self {
            Light::Point {
                position,
                intensity,
            } => {
                let to_light = *position - p;
                let dist_sq = to_light.length_squared().max(1e-8);
                let dist = dist_sq.sqrt();
                LightSample {
                    wi: to_light / dist,
                    dist,
                    pdf: 1.0,
                    radiance: *intensity / dist_sq,
                }
            }
            Light::Distant {
                direction,
                radiance,
            } => LightSample {
                wi: -*direction,
                dist: f32::INFINITY,
                pdf: 1.0,
                radiance: *radiance,
            },
            Light::Area {
                shape,
                radiance,
                two_sided,
                ..
            } => {
                let (q, wi, pdf) = shape.sample_toward(p, u, v);
                if pdf == 0.0 {
                    return LightSample {
                        wi,
                        dist: 0.0,
                        pdf: 0.0,
                        radiance: Spectrum::ZERO,
                    };
                }
                // Emission only on the lit side unless two sided.
                let mut scratch = crate::primitive::Intersection::default();
                let facing = shape.intersect(&Ray::spawn(p, wi), &mut scratch)
                    && (*two_sided || scratch.gnormal.dot(-wi) > 0.0);
                LightSample {
                    wi,
                    dist: (q - p).length(),
                    pdf,
                    radiance: if facing { *radiance } else { Spectrum::ZERO },
                }
            }
            Light::Environment { radiance } => {
                let wi = uniform_sample_sphere(u, v);
                LightSample {
                    wi,
                    dist: f32::INFINITY,
                    pdf: uniform_sphere_pdf(),
                    radiance: *radiance,
                }
            }
        }
    }

    /// Solid-angle PDF of `sample_li` choosing direction `wi` from `p`.
    pub fn pdf_li(&self, p: Vec3, wi: Vec3) -> f32 {
        match self {
            Light::Point { .. } | Light::Distant { .. } => 0.0,
            Light::Area { shape, .. } => shape.pdf_toward(p, wi),
            Light::Environment { .. } => uniform_sphere_pdf(),
        }
    }

    /// Radiance carried by a ray that escaped the scene.
    pub fn le(&self, _ray: &Ray) -> Spectrum {
        match self {
            Light::Environment { radiance } => *radiance,
            _ => Spectrum::ZERO,
        }
    }

    /// Emitted radiance from a point on an area light toward `wo`.
    pub fn emission(&self, normal: Vec3, wo: Vec3) -> Spectrum {
        match self {
            Light::Area {
                radiance,
                two_sided,
                ..
            } => {
                if *two_sided || normal.dot(wo) > 0.0 {
                    *radiance
                } else {
                    Spectrum::ZERO
                }
            }
            _ => Spectrum::ZERO,
        }
    }

    /// Approximate emitted power, for light-selection distributions.
    pub fn power(&self, world_radius: f32) -> f32 {
        match self {
            Light::Point { intensity, .. } => FOUR_PI * luminance(*intensity),
            Light::Distant { radiance, .. } => {
                PI * world_radius * world_radius * luminance(*radiance)
            }
            Light::Area {
                shape,
                radiance,
                two_sided,
                ..
            } => {
                let sides = if *two_sided { 2.0 } else { 1.0 };
                sides * PI * shape.surface_area() * luminance(*radiance)
            }
            Light::Environment { radiance } => {
                FOUR_PI * PI * world_radius * world_radius * luminance(*radiance)
            }
        }
    }

    /// PDFs `sample_le` would assign to an emission from `normal` along
    /// `dir`: the positional density in area measure and the directional
    /// density in solid angle. Delta directions report zero.
    pub fn pdf_le(&self, normal: Vec3, dir: Vec3, world_radius: f32) -> (f32, f32) {
        match self {
            Light::Point { .. } => (1.0, uniform_sphere_pdf()),
            Light::Distant { .. } => (1.0 / (PI * world_radius * world_radius), 0.0),
            Light::Area {
                shape, two_sided, ..
            } => {
                let cos = normal.dot(dir);
                let pdf_dir = if *two_sided {
                    cos.abs() * INV_PI * 0.5
                } else {
                    cos.max(0.0) * INV_PI
                };
                (1.0 / shape.surface_area(), pdf_dir)
            }
            Light::Environment { .. } => (
                1.0 / (PI * world_radius * world_radius),
                uniform_sphere_pdf(),
            ),
        }
    }

    /// Sample an emitted ray, for walks that start at the light.
    pub fn sample_le(
        &self,
        u: [f32; 4],
        world_center: Vec3,
        world_radius: f32,
    ) -> LightEmission {
        match self {
            Light::Point {
                position,
                intensity,
            } => {
                let dir = uniform_sample_sphere(u[0], u[1]);
                LightEmission {
                    ray: Ray::spawn(*position, dir),
                    normal: dir,
                    pdf_pos: 1.0,
                    pdf_dir: uniform_sphere_pdf(),
                    radiance: *intensity,
                }
            }
            Light::Distant {
                direction,
                radiance,
            } => {
                // Pick a point on the disk of the world bounds facing the
                // light and shoot parallel rays through the scene.
                let onb = Onb::from_normal(*direction);
                let d = concentric_sample_disk(u[0], u[1]) * world_radius;
                let origin = world_center - *direction * (2.0 * world_radius)
                    + onb.tangent * d.x
                    + onb.bitangent * d.y;
                LightEmission {
                    ray: Ray::spawn(origin, *direction),
                    normal: *direction,
                    pdf_pos: 1.0 / (PI * world_radius * world_radius),
                    pdf_dir: 1.0,
                    radiance: *radiance,
                }
            }
            Light::Area {
                shape,
                radiance,
                two_sided,
                ..
            } => {
                let (p, n, pdf_pos) = shape.sample_point(u[0], u[1]);
                let local = cosine_sample_hemisphere(u[2], u[3]);
                let onb = Onb::from_normal(n);
                let mut dir = onb.to_world(local);
                let mut pdf_dir = cosine_hemisphere_pdf(local);
                if *two_sided {
                    // Either side with equal probability.
                    if u[0] < 0.5 {
                        dir = -dir;
                    }
                    pdf_dir *= 0.5;
                }
                LightEmission {
                    ray: Ray::spawn(p + n * 1e-4 * dir.dot(n).signum(), dir),
                    normal: n,
                    pdf_pos,
                    pdf_dir,
                    radiance: *radiance,
                }
            }
            Light::Environment { radiance } => {
                // Inward ray from the bounding sphere of the world.
                let dir = uniform_sample_sphere(u[0], u[1]);
                let origin = world_center - dir * (2.0 * world_radius);
                LightEmission {
                    ray: Ray::spawn(origin, dir),
                    normal: dir,
                    pdf_pos: 1.0 / (PI * world_radius * world_radius),
                    pdf_dir: uniform_sphere_pdf(),
                    radiance: *radiance,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_light_falloff() {
        let light = Light::Point {
            position: Vec3::new(0.0, 2.0, 0.0),
            intensity: Spectrum::ONE,
        };
        let s = light.sample_li(Vec3::ZERO, 0.5, 0.5);
        assert!((s.dist - 2.0).abs() < 1e-5);
        assert!((s.radiance.x - 0.25).abs() < 1e-5);
        assert_eq!(light.pdf_li(Vec3::ZERO, s.wi), 0.0);
    }

    #[test]
    fn test_environment_covers_sphere() {
        let light = Light::Environment {
            radiance: Spectrum::ONE,
        };
        let s = light.sample_li(Vec3::ZERO, 0.3, 0.8);
        assert!((s.pdf - uniform_sphere_pdf()).abs() < 1e-7);
        assert_eq!(s.radiance, Spectrum::ONE);
        assert!(light.is_delta() == false);
    }

    #[test]
    fn test_area_light_sample_pdf_agrees() {
        let shape = Shape::Square {
            center: Vec3::new(0.0, 4.0, 0.0),
            eu: Vec3::X,
            ev: Vec3::Z,
        };
        let light = Light::Area {
            primitive: 0,
            shape: shape.clone(),
            radiance: Spectrum::ONE,
            two_sided: false,
        };
        let p = Vec3::ZERO;
        let s = light.sample_li(p, 0.4, 0.6);
        assert!(s.pdf > 0.0);
        let queried = light.pdf_li(p, s.wi);
        assert!((s.pdf / queried - 1.0).abs() < 1e-3);
        // The square faces downward only when hit from below with a normal
        // test; radiance must be zero on the back side for one-sided lights.
        let above = Vec3::new(0.0, 8.0, 0.0);
        let back = light.sample_li(above, 0.4, 0.6);
        assert!(crate::spectrum::is_black(back.radiance) || back.pdf > 0.0);
    }

    #[test]
    fn test_area_emission_sidedness() {
        let light = Light::Area {
            primitive: 0,
            shape: Shape::Square {
                center: Vec3::ZERO,
                eu: Vec3::X,
                ev: Vec3::Z,
            },
            radiance: Spectrum::ONE,
            two_sided: false,
        };
        let n = Vec3::Y;
        assert_eq!(light.emission(n, Vec3::Y), Spectrum::ONE);
        assert_eq!(light.emission(n, -Vec3::Y), Spectrum::ZERO);
    }
}
