//! Versioned binary scene stream.
//!
//! Layout (all integers little endian):
//!
//! ```text
//! magic "EMBR" | version u32
//! camera: eye vec3 | target vec3 | up vec3 | fov f32 | aperture f32 | focus f32
//! film: width u32 | height u32
//! integrator: tag u32 | max_depth u32
//! sampler: tag u32 | spp u32
//! materials: count u32 | { name | closure tree }
//! meshes: count u32 | { positions | normals | uvs | indices | material u32 }
//! shapes: count u32 | { shape tag + params | material u32 }
//! lights: count u32 | { light tag + params }
//! ```
//!
//! The core refuses streams whose version it does not recognize.

use std::io::Read;
use std::sync::Arc;

use ember_math::{Vec2, Vec3};
use log::info;

use crate::camera::PerspectiveCamera;
use crate::light::Light;
use crate::material::{
    Closure, DistributionKind, FourierTable, FresnelKind, Material, MerlTable,
};
use crate::mesh::Mesh;
use crate::primitive::Primitive;
use crate::scene::{Scene, SceneError};
use crate::shape::Shape;
use crate::spectrum::Spectrum;

const MAGIC: &[u8; 4] = b"EMBR";
const VERSION: u32 = 2;

/// Which integrator drives the render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegratorKind {
    AmbientOcclusion,
    Whitted,
    Direct,
    Path,
    Bdpt,
    LightTracing,
    InstantRadiosity,
}

/// Which sampler produces the per-pixel tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Random,
    Stratified,
}

/// Render parameters carried by the stream alongside the scene.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
    pub max_depth: u32,
    pub integrator: IntegratorKind,
    pub sampler: SamplerKind,
}

/// Deserialize a scene and its render settings.
pub fn load_scene<R: Read>(reader: &mut R) -> Result<(Scene, RenderSettings), SceneError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SceneError::BadMagic);
    }
    let version = read_u32(reader)?;
    if version != VERSION {
        return Err(SceneError::UnsupportedVersion(version));
    }

    // Camera and film.
    let eye = read_vec3(reader)?;
    let target = read_vec3(reader)?;
    let up = read_vec3(reader)?;
    let fov = read_f32(reader)?;
    let aperture = read_f32(reader)?;
    let focus = read_f32(reader)?;
    let width = read_u32(reader)?;
    let height = read_u32(reader)?;
    if width == 0 || height == 0 {
        return Err(SceneError::MissingCamera);
    }

    let camera = PerspectiveCamera::new(eye, target, up, fov, width, height)
        .with_aperture(aperture, focus);

    let integrator = match read_u32(reader)? {
        0 => IntegratorKind::AmbientOcclusion,
        1 => IntegratorKind::Whitted,
        2 => IntegratorKind::Direct,
        3 => IntegratorKind::Path,
        4 => IntegratorKind::Bdpt,
        5 => IntegratorKind::LightTracing,
        6 => IntegratorKind::InstantRadiosity,
        tag => return Err(SceneError::UnknownIntegrator(tag)),
    };
    let max_depth = read_u32(reader)?;

    let sampler = match read_u32(reader)? {
        1 => SamplerKind::Stratified,
        _ => SamplerKind::Random,
    };
    let spp = read_u32(reader)?;

    let mut scene = Scene::new(camera);

    // Materials. Id 0 is the built-in default grey.
    let material_count = read_u32(reader)?;
    for _ in 0..material_count {
        let name = read_string(reader)?;
        let closure = read_closure(reader)?;
        scene.add_material(Material::new(name, closure));
    }

    // Meshes expand into one triangle primitive per face.
    let mesh_count = read_u32(reader)?;
    for _ in 0..mesh_count {
        let positions = read_vec3_array(reader)?;
        let normals = read_vec3_array(reader)?;
        let uvs = read_vec2_array(reader)?;
        let indices = read_u32_array(reader)?;
        let material = read_u32(reader)?;

        let mut mesh = Mesh::new(positions, indices);
        if !normals.is_empty() {
            mesh = mesh.with_normals(normals);
        }
        if !uvs.is_empty() {
            mesh = mesh.with_uvs(uvs);
        }
        let mesh = Arc::new(mesh);
        for face in 0..mesh.triangle_count() {
            scene.add_primitive(Primitive::new(
                Shape::Triangle {
                    mesh: mesh.clone(),
                    face: face as u32,
                },
                material,
            ));
        }
    }

    // Analytic shapes.
    let shape_count = read_u32(reader)?;
    for _ in 0..shape_count {
        let shape = read_shape(reader)?;
        let material = read_u32(reader)?;
        scene.add_primitive(Primitive::new(shape, material));
    }

    // Lights. Area lights wrap a shape of their own.
    let light_count = read_u32(reader)?;
    for _ in 0..light_count {
        match read_u32(reader)? {
            0 => {
                let position = read_vec3(reader)?;
                let intensity = read_vec3(reader)?;
                scene.add_light(Light::Point {
                    position,
                    intensity,
                });
            }
            1 => {
                let direction = read_vec3(reader)?.normalize();
                let radiance = read_vec3(reader)?;
                scene.add_light(Light::Distant {
                    direction,
                    radiance,
                });
            }
            2 => {
                let shape = read_shape(reader)?;
                let material = read_u32(reader)?;
                let radiance = read_vec3(reader)?;
                let two_sided = read_u32(reader)? != 0;
                scene.add_area_light(shape, material, radiance, two_sided);
            }
            3 => {
                let radiance = read_vec3(reader)?;
                scene.add_light(Light::Environment { radiance });
            }
            tag => return Err(SceneError::UnknownLight(tag)),
        }
    }

    scene.validate()?;
    info!(
        "loaded scene: {} primitives, {} lights, {} materials, {}x{} @ {} spp",
        scene.primitives.len(),
        scene.lights.len(),
        scene.materials.len(),
        width,
        height,
        spp
    );

    Ok((
        scene,
        RenderSettings {
            width,
            height,
            samples_per_pixel: spp,
            max_depth,
            integrator,
            sampler,
        },
    ))
}

fn read_shape<R: Read>(reader: &mut R) -> Result<Shape, SceneError> {
    Ok(match read_u32(reader)? {
        0 => Shape::Sphere {
            center: read_vec3(reader)?,
            radius: read_f32(reader)?,
        },
        1 => Shape::Disk {
            center: read_vec3(reader)?,
            normal: read_vec3(reader)?.normalize(),
            radius: read_f32(reader)?,
        },
        2 => Shape::Square {
            center: read_vec3(reader)?,
            eu: read_vec3(reader)?,
            ev: read_vec3(reader)?,
        },
        3 => Shape::Line {
            p0: read_vec3(reader)?,
            p1: read_vec3(reader)?,
            w0: read_f32(reader)?,
            w1: read_f32(reader)?,
        },
        tag => return Err(SceneError::UnknownShape(tag)),
    })
}

/// Closure tags follow the registered closure enumeration; 100/101 are the
/// interior weight/sum nodes.
fn read_closure<R: Read>(reader: &mut R) -> Result<Closure, SceneError> {
    Ok(match read_u32(reader)? {
        0 => Closure::Lambert {
            albedo: read_vec3(reader)?,
        },
        1 => Closure::OrenNayar {
            albedo: read_vec3(reader)?,
            sigma: read_f32(reader)?,
        },
        2 => Closure::Disney {
            base_color: read_vec3(reader)?,
            metallic: read_f32(reader)?,
            roughness: read_f32(reader)?,
            specular: read_f32(reader)?,
            specular_tint: read_f32(reader)?,
            anisotropic: read_f32(reader)?,
            sheen: read_f32(reader)?,
            sheen_tint: read_f32(reader)?,
            clearcoat: read_f32(reader)?,
            clearcoat_gloss: read_f32(reader)?,
            spec_trans: read_f32(reader)?,
            flatness: read_f32(reader)?,
            diff_trans: read_f32(reader)?,
            scatter_distance: read_vec3(reader)?,
            thin_surface: read_u32(reader)? != 0,
        },
        3 => Closure::MicrofacetReflection {
            albedo: read_vec3(reader)?,
            distribution: read_distribution(reader)?,
            roughness_u: read_f32(reader)?,
            roughness_v: read_f32(reader)?,
            fresnel: read_fresnel(reader)?,
        },
        4 => Closure::MicrofacetRefraction {
            transmittance: read_vec3(reader)?,
            distribution: read_distribution(reader)?,
            roughness_u: read_f32(reader)?,
            roughness_v: read_f32(reader)?,
            eta_in: read_f32(reader)?,
            eta_ext: read_f32(reader)?,
        },
        5 => Closure::AshikhminShirley {
            diffuse: read_vec3(reader)?,
            specular: read_f32(reader)?,
            roughness_u: read_f32(reader)?,
            roughness_v: read_f32(reader)?,
        },
        6 => Closure::Phong {
            diffuse: read_vec3(reader)?,
            specular: read_vec3(reader)?,
            specular_power: read_f32(reader)?,
        },
        7 => Closure::LambertTransmission {
            transmittance: read_vec3(reader)?,
        },
        8 => Closure::Mirror {
            reflectance: read_vec3(reader)?,
        },
        9 => Closure::Dielectric {
            reflectance: read_vec3(reader)?,
            transmittance: read_vec3(reader)?,
            eta_i: read_f32(reader)?,
            eta_t: read_f32(reader)?,
        },
        10 => Closure::MicrofacetReflectionDielectric {
            albedo: read_vec3(reader)?,
            roughness_u: read_f32(reader)?,
            roughness_v: read_f32(reader)?,
            eta_i: read_f32(reader)?,
            eta_t: read_f32(reader)?,
        },
        11 => Closure::Hair {
            sigma_a: read_vec3(reader)?,
            beta_m: read_f32(reader)?,
            beta_n: read_f32(reader)?,
            eta: read_f32(reader)?,
        },
        12 => {
            let mu = read_f32_array(reader)?;
            let orders = read_u32_array(reader)?;
            let offsets = read_u32_array(reader)?;
            let coeffs = read_f32_array(reader)?;
            Closure::FourierBrdf {
                data: Arc::new(FourierTable {
                    mu,
                    orders,
                    offsets,
                    coeffs,
                }),
            }
        }
        13 => {
            let data = read_f32_array(reader)?;
            Closure::MerlBrdf {
                data: Arc::new(MerlTable { data }),
            }
        }
        14 => Closure::Coat {
            base: Box::new(read_closure(reader)?),
            thickness: read_f32(reader)?,
            ior: read_f32(reader)?,
            sigma: read_vec3(reader)?,
            roughness: read_f32(reader)?,
        },
        15 => Closure::DoubleSided {
            front: Box::new(read_closure(reader)?),
            back: Box::new(read_closure(reader)?),
        },
        16 => Closure::DistributionBrdf {
            albedo: read_vec3(reader)?,
            specular: read_f32(reader)?,
            roughness: read_f32(reader)?,
        },
        17 => Closure::Fabric {
            base_color: read_vec3(reader)?,
            roughness: read_f32(reader)?,
        },
        18 => Closure::Subsurface {
            base_color: read_vec3(reader)?,
            scatter_distance: read_vec3(reader)?,
        },
        100 => Closure::Weighted {
            weight: read_vec3(reader)?,
            inner: Box::new(read_closure(reader)?),
        },
        101 => {
            let count = read_u32(reader)?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_closure(reader)?);
            }
            Closure::Add { items }
        }
        tag => return Err(SceneError::UnknownClosure(tag)),
    })
}

fn read_distribution<R: Read>(reader: &mut R) -> Result<DistributionKind, SceneError> {
    Ok(match read_u32(reader)? {
        0 => DistributionKind::Blinn,
        1 => DistributionKind::Beckmann,
        _ => DistributionKind::Ggx,
    })
}

fn read_fresnel<R: Read>(reader: &mut R) -> Result<FresnelKind, SceneError> {
    Ok(match read_u32(reader)? {
        0 => FresnelKind::NoOp,
        1 => FresnelKind::Schlick {
            f0: read_vec3(reader)?,
        },
        2 => FresnelKind::Dielectric {
            eta_i: read_f32(reader)?,
            eta_t: read_f32(reader)?,
        },
        _ => FresnelKind::Conductor {
            eta: read_f32(reader)?,
            k: read_f32(reader)?,
        },
    })
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, SceneError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32, SceneError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_vec3<R: Read>(reader: &mut R) -> Result<Spectrum, SceneError> {
    Ok(Vec3::new(
        read_f32(reader)?,
        read_f32(reader)?,
        read_f32(reader)?,
    ))
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, SceneError> {
    let len = read_u32(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn read_u32_array<R: Read>(reader: &mut R) -> Result<Vec<u32>, SceneError> {
    let len = read_u32(reader)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_u32(reader)?);
    }
    Ok(out)
}

fn read_f32_array<R: Read>(reader: &mut R) -> Result<Vec<f32>, SceneError> {
    let len = read_u32(reader)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_f32(reader)?);
    }
    Ok(out)
}

fn read_vec3_array<R: Read>(reader: &mut R) -> Result<Vec<Vec3>, SceneError> {
    let len = read_u32(reader)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_vec3(reader)?);
    }
    Ok(out)
}

fn read_vec2_array<R: Read>(reader: &mut R) -> Result<Vec<Vec2>, SceneError> {
    let len = read_u32(reader)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(Vec2::new(read_f32(reader)?, read_f32(reader)?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_f32(buf: &mut Vec<u8>, v: f32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_vec3(buf: &mut Vec<u8>, v: Vec3) {
        push_f32(buf, v.x);
        push_f32(buf, v.y);
        push_f32(buf, v.z);
    }

    fn minimal_stream() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"EMBR");
        push_u32(&mut buf, 2);
        // camera
        push_vec3(&mut buf, Vec3::new(0.0, 0.0, 5.0));
        push_vec3(&mut buf, Vec3::ZERO);
        push_vec3(&mut buf, Vec3::Y);
        push_f32(&mut buf, 1.2);
        push_f32(&mut buf, 0.0);
        push_f32(&mut buf, 5.0);
        // film
        push_u32(&mut buf, 32);
        push_u32(&mut buf, 32);
        // integrator: path, depth 6
        push_u32(&mut buf, 3);
        push_u32(&mut buf, 6);
        // sampler: random, 16 spp
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 16);
        // one lambert material
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 4);
        buf.extend_from_slice(b"grey");
        push_u32(&mut buf, 0);
        push_vec3(&mut buf, Vec3::splat(0.5));
        // no meshes
        push_u32(&mut buf, 0);
        // one sphere using material 1
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 0);
        push_vec3(&mut buf, Vec3::ZERO);
        push_f32(&mut buf, 1.0);
        push_u32(&mut buf, 1);
        // one environment light
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 3);
        push_vec3(&mut buf, Vec3::ONE);
        buf
    }

    #[test]
    fn test_load_minimal_scene() {
        let data = minimal_stream();
        let (scene, settings) = load_scene(&mut Cursor::new(data)).unwrap();
        assert_eq!(scene.primitives.len(), 1);
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(settings.samples_per_pixel, 16);
        assert_eq!(settings.integrator, IntegratorKind::Path);
    }

    #[test]
    fn test_bad_magic_refused() {
        let mut data = minimal_stream();
        data[0] = b'X';
        assert!(matches!(
            load_scene(&mut Cursor::new(data)),
            Err(SceneError::BadMagic)
        ));
    }

    #[test]
    fn test_unknown_version_refused() {
        let mut data = minimal_stream();
        data[4..8].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            load_scene(&mut Cursor::new(data)),
            Err(SceneError::UnsupportedVersion(9))
        ));
    }
}
