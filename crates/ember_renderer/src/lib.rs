//! EMBER renderer - the rendering core.
//!
//! A physically based Monte Carlo ray tracer: BxDF evaluation and
//! importance sampling, wide-BVH ray queries, low-discrepancy samplers and
//! the light-transport integrators, driven bucket-by-bucket over a worker
//! pool onto an HDR film.

pub mod accel;
pub mod bsdf;
pub mod bucket;
pub mod bxdf;
pub mod film;
pub mod integrator;
pub mod renderer;
pub mod sampler;
pub mod scattering;
pub mod stats;

pub use accel::{Accelerator, LinearList, Obvh, Qbvh};
pub use bsdf::Bsdf;
pub use film::Film;
pub use integrator::{Integrator, RenderContext};
pub use renderer::{build_accelerator, build_integrator, render, render_with};
pub use sampler::{PixelSample, SampleRequests, Sampler};
pub use scattering::ScatteringEvent;
