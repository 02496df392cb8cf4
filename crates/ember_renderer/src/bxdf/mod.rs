//! The BxDF library.
//!
//! Every lobe works in the local y-up shading frame (the normal is +Y) and
//! implements the same three operations: evaluate, importance-sample, and
//! query the sampling PDF. Returned values are premultiplied by the incident
//! |cos theta| so integrators accumulate `f / pdf` directly; delta lobes
//! return zero from `f`/`pdf` and carry their full weight through
//! `sample_f`.
//!
//! The consistency contract: for every lobe and every `wo`, `sample_f` draws
//! `wi` with density exactly `pdf(wo, wi)` and returns exactly
//! `f(wo, wi)`. The property helpers in [`testing`] enforce it.

use ember_core::Spectrum;
use ember_math::{Vec2, Vec3};
use rand::RngCore;
use smallvec::SmallVec;

pub mod ashikhmin;
pub mod disney;
pub mod fresnel;
pub mod hair;
pub mod lambert;
pub mod layered;
pub mod measured;
pub mod microfacet;
pub mod orennayar;
pub mod phong;
pub mod cloth;
pub mod specular;
pub mod testing;

pub use ashikhmin::AshikhminShirley;
pub use cloth::{DistributionBrdf, Fabric};
pub use disney::Disney;
pub use fresnel::Fresnel;
pub use hair::Hair;
pub use lambert::{Lambert, LambertTransmission};
pub use layered::{Coat, DoubleSided};
pub use measured::{FourierBrdf, MerlBrdf};
pub use microfacet::{
    Distribution, MicrofacetReflection, MicrofacetRefraction, VisTerm,
};
pub use orennayar::OrenNayar;
pub use phong::Phong;
pub use specular::{Dielectric, Mirror};

/// Scattering-type bitmask of a lobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BxdfType(pub u32);

impl BxdfType {
    pub const REFLECTION: BxdfType = BxdfType(1);
    pub const TRANSMISSION: BxdfType = BxdfType(2);
    pub const DIFFUSE: BxdfType = BxdfType(4);
    pub const GLOSSY: BxdfType = BxdfType(8);
    pub const SPECULAR: BxdfType = BxdfType(16);
    pub const ALL: BxdfType = BxdfType(31);

    pub const fn union(self, other: BxdfType) -> BxdfType {
        BxdfType(self.0 | other.0)
    }

    pub fn contains(self, other: BxdfType) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_delta(self) -> bool {
        self.contains(BxdfType::SPECULAR)
    }
}

/// Result of importance-sampling a lobe.
#[derive(Debug, Clone, Copy)]
pub struct BxdfSample {
    pub wi: Vec3,
    pub pdf: f32,
    pub f: Spectrum,
}

impl BxdfSample {
    pub fn rejected() -> Self {
        Self {
            wi: Vec3::Y,
            pdf: 0.0,
            f: Spectrum::ZERO,
        }
    }
}

/// A single scattering lobe in the local shading frame.
pub trait Bxdf {
    fn bxdf_type(&self) -> BxdfType;

    /// Evaluate the lobe for a given pair of directions, premultiplied by
    /// the incident |cos theta|.
    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum;

    /// Importance-sample an incident direction. `u` is a pair of canonical
    /// uniforms from the sampler tables; `rng` feeds auxiliary decisions
    /// (lobe selection and the like).
    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample;

    /// The density `sample_f` assigns to `wi`, in solid-angle measure.
    fn pdf(&self, wo: Vec3, wi: Vec3) -> f32;
}

// Local-frame helpers shared by every lobe.

#[inline]
pub fn cos_theta(w: Vec3) -> f32 {
    w.y
}

#[inline]
pub fn abs_cos_theta(w: Vec3) -> f32 {
    w.y.abs()
}

#[inline]
pub fn cos2_theta(w: Vec3) -> f32 {
    w.y * w.y
}

#[inline]
pub fn sin2_theta(w: Vec3) -> f32 {
    (1.0 - cos2_theta(w)).max(0.0)
}

#[inline]
pub fn sin_theta(w: Vec3) -> f32 {
    sin2_theta(w).sqrt()
}

#[inline]
pub fn tan2_theta(w: Vec3) -> f32 {
    sin2_theta(w) / cos2_theta(w)
}

#[inline]
pub fn same_hemisphere(a: Vec3, b: Vec3) -> bool {
    a.y * b.y > 0.0
}

#[inline]
pub fn pointing_up(w: Vec3) -> bool {
    w.y > 0.0
}

/// Azimuth cosine/sine of a local direction, defined in the tangent plane.
#[inline]
pub fn cos_phi(w: Vec3) -> f32 {
    let s = sin_theta(w);
    if s == 0.0 {
        1.0
    } else {
        (w.x / s).clamp(-1.0, 1.0)
    }
}

#[inline]
pub fn sin_phi(w: Vec3) -> f32 {
    let s = sin_theta(w);
    if s == 0.0 {
        0.0
    } else {
        (w.z / s).clamp(-1.0, 1.0)
    }
}

/// Mirror `wo` about the half vector `h` (both pointing away from the
/// surface).
#[inline]
pub fn reflect(wo: Vec3, h: Vec3) -> Vec3 {
    2.0 * wo.dot(h) * h - wo
}

/// Schlick's (1 - cos)^5 weight.
#[inline]
pub fn schlick_weight(cos: f32) -> f32 {
    let x = (1.0 - cos).clamp(0.0, 1.0);
    let x2 = x * x;
    x2 * x2 * x
}

/// Fresnel reflectance at normal incidence from a relative IOR.
#[inline]
pub fn schlick_r0_from_eta(eta: f32) -> f32 {
    let r = (eta - 1.0) / (eta + 1.0);
    r * r
}

/// Draw one canonical uniform from the auxiliary stream.
#[inline]
pub fn canonical(rng: &mut dyn RngCore) -> f32 {
    // 24 mantissa bits keep the value strictly below 1.
    (rng.next_u32() >> 8) as f32 * (1.0 / (1u32 << 24) as f32)
}

/// Maximum lobes a single scattering event can carry.
pub const MAX_LOBES: usize = 8;

/// A lobe together with the closure weight it entered the BSDF with.
#[derive(Clone)]
pub struct WeightedLobe {
    pub weight: Spectrum,
    pub lobe: Lobe,
}

/// Tagged union over every concrete lobe.
///
/// Dispatch happens once per shading operation; the match is the Rust shape
/// of a vtable and keeps lobes inline in the BSDF's SmallVec.
#[derive(Clone)]
pub enum Lobe {
    Lambert(Lambert),
    LambertTransmission(LambertTransmission),
    OrenNayar(OrenNayar),
    MicrofacetReflection(MicrofacetReflection),
    MicrofacetRefraction(MicrofacetRefraction),
    Disney(Box<Disney>),
    Hair(Box<Hair>),
    AshikhminShirley(AshikhminShirley),
    Phong(Phong),
    Mirror(Mirror),
    Dielectric(Dielectric),
    Fabric(Fabric),
    DistributionBrdf(DistributionBrdf),
    Merl(MerlBrdf),
    Fourier(FourierBrdf),
    Coat(Box<Coat>),
    DoubleSided(Box<DoubleSided>),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $call:expr) => {
        match $self {
            Lobe::Lambert($inner) => $call,
            Lobe::LambertTransmission($inner) => $call,
            Lobe::OrenNayar($inner) => $call,
            Lobe::MicrofacetReflection($inner) => $call,
            Lobe::MicrofacetRefraction($inner) => $call,
            Lobe::Disney($inner) => $call,
            Lobe::Hair($inner) => $call,
            Lobe::AshikhminShirley($inner) => $call,
            Lobe::Phong($inner) => $call,
            Lobe::Mirror($inner) => $call,
            Lobe::Dielectric($inner) => $call,
            Lobe::Fabric($inner) => $call,
            Lobe::DistributionBrdf($inner) => $call,
            Lobe::Merl($inner) => $call,
            Lobe::Fourier($inner) => $call,
            Lobe::Coat($inner) => $call,
            Lobe::DoubleSided($inner) => $call,
        }
    };
}

impl Bxdf for Lobe {
    fn bxdf_type(&self) -> BxdfType {
        dispatch!(self, b => b.bxdf_type())
    }

    fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        dispatch!(self, b => b.f(wo, wi))
    }

    fn sample_f(&self, wo: Vec3, u: Vec2, rng: &mut dyn RngCore) -> BxdfSample {
        dispatch!(self, b => b.sample_f(wo, u, rng))
    }

    fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        dispatch!(self, b => b.pdf(wo, wi))
    }
}

/// Sum of weighted lobe values for a direction pair.
pub fn list_f(lobes: &[WeightedLobe], wo: Vec3, wi: Vec3) -> Spectrum {
    let mut total = Spectrum::ZERO;
    for wl in lobes {
        total += wl.weight * wl.lobe.f(wo, wi);
    }
    total
}

/// Inline buffer for per-lobe selection weights. Shading-path code never
/// touches the heap for these; a list longer than `MAX_LOBES` (layered
/// sub-materials) spills and stays correct.
type SelectionWeights = SmallVec<[f32; MAX_LOBES]>;

/// Selection probability of each lobe, proportional to its weight.
fn selection_weights(lobes: &[WeightedLobe]) -> (SelectionWeights, f32) {
    let w: SelectionWeights = lobes
        .iter()
        .map(|wl| ember_core::spectrum::luminance(wl.weight).max(0.0))
        .collect();
    let total = w.iter().sum();
    (w, total)
}

/// Mixture PDF with precomputed selection weights.
fn mixture_pdf(lobes: &[WeightedLobe], w: &[f32], total: f32, wo: Vec3, wi: Vec3) -> f32 {
    if total <= 0.0 {
        return 0.0;
    }
    let mut pdf = 0.0;
    for (wl, sel) in lobes.iter().zip(w) {
        pdf += sel / total * wl.lobe.pdf(wo, wi);
    }
    pdf
}

/// Mixture PDF over a lobe list, weighted by the selection probabilities.
pub fn list_pdf(lobes: &[WeightedLobe], wo: Vec3, wi: Vec3) -> f32 {
    let (w, total) = selection_weights(lobes);
    mixture_pdf(lobes, &w, total, wo, wi)
}

/// Draw one lobe proportionally to weight, sample it, and report the
/// mixture PDF and the summed value over all matching lobes. A sampled
/// delta lobe short-circuits with its own weight and selection-scaled PDF.
pub fn list_sample(
    lobes: &[WeightedLobe],
    wo: Vec3,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> BxdfSample {
    let (w, total) = selection_weights(lobes);
    if lobes.is_empty() || total <= 0.0 {
        return BxdfSample::rejected();
    }

    let mut pick = canonical(rng) * total;
    let mut chosen = lobes.len() - 1;
    for (i, wi) in w.iter().enumerate() {
        if pick < *wi {
            chosen = i;
            break;
        }
        pick -= wi;
    }

    let wl = &lobes[chosen];
    let s = wl.lobe.sample_f(wo, u, rng);
    if s.pdf == 0.0 {
        return BxdfSample::rejected();
    }

    if wl.lobe.bxdf_type().is_delta() {
        return BxdfSample {
            wi: s.wi,
            pdf: s.pdf * w[chosen] / total,
            f: wl.weight * s.f,
        };
    }

    BxdfSample {
        wi: s.wi,
        pdf: mixture_pdf(lobes, &w, total, wo, s.wi),
        f: list_f(lobes, wo, s.wi),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bxdf_type_bits() {
        let t = BxdfType::REFLECTION.union(BxdfType::GLOSSY);
        assert!(t.contains(BxdfType::REFLECTION));
        assert!(!t.contains(BxdfType::TRANSMISSION));
        assert!(!t.is_delta());
        assert!(BxdfType::SPECULAR.is_delta());
    }

    #[test]
    fn test_reflect_preserves_length() {
        let wo = Vec3::new(0.3, 0.8, 0.2).normalize();
        let h = Vec3::Y;
        let wi = reflect(wo, h);
        assert!((wi.length() - 1.0).abs() < 1e-5);
        assert!((wi.y - wo.y).abs() < 1e-5);
        assert!((wi.x + wo.x).abs() < 1e-5);
    }

    #[test]
    fn test_canonical_in_unit_interval() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let u = canonical(&mut rng);
            assert!((0.0..1.0).contains(&u));
        }
    }
}
