//! Spectral values as linear RGB.

use ember_math::Vec3;

/// Linear RGB radiance/reflectance triple.
pub type Spectrum = Vec3;

/// Rec. 709 luminance, used wherever a scalar intensity of a spectrum is
/// needed (lobe weights, light power, Russian roulette).
#[inline]
pub fn luminance(s: Spectrum) -> f32 {
    0.2126 * s.x + 0.7152 * s.y + 0.0722 * s.z
}

/// True if every channel is zero.
#[inline]
pub fn is_black(s: Spectrum) -> bool {
    s.x == 0.0 && s.y == 0.0 && s.z == 0.0
}

/// True if any channel is NaN or infinite.
#[inline]
pub fn is_invalid(s: Spectrum) -> bool {
    !(s.x.is_finite() && s.y.is_finite() && s.z.is_finite())
}
