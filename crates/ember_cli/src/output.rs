//! Image output: linear EXR for HDR results, sRGB PNG for previews.

use anyhow::{Context, Result};
use exr::prelude::write_rgb_file;
use image::{ImageBuffer, Rgb};
use log::info;
use std::path::Path;

/// Write developed film data (row-major RGB, pixel (0,0) top-left) to the
/// format implied by the file extension.
pub fn save_image(path: &Path, data: &[f32], width: u32, height: u32) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("exr") => save_exr(path, data, width, height),
        _ => save_png(path, data, width, height),
    }
}

/// Full-precision linear radiance.
fn save_exr(path: &Path, data: &[f32], width: u32, height: u32) -> Result<()> {
    write_rgb_file(path, width as usize, height as usize, |x, y| {
        let i = (y * width as usize + x) * 3;
        (data[i], data[i + 1], data[i + 2])
    })
    .with_context(|| format!("writing EXR to {}", path.display()))?;
    info!("HDR image saved as EXR: {}", path.display());
    Ok(())
}

/// sRGB transfer curve with the linear toe for dark values.
fn linear_to_srgb(linear: f32) -> f32 {
    if linear <= 0.0 {
        0.0
    } else if linear <= 0.003_130_8 {
        12.92 * linear
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

/// Tone-mapped 8-bit preview.
fn save_png(path: &Path, data: &[f32], width: u32, height: u32) -> Result<()> {
    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        let i = ((y * width + x) * 3) as usize;
        Rgb([
            (linear_to_srgb(data[i].clamp(0.0, 1.0)) * 255.0) as u8,
            (linear_to_srgb(data[i + 1].clamp(0.0, 1.0)) * 255.0) as u8,
            (linear_to_srgb(data[i + 2].clamp(0.0, 1.0)) * 255.0) as u8,
        ])
    });
    image
        .save(path)
        .with_context(|| format!("writing PNG to {}", path.display()))?;
    info!("image saved as {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_curve_endpoints() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-4);
        // The toe is linear.
        assert!((linear_to_srgb(0.002) - 12.92 * 0.002).abs() < 1e-6);
    }
}
