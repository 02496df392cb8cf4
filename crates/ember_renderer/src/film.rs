//! The film: linear radiance accumulation with atomic cross-tile splats.
//!
//! Tile tasks write disjoint pixels, but light tracing and bidirectional
//! connections splat anywhere; every accumulation therefore goes through a
//! per-channel compare-exchange float add. Pixel (0, 0) is top-left.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ember_core::spectrum::is_invalid;
use ember_core::Spectrum;

use crate::stats;

pub struct Film {
    pub width: u32,
    pub height: u32,
    /// Three atomic f32 bit patterns per pixel.
    channels: Vec<AtomicU32>,
    dropped: AtomicU64,
}

/// Atomic f32 accumulation on a u32 bit pattern.
fn atomic_add_f32(slot: &AtomicU32, value: f32) {
    let mut current = slot.load(Ordering::Relaxed);
    loop {
        let next = f32::from_bits(current) + value;
        match slot.compare_exchange_weak(
            current,
            next.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

impl Film {
    pub fn new(width: u32, height: u32) -> Self {
        let n = (width * height * 3) as usize;
        let mut channels = Vec::with_capacity(n);
        channels.resize_with(n, || AtomicU32::new(0));
        Self {
            width,
            height,
            channels,
            dropped: AtomicU64::new(0),
        }
    }

    /// Accumulate one pixel sample. Non-finite radiance is dropped so a
    /// single bad sample cannot contaminate the pixel.
    pub fn add_sample(&self, x: u32, y: u32, radiance: Spectrum) {
        if is_invalid(radiance) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            stats::dropped_samples(1);
            return;
        }
        self.splat(x, y, radiance);
    }

    /// Raw accumulation at a pixel, used by camera-connection strategies.
    pub fn splat(&self, x: u32, y: u32, radiance: Spectrum) {
        if x >= self.width || y >= self.height || is_invalid(radiance) {
            return;
        }
        let base = ((y * self.width + x) * 3) as usize;
        atomic_add_f32(&self.channels[base], radiance.x);
        atomic_add_f32(&self.channels[base + 1], radiance.y);
        atomic_add_f32(&self.channels[base + 2], radiance.z);
    }

    /// Splat at continuous raster coordinates.
    pub fn splat_raster(&self, raster: (f32, f32), radiance: Spectrum) {
        if raster.0 < 0.0 || raster.1 < 0.0 {
            return;
        }
        self.splat(raster.0 as u32, raster.1 as u32, radiance);
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolve to plain RGB rows, scaling each pixel by `scale` (the
    /// reciprocal sample count).
    pub fn develop(&self, scale: f32) -> Vec<f32> {
        self.channels
            .iter()
            .map(|c| f32::from_bits(c.load(Ordering::Relaxed)) * scale)
            .collect()
    }

    /// One developed pixel, mostly for tests.
    pub fn pixel(&self, x: u32, y: u32, scale: f32) -> Spectrum {
        let base = ((y * self.width + x) * 3) as usize;
        Spectrum::new(
            f32::from_bits(self.channels[base].load(Ordering::Relaxed)),
            f32::from_bits(self.channels[base + 1].load(Ordering::Relaxed)),
            f32::from_bits(self.channels[base + 2].load(Ordering::Relaxed)),
        ) * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_develop() {
        let film = Film::new(2, 2);
        film.add_sample(0, 0, Spectrum::ONE);
        film.add_sample(0, 0, Spectrum::ONE);
        film.add_sample(1, 1, Spectrum::new(2.0, 0.0, 0.0));

        assert_eq!(film.pixel(0, 0, 0.5), Spectrum::ONE);
        let data = film.develop(1.0);
        assert_eq!(data[(1 * 2 + 1) * 3], 2.0);
    }

    #[test]
    fn test_nan_samples_dropped() {
        let film = Film::new(1, 1);
        film.add_sample(0, 0, Spectrum::new(f32::NAN, 1.0, 1.0));
        assert_eq!(film.dropped_samples(), 1);
        assert_eq!(film.pixel(0, 0, 1.0), Spectrum::ZERO);
    }

    #[test]
    fn test_out_of_bounds_splat_ignored() {
        let film = Film::new(2, 2);
        film.splat(5, 0, Spectrum::ONE);
        film.splat_raster((-1.0, 0.0), Spectrum::ONE);
        assert_eq!(film.develop(1.0).iter().sum::<f32>(), 0.0);
    }

    #[test]
    fn test_concurrent_splats() {
        use std::sync::Arc;
        let film = Arc::new(Film::new(1, 1));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let film = film.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        film.splat(0, 0, Spectrum::splat(1.0));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(film.pixel(0, 0, 1.0), Spectrum::splat(4000.0));
    }
}
