//! Samplers and the per-pixel sample allocator.
//!
//! Before rendering, each integrator registers the 1D/2D tables it will
//! index per pixel sample and receives opaque offsets. At render time the
//! sampler fills a batch of `PixelSample`s for the whole pixel at once so
//! stratification can spread strata across the pixel's samples. Nothing
//! allocates on the shading path.

use ember_math::Vec2;
use rand::{Rng, RngCore};

/// Opaque handle to a requested 1D table.
#[derive(Debug, Clone, Copy)]
pub struct Offset1D(usize);

/// Opaque handle to a requested 2D table.
#[derive(Debug, Clone, Copy)]
pub struct Offset2D(usize);

/// The schedule of tables integrators request before rendering.
#[derive(Debug, Default, Clone)]
pub struct SampleRequests {
    sizes_1d: Vec<usize>,
    sizes_2d: Vec<usize>,
}

impl SampleRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `count` 1D samples per pixel sample.
    pub fn request_1d(&mut self, count: usize) -> Offset1D {
        self.sizes_1d.push(count.max(1));
        Offset1D(self.sizes_1d.len() - 1)
    }

    /// Request `count` 2D samples per pixel sample.
    pub fn request_2d(&mut self, count: usize) -> Offset2D {
        self.sizes_2d.push(count.max(1));
        Offset2D(self.sizes_2d.len() - 1)
    }
}

/// One pixel sample: sub-pixel jitter, lens uniforms, and the filled tables.
#[derive(Debug, Clone)]
pub struct PixelSample {
    pub img: Vec2,
    pub lens: Vec2,
    tables_1d: Vec<Vec<f32>>,
    tables_2d: Vec<Vec<Vec2>>,
}

impl PixelSample {
    pub fn data_1d(&self, offset: Offset1D) -> &[f32] {
        &self.tables_1d[offset.0]
    }

    pub fn data_2d(&self, offset: Offset2D) -> &[Vec2] {
        &self.tables_2d[offset.0]
    }
}

/// Sample generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampler {
    Random,
    /// Jittered strata, shuffled independently per table.
    Stratified,
}

impl Sampler {
    /// Generate every pixel sample for one pixel.
    ///
    /// Stratification happens along two axes: across the `spp` samples of
    /// the pixel (image plane and lens) and within each table.
    pub fn generate_pixel(
        &self,
        requests: &SampleRequests,
        spp: usize,
        rng: &mut dyn RngCore,
    ) -> Vec<PixelSample> {
        match self {
            Sampler::Random => (0..spp)
                .map(|_| PixelSample {
                    img: Vec2::new(rng.random(), rng.random()),
                    lens: Vec2::new(rng.random(), rng.random()),
                    tables_1d: requests
                        .sizes_1d
                        .iter()
                        .map(|&n| (0..n).map(|_| rng.random()).collect())
                        .collect(),
                    tables_2d: requests
                        .sizes_2d
                        .iter()
                        .map(|&n| {
                            (0..n)
                                .map(|_| Vec2::new(rng.random(), rng.random()))
                                .collect()
                        })
                        .collect(),
                })
                .collect(),
            Sampler::Stratified => {
                let img = stratified_2d(spp, rng);
                let lens = stratified_2d(spp, rng);
                (0..spp)
                    .map(|s| PixelSample {
                        img: img[s],
                        lens: lens[s],
                        tables_1d: requests
                            .sizes_1d
                            .iter()
                            .map(|&n| stratified_1d(n, rng))
                            .collect(),
                        tables_2d: requests
                            .sizes_2d
                            .iter()
                            .map(|&n| stratified_2d(n, rng))
                            .collect(),
                    })
                    .collect()
            }
        }
    }
}

/// Jittered 1D strata in random order.
fn stratified_1d(n: usize, rng: &mut dyn RngCore) -> Vec<f32> {
    let inv = 1.0 / n as f32;
    let mut v: Vec<f32> = (0..n)
        .map(|i| (i as f32 + rng.random::<f32>()) * inv)
        .collect();
    shuffle(&mut v, rng);
    v
}

/// Jittered 2D strata on the tightest grid that covers `n`, in random order.
fn stratified_2d(n: usize, rng: &mut dyn RngCore) -> Vec<Vec2> {
    let nx = (n as f32).sqrt().ceil() as usize;
    let ny = n.div_ceil(nx);
    let inv = Vec2::new(1.0 / nx as f32, 1.0 / ny as f32);
    let mut v: Vec<Vec2> = (0..n)
        .map(|i| {
            let x = (i % nx) as f32 + rng.random::<f32>();
            let y = (i / nx) as f32 + rng.random::<f32>();
            Vec2::new(x, y) * inv
        })
        .collect();
    shuffle(&mut v, rng);
    v
}

fn shuffle<T>(v: &mut [T], rng: &mut dyn RngCore) {
    for i in (1..v.len()).rev() {
        let j = (rng.next_u32() as usize) % (i + 1);
        v.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_request_offsets_are_stable() {
        let mut req = SampleRequests::new();
        let a = req.request_2d(16);
        let b = req.request_2d(8);
        let c = req.request_1d(4);

        let mut rng = StdRng::seed_from_u64(1);
        let samples = Sampler::Random.generate_pixel(&req, 2, &mut rng);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].data_2d(a).len(), 16);
        assert_eq!(samples[0].data_2d(b).len(), 8);
        assert_eq!(samples[0].data_1d(c).len(), 4);
    }

    #[test]
    fn test_stratified_covers_strata() {
        let mut req = SampleRequests::new();
        let off = req.request_1d(8);
        let mut rng = StdRng::seed_from_u64(2);
        let samples = Sampler::Stratified.generate_pixel(&req, 1, &mut rng);
        let mut values: Vec<f32> = samples[0].data_1d(off).to_vec();
        values.sort_by(f32::total_cmp);
        // One value per stratum.
        for (i, v) in values.iter().enumerate() {
            assert!(*v >= i as f32 / 8.0 && *v < (i as f32 + 1.0) / 8.0);
        }
    }

    #[test]
    fn test_all_samples_in_unit_square() {
        let mut req = SampleRequests::new();
        let off = req.request_2d(9);
        let mut rng = StdRng::seed_from_u64(3);
        for sampler in [Sampler::Random, Sampler::Stratified] {
            let samples = sampler.generate_pixel(&req, 4, &mut rng);
            for s in &samples {
                assert!(s.img.x >= 0.0 && s.img.x < 1.0);
                for v in s.data_2d(off) {
                    assert!(v.x >= 0.0 && v.x < 1.0, "{v:?}");
                    assert!(v.y >= 0.0 && v.y < 1.0, "{v:?}");
                }
            }
        }
    }
}
