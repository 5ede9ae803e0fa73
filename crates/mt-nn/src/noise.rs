// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Additive Gaussian corruption for denoising targets.

use crate::error::{NnError, NnResult};
use mt_tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

pub const DEFAULT_NOISE_FACTOR: f32 = 0.1;

/// Adds zero-mean Gaussian noise scaled by a fixed factor and clips the
/// result back into the unit interval, so corrupted tensors stay in the same
/// range the pipelines produce.
#[derive(Debug, Clone, Copy)]
pub struct GaussianNoise {
    noise_factor: f32,
}

impl Default for GaussianNoise {
    fn default() -> Self {
        Self {
            noise_factor: DEFAULT_NOISE_FACTOR,
        }
    }
}

impl GaussianNoise {
    pub fn new(noise_factor: f32) -> NnResult<Self> {
        if !noise_factor.is_finite() || noise_factor < 0.0 {
            return Err(NnError::configuration(format!(
                "noise factor must be finite and non-negative, got {noise_factor}"
            )));
        }
        Ok(Self { noise_factor })
    }

    pub fn noise_factor(&self) -> f32 {
        self.noise_factor
    }

    /// Returns a corrupted copy of `clean`, leaving the original untouched.
    pub fn corrupt<R: Rng + ?Sized>(&self, clean: &Tensor, rng: &mut R) -> NnResult<Tensor> {
        let normal = Normal::new(0.0f32, 1.0f32)
            .map_err(|err| NnError::configuration(err.to_string()))?;
        let (rows, cols) = clean.shape();
        let mut data = Vec::with_capacity(rows * cols);
        for &value in clean.data() {
            let noisy = value + self.noise_factor * normal.sample(rng);
            data.push(noisy.clamp(0.0, 1.0));
        }
        Ok(Tensor::from_vec(rows, cols, data)?)
    }

    /// Corrupts a stacked `(samples, features)` tensor in one pass. Each row
    /// draws fresh noise, so two identical rows corrupt differently.
    pub fn corrupt_batch<R: Rng + ?Sized>(&self, batch: &Tensor, rng: &mut R) -> NnResult<Tensor> {
        self.corrupt(batch, rng)
    }

    /// Seeded convenience wrapper for reproducible corpus generation.
    pub fn corrupt_seeded(&self, clean: &Tensor, seed: u64) -> NnResult<Tensor> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.corrupt(clean, &mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_stays_in_unit_interval() {
        let noise = GaussianNoise::new(0.5).unwrap();
        let clean = Tensor::from_fn(4, 8, |r, c| ((r + c) % 2) as f32).unwrap();
        let noisy = noise.corrupt_seeded(&clean, 7).unwrap();
        assert_eq!(noisy.shape(), clean.shape());
        for value in noisy.data() {
            assert!(*value >= 0.0 && *value <= 1.0);
        }
    }

    #[test]
    fn zero_factor_is_identity() {
        let noise = GaussianNoise::new(0.0).unwrap();
        let clean = Tensor::from_fn(2, 3, |r, c| (r * 3 + c) as f32 * 0.1).unwrap();
        let noisy = noise.corrupt_seeded(&clean, 1).unwrap();
        assert_eq!(noisy.data(), clean.data());
    }

    #[test]
    fn seeded_corruption_is_reproducible() {
        let noise = GaussianNoise::default();
        let clean = Tensor::from_fn(3, 3, |_, c| c as f32 * 0.25).unwrap();
        let first = noise.corrupt_seeded(&clean, 99).unwrap();
        let second = noise.corrupt_seeded(&clean, 99).unwrap();
        assert_eq!(first.data(), second.data());
    }

    #[test]
    fn negative_factor_is_rejected() {
        assert!(GaussianNoise::new(-0.1).is_err());
        assert!(GaussianNoise::new(f32::NAN).is_err());
    }
}
