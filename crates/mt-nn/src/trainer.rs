// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! End-to-end training runs: corruption, fitting, and snapshotting.
//!
//! The trainer owns the denoising recipe. Callers hand it clean samples;
//! it derives the corrupted inputs, drives [`ModalityAutoencoder::fit`],
//! and optionally persists the result.

use crate::error::{NnError, NnResult};
use crate::model::{
    AutoencoderConfig, FitConfig, Modality, ModalityAutoencoder, TrainingHistory,
    DEFAULT_LATENT_DIM,
};
use crate::noise::{GaussianNoise, DEFAULT_NOISE_FACTOR};
use crate::Dataset;
use mt_tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Full recipe for one training run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainConfig {
    pub modality: Modality,
    pub input_shape: Option<Vec<usize>>,
    pub latent_dim: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
    pub noise_factor: f32,
    pub learning_rate: f32,
    pub seed: u64,
    pub model_path: Option<PathBuf>,
}

impl TrainConfig {
    /// Canonical recipe for a modality; matches the published defaults.
    pub fn new(modality: Modality) -> Self {
        Self {
            modality,
            input_shape: None,
            latent_dim: DEFAULT_LATENT_DIM,
            epochs: 50,
            batch_size: 32,
            validation_split: 0.1,
            noise_factor: DEFAULT_NOISE_FACTOR,
            learning_rate: 1e-3,
            seed: 42,
            model_path: None,
        }
    }

    /// Expands into the architecture description.
    pub fn autoencoder_config(&self) -> AutoencoderConfig {
        let mut config =
            AutoencoderConfig::for_modality(self.modality).with_latent_dim(self.latent_dim);
        if let Some(shape) = &self.input_shape {
            config = config.with_input_shape(shape.clone());
        }
        config
    }

    fn fit_config(&self) -> FitConfig {
        FitConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            validation_split: self.validation_split,
            learning_rate: self.learning_rate,
            shuffle_seed: self.seed,
        }
    }
}

/// Outcome of a completed run.
pub struct TrainReport {
    pub model: ModalityAutoencoder,
    pub history: TrainingHistory,
}

/// Drives denoising training runs from clean samples.
pub struct Trainer {
    config: TrainConfig,
    noise: GaussianNoise,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> NnResult<Self> {
        let noise = GaussianNoise::new(config.noise_factor)?;
        Ok(Self { config, noise })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Corrupts the clean samples, fits the autoencoder, and saves the
    /// snapshot when a model path is configured.
    ///
    /// Each clean sample is a single flattened row; a sample whose width
    /// disagrees with the configured shape fails the run before any noise
    /// or gradient work happens.
    pub fn train(&self, clean: &[Tensor]) -> NnResult<TrainReport> {
        if clean.is_empty() {
            return Err(NnError::configuration("no training samples supplied"));
        }
        let model_config = self.config.autoencoder_config();
        model_config.validate()?;
        let expected = model_config.flattened_len();
        for sample in clean {
            if sample.shape() != (1, expected) {
                return Err(NnError::ShapeMismatch {
                    expected: model_config.input_shape().to_vec(),
                    got: vec![sample.shape().0, sample.shape().1],
                });
            }
        }
        tracing::info!(
            modality = %self.config.modality,
            samples = clean.len(),
            epochs = self.config.epochs,
            noise_factor = self.noise.noise_factor() as f64,
            "starting denoising run"
        );
        let mut dataset = Dataset::new();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        for sample in clean {
            let noisy = self.noise.corrupt(sample, &mut rng)?;
            dataset.push(noisy, sample.clone());
        }
        let mut model = ModalityAutoencoder::build(model_config)?;
        model.compile(self.config.learning_rate)?;
        let history = model.fit(dataset, &self.config.fit_config())?;
        tracing::info!(
            final_loss = ?history.final_loss(),
            final_val_loss = ?history.final_val_loss(),
            "run complete"
        );
        if let Some(path) = &self.config.model_path {
            model.save(path)?;
            tracing::info!(path = %path.display(), "snapshot written");
        }
        Ok(TrainReport { model, history })
    }
}

/// Deterministic smooth samples in the unit interval, shaped for the given
/// configuration. Useful for smoke-training and examples.
pub fn synthetic_dataset(config: &AutoencoderConfig, count: usize, seed: u64) -> NnResult<Vec<Tensor>> {
    config.validate()?;
    let width = config.flattened_len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let phase: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let frequency: f32 = rng.gen_range(0.02..0.2);
        let sample = Tensor::from_fn(1, width, |_, col| {
            0.5 + 0.45 * (col as f32 * frequency + phase).sin()
        })?;
        samples.push(sample);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config() -> TrainConfig {
        let mut config = TrainConfig::new(Modality::Network);
        config.input_shape = Some(vec![12]);
        config.latent_dim = 6;
        config.epochs = 5;
        config.batch_size = 4;
        config
    }

    #[test]
    fn synthetic_samples_stay_in_unit_interval() {
        let config = AutoencoderConfig::for_modality(Modality::Network).with_input_shape(vec![16]);
        let samples = synthetic_dataset(&config, 4, 3).unwrap();
        assert_eq!(samples.len(), 4);
        for sample in &samples {
            assert_eq!(sample.shape(), (1, 16));
            for value in sample.data() {
                assert!(*value >= 0.0 && *value <= 1.0);
            }
        }
    }

    #[test]
    fn trainer_produces_history_for_every_epoch() {
        let config = small_config();
        let samples = synthetic_dataset(&config.autoencoder_config(), 20, 11).unwrap();
        let trainer = Trainer::new(config).unwrap();
        let report = trainer.train(&samples).unwrap();
        assert_eq!(report.history.loss.len(), 5);
        assert!(report.history.final_loss().unwrap().is_finite());
    }

    #[test]
    fn trainer_rejects_mismatched_samples() {
        let config = small_config();
        let trainer = Trainer::new(config).unwrap();
        let samples = vec![Tensor::zeros(1, 9).unwrap()];
        assert!(matches!(
            trainer.train(&samples),
            Err(NnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn trainer_writes_snapshot_when_configured() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("net.bin");
        let mut config = small_config();
        config.epochs = 2;
        config.model_path = Some(path.clone());
        let samples = synthetic_dataset(&config.autoencoder_config(), 12, 5).unwrap();
        let trainer = Trainer::new(config).unwrap();
        let report = trainer.train(&samples).unwrap();
        assert!(path.exists());
        let restored = ModalityAutoencoder::load(&path).unwrap();
        let probe = samples[0].clone();
        let lhs = report.model.reconstruct(&probe).unwrap();
        let rhs = restored.reconstruct(&probe).unwrap();
        assert_eq!(lhs.data(), rhs.data());
    }
}
