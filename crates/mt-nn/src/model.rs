// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Modality-adaptive denoising autoencoders.
//!
//! [`ModalityAutoencoder::build`] selects an architecture from the declared
//! [`Modality`]: convolutional stacks for planar and volumetric grids, a
//! plain dense pair for flat feature vectors, and a recurrent
//! sequence-to-latent pair for framed audio. Every variant squeezes through
//! a dense latent layer of width `latent_dim` and reconstructs tensors with
//! exactly the declared input shape.

use crate::dataset::Dataset;
use crate::error::{NnError, NnResult};
use crate::io::{self, ModelSnapshot};
use crate::layers::{
    Conv2d, Conv3d, ConvTranspose2d, ConvTranspose3d, Linear, MaxPool2d, MaxPool3d,
    RecurrentDecoder, RecurrentEncoder, Relu, Sequential, Sigmoid,
};
use crate::loss::{Loss, MeanSquaredError};
use crate::module::Module;
use mt_tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_LATENT_DIM: usize = 64;

/// Input modality the autoencoder is specialised for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Network,
    Lidar,
    Audio,
}

impl Modality {
    pub const ALL: [Modality; 4] = [
        Modality::Image,
        Modality::Network,
        Modality::Lidar,
        Modality::Audio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Network => "network",
            Modality::Lidar => "lidar",
            Modality::Audio => "audio",
        }
    }

    /// Canonical input shape for the modality.
    pub fn default_input_shape(&self) -> Vec<usize> {
        match self {
            Modality::Image => vec![128, 128, 3],
            Modality::Network => vec![100],
            Modality::Lidar => vec![32, 32, 32, 1],
            Modality::Audio => vec![50, 20],
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = NnError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Modality::Image),
            "network" => Ok(Modality::Network),
            "lidar" => Ok(Modality::Lidar),
            "audio" => Ok(Modality::Audio),
            other => Err(NnError::configuration(format!(
                "unknown modality {other:?}; expected one of image, network, lidar, audio"
            ))),
        }
    }
}

/// Declarative description of an autoencoder: modality, input shape, and
/// latent width.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    modality: Modality,
    input_shape: Vec<usize>,
    latent_dim: usize,
}

impl AutoencoderConfig {
    /// Builds the canonical configuration for a modality.
    pub fn for_modality(modality: Modality) -> Self {
        Self {
            modality,
            input_shape: modality.default_input_shape(),
            latent_dim: DEFAULT_LATENT_DIM,
        }
    }

    /// Overrides the input shape.
    pub fn with_input_shape(mut self, input_shape: Vec<usize>) -> Self {
        self.input_shape = input_shape;
        self
    }

    /// Overrides the latent width.
    pub fn with_latent_dim(mut self, latent_dim: usize) -> Self {
        self.latent_dim = latent_dim;
        self
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Number of scalars in one flattened sample.
    pub fn flattened_len(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// Checks the shape against the structural requirements of the modality.
    pub fn validate(&self) -> NnResult<()> {
        if self.latent_dim == 0 {
            return Err(NnError::configuration("latent_dim must be positive"));
        }
        if self.input_shape.iter().any(|&dim| dim == 0) {
            return Err(NnError::configuration(format!(
                "input shape {:?} contains a zero dimension",
                self.input_shape
            )));
        }
        match self.modality {
            Modality::Image => {
                let [height, width, channels] = self.dims::<3>("height x width x channels")?;
                if channels == 0 || height % 4 != 0 || width % 4 != 0 {
                    return Err(NnError::configuration(format!(
                        "image shape {height}x{width}x{channels} must have height and width \
                         divisible by 4 so two pooling stages invert exactly"
                    )));
                }
            }
            Modality::Network => {
                self.dims::<1>("features")?;
            }
            Modality::Lidar => {
                let [depth, height, width, _channels] =
                    self.dims::<4>("depth x height x width x channels")?;
                if depth % 4 != 0 || height % 4 != 0 || width % 4 != 0 {
                    return Err(NnError::configuration(format!(
                        "lidar grid {depth}x{height}x{width} must have spatial axes divisible \
                         by 4 so two pooling stages invert exactly"
                    )));
                }
            }
            Modality::Audio => {
                self.dims::<2>("timesteps x features")?;
            }
        }
        Ok(())
    }

    fn dims<const N: usize>(&self, expected: &str) -> NnResult<[usize; N]> {
        <[usize; N]>::try_from(self.input_shape.as_slice()).map_err(|_| {
            NnError::configuration(format!(
                "{} input expects {expected} ({N} dimensions), got {:?}",
                self.modality, self.input_shape
            ))
        })
    }
}

/// Knobs for a single training run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
    pub learning_rate: f32,
    pub shuffle_seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            validation_split: 0.1,
            learning_rate: 1e-3,
            shuffle_seed: 42,
        }
    }
}

impl FitConfig {
    fn validate(&self) -> NnResult<()> {
        if self.batch_size == 0 {
            return Err(NnError::configuration("batch_size must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(NnError::configuration(format!(
                "validation_split must lie in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(NnError::configuration(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Per-epoch training and validation loss curves.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f32>,
    pub val_loss: Vec<f32>,
}

impl TrainingHistory {
    pub fn final_loss(&self) -> Option<f32> {
        self.loss.last().copied()
    }

    pub fn final_val_loss(&self) -> Option<f32> {
        self.val_loss.last().copied()
    }
}

/// A denoising autoencoder whose layer stack was selected by modality.
pub struct ModalityAutoencoder {
    config: AutoencoderConfig,
    network: Sequential,
    compiled: bool,
}

impl ModalityAutoencoder {
    /// Validates the configuration and assembles the matching layer stack.
    pub fn build(config: AutoencoderConfig) -> NnResult<Self> {
        config.validate()?;
        let network = match config.modality() {
            Modality::Image => build_image(&config)?,
            Modality::Network => build_network(&config)?,
            Modality::Lidar => build_lidar(&config)?,
            Modality::Audio => build_audio(&config)?,
        };
        tracing::debug!(
            modality = %config.modality(),
            layers = network.len(),
            parameters = network.parameter_count()?,
            "assembled autoencoder"
        );
        Ok(Self {
            config,
            network,
            compiled: false,
        })
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> NnResult<usize> {
        Ok(self.network.parameter_count()?)
    }

    /// Attaches Adam state to every parameter.
    pub fn compile(&mut self, learning_rate: f32) -> NnResult<()> {
        if !learning_rate.is_finite() || learning_rate <= 0.0 {
            return Err(NnError::configuration(format!(
                "learning_rate must be positive and finite, got {learning_rate}"
            )));
        }
        self.network
            .attach_adam(learning_rate, 0.9, 0.999, 1e-8)?;
        self.compiled = true;
        Ok(())
    }

    fn guard_batch(&self, batch: &Tensor) -> NnResult<()> {
        let cols = batch.shape().1;
        let expected = self.config.flattened_len();
        if cols != expected {
            return Err(NnError::ShapeMismatch {
                expected: self.config.input_shape().to_vec(),
                got: vec![cols],
            });
        }
        Ok(())
    }

    /// Runs a batch of flattened samples through the full encoder/decoder.
    pub fn reconstruct(&self, batch: &Tensor) -> NnResult<Tensor> {
        self.guard_batch(batch)?;
        Ok(self.network.forward(batch)?)
    }

    /// Mean squared reconstruction error over a batch, without touching
    /// gradients.
    pub fn evaluate(&self, inputs: &Tensor, targets: &Tensor) -> NnResult<f32> {
        self.guard_batch(inputs)?;
        self.guard_batch(targets)?;
        let output = self.network.forward(inputs)?;
        let mut loss = MeanSquaredError::new();
        Ok(loss.forward(&output, targets)?.data()[0])
    }

    /// Trains on `(corrupted, clean)` pairs, holding out the configured tail
    /// fraction for validation.
    pub fn fit(&mut self, dataset: Dataset, options: &FitConfig) -> NnResult<TrainingHistory> {
        options.validate()?;
        if dataset.is_empty() {
            return Err(NnError::configuration("training dataset is empty"));
        }
        // Every sample must already match the declared shape; fail before
        // any gradient work happens.
        let expected = self.config.flattened_len();
        for (input, target) in dataset.iter() {
            if input.shape().1 != expected || target.shape().1 != expected {
                return Err(NnError::ShapeMismatch {
                    expected: self.config.input_shape().to_vec(),
                    got: vec![input.shape().1.max(target.shape().1)],
                });
            }
        }
        if !self.compiled {
            return Err(NnError::configuration(
                "model must be compiled before fitting",
            ));
        }
        let (train, holdout) = dataset.split_holdout(options.validation_split);
        if train.is_empty() {
            return Err(NnError::configuration(
                "validation split leaves no training samples",
            ));
        }
        let mut history = TrainingHistory::default();
        let mut loss_fn = MeanSquaredError::new();
        for epoch in 0..options.epochs {
            let loader = train
                .loader()
                .shuffle(options.shuffle_seed.wrapping_add(epoch as u64))
                .batched(options.batch_size);
            let mut epoch_loss = 0.0f32;
            let mut batches = 0usize;
            for batch in loader {
                let (inputs, targets) = batch?;
                let output = self.network.forward(&inputs)?;
                epoch_loss += loss_fn.forward(&output, &targets)?.data()[0];
                let grad = loss_fn.backward(&output, &targets)?;
                self.network.backward(&inputs, &grad)?;
                self.network.apply_step(options.learning_rate)?;
                batches += 1;
            }
            let train_loss = epoch_loss / batches.max(1) as f32;
            history.loss.push(train_loss);
            if !holdout.is_empty() {
                let mut val_loss = 0.0f32;
                let mut val_batches = 0usize;
                for batch in holdout.loader().batched(options.batch_size) {
                    let (inputs, targets) = batch?;
                    let output = self.network.forward(&inputs)?;
                    val_loss += loss_fn.forward(&output, &targets)?.data()[0];
                    val_batches += 1;
                }
                history.val_loss.push(val_loss / val_batches.max(1) as f32);
            }
            tracing::debug!(
                epoch = epoch + 1,
                train_loss = train_loss as f64,
                val_loss = ?history.final_val_loss(),
                "epoch complete"
            );
        }
        Ok(history)
    }

    /// Persists the configuration and weights as a binary snapshot.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> NnResult<()> {
        let snapshot = ModelSnapshot::capture(&self.config, &self.network)?;
        io::save_snapshot(&snapshot, path)
    }

    /// Rebuilds a model from a snapshot written by [`ModalityAutoencoder::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> NnResult<Self> {
        let snapshot = io::load_snapshot(path)?;
        let mut model = Self::build(snapshot.config().clone())?;
        snapshot.restore(&mut model.network)?;
        Ok(model)
    }

    /// Replaces every parameter from a named state dictionary.
    pub fn load_weights(
        &mut self,
        state: &std::collections::HashMap<String, Tensor>,
    ) -> NnResult<()> {
        self.network.load_state_dict(state)?;
        Ok(())
    }

    pub(crate) fn network(&self) -> &Sequential {
        &self.network
    }
}

fn build_image(config: &AutoencoderConfig) -> NnResult<Sequential> {
    let shape = config.input_shape();
    let (height, width, channels) = (shape[0], shape[1], shape[2]);
    let half = (height / 2, width / 2);
    let quarter = (height / 4, width / 4);
    let mut net = Sequential::new();
    net.push(Conv2d::new("enc1", channels, 32, (3, 3), (1, 1), (1, 1), (height, width))?);
    net.push(Relu);
    net.push(MaxPool2d::new(32, (2, 2), (2, 2), (height, width))?);
    net.push(Conv2d::new("enc2", 32, 16, (3, 3), (1, 1), (1, 1), half)?);
    net.push(Relu);
    net.push(MaxPool2d::new(16, (2, 2), (2, 2), half)?);
    // Dense bottleneck over the quarter-resolution feature map; the rows are
    // already flat, so squeezing to latent_dim and back is two Linear layers.
    let flat = 16 * quarter.0 * quarter.1;
    net.push(Linear::new("latent_enc", flat, config.latent_dim())?);
    net.push(Relu);
    net.push(Linear::new("latent_dec", config.latent_dim(), flat)?);
    net.push(Relu);
    net.push(ConvTranspose2d::new("dec1", 16, 16, (2, 2), (2, 2), quarter)?);
    net.push(Relu);
    net.push(ConvTranspose2d::new("dec2", 16, 32, (2, 2), (2, 2), half)?);
    net.push(Relu);
    net.push(Conv2d::new("dec3", 32, channels, (3, 3), (1, 1), (1, 1), (height, width))?);
    net.push(Sigmoid);
    Ok(net)
}

fn build_network(config: &AutoencoderConfig) -> NnResult<Sequential> {
    let features = config.input_shape()[0];
    let latent = config.latent_dim();
    let hidden = (features + latent) / 2;
    let mut net = Sequential::new();
    net.push(Linear::new("enc1", features, hidden.max(latent))?);
    net.push(Relu);
    net.push(Linear::new("enc2", hidden.max(latent), latent)?);
    net.push(Relu);
    net.push(Linear::new("dec1", latent, hidden.max(latent))?);
    net.push(Relu);
    net.push(Linear::new("dec2", hidden.max(latent), features)?);
    net.push(Sigmoid);
    Ok(net)
}

fn build_lidar(config: &AutoencoderConfig) -> NnResult<Sequential> {
    let shape = config.input_shape();
    let (depth, height, width, channels) = (shape[0], shape[1], shape[2], shape[3]);
    let full = (depth, height, width);
    let half = (depth / 2, height / 2, width / 2);
    let quarter = (depth / 4, height / 4, width / 4);
    let mut net = Sequential::new();
    net.push(Conv3d::new("enc1", channels, 32, 3, 1, 1, full)?);
    net.push(Relu);
    net.push(MaxPool3d::new(32, 2, 2, full)?);
    net.push(Conv3d::new("enc2", 32, 16, 3, 1, 1, half)?);
    net.push(Relu);
    net.push(MaxPool3d::new(16, 2, 2, half)?);
    let flat = 16 * quarter.0 * quarter.1 * quarter.2;
    net.push(Linear::new("latent_enc", flat, config.latent_dim())?);
    net.push(Relu);
    net.push(Linear::new("latent_dec", config.latent_dim(), flat)?);
    net.push(Relu);
    net.push(ConvTranspose3d::new("dec1", 16, 16, 2, 2, quarter)?);
    net.push(Relu);
    net.push(ConvTranspose3d::new("dec2", 16, 32, 2, 2, half)?);
    net.push(Relu);
    net.push(Conv3d::new("dec3", 32, channels, 3, 1, 1, full)?);
    net.push(Sigmoid);
    Ok(net)
}

fn build_audio(config: &AutoencoderConfig) -> NnResult<Sequential> {
    let shape = config.input_shape();
    let (timesteps, features) = (shape[0], shape[1]);
    let latent = config.latent_dim();
    let mut net = Sequential::new();
    net.push(RecurrentEncoder::new("enc", timesteps, features, latent)?);
    net.push(RecurrentDecoder::new("dec", timesteps, features, latent)?);
    net.push(Sigmoid);
    Ok(net)
}
