// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Portable deployment artifacts.
//!
//! An exported artifact freezes the configuration and weights into a single
//! self-describing binary blob that a runtime without the training stack can
//! consume. Weights ship either as raw `f32` or affine-quantized bytes.

use crate::error::{NnError, NnResult};
use crate::io::write_atomic;
use crate::model::{AutoencoderConfig, ModalityAutoencoder};
use crate::module::Module;
use mt_tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;

/// Weight encoding for an exported artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantization {
    /// Raw 32-bit floats.
    #[default]
    None,
    /// Per-tensor affine quantization to unsigned bytes.
    Affine8,
}

/// Controls for [`export`].
#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
    pub quantization: Quantization,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum TensorPayload {
    F32(Vec<f32>),
    Q8 {
        min: f32,
        scale: f32,
        values: Vec<u8>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PortableTensor {
    rows: usize,
    cols: usize,
    payload: TensorPayload,
}

impl PortableTensor {
    fn encode(tensor: &Tensor, quantization: Quantization) -> Self {
        let (rows, cols) = tensor.shape();
        let payload = match quantization {
            Quantization::None => TensorPayload::F32(tensor.data().to_vec()),
            Quantization::Affine8 => {
                let mut min = f32::INFINITY;
                let mut max = f32::NEG_INFINITY;
                for &value in tensor.data() {
                    min = min.min(value);
                    max = max.max(value);
                }
                if !min.is_finite() {
                    min = 0.0;
                    max = 0.0;
                }
                let scale = (max - min) / 255.0;
                let values = tensor
                    .data()
                    .iter()
                    .map(|&value| {
                        if scale <= f32::EPSILON {
                            0u8
                        } else {
                            ((value - min) / scale).round().clamp(0.0, 255.0) as u8
                        }
                    })
                    .collect();
                TensorPayload::Q8 { min, scale, values }
            }
        };
        Self {
            rows,
            cols,
            payload,
        }
    }

    fn decode(self) -> NnResult<Tensor> {
        let data = match self.payload {
            TensorPayload::F32(data) => data,
            TensorPayload::Q8 { min, scale, values } => values
                .into_iter()
                .map(|value| min + value as f32 * scale)
                .collect(),
        };
        Ok(Tensor::from_vec(self.rows, self.cols, data)?)
    }
}

/// Self-describing frozen model: configuration plus encoded weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortableArtifact {
    format_version: u32,
    quantization: Quantization,
    config: AutoencoderConfig,
    tensors: HashMap<String, PortableTensor>,
}

impl PortableArtifact {
    /// Freezes a trained model using the requested encoding.
    pub fn from_model(
        model: &ModalityAutoencoder,
        options: &ExportOptions,
    ) -> NnResult<Self> {
        let state = model.network().state_dict()?;
        if state.is_empty() {
            return Err(NnError::conversion("model has no parameters to export"));
        }
        let mut tensors = HashMap::new();
        for (name, tensor) in state {
            if tensor.data().iter().any(|value| !value.is_finite()) {
                return Err(NnError::conversion(format!(
                    "parameter {name:?} contains non-finite weights"
                )));
            }
            tensors.insert(name, PortableTensor::encode(&tensor, options.quantization));
        }
        Ok(Self {
            format_version: FORMAT_VERSION,
            quantization: options.quantization,
            config: model.config().clone(),
            tensors,
        })
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    pub fn quantization(&self) -> Quantization {
        self.quantization
    }

    pub fn to_bytes(&self) -> NnResult<Vec<u8>> {
        bincode::serialize(self).map_err(|err| NnError::serialization(err.to_string()))
    }

    /// Parses an artifact blob; content that does not decode, or a version
    /// this build does not understand, is a conversion failure.
    pub fn from_bytes(bytes: &[u8]) -> NnResult<Self> {
        let artifact: PortableArtifact = bincode::deserialize(bytes)
            .map_err(|err| NnError::conversion(format!("artifact does not parse: {err}")))?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(NnError::conversion(format!(
                "unsupported artifact version {}, expected {FORMAT_VERSION}",
                artifact.format_version
            )));
        }
        Ok(artifact)
    }

    /// Decodes the weights back into a plain state dictionary.
    pub fn into_state_dict(self) -> NnResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        for (name, tensor) in self.tensors {
            state.insert(name, tensor.decode()?);
        }
        Ok(state)
    }

    /// Rebuilds a runnable model from the artifact.
    pub fn into_model(self) -> NnResult<ModalityAutoencoder> {
        let config = self.config.clone();
        let state = self.into_state_dict()?;
        let mut model = ModalityAutoencoder::build(config)?;
        model.load_weights(&state)?;
        Ok(model)
    }
}

/// Freezes `model` to `path` and returns the written bytes.
pub fn export<P: AsRef<Path>>(
    model: &ModalityAutoencoder,
    path: P,
    options: &ExportOptions,
) -> NnResult<Vec<u8>> {
    let artifact = PortableArtifact::from_model(model, options)?;
    let bytes = artifact.to_bytes()?;
    write_atomic(path.as_ref(), &bytes)?;
    tracing::info!(
        path = %path.as_ref().display(),
        bytes = bytes.len(),
        quantization = ?options.quantization,
        "artifact exported"
    );
    Ok(bytes)
}

/// Loads a saved snapshot and freezes it in one step, the usual deployment
/// handoff after a training run.
pub fn export_from_snapshot<P: AsRef<Path>, Q: AsRef<Path>>(
    snapshot_path: P,
    artifact_path: Q,
    options: &ExportOptions,
) -> NnResult<Vec<u8>> {
    let model = ModalityAutoencoder::load(snapshot_path)?;
    export(&model, artifact_path, options)
}

/// Reads an artifact back, reporting a missing file as [`NnError::NotFound`].
pub fn import<P: AsRef<Path>>(path: P) -> NnResult<PortableArtifact> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            NnError::NotFound {
                path: PathBuf::from(path),
            }
        } else {
            NnError::from(err)
        }
    })?;
    PortableArtifact::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Modality;
    use tempfile::tempdir;

    fn small_model() -> ModalityAutoencoder {
        let config = AutoencoderConfig::for_modality(Modality::Network)
            .with_input_shape(vec![10])
            .with_latent_dim(4);
        ModalityAutoencoder::build(config).unwrap()
    }

    #[test]
    fn export_then_import_roundtrips_f32_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.mtpa");
        let model = small_model();
        let bytes = export(&model, &path, &ExportOptions::default()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        let restored = import(&path).unwrap().into_model().unwrap();
        let probe = Tensor::from_fn(2, 10, |r, c| ((r + c) % 5) as f32 / 5.0).unwrap();
        let lhs = model.reconstruct(&probe).unwrap();
        let rhs = restored.reconstruct(&probe).unwrap();
        assert_eq!(lhs.data(), rhs.data());
    }

    #[test]
    fn quantized_weights_stay_close() {
        let model = small_model();
        let options = ExportOptions {
            quantization: Quantization::Affine8,
        };
        let artifact = PortableArtifact::from_model(&model, &options).unwrap();
        let original = model.network().state_dict().unwrap();
        let decoded = artifact.into_state_dict().unwrap();
        for (name, tensor) in original {
            let restored = &decoded[&name];
            let mut span = 0.0f32;
            for &value in tensor.data() {
                span = span.max(value.abs());
            }
            let tolerance = (span * 2.0 / 255.0).max(1e-6);
            for (a, b) in tensor.data().iter().zip(restored.data()) {
                assert!((a - b).abs() <= tolerance, "{name}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn garbage_bytes_map_to_conversion() {
        assert!(matches!(
            PortableArtifact::from_bytes(b"junk"),
            Err(NnError::Conversion { .. })
        ));
    }

    #[test]
    fn missing_artifact_maps_to_not_found() {
        assert!(matches!(
            import("/nonexistent/model.mtpa"),
            Err(NnError::NotFound { .. })
        ));
    }

    #[test]
    fn export_from_snapshot_chains_load_and_freeze() {
        let dir = tempdir().unwrap();
        let snapshot_path = dir.path().join("model.bin");
        let artifact_path = dir.path().join("model.mtpa");
        small_model().save(&snapshot_path).unwrap();
        let bytes =
            export_from_snapshot(&snapshot_path, &artifact_path, &ExportOptions::default())
                .unwrap();
        assert!(!bytes.is_empty());
        assert!(matches!(
            export_from_snapshot("/nonexistent.bin", &artifact_path, &ExportOptions::default()),
            Err(NnError::NotFound { .. })
        ));
    }
}
