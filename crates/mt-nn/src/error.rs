// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Error taxonomy for the autoencoder subsystem.
//!
//! Shape and configuration violations are precondition checks raised before
//! any expensive computation; nothing here is retried internally.

use mt_tensor::TensorError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for autoencoder, training, preprocessing, and export calls.
pub type NnResult<T> = Result<T, NnError>;

/// Errors surfaced by the `mt-nn` crate.
#[derive(Debug, Error)]
pub enum NnError {
    /// Unsupported modality tag or an invalid shape/dimension in a config.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// A dataset or tensor disagrees with the modality's declared input shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A load or export referenced a persisted artifact that does not exist.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Export or quantization failed to produce a portable artifact.
    #[error("conversion failed: {reason}")]
    Conversion { reason: String },

    /// Propagated failure from a tensor primitive.
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),

    /// I/O failure while persisting or restoring an artifact.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serde failure while encoding or decoding an artifact.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl NnError {
    /// Builds a configuration error from any displayable reason.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Builds a conversion error from any displayable reason.
    pub fn conversion(reason: impl Into<String>) -> Self {
        Self::Conversion {
            reason: reason.into(),
        }
    }

    /// Builds a serialization error from any displayable source.
    pub fn serialization(err: impl ToString) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_shape_pair() {
        let err = NnError::ShapeMismatch {
            expected: vec![128, 128, 3],
            got: vec![100],
        };
        assert_eq!(
            err.to_string(),
            "shape mismatch: expected [128, 128, 3], got [100]"
        );
    }

    #[test]
    fn display_names_the_missing_path() {
        let err = NnError::NotFound {
            path: PathBuf::from("models/dae_model.bin"),
        };
        assert_eq!(err.to_string(), "not found: models/dae_model.bin");
    }

    #[test]
    fn tensor_errors_convert() {
        let err: NnError = TensorError::EmptyInput("cat_rows").into();
        assert!(err.to_string().contains("cat_rows"));
    }
}
