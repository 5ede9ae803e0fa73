// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Per-modality preprocessing pipelines.
//!
//! Each pipeline turns raw domain data into a single flattened row in the
//! unit interval, matching the shape the corresponding autoencoder declares.
//! File loaders report a missing input as [`NnError::NotFound`] and malformed
//! content as [`NnError::Conversion`].
//!
//! [`NnError::NotFound`]: crate::error::NnError::NotFound
//! [`NnError::Conversion`]: crate::error::NnError::Conversion

mod audio;
mod image;
mod lidar;
mod network;

pub use audio::AudioPipeline;
pub use image::ImagePipeline;
pub use lidar::LidarPipeline;
pub use network::NetworkPipeline;

use crate::error::{NnError, NnResult};
use std::path::Path;

/// Rescales values into [0, 1]. A constant signal maps to all zeros, so
/// running the normalization twice changes nothing.
pub(crate) fn min_max_normalize(values: &mut [f32]) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &value in values.iter() {
        min = min.min(value);
        max = max.max(value);
    }
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        for value in values.iter_mut() {
            *value = 0.0;
        }
        return;
    }
    for value in values.iter_mut() {
        *value = (*value - min) / range;
    }
}

pub(crate) fn read_text(path: &Path) -> NnResult<String> {
    std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            NnError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            NnError::from(err)
        }
    })
}

pub(crate) fn parse_field(raw: &str, line: usize) -> NnResult<f32> {
    raw.trim().parse::<f32>().map_err(|_| {
        NnError::conversion(format!("line {line}: {raw:?} is not a numeric field"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        let mut values = vec![2.0, 4.0, 6.0, 8.0];
        min_max_normalize(&mut values);
        let once = values.clone();
        min_max_normalize(&mut values);
        assert_eq!(values, once);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[3], 1.0);
    }

    #[test]
    fn constant_signal_normalizes_to_zero() {
        let mut values = vec![5.0; 4];
        min_max_normalize(&mut values);
        assert!(values.iter().all(|v| *v == 0.0));
    }
}
