// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

pub mod activation;
pub mod conv;
pub mod conv3d;
pub mod linear;
pub mod recurrent;
pub mod sequential;

pub use activation::{Relu, Sigmoid};
pub use conv::{Conv2d, ConvTranspose2d, MaxPool2d};
pub use conv3d::{Conv3d, ConvTranspose3d, MaxPool3d};
pub use linear::Linear;
pub use recurrent::{Lstm, RecurrentDecoder, RecurrentEncoder};
pub use sequential::Sequential;

use mt_tensor::{Tensor, TensorError, TensorResult};

pub(crate) fn validate_positive(value: usize, _label: &str) -> TensorResult<()> {
    if value == 0 {
        return Err(TensorError::InvalidDimensions {
            rows: 1,
            cols: value,
        });
    }
    Ok(())
}

/// Deterministic fan-in scaled initialisation shared by the weighted layers.
/// Keeping the scheme seedless makes freshly built graphs reproducible across
/// processes without threading an RNG through every constructor.
pub(crate) fn init_weight(rows: usize, cols: usize, fan_in: usize) -> TensorResult<Tensor> {
    let scale = (1.0 / fan_in.max(1) as f32).sqrt();
    Tensor::from_fn(rows, cols, |row, col| {
        let cell = ((row * 31 + col * 17) % 29) as f32;
        (cell / 14.5 - 1.0) * scale
    })
}
