// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Recurrent layers for framed sequence inputs.
//!
//! [`Lstm`] runs a single sequence laid out along the row axis. The encoder
//! and decoder wrappers lift it to batched operation: each batch row holds a
//! flattened `timesteps * features` sequence, and the wrappers unroll one
//! sample at a time with fresh state.

use crate::layers::{init_weight, validate_positive};
use crate::layers::{Linear, Relu};
use crate::module::{Module, Parameter};
use mt_tensor::{Tensor, TensorError, TensorResult};
use std::cell::RefCell;

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Single-layer LSTM operating on sequences laid out along the row axis.
#[derive(Debug)]
pub struct Lstm {
    input_dim: usize,
    hidden_dim: usize,
    weight_ih: Parameter,
    weight_hh: Parameter,
    bias_ih: Parameter,
    bias_hh: Parameter,
    hidden_state: RefCell<Tensor>,
    cell_state: RefCell<Tensor>,
    cache: RefCell<Option<LstmCache>>,
}

#[derive(Debug, Clone)]
struct LstmCache {
    inputs: Vec<f32>,
    gates_i: Vec<f32>,
    gates_f: Vec<f32>,
    gates_g: Vec<f32>,
    gates_o: Vec<f32>,
    hidden_states: Vec<f32>,
    cell_states: Vec<f32>,
    timesteps: usize,
    input_dim: usize,
    hidden_dim: usize,
}

impl LstmCache {
    fn new(timesteps: usize, input_dim: usize, hidden_dim: usize, h0: &[f32], c0: &[f32]) -> Self {
        let mut hidden_states = vec![0.0f32; (timesteps + 1) * hidden_dim];
        hidden_states[..hidden_dim].copy_from_slice(h0);
        let mut cell_states = vec![0.0f32; (timesteps + 1) * hidden_dim];
        cell_states[..hidden_dim].copy_from_slice(c0);
        Self {
            inputs: vec![0.0f32; timesteps * input_dim],
            gates_i: vec![0.0f32; timesteps * hidden_dim],
            gates_f: vec![0.0f32; timesteps * hidden_dim],
            gates_g: vec![0.0f32; timesteps * hidden_dim],
            gates_o: vec![0.0f32; timesteps * hidden_dim],
            hidden_states,
            cell_states,
            timesteps,
            input_dim,
            hidden_dim,
        }
    }
}

impl Lstm {
    pub fn new(name: impl Into<String>, input_dim: usize, hidden_dim: usize) -> TensorResult<Self> {
        validate_positive(input_dim, "input_dim")?;
        validate_positive(hidden_dim, "hidden_dim")?;
        let name = name.into();
        let weight_ih = init_weight(input_dim, 4 * hidden_dim, input_dim)?;
        let weight_hh = init_weight(hidden_dim, 4 * hidden_dim, hidden_dim)?;
        let bias_ih = Tensor::zeros(1, 4 * hidden_dim)?;
        let bias_hh = Tensor::zeros(1, 4 * hidden_dim)?;
        let hidden_state = Tensor::zeros(1, hidden_dim)?;
        let cell_state = Tensor::zeros(1, hidden_dim)?;
        Ok(Self {
            input_dim,
            hidden_dim,
            weight_ih: Parameter::new(format!("{name}::weight_ih"), weight_ih),
            weight_hh: Parameter::new(format!("{name}::weight_hh"), weight_hh),
            bias_ih: Parameter::new(format!("{name}::bias_ih"), bias_ih),
            bias_hh: Parameter::new(format!("{name}::bias_hh"), bias_hh),
            hidden_state: RefCell::new(hidden_state),
            cell_state: RefCell::new(cell_state),
            cache: RefCell::new(None),
        })
    }

    /// Resets the hidden and cell state to zero.
    pub fn reset_state(&self) -> TensorResult<()> {
        *self.hidden_state.borrow_mut() = Tensor::zeros(1, self.hidden_dim)?;
        *self.cell_state.borrow_mut() = Tensor::zeros(1, self.hidden_dim)?;
        Ok(())
    }

    fn guard_input(&self, input: &Tensor) -> TensorResult<()> {
        let (rows, cols) = input.shape();
        if cols != self.input_dim {
            return Err(TensorError::ShapeMismatch {
                left: (rows, cols),
                right: (rows, self.input_dim),
            });
        }
        if rows == 0 {
            return Err(TensorError::EmptyInput("lstm_forward"));
        }
        Ok(())
    }
}

impl Module for Lstm {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        self.guard_input(input)?;
        let (timesteps, _) = input.shape();
        let hidden_dim = self.hidden_dim;
        let input_dim = self.input_dim;
        let mut output = vec![0.0f32; timesteps * hidden_dim];
        let mut hidden_prev = self.hidden_state.borrow().data().to_vec();
        let mut cell_prev = self.cell_state.borrow().data().to_vec();
        let mut cache = LstmCache::new(timesteps, input_dim, hidden_dim, &hidden_prev, &cell_prev);
        let weight_ih = self.weight_ih.value();
        let weight_hh = self.weight_hh.value();
        let bias_ih = self.bias_ih.value();
        let bias_hh = self.bias_hh.value();
        for t in 0..timesteps {
            let input_slice = &input.data()[t * input_dim..(t + 1) * input_dim];
            cache.inputs[t * input_dim..(t + 1) * input_dim].copy_from_slice(input_slice);
            let mut gates = vec![0.0f32; 4 * hidden_dim];
            for gate in 0..4 * hidden_dim {
                let mut value = bias_ih.data()[gate] + bias_hh.data()[gate];
                for idx in 0..input_dim {
                    value += input_slice[idx] * weight_ih.data()[idx * 4 * hidden_dim + gate];
                }
                for idx in 0..hidden_dim {
                    value += hidden_prev[idx] * weight_hh.data()[idx * 4 * hidden_dim + gate];
                }
                gates[gate] = value;
            }
            for unit in 0..hidden_dim {
                let gi = sigmoid(gates[unit]);
                let gf = sigmoid(gates[hidden_dim + unit]);
                let gg = gates[2 * hidden_dim + unit].tanh();
                let go = sigmoid(gates[3 * hidden_dim + unit]);
                let cell = gf * cell_prev[unit] + gi * gg;
                let hidden = go * cell.tanh();
                cache.gates_i[t * hidden_dim + unit] = gi;
                cache.gates_f[t * hidden_dim + unit] = gf;
                cache.gates_g[t * hidden_dim + unit] = gg;
                cache.gates_o[t * hidden_dim + unit] = go;
                cache.cell_states[(t + 1) * hidden_dim + unit] = cell;
                cache.hidden_states[(t + 1) * hidden_dim + unit] = hidden;
                cell_prev[unit] = cell;
                hidden_prev[unit] = hidden;
                output[t * hidden_dim + unit] = hidden;
            }
        }
        *self.hidden_state.borrow_mut() = Tensor::from_vec(1, hidden_dim, hidden_prev)?;
        *self.cell_state.borrow_mut() = Tensor::from_vec(1, hidden_dim, cell_prev)?;
        *self.cache.borrow_mut() = Some(cache);
        Tensor::from_vec(timesteps, hidden_dim, output)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor> {
        self.guard_input(input)?;
        if grad_output.shape().0 != input.shape().0 || grad_output.shape().1 != self.hidden_dim {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (input.shape().0, self.hidden_dim),
            });
        }
        let cache = self
            .cache
            .borrow_mut()
            .take()
            .ok_or(TensorError::InvalidValue {
                label: "lstm_cache_missing",
            })?;
        let timesteps = cache.timesteps;
        let input_dim = cache.input_dim;
        let hidden_dim = cache.hidden_dim;
        let weight_ih = self.weight_ih.value();
        let weight_hh = self.weight_hh.value();
        let mut grad_input = vec![0.0f32; timesteps * input_dim];
        let mut grad_w_ih = vec![0.0f32; input_dim * 4 * hidden_dim];
        let mut grad_w_hh = vec![0.0f32; hidden_dim * 4 * hidden_dim];
        let mut grad_b_ih = vec![0.0f32; 4 * hidden_dim];
        let mut grad_b_hh = vec![0.0f32; 4 * hidden_dim];
        let mut grad_h_next = vec![0.0f32; hidden_dim];
        let mut grad_c_next = vec![0.0f32; hidden_dim];
        for step in (0..timesteps).rev() {
            let grad_hidden_slice = &grad_output.data()[step * hidden_dim..(step + 1) * hidden_dim];
            let prev_hidden = &cache.hidden_states[step * hidden_dim..(step + 1) * hidden_dim];
            let prev_cell = &cache.cell_states[step * hidden_dim..(step + 1) * hidden_dim];
            let curr_cell = &cache.cell_states[(step + 1) * hidden_dim..(step + 2) * hidden_dim];
            let mut gate_grad = vec![0.0f32; 4 * hidden_dim];
            for unit in 0..hidden_dim {
                let dh = grad_hidden_slice[unit] + grad_h_next[unit];
                let o = cache.gates_o[step * hidden_dim + unit];
                let i = cache.gates_i[step * hidden_dim + unit];
                let f = cache.gates_f[step * hidden_dim + unit];
                let g = cache.gates_g[step * hidden_dim + unit];
                let tanh_c = curr_cell[unit].tanh();
                let do_gate = dh * tanh_c * o * (1.0 - o);
                let dc = dh * o * (1.0 - tanh_c * tanh_c) + grad_c_next[unit];
                let di = dc * g * i * (1.0 - i);
                let dg = dc * i * (1.0 - g * g);
                let df = dc * prev_cell[unit] * f * (1.0 - f);
                grad_c_next[unit] = dc * f;
                gate_grad[unit] = di;
                gate_grad[hidden_dim + unit] = df;
                gate_grad[2 * hidden_dim + unit] = dg;
                gate_grad[3 * hidden_dim + unit] = do_gate;
            }
            for gate in 0..4 * hidden_dim {
                grad_b_ih[gate] += gate_grad[gate];
                grad_b_hh[gate] += gate_grad[gate];
            }
            for input_idx in 0..input_dim {
                let mut acc = 0.0f32;
                for gate in 0..4 * hidden_dim {
                    acc += gate_grad[gate] * weight_ih.data()[input_idx * 4 * hidden_dim + gate];
                    grad_w_ih[input_idx * 4 * hidden_dim + gate] +=
                        cache.inputs[step * input_dim + input_idx] * gate_grad[gate];
                }
                grad_input[step * input_dim + input_idx] = acc;
            }
            let mut next_h = vec![0.0f32; hidden_dim];
            for hidden_idx in 0..hidden_dim {
                let mut acc = 0.0f32;
                for gate in 0..4 * hidden_dim {
                    acc += gate_grad[gate] * weight_hh.data()[hidden_idx * 4 * hidden_dim + gate];
                    grad_w_hh[hidden_idx * 4 * hidden_dim + gate] +=
                        prev_hidden[hidden_idx] * gate_grad[gate];
                }
                next_h[hidden_idx] = acc;
            }
            grad_h_next = next_h;
        }
        let grad_w_ih = Tensor::from_vec(input_dim, 4 * hidden_dim, grad_w_ih)?;
        let grad_w_hh = Tensor::from_vec(hidden_dim, 4 * hidden_dim, grad_w_hh)?;
        let grad_b_ih = Tensor::from_vec(1, 4 * hidden_dim, grad_b_ih)?;
        let grad_b_hh = Tensor::from_vec(1, 4 * hidden_dim, grad_b_hh)?;
        self.weight_ih.accumulate(&grad_w_ih)?;
        self.weight_hh.accumulate(&grad_w_hh)?;
        self.bias_ih.accumulate(&grad_b_ih)?;
        self.bias_hh.accumulate(&grad_b_hh)?;
        Tensor::from_vec(timesteps, input_dim, grad_input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        visitor(&self.weight_ih)?;
        visitor(&self.weight_hh)?;
        visitor(&self.bias_ih)?;
        visitor(&self.bias_hh)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        visitor(&mut self.weight_ih)?;
        visitor(&mut self.weight_hh)?;
        visitor(&mut self.bias_ih)?;
        visitor(&mut self.bias_hh)
    }
}

fn sample_tensor(batch: &Tensor, row: usize, timesteps: usize, features: usize) -> TensorResult<Tensor> {
    let cols = batch.shape().1;
    let slice = &batch.data()[row * cols..(row + 1) * cols];
    Tensor::from_vec(timesteps, features, slice.to_vec())
}

/// Encodes flattened `timesteps * features` rows into latent vectors.
///
/// Two stacked LSTMs compress the sequence; the final hidden state is
/// projected into the latent space with a rectified linear head.
#[derive(Debug)]
pub struct RecurrentEncoder {
    timesteps: usize,
    features: usize,
    lstm_wide: Lstm,
    lstm_narrow: Lstm,
    project: Linear,
    activation: Relu,
}

impl RecurrentEncoder {
    pub fn new(
        name: impl Into<String>,
        timesteps: usize,
        features: usize,
        latent_dim: usize,
    ) -> TensorResult<Self> {
        validate_positive(timesteps, "timesteps")?;
        validate_positive(features, "features")?;
        validate_positive(latent_dim, "latent_dim")?;
        let name = name.into();
        Ok(Self {
            timesteps,
            features,
            lstm_wide: Lstm::new(format!("{name}::lstm_wide"), features, 128)?,
            lstm_narrow: Lstm::new(format!("{name}::lstm_narrow"), 128, 64)?,
            project: Linear::new(format!("{name}::project"), 64, latent_dim)?,
            activation: Relu,
        })
    }

    fn expected_cols(&self) -> usize {
        self.timesteps * self.features
    }
}

impl Module for RecurrentEncoder {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.expected_cols() {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.expected_cols()),
            });
        }
        let latent_dim = self.project.output_dim();
        let mut out = Tensor::zeros(batch, latent_dim)?;
        let out_cols = out.shape().1;
        for b in 0..batch {
            let sample = sample_tensor(input, b, self.timesteps, self.features)?;
            self.lstm_wide.reset_state()?;
            self.lstm_narrow.reset_state()?;
            let wide = self.lstm_wide.forward(&sample)?;
            let narrow = self.lstm_narrow.forward(&wide)?;
            let last = Tensor::from_vec(1, 64, narrow.row(self.timesteps - 1)?.to_vec())?;
            let projected = self.project.forward(&last)?;
            let latent = self.activation.forward(&projected)?;
            out.data_mut()[b * out_cols..(b + 1) * out_cols].copy_from_slice(latent.data());
        }
        Ok(out)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.expected_cols() {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.expected_cols()),
            });
        }
        let latent_dim = self.project.output_dim();
        if grad_output.shape() != (batch, latent_dim) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (batch, latent_dim),
            });
        }
        let mut grad_input = Tensor::zeros(batch, cols)?;
        for b in 0..batch {
            // Re-run the sample forward so each LSTM cache covers this
            // unroll before stepping backwards through it.
            let sample = sample_tensor(input, b, self.timesteps, self.features)?;
            self.lstm_wide.reset_state()?;
            self.lstm_narrow.reset_state()?;
            let wide = self.lstm_wide.forward(&sample)?;
            let narrow = self.lstm_narrow.forward(&wide)?;
            let last = Tensor::from_vec(1, 64, narrow.row(self.timesteps - 1)?.to_vec())?;
            let projected = self.project.forward(&last)?;

            let grad_latent =
                Tensor::from_vec(1, latent_dim, grad_output.row(b)?.to_vec())?;
            let grad_projected = self.activation.backward(&projected, &grad_latent)?;
            let grad_last = self.project.backward(&last, &grad_projected)?;

            let mut grad_narrow = Tensor::zeros(self.timesteps, 64)?;
            let offset = (self.timesteps - 1) * 64;
            grad_narrow.data_mut()[offset..offset + 64].copy_from_slice(grad_last.data());

            let grad_wide = self.lstm_narrow.backward(&wide, &grad_narrow)?;
            let grad_sample = self.lstm_wide.backward(&sample, &grad_wide)?;
            grad_input.data_mut()[b * cols..(b + 1) * cols].copy_from_slice(grad_sample.data());
        }
        Ok(grad_input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        self.lstm_wide.visit_parameters(visitor)?;
        self.lstm_narrow.visit_parameters(visitor)?;
        self.project.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        self.lstm_wide.visit_parameters_mut(visitor)?;
        self.lstm_narrow.visit_parameters_mut(visitor)?;
        self.project.visit_parameters_mut(visitor)
    }
}

/// Expands latent vectors back into flattened `timesteps * features` rows.
///
/// The latent vector is repeated across the time axis, rolled through two
/// widening LSTMs, and projected per-frame back to the feature width.
#[derive(Debug)]
pub struct RecurrentDecoder {
    timesteps: usize,
    features: usize,
    latent_dim: usize,
    lstm_narrow: Lstm,
    lstm_wide: Lstm,
    project: Linear,
}

impl RecurrentDecoder {
    pub fn new(
        name: impl Into<String>,
        timesteps: usize,
        features: usize,
        latent_dim: usize,
    ) -> TensorResult<Self> {
        validate_positive(timesteps, "timesteps")?;
        validate_positive(features, "features")?;
        validate_positive(latent_dim, "latent_dim")?;
        let name = name.into();
        Ok(Self {
            timesteps,
            features,
            latent_dim,
            lstm_narrow: Lstm::new(format!("{name}::lstm_narrow"), latent_dim, 64)?,
            lstm_wide: Lstm::new(format!("{name}::lstm_wide"), 64, 128)?,
            project: Linear::new(format!("{name}::project"), 128, features)?,
        })
    }

    fn repeat_latent(&self, latent: &[f32]) -> TensorResult<Tensor> {
        let mut data = Vec::with_capacity(self.timesteps * self.latent_dim);
        for _ in 0..self.timesteps {
            data.extend_from_slice(latent);
        }
        Tensor::from_vec(self.timesteps, self.latent_dim, data)
    }
}

impl Module for RecurrentDecoder {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.latent_dim {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.latent_dim),
            });
        }
        let out_cols = self.timesteps * self.features;
        let mut out = Tensor::zeros(batch, out_cols)?;
        for b in 0..batch {
            let repeated = self.repeat_latent(input.row(b)?)?;
            self.lstm_narrow.reset_state()?;
            self.lstm_wide.reset_state()?;
            let narrow = self.lstm_narrow.forward(&repeated)?;
            let wide = self.lstm_wide.forward(&narrow)?;
            let frames = self.project.forward(&wide)?;
            out.data_mut()[b * out_cols..(b + 1) * out_cols].copy_from_slice(frames.data());
        }
        Ok(out)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.latent_dim {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.latent_dim),
            });
        }
        let out_cols = self.timesteps * self.features;
        if grad_output.shape() != (batch, out_cols) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (batch, out_cols),
            });
        }
        let mut grad_input = Tensor::zeros(batch, self.latent_dim)?;
        for b in 0..batch {
            let repeated = self.repeat_latent(input.row(b)?)?;
            self.lstm_narrow.reset_state()?;
            self.lstm_wide.reset_state()?;
            let narrow = self.lstm_narrow.forward(&repeated)?;
            let wide = self.lstm_wide.forward(&narrow)?;

            let grad_frames = Tensor::from_vec(
                self.timesteps,
                self.features,
                grad_output.row(b)?.to_vec(),
            )?;
            let grad_wide = self.project.backward(&wide, &grad_frames)?;
            let grad_narrow = self.lstm_wide.backward(&narrow, &grad_wide)?;
            let grad_repeated = self.lstm_narrow.backward(&repeated, &grad_narrow)?;

            // The repeat fans the latent into every timestep, so its
            // gradient is the sum over the time axis.
            let summed = grad_repeated.sum_axis0();
            grad_input.data_mut()[b * self.latent_dim..(b + 1) * self.latent_dim]
                .copy_from_slice(&summed);
        }
        Ok(grad_input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        self.lstm_narrow.visit_parameters(visitor)?;
        self.lstm_wide.visit_parameters(visitor)?;
        self.project.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        self.lstm_narrow.visit_parameters_mut(visitor)?;
        self.lstm_wide.visit_parameters_mut(visitor)?;
        self.project.visit_parameters_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lstm_forward_produces_hidden_sequence() {
        let lstm = Lstm::new("lstm", 2, 3).unwrap();
        let input = Tensor::from_vec(4, 2, vec![0.1, 0.2, -0.3, 0.4, 0.5, -0.6, 0.7, 0.8]).unwrap();
        let output = lstm.forward(&input).unwrap();
        assert_eq!(output.shape(), (4, 3));
        for value in output.data() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn lstm_backward_accumulates_gradients() {
        let mut lstm = Lstm::new("lstm", 3, 2).unwrap();
        let input =
            Tensor::from_vec(3, 3, vec![0.2, -0.1, 0.3, 0.4, -0.5, 0.6, -0.2, 0.1, 0.7]).unwrap();
        let grad_out = Tensor::from_vec(3, 2, vec![0.1, -0.2, 0.3, 0.2, -0.4, 0.5]).unwrap();
        let _ = lstm.forward(&input).unwrap();
        let grad_input = lstm.backward(&input, &grad_out).unwrap();
        assert_eq!(grad_input.shape(), (3, 3));
        assert!(lstm.weight_ih.gradient().is_some());
        assert!(lstm.bias_hh.gradient().is_some());
    }

    #[test]
    fn encoder_emits_one_latent_per_row() {
        let encoder = RecurrentEncoder::new("enc", 5, 4, 8).unwrap();
        let input = Tensor::from_fn(3, 20, |r, c| ((r + c) % 7) as f32 * 0.1).unwrap();
        let latent = encoder.forward(&input).unwrap();
        assert_eq!(latent.shape(), (3, 8));
        for value in latent.data() {
            assert!(*value >= 0.0);
        }
    }

    #[test]
    fn decoder_restores_flattened_sequence_shape() {
        let decoder = RecurrentDecoder::new("dec", 5, 4, 8).unwrap();
        let latent = Tensor::from_fn(2, 8, |_, c| 0.1 * c as f32).unwrap();
        let frames = decoder.forward(&latent).unwrap();
        assert_eq!(frames.shape(), (2, 20));
    }

    #[test]
    fn encoder_decoder_backward_round_trip() {
        let mut encoder = RecurrentEncoder::new("enc", 3, 2, 4).unwrap();
        let mut decoder = RecurrentDecoder::new("dec", 3, 2, 4).unwrap();
        let input = Tensor::from_fn(2, 6, |r, c| ((r * 3 + c) % 5) as f32 * 0.2).unwrap();
        let latent = encoder.forward(&input).unwrap();
        let restored = decoder.forward(&latent).unwrap();
        assert_eq!(restored.shape(), input.shape());
        let grad = restored.scale(0.1).unwrap();
        let grad_latent = decoder.backward(&latent, &grad).unwrap();
        assert_eq!(grad_latent.shape(), latent.shape());
        let grad_input = encoder.backward(&input, &grad_latent).unwrap();
        assert_eq!(grad_input.shape(), input.shape());
    }
}
