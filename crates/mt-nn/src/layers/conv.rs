// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Planar convolution layers operating on channel-major flattened rows.
//!
//! A batch tensor holds one sample per row laid out as `channels * height *
//! width`; the layers carry the logical spatial extent so the flat layout can
//! be unpacked on demand.

use crate::layers::{init_weight, validate_positive};
use crate::module::{Module, Parameter};
use mt_tensor::{Tensor, TensorError, TensorResult};
use std::cell::RefCell;

/// Two-dimensional convolution with explicit stride and padding controls.
#[derive(Debug)]
pub struct Conv2d {
    weight: Parameter,
    bias: Parameter,
    in_channels: usize,
    out_channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    input_hw: (usize, usize),
}

impl Conv2d {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        input_hw: (usize, usize),
    ) -> TensorResult<Self> {
        validate_positive(in_channels, "in_channels")?;
        validate_positive(out_channels, "out_channels")?;
        validate_positive(kernel.0, "kernel_h")?;
        validate_positive(kernel.1, "kernel_w")?;
        validate_positive(stride.0, "stride_h")?;
        validate_positive(stride.1, "stride_w")?;
        validate_positive(input_hw.0, "input_height")?;
        validate_positive(input_hw.1, "input_width")?;
        let name = name.into();
        let span = in_channels * kernel.0 * kernel.1;
        let weight = init_weight(out_channels, span, span)?;
        let bias = Tensor::zeros(1, out_channels)?;
        let conv = Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            input_hw,
        };
        // Validate the configuration by computing the output size once.
        conv.output_hw()?;
        Ok(conv)
    }

    /// Returns the spatial extent of the produced feature maps.
    pub fn output_hw(&self) -> TensorResult<(usize, usize)> {
        let (h, w) = self.input_hw;
        let (kh, kw) = self.kernel;
        let (ph, pw) = self.padding;
        let (sh, sw) = self.stride;
        if h + 2 * ph < kh || w + 2 * pw < kw {
            return Err(TensorError::InvalidDimensions {
                rows: h + 2 * ph,
                cols: kh.max(kw),
            });
        }
        Ok(((h + 2 * ph - kh) / sh + 1, (w + 2 * pw - kw) / sw + 1))
    }

    fn expected_cols(&self) -> usize {
        self.in_channels * self.input_hw.0 * self.input_hw.1
    }

    fn im2col(&self, input: &Tensor, batch: usize, oh: usize, ow: usize) -> TensorResult<Tensor> {
        let span = self.in_channels * self.kernel.0 * self.kernel.1;
        let mut columns = Tensor::zeros(batch * oh * ow, span)?;
        let cols = input.shape().1;
        let (h, w) = self.input_hw;
        let pad_h = self.padding.0 as isize;
        let pad_w = self.padding.1 as isize;
        {
            let input_data = input.data();
            let column_data = columns.data_mut();
            for b in 0..batch {
                let row = &input_data[b * cols..(b + 1) * cols];
                for oh_idx in 0..oh {
                    for ow_idx in 0..ow {
                        let offset = (b * oh * ow + oh_idx * ow + ow_idx) * span;
                        let mut col_idx = 0;
                        for ic in 0..self.in_channels {
                            let channel_offset = ic * h * w;
                            for kh in 0..self.kernel.0 {
                                for kw in 0..self.kernel.1 {
                                    let idx_h = (oh_idx * self.stride.0 + kh) as isize - pad_h;
                                    let idx_w = (ow_idx * self.stride.1 + kw) as isize - pad_w;
                                    column_data[offset + col_idx] = if idx_h < 0
                                        || idx_w < 0
                                        || idx_h >= h as isize
                                        || idx_w >= w as isize
                                    {
                                        0.0
                                    } else {
                                        row[channel_offset + idx_h as usize * w + idx_w as usize]
                                    };
                                    col_idx += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(columns)
    }

    fn col2im(&self, cols: &Tensor, batch: usize, oh: usize, ow: usize) -> TensorResult<Tensor> {
        let span = self.in_channels * self.kernel.0 * self.kernel.1;
        if cols.shape() != (batch * oh * ow, span) {
            return Err(TensorError::ShapeMismatch {
                left: cols.shape(),
                right: (batch * oh * ow, span),
            });
        }
        let mut output = Tensor::zeros(batch, self.expected_cols())?;
        let (h, w) = self.input_hw;
        let pad_h = self.padding.0 as isize;
        let pad_w = self.padding.1 as isize;
        let output_cols = output.shape().1;
        {
            let cols_data = cols.data();
            let output_data = output.data_mut();
            for b in 0..batch {
                let out_row = &mut output_data[b * output_cols..(b + 1) * output_cols];
                for oh_idx in 0..oh {
                    for ow_idx in 0..ow {
                        let column_row = &cols_data
                            [(b * oh * ow + oh_idx * ow + ow_idx) * span..][..span];
                        let mut col_idx = 0;
                        for ic in 0..self.in_channels {
                            let channel_offset = ic * h * w;
                            for kh in 0..self.kernel.0 {
                                for kw in 0..self.kernel.1 {
                                    let idx_h = (oh_idx * self.stride.0 + kh) as isize - pad_h;
                                    let idx_w = (ow_idx * self.stride.1 + kw) as isize - pad_w;
                                    if idx_h >= 0
                                        && idx_w >= 0
                                        && idx_h < h as isize
                                        && idx_w < w as isize
                                    {
                                        let index = channel_offset
                                            + idx_h as usize * w
                                            + idx_w as usize;
                                        out_row[index] += column_row[col_idx];
                                    }
                                    col_idx += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(output)
    }

    fn grad_output_to_matrix(
        &self,
        grad_output: &Tensor,
        batch: usize,
        oh: usize,
        ow: usize,
    ) -> TensorResult<Tensor> {
        let mut matrix = Tensor::zeros(batch * oh * ow, self.out_channels)?;
        let grad_cols = grad_output.shape().1;
        let spatial = oh * ow;
        {
            let grad_data = grad_output.data();
            let matrix_data = matrix.data_mut();
            for b in 0..batch {
                let grad_row = &grad_data[b * grad_cols..(b + 1) * grad_cols];
                for spatial_idx in 0..spatial {
                    let offset = (b * spatial + spatial_idx) * self.out_channels;
                    for oc in 0..self.out_channels {
                        matrix_data[offset + oc] = grad_row[oc * spatial + spatial_idx];
                    }
                }
            }
        }
        Ok(matrix)
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.expected_cols() {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.expected_cols()),
            });
        }
        let (oh, ow) = self.output_hw()?;
        let patches = self.im2col(input, batch, oh, ow)?;
        // (batch*oh*ow, span) x (span, out_channels)
        let products = patches.matmul(&self.weight.value().transpose())?;
        let spatial = oh * ow;
        let mut out = Tensor::zeros(batch, self.out_channels * spatial)?;
        let out_cols = out.shape().1;
        let bias = self.bias.value().data().to_vec();
        {
            let product_data = products.data();
            let out_data = out.data_mut();
            for b in 0..batch {
                let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
                for spatial_idx in 0..spatial {
                    let offset = (b * spatial + spatial_idx) * self.out_channels;
                    for oc in 0..self.out_channels {
                        out_row[oc * spatial + spatial_idx] =
                            product_data[offset + oc] + bias[oc];
                    }
                }
            }
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
        let (oh, ow) = self.output_hw()?;
        if grad_output.shape() != (batch, self.out_channels * oh * ow) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (batch, self.out_channels * oh * ow),
            });
        }
        let patches = self.im2col(input, batch, oh, ow)?;
        let grad_matrix = self.grad_output_to_matrix(grad_output, batch, oh, ow)?;

        let grad_weight = grad_matrix
            .transpose()
            .matmul(&patches)?
            .scale(1.0 / batch as f32)?;
        self.weight.accumulate(&grad_weight)?;

        let bias_sums = grad_matrix.sum_axis0();
        let grad_bias =
            Tensor::from_vec(1, self.out_channels, bias_sums)?.scale(1.0 / batch as f32)?;
        self.bias.accumulate(&grad_bias)?;

        let grad_patches = grad_matrix.matmul(self.weight.value())?;
        self.col2im(&grad_patches, batch, oh, ow)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)?;
        Ok(())
    }
}

/// Max pooling over 2D feature maps with an argmax cache for the backward
/// pass.
#[derive(Debug)]
pub struct MaxPool2d {
    channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    input_hw: (usize, usize),
    last_indices: RefCell<Vec<usize>>,
}

impl MaxPool2d {
    pub fn new(
        channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        input_hw: (usize, usize),
    ) -> TensorResult<Self> {
        validate_positive(channels, "channels")?;
        validate_positive(kernel.0, "kernel_h")?;
        validate_positive(kernel.1, "kernel_w")?;
        validate_positive(stride.0, "stride_h")?;
        validate_positive(stride.1, "stride_w")?;
        validate_positive(input_hw.0, "input_height")?;
        validate_positive(input_hw.1, "input_width")?;
        Ok(Self {
            channels,
            kernel,
            stride,
            input_hw,
            last_indices: RefCell::new(Vec::new()),
        })
    }

    /// Returns the spatial extent of the pooled feature maps.
    pub fn output_hw(&self) -> TensorResult<(usize, usize)> {
        let (h, w) = self.input_hw;
        let (kh, kw) = self.kernel;
        let (sh, sw) = self.stride;
        if h < kh || w < kw {
            return Err(TensorError::InvalidDimensions {
                rows: h,
                cols: kh.max(kw),
            });
        }
        Ok(((h - kh) / sh + 1, (w - kw) / sw + 1))
    }
}

impl Module for MaxPool2d {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        let expected = self.channels * self.input_hw.0 * self.input_hw.1;
        if cols != expected {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, expected),
            });
        }
        let (oh, ow) = self.output_hw()?;
        let mut out = Tensor::zeros(batch, self.channels * oh * ow)?;
        let mut indices = self.last_indices.borrow_mut();
        indices.clear();
        indices.resize(batch * self.channels * oh * ow, 0);
        let (h, w) = self.input_hw;
        let out_cols = out.shape().1;
        {
            let out_data = out.data_mut();
            for b in 0..batch {
                let row = &input.data()[b * cols..(b + 1) * cols];
                let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
                for c in 0..self.channels {
                    let channel_offset = c * h * w;
                    for oh_idx in 0..oh {
                        for ow_idx in 0..ow {
                            let mut best = f32::MIN;
                            let mut best_idx = channel_offset;
                            for kh in 0..self.kernel.0 {
                                for kw in 0..self.kernel.1 {
                                    let idx_h = oh_idx * self.stride.0 + kh;
                                    let idx_w = ow_idx * self.stride.1 + kw;
                                    if idx_h >= h || idx_w >= w {
                                        continue;
                                    }
                                    let index = channel_offset + idx_h * w + idx_w;
                                    if row[index] > best {
                                        best = row[index];
                                        best_idx = index;
                                    }
                                }
                            }
                            let out_index = c * (oh * ow) + oh_idx * ow + ow_idx;
                            out_row[out_index] = best;
                            indices[b * self.channels * oh * ow + out_index] = best_idx;
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn backward(&mut self, _input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = grad_output.shape();
        let (oh, ow) = self.output_hw()?;
        if cols != self.channels * oh * ow {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.channels * oh * ow),
            });
        }
        let mut grad_input =
            Tensor::zeros(batch, self.channels * self.input_hw.0 * self.input_hw.1)?;
        let indices = self.last_indices.borrow();
        if indices.len() != batch * cols {
            return Err(TensorError::InvalidValue {
                label: "maxpool_cache_missing",
            });
        }
        let grad_input_cols = grad_input.shape().1;
        {
            let grad_input_data = grad_input.data_mut();
            for b in 0..batch {
                let grad_row = &grad_output.data()[b * cols..(b + 1) * cols];
                let grad_in_row =
                    &mut grad_input_data[b * grad_input_cols..(b + 1) * grad_input_cols];
                for idx in 0..cols {
                    grad_in_row[indices[b * cols + idx]] += grad_row[idx];
                }
            }
        }
        Ok(grad_input)
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        Ok(())
    }
}

/// Transposed convolution used by the decoder halves to undo a pooling stage.
///
/// With kernel == stride the output extent is an exact multiple of the input
/// extent, so two stacked stages mirror the encoder's two pooling stages and
/// the reconstruction matches the declared input shape bit-for-bit.
#[derive(Debug)]
pub struct ConvTranspose2d {
    weight: Parameter,
    bias: Parameter,
    in_channels: usize,
    out_channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    input_hw: (usize, usize),
}

impl ConvTranspose2d {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        input_hw: (usize, usize),
    ) -> TensorResult<Self> {
        validate_positive(in_channels, "in_channels")?;
        validate_positive(out_channels, "out_channels")?;
        validate_positive(kernel.0, "kernel_h")?;
        validate_positive(kernel.1, "kernel_w")?;
        validate_positive(stride.0, "stride_h")?;
        validate_positive(stride.1, "stride_w")?;
        validate_positive(input_hw.0, "input_height")?;
        validate_positive(input_hw.1, "input_width")?;
        let name = name.into();
        let span = out_channels * kernel.0 * kernel.1;
        let weight = init_weight(in_channels, span, in_channels * kernel.0 * kernel.1)?;
        let bias = Tensor::zeros(1, out_channels)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
            in_channels,
            out_channels,
            kernel,
            stride,
            input_hw,
        })
    }

    /// Returns the upsampled spatial extent.
    pub fn output_hw(&self) -> (usize, usize) {
        let (h, w) = self.input_hw;
        (
            (h - 1) * self.stride.0 + self.kernel.0,
            (w - 1) * self.stride.1 + self.kernel.1,
        )
    }

    fn expected_cols(&self) -> usize {
        self.in_channels * self.input_hw.0 * self.input_hw.1
    }

    #[inline]
    fn weight_index(&self, ic: usize, oc: usize, kh: usize, kw: usize) -> usize {
        let span = self.out_channels * self.kernel.0 * self.kernel.1;
        ic * span + oc * self.kernel.0 * self.kernel.1 + kh * self.kernel.1 + kw
    }
}

impl Module for ConvTranspose2d {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.expected_cols() {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.expected_cols()),
            });
        }
        let (h, w) = self.input_hw;
        let (out_h, out_w) = self.output_hw();
        let mut out = Tensor::zeros(batch, self.out_channels * out_h * out_w)?;
        let out_cols = out.shape().1;
        let weight = self.weight.value().data().to_vec();
        let bias = self.bias.value().data().to_vec();
        {
            let out_data = out.data_mut();
            for b in 0..batch {
                let row = &input.data()[b * cols..(b + 1) * cols];
                let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
                for oc in 0..self.out_channels {
                    let channel = &mut out_row[oc * out_h * out_w..(oc + 1) * out_h * out_w];
                    for value in channel.iter_mut() {
                        *value = bias[oc];
                    }
                }
                for ic in 0..self.in_channels {
                    let channel_offset = ic * h * w;
                    for ih in 0..h {
                        for iw in 0..w {
                            let value = row[channel_offset + ih * w + iw];
                            if value == 0.0 {
                                continue;
                            }
                            for oc in 0..self.out_channels {
                                let out_offset = oc * out_h * out_w;
                                for kh in 0..self.kernel.0 {
                                    let oh_idx = ih * self.stride.0 + kh;
                                    for kw in 0..self.kernel.1 {
                                        let ow_idx = iw * self.stride.1 + kw;
                                        out_row[out_offset + oh_idx * out_w + ow_idx] +=
                                            value * weight[self.weight_index(ic, oc, kh, kw)];
                                    }
                                }
                            }
                        }
                    }
                }
            }
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
        let (h, w) = self.input_hw;
        let (out_h, out_w) = self.output_hw();
        if grad_output.shape() != (batch, self.out_channels * out_h * out_w) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (batch, self.out_channels * out_h * out_w),
            });
        }
        let weight = self.weight.value().data().to_vec();
        let span = self.out_channels * self.kernel.0 * self.kernel.1;
        let mut grad_weight = vec![0.0f32; self.in_channels * span];
        let mut grad_bias = vec![0.0f32; self.out_channels];
        let mut grad_input = Tensor::zeros(batch, cols)?;
        let grad_cols = grad_output.shape().1;
        {
            let grad_input_data = grad_input.data_mut();
            for b in 0..batch {
                let row = &input.data()[b * cols..(b + 1) * cols];
                let grad_row = &grad_output.data()[b * grad_cols..(b + 1) * grad_cols];
                for oc in 0..self.out_channels {
                    let channel = &grad_row[oc * out_h * out_w..(oc + 1) * out_h * out_w];
                    grad_bias[oc] += channel.iter().sum::<f32>();
                }
                let grad_in_row = &mut grad_input_data[b * cols..(b + 1) * cols];
                for ic in 0..self.in_channels {
                    let channel_offset = ic * h * w;
                    for ih in 0..h {
                        for iw in 0..w {
                            let input_value = row[channel_offset + ih * w + iw];
                            let mut acc = 0.0f32;
                            for oc in 0..self.out_channels {
                                let out_offset = oc * out_h * out_w;
                                for kh in 0..self.kernel.0 {
                                    let oh_idx = ih * self.stride.0 + kh;
                                    for kw in 0..self.kernel.1 {
                                        let ow_idx = iw * self.stride.1 + kw;
                                        let grad = grad_row[out_offset + oh_idx * out_w + ow_idx];
                                        acc += grad * weight[self.weight_index(ic, oc, kh, kw)];
                                        grad_weight[self.weight_index(ic, oc, kh, kw)] +=
                                            grad * input_value;
                                    }
                                }
                            }
                            grad_in_row[channel_offset + ih * w + iw] = acc;
                        }
                    }
                }
            }
        }
        let grad_weight = Tensor::from_vec(self.in_channels, span, grad_weight)?
            .scale(1.0 / batch as f32)?;
        self.weight.accumulate(&grad_weight)?;
        let grad_bias =
            Tensor::from_vec(1, self.out_channels, grad_bias)?.scale(1.0 / batch as f32)?;
        self.bias.accumulate(&grad_bias)?;
        Ok(grad_input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> TensorResult<()>,
    ) -> TensorResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv2d_same_padding_preserves_extent() {
        let conv = Conv2d::new("c", 3, 8, (3, 3), (1, 1), (1, 1), (8, 8)).unwrap();
        assert_eq!(conv.output_hw().unwrap(), (8, 8));
        let input = Tensor::from_fn(2, 3 * 8 * 8, |_, c| (c % 7) as f32 * 0.1).unwrap();
        let out = conv.forward(&input).unwrap();
        assert_eq!(out.shape(), (2, 8 * 8 * 8));
    }

    #[test]
    fn conv2d_backward_returns_input_shaped_gradient() {
        let mut conv = Conv2d::new("c", 2, 4, (3, 3), (1, 1), (1, 1), (6, 6)).unwrap();
        let input = Tensor::from_fn(1, 2 * 6 * 6, |_, c| (c as f32).sin()).unwrap();
        let out = conv.forward(&input).unwrap();
        let grad = out.scale(0.01).unwrap();
        let grad_input = conv.backward(&input, &grad).unwrap();
        assert_eq!(grad_input.shape(), input.shape());
        assert!(conv.weight.gradient().is_some());
    }

    #[test]
    fn maxpool_halves_spatial_extent() {
        let pool = MaxPool2d::new(2, (2, 2), (2, 2), (4, 4)).unwrap();
        let input = Tensor::from_fn(1, 2 * 4 * 4, |_, c| c as f32).unwrap();
        let out = pool.forward(&input).unwrap();
        assert_eq!(out.shape(), (1, 2 * 2 * 2));
        // Each pooled value is the max of its window.
        assert_eq!(out.data()[0], 5.0);
    }

    #[test]
    fn maxpool_routes_gradient_to_argmax() {
        let mut pool = MaxPool2d::new(1, (2, 2), (2, 2), (2, 2)).unwrap();
        let input = Tensor::from_vec(1, 4, vec![0.1, 0.9, 0.3, 0.2]).unwrap();
        let _ = pool.forward(&input).unwrap();
        let grad = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        let grad_input = pool.backward(&input, &grad).unwrap();
        assert_eq!(grad_input.data(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn conv_transpose_doubles_extent() {
        let deconv = ConvTranspose2d::new("d", 4, 2, (2, 2), (2, 2), (3, 3)).unwrap();
        assert_eq!(deconv.output_hw(), (6, 6));
        let input = Tensor::from_fn(2, 4 * 3 * 3, |_, c| (c % 5) as f32 * 0.2).unwrap();
        let out = deconv.forward(&input).unwrap();
        assert_eq!(out.shape(), (2, 2 * 6 * 6));
    }

    #[test]
    fn conv_transpose_backward_accumulates() {
        let mut deconv = ConvTranspose2d::new("d", 2, 1, (2, 2), (2, 2), (2, 2)).unwrap();
        let input = Tensor::from_fn(1, 2 * 2 * 2, |_, c| 0.1 * (c + 1) as f32).unwrap();
        let out = deconv.forward(&input).unwrap();
        let grad = out.scale(0.5).unwrap();
        let grad_input = deconv.backward(&input, &grad).unwrap();
        assert_eq!(grad_input.shape(), input.shape());
        assert!(deconv.weight.gradient().is_some());
        assert!(deconv.bias.gradient().is_some());
    }

    #[test]
    fn pool_then_transpose_round_trips_extent() {
        let pool = MaxPool2d::new(1, (2, 2), (2, 2), (4, 4)).unwrap();
        let deconv = ConvTranspose2d::new("d", 1, 1, (2, 2), (2, 2), (2, 2)).unwrap();
        let input = Tensor::from_fn(1, 16, |_, c| c as f32 * 0.05).unwrap();
        let pooled = pool.forward(&input).unwrap();
        let restored = deconv.forward(&pooled).unwrap();
        assert_eq!(restored.shape(), input.shape());
    }
}
