// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Volumetric convolution layers for voxel-grid inputs.
//!
//! Rows are flattened channel-major as `channels * depth * height * width`.
//! The layers mirror their planar counterparts with one extra spatial axis;
//! kernels, strides, and padding are cubic to keep the configuration surface
//! small.

use crate::layers::{init_weight, validate_positive};
use crate::module::{Module, Parameter};
use mt_tensor::{Tensor, TensorError, TensorResult};
use std::cell::RefCell;

/// Three-dimensional convolution with a cubic kernel.
#[derive(Debug)]
pub struct Conv3d {
    weight: Parameter,
    bias: Parameter,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    input_dhw: (usize, usize, usize),
}

impl Conv3d {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        input_dhw: (usize, usize, usize),
    ) -> TensorResult<Self> {
        validate_positive(in_channels, "in_channels")?;
        validate_positive(out_channels, "out_channels")?;
        validate_positive(kernel, "kernel")?;
        validate_positive(stride, "stride")?;
        validate_positive(input_dhw.0, "input_depth")?;
        validate_positive(input_dhw.1, "input_height")?;
        validate_positive(input_dhw.2, "input_width")?;
        let name = name.into();
        let span = in_channels * kernel * kernel * kernel;
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
            input_dhw,
        };
        conv.output_dhw()?;
        Ok(conv)
    }

    /// Returns the spatial extent of the produced feature volumes.
    pub fn output_dhw(&self) -> TensorResult<(usize, usize, usize)> {
        let (d, h, w) = self.input_dhw;
        let k = self.kernel;
        let p = self.padding;
        let s = self.stride;
        if d + 2 * p < k || h + 2 * p < k || w + 2 * p < k {
            return Err(TensorError::InvalidDimensions {
                rows: d.min(h).min(w) + 2 * p,
                cols: k,
            });
        }
        Ok((
            (d + 2 * p - k) / s + 1,
            (h + 2 * p - k) / s + 1,
            (w + 2 * p - k) / s + 1,
        ))
    }

    fn expected_cols(&self) -> usize {
        let (d, h, w) = self.input_dhw;
        self.in_channels * d * h * w
    }

    fn im2col(
        &self,
        input: &Tensor,
        batch: usize,
        out_dhw: (usize, usize, usize),
    ) -> TensorResult<Tensor> {
        let k = self.kernel;
        let span = self.in_channels * k * k * k;
        let (od, oh, ow) = out_dhw;
        let spatial = od * oh * ow;
        let mut columns = Tensor::zeros(batch * spatial, span)?;
        let cols = input.shape().1;
        let (d, h, w) = self.input_dhw;
        let pad = self.padding as isize;
        {
            let input_data = input.data();
            let column_data = columns.data_mut();
            for b in 0..batch {
                let row = &input_data[b * cols..(b + 1) * cols];
                for od_idx in 0..od {
                    for oh_idx in 0..oh {
                        for ow_idx in 0..ow {
                            let spatial_idx = od_idx * oh * ow + oh_idx * ow + ow_idx;
                            let offset = (b * spatial + spatial_idx) * span;
                            let mut col_idx = 0;
                            for ic in 0..self.in_channels {
                                let channel_offset = ic * d * h * w;
                                for kd in 0..k {
                                    let idx_d = (od_idx * self.stride + kd) as isize - pad;
                                    for kh in 0..k {
                                        let idx_h = (oh_idx * self.stride + kh) as isize - pad;
                                        for kw in 0..k {
                                            let idx_w =
                                                (ow_idx * self.stride + kw) as isize - pad;
                                            column_data[offset + col_idx] = if idx_d < 0
                                                || idx_h < 0
                                                || idx_w < 0
                                                || idx_d >= d as isize
                                                || idx_h >= h as isize
                                                || idx_w >= w as isize
                                            {
                                                0.0
                                            } else {
                                                row[channel_offset
                                                    + idx_d as usize * h * w
                                                    + idx_h as usize * w
                                                    + idx_w as usize]
                                            };
                                            col_idx += 1;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(columns)
    }

    fn col2im(
        &self,
        cols: &Tensor,
        batch: usize,
        out_dhw: (usize, usize, usize),
    ) -> TensorResult<Tensor> {
        let k = self.kernel;
        let span = self.in_channels * k * k * k;
        let (od, oh, ow) = out_dhw;
        let spatial = od * oh * ow;
        if cols.shape() != (batch * spatial, span) {
            return Err(TensorError::ShapeMismatch {
                left: cols.shape(),
                right: (batch * spatial, span),
            });
        }
        let mut output = Tensor::zeros(batch, self.expected_cols())?;
        let (d, h, w) = self.input_dhw;
        let pad = self.padding as isize;
        let output_cols = output.shape().1;
        {
            let cols_data = cols.data();
            let output_data = output.data_mut();
            for b in 0..batch {
                let out_row = &mut output_data[b * output_cols..(b + 1) * output_cols];
                for od_idx in 0..od {
                    for oh_idx in 0..oh {
                        for ow_idx in 0..ow {
                            let spatial_idx = od_idx * oh * ow + oh_idx * ow + ow_idx;
                            let column_row =
                                &cols_data[(b * spatial + spatial_idx) * span..][..span];
                            let mut col_idx = 0;
                            for ic in 0..self.in_channels {
                                let channel_offset = ic * d * h * w;
                                for kd in 0..k {
                                    let idx_d = (od_idx * self.stride + kd) as isize - pad;
                                    for kh in 0..k {
                                        let idx_h = (oh_idx * self.stride + kh) as isize - pad;
                                        for kw in 0..k {
                                            let idx_w =
                                                (ow_idx * self.stride + kw) as isize - pad;
                                            if idx_d >= 0
                                                && idx_h >= 0
                                                && idx_w >= 0
                                                && idx_d < d as isize
                                                && idx_h < h as isize
                                                && idx_w < w as isize
                                            {
                                                out_row[channel_offset
                                                    + idx_d as usize * h * w
                                                    + idx_h as usize * w
                                                    + idx_w as usize] += column_row[col_idx];
                                            }
                                            col_idx += 1;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(output)
    }
}

impl Module for Conv3d {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.expected_cols() {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.expected_cols()),
            });
        }
        let out_dhw = self.output_dhw()?;
        let (od, oh, ow) = out_dhw;
        let spatial = od * oh * ow;
        let patches = self.im2col(input, batch, out_dhw)?;
        let products = patches.matmul(&self.weight.value().transpose())?;
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
        let out_dhw = self.output_dhw()?;
        let (od, oh, ow) = out_dhw;
        let spatial = od * oh * ow;
        if grad_output.shape() != (batch, self.out_channels * spatial) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (batch, self.out_channels * spatial),
            });
        }
        let patches = self.im2col(input, batch, out_dhw)?;

        // Rearrange the channel-major gradient into (batch*spatial, out_channels).
        let mut grad_matrix = Tensor::zeros(batch * spatial, self.out_channels)?;
        let grad_cols = grad_output.shape().1;
        {
            let grad_data = grad_output.data();
            let matrix_data = grad_matrix.data_mut();
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
        self.col2im(&grad_patches, batch, out_dhw)
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

/// Cubic max pooling with an argmax cache.
#[derive(Debug)]
pub struct MaxPool3d {
    channels: usize,
    kernel: usize,
    stride: usize,
    input_dhw: (usize, usize, usize),
    last_indices: RefCell<Vec<usize>>,
}

impl MaxPool3d {
    pub fn new(
        channels: usize,
        kernel: usize,
        stride: usize,
        input_dhw: (usize, usize, usize),
    ) -> TensorResult<Self> {
        validate_positive(channels, "channels")?;
        validate_positive(kernel, "kernel")?;
        validate_positive(stride, "stride")?;
        validate_positive(input_dhw.0, "input_depth")?;
        validate_positive(input_dhw.1, "input_height")?;
        validate_positive(input_dhw.2, "input_width")?;
        Ok(Self {
            channels,
            kernel,
            stride,
            input_dhw,
            last_indices: RefCell::new(Vec::new()),
        })
    }

    pub fn output_dhw(&self) -> TensorResult<(usize, usize, usize)> {
        let (d, h, w) = self.input_dhw;
        let k = self.kernel;
        if d < k || h < k || w < k {
            return Err(TensorError::InvalidDimensions {
                rows: d.min(h).min(w),
                cols: k,
            });
        }
        Ok((
            (d - k) / self.stride + 1,
            (h - k) / self.stride + 1,
            (w - k) / self.stride + 1,
        ))
    }
}

impl Module for MaxPool3d {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        let (d, h, w) = self.input_dhw;
        let expected = self.channels * d * h * w;
        if cols != expected {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, expected),
            });
        }
        let (od, oh, ow) = self.output_dhw()?;
        let spatial = od * oh * ow;
        let mut out = Tensor::zeros(batch, self.channels * spatial)?;
        let mut indices = self.last_indices.borrow_mut();
        indices.clear();
        indices.resize(batch * self.channels * spatial, 0);
        let out_cols = out.shape().1;
        {
            let out_data = out.data_mut();
            for b in 0..batch {
                let row = &input.data()[b * cols..(b + 1) * cols];
                let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
                for c in 0..self.channels {
                    let channel_offset = c * d * h * w;
                    for od_idx in 0..od {
                        for oh_idx in 0..oh {
                            for ow_idx in 0..ow {
                                let mut best = f32::MIN;
                                let mut best_idx = channel_offset;
                                for kd in 0..self.kernel {
                                    let idx_d = od_idx * self.stride + kd;
                                    if idx_d >= d {
                                        continue;
                                    }
                                    for kh in 0..self.kernel {
                                        let idx_h = oh_idx * self.stride + kh;
                                        if idx_h >= h {
                                            continue;
                                        }
                                        for kw in 0..self.kernel {
                                            let idx_w = ow_idx * self.stride + kw;
                                            if idx_w >= w {
                                                continue;
                                            }
                                            let index = channel_offset
                                                + idx_d * h * w
                                                + idx_h * w
                                                + idx_w;
                                            if row[index] > best {
                                                best = row[index];
                                                best_idx = index;
                                            }
                                        }
                                    }
                                }
                                let out_index =
                                    c * spatial + od_idx * oh * ow + oh_idx * ow + ow_idx;
                                out_row[out_index] = best;
                                indices[b * self.channels * spatial + out_index] = best_idx;
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn backward(&mut self, _input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = grad_output.shape();
        let (od, oh, ow) = self.output_dhw()?;
        if cols != self.channels * od * oh * ow {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.channels * od * oh * ow),
            });
        }
        let (d, h, w) = self.input_dhw;
        let mut grad_input = Tensor::zeros(batch, self.channels * d * h * w)?;
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

/// Transposed volumetric convolution; with kernel == stride the output
/// extent is an exact multiple of the input extent.
#[derive(Debug)]
pub struct ConvTranspose3d {
    weight: Parameter,
    bias: Parameter,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    input_dhw: (usize, usize, usize),
}

impl ConvTranspose3d {
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        input_dhw: (usize, usize, usize),
    ) -> TensorResult<Self> {
        validate_positive(in_channels, "in_channels")?;
        validate_positive(out_channels, "out_channels")?;
        validate_positive(kernel, "kernel")?;
        validate_positive(stride, "stride")?;
        validate_positive(input_dhw.0, "input_depth")?;
        validate_positive(input_dhw.1, "input_height")?;
        validate_positive(input_dhw.2, "input_width")?;
        let name = name.into();
        let span = out_channels * kernel * kernel * kernel;
        let weight = init_weight(in_channels, span, in_channels * kernel * kernel * kernel)?;
        let bias = Tensor::zeros(1, out_channels)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
            in_channels,
            out_channels,
            kernel,
            stride,
            input_dhw,
        })
    }

    pub fn output_dhw(&self) -> (usize, usize, usize) {
        let (d, h, w) = self.input_dhw;
        (
            (d - 1) * self.stride + self.kernel,
            (h - 1) * self.stride + self.kernel,
            (w - 1) * self.stride + self.kernel,
        )
    }

    fn expected_cols(&self) -> usize {
        let (d, h, w) = self.input_dhw;
        self.in_channels * d * h * w
    }

    #[inline]
    fn weight_index(&self, ic: usize, oc: usize, kd: usize, kh: usize, kw: usize) -> usize {
        let k = self.kernel;
        let span = self.out_channels * k * k * k;
        ic * span + oc * k * k * k + kd * k * k + kh * k + kw
    }
}

impl Module for ConvTranspose3d {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (batch, cols) = input.shape();
        if cols != self.expected_cols() {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.expected_cols()),
            });
        }
        let (d, h, w) = self.input_dhw;
        let (od, oh, ow) = self.output_dhw();
        let out_spatial = od * oh * ow;
        let mut out = Tensor::zeros(batch, self.out_channels * out_spatial)?;
        let out_cols = out.shape().1;
        let weight = self.weight.value().data().to_vec();
        let bias = self.bias.value().data().to_vec();
        {
            let out_data = out.data_mut();
            for b in 0..batch {
                let row = &input.data()[b * cols..(b + 1) * cols];
                let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
                for oc in 0..self.out_channels {
                    let channel = &mut out_row[oc * out_spatial..(oc + 1) * out_spatial];
                    for value in channel.iter_mut() {
                        *value = bias[oc];
                    }
                }
                for ic in 0..self.in_channels {
                    let channel_offset = ic * d * h * w;
                    for id in 0..d {
                        for ih in 0..h {
                            for iw in 0..w {
                                let value = row[channel_offset + id * h * w + ih * w + iw];
                                if value == 0.0 {
                                    continue;
                                }
                                for oc in 0..self.out_channels {
                                    let out_offset = oc * out_spatial;
                                    for kd in 0..self.kernel {
                                        let od_idx = id * self.stride + kd;
                                        for kh in 0..self.kernel {
                                            let oh_idx = ih * self.stride + kh;
                                            for kw in 0..self.kernel {
                                                let ow_idx = iw * self.stride + kw;
                                                out_row[out_offset
                                                    + od_idx * oh * ow
                                                    + oh_idx * ow
                                                    + ow_idx] += value
                                                    * weight[self
                                                        .weight_index(ic, oc, kd, kh, kw)];
                                            }
                                        }
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
        let (d, h, w) = self.input_dhw;
        let (od, oh, ow) = self.output_dhw();
        let out_spatial = od * oh * ow;
        if grad_output.shape() != (batch, self.out_channels * out_spatial) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (batch, self.out_channels * out_spatial),
            });
        }
        let weight = self.weight.value().data().to_vec();
        let k = self.kernel;
        let span = self.out_channels * k * k * k;
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
                    let channel = &grad_row[oc * out_spatial..(oc + 1) * out_spatial];
                    grad_bias[oc] += channel.iter().sum::<f32>();
                }
                let grad_in_row = &mut grad_input_data[b * cols..(b + 1) * cols];
                for ic in 0..self.in_channels {
                    let channel_offset = ic * d * h * w;
                    for id in 0..d {
                        for ih in 0..h {
                            for iw in 0..w {
                                let index = channel_offset + id * h * w + ih * w + iw;
                                let input_value = row[index];
                                let mut acc = 0.0f32;
                                for oc in 0..self.out_channels {
                                    let out_offset = oc * out_spatial;
                                    for kd in 0..k {
                                        let od_idx = id * self.stride + kd;
                                        for kh in 0..k {
                                            let oh_idx = ih * self.stride + kh;
                                            for kw in 0..k {
                                                let ow_idx = iw * self.stride + kw;
                                                let grad = grad_row[out_offset
                                                    + od_idx * oh * ow
                                                    + oh_idx * ow
                                                    + ow_idx];
                                                acc += grad
                                                    * weight[self
                                                        .weight_index(ic, oc, kd, kh, kw)];
                                                grad_weight[self
                                                    .weight_index(ic, oc, kd, kh, kw)] +=
                                                    grad * input_value;
                                            }
                                        }
                                    }
                                }
                                grad_in_row[index] = acc;
                            }
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
    fn conv3d_same_padding_preserves_extent() {
        let conv = Conv3d::new("c", 1, 4, 3, 1, 1, (4, 4, 4)).unwrap();
        assert_eq!(conv.output_dhw().unwrap(), (4, 4, 4));
        let input = Tensor::from_fn(2, 64, |_, c| (c % 5) as f32 * 0.1).unwrap();
        let out = conv.forward(&input).unwrap();
        assert_eq!(out.shape(), (2, 4 * 64));
    }

    #[test]
    fn conv3d_backward_returns_input_shaped_gradient() {
        let mut conv = Conv3d::new("c", 1, 2, 3, 1, 1, (4, 4, 4)).unwrap();
        let input = Tensor::from_fn(1, 64, |_, c| (c as f32 * 0.3).cos()).unwrap();
        let out = conv.forward(&input).unwrap();
        let grad = out.scale(0.01).unwrap();
        let grad_input = conv.backward(&input, &grad).unwrap();
        assert_eq!(grad_input.shape(), input.shape());
        assert!(conv.weight.gradient().is_some());
    }

    #[test]
    fn maxpool3d_halves_every_axis() {
        let pool = MaxPool3d::new(1, 2, 2, (4, 4, 4)).unwrap();
        let input = Tensor::from_fn(1, 64, |_, c| c as f32).unwrap();
        let out = pool.forward(&input).unwrap();
        assert_eq!(out.shape(), (1, 8));
        // Last element of each 2x2x2 window wins for a monotone ramp.
        assert_eq!(out.data()[0], 21.0);
    }

    #[test]
    fn conv_transpose3d_doubles_every_axis() {
        let deconv = ConvTranspose3d::new("d", 2, 1, 2, 2, (2, 2, 2)).unwrap();
        assert_eq!(deconv.output_dhw(), (4, 4, 4));
        let input = Tensor::from_fn(1, 16, |_, c| 0.1 * (c + 1) as f32).unwrap();
        let out = deconv.forward(&input).unwrap();
        assert_eq!(out.shape(), (1, 64));
        let grad = out.scale(0.5).unwrap();
        let mut deconv = deconv;
        let grad_input = deconv.backward(&input, &grad).unwrap();
        assert_eq!(grad_input.shape(), input.shape());
    }
}
