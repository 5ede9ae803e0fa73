// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

use crate::module::{Module, Parameter};
use mt_tensor::{Tensor, TensorError, TensorResult};

/// Lightweight ReLU activation. The layer is stateless and therefore does not
/// participate in parameter visits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relu;

impl Relu {
    /// Creates a new ReLU layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Relu {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (rows, cols) = input.shape();
        let data = input.data().iter().map(|v| v.max(0.0)).collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor> {
        if input.shape() != grad_output.shape() {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: grad_output.shape(),
            });
        }
        let (rows, cols) = input.shape();
        let data = input
            .data()
            .iter()
            .zip(grad_output.data().iter())
            .map(|(value, grad)| if *value > 0.0 { *grad } else { 0.0 })
            .collect();
        Tensor::from_vec(rows, cols, data)
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

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Logistic activation bounding every element into `(0, 1)`. Used as the
/// reconstruction head of every decoder since all modalities are normalized
/// into the unit interval.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sigmoid;

impl Sigmoid {
    /// Creates a new sigmoid layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Sigmoid {
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor> {
        let (rows, cols) = input.shape();
        let data = input.data().iter().map(|v| sigmoid(*v)).collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor> {
        if input.shape() != grad_output.shape() {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: grad_output.shape(),
            });
        }
        let (rows, cols) = input.shape();
        let data = input
            .data()
            .iter()
            .zip(grad_output.data().iter())
            .map(|(value, grad)| {
                let s = sigmoid(*value);
                grad * s * (1.0 - s)
            })
            .collect();
        Tensor::from_vec(rows, cols, data)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_forward_backward() {
        let relu = Relu::new();
        let input = Tensor::from_vec(1, 4, vec![-1.0, -0.5, 0.2, 1.5]).unwrap();
        let output = relu.forward(&input).unwrap();
        assert_eq!(output.data(), &[0.0, 0.0, 0.2, 1.5]);

        let mut relu = relu;
        let grad_output = Tensor::from_vec(1, 4, vec![0.3, 0.4, 0.5, 0.6]).unwrap();
        let grad_input = relu.backward(&input, &grad_output).unwrap();
        assert_eq!(grad_input.data(), &[0.0, 0.0, 0.5, 0.6]);
    }

    #[test]
    fn sigmoid_output_is_bounded() {
        let layer = Sigmoid::new();
        let input = Tensor::from_vec(1, 3, vec![-50.0, 0.0, 50.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        for value in output.data() {
            assert!((0.0..=1.0).contains(value));
        }
        assert!((output.data()[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sigmoid_gradient_peaks_at_zero() {
        let mut layer = Sigmoid::new();
        let input = Tensor::from_vec(1, 2, vec![0.0, 4.0]).unwrap();
        let grad_output = Tensor::from_vec(1, 2, vec![1.0, 1.0]).unwrap();
        let grad = layer.backward(&input, &grad_output).unwrap();
        assert!(grad.data()[0] > grad.data()[1]);
        assert!((grad.data()[0] - 0.25).abs() < 1e-6);
    }
}
