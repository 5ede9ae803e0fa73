// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

use mt_tensor::{Tensor, TensorError, TensorResult};
use std::collections::HashMap;

/// Per-parameter Adam accumulator attached by [`Parameter::attach_adam`].
#[derive(Debug, Clone)]
struct AdamTape {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: u64,
    first_moment: Tensor,
    second_moment: Tensor,
}

impl AdamTape {
    fn new(
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        rows: usize,
        cols: usize,
    ) -> TensorResult<Self> {
        if learning_rate <= 0.0 || !learning_rate.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "adam_learning_rate",
            });
        }
        if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
            return Err(TensorError::InvalidValue { label: "adam_beta" });
        }
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            step: 0,
            first_moment: Tensor::zeros(rows, cols)?,
            second_moment: Tensor::zeros(rows, cols)?,
        })
    }

    fn apply(&mut self, value: &mut Tensor, gradient: &Tensor) -> TensorResult<()> {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias2 = 1.0 - self.beta2.powi(self.step as i32);
        let m = self.first_moment.data_mut();
        let v = self.second_moment.data_mut();
        let values = value.data_mut();
        for ((value, (m, v)), grad) in values
            .iter_mut()
            .zip(m.iter_mut().zip(v.iter_mut()))
            .zip(gradient.data().iter())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * grad;
            *v = self.beta2 * *v + (1.0 - self.beta2) * grad * grad;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *value -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.step = 0;
        for value in self.first_moment.data_mut() {
            *value = 0.0;
        }
        for value in self.second_moment.data_mut() {
            *value = 0.0;
        }
    }
}

/// Trainable parameter that can either rely on an attached Adam tape or fall
/// back to plain gradient descent with a caller-supplied learning rate.
pub struct Parameter {
    name: String,
    value: Tensor,
    gradient: Option<Tensor>,
    adam: Option<AdamTape>,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (rows, cols) = self.value.shape();
        write!(
            f,
            "Parameter(name={},shape=({},{}),has_grad={},has_adam={})",
            self.name,
            rows,
            cols,
            self.gradient.is_some(),
            self.adam.is_some()
        )
    }
}

impl Parameter {
    /// Creates a new parameter with the provided tensor value.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
            gradient: None,
            adam: None,
        }
    }

    /// Returns the identifier assigned to the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provides an immutable view into the underlying tensor value.
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Provides a mutable view into the underlying tensor value.
    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    /// Returns the currently accumulated gradient, if any.
    pub fn gradient(&self) -> Option<&Tensor> {
        self.gradient.as_ref()
    }

    /// Attaches an Adam accumulator to the parameter.
    pub fn attach_adam(
        &mut self,
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    ) -> TensorResult<()> {
        let (rows, cols) = self.value.shape();
        self.adam = Some(AdamTape::new(
            learning_rate,
            beta1,
            beta2,
            epsilon,
            rows,
            cols,
        )?);
        Ok(())
    }

    /// Returns `true` when an Adam tape is attached.
    pub fn has_adam(&self) -> bool {
        self.adam.is_some()
    }

    fn assert_shape(&self, tensor: &Tensor) -> TensorResult<()> {
        if self.value.shape() != tensor.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.value.shape(),
                right: tensor.shape(),
            });
        }
        Ok(())
    }

    /// Accumulates a gradient update into the local buffer.
    pub fn accumulate(&mut self, update: &Tensor) -> TensorResult<()> {
        self.assert_shape(update)?;
        match self.gradient.as_mut() {
            Some(existing) => existing.add_scaled(update, 1.0)?,
            None => self.gradient = Some(update.clone()),
        }
        Ok(())
    }

    /// Clears the accumulated gradient buffer.
    pub fn zero_gradient(&mut self) {
        if let Some(grad) = self.gradient.as_mut() {
            for value in grad.data_mut() {
                *value = 0.0;
            }
        }
    }

    /// Resets optimizer state in addition to the gradient buffer.
    pub fn reset_optimizer(&mut self) {
        self.zero_gradient();
        if let Some(tape) = self.adam.as_mut() {
            tape.reset();
        }
    }

    /// Applies the accumulated update through the Adam tape when attached,
    /// otherwise descends along the raw gradient with `fallback_lr`.
    pub fn apply_step(&mut self, fallback_lr: f32) -> TensorResult<()> {
        let Some(grad) = self.gradient.as_mut() else {
            return Ok(());
        };
        match self.adam.as_mut() {
            Some(tape) => tape.apply(&mut self.value, grad)?,
            None => self.value.add_scaled(grad, -fallback_lr)?,
        }
        for value in grad.data_mut() {
            *value = 0.0;
        }
        Ok(())
    }

    /// Replaces the parameter value with the provided tensor.
    pub fn load_value(&mut self, value: &Tensor) -> TensorResult<()> {
        self.assert_shape(value)?;
        self.value = value.clone();
        Ok(())
    }
}

/// High-level module trait inspired by PyTorch's `nn.Module` but expressed in
/// pure Rust so every modality architecture shares one training surface.
pub trait Module {
    /// Runs a forward pass.
    fn forward(&self, input: &Tensor) -> TensorResult<Tensor>;

    /// Propagates a gradient backwards. Implementations populate the relevant
    /// parameter accumulators before returning the gradient with respect to
    /// `input`.
    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> TensorResult<Tensor>;

    /// Visits immutable parameters.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> TensorResult<()>,
    ) -> TensorResult<()>;

    /// Visits mutable parameters.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> TensorResult<()>,
    ) -> TensorResult<()>;

    /// Attaches an Adam tape to every parameter.
    fn attach_adam(
        &mut self,
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    ) -> TensorResult<()> {
        self.visit_parameters_mut(&mut |param| {
            param.attach_adam(learning_rate, beta1, beta2, epsilon)
        })
    }

    /// Applies every parameter update.
    fn apply_step(&mut self, fallback_lr: f32) -> TensorResult<()> {
        self.visit_parameters_mut(&mut |param| param.apply_step(fallback_lr))
    }

    /// Clears accumulators across every parameter.
    fn zero_accumulators(&mut self) -> TensorResult<()> {
        self.visit_parameters_mut(&mut |param| {
            param.zero_gradient();
            Ok(())
        })
    }

    /// Returns the total number of scalar weights held by the module.
    fn parameter_count(&self) -> TensorResult<usize> {
        let mut count = 0;
        self.visit_parameters(&mut |param| {
            count += param.value().len();
            Ok(())
        })?;
        Ok(count)
    }

    /// Captures a copy of every parameter tensor keyed by its canonical name.
    fn state_dict(&self) -> TensorResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        self.visit_parameters(&mut |param| {
            state.insert(param.name().to_string(), param.value().clone());
            Ok(())
        })?;
        Ok(state)
    }

    /// Restores parameters from a state dictionary produced by
    /// [`Module::state_dict`].
    fn load_state_dict(&mut self, state: &HashMap<String, Tensor>) -> TensorResult<()> {
        self.visit_parameters_mut(&mut |param| {
            let Some(value) = state.get(param.name()) else {
                return Err(TensorError::MissingParameter {
                    name: param.name().to_string(),
                });
            };
            param.load_value(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_accumulates_and_steps() {
        let mut param = Parameter::new("w", Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap());
        let grad = Tensor::from_vec(1, 2, vec![0.5, -0.5]).unwrap();
        param.accumulate(&grad).unwrap();
        param.accumulate(&grad).unwrap();
        param.apply_step(0.1).unwrap();
        assert!((param.value().data()[0] - 0.9).abs() < 1e-6);
        assert!((param.value().data()[1] + 0.9).abs() < 1e-6);
        // The gradient buffer is cleared after a step.
        assert_eq!(param.gradient().unwrap().squared_l2_norm(), 0.0);
    }

    #[test]
    fn adam_step_moves_against_the_gradient() {
        let mut param = Parameter::new("w", Tensor::zeros(1, 3).unwrap());
        param.attach_adam(0.01, 0.9, 0.999, 1e-8).unwrap();
        let grad = Tensor::from_vec(1, 3, vec![1.0, -2.0, 0.5]).unwrap();
        param.accumulate(&grad).unwrap();
        param.apply_step(0.0).unwrap();
        let values = param.value().data();
        assert!(values[0] < 0.0);
        assert!(values[1] > 0.0);
        assert!(values[2] < 0.0);
    }

    #[test]
    fn adam_rejects_invalid_learning_rate() {
        let mut param = Parameter::new("w", Tensor::zeros(1, 1).unwrap());
        assert!(param.attach_adam(0.0, 0.9, 0.999, 1e-8).is_err());
        assert!(param.attach_adam(0.01, 1.5, 0.999, 1e-8).is_err());
    }

    #[test]
    fn accumulate_rejects_shape_mismatch() {
        let mut param = Parameter::new("w", Tensor::zeros(1, 2).unwrap());
        let grad = Tensor::zeros(2, 2).unwrap();
        assert!(matches!(
            param.accumulate(&grad),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }
}
