//! Nonlinearity and normalization choices for the convolution units and
//! the classifier head.
//!
//! None of these choices affect tensor shapes.

use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::{gelu, leaky_relu, relu, sigmoid, softmax};
use serde::{Deserialize, Serialize};

/// Negative slope used by [`Activation::LeakyRelu`].
pub const LEAKY_RELU_SLOPE: f64 = 0.01;

/// Nonlinearity applied after each normalized convolution.
///
/// # Example
///
/// ```
/// use unet_models::Activation;
///
/// assert_eq!(Activation::default(), Activation::Relu);
/// assert_eq!(Activation::Gelu.name(), "gelu");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Zeroes negative values.
    #[default]
    Relu,

    /// Scales negative values by [`LEAKY_RELU_SLOPE`].
    LeakyRelu,

    /// Gaussian error linear unit.
    Gelu,
}

impl Activation {
    /// Applies the nonlinearity element-wise.
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Relu => relu(x),
            Self::LeakyRelu => leaky_relu(x, LEAKY_RELU_SLOPE),
            Self::Gelu => gelu(x),
        }
    }

    /// Returns the activation name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::LeakyRelu => "leaky_relu",
            Self::Gelu => "gelu",
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Normalization applied between each convolution and its activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Per-channel batch normalization.
    #[default]
    Batch,

    /// No normalization.
    Identity,
}

impl Normalization {
    /// Returns the normalization name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Identity => "identity",
        }
    }
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Activation of the per-pixel classifier head.
///
/// [`OutputActivation::Softmax`] turns the class channels of every pixel into
/// a probability distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Softmax across the class channel.
    #[default]
    Softmax,

    /// Independent per-class sigmoid (multi-label masks).
    Sigmoid,

    /// Raw logits, for losses that fuse their own softmax.
    Logits,
}

impl OutputActivation {
    /// Applies the head activation along `channel_dim`.
    pub fn apply<B: Backend, const D: usize>(
        self,
        x: Tensor<B, D>,
        channel_dim: usize,
    ) -> Tensor<B, D> {
        match self {
            Self::Softmax => softmax(x, channel_dim),
            Self::Sigmoid => sigmoid(x),
            Self::Logits => x,
        }
    }

    /// Returns the activation name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Softmax => "softmax",
            Self::Sigmoid => "sigmoid",
            Self::Logits => "logits",
        }
    }
}

impl std::fmt::Display for OutputActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn values(x: Tensor<TestBackend, 1>) -> Vec<f32> {
        x.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn relu_zeroes_negatives() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-2.0, 0.0, 3.0], &device);
        assert_eq!(values(Activation::Relu.apply(x)), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn leaky_relu_scales_negatives() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-100.0, 5.0], &device);
        let out = values(Activation::LeakyRelu.apply(x));
        approx::assert_relative_eq!(out[0], -1.0, epsilon = 1e-5);
        approx::assert_relative_eq!(out[1], 5.0, epsilon = 1e-5);
    }

    #[test]
    fn softmax_sums_to_one_along_channel() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]], &device);
        let sums = OutputActivation::Softmax.apply(x, 1).sum_dim(1);
        for s in sums.into_data().to_vec::<f32>().unwrap() {
            approx::assert_relative_eq!(s, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn logits_pass_through() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-4.0, 4.0], &device);
        assert_eq!(values(OutputActivation::Logits.apply(x, 0)), vec![-4.0, 4.0]);
    }

    #[test]
    fn names_and_defaults() {
        assert_eq!(Activation::default().to_string(), "relu");
        assert_eq!(Normalization::default().to_string(), "batch");
        assert_eq!(OutputActivation::default().to_string(), "softmax");
        assert_eq!(Activation::LeakyRelu.name(), "leaky_relu");
        assert_eq!(Normalization::Identity.name(), "identity");
        assert_eq!(OutputActivation::Sigmoid.name(), "sigmoid");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Activation::LeakyRelu).unwrap();
        assert_eq!(json, "\"leaky_relu\"");
        let parsed: OutputActivation = serde_json::from_str("\"logits\"").unwrap();
        assert_eq!(parsed, OutputActivation::Logits);
    }
}
