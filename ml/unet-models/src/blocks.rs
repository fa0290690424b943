//! Building blocks of the U-Net: conv blocks, encoder stages and decoder
//! stages.
//!
//! All blocks work on channels-first `[batch, channels, height, width]`
//! tensors.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::activation::{Activation, Normalization};

/// Channel axis of a channels-first tensor.
pub const CHANNEL_DIM: usize = 1;

/// Configuration shared by [`ConvBlock`] and [`EncoderBlock`].
///
/// # Example
///
/// ```
/// use unet_models::ConvBlockConfig;
///
/// let config = ConvBlockConfig::new(3, 64);
/// assert_eq!(config.filters, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvBlockConfig {
    /// Channels of the incoming tensor.
    pub in_channels: usize,

    /// Channels produced by both convolutions.
    pub filters: usize,

    /// Nonlinearity after each normalization.
    pub activation: Activation,

    /// Normalization after each convolution.
    pub normalization: Normalization,
}

impl ConvBlockConfig {
    /// Creates a config with ReLU and batch normalization.
    #[must_use]
    pub const fn new(in_channels: usize, filters: usize) -> Self {
        Self {
            in_channels,
            filters,
            activation: Activation::Relu,
            normalization: Normalization::Batch,
        }
    }

    /// Sets the activation.
    #[must_use]
    pub const fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Sets the normalization.
    #[must_use]
    pub const fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }
}

/// 3x3 same-padded convolution, normalization, activation.
#[derive(Debug, Module)]
pub struct ConvUnit<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    activation: Ignored<Activation>,
}

impl<B: Backend> ConvUnit<B> {
    fn new(
        in_channels: usize,
        filters: usize,
        activation: Activation,
        normalization: Normalization,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, filters], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let norm = match normalization {
            Normalization::Batch => Some(BatchNormConfig::new(filters).init(device)),
            Normalization::Identity => None,
        };
        Self {
            conv,
            norm,
            activation: Ignored(activation),
        }
    }

    /// Runs convolution, normalization and activation.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        self.activation.0.apply(x)
    }
}

/// Two stacked [`ConvUnit`]s.
///
/// Keeps the spatial size and projects to `filters` channels.
///
/// # Example
///
/// ```ignore
/// use unet_models::{ConvBlock, ConvBlockConfig};
///
/// let block = ConvBlock::<MyBackend>::new(ConvBlockConfig::new(3, 16), &device);
/// let out = block.forward(Tensor::zeros([1, 3, 32, 32], &device));
/// assert_eq!(out.dims(), [1, 16, 32, 32]);
/// ```
#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    first: ConvUnit<B>,
    second: ConvUnit<B>,
}

impl<B: Backend> ConvBlock<B> {
    /// Creates a new conv block.
    #[must_use]
    pub fn new(config: ConvBlockConfig, device: &B::Device) -> Self {
        let first = ConvUnit::new(
            config.in_channels,
            config.filters,
            config.activation,
            config.normalization,
            device,
        );
        let second = ConvUnit::new(
            config.filters,
            config.filters,
            config.activation,
            config.normalization,
            device,
        );
        Self { first, second }
    }

    /// Runs the forward pass.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.second.forward(self.first.forward(input))
    }
}

/// A conv block followed by 2x2, stride-2 max pooling.
#[derive(Debug, Module)]
pub struct EncoderBlock<B: Backend> {
    conv: ConvBlock<B>,
    pool: MaxPool2d,
}

impl<B: Backend> EncoderBlock<B> {
    /// Creates a new encoder stage.
    #[must_use]
    pub fn new(config: ConvBlockConfig, device: &B::Device) -> Self {
        Self {
            conv: ConvBlock::new(config, device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    /// Runs the forward pass.
    ///
    /// Returns `(skip, pooled)`: the full-resolution conv block output kept
    /// for the mirrored decoder stage, and the half-resolution tensor fed to
    /// the next stage.
    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let skip = self.conv.forward(input);
        let pooled = self.pool.forward(skip.clone());
        (skip, pooled)
    }
}

/// Configuration for [`DecoderBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderBlockConfig {
    /// Channels of the tensor being upsampled.
    pub in_channels: usize,

    /// Channels of the skip tensor joined after upsampling.
    pub skip_channels: usize,

    /// Channels produced by the transposed convolution.
    pub filters: usize,

    /// Optional conv block applied after concatenation.
    pub fuse: Option<ConvBlockConfig>,
}

impl DecoderBlockConfig {
    /// Creates a config without a post-concatenation conv block.
    #[must_use]
    pub const fn new(in_channels: usize, skip_channels: usize, filters: usize) -> Self {
        Self {
            in_channels,
            skip_channels,
            filters,
            fuse: None,
        }
    }

    /// Adds a conv block after concatenation, reducing back to `filters`.
    #[must_use]
    pub const fn with_fuse(mut self, activation: Activation, normalization: Normalization) -> Self {
        self.fuse = Some(ConvBlockConfig {
            in_channels: self.filters + self.skip_channels,
            filters: self.filters,
            activation,
            normalization,
        });
        self
    }

    /// Channels of the block output.
    #[must_use]
    pub const fn out_channels(&self) -> usize {
        match self.fuse {
            Some(fuse) => fuse.filters,
            None => self.filters + self.skip_channels,
        }
    }
}

/// 2x2, stride-2 transposed convolution followed by channel concatenation
/// with a skip tensor.
#[derive(Debug, Module)]
pub struct DecoderBlock<B: Backend> {
    upsample: ConvTranspose2d<B>,
    fuse: Option<ConvBlock<B>>,
}

impl<B: Backend> DecoderBlock<B> {
    /// Creates a new decoder stage.
    #[must_use]
    pub fn new(config: DecoderBlockConfig, device: &B::Device) -> Self {
        let upsample = ConvTranspose2dConfig::new([config.in_channels, config.filters], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let fuse = config.fuse.map(|fuse| ConvBlock::new(fuse, device));
        Self { upsample, fuse }
    }

    /// Runs the forward pass.
    ///
    /// `skip` must have twice the spatial size of `input`. The output has
    /// `filters + skip_channels` channels, or `filters` when fused.
    pub fn forward(&self, input: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let up = self.upsample.forward(input);
        let joined = Tensor::cat(vec![up, skip], CHANNEL_DIM);
        match &self.fuse {
            Some(block) => block.forward(joined),
            None => joined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn conv_block_keeps_spatial_size() {
        let block = ConvBlock::<TestBackend>::new(ConvBlockConfig::new(3, 8), &device());
        let out = block.forward(Tensor::zeros([2, 3, 16, 12], &device()));
        assert_eq!(out.dims(), [2, 8, 16, 12]);
    }

    #[test]
    fn conv_block_relu_output_is_non_negative() {
        let block = ConvBlock::<TestBackend>::new(ConvBlockConfig::new(1, 4), &device());
        let input = Tensor::<TestBackend, 4>::ones([1, 1, 8, 8], &device()).neg();
        let values = block.forward(input).into_data().to_vec::<f32>().unwrap_or_default();
        assert!(!values.is_empty());
        assert!(values.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn conv_block_without_norm() {
        let config = ConvBlockConfig::new(2, 6)
            .with_normalization(Normalization::Identity)
            .with_activation(Activation::Gelu);
        let block = ConvBlock::<TestBackend>::new(config, &device());
        let out = block.forward(Tensor::zeros([1, 2, 8, 8], &device()));
        assert_eq!(out.dims(), [1, 6, 8, 8]);
    }

    #[test]
    fn encoder_block_halves_and_keeps_skip() {
        let block = EncoderBlock::<TestBackend>::new(ConvBlockConfig::new(3, 4), &device());
        let (skip, pooled) = block.forward(Tensor::zeros([1, 3, 32, 16], &device()));
        assert_eq!(skip.dims(), [1, 4, 32, 16]);
        assert_eq!(pooled.dims(), [1, 4, 16, 8]);
    }

    #[test]
    fn encoder_block_floors_odd_sizes() {
        let block = EncoderBlock::<TestBackend>::new(ConvBlockConfig::new(1, 2), &device());
        let (skip, pooled) = block.forward(Tensor::zeros([1, 1, 9, 7], &device()));
        assert_eq!(skip.dims(), [1, 2, 9, 7]);
        assert_eq!(pooled.dims(), [1, 2, 4, 3]);
    }

    #[test]
    fn pooling_takes_window_maximum() {
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let input = Tensor::<TestBackend, 4>::from_floats(
            [[[
                [1.0, 2.0, 5.0, 0.0],
                [3.0, 4.0, 1.0, 1.0],
                [0.0, 0.0, 7.0, 8.0],
                [0.0, 9.0, 6.0, 5.0],
            ]]],
            &device(),
        );
        let out = pool.forward(input).into_data().to_vec::<f32>().unwrap_or_default();
        assert_eq!(out, vec![4.0, 5.0, 9.0, 8.0]);
    }

    #[test]
    fn decoder_block_doubles_and_concatenates() {
        let config = DecoderBlockConfig::new(16, 4, 8);
        assert_eq!(config.out_channels(), 12);

        let block = DecoderBlock::<TestBackend>::new(config, &device());
        let input = Tensor::zeros([2, 16, 4, 6], &device());
        let skip = Tensor::zeros([2, 4, 8, 12], &device());
        assert_eq!(block.forward(input, skip).dims(), [2, 12, 8, 12]);
    }

    #[test]
    fn decoder_block_preserves_skip_values() {
        let block =
            DecoderBlock::<TestBackend>::new(DecoderBlockConfig::new(2, 1, 1), &device());
        let input = Tensor::zeros([1, 2, 2, 2], &device());
        let skip = Tensor::<TestBackend, 4>::full([1, 1, 4, 4], 3.5, &device());

        let out = block.forward(input, skip);
        let skip_channel = out
            .narrow(CHANNEL_DIM, 1, 1)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        assert_eq!(skip_channel.len(), 16);
        assert!(skip_channel.iter().all(|&v| (v - 3.5).abs() < 1e-6));
    }

    #[test]
    fn decoder_block_fused_reduces_channels() {
        let config =
            DecoderBlockConfig::new(16, 8, 8).with_fuse(Activation::Relu, Normalization::Batch);
        assert_eq!(config.out_channels(), 8);

        let block = DecoderBlock::<TestBackend>::new(config, &device());
        let out = block.forward(
            Tensor::zeros([1, 16, 4, 4], &device()),
            Tensor::zeros([1, 8, 8, 8], &device()),
        );
        assert_eq!(out.dims(), [1, 8, 8, 8]);
    }
}
