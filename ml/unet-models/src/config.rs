//! U-Net model configuration.

use serde::{Deserialize, Serialize};
use unet_types::InputShape;

use crate::activation::{Activation, Normalization, OutputActivation};
use crate::error::{ModelError, Result};

/// Configuration for [`UNet`](crate::UNet).
///
/// The defaults describe the classic four-level network: a 128x128 RGB
/// input, encoder filters 64/128/256/512, a 1024-filter bottleneck and an
/// 8-class softmax head.
///
/// # Example
///
/// ```
/// use unet_models::UNetConfig;
///
/// let config = UNetConfig::default();
/// assert_eq!(config.num_classes, 8);
/// assert_eq!(config.encoder_filters(), vec![64, 128, 256, 512]);
/// assert_eq!(config.bottleneck_filters(), 1024);
/// assert_eq!(config.decoder_filters(), vec![512, 256, 128, 64]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UNetConfig {
    /// Shape of one input image.
    pub input_shape: InputShape,

    /// Number of output classes (channels of the head).
    pub num_classes: usize,

    /// Filters of the first encoder stage; each deeper stage doubles it.
    pub base_filters: usize,

    /// Number of encoder stages (and mirrored decoder stages).
    pub depth: usize,

    /// Nonlinearity inside every convolution unit.
    #[serde(default)]
    pub activation: Activation,

    /// Normalization inside every convolution unit.
    #[serde(default)]
    pub normalization: Normalization,

    /// Activation of the classifier head.
    #[serde(default)]
    pub output_activation: OutputActivation,

    /// Run a conv block after each skip concatenation.
    ///
    /// Off by default: the concatenated tensor is upsampled directly by the
    /// next decoder stage.
    #[serde(default)]
    pub fuse_skip: bool,
}

impl Default for UNetConfig {
    fn default() -> Self {
        Self {
            input_shape: InputShape::default(),
            num_classes: 8,
            base_filters: 64,
            depth: 4,
            activation: Activation::Relu,
            normalization: Normalization::Batch,
            output_activation: OutputActivation::Softmax,
            fuse_skip: false,
        }
    }
}

impl UNetConfig {
    /// Creates a configuration for the given input shape and class count.
    #[must_use]
    pub fn new(input_shape: impl Into<InputShape>, num_classes: usize) -> Self {
        Self {
            input_shape: input_shape.into(),
            num_classes,
            ..Self::default()
        }
    }

    /// Sets the first-stage filter count.
    #[must_use]
    pub const fn with_base_filters(mut self, base_filters: usize) -> Self {
        self.base_filters = base_filters;
        self
    }

    /// Sets the number of encoder/decoder stages.
    #[must_use]
    pub const fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the convolution unit nonlinearity.
    #[must_use]
    pub const fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Sets the convolution unit normalization.
    #[must_use]
    pub const fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Sets the classifier head activation.
    #[must_use]
    pub const fn with_output_activation(mut self, output_activation: OutputActivation) -> Self {
        self.output_activation = output_activation;
        self
    }

    /// Enables or disables the post-concatenation conv block.
    #[must_use]
    pub const fn with_fuse_skip(mut self, fuse_skip: bool) -> Self {
        self.fuse_skip = fuse_skip;
        self
    }

    /// Filters of encoder stage `level` (0-based).
    #[must_use]
    pub const fn filters_at(&self, level: usize) -> usize {
        self.base_filters << level
    }

    /// Filters of every encoder stage, shallowest first.
    #[must_use]
    pub fn encoder_filters(&self) -> Vec<usize> {
        (0..self.depth).map(|level| self.filters_at(level)).collect()
    }

    /// Filters of the bottleneck conv block.
    #[must_use]
    pub const fn bottleneck_filters(&self) -> usize {
        self.filters_at(self.depth)
    }

    /// Filters of every decoder stage, deepest first.
    #[must_use]
    pub fn decoder_filters(&self) -> Vec<usize> {
        (0..self.depth).rev().map(|level| self.filters_at(level)).collect()
    }

    /// Factor by which the bottleneck is smaller than the input (`2^depth`).
    #[must_use]
    pub const fn spatial_divisor(&self) -> usize {
        1 << self.depth
    }

    /// Validates the configuration.
    ///
    /// Returns `true` if [`validate`](Self::validate) would succeed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks that the configuration describes a buildable network whose
    /// skip tensors line up with the upsampled decoder tensors.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for a zero class count, zero
    /// filters, zero depth or a filter count that overflows, and
    /// [`ModelError::Types`] for an input shape with a zero dimension or one
    /// that is not divisible by `2^depth`.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(ModelError::invalid_config("num_classes must be > 0"));
        }
        if self.base_filters == 0 {
            return Err(ModelError::invalid_config("base_filters must be > 0"));
        }
        if self.depth == 0 {
            return Err(ModelError::invalid_config("depth must be > 0"));
        }
        let fits = u32::try_from(self.depth)
            .ok()
            .and_then(|depth| self.base_filters.checked_shl(depth))
            .is_some_and(|widest| widest >> self.depth == self.base_filters);
        if !fits {
            return Err(ModelError::invalid_config(format!(
                "base_filters {} overflows at depth {}",
                self.base_filters, self.depth
            )));
        }
        self.input_shape.validate(self.spatial_divisor())?;
        Ok(())
    }
}
