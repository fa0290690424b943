//! Burn U-Net model for pixel-wise semantic segmentation.
//!
//! The network maps an image of shape `(height, width, channels)` to a
//! per-pixel class distribution of shape `(height, width, num_classes)`.
//!
//! # Building Blocks
//!
//! - [`ConvBlock`] - Two 3x3 same-padded convolutions, each normalized and activated
//! - [`EncoderBlock`] - A conv block followed by 2x2 max pooling
//! - [`DecoderBlock`] - 2x2 transposed convolution joined with a skip tensor
//! - [`UNet`] - Encoder stages, bottleneck, mirrored decoder stages and a 1x1 head
//!
//! # Shapes
//!
//! [`ShapePlan`] propagates shapes through the graph without touching a
//! backend, which makes it cheap to check a configuration before building.
//! Inputs must be divisible by `2^depth` for skip tensors to line up.
//!
//! # Checkpoint Persistence
//!
//! [`save_unet`] writes the weights record plus a JSON configuration
//! sidecar; [`load_unet`] rebuilds the graph from the sidecar and loads the
//! weights into it.
//!
//! # Backend Support
//!
//! Models are generic over Burn backends. Common choices:
//! - `burn-ndarray` - CPU inference (used by the tests)
//! - `burn-wgpu` - GPU inference
//!
//! # Example
//!
//! ```ignore
//! use burn::tensor::Tensor;
//! use unet_models::{UNet, UNetConfig};
//!
//! let config = UNetConfig::new((128, 128, 3), 8);
//! let device = Default::default();
//! let model = UNet::<MyBackend>::try_new(&config, &device)?;
//!
//! let probs = model.forward_nhwc(Tensor::zeros([1, 128, 128, 3], &device));
//! assert_eq!(probs.dims(), [1, 128, 128, 8]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod activation;
mod blocks;
mod checkpoint;
mod config;
mod error;
mod plan;
mod unet;

// Re-export layer building blocks
pub use activation::{Activation, LEAKY_RELU_SLOPE, Normalization, OutputActivation};
pub use blocks::{
    CHANNEL_DIM, ConvBlock, ConvBlockConfig, ConvUnit, DecoderBlock, DecoderBlockConfig,
    EncoderBlock,
};

// Re-export the model
pub use config::UNetConfig;
pub use plan::{PlanNode, ShapePlan, Stage};
pub use unet::{UNET_NAME, UNet, UNetFeatures};

// Re-export checkpoint utilities
pub use checkpoint::{
    CONFIG_EXTENSION, CheckpointFormat, config_path, load_config, load_unet, save_unet,
};

// Re-export error types
pub use error::{ModelError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        Activation, CheckpointFormat, ModelError, Normalization, OutputActivation, ShapePlan,
        UNet, UNetConfig, load_unet, save_unet,
    };
    pub use unet_types::{InputShape, SegmentationMask};
}
