//! Shape and mask types for the U-Net segmentation model.
//!
//! This crate has no tensor framework dependency. It describes:
//!
//! - [`InputShape`] - The `(height, width, channels)` image a model is bound to
//! - [`FeatureShape`] - The shape of one feature map inside the network
//! - [`SegmentationMask`] - Per-pixel class indices with IoU and accuracy metrics
//!
//! # Layer 0 Crate
//!
//! Usable from model code, evaluation scripts and serving layers alike.
//!
//! # Example
//!
//! ```
//! use unet_types::{FeatureShape, InputShape};
//!
//! let input = InputShape::new(64, 64, 1);
//! let mut shape = input.feature().with_channels(64);
//! for _ in 0..4 {
//!     shape = shape.halved();
//! }
//! assert_eq!(shape, FeatureShape::new(4, 4, 64));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod segmentation;
mod shape;

pub use segmentation::{MAX_MASK_CLASSES, SegmentationMask};
pub use shape::{FeatureShape, InputShape};

pub use error::{Result, TypesError};
