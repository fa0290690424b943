//! Error types for unet-types crate.

use thiserror::Error;

/// Errors that can occur in unet-types operations.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A shape has a zero dimension.
    #[error("invalid dimensions: {height}x{width}x{channels}")]
    InvalidDimensions {
        /// Height in pixels.
        height: usize,
        /// Width in pixels.
        width: usize,
        /// Channel count.
        channels: usize,
    },

    /// Spatial dimensions cannot be halved the required number of times.
    #[error("spatial size {height}x{width} is not divisible by {divisor}")]
    NotDivisible {
        /// Height in pixels.
        height: usize,
        /// Width in pixels.
        width: usize,
        /// Required divisor (`2^depth`).
        divisor: usize,
    },

    /// Class index outside the representable mask range.
    #[error("invalid class ID {id}: expected < {max}")]
    InvalidClassId {
        /// The offending class index.
        id: i64,
        /// Exclusive upper bound.
        max: u32,
    },

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    DataSizeMismatch {
        /// Expected size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },
}

impl TypesError {
    /// Creates an invalid dimensions error.
    #[must_use]
    pub const fn invalid_dimensions(height: usize, width: usize, channels: usize) -> Self {
        Self::InvalidDimensions {
            height,
            width,
            channels,
        }
    }

    /// Creates a not-divisible error.
    #[must_use]
    pub const fn not_divisible(height: usize, width: usize, divisor: usize) -> Self {
        Self::NotDivisible {
            height,
            width,
            divisor,
        }
    }

    /// Creates an invalid class ID error.
    #[must_use]
    pub const fn invalid_class_id(id: i64, max: u32) -> Self {
        Self::InvalidClassId { id, max }
    }

    /// Creates a data size mismatch error.
    #[must_use]
    pub const fn data_size_mismatch(expected: usize, actual: usize) -> Self {
        Self::DataSizeMismatch { expected, actual }
    }
}

/// Result type for unet-types operations.
pub type Result<T> = std::result::Result<T, TypesError>;
