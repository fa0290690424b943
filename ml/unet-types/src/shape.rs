//! Framework-free descriptions of image and feature-map shapes.
//!
//! Shapes are stored as `(height, width, channels)` triples. The batch
//! dimension is never part of a shape; [`FeatureShape::from_nchw`] drops it
//! when reading the dims of a concrete tensor.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};

/// Shape of a single network input image.
///
/// # Example
///
/// ```
/// use unet_types::InputShape;
///
/// let shape = InputShape::default();
/// assert_eq!((shape.height, shape.width, shape.channels), (128, 128, 3));
/// assert!(shape.is_divisible_by(16));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    /// Height in pixels.
    pub height: usize,

    /// Width in pixels.
    pub width: usize,

    /// Number of input channels (3 for RGB).
    pub channels: usize,
}

impl Default for InputShape {
    fn default() -> Self {
        Self {
            height: 128,
            width: 128,
            channels: 3,
        }
    }
}

impl InputShape {
    /// Creates a new input shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Returns `true` if both spatial dimensions are multiples of `divisor`.
    #[must_use]
    pub const fn is_divisible_by(&self, divisor: usize) -> bool {
        divisor > 0 && self.height % divisor == 0 && self.width % divisor == 0
    }

    /// Checks that no dimension is zero and that height and width are
    /// multiples of `divisor`.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidDimensions`] for a zero dimension and
    /// [`TypesError::NotDivisible`] when height or width is not a multiple of
    /// `divisor`.
    pub fn validate(&self, divisor: usize) -> Result<()> {
        if self.height == 0 || self.width == 0 || self.channels == 0 {
            return Err(TypesError::invalid_dimensions(
                self.height,
                self.width,
                self.channels,
            ));
        }
        if !self.is_divisible_by(divisor) {
            return Err(TypesError::not_divisible(self.height, self.width, divisor));
        }
        Ok(())
    }

    /// Returns the feature shape of the raw input node.
    #[must_use]
    pub const fn feature(&self) -> FeatureShape {
        FeatureShape::new(self.height, self.width, self.channels)
    }
}

impl From<(usize, usize, usize)> for InputShape {
    fn from((height, width, channels): (usize, usize, usize)) -> Self {
        Self::new(height, width, channels)
    }
}

impl std::fmt::Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Shape of one feature map in the computation graph.
///
/// Pooling uses floor division, matching a valid-padded 2x2 window.
///
/// # Example
///
/// ```
/// use unet_types::FeatureShape;
///
/// let s = FeatureShape::new(128, 128, 64);
/// assert_eq!(s.halved(), FeatureShape::new(64, 64, 64));
/// assert_eq!(s.halved().doubled(), s);
/// assert_eq!(FeatureShape::from_nchw([2, 64, 128, 128]), s);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    /// Height in pixels.
    pub height: usize,

    /// Width in pixels.
    pub width: usize,

    /// Channel count.
    pub channels: usize,
}

impl FeatureShape {
    /// Creates a new feature shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Builds a shape from channels-first tensor dims, ignoring the batch.
    #[must_use]
    pub const fn from_nchw(dims: [usize; 4]) -> Self {
        Self::new(dims[2], dims[3], dims[1])
    }

    /// Shape after a 2x2, stride-2 pooling window.
    #[must_use]
    pub const fn halved(&self) -> Self {
        Self::new(self.height / 2, self.width / 2, self.channels)
    }

    /// Shape after a 2x2, stride-2 transposed convolution.
    #[must_use]
    pub const fn doubled(&self) -> Self {
        Self::new(self.height * 2, self.width * 2, self.channels)
    }

    /// Same spatial size with a new channel count.
    #[must_use]
    pub const fn with_channels(&self, channels: usize) -> Self {
        Self::new(self.height, self.width, channels)
    }

    /// Returns `true` if both shapes cover the same pixels.
    #[must_use]
    pub const fn same_spatial(&self, other: &Self) -> bool {
        self.height == other.height && self.width == other.width
    }
}

impl std::fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn input_shape_default() {
        let shape = InputShape::default();
        assert_eq!(shape, InputShape::new(128, 128, 3));
        assert_eq!(shape.to_string(), "128x128x3");
    }

    #[test]
    fn input_shape_from_tuple() {
        let shape: InputShape = (64, 32, 1).into();
        assert_eq!(shape.height, 64);
        assert_eq!(shape.width, 32);
        assert_eq!(shape.channels, 1);
    }

    #[test]
    fn input_shape_divisibility() {
        assert!(InputShape::new(128, 64, 3).is_divisible_by(16));
        assert!(!InputShape::new(100, 64, 3).is_divisible_by(16));
        assert!(!InputShape::new(128, 72, 3).is_divisible_by(16));
        assert!(!InputShape::new(128, 128, 3).is_divisible_by(0));
    }

    #[test]
    fn input_shape_validate() {
        assert!(InputShape::new(64, 64, 1).validate(16).is_ok());

        let err = InputShape::new(0, 64, 1).validate(16).unwrap_err();
        assert!(matches!(err, TypesError::InvalidDimensions { .. }));

        let err = InputShape::new(64, 64, 0).validate(16).unwrap_err();
        assert!(matches!(err, TypesError::InvalidDimensions { .. }));

        let err = InputShape::new(96, 40, 3).validate(16).unwrap_err();
        assert!(matches!(err, TypesError::NotDivisible { divisor: 16, .. }));
    }

    #[test]
    fn feature_shape_halving_floors() {
        let s = FeatureShape::new(9, 7, 4);
        assert_eq!(s.halved(), FeatureShape::new(4, 3, 4));
    }

    #[test]
    fn feature_shape_from_dims() {
        let s = FeatureShape::new(32, 16, 8);
        assert_eq!(FeatureShape::from_nchw([4, 8, 32, 16]), s);
        assert!(s.same_spatial(&s.with_channels(3)));
        assert!(!s.same_spatial(&FeatureShape::new(16, 32, 8)));
    }

    #[test]
    fn shape_serialization() {
        let shape = InputShape::new(64, 64, 1);
        let json = serde_json::to_string(&shape).unwrap();
        let parsed: InputShape = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, shape);
    }
}
