//! Error types for unet-models crate.

use thiserror::Error;
use unet_types::TypesError;

/// Errors that can occur in unet-models operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid model configuration.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Tensor shape does not match what the model is bound to.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape.
        expected: String,
        /// Actual shape.
        actual: String,
    },

    /// Failed to load checkpoint.
    #[error("failed to load checkpoint from {path}: {reason}")]
    LoadCheckpoint {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to save checkpoint.
    #[error("failed to save checkpoint to {path}: {reason}")]
    SaveCheckpoint {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Checkpoint file not found.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Unsupported checkpoint format.
    #[error("unsupported checkpoint format: {0}")]
    UnsupportedFormat(String),

    /// Tensor data could not be read back from the backend.
    #[error("tensor data error: {0}")]
    TensorData(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Shape or mask type error.
    #[error(transparent)]
    Types(#[from] TypesError),
}

impl ModelError {
    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a load checkpoint error.
    #[must_use]
    pub fn load_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a save checkpoint error.
    #[must_use]
    pub fn save_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SaveCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a checkpoint not found error.
    #[must_use]
    pub fn checkpoint_not_found(path: impl Into<String>) -> Self {
        Self::CheckpointNotFound(path.into())
    }

    /// Creates an unsupported format error.
    #[must_use]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Creates a tensor data error.
    #[must_use]
    pub fn tensor_data(reason: impl Into<String>) -> Self {
        Self::TensorData(reason.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Io(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

/// Result type for unet-models operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn error_invalid_config() {
        let err = ModelError::invalid_config("num_classes must be > 0");
        assert!(err.to_string().contains("num_classes must be > 0"));
    }

    #[test]
    fn error_shape_mismatch() {
        let err = ModelError::shape_mismatch("[_, 3, 128, 128]", "[1, 1, 128, 128]");
        assert!(err.to_string().contains("[_, 3, 128, 128]"));
        assert!(err.to_string().contains("[1, 1, 128, 128]"));
    }

    #[test]
    fn error_checkpoint_paths() {
        let err = ModelError::load_checkpoint("unet.bin", "truncated record");
        assert!(err.to_string().contains("unet.bin"));
        assert!(err.to_string().contains("truncated record"));

        let err = ModelError::save_checkpoint("out/unet.json", "read-only filesystem");
        assert!(err.to_string().contains("out/unet.json"));

        let err = ModelError::checkpoint_not_found("/missing/unet.bin");
        assert!(err.to_string().contains("/missing/unet.bin"));

        let err = ModelError::unsupported_format("unet.onnx");
        assert!(err.to_string().contains("unet.onnx"));
    }

    #[test]
    fn error_from_types_error() {
        let err: ModelError = TypesError::not_divisible(100, 100, 16).into();
        assert!(matches!(err, ModelError::Types(_)));
        assert!(err.to_string().contains("100x100"));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ModelError = io_err.into();
        assert!(matches!(err, ModelError::Io(_)));
    }

    #[test]
    fn error_from_serde_error() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ModelError = json_err.into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
