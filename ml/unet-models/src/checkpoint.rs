//! Checkpoint persistence for U-Net weights.
//!
//! A checkpoint is two files sharing a stem:
//!
//! - `<stem>.bin` or `<stem>.json` - the Burn record of every weight
//! - `<stem>.config.json` - the [`UNetConfig`] needed to rebuild the graph
//!
//! Batch-norm running statistics are part of the record. Burn's file
//! recorders force their own extension onto the path they are given, so the
//! weights file name must end in exactly `.bin` or `.json`.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{
    BinFileRecorder, FullPrecisionSettings, PrettyJsonFileRecorder, Recorder, RecorderError,
};
use tracing::info;

use crate::config::UNetConfig;
use crate::error::{ModelError, Result};
use crate::unet::UNet;

/// Extension of the configuration sidecar.
pub const CONFIG_EXTENSION: &str = "config.json";

/// Encoding of the weights half of a checkpoint.
///
/// The configuration sidecar is always JSON; only the weights record varies.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use unet_models::CheckpointFormat;
///
/// let weights = CheckpointFormat::Binary.weights_path(Path::new("runs/unet"));
/// assert_eq!(weights, Path::new("runs/unet.bin"));
/// assert_eq!(CheckpointFormat::detect(&weights).ok(), Some(CheckpointFormat::Binary));
///
/// // The sidecar is never mistaken for a JSON weights record.
/// assert!(CheckpointFormat::detect(Path::new("runs/unet.config.json")).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckpointFormat {
    /// `BinFileRecorder` at full precision.
    #[default]
    Binary,

    /// `PrettyJsonFileRecorder` at full precision.
    Json,
}

impl CheckpointFormat {
    /// Extension the recorder writes and reads.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::Json => "json",
        }
    }

    /// Weights file written for `stem`.
    #[must_use]
    pub fn weights_path(self, stem: &Path) -> PathBuf {
        stem.with_extension(self.extension())
    }

    /// Recovers the format of an existing weights file.
    ///
    /// The extension must match a recorder exactly; anything else would be
    /// silently redirected by the recorder to a different file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnsupportedFormat`] for any other extension and
    /// for a configuration sidecar path.
    pub fn detect(weights: &Path) -> Result<Self> {
        let is_sidecar = weights
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&format!(".{CONFIG_EXTENSION}")));
        if is_sidecar {
            return Err(ModelError::unsupported_format(format!(
                "{} is a config sidecar, not a weights file",
                weights.display()
            )));
        }

        match weights.extension().and_then(|ext| ext.to_str()) {
            Some("bin") => Ok(Self::Binary),
            Some("json") => Ok(Self::Json),
            _ => Err(ModelError::unsupported_format(format!(
                "{}: expected a .bin or .json weights file",
                weights.display()
            ))),
        }
    }

    fn record<B: Backend>(
        self,
        model: &UNet<B>,
        weights: PathBuf,
    ) -> std::result::Result<(), RecorderError> {
        let record = model.clone().into_record();
        match self {
            Self::Binary => BinFileRecorder::<FullPrecisionSettings>::new().record(record, weights),
            Self::Json => {
                PrettyJsonFileRecorder::<FullPrecisionSettings>::new().record(record, weights)
            }
        }
    }

    fn load<B: Backend>(
        self,
        model: UNet<B>,
        weights: &Path,
        device: &B::Device,
    ) -> std::result::Result<UNet<B>, RecorderError> {
        match self {
            Self::Binary => model.load_file(
                weights,
                &BinFileRecorder::<FullPrecisionSettings>::new(),
                device,
            ),
            Self::Json => model.load_file(
                weights,
                &PrettyJsonFileRecorder::<FullPrecisionSettings>::new(),
                device,
            ),
        }
    }
}

/// Path of the configuration sidecar for a weights file.
#[must_use]
pub fn config_path(weights: &Path) -> PathBuf {
    weights.with_extension(CONFIG_EXTENSION)
}

/// Saves a model's weights and configuration.
///
/// # Arguments
///
/// - `model`: The model to save
/// - `stem`: Output path without extension
/// - `format`: Weight record format
///
/// # Returns
///
/// The path of the weights file (stem plus format extension).
///
/// # Errors
///
/// Returns [`ModelError::SaveCheckpoint`] if either file cannot be written.
///
/// # Example
///
/// ```ignore
/// use unet_models::{save_unet, CheckpointFormat};
///
/// let weights = save_unet(&model, "runs/unet", CheckpointFormat::Binary)?;
/// assert!(weights.ends_with("unet.bin"));
/// ```
pub fn save_unet<B: Backend>(
    model: &UNet<B>,
    stem: impl AsRef<Path>,
    format: CheckpointFormat,
) -> Result<PathBuf> {
    let weights = format.weights_path(stem.as_ref());
    format
        .record(model, weights.clone())
        .map_err(|e| ModelError::save_checkpoint(weights.display().to_string(), e.to_string()))?;

    let sidecar = config_path(&weights);
    let json = serde_json::to_string_pretty(model.config())?;
    fs::write(&sidecar, json)
        .map_err(|e| ModelError::save_checkpoint(sidecar.display().to_string(), e.to_string()))?;

    info!(
        path = %weights.display(),
        format = format.extension(),
        params = model.num_params(),
        "Saved U-Net checkpoint"
    );

    Ok(weights)
}

/// Reads the configuration sidecar next to a weights file.
///
/// The configuration is returned as written; [`load_unet`] validates it
/// before building.
///
/// # Errors
///
/// Returns [`ModelError::CheckpointNotFound`] if the sidecar is missing and
/// [`ModelError::Serialization`] if it does not parse.
pub fn load_config(weights: impl AsRef<Path>) -> Result<UNetConfig> {
    let sidecar = config_path(weights.as_ref());
    if !sidecar.exists() {
        return Err(ModelError::checkpoint_not_found(
            sidecar.display().to_string(),
        ));
    }
    let json = fs::read_to_string(&sidecar)?;
    serde_json::from_str(&json)
        .map_err(|e| ModelError::serialization(format!("{}: {e}", sidecar.display())))
}

/// Rebuilds a model from a checkpoint written by [`save_unet`].
///
/// # Arguments
///
/// - `weights`: Path to the weights file (with extension)
/// - `device`: Device to load the model onto
///
/// # Errors
///
/// Returns [`ModelError::CheckpointNotFound`] if either file is missing,
/// [`ModelError::UnsupportedFormat`] for a name the recorders cannot read,
/// [`ModelError::InvalidConfig`] or [`ModelError::Types`] if the sidecar
/// describes a network that fails [`UNetConfig::validate`], and
/// [`ModelError::LoadCheckpoint`] if the record does not match the graph.
///
/// # Example
///
/// ```ignore
/// use unet_models::load_unet;
///
/// let model = load_unet::<MyBackend>("runs/unet.bin", &device)?;
/// ```
pub fn load_unet<B: Backend>(weights: impl AsRef<Path>, device: &B::Device) -> Result<UNet<B>> {
    let weights = weights.as_ref();

    if !weights.exists() {
        return Err(ModelError::checkpoint_not_found(
            weights.display().to_string(),
        ));
    }
    let format = CheckpointFormat::detect(weights)?;

    let config = load_config(weights)?;
    let model = UNet::try_new(&config, device)?;

    let loaded = format
        .load(model, weights, device)
        .map_err(|e| ModelError::load_checkpoint(weights.display().to_string(), e.to_string()))?;

    info!(
        path = %weights.display(),
        format = format.extension(),
        "Loaded U-Net checkpoint"
    );

    Ok(loaded)
}
