//! Pretrained weight loading for [`ResNeXt`].
//!
//! The pretrained ResNeXt-101 32x4d checkpoint stores parameters under positional names
//! taken from nested sequential containers (`4.0.0.0.0.0.weight`, `10.1.bias`, ...).
//! [`ORIGIN_KEY_REMAP`] rewrites those names to the field paths of [`ResNeXt`] before the
//! record is deserialized. Burn's own record formats are loaded as-is, read from exactly
//! the given path whatever its extension.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::backend::Backend,
};
use burn_import::{
    pytorch::{LoadArgs as PyTorchLoadArgs, PyTorchFileRecorder},
    safetensors::{LoadArgs as SafetensorsLoadArgs, SafetensorsFileRecorder},
};
use resnext_model::{ResNeXt, ResNeXtConfig, ResNeXtError, ResNeXtRecord};
use thiserror::Error;

/// Errors that can occur while loading or saving model weights.
#[derive(Debug, Error)]
pub enum WeightError {
    /// The weight file does not exist.
    #[error("weight file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file could not be read as a record of the model.
    #[error("failed to load model weights: {reason}")]
    ModelLoadError { reason: String },

    /// The record could not be written.
    #[error("failed to save model weights: {reason}")]
    SaveError { reason: String },

    /// The model could not be built from its configuration.
    #[error(transparent)]
    Model(#[from] ResNeXtError),
}

/// Supported weight file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// PyTorch .pt or .pth files
    PyTorch,
    /// SafeTensors .safetensors files
    SafeTensors,
    /// Burn MessagePack .mpk files
    MessagePack,
    /// Burn Binary .bin files
    Binary,
    /// Try every format in turn
    Auto,
}

impl WeightFormat {
    /// Detect format from file path
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("pt" | "pth") => Self::PyTorch,
            Some("safetensors") => Self::SafeTensors,
            Some("mpk") => Self::MessagePack,
            Some("bin") => Self::Binary,
            _ => Self::Auto,
        }
    }
}

/// Parameter-name rewrites from the pretrained checkpoint layout to [`ResNeXt`] fields.
///
/// Applied in order, each to the result of the previous one. Stage units in the checkpoint
/// are `<stage>.<unit>.0.<branch>...`, where branch 0 is the bottleneck and branch 1 the
/// projection shortcut; identity shortcuts carry no parameters.
pub const ORIGIN_KEY_REMAP: &[(&str, &str)] = &[
    // Re-packaged checkpoints wrap the trunk in `features` and rename the classifier.
    (r"^features\.(.+)", "$1"),
    (r"^last_linear\.(.+)", "head.fc.$1"),
    // Classifier: index 10 is (reshape, linear).
    (r"^10\.1\.(.+)", "head.fc.$1"),
    // Stem
    (r"^0\.(.+)", "stem.conv.$1"),
    (r"^1\.(.+)", "stem.bn.$1"),
    // Stages
    (r"^4\.(.+)", "layer1.$1"),
    (r"^5\.(.+)", "layer2.$1"),
    (r"^6\.(.+)", "layer3.$1"),
    (r"^7\.(.+)", "layer4.$1"),
    // Bottleneck branch
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.0\.0\.0\.(.+)",
        "$1.units.$2.residual.conv1.$3",
    ),
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.0\.0\.1\.(.+)",
        "$1.units.$2.residual.bn1.$3",
    ),
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.0\.0\.3\.(.+)",
        "$1.units.$2.residual.conv2.$3",
    ),
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.0\.0\.4\.(.+)",
        "$1.units.$2.residual.bn2.$3",
    ),
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.0\.1\.(.+)",
        "$1.units.$2.residual.conv3.$3",
    ),
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.0\.2\.(.+)",
        "$1.units.$2.residual.bn3.$3",
    ),
    // Projection shortcut
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.1\.0\.(.+)",
        "$1.units.$2.shortcut.conv.$3",
    ),
    (
        r"^(layer[1-4])\.([0-9]+)\.0\.1\.1\.(.+)",
        "$1.units.$2.shortcut.bn.$3",
    ),
];

/// Loads [`ResNeXt`] records from a weight file.
#[derive(Debug, Clone)]
pub struct WeightLoader {
    path: PathBuf,
    format: WeightFormat,
}

impl WeightLoader {
    /// Create a loader whose format is detected from the file extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = WeightFormat::from_path(&path);
        Self { path, format }
    }

    /// Override the detected format.
    #[must_use]
    pub const fn with_format(mut self, format: WeightFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn format(&self) -> WeightFormat {
        self.format
    }

    /// Load the record stored in the weight file.
    ///
    /// # Errors
    ///
    /// Returns [`WeightError::NotFound`] if the file is missing and
    /// [`WeightError::ModelLoadError`] if it cannot be read as a ResNeXt record. With
    /// [`WeightFormat::Auto`] the error of the last format tried is returned.
    pub fn load_record<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNeXtRecord<B>, WeightError> {
        if !self.path.exists() {
            return Err(WeightError::NotFound {
                path: self.path.clone(),
            });
        }

        tracing::debug!(path = %self.path.display(), format = ?self.format, "loading weights");

        match self.format {
            WeightFormat::PyTorch => self.load_pytorch_record(device),
            WeightFormat::SafeTensors => self.load_safetensors_record(device),
            WeightFormat::MessagePack => self.load_messagepack_record(device),
            WeightFormat::Binary => self.load_binary_record(device),
            WeightFormat::Auto => self.load_any_record(device),
        }
    }

    /// Load the weight file into `model`.
    ///
    /// # Errors
    ///
    /// See [`WeightLoader::load_record`].
    pub fn load_model<B: Backend>(
        &self,
        model: ResNeXt<B>,
        device: &B::Device,
    ) -> Result<ResNeXt<B>, WeightError> {
        let record = self.load_record(device)?;
        Ok(model.load_record(record))
    }

    fn load_any_record<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNeXtRecord<B>, WeightError> {
        type Loader<B> =
            fn(&WeightLoader, &<B as Backend>::Device) -> Result<ResNeXtRecord<B>, WeightError>;

        let loaders: [(WeightFormat, Loader<B>); 4] = [
            (WeightFormat::PyTorch, Self::load_pytorch_record::<B>),
            (WeightFormat::SafeTensors, Self::load_safetensors_record::<B>),
            (WeightFormat::MessagePack, Self::load_messagepack_record::<B>),
            (WeightFormat::Binary, Self::load_binary_record::<B>),
        ];

        let mut last_error = None;
        for (format, load) in loaders {
            match load(self, device) {
                Ok(record) => {
                    tracing::debug!(?format, "weight format detected");
                    return Ok(record);
                }
                Err(e) => {
                    tracing::debug!(?format, error = %e, "weight format rejected");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WeightError::ModelLoadError {
            reason: "no weight format matched".to_string(),
        }))
    }

    fn load_pytorch_record<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNeXtRecord<B>, WeightError> {
        let load_args = ORIGIN_KEY_REMAP.iter().fold(
            PyTorchLoadArgs::new(self.path.clone()),
            |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
        );

        PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args, device)
            .map_err(|e| WeightError::ModelLoadError {
                reason: format!("PyTorch record loading failed: {e}"),
            })
    }

    fn load_safetensors_record<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNeXtRecord<B>, WeightError> {
        let load_args = ORIGIN_KEY_REMAP.iter().fold(
            SafetensorsLoadArgs::new(self.path.clone()),
            |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
        );

        SafetensorsFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args, device)
            .map_err(|e| WeightError::ModelLoadError {
                reason: format!("Safetensors record loading failed: {e}"),
            })
    }

    // Burn's file recorders swap in their own extension, so Burn records are read as bytes.
    fn read_bytes(&self) -> Result<Vec<u8>, WeightError> {
        std::fs::read(&self.path).map_err(|e| WeightError::ModelLoadError {
            reason: format!("failed to read {}: {e}", self.path.display()),
        })
    }

    fn load_messagepack_record<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNeXtRecord<B>, WeightError> {
        let bytes = self.read_bytes()?;
        Recorder::<B>::load(
            &NamedMpkBytesRecorder::<FullPrecisionSettings>::default(),
            bytes,
            device,
        )
        .map_err(|e| WeightError::ModelLoadError {
            reason: format!("MessagePack record loading failed: {e}"),
        })
    }

    fn load_binary_record<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNeXtRecord<B>, WeightError> {
        let bytes = self.read_bytes()?;
        Recorder::<B>::load(
            &BinBytesRecorder::<FullPrecisionSettings>::default(),
            bytes,
            device,
        )
        .map_err(|e| WeightError::ModelLoadError {
            reason: format!("Binary record loading failed: {e}"),
        })
    }
}

/// Extension trait giving [`ResNeXt`] convenient weight I/O.
pub trait ResNeXtWeightLoading<B: Backend>: Sized {
    /// Replace the parameters of `self` with those stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or does not match the model.
    fn load_weights(self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self, WeightError>;

    /// Build a model from `config` and load the weights stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the weights cannot be loaded.
    fn from_weights(
        config: &ResNeXtConfig,
        path: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<Self, WeightError>;

    /// Write the parameters of `self` to `path` as a Burn named MessagePack record.
    ///
    /// # Errors
    ///
    /// Returns [`WeightError::SaveError`] if the record cannot be written.
    fn save_weights(&self, path: impl AsRef<Path>) -> Result<(), WeightError>;
}

impl<B: Backend> ResNeXtWeightLoading<B> for ResNeXt<B> {
    fn load_weights(self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self, WeightError> {
        WeightLoader::new(path.as_ref()).load_model(self, device)
    }

    fn from_weights(
        config: &ResNeXtConfig,
        path: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<Self, WeightError> {
        let model = config.init(device)?;
        model.load_weights(path, device)
    }

    fn save_weights(&self, path: impl AsRef<Path>) -> Result<(), WeightError> {
        let path = path.as_ref();
        let bytes = Recorder::<B>::record(
            &NamedMpkBytesRecorder::<FullPrecisionSettings>::default(),
            self.clone().into_record(),
            (),
        )
        .map_err(|e| WeightError::SaveError {
            reason: format!("{e}"),
        })?;

        std::fs::write(path, bytes).map_err(|e| WeightError::SaveError {
            reason: format!("failed to write {}: {e}", path.display()),
        })
    }
}
