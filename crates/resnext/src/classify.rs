use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use resnext_model::{
    feature_size, GlobalPool, ResNeXt, ResNeXtConfig, DEFAULT_IMAGE_SIZE, FIXED_POOL_SIZE,
};
use resnext_util::{
    is_supported_image_format, open_image, preprocess, top_k, Labels, ResNeXtWeightLoading,
    MAX_CROP_SIZE,
};
use walkdir::WalkDir;

/// Number of predictions reported per image unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 5;

/// Classification configuration.
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    /// Input path (file or directory).
    pub input_path: PathBuf,
    /// Weight file. Without one the network keeps its random initialization.
    pub weights: Option<PathBuf>,
    /// Class name file, one name per line.
    pub labels: Option<PathBuf>,
    /// Predictions kept per image.
    pub top_k: usize,
    /// Side of the center crop fed to the network.
    pub image_size: u32,
    pub model_config: ResNeXtConfig,
}

impl ClassifyConfig {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            weights: None,
            labels: None,
            top_k: DEFAULT_TOP_K,
            image_size: DEFAULT_IMAGE_SIZE as u32,
            model_config: ResNeXtConfig::new(),
        }
    }

    #[must_use]
    pub fn with_weights(mut self, weights: Option<PathBuf>) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: Option<PathBuf>) -> Self {
        self.labels = labels;
        self
    }

    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub const fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }

    #[must_use]
    pub fn with_model_config(mut self, model_config: ResNeXtConfig) -> Self {
        self.model_config = model_config;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            anyhow::bail!("top-k must be at least 1");
        }
        if self.image_size == 0 || self.image_size > MAX_CROP_SIZE {
            anyhow::bail!(
                "image size {} must be between 1 and {MAX_CROP_SIZE}",
                self.image_size
            );
        }

        let reduced = feature_size(self.image_size as usize);
        if self.model_config.global_pool == GlobalPool::Fixed && reduced != FIXED_POOL_SIZE {
            anyhow::bail!(
                "image size {} gives a {reduced}x{reduced} final feature map but the fixed \
                 {FIXED_POOL_SIZE}x{FIXED_POOL_SIZE} pool needs {DEFAULT_IMAGE_SIZE}; \
                 use adaptive pooling for other sizes",
                self.image_size
            );
        }

        Ok(())
    }
}

/// A ranked class with its display label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPrediction {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
}

/// Predictions for one image.
#[derive(Debug, Clone)]
pub struct ImageClassification {
    pub path: PathBuf,
    pub predictions: Vec<LabeledPrediction>,
}

/// Classifies an image or every supported image under a directory.
///
/// Directory entries are visited recursively in file-name order. An image that fails to
/// load or classify is logged and skipped.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the model or its weights cannot be
/// loaded, the label file cannot be read, the input path does not exist, or a single input
/// image fails.
pub fn run_classification<B: Backend>(
    config: &ClassifyConfig,
    device: &B::Device,
) -> Result<Vec<ImageClassification>> {
    tracing::info!(
        input = %config.input_path.display(),
        weights = ?config.weights,
        top_k = config.top_k,
        image_size = config.image_size,
        "running classification",
    );

    config.validate()?;

    let model = load_model::<B>(config, device)?;

    let labels = match &config.labels {
        Some(path) => Labels::from_file(path)?,
        None => Labels::default(),
    };
    if !labels.is_empty() && labels.len() != model.num_classes() {
        tracing::warn!(
            labels = labels.len(),
            classes = model.num_classes(),
            "label count does not match classifier outputs",
        );
    }

    let results = if config.input_path.is_file() {
        vec![classify_image(&model, &config.input_path, &labels, config, device)?]
    } else if config.input_path.is_dir() {
        classify_directory(&model, &config.input_path, &labels, config, device)
    } else {
        anyhow::bail!(
            "Input path does not exist: {}",
            config.input_path.display()
        );
    };

    tracing::info!(images = results.len(), "classification completed");
    Ok(results)
}

fn load_model<B: Backend>(config: &ClassifyConfig, device: &B::Device) -> Result<ResNeXt<B>> {
    tracing::info!("building model");
    let model = config.model_config.init::<B>(device)?;

    match &config.weights {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading weights");
            let model = model
                .load_weights(path, device)
                .with_context(|| format!("failed to load weights from {}", path.display()))?;
            tracing::info!("model loaded successfully");
            Ok(model)
        }
        None => {
            tracing::warn!("no weights given, using randomly initialized parameters");
            Ok(model)
        }
    }
}

fn classify_image<B: Backend>(
    model: &ResNeXt<B>,
    path: &Path,
    labels: &Labels,
    config: &ClassifyConfig,
    device: &B::Device,
) -> Result<ImageClassification> {
    tracing::debug!(path = %path.display(), "processing image");

    let image = open_image(path)?;
    let input = preprocess::<B>(&image, config.image_size, device)?;
    let logits = model.forward(input)?;

    let predictions = top_k(logits, config.top_k)?
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|prediction| LabeledPrediction {
            class_index: prediction.class_index,
            label: labels.name(prediction.class_index).into_owned(),
            probability: prediction.probability,
        })
        .collect::<Vec<_>>();

    if let Some(best) = predictions.first() {
        tracing::info!(
            path = %path.display(),
            class = best.class_index,
            label = %best.label,
            probability = best.probability,
            "classified image",
        );
    }

    Ok(ImageClassification {
        path: path.to_path_buf(),
        predictions,
    })
}

fn classify_directory<B: Backend>(
    model: &ResNeXt<B>,
    input_dir: &Path,
    labels: &Labels,
    config: &ClassifyConfig,
    device: &B::Device,
) -> Vec<ImageClassification> {
    let mut results = Vec::new();

    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(error = %e, "failed to read directory entry");
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported_image_format(path) {
            continue;
        }

        match classify_image(model, path, labels, config, device) {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to process image");
            }
        }
    }

    results
}
