//! Configuration for the ResNeXt network.
//!
//! The defaults describe ResNeXt-101 32x4d. Every derived quantity (bottleneck widths,
//! stage strides, the spatial size reaching the classifier) is computed here so that the
//! model code only wires layers together.

use core::{fmt, str::FromStr};

use burn::prelude::*;

use crate::{
    error::{ResNeXtError, ResNeXtResult},
    model::ResNeXt,
};

/// Output channels of the four stages (bottleneck expansion of 4 over a 64-channel base).
pub const STAGE_OUT_CHANNELS: [usize; 4] = [256, 512, 1024, 2048];

/// Side of the final feature map expected by the fixed 7x7 average pool.
pub const FIXED_POOL_SIZE: usize = 7;

/// Side of the input image that yields a 7x7 final feature map.
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// Number of stride-2 reductions between the input and the last stage: the stem conv,
/// the stem max pool and the first unit of stages 2 to 4.
const SPATIAL_REDUCTIONS: usize = 5;

/// Spatial size of the final feature map for an input side of `size` pixels.
pub fn feature_size(size: usize) -> usize {
    (0..SPATIAL_REDUCTIONS).fold(size, |side, _| side.saturating_sub(1) / 2 + 1)
}

/// Global pooling applied before the classifier.
#[derive(Config, Debug, PartialEq, Eq, Hash)]
pub enum GlobalPool {
    /// 7x7 average pool with stride 1, the pretrained network's head.
    /// Only a 7x7 final feature map (224x224 input) yields a single feature vector.
    Fixed,
    /// Adaptive average pool to 1x1, accepting any input resolution.
    Adaptive,
}

impl Default for GlobalPool {
    fn default() -> Self {
        Self::Fixed
    }
}

/// ResNeXt architecture hyperparameters.
#[derive(Config, Debug)]
pub struct ResNeXtConfig {
    /// Residual units in each of the four stages.
    #[config(default = "[3, 4, 23, 3]")]
    pub layers: [usize; 4],
    /// Number of groups in every 3x3 convolution.
    #[config(default = "32")]
    pub cardinality: usize,
    /// Channels per group in the first stage; doubles with every stage.
    #[config(default = "4")]
    pub base_width: usize,
    /// Number of classifier outputs.
    #[config(default = "1000")]
    pub num_classes: usize,
    /// Channels of the input image.
    #[config(default = "3")]
    pub in_channels: usize,
    /// Output channels of the 7x7 stem convolution.
    #[config(default = "64")]
    pub stem_channels: usize,
    /// Pooling between the last stage and the classifier.
    #[config(default = "GlobalPool::Fixed")]
    pub global_pool: GlobalPool,
}

impl ResNeXtConfig {
    /// ResNeXt-101 with 32 groups of width 4.
    pub fn resnext101_32x4d() -> Self {
        Self::new()
    }

    /// ResNeXt-50 with 32 groups of width 4.
    pub fn resnext50_32x4d() -> Self {
        Self::new().with_layers([3, 4, 6, 3])
    }

    /// ResNeXt-101 with 32 groups of width 8.
    pub fn resnext101_32x8d() -> Self {
        Self::new().with_base_width(8)
    }

    /// Bottleneck width of each stage: `cardinality * base_width * 2^stage`.
    pub fn stage_widths(&self) -> [usize; 4] {
        core::array::from_fn(|stage| (self.cardinality * self.base_width) << stage)
    }

    /// Stride of the first unit of each stage.
    pub const fn stage_strides(&self) -> [usize; 4] {
        [1, 2, 2, 2]
    }

    /// Input channels of each stage.
    pub fn stage_in_channels(&self) -> [usize; 4] {
        [
            self.stem_channels,
            STAGE_OUT_CHANNELS[0],
            STAGE_OUT_CHANNELS[1],
            STAGE_OUT_CHANNELS[2],
        ]
    }

    /// Check that the configuration describes a buildable network.
    ///
    /// # Errors
    ///
    /// Returns [`ResNeXtError::InvalidConfiguration`] naming the first offending field.
    pub fn validate(&self) -> ResNeXtResult<()> {
        let positive = [
            ("cardinality", self.cardinality),
            ("base_width", self.base_width),
            ("num_classes", self.num_classes),
            ("in_channels", self.in_channels),
            ("stem_channels", self.stem_channels),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ResNeXtError::InvalidConfiguration {
                    reason: format!("{name} must be at least 1"),
                });
            }
        }

        if let Some(stage) = self.layers.iter().position(|&units| units == 0) {
            return Err(ResNeXtError::InvalidConfiguration {
                reason: format!("stage {} must contain at least one residual unit", stage + 1),
            });
        }

        for (stage, width) in self.stage_widths().into_iter().enumerate() {
            if width % self.cardinality != 0 {
                return Err(ResNeXtError::InvalidConfiguration {
                    reason: format!(
                        "stage {} width {width} is not divisible by cardinality {}",
                        stage + 1,
                        self.cardinality
                    ),
                });
            }
        }

        Ok(())
    }

    /// Build a randomly initialized network on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if [`ResNeXtConfig::validate`] rejects the configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNeXtResult<ResNeXt<B>> {
        self.validate()?;
        Ok(ResNeXt::new(self, device))
    }
}

/// Named ResNeXt presets.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResNeXtVariant {
    /// ResNeXt-101 32x4d.
    ResNeXt101_32x4d,
    /// ResNeXt-50 32x4d.
    ResNeXt50_32x4d,
    /// ResNeXt-101 32x8d.
    ResNeXt101_32x8d,
}

impl ResNeXtVariant {
    /// All presets, in display order.
    pub const ALL: [Self; 3] = [
        Self::ResNeXt101_32x4d,
        Self::ResNeXt50_32x4d,
        Self::ResNeXt101_32x8d,
    ];

    pub fn config(self) -> ResNeXtConfig {
        match self {
            Self::ResNeXt101_32x4d => ResNeXtConfig::resnext101_32x4d(),
            Self::ResNeXt50_32x4d => ResNeXtConfig::resnext50_32x4d(),
            Self::ResNeXt101_32x8d => ResNeXtConfig::resnext101_32x8d(),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::ResNeXt101_32x4d => "101_32x4d",
            Self::ResNeXt50_32x4d => "50_32x4d",
            Self::ResNeXt101_32x8d => "101_32x8d",
        }
    }
}

impl Default for ResNeXtVariant {
    fn default() -> Self {
        Self::ResNeXt101_32x4d
    }
}

impl fmt::Display for ResNeXtVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResNeXtVariant {
    type Err = ResNeXtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = name.strip_prefix("resnext").unwrap_or(&name);
        let name = name.trim_start_matches(['-', '_']);
        Self::ALL
            .into_iter()
            .find(|variant| variant.as_str() == name)
            .ok_or_else(|| ResNeXtError::InvalidConfiguration {
                reason: format!(
                    "unknown variant '{s}' (expected one of: {})",
                    Self::ALL.map(Self::as_str).join(", ")
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_resnext101_32x4d() {
        let config = ResNeXtConfig::new();
        assert_eq!(config.layers, [3, 4, 23, 3]);
        assert_eq!(config.cardinality, 32);
        assert_eq!(config.base_width, 4);
        assert_eq!(config.num_classes, 1000);
        assert_eq!(config.global_pool, GlobalPool::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stage_widths_follow_group_layout() {
        assert_eq!(
            ResNeXtConfig::resnext101_32x4d().stage_widths(),
            [128, 256, 512, 1024]
        );
        assert_eq!(
            ResNeXtConfig::resnext101_32x8d().stage_widths(),
            [256, 512, 1024, 2048]
        );
    }

    #[test]
    fn stage_inputs_chain_previous_outputs() {
        let config = ResNeXtConfig::new();
        assert_eq!(config.stage_in_channels(), [64, 256, 512, 1024]);
    }

    #[test]
    fn feature_size_matches_network_downsampling() {
        assert_eq!(feature_size(DEFAULT_IMAGE_SIZE), FIXED_POOL_SIZE);
        assert_eq!(feature_size(256), 8);
        assert_eq!(feature_size(225), 8);
        assert_eq!(feature_size(32), 1);
        assert_eq!(feature_size(1), 1);
    }

    #[test]
    fn validate_rejects_empty_stage() {
        let config = ResNeXtConfig::new().with_layers([3, 0, 23, 3]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stage 2"));
    }

    #[test]
    fn validate_rejects_zero_cardinality() {
        let config = ResNeXtConfig::new().with_cardinality(0);
        assert!(matches!(
            config.validate(),
            Err(ResNeXtError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_classes() {
        let err = ResNeXtConfig::new()
            .with_num_classes(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("num_classes"));
    }

    #[test]
    fn variants_parse_from_names() {
        assert_eq!(
            "101_32x4d".parse::<ResNeXtVariant>().unwrap(),
            ResNeXtVariant::ResNeXt101_32x4d
        );
        assert_eq!(
            "resnext50_32x4d".parse::<ResNeXtVariant>().unwrap(),
            ResNeXtVariant::ResNeXt50_32x4d
        );
        assert_eq!(
            "ResNeXt-101_32x8d".parse::<ResNeXtVariant>().unwrap(),
            ResNeXtVariant::ResNeXt101_32x8d
        );
        assert!("152_64x4d".parse::<ResNeXtVariant>().is_err());
    }

    #[test]
    fn variant_display_round_trips() {
        for variant in ResNeXtVariant::ALL {
            assert_eq!(variant.to_string().parse::<ResNeXtVariant>().unwrap(), variant);
        }
    }

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resnext.json");

        let config = ResNeXtConfig::resnext50_32x4d().with_global_pool(GlobalPool::Adaptive);
        config.save(&path).unwrap();
        let loaded = ResNeXtConfig::load(&path).unwrap();

        assert_eq!(loaded.layers, [3, 4, 6, 3]);
        assert_eq!(loaded.global_pool, GlobalPool::Adaptive);
        assert_eq!(loaded.cardinality, config.cardinality);
    }
}
