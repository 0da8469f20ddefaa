//! ResNeXt network.
//!
//! The layer layout follows the pretrained ResNeXt-101 32x4d graph: a 7x7 stem, four
//! stages of grouped bottleneck units and a pooled linear classifier.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::{
    blocks::{kaiming_normal, Stage},
    config::{feature_size, GlobalPool, ResNeXtConfig, FIXED_POOL_SIZE, STAGE_OUT_CHANNELS},
    error::{ResNeXtError, ResNeXtResult},
    head::ClassifierHead,
};

/// Stem: conv 7x7/2 + bn + relu + max-pool 3x3/2.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
}

impl<B: Backend> Stem<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        let out = self.bn.forward(out);
        let out = self.relu.forward(out);
        self.maxpool.forward(out)
    }

    /// Create a new Stem.
    pub fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        // 7x7 conv, stride=2, padding=3
        let conv = Conv2dConfig::new([in_channels, out_channels], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        // 3x3 maxpool, stride=2, padding=1
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            maxpool,
        }
    }
}

/// ResNeXt image classifier.
///
/// Field names are the parameter paths used by the weight loaders
/// (`stem.conv.weight`, `layer3.units.7.residual.conv2.weight`, `head.fc.bias`, ...).
#[derive(Module, Debug)]
pub struct ResNeXt<B: Backend> {
    pub stem: Stem<B>,
    pub layer1: Stage<B>,
    pub layer2: Stage<B>,
    pub layer3: Stage<B>,
    pub layer4: Stage<B>,
    pub head: ClassifierHead<B>,
    in_channels: usize,
}

impl<B: Backend> ResNeXt<B> {
    pub(crate) fn new(config: &ResNeXtConfig, device: &Device<B>) -> Self {
        let stem = Stem::new(config.in_channels, config.stem_channels, device);

        let widths = config.stage_widths();
        let strides = config.stage_strides();
        let inputs = config.stage_in_channels();
        let [layer1, layer2, layer3, layer4] = core::array::from_fn(|i| {
            Stage::new(
                config.layers[i],
                inputs[i],
                widths[i],
                STAGE_OUT_CHANNELS[i],
                strides[i],
                config.cardinality,
                device,
            )
        });

        let head = ClassifierHead::new(
            STAGE_OUT_CHANNELS[3],
            config.num_classes,
            config.global_pool.clone(),
            device,
        );

        Self {
            stem,
            layer1,
            layer2,
            layer3,
            layer4,
            head,
            in_channels: config.in_channels,
        }
    }

    /// Classify a batch of images: `[N, C, H, W]` to `[N, num_classes]` logits.
    ///
    /// # Errors
    ///
    /// Returns [`ResNeXtError::InvalidTensorShape`] if the batch is empty, the channel count
    /// differs from the configuration, or (with [`GlobalPool::Fixed`]) the input does not
    /// reduce to a 7x7 feature map.
    pub fn forward(&self, input: Tensor<B, 4>) -> ResNeXtResult<Tensor<B, 2>> {
        self.check_input(&input)?;
        let [_, _, _, features] = self.forward_features(input)?;
        Ok(self.head.forward(features))
    }

    /// Run the stem and all four stages, returning every stage output
    /// (strides 4, 8, 16 and 32 relative to the input).
    ///
    /// # Errors
    ///
    /// Returns an error if a residual merge fails.
    pub fn forward_features(&self, input: Tensor<B, 4>) -> ResNeXtResult<[Tensor<B, 4>; 4]> {
        let x = self.stem.forward(input);
        let c1 = self.layer1.forward(x)?;
        let c2 = self.layer2.forward(c1.clone())?;
        let c3 = self.layer3.forward(c2.clone())?;
        let c4 = self.layer4.forward(c3.clone())?;

        Ok([c1, c2, c3, c4])
    }

    /// Channel count of each stage output.
    pub const fn output_channels(&self) -> [usize; 4] {
        STAGE_OUT_CHANNELS
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    fn check_input(&self, input: &Tensor<B, 4>) -> ResNeXtResult<()> {
        let [batch, channels, height, width] = input.dims();
        let shape_error = |expected: String| ResNeXtError::InvalidTensorShape {
            expected,
            actual: format!("{:?}", input.dims()),
        };

        if batch == 0 || channels != self.in_channels || height == 0 || width == 0 {
            return Err(shape_error(format!(
                "[batch >= 1, {}, height >= 1, width >= 1]",
                self.in_channels
            )));
        }

        if *self.head.global_pool() == GlobalPool::Fixed {
            let reduced = [height, width].map(feature_size);
            if reduced != [FIXED_POOL_SIZE; 2] {
                return Err(shape_error(format!(
                    "[batch, {}, H, W] reducing to a {FIXED_POOL_SIZE}x{FIXED_POOL_SIZE} feature map (e.g. 224x224), got {}x{} features",
                    self.in_channels, reduced[0], reduced[1]
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::{tiny_config, TestBackend};

    #[test]
    fn tiny_network_classifies_batch() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device).unwrap();

        let input =
            Tensor::<TestBackend, 4>::random([2, 3, 64, 64], Distribution::Normal(0.0, 1.0), &device);
        let logits = model.forward(input).unwrap();

        assert_eq!(logits.dims(), [2, 10]);
    }

    #[test]
    fn features_have_stage_channels_and_strides() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device).unwrap();

        let input =
            Tensor::<TestBackend, 4>::random([1, 3, 64, 64], Distribution::Normal(0.0, 1.0), &device);
        let features = model.forward_features(input).unwrap();

        assert_eq!(features[0].dims(), [1, 256, 16, 16]);
        assert_eq!(features[1].dims(), [1, 512, 8, 8]);
        assert_eq!(features[2].dims(), [1, 1024, 4, 4]);
        assert_eq!(features[3].dims(), [1, 2048, 2, 2]);
        assert_eq!(model.output_channels(), [256, 512, 1024, 2048]);
    }

    #[test]
    fn fixed_pool_rejects_non_224_input() {
        let device = Default::default();
        let model = tiny_config()
            .with_global_pool(GlobalPool::Fixed)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        let err = model.forward(input).unwrap_err();
        assert!(matches!(err, ResNeXtError::InvalidTensorShape { .. }));
        assert!(err.to_string().contains("2x2 features"));
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([1, 1, 64, 64], &device);
        assert!(matches!(
            model.forward(input),
            Err(ResNeXtError::InvalidTensorShape { .. })
        ));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([0, 3, 64, 64], &device);
        assert!(model.forward(input).is_err());
    }

    #[test]
    fn invalid_config_does_not_build() {
        let device = Default::default();
        let result = tiny_config()
            .with_layers([1, 1, 0, 1])
            .init::<TestBackend>(&device);
        assert!(matches!(
            result,
            Err(ResNeXtError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn resnext101_32x4d_layout() {
        let device = Default::default();
        let model = ResNeXtConfig::resnext101_32x4d()
            .init::<TestBackend>(&device)
            .unwrap();

        let units = [
            model.layer1.units().len(),
            model.layer2.units().len(),
            model.layer3.units().len(),
            model.layer4.units().len(),
        ];
        assert_eq!(units, [3, 4, 23, 3]);
        assert_eq!(model.num_classes(), 1000);

        // 44,177,704 learnable weights plus 137,856 BatchNorm running statistics.
        assert_eq!(model.num_params(), 44_315_560);
    }

    #[test]
    fn resnext50_32x4d_parameter_count() {
        let device = Default::default();
        let model = ResNeXtConfig::resnext50_32x4d()
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(model.num_params(), 25_097_128);
    }

    #[test]
    #[ignore = "runs the full 101-layer network on CPU"]
    fn resnext101_32x4d_produces_imagenet_logits() {
        let device = Default::default();
        let model = ResNeXtConfig::resnext101_32x4d()
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 224, 224],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(model.forward(input).unwrap().dims(), [1, 1000]);
    }
}
