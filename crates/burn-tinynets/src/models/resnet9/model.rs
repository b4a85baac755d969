//! # `ResNet9` Core Model
//!
//! [`ResNet9Config`] implements [`Config`], and provides
//! [`ResNet9Config::init`] to initialize a [`ResNet9`].
//!
//! [`ResNet9`] implements [`Module`], and provides
//! [`ResNet9::forward`].

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig};
use crate::models::resnet9::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Tensor};

/// `ResNet9` stage depths.
pub const RESNET9_BLOCKS: [usize; 4] = [2, 2, 2, 2];

/// `ResNet9` stage output widths.
pub const RESNET9_STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// `ResNet9` stage strides.
pub const RESNET9_STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// Number of channels produced by the stem convolution.
pub const RESNET9_STEM_PLANES: usize = 64;

/// [`ResNet9`] Configuration.
#[derive(Config, Debug)]
pub struct ResNet9Config {
    /// Number of classification classes.
    pub num_classes: usize,
}

impl ResNet9Config {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be positive".to_string());
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

    /// Initialize a [`ResNet9`] model.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNet9<B> {
        self.expect_valid();

        // 3x3 conv, 64, /1
        let stem: ConvNorm2dConfig = Conv2dConfig::new([3, RESNET9_STEM_PLANES], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .into();

        // Stages; the running input width is threaded through
        // construction rather than held as builder state.
        let mut in_planes = RESNET9_STEM_PLANES;
        let mut stage = |idx: usize| {
            let layer = LayerBlockConfig::build(
                RESNET9_BLOCKS[idx],
                in_planes,
                RESNET9_STAGE_PLANES[idx],
                RESNET9_STAGE_STRIDES[idx],
            );
            in_planes = layer.out_planes();
            layer
        };
        let layer1 = stage(0);
        let layer2 = stage(1);
        let layer3 = stage(2);
        let layer4 = stage(3);

        // Average pooling [B, 512, H, W] -> [B, 512, 1, 1]
        let avgpool = AdaptiveAvgPool2dConfig::new([1, 1]);

        // Output layer
        let fc = LinearConfig::new(in_planes, self.num_classes);

        ResNet9 {
            stem: stem.init(device),
            act: Relu::new(),

            layer1: layer1.init(device),
            layer2: layer2.init(device),
            layer3: layer3.init(device),
            layer4: layer4.init(device),

            avgpool: avgpool.init(),
            fc: fc.init(device),
        }
    }
}

/// `ResNet9` model.
#[derive(Module, Debug)]
pub struct ResNet9<B: Backend> {
    /// Stem Conv/Norm block.
    pub stem: ConvNorm2d<B>,
    /// Stem activation.
    pub act: Relu,

    /// Stage 1; 64 planes.
    pub layer1: LayerBlock<B>,
    /// Stage 2; 128 planes.
    pub layer2: LayerBlock<B>,
    /// Stage 3; 256 planes.
    pub layer3: LayerBlock<B>,
    /// Stage 4; 512 planes.
    pub layer4: LayerBlock<B>,

    /// Global average pooling.
    pub avgpool: AdaptiveAvgPool2d,
    /// Classification head.
    pub fc: Linear<B>,
}

impl<B: Backend> ResNet9<B> {
    /// `ResNet9` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, 3, height, width]`` image tensor. The
    ///   spatial dimensions must survive the three stride-2 stages.
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

        // Stages
        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

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
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_resnet9_config_validation() {
        assert!(ResNet9Config::new(10).try_validate().is_ok());
        assert!(ResNet9Config::new(0).try_validate().is_err());
    }

    #[test]
    #[should_panic(expected = "num_classes must be positive")]
    fn test_resnet9_init_zero_classes() {
        type B = NdArray<f32>;
        let device = Default::default();

        let _model: ResNet9<B> = ResNet9Config::new(0).init(&device);
    }

    #[test]
    fn test_resnet9_structure() {
        type B = NdArray<f32>;
        let device = Default::default();

        let num_classes = 10;
        let model: ResNet9<B> = ResNet9Config::new(num_classes).init(&device);

        assert_eq!(model.layer1.in_planes(), 64);
        assert_eq!(model.layer1.out_planes(), 64);
        assert_eq!(model.layer2.in_planes(), 64);
        assert_eq!(model.layer2.out_planes(), 128);
        assert_eq!(model.layer3.in_planes(), 128);
        assert_eq!(model.layer3.out_planes(), 256);
        assert_eq!(model.layer4.in_planes(), 256);
        assert_eq!(model.layer4.out_planes(), 512);

        assert_eq!(model.fc.weight.shape().dims, [512, num_classes]);
    }

    #[test]
    fn test_resnet9_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let num_classes = 10;
        let model: ResNet9<B> = ResNet9Config::new(num_classes).init(&device);

        let input = Tensor::ones([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 2), ("num_classes", num_classes)],
        );
    }

    #[test]
    fn test_resnet9_forward_batch_size() {
        type B = NdArray<f32>;
        let device = Default::default();

        let num_classes = 4;
        let model: ResNet9<B> = ResNet9Config::new(num_classes).init(&device);

        for batch_size in [1, 3] {
            let input = Tensor::ones([batch_size, 3, 32, 32], &device);
            let output = model.forward(input);
            assert_eq!(output.dims(), [batch_size, num_classes]);
        }
    }

    #[test]
    #[should_panic]
    fn test_resnet9_forward_bad_channels() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet9<B> = ResNet9Config::new(10).init(&device);

        let input = Tensor::ones([2, 1, 32, 32], &device);
        let _ = model.forward(input);
    }
}
