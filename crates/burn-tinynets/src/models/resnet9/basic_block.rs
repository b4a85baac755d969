//! # Basic Block for `ResNet9`
//!
//! [`BasicBlock`] is the core `ResNet9` convolution unit: two 3x3
//! [`ConvNorm2d`] blocks with a [`Relu`] between them. The first conv
//! carries the block stride.
//!
//! The block output is the raw second conv/norm result. No identity
//! shortcut is added to it, and no activation follows it.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::Conv2dConfig;
use burn::nn::{PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicBlock`] Meta API.
pub trait BasicBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// The stride of the first convolution.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// The input must be a multiple of the stride.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        unpack_shape_contract!(
            [
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input_resolution,
            &["out_height", "out_width"],
            &[("stride", self.stride())]
        )
    }
}

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The number of input feature planes.
    pub in_planes: usize,

    /// The number of output feature planes.
    pub planes: usize,

    /// The stride of the first convolution.
    #[config(default = 1)]
    pub stride: usize,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BasicBlockConfig {
    /// Initialize a [`BasicBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let cn1: ConvNorm2dConfig = Conv2dConfig::new([self.in_planes, self.planes], [3, 3])
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .into();

        let cn2: ConvNorm2dConfig = Conv2dConfig::new([self.planes, self.planes], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .into();

        BasicBlock {
            cn1: cn1.init(device),
            act: Relu::new(),
            cn2: cn2.init(device),
        }
    }
}

/// Basic Block for `ResNet9`.
///
/// The data path is ``conv/norm/relu/conv/norm``; the block input is
/// not added back onto the output.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// First Conv/Norm block; carries the stride.
    pub cn1: ConvNorm2d<B>,

    /// Activation between the two Conv/Norm blocks.
    pub act: Relu,

    /// Second Conv/Norm block; always stride 1.
    pub cn2: ConvNorm2d<B>,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.cn1.in_channels()
    }

    fn out_planes(&self) -> usize {
        self.cn2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cn1.stride()[0]
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let x = self.cn1.forward(input);
        let x = self.act.forward(x);
        let x = self.cn2.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_basic_block_config() {
        let config = BasicBlockConfig::new(16, 32);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_resolution([16, 16]), [16, 16]);

        let config = config.with_stride(2);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
    }

    #[test]
    #[should_panic(expected = "7 !~ in_height=(out_height*stride)")]
    fn test_basic_block_config_resolution_panic() {
        let config = BasicBlockConfig::new(16, 32).with_stride(2);
        config.output_resolution([7, 7]);
    }

    #[test]
    fn test_basic_block_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 4;
        let planes = 8;
        let in_height = 8;
        let in_width = 8;

        let block: BasicBlock<B> = BasicBlockConfig::new(in_planes, planes)
            .with_stride(2)
            .init(&device);

        assert_eq!(block.in_planes(), in_planes);
        assert_eq!(block.out_planes(), planes);
        assert_eq!(block.stride(), 2);
        assert_eq!(block.output_resolution([in_height, in_width]), [4, 4]);

        let input = Tensor::ones([batch_size, in_planes, in_height, in_width], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }

    #[test]
    fn test_basic_block_no_shortcut() {
        type B = NdArray<f32>;
        let device = Default::default();

        let planes = 4;

        let block: BasicBlock<B> = BasicBlockConfig::new(planes, planes).init(&device);

        let input = Tensor::random([2, planes, 8, 8], Distribution::Default, &device);
        let output = block.forward(input.clone());

        // The output is exactly cn2(act(cn1(x))); the input is not added back.
        let expected = {
            let x = block.cn1.forward(input);
            let x = block.act.forward(x);
            block.cn2.forward(x)
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
