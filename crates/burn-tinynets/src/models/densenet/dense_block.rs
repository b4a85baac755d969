//! # `DenseNet` Dense Block
//!
//! A [`DenseBlock`] is a sequence of [`NormActConv2d`] layers chained
//! back to back. Each layer emits `growth_rate` channels, and the
//! block's running channel count advances by `growth_rate` per layer.
//!
//! The running count is a construction-time counter: it sizes each
//! layer's input width and the [`DenseBlockMeta::out_channels`] the
//! next block is built against. The layer outputs are NOT concatenated
//! onto the block input, so the tensor a layer actually receives is
//! the previous layer's `growth_rate`-channel output. The counter and
//! the true tensor width therefore diverge past the first layer; see
//! [`DenseBlock::forward`].
//!
//! [`DenseBlockMeta`] defines a common meta API for [`DenseBlock`]
//! and [`DenseBlockConfig`].

use crate::layers::blocks::norm_act_conv::{
    NormActConv2d, NormActConv2dConfig, NormActConv2dMeta,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Module, Tensor};

/// [`DenseBlock`] Meta API.
pub trait DenseBlockMeta {
    /// The number of internal layers.
    fn len(&self) -> usize;

    /// Check if the dense block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of channels each internal layer contributes.
    fn growth_rate(&self) -> usize;

    /// The running channel count after this block.
    ///
    /// ``out_channels = in_channels + growth_rate * len``
    ///
    /// This is the width downstream construction is sized against.
    /// The tensor the block emits has [`DenseBlockMeta::growth_rate`]
    /// channels.
    fn out_channels(&self) -> usize {
        self.in_channels() + self.growth_rate() * self.len()
    }
}

/// [`DenseBlock`] Configuration.
#[derive(Config, Debug)]
pub struct DenseBlockConfig {
    /// The internal layers.
    pub layers: Vec<NormActConv2dConfig>,
}

impl From<Vec<NormActConv2dConfig>> for DenseBlockConfig {
    fn from(layers: Vec<NormActConv2dConfig>) -> Self {
        Self { layers }
    }
}

impl DenseBlockMeta for DenseBlockConfig {
    fn len(&self) -> usize {
        self.layers.len()
    }

    fn in_channels(&self) -> usize {
        self.layers[0].in_channels()
    }

    fn growth_rate(&self) -> usize {
        self.layers[0].out_channels()
    }
}

impl DenseBlockConfig {
    /// Build a dense block config.
    ///
    /// Layer `i` is sized ``counter -> growth_rate``, where `counter`
    /// starts at `in_channels` and advances by `growth_rate` after
    /// each layer.
    pub fn build(
        in_channels: usize,
        growth_rate: usize,
        num_layers: usize,
    ) -> Self {
        let mut counter = in_channels;
        let layers = (0..num_layers)
            .map(|_| {
                let layer: NormActConv2dConfig =
                    Conv2dConfig::new([counter, growth_rate], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .with_bias(false)
                        .into();
                counter += growth_rate;
                layer
            })
            .collect();

        Self { layers }
    }

    /// Check if the config is valid.
    ///
    /// Validates the counter progression: layer `i` must be sized
    /// ``in_channels + i * growth_rate -> growth_rate``.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("layers is empty".to_string());
        }

        let in_channels = self.in_channels();
        let growth_rate = self.growth_rate();
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_channels() != growth_rate {
                return Err(format!(
                    "layer[{}].out_channels({}) != growth_rate({})\n{:#?}",
                    idx,
                    layer.out_channels(),
                    growth_rate,
                    self,
                ));
            }
            let expected = in_channels + idx * growth_rate;
            if layer.in_channels() != expected {
                return Err(format!(
                    "layer[{}].in_channels({}) != running count({})\n{:#?}",
                    idx,
                    layer.in_channels(),
                    expected,
                    self,
                ));
            }
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

    /// Initialize a new [`DenseBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> DenseBlock<B> {
        self.expect_valid();

        DenseBlock {
            layers: self
                .layers
                .into_iter()
                .map(|layer| layer.init(device))
                .collect(),
        }
    }
}

/// Dense block.
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    /// Internal layers.
    pub layers: Vec<NormActConv2d<B>>,
}

impl<B: Backend> DenseBlockMeta for DenseBlock<B> {
    fn len(&self) -> usize {
        self.layers.len()
    }

    fn in_channels(&self) -> usize {
        self.layers[0].in_channels()
    }

    fn growth_rate(&self) -> usize {
        self.layers[0].out_channels()
    }
}

impl<B: Backend> DenseBlock<B> {
    /// Apply the dense block.
    ///
    /// The layers are applied in sequence; each consumes only the
    /// previous layer's output. With more than one layer, the second
    /// layer is sized for the running count but receives a
    /// `growth_rate`-channel tensor, and the forward pass fails with a
    /// shape error at that layer's input contract.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, growth_rate, height, width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())],
        );

        let x = self.layers.iter().fold(input, |x, layer| layer.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "growth_rate", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("growth_rate", self.growth_rate()),
                ("height", height),
                ("width", width)
            ],
        );

        x
    }
}
