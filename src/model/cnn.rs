//! Custom CNN Architecture
//!
//! Wires the augmentation, preprocessing and convolutional blocks into a
//! classifier:
//!
//! ```text
//! augmentation -> preprocessing -> conv blocks -> flatten
//!     -> dense (ReLU) ... -> dropout -> output
//! ```

use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{
        activation::{sigmoid, softmax},
        backend::Backend,
        Tensor,
    },
};
use tracing::debug;

use super::augmentation::DataAugmentation;
use super::blocks::{ConvBlock, PreprocessingBlock};
use super::config::{ModelConfig, OutputActivation};
use crate::utils::error::Result;

/// Image classifier assembled from a [`ModelConfig`]
#[derive(Module, Debug)]
pub struct CustomCnn<B: Backend> {
    pub augmentation: DataAugmentation,
    pub preprocessing: PreprocessingBlock,
    pub conv_blocks: Vec<ConvBlock<B>>,
    pub dense: Vec<Linear<B>>,
    pub dropout: Option<Dropout>,
    pub output: Linear<B>,
    num_classes: usize,
    sigmoid_output: bool,
}

impl<B: Backend> CustomCnn<B> {
    /// Validate `config` and build the model on `device`
    pub fn new(config: &ModelConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let augmentation = config.augmentation.init();
        let preprocessing = config.preprocessing.init();

        let mut in_channels = config.input_shape.channels;
        let mut conv_blocks = Vec::with_capacity(config.conv_blocks.len());
        for block in &config.conv_blocks {
            debug!(
                "Building block '{}': {} -> {} channels",
                block.name, in_channels, block.filters
            );
            conv_blocks.push(block.init(in_channels, device));
            in_channels = block.filters;
        }

        let mut features = config.flattened_features()?;
        let mut dense = Vec::with_capacity(config.dense_units.len());
        for &units in &config.dense_units {
            dense.push(LinearConfig::new(features, units).init(device));
            features = units;
        }

        let dropout =
            (config.dropout_rate > 0.0).then(|| DropoutConfig::new(config.dropout_rate).init());

        let head = config.output_head();
        let output = LinearConfig::new(features, head.units).init(device);

        Ok(Self {
            augmentation,
            preprocessing,
            conv_blocks,
            dense,
            dropout,
            output,
            num_classes: config.num_classes,
            sigmoid_output: head.activation == OutputActivation::Sigmoid,
        })
    }

    /// Forward pass returning the output layer's pre-activation values
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape `[batch_size, channels, height, width]`
    ///
    /// # Returns
    /// * Tensor of shape `[batch_size, units]`, where `units` is 1 for binary
    ///   problems and `num_classes` otherwise
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.augmentation.forward(x);
        let x = self.preprocessing.forward(x);

        let x = self
            .conv_blocks
            .iter()
            .fold(x, |x, block| block.forward(x));

        let mut x: Tensor<B, 2> = x.flatten(1, 3);
        for layer in &self.dense {
            x = Relu::new().forward(layer.forward(x));
        }

        if let Some(dropout) = &self.dropout {
            x = dropout.forward(x);
        }

        self.output.forward(x)
    }

    /// Forward pass with the output activation applied (sigmoid for binary
    /// problems, softmax otherwise)
    pub fn forward_classification(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        match self.output_activation() {
            OutputActivation::Sigmoid => sigmoid(logits),
            OutputActivation::Softmax => softmax(logits, 1),
        }
    }

    pub fn output_activation(&self) -> OutputActivation {
        if self.sigmoid_output {
            OutputActivation::Sigmoid
        } else {
            OutputActivation::Softmax
        }
    }

    /// Get the number of classes the model was built for
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
