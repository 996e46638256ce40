//! Model Summary
//!
//! A layer-by-layer table of output shapes and parameter counts, derived from
//! a [`ModelConfig`] without allocating any weights.

use std::fmt;

use super::blocks::{Activation, Pooling};
use super::config::{ModelConfig, OutputActivation};
use crate::utils::error::Result;
use crate::utils::format_number;

const NAME_WIDTH: usize = 38;
const SHAPE_WIDTH: usize = 26;
const RULE_WIDTH: usize = 76;

/// One row of the summary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub kind: String,
    /// Output shape without the batch axis, `[channels, height, width]` for
    /// image tensors
    pub output_shape: Vec<usize>,
    pub trainable_params: usize,
    pub non_trainable_params: usize,
}

impl LayerSummary {
    fn new(name: impl Into<String>, kind: &str, output_shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            kind: kind.to_string(),
            output_shape: output_shape.to_vec(),
            trainable_params: 0,
            non_trainable_params: 0,
        }
    }

    fn with_params(mut self, trainable: usize, non_trainable: usize) -> Self {
        self.trainable_params = trainable;
        self.non_trainable_params = non_trainable;
        self
    }

    pub fn total_params(&self) -> usize {
        self.trainable_params + self.non_trainable_params
    }

    fn shape_label(&self) -> String {
        let dims: Vec<String> = self.output_shape.iter().map(|d| d.to_string()).collect();
        format!("(None, {})", dims.join(", "))
    }
}

/// Structural summary of a model
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub name: String,
    pub layers: Vec<LayerSummary>,
}

impl ModelSummary {
    /// Validate `config` and describe every layer it produces
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        let mut layers = Vec::new();
        let mut shape = config.input_shape.chw();
        layers.push(LayerSummary::new("input_layer", "InputLayer", &shape));

        let augmentation = config.augmentation.init();
        if augmentation.flip.is_some() {
            layers.push(LayerSummary::new("random_flip", "RandomFlip", &shape));
        }
        if augmentation.rotation.is_some() {
            layers.push(LayerSummary::new("random_rotation", "RandomRotation", &shape));
        }
        if augmentation.zoom.is_some() {
            layers.push(LayerSummary::new("random_zoom", "RandomZoom", &shape));
        }

        let preprocessing = &config.preprocessing;
        if preprocessing.center_crop {
            shape = preprocessing.output_shape(shape)?;
            layers.push(LayerSummary::new("center_crop", "CenterCrop", &shape));
        }
        if preprocessing.rescaling {
            layers.push(LayerSummary::new("rescaling", "Rescaling", &shape));
        }

        for block in &config.conv_blocks {
            let in_channels = shape[0];
            let k = block.kernel_size;

            shape = block.conv_output_shape(shape)?;
            let conv_params = k * k * in_channels * block.filters + block.filters;
            layers.push(
                LayerSummary::new(block.layer_name("Conv2D"), "Conv2D", &shape)
                    .with_params(conv_params, 0),
            );

            if block.activation == Activation::Relu {
                layers.push(LayerSummary::new(
                    block.layer_name("ReLU"),
                    "Activation",
                    &shape,
                ));
            }

            if block.pooling != Pooling::None {
                shape = block.pool_output_shape(shape)?;
                let prefix = block.pool_prefix();
                layers.push(LayerSummary::new(block.layer_name(prefix), prefix, &shape));
            }

            if block.batch_norm {
                // gamma and beta train, the running mean and variance do not
                layers.push(
                    LayerSummary::new(block.layer_name("BatchNorm"), "BatchNormalization", &shape)
                        .with_params(2 * block.filters, 2 * block.filters),
                );
            }
        }

        let mut features: usize = shape.iter().product();
        layers.push(LayerSummary::new("FlattenLayer", "Flatten", &[features]));

        for (i, &units) in config.dense_units.iter().enumerate() {
            layers.push(
                LayerSummary::new(format!("dense{}", i + 1), "Dense", &[units])
                    .with_params(features * units + units, 0),
            );
            features = units;
        }

        if config.dropout_rate > 0.0 {
            layers.push(LayerSummary::new("DropoutLayer", "Dropout", &[features]));
        }

        let head = config.output_head();
        let kind = match head.activation {
            OutputActivation::Sigmoid => "Dense (sigmoid)",
            OutputActivation::Softmax => "Dense (softmax)",
        };
        layers.push(
            LayerSummary::new("OutputLayer", kind, &[head.units])
                .with_params(features * head.units + head.units, 0),
        );

        Ok(Self {
            name: "custom_cnn".to_string(),
            layers,
        })
    }

    pub fn trainable_params(&self) -> usize {
        self.layers.iter().map(|l| l.trainable_params).sum()
    }

    pub fn non_trainable_params(&self) -> usize {
        self.layers.iter().map(|l| l.non_trainable_params).sum()
    }

    pub fn total_params(&self) -> usize {
        self.trainable_params() + self.non_trainable_params()
    }

    /// Output shape of the last layer
    pub fn output_shape(&self) -> &[usize] {
        self.layers
            .last()
            .map(|l| l.output_shape.as_slice())
            .unwrap_or(&[])
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model: \"{}\"", self.name)?;
        writeln!(f, "{}", "_".repeat(RULE_WIDTH))?;
        writeln!(
            f,
            "{:<nw$}{:<sw$}{}",
            "Layer (type)",
            "Output Shape",
            "Param #",
            nw = NAME_WIDTH,
            sw = SHAPE_WIDTH
        )?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;

        for (i, layer) in self.layers.iter().enumerate() {
            let label = format!("{} ({})", layer.name, layer.kind);
            writeln!(
                f,
                "{:<nw$}{:<sw$}{}",
                label,
                layer.shape_label(),
                format_number(layer.total_params()),
                nw = NAME_WIDTH,
                sw = SHAPE_WIDTH
            )?;

            if i + 1 < self.layers.len() {
                writeln!(f, "{}", "_".repeat(RULE_WIDTH))?;
            }
        }

        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "Total params: {}", format_number(self.total_params()))?;
        writeln!(
            f,
            "Trainable params: {}",
            format_number(self.trainable_params())
        )?;
        write!(
            f,
            "Non-trainable params: {}",
            format_number(self.non_trainable_params())
        )
    }
}
