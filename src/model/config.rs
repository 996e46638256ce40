//! Model Configuration Module
//!
//! Defines the top-level configuration of the custom CNN: input shape, class
//! count, and the ordered stack of augmentation, preprocessing, convolutional
//! and dense layers. Also performs static shape inference so that invalid
//! topologies are rejected before any weights are allocated.

use std::path::Path;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use super::augmentation::{AugmentationConfig, FlipMode};
use super::blocks::{ConvBlockConfig, PreprocessingConfig};
use super::cnn::CustomCnn;
use crate::utils::error::{CnnError, Result};

/// Shape of a single input image, `(height, width, channels)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Shape in tensor order, `[channels, height, width]`
    pub fn chw(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

impl std::fmt::Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// Activation applied by the output layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    Sigmoid,
    Softmax,
}

/// Size and activation of the output layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputHead {
    pub units: usize,
    pub activation: OutputActivation,
}

impl OutputHead {
    /// Binary problems get one sigmoid unit, everything else a softmax layer
    pub fn for_classes(num_classes: usize) -> Self {
        if num_classes == 2 {
            Self {
                units: 1,
                activation: OutputActivation::Sigmoid,
            }
        } else {
            Self {
                units: num_classes,
                activation: OutputActivation::Softmax,
            }
        }
    }
}

/// Configuration for the custom CNN architecture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Shape of the raw input images
    pub input_shape: InputShape,

    /// Number of classes to predict
    pub num_classes: usize,

    /// Random transforms applied while training
    pub augmentation: AugmentationConfig,

    /// Crop and rescaling performed inside the model
    pub preprocessing: PreprocessingConfig,

    /// Convolutional blocks, applied in order
    pub conv_blocks: Vec<ConvBlockConfig>,

    /// Units of the ReLU dense layers between flatten and output
    pub dense_units: Vec<usize>,

    /// Dropout rate before the output layer (0.0 disables dropout)
    pub dropout_rate: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(
            InputShape::new(
                crate::DEFAULT_INPUT_HEIGHT,
                crate::DEFAULT_INPUT_WIDTH,
                crate::DEFAULT_INPUT_CHANNELS,
            ),
            crate::DEFAULT_NUM_CLASSES,
        )
    }
}

impl ModelConfig {
    /// The standard topology for the given input shape and class count:
    /// flip/rotate/zoom augmentation, 256x256 center crop with 1/255
    /// rescaling, three conv blocks (256, 128, 64 filters), dense 128 and 64,
    /// dropout 0.3.
    pub fn new(input_shape: InputShape, num_classes: usize) -> Self {
        let augmentation = AugmentationConfig::new()
            .with_flip(Some(FlipMode::Horizontal))
            .with_rotation_factor(0.1)
            .with_zoom_factor(0.1);

        let preprocessing = PreprocessingConfig::new().with_center_crop(true);

        let conv_blocks = vec![
            ConvBlockConfig::new(256, "conv1".to_string()),
            ConvBlockConfig::new(128, "conv2".to_string()),
            ConvBlockConfig::new(64, "conv3".to_string()),
        ];

        Self {
            input_shape,
            num_classes,
            augmentation,
            preprocessing,
            conv_blocks,
            dense_units: vec![128, 64],
            dropout_rate: 0.3,
        }
    }

    /// Output layer derived from the class count
    pub fn output_head(&self) -> OutputHead {
        OutputHead::for_classes(self.num_classes)
    }

    /// Shape `[channels, height, width]` after preprocessing
    pub fn preprocessed_shape(&self) -> Result<[usize; 3]> {
        self.preprocessing.output_shape(self.input_shape.chw())
    }

    /// Shape `[channels, height, width]` entering the flatten layer
    pub fn feature_shape(&self) -> Result<[usize; 3]> {
        let mut shape = self.preprocessed_shape()?;
        for block in &self.conv_blocks {
            shape = block.output_shape(shape)?;
        }
        Ok(shape)
    }

    /// Number of features produced by the flatten layer
    pub fn flattened_features(&self) -> Result<usize> {
        let [c, h, w] = self.feature_shape()?;
        Ok(c * h * w)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(CnnError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }

        let InputShape {
            height,
            width,
            channels,
        } = self.input_shape;
        if height == 0 || width == 0 || channels == 0 {
            return Err(CnnError::Config(format!(
                "input shape {} must have non-zero dimensions",
                self.input_shape
            )));
        }

        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(CnnError::Config(
                "dropout_rate must be in range [0.0, 1.0)".to_string(),
            ));
        }

        if self.conv_blocks.is_empty() {
            return Err(CnnError::Config(
                "conv_blocks must have at least one block".to_string(),
            ));
        }

        if let Some(units) = self.dense_units.iter().position(|&u| u == 0) {
            return Err(CnnError::Config(format!(
                "dense layer {} must have at least one unit",
                units + 1
            )));
        }

        self.augmentation.validate()?;
        self.preprocessing.validate()?;

        for block in &self.conv_blocks {
            block.validate()?;
        }

        // Runs every layer's shape check in order.
        self.feature_shape().map(|_| ())
    }

    /// Validate the configuration and build the model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CustomCnn<B>> {
        CustomCnn::new(self, device)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
