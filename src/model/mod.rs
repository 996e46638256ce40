//! Model module for the custom CNN built with the Burn framework
//!
//! This module provides:
//! - Augmentation layers that run inside the model graph during training
//! - Preprocessing and convolutional building blocks
//! - The assembled classifier and its configuration
//! - A structural summary of the layer stack
//!
//! ## Architecture
//!
//! ```text
//! RandomFlip -> RandomRotation -> RandomZoom
//!     -> CenterCrop -> Rescaling
//!     -> ConvBlock x3 -> Flatten -> Dense x2 -> Dropout -> Output
//! ```

pub mod augmentation;
pub mod blocks;
pub mod cnn;
pub mod config;
pub mod summary;
pub mod transform;

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, DataAugmentation, FlipMode};
pub use blocks::{
    Activation, ConvBlock, ConvBlockConfig, Padding, Pooling, PreprocessingBlock,
    PreprocessingConfig,
};
pub use cnn::CustomCnn;
pub use config::{InputShape, ModelConfig, OutputActivation, OutputHead};
pub use summary::{LayerSummary, ModelSummary};

use burn::tensor::backend::Backend;

use crate::utils::error::Result;

/// Build the standard classifier for `input_shape` and `num_classes`
pub fn custom_cnn<B: Backend>(
    input_shape: InputShape,
    num_classes: usize,
    device: &B::Device,
) -> Result<CustomCnn<B>> {
    ModelConfig::new(input_shape, num_classes).init(device)
}
