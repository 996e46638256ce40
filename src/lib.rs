//! # Custom CNN
//!
//! A convolutional image classifier assembled from Burn layers.
//!
//! ## Modules
//!
//! - `model`: augmentation, preprocessing and convolutional blocks, the
//!   classifier itself and its summary
//! - `preview`: runs the augmentation stack on image files
//! - `backend`: backend selection (NdArray or CUDA)
//! - `utils`: logging, errors and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use custom_cnn::model::{ModelConfig, ModelSummary};
//! use custom_cnn::backend::{default_device, DefaultBackend};
//!
//! let config = ModelConfig::default();
//! let model = config.init::<DefaultBackend>(&default_device())?;
//! println!("{}", ModelSummary::from_config(&config)?);
//! ```

pub mod backend;
pub mod model;
pub mod preview;
pub mod utils;

// Re-export commonly used items for convenience
pub use model::{custom_cnn, CustomCnn, InputShape, ModelConfig, ModelSummary};
pub use utils::error::{CnnError, Result};

/// Default input height
pub const DEFAULT_INPUT_HEIGHT: usize = 512;

/// Default input width
pub const DEFAULT_INPUT_WIDTH: usize = 512;

/// Default number of input channels (RGB)
pub const DEFAULT_INPUT_CHANNELS: usize = 3;

/// Default number of output classes
pub const DEFAULT_NUM_CLASSES: usize = 4;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
