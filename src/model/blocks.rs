//! Building Blocks
//!
//! The two reusable pieces the classifier is assembled from:
//!
//! - [`ConvBlock`]: Conv2d, optional ReLU, optional max/average pooling and
//!   optional batch normalization, in that order.
//! - [`PreprocessingBlock`]: center crop and pixel rescaling performed inside
//!   the model graph.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::utils::error::{CnnError, Result as CnnResult};

/// Convolution padding mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// Pad so the output keeps the input's spatial size
    Same,
    /// No padding
    Valid,
}

/// Pooling applied after the activation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    Max,
    Average,
    None,
}

/// Activation applied right after the convolution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    /// Identity, no activation layer
    Linear,
}

/// Configuration for a [`ConvBlock`]
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    /// Number of convolution filters
    pub filters: usize,

    /// Block name, used to name the block's layers
    pub name: String,

    /// Size of the square convolution kernel
    #[config(default = "3")]
    pub kernel_size: usize,

    #[config(default = "Padding::Same")]
    pub padding: Padding,

    #[config(default = "Pooling::Max")]
    pub pooling: Pooling,

    /// Pooling window (vertical, horizontal)
    #[config(default = "[2, 2]")]
    pub pool_size: [usize; 2],

    /// Pooling strides, `None` means equal to `pool_size`
    pub strides: Option<[usize; 2]>,

    #[config(default = "Activation::Relu")]
    pub activation: Activation,

    /// Append batch normalization after pooling
    #[config(default = "false")]
    pub batch_norm: bool,
}

impl ConvBlockConfig {
    /// Effective pooling strides
    pub fn pool_strides(&self) -> [usize; 2] {
        self.strides.unwrap_or(self.pool_size)
    }

    /// Name of one of the block's layers, e.g. `Conv2D_conv1`
    pub fn layer_name(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.name)
    }

    pub fn validate(&self) -> CnnResult<()> {
        if self.filters == 0 {
            return Err(CnnError::Config(format!(
                "block '{}': filters must be greater than 0",
                self.name
            )));
        }

        if self.kernel_size == 0 {
            return Err(CnnError::Config(format!(
                "block '{}': kernel_size must be greater than 0",
                self.name
            )));
        }

        if self.padding == Padding::Same && self.kernel_size % 2 == 0 {
            return Err(CnnError::Config(format!(
                "block '{}': 'same' padding needs an odd kernel_size, got {}",
                self.name, self.kernel_size
            )));
        }

        if self.pooling != Pooling::None {
            let strides = self.pool_strides();
            if self.pool_size.contains(&0) || strides.contains(&0) {
                return Err(CnnError::Config(format!(
                    "block '{}': pool_size and strides must be non-zero",
                    self.name
                )));
            }
        }

        Ok(())
    }

    /// Shape `[channels, height, width]` after the convolution
    pub fn conv_output_shape(&self, input: [usize; 3]) -> CnnResult<[usize; 3]> {
        let [_, height, width] = input;

        match self.padding {
            Padding::Same => Ok([self.filters, height, width]),
            Padding::Valid => {
                let k = self.kernel_size;
                if height < k || width < k {
                    return Err(CnnError::Shape(format!(
                        "{}: kernel {}x{} does not fit a {}x{} input",
                        self.layer_name("Conv2D"),
                        k,
                        k,
                        height,
                        width
                    )));
                }
                Ok([self.filters, height - k + 1, width - k + 1])
            }
        }
    }

    /// Shape `[channels, height, width]` after the pooling layer
    pub fn pool_output_shape(&self, input: [usize; 3]) -> CnnResult<[usize; 3]> {
        if self.pooling == Pooling::None {
            return Ok(input);
        }

        let [channels, height, width] = input;
        let [ph, pw] = self.pool_size;
        let [sh, sw] = self.pool_strides();

        if height < ph || width < pw {
            return Err(CnnError::Shape(format!(
                "{}: pool {}x{} does not fit a {}x{} input",
                self.layer_name(self.pool_prefix()),
                ph,
                pw,
                height,
                width
            )));
        }

        Ok([channels, (height - ph) / sh + 1, (width - pw) / sw + 1])
    }

    /// Shape `[channels, height, width]` leaving the block
    pub fn output_shape(&self, input: [usize; 3]) -> CnnResult<[usize; 3]> {
        let shape = self.conv_output_shape(input)?;
        self.pool_output_shape(shape)
    }

    pub(crate) fn pool_prefix(&self) -> &'static str {
        match self.pooling {
            Pooling::Average => "AveragePooling2D",
            _ => "MaxPooling2D",
        }
    }

    /// Build the block for an input with `in_channels` channels
    pub fn init<B: Backend>(&self, in_channels: usize, device: &B::Device) -> ConvBlock<B> {
        let padding = match self.padding {
            Padding::Same => PaddingConfig2d::Same,
            Padding::Valid => PaddingConfig2d::Valid,
        };

        let conv = Conv2dConfig::new(
            [in_channels, self.filters],
            [self.kernel_size, self.kernel_size],
        )
        .with_padding(padding)
        .init(device);

        let activation = match self.activation {
            Activation::Relu => Some(Relu::new()),
            Activation::Linear => None,
        };

        let strides = self.pool_strides();
        let (max_pool, avg_pool) = match self.pooling {
            Pooling::Max => (
                Some(
                    MaxPool2dConfig::new(self.pool_size)
                        .with_strides(strides)
                        .init(),
                ),
                None,
            ),
            Pooling::Average => (
                None,
                Some(
                    AvgPool2dConfig::new(self.pool_size)
                        .with_strides(strides)
                        .init(),
                ),
            ),
            Pooling::None => (None, None),
        };

        let batch_norm = self
            .batch_norm
            .then(|| BatchNormConfig::new(self.filters).init(device));

        ConvBlock {
            conv,
            activation,
            max_pool,
            avg_pool,
            batch_norm,
        }
    }
}

/// Convolution followed by optional activation, pooling and batch norm
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub activation: Option<Relu>,
    pub max_pool: Option<MaxPool2d>,
    pub avg_pool: Option<AvgPool2d>,
    pub batch_norm: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> ConvBlock<B> {
    /// Forward pass through the block
    ///
    /// # Shapes
    /// - input: `[batch, in_channels, height, width]`
    /// - output: `[batch, filters, height_out, width_out]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);

        let x = match &self.activation {
            Some(relu) => relu.forward(x),
            None => x,
        };

        let x = match (&self.max_pool, &self.avg_pool) {
            (Some(pool), _) => pool.forward(x),
            (None, Some(pool)) => pool.forward(x),
            (None, None) => x,
        };

        match &self.batch_norm {
            Some(bn) => bn.forward(x),
            None => x,
        }
    }
}

/// Configuration for a [`PreprocessingBlock`]
#[derive(Config, Debug)]
pub struct PreprocessingConfig {
    /// Crop the center of the image
    #[config(default = "false")]
    pub center_crop: bool,

    #[config(default = "256")]
    pub crop_height: usize,

    #[config(default = "256")]
    pub crop_width: usize,

    /// Multiply pixel values by `rescale_value`
    #[config(default = "true")]
    pub rescaling: bool,

    #[config(default = "1.0 / 255.0")]
    pub rescale_value: f64,

    /// Added after scaling
    #[config(default = "0.0")]
    pub rescale_offset: f64,
}

impl PreprocessingConfig {
    pub fn validate(&self) -> CnnResult<()> {
        if self.center_crop && (self.crop_height == 0 || self.crop_width == 0) {
            return Err(CnnError::Config(
                "crop_height and crop_width must be greater than 0".to_string(),
            ));
        }

        if self.rescaling && !(self.rescale_value.is_finite() && self.rescale_offset.is_finite())
        {
            return Err(CnnError::Config(
                "rescale_value and rescale_offset must be finite".to_string(),
            ));
        }

        Ok(())
    }

    /// Shape `[channels, height, width]` after preprocessing
    pub fn output_shape(&self, input: [usize; 3]) -> CnnResult<[usize; 3]> {
        let [channels, height, width] = input;

        if !self.center_crop {
            return Ok(input);
        }

        if height < self.crop_height || width < self.crop_width {
            return Err(CnnError::Shape(format!(
                "center crop {}x{} is larger than the {}x{} input",
                self.crop_height, self.crop_width, height, width
            )));
        }

        Ok([channels, self.crop_height, self.crop_width])
    }

    pub fn init(&self) -> PreprocessingBlock {
        PreprocessingBlock {
            center_crop: self.center_crop.then(|| CenterCrop {
                height: self.crop_height,
                width: self.crop_width,
            }),
            rescaling: self.rescaling.then(|| Rescaling {
                scale: self.rescale_value,
                offset: self.rescale_offset,
            }),
        }
    }
}

/// Crops the central `height x width` window of each image
#[derive(Module, Clone, Debug)]
pub struct CenterCrop {
    pub height: usize,
    pub width: usize,
}

impl CenterCrop {
    /// Crop the center of `[batch, channels, height, width]` images.
    ///
    /// Axes shorter than the crop are kept whole.
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();

        let crop_h = self.height.min(height);
        let crop_w = self.width.min(width);
        let top = (height - crop_h) / 2;
        let left = (width - crop_w) / 2;

        x.slice([
            0..batch,
            0..channels,
            top..top + crop_h,
            left..left + crop_w,
        ])
    }
}

/// Computes `x * scale + offset`
#[derive(Module, Clone, Debug)]
pub struct Rescaling {
    pub scale: f64,
    pub offset: f64,
}

impl Rescaling {
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = x.mul_scalar(self.scale);
        if self.offset == 0.0 {
            x
        } else {
            x.add_scalar(self.offset)
        }
    }
}

/// Center crop and rescaling, both optional
#[derive(Module, Clone, Debug)]
pub struct PreprocessingBlock {
    pub center_crop: Option<CenterCrop>,
    pub rescaling: Option<Rescaling>,
}

impl PreprocessingBlock {
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.center_crop {
            Some(crop) => crop.forward(x),
            None => x,
        };

        match &self.rescaling {
            Some(rescaling) => rescaling.forward(x),
            None => x,
        }
    }
}
