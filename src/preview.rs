//! Augmentation Preview
//!
//! Loads an image file, runs it through the model's augmentation stack (and
//! center crop, when configured) and writes each result as a PNG. Useful for
//! checking that the random transforms look sensible before training.

use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, GrayImage, ImageReader, RgbImage};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::model::blocks::CenterCrop;
use crate::model::{InputShape, ModelConfig};
use crate::utils::error::{CnnError, Result};

/// Load an image, resize it to `shape` and return raw `[0, 255]` pixel
/// values in CHW order
pub fn load_image(path: &Path, shape: InputShape) -> Result<Vec<f32>> {
    let img = ImageReader::open(path)?
        .decode()
        .map_err(|e| CnnError::Image(path.to_path_buf(), e.to_string()))?
        .resize_exact(shape.width as u32, shape.height as u32, FilterType::Triangle);

    let (height, width) = (shape.height, shape.width);
    let plane = height * width;

    match shape.channels {
        3 => {
            let rgb = img.to_rgb8();
            let mut data = vec![0.0f32; 3 * plane];
            for (x, y, pixel) in rgb.enumerate_pixels() {
                let offset = y as usize * width + x as usize;
                for c in 0..3 {
                    data[c * plane + offset] = pixel[c] as f32;
                }
            }
            Ok(data)
        }
        1 => Ok(img.to_luma8().pixels().map(|p| p[0] as f32).collect()),
        n => Err(CnnError::Image(
            path.to_path_buf(),
            format!("cannot load an image with {} channels", n),
        )),
    }
}

/// Wrap CHW pixel data as a single-image batch
pub fn image_to_tensor<B: Backend>(
    pixels: Vec<f32>,
    shape: InputShape,
    device: &B::Device,
) -> Tensor<B, 4> {
    Tensor::from_data(
        TensorData::new(pixels, [1, shape.channels, shape.height, shape.width]),
        device,
    )
}

/// Convert the first image of a `[batch, channels, height, width]` tensor
/// holding `[0, 255]` values back into an image
pub fn tensor_to_image<B: Backend>(tensor: Tensor<B, 4>) -> Result<DynamicImage> {
    let [_, channels, height, width] = tensor.dims();
    let first = tensor.slice([0..1, 0..channels, 0..height, 0..width]);

    let values: Vec<f32> = first
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| CnnError::Tensor(format!("{:?}", e)))?;

    let plane = height * width;
    let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;

    match channels {
        3 => {
            let img = RgbImage::from_fn(width as u32, height as u32, |x, y| {
                let offset = y as usize * width + x as usize;
                image::Rgb([
                    to_u8(values[offset]),
                    to_u8(values[plane + offset]),
                    to_u8(values[2 * plane + offset]),
                ])
            });
            Ok(DynamicImage::ImageRgb8(img))
        }
        1 => {
            let img = GrayImage::from_fn(width as u32, height as u32, |x, y| {
                image::Luma([to_u8(values[y as usize * width + x as usize])])
            });
            Ok(DynamicImage::ImageLuma8(img))
        }
        n => Err(CnnError::InvalidInput(format!(
            "cannot convert a tensor with {} channels to an image",
            n
        ))),
    }
}

/// Write `count` augmented versions of `input` into `output_dir` and return
/// their paths. The same `seed` always produces the same images.
pub fn preview_augmentations<B: Backend>(
    config: &ModelConfig,
    input: &Path,
    output_dir: &Path,
    count: usize,
    seed: u64,
    device: &B::Device,
) -> Result<Vec<PathBuf>> {
    config.validate()?;
    std::fs::create_dir_all(output_dir)?;

    let shape = config.input_shape;
    let pixels = load_image(input, shape)?;
    let image = image_to_tensor::<B>(pixels, shape, device);

    let augmentation = config.augmentation.init();
    let crop = config.preprocessing.center_crop.then(|| CenterCrop {
        height: config.preprocessing.crop_height,
        width: config.preprocessing.crop_width,
    });

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut written = Vec::with_capacity(count);

    for i in 0..count {
        let augmented = augmentation.apply(image.clone(), &mut rng);
        let augmented = match &crop {
            Some(crop) => crop.forward(augmented),
            None => augmented,
        };

        let path = output_dir.join(format!("{}_aug{:02}.png", stem, i));
        tensor_to_image(augmented)?
            .save(&path)
            .map_err(|e| CnnError::Image(path.clone(), e.to_string()))?;

        debug!("Wrote {}", path.display());
        written.push(path);
    }

    info!(
        "Wrote {} augmented previews of {} to {}",
        written.len(),
        input.display(),
        output_dir.display()
    );

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PreprocessingConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn write_test_image(dir: &Path) -> PathBuf {
        let path = dir.join("leaf.png");
        RgbImage::from_fn(20, 10, |x, y| image::Rgb([(x * 10) as u8, (y * 20) as u8, 128]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_load_image_resizes_and_orders_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());

        let pixels = load_image(&path, InputShape::new(10, 20, 3)).unwrap();
        assert_eq!(pixels.len(), 3 * 10 * 20);

        // Blue plane is constant
        assert!(pixels[400..].iter().all(|&v| v == 128.0));
        // Red grows along x in the first row
        assert_eq!(pixels[0], 0.0);
        assert_eq!(pixels[19], 190.0);
    }

    #[test]
    fn test_load_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());

        let pixels = load_image(&path, InputShape::new(5, 5, 1)).unwrap();
        assert_eq!(pixels.len(), 25);
    }

    #[test]
    fn test_load_rejects_unsupported_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());

        assert!(matches!(
            load_image(&path, InputShape::new(5, 5, 4)),
            Err(CnnError::Image(_, _))
        ));
    }

    #[test]
    fn test_tensor_image_round_trip() {
        let device = Default::default();
        let shape = InputShape::new(2, 3, 3);
        let pixels: Vec<f32> = (0..18).map(|v| (v * 10) as f32).collect();

        let tensor = image_to_tensor::<TestBackend>(pixels, shape, &device);
        let img = tensor_to_image(tensor).unwrap().to_rgb8();

        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0, [0, 60, 120]);
        assert_eq!(img.get_pixel(2, 1).0, [50, 110, 170]);
    }

    #[test]
    fn test_preview_writes_cropped_images() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_test_image(dir.path());
        let output_dir = dir.path().join("preview");

        let mut config = ModelConfig::new(InputShape::new(32, 32, 3), 4);
        config.preprocessing = PreprocessingConfig::new()
            .with_center_crop(true)
            .with_crop_height(16)
            .with_crop_width(24);

        let written = preview_augmentations::<TestBackend>(
            &config,
            &input,
            &output_dir,
            3,
            42,
            &Default::default(),
        )
        .unwrap();

        assert_eq!(written.len(), 3);
        for path in &written {
            let img = image::open(path).unwrap();
            assert_eq!((img.width(), img.height()), (24, 16));
        }
        assert!(written[0].ends_with("leaf_aug00.png"));
    }

    #[test]
    fn test_preview_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = preview_augmentations::<TestBackend>(
            &ModelConfig::default(),
            &dir.path().join("missing.png"),
            dir.path(),
            1,
            0,
            &Default::default(),
        );
        assert!(matches!(result, Err(CnnError::Io(_))));
    }
}
