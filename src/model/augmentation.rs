//! Data Augmentation Layers
//!
//! Random flips, rotations and zooms that live inside the model graph. Like
//! dropout, they only act during training: on a backend without autodiff
//! `forward` returns its input unchanged. `apply` always transforms and takes
//! the random source explicitly, which is what the preview tooling and the
//! tests use.

use std::f64::consts::PI;

use burn::{
    config::Config,
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::transform::{resample, Affine};
use crate::utils::error::{CnnError, Result as CnnResult};

/// Axes along which images may be mirrored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    Horizontal,
    Vertical,
    HorizontalAndVertical,
}

/// Configuration for [`DataAugmentation`]
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Random flip mode, `None` disables flipping
    pub flip: Option<FlipMode>,

    /// Rotation range as a fraction of a full turn
    #[config(default = "0.0")]
    pub rotation_factor: f64,

    /// Zoom range, the zoom is drawn from `[1 - f, 1 + f]`
    #[config(default = "0.0")]
    pub zoom_factor: f64,
}

impl AugmentationConfig {
    pub fn validate(&self) -> CnnResult<()> {
        if !(self.rotation_factor.is_finite() && self.rotation_factor >= 0.0) {
            return Err(CnnError::Config(
                "rotation_factor must be a non-negative number".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.zoom_factor) {
            return Err(CnnError::Config(
                "zoom_factor must be in range [0.0, 1.0)".to_string(),
            ));
        }

        Ok(())
    }

    pub fn init(&self) -> DataAugmentation {
        let flip = self.flip.map(|mode| RandomFlip {
            horizontal: matches!(
                mode,
                FlipMode::Horizontal | FlipMode::HorizontalAndVertical
            ),
            vertical: matches!(mode, FlipMode::Vertical | FlipMode::HorizontalAndVertical),
        });

        let rotation = (self.rotation_factor > 0.0).then(|| RandomRotation {
            factor: self.rotation_factor,
        });

        let zoom = (self.zoom_factor > 0.0).then(|| RandomZoom {
            factor: self.zoom_factor,
        });

        DataAugmentation {
            flip,
            rotation,
            zoom,
        }
    }
}

/// Mirrors each image with probability 0.5 per enabled axis
#[derive(Module, Clone, Debug)]
pub struct RandomFlip {
    pub horizontal: bool,
    pub vertical: bool,
}

impl RandomFlip {
    /// Draw one transform per image
    pub fn sample<R: Rng>(
        &self,
        batch: usize,
        height: usize,
        width: usize,
        rng: &mut R,
    ) -> Vec<Affine> {
        (0..batch)
            .map(|_| {
                let horizontal = self.horizontal && rng.gen_bool(0.5);
                let vertical = self.vertical && rng.gen_bool(0.5);
                Affine::flip(horizontal, vertical, height, width)
            })
            .collect()
    }

    pub fn apply<B: Backend, R: Rng>(&self, x: Tensor<B, 4>, rng: &mut R) -> Tensor<B, 4> {
        let [batch, _, height, width] = x.dims();
        let transforms = self.sample(batch, height, width, rng);
        resample(x, &transforms)
    }
}

/// Rotates each image by a random angle in `[-factor * 2pi, factor * 2pi]`
#[derive(Module, Clone, Debug)]
pub struct RandomRotation {
    pub factor: f64,
}

impl RandomRotation {
    /// Largest absolute rotation angle, in radians
    pub fn max_angle(&self) -> f64 {
        self.factor * 2.0 * PI
    }

    pub fn sample<R: Rng>(
        &self,
        batch: usize,
        height: usize,
        width: usize,
        rng: &mut R,
    ) -> Vec<Affine> {
        let max = self.max_angle();
        (0..batch)
            .map(|_| Affine::rotation(rng.gen_range(-max..=max), height, width))
            .collect()
    }

    pub fn apply<B: Backend, R: Rng>(&self, x: Tensor<B, 4>, rng: &mut R) -> Tensor<B, 4> {
        let [batch, _, height, width] = x.dims();
        let transforms = self.sample(batch, height, width, rng);
        resample(x, &transforms)
    }
}

/// Zooms each image in or out by a random factor in `[1 - factor, 1 + factor]`,
/// keeping the aspect ratio
#[derive(Module, Clone, Debug)]
pub struct RandomZoom {
    pub factor: f64,
}

impl RandomZoom {
    pub fn sample<R: Rng>(
        &self,
        batch: usize,
        height: usize,
        width: usize,
        rng: &mut R,
    ) -> Vec<Affine> {
        (0..batch)
            .map(|_| {
                let zoom = 1.0 + rng.gen_range(-self.factor..=self.factor);
                Affine::zoom(zoom, zoom, height, width)
            })
            .collect()
    }

    pub fn apply<B: Backend, R: Rng>(&self, x: Tensor<B, 4>, rng: &mut R) -> Tensor<B, 4> {
        let [batch, _, height, width] = x.dims();
        let transforms = self.sample(batch, height, width, rng);
        resample(x, &transforms)
    }
}

/// Flip, rotation and zoom, applied in that order
#[derive(Module, Clone, Debug)]
pub struct DataAugmentation {
    pub flip: Option<RandomFlip>,
    pub rotation: Option<RandomRotation>,
    pub zoom: Option<RandomZoom>,
}

impl DataAugmentation {
    /// Augment during training, pass through otherwise
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if !B::ad_enabled() || self.is_identity() {
            return x;
        }

        self.apply(x, &mut rand::thread_rng())
    }

    /// Apply every configured layer regardless of the backend
    pub fn apply<B: Backend, R: Rng>(&self, x: Tensor<B, 4>, rng: &mut R) -> Tensor<B, 4> {
        let x = match &self.flip {
            Some(flip) => flip.apply(x, rng),
            None => x,
        };

        let x = match &self.rotation {
            Some(rotation) => rotation.apply(x, rng),
            None => x,
        };

        match &self.zoom {
            Some(zoom) => zoom.apply(x, rng),
            None => x,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.flip.is_none() && self.rotation.is_none() && self.zoom.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn ramp<B: Backend>(shape: [usize; 4]) -> Tensor<B, 4> {
        let n: usize = shape.iter().product();
        let values: Vec<f32> = (0..n).map(|v| v as f32).collect();
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn standard() -> DataAugmentation {
        AugmentationConfig::new()
            .with_flip(Some(FlipMode::Horizontal))
            .with_rotation_factor(0.1)
            .with_zoom_factor(0.1)
            .init()
    }

    #[test]
    fn test_config_init() {
        let augmentation = standard();
        let flip = augmentation.flip.as_ref().unwrap();
        assert!(flip.horizontal && !flip.vertical);
        assert_eq!(augmentation.rotation.as_ref().unwrap().factor, 0.1);
        assert_eq!(augmentation.zoom.as_ref().unwrap().factor, 0.1);

        assert!(AugmentationConfig::new().init().is_identity());
    }

    #[test]
    fn test_config_validation() {
        assert!(AugmentationConfig::new().validate().is_ok());
        assert!(AugmentationConfig::new()
            .with_zoom_factor(1.0)
            .validate()
            .is_err());
        assert!(AugmentationConfig::new()
            .with_rotation_factor(-0.1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_inference_forward_is_identity() {
        let input = ramp::<TestBackend>([2, 3, 8, 8]);
        let expected: Vec<f32> = input.clone().into_data().to_vec().unwrap();

        let output = standard().forward(input);
        let actual: Vec<f32> = output.into_data().to_vec().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_training_forward_keeps_shape() {
        let input = ramp::<TestAutodiffBackend>([2, 3, 8, 6]);
        let output = standard().forward(input);
        assert_eq!(output.dims(), [2, 3, 8, 6]);
    }

    #[test]
    fn test_training_forward_transforms_images() {
        let input = ramp::<TestAutodiffBackend>([2, 1, 8, 6]);
        let original: Vec<f32> = input.clone().into_data().to_vec().unwrap();

        // rotation and zoom angles are continuous draws
        let changed = (0..3).any(|_| {
            let out: Vec<f32> = standard()
                .forward(input.clone())
                .into_data()
                .to_vec()
                .unwrap();
            out.iter()
                .zip(&original)
                .any(|(a, b)| (a - b).abs() > 1e-3)
        });
        assert!(changed, "training forward left every image unchanged");
    }

    #[test]
    fn test_training_forward_without_layers_is_identity() {
        let input = ramp::<TestAutodiffBackend>([1, 1, 4, 4]);
        let expected: Vec<f32> = input.clone().into_data().to_vec().unwrap();

        let out: Vec<f32> = AugmentationConfig::new()
            .init()
            .forward(input)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_flip_yields_original_or_mirror() {
        let flip = RandomFlip {
            horizontal: true,
            vertical: false,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let original = vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0];
        let mirrored = vec![2.0f32, 1.0, 0.0, 5.0, 4.0, 3.0];

        for _ in 0..8 {
            let out: Vec<f32> = flip
                .apply(ramp::<TestBackend>([1, 1, 2, 3]), &mut rng)
                .into_data()
                .to_vec()
                .unwrap();
            assert!(out == original || out == mirrored, "{:?}", out);
        }
    }

    #[test]
    fn test_flip_sampling_uses_both_outcomes() {
        let flip = RandomFlip {
            horizontal: true,
            vertical: true,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let transforms = flip.sample(64, 4, 4, &mut rng);

        let flipped_h = transforms.iter().filter(|t| t.a < 0.0).count();
        let flipped_v = transforms.iter().filter(|t| t.e < 0.0).count();
        assert!(flipped_h > 0 && flipped_h < 64);
        assert!(flipped_v > 0 && flipped_v < 64);
    }

    #[test]
    fn test_rotation_angle_range() {
        let rotation = RandomRotation { factor: 0.1 };
        assert!((rotation.max_angle() - 0.2 * PI).abs() < 1e-12);

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for t in rotation.sample(32, 10, 10, &mut rng) {
            // a = cos(angle), d = sin(angle)
            let angle = t.d.atan2(t.a);
            assert!(angle.abs() <= rotation.max_angle() + 1e-9);
        }
    }

    #[test]
    fn test_zoom_range() {
        let zoom = RandomZoom { factor: 0.1 };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for t in zoom.sample(32, 10, 10, &mut rng) {
            assert!((0.9..=1.1).contains(&t.a));
            assert_eq!(t.a, t.e);
        }
    }

    #[test]
    fn test_seeded_apply_is_reproducible() {
        let augmentation = standard();

        let a: Vec<f32> = augmentation
            .apply(ramp::<TestBackend>([2, 1, 6, 6]), &mut ChaCha8Rng::seed_from_u64(1))
            .into_data()
            .to_vec()
            .unwrap();
        let b: Vec<f32> = augmentation
            .apply(ramp::<TestBackend>([2, 1, 6, 6]), &mut ChaCha8Rng::seed_from_u64(1))
            .into_data()
            .to_vec()
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_image_survives_augmentation() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::full([3, 3, 7, 9], 0.5, &device);

        let out: Vec<f32> = standard()
            .apply(input, &mut ChaCha8Rng::seed_from_u64(5))
            .into_data()
            .to_vec()
            .unwrap();
        assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-5));
    }
}
