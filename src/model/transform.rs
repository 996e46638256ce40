//! Affine image resampling on Burn tensors
//!
//! Each output pixel `(x, y)` is mapped back to an input location through an
//! [`Affine`] transform and sampled bilinearly. Locations outside the image
//! are folded back in by reflection (`d c b a | a b c d | d c b a`), so every
//! output pixel is a blend of real input pixels.
//!
//! Sampling is expressed as four `gather` calls over the flattened spatial
//! axis, which keeps it backend-agnostic.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

/// Maps output pixel coordinates to input coordinates:
///
/// ```text
/// x_in = a * x + b * y + c
/// y_in = d * x + e * y + f
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 1.0,
            f: 0.0,
        }
    }

    /// Mirror left/right and/or top/bottom
    pub fn flip(horizontal: bool, vertical: bool, height: usize, width: usize) -> Self {
        let mut transform = Self::identity();
        if horizontal {
            transform.a = -1.0;
            transform.c = width as f64 - 1.0;
        }
        if vertical {
            transform.e = -1.0;
            transform.f = height as f64 - 1.0;
        }
        transform
    }

    /// Rotation by `angle` radians around the image center
    pub fn rotation(angle: f64, height: usize, width: usize) -> Self {
        let (sin, cos) = angle.sin_cos();
        let cx = (width as f64 - 1.0) / 2.0;
        let cy = (height as f64 - 1.0) / 2.0;

        Self {
            a: cos,
            b: -sin,
            c: cx - cos * cx + sin * cy,
            d: sin,
            e: cos,
            f: cy - sin * cx - cos * cy,
        }
    }

    /// Scale around the image center. Factors above 1 sample a larger input
    /// region (zoom out), factors below 1 a smaller one (zoom in).
    pub fn zoom(zoom_y: f64, zoom_x: f64, height: usize, width: usize) -> Self {
        let cx = (width as f64 - 1.0) / 2.0;
        let cy = (height as f64 - 1.0) / 2.0;

        Self {
            a: zoom_x,
            b: 0.0,
            c: cx * (1.0 - zoom_x),
            d: 0.0,
            e: zoom_y,
            f: cy * (1.0 - zoom_y),
        }
    }

    /// Input location sampled for output pixel `(x, y)`
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

/// Fold an integer coordinate into `[0, len)` by reflection
pub fn reflect_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let period = 2 * len;
    let folded = index.rem_euclid(period);

    if folded >= len {
        (period - 1 - folded) as usize
    } else {
        folded as usize
    }
}

/// Bilinear sampling plan for one image: four neighbor indices into the
/// flattened `height * width` axis and their weights
struct SamplePlan {
    indices: [Vec<i64>; 4],
    weights: [Vec<f32>; 4],
}

impl SamplePlan {
    fn new(transform: &Affine, height: usize, width: usize) -> Self {
        let pixels = height * width;
        let mut indices: [Vec<i64>; 4] = std::array::from_fn(|_| Vec::with_capacity(pixels));
        let mut weights: [Vec<f32>; 4] = std::array::from_fn(|_| Vec::with_capacity(pixels));

        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = transform.apply(x as f64, y as f64);

                let x0 = sx.floor();
                let y0 = sy.floor();
                let wx = sx - x0;
                let wy = sy - y0;

                let x0 = x0 as i64;
                let y0 = y0 as i64;
                let cols = [reflect_index(x0, width), reflect_index(x0 + 1, width)];
                let rows = [reflect_index(y0, height), reflect_index(y0 + 1, height)];

                let corners = [
                    (rows[0], cols[0], (1.0 - wx) * (1.0 - wy)),
                    (rows[0], cols[1], wx * (1.0 - wy)),
                    (rows[1], cols[0], (1.0 - wx) * wy),
                    (rows[1], cols[1], wx * wy),
                ];

                for (slot, (row, col, weight)) in corners.into_iter().enumerate() {
                    indices[slot].push((row * width + col) as i64);
                    weights[slot].push(weight as f32);
                }
            }
        }

        Self { indices, weights }
    }
}

/// Resample every image of a `[batch, channels, height, width]` tensor with
/// its own transform. `transforms` must hold one entry per image.
pub fn resample<B: Backend>(images: Tensor<B, 4>, transforms: &[Affine]) -> Tensor<B, 4> {
    let [batch, channels, height, width] = images.dims();
    assert_eq!(
        transforms.len(),
        batch,
        "one transform is required per image"
    );

    let device = images.device();
    let pixels = height * width;

    let mut indices: [Vec<i64>; 4] =
        std::array::from_fn(|_| Vec::with_capacity(batch * channels * pixels));
    let mut weights: [Vec<f32>; 4] = std::array::from_fn(|_| Vec::with_capacity(batch * pixels));

    for transform in transforms {
        let plan = SamplePlan::new(transform, height, width);
        for slot in 0..4 {
            // The same spatial lookup is used for every channel.
            for _ in 0..channels {
                indices[slot].extend_from_slice(&plan.indices[slot]);
            }
            weights[slot].extend_from_slice(&plan.weights[slot]);
        }
    }

    let flat = images.reshape([batch, channels, pixels]);

    let mut output: Option<Tensor<B, 3>> = None;
    for (slot_indices, slot_weights) in indices.into_iter().zip(weights) {
        let index = Tensor::<B, 3, Int>::from_data(
            TensorData::new(slot_indices, [batch, channels, pixels]),
            &device,
        );
        let weight =
            Tensor::<B, 3>::from_data(TensorData::new(slot_weights, [batch, 1, pixels]), &device);

        let term = flat.clone().gather(2, index) * weight;
        output = Some(match output {
            Some(acc) => acc + term,
            None => term,
        });
    }

    output
        .unwrap_or(flat)
        .reshape([batch, channels, height, width])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn grid(values: Vec<f32>, shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn to_vec(t: Tensor<TestBackend, 4>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(0, 4), 0);
        assert_eq!(reflect_index(3, 4), 3);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(8, 4), 0);
        assert_eq!(reflect_index(0, 1), 0);
        assert_eq!(reflect_index(-3, 1), 0);
    }

    #[test]
    fn test_rotation_keeps_center_fixed() {
        let t = Affine::rotation(0.7, 9, 5);
        let (x, y) = t.apply(2.0, 4.0);
        assert!((x - 2.0).abs() < 1e-9);
        assert!((y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_out_samples_wider_region() {
        let t = Affine::zoom(2.0, 2.0, 5, 5);
        assert_eq!(t.apply(2.0, 2.0), (2.0, 2.0));
        assert_eq!(t.apply(0.0, 0.0), (-2.0, -2.0));
    }

    #[test]
    fn test_identity_resample_is_noop() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let images = grid(values.clone(), [2, 3, 2, 2]);

        let out = resample(images, &[Affine::identity(), Affine::identity()]);
        assert_eq!(out.dims(), [2, 3, 2, 2]);
        assert_close(&to_vec(out), &values);
    }

    #[test]
    fn test_horizontal_flip_per_image() {
        let values: Vec<f32> = vec![
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, // image 0
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, // image 1
        ];
        let images = grid(values, [2, 1, 2, 3]);

        let out = resample(images, &[Affine::flip(true, false, 2, 3), Affine::identity()]);
        assert_close(
            &to_vec(out),
            &[3.0, 2.0, 1.0, 6.0, 5.0, 4.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );
    }

    #[test]
    fn test_vertical_flip_applies_to_all_channels() {
        let values: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0];
        let images = grid(values, [1, 2, 2, 2]);

        let out = resample(images, &[Affine::flip(false, true, 2, 2)]);
        assert_close(&to_vec(out), &[3.0, 4.0, 1.0, 2.0, 30.0, 40.0, 10.0, 20.0]);
    }

    #[test]
    fn test_flip_both_axes_reverses_image() {
        let images = grid(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 1, 2, 3]);

        let out = resample(images, &[Affine::flip(true, true, 2, 3)]);
        assert_close(&to_vec(out), &[6.0, 5.0, 4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_half_pixel_shift_interpolates() {
        let images = grid(vec![0.0, 10.0, 20.0, 30.0], [1, 1, 1, 4]);
        let shift = Affine {
            c: 0.5,
            ..Affine::identity()
        };

        // The last sample sits between pixel 3 and its reflection (pixel 3).
        let out = resample(images, &[shift]);
        assert_close(&to_vec(out), &[5.0, 15.0, 25.0, 30.0]);
    }

    #[test]
    fn test_quarter_turn_rotation() {
        let images = grid(vec![1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
        let out = resample(
            images,
            &[Affine::rotation(std::f64::consts::FRAC_PI_2, 2, 2)],
        );

        // x_in = 1 - y, y_in = x
        assert_close(&to_vec(out), &[2.0, 4.0, 1.0, 3.0]);
    }
}
