//! # Image Preprocessing
//!
//! Turns an uploaded image into the tensor the classifier expects:
//! decode, convert to RGB, resize to the model resolution, scale to `[0, 1]`
//! and prepend a batch axis of 1. The output layout is NHWC.
//!
//! Aspect ratio is not preserved; every image is stretched to the target size.

use dermalens_shared::error::{DermalensError, Result};
use image::imageops::{self, FilterType};
use image::DynamicImage;
use tracing::debug;

/// Resolution the classifier was trained on, as `(width, height)`
pub const DEFAULT_IMAGE_SIZE: (u32, u32) = (128, 128);

/// Smallest side length accepted by [`validate_image`]
pub const MIN_IMAGE_SIDE: u32 = 32;

/// Number of color channels in a preprocessed tensor
pub const CHANNELS: usize = 3;

/// A dense `f32` tensor of shape `(1, H, W, 3)` in row-major NHWC order
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl ImageTensor {
    /// Wraps `data` with the given shape
    ///
    /// Fails when the element count does not match the shape.
    pub fn new(data: Vec<f32>, shape: [usize; 4]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(DermalensError::internal(
                format!(
                    "tensor of shape {:?} needs {} values, got {}",
                    shape,
                    expected,
                    data.len()
                ),
                None,
            ));
        }
        Ok(Self { data, shape })
    }

    /// Tensor of the given size with every value set to `value`
    pub fn filled(size: (u32, u32), value: f32) -> Self {
        let shape = [1, size.1 as usize, size.0 as usize, CHANNELS];
        Self {
            data: vec![value; shape.iter().product()],
            shape,
        }
    }

    /// `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// Flat view of the values
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Decodes `bytes` and runs the full preprocessing pipeline
///
/// The container format is sniffed from the bytes. Undecodable input fails
/// with [`DermalensError::Decode`].
///
/// # Examples
///
/// ```rust,no_run
/// use dermalens_inference::preprocess::{preprocess_image, DEFAULT_IMAGE_SIZE};
///
/// let bytes = std::fs::read("lesion.jpg")?;
/// let tensor = preprocess_image(&bytes, DEFAULT_IMAGE_SIZE)?;
/// assert_eq!(tensor.shape(), [1, 128, 128, 3]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn preprocess_image(bytes: &[u8], target: (u32, u32)) -> Result<ImageTensor> {
    let image = image::load_from_memory(bytes)?;
    preprocess_dynamic(&image, target)
}

/// Runs the preprocessing pipeline on an already decoded image
pub fn preprocess_dynamic(image: &DynamicImage, target: (u32, u32)) -> Result<ImageTensor> {
    let (width, height) = target;
    if width == 0 || height == 0 {
        return Err(DermalensError::configuration(
            format!("invalid target size {}x{}", width, height),
            None,
        ));
    }

    // Greyscale, indexed and alpha images all collapse to 3-channel RGB
    let rgb = image.to_rgb8();
    debug!(
        source_width = rgb.width(),
        source_height = rgb.height(),
        target_width = width,
        target_height = height,
        "Preprocessing image"
    );

    let resized = if rgb.dimensions() == target {
        rgb
    } else {
        imageops::resize(&rgb, width, height, FilterType::Lanczos3)
    };

    let data = resized
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect();

    ImageTensor::new(data, [1, height as usize, width as usize, CHANNELS])
}

/// Checks that `bytes` decode to an image of at least 32×32 pixels
///
/// Not part of the prediction path; small images are classified as-is.
pub fn validate_image(bytes: &[u8]) -> Result<()> {
    let image = image::load_from_memory(bytes)?;
    let (width, height) = (image.width(), image.height());
    if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
        return Err(DermalensError::TooSmall {
            width,
            height,
            min_side: MIN_IMAGE_SIDE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_tiny_png_is_resized_to_target() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]))),
            ImageFormat::Png,
        );

        let tensor = preprocess_image(&bytes, DEFAULT_IMAGE_SIZE).unwrap();
        assert_eq!(tensor.shape(), [1, 128, 128, 3]);
        assert_eq!(tensor.data().len(), 128 * 128 * 3);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_uniform_color_survives_resize() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([255, 0, 51]))),
            ImageFormat::Png,
        );

        let tensor = preprocess_image(&bytes, (16, 16)).unwrap();
        let px = &tensor.data()[..3];
        assert!((px[0] - 1.0).abs() < 1e-3);
        assert!(px[1].abs() < 1e-3);
        assert!((px[2] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_greyscale_and_alpha_become_rgb() {
        let grey = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([128]))),
            ImageFormat::Png,
        );
        let tensor = preprocess_image(&grey, (8, 8)).unwrap();
        assert_eq!(tensor.shape(), [1, 8, 8, 3]);
        let px = &tensor.data()[..3];
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);

        let rgba = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 40, Rgba([0, 255, 0, 10]))),
            ImageFormat::Png,
        );
        let tensor = preprocess_image(&rgba, (8, 8)).unwrap();
        assert_eq!(tensor.shape(), [1, 8, 8, 3]);
    }

    #[test]
    fn test_non_square_target_is_height_major() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 5, Rgb([0, 0, 0])));
        let tensor = preprocess_dynamic(&image, (20, 10)).unwrap();
        assert_eq!(tensor.shape(), [1, 10, 20, 3]);
    }

    #[test]
    fn test_garbage_bytes_fail_with_decode() {
        let err = preprocess_image(b"this is not an image", DEFAULT_IMAGE_SIZE).unwrap_err();
        assert!(matches!(err, DermalensError::Decode { .. }));
    }

    #[test]
    fn test_zero_target_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(preprocess_dynamic(&image, (0, 128)).is_err());
    }

    #[test]
    fn test_validate_image_minimum_size() {
        let small = encode(
            DynamicImage::ImageRgb8(RgbImage::new(10, 10)),
            ImageFormat::Png,
        );
        assert!(matches!(
            validate_image(&small),
            Err(DermalensError::TooSmall {
                width: 10,
                height: 10,
                ..
            })
        ));

        let ok = encode(
            DynamicImage::ImageRgb8(RgbImage::new(32, 40)),
            ImageFormat::Png,
        );
        assert!(validate_image(&ok).is_ok());
    }

    #[test]
    fn test_tensor_shape_mismatch() {
        assert!(ImageTensor::new(vec![0.0; 5], [1, 2, 2, 3]).is_err());
        let t = ImageTensor::filled((2, 3), 0.5);
        assert_eq!(t.shape(), [1, 3, 2, 3]);
        assert_eq!(t.data().len(), 18);
    }
}
