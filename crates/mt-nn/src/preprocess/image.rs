// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Image loading, resizing, and normalization.

use crate::error::{NnError, NnResult};
use image::imageops::FilterType;
use image::RgbImage;
use mt_tensor::Tensor;
use std::path::Path;

/// Sigma matching a 3x3 Gaussian kernel, enough to knock down sensor
/// speckle without washing out edges.
const DEFAULT_BLUR_SIGMA: f32 = 0.8;

/// Decodes image files into channel-major unit-interval rows of a fixed
/// spatial extent. Every image is resized, mildly blurred, and scaled
/// to [0,1].
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    target_hw: (u32, u32),
    blur_sigma: f32,
}

impl ImagePipeline {
    /// Pipeline producing `height x width x 3` rows.
    pub fn new(height: usize, width: usize) -> NnResult<Self> {
        if height == 0 || width == 0 {
            return Err(NnError::configuration(format!(
                "image target {height}x{width} must be non-zero"
            )));
        }
        Ok(Self {
            target_hw: (height as u32, width as u32),
            blur_sigma: DEFAULT_BLUR_SIGMA,
        })
    }

    /// Overrides the smoothing strength.
    pub fn with_blur(mut self, sigma: f32) -> NnResult<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(NnError::configuration(format!(
                "blur sigma must be positive and finite, got {sigma}"
            )));
        }
        self.blur_sigma = sigma;
        Ok(self)
    }

    /// Shape of the rows this pipeline emits.
    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.target_hw.0 as usize, self.target_hw.1 as usize, 3]
    }

    /// Decodes and processes an image file.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> NnResult<Tensor> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NnError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let decoded = image::open(path)
            .map_err(|err| NnError::conversion(format!("{}: {err}", path.display())))?;
        self.process(decoded.to_rgb8())
    }

    /// Resizes, smooths, and normalizes an already-decoded RGB image.
    pub fn process(&self, rgb: RgbImage) -> NnResult<Tensor> {
        let (height, width) = self.target_hw;
        let resized = if rgb.dimensions() == (width, height) {
            rgb
        } else {
            image::imageops::resize(&rgb, width, height, FilterType::Triangle)
        };
        let resized = image::imageops::blur(&resized, self.blur_sigma);
        let (height, width) = (height as usize, width as usize);
        // Channel-major layout: all red values, then green, then blue.
        let mut data = vec![0.0f32; 3 * height * width];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let spatial = y as usize * width + x as usize;
            for channel in 0..3 {
                data[channel * height * width + spatial] = pixel.0[channel] as f32 / 255.0;
            }
        }
        Ok(Tensor::from_vec(1, 3 * height * width, data)?)
    }
}
