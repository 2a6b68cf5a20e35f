//! Segmentation evidence for the food region

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mask loading errors
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Failed to decode mask image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Mask bitmap has {actual} samples, expected {expected}")]
    BitmapLength { expected: usize, actual: usize },

    #[error("Mask dimensions {width}x{height} overflow the pixel count")]
    TooLarge { width: usize, height: usize },
}

/// Axis-aligned box in normalized [0, 1] image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    /// Area as a fraction of the image, clipped to the unit square
    pub fn area(&self) -> f64 {
        let x0 = self.x.clamp(0.0, 1.0);
        let y0 = self.y.clamp(0.0, 1.0);
        let x1 = (self.x + self.width).clamp(0.0, 1.0);
        let y1 = (self.y + self.height).clamp(0.0, 1.0);
        ((x1 - x0) * (y1 - y0)).max(0.0)
    }

    /// Pixel bounds `(x0, y0, x1, y1)` (exclusive end) for an image of the given size
    pub fn pixel_bounds(&self, width: usize, height: usize) -> (usize, usize, usize, usize) {
        let to_px = |v: f64, extent: usize| -> usize {
            let px = (v.clamp(0.0, 1.0) * extent as f64).round();
            (px as usize).min(extent)
        };
        let x0 = to_px(self.x, width);
        let y0 = to_px(self.y, height);
        let x1 = to_px(self.x + self.width, width).max(x0);
        let y1 = to_px(self.y + self.height, height).max(y0);
        (x0, y0, x1, y1)
    }
}

/// Grayscale mask at its own resolution; bright = food
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMaskBitmap")]
pub struct MaskBitmap {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

#[derive(Deserialize)]
struct RawMaskBitmap {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl TryFrom<RawMaskBitmap> for MaskBitmap {
    type Error = MaskError;

    fn try_from(raw: RawMaskBitmap) -> Result<Self, Self::Error> {
        MaskBitmap::new(raw.width, raw.height, raw.data)
    }
}

impl MaskBitmap {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, MaskError> {
        let expected = width
            .checked_mul(height)
            .ok_or(MaskError::TooLarge { width, height })?;
        if data.len() != expected {
            return Err(MaskError::BitmapLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Decode any image format `image` understands and keep its luma channel
    pub fn from_image_file<P: AsRef<Path>>(path: P) -> Result<Self, MaskError> {
        let luma = image::open(path)?.to_luma8();
        let (width, height) = luma.dimensions();
        Self::new(width as usize, height as usize, luma.into_raw())
    }

    /// Normalized box around every pixel brighter than `threshold` of full scale
    pub fn bounding_box(&self, threshold: f64) -> Option<NormalizedRect> {
        let cutoff = threshold * f64::from(u8::MAX);
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            if f64::from(v) <= cutoff {
                continue;
            }
            let (x, y) = (i % self.width, i / self.width);
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        let (x0, y0, x1, y1) = bounds?;
        let (w, h) = (self.width as f64, self.height as f64);
        Some(NormalizedRect {
            x: x0 as f64 / w,
            y: y0 as f64 / h,
            width: (x1 - x0 + 1) as f64 / w,
            height: (y1 - y0 + 1) as f64 / h,
        })
    }

    /// Whether the depth pixel (x, y) of a `depth_width` x `depth_height` map
    /// falls inside the mask. Inside means luma above `threshold` of full scale.
    pub fn contains_scaled(
        &self,
        x: usize,
        y: usize,
        depth_width: usize,
        depth_height: usize,
        threshold: f64,
    ) -> bool {
        if self.width == 0 || self.height == 0 || depth_width == 0 || depth_height == 0 {
            return false;
        }
        let mx = (x * self.width / depth_width).min(self.width - 1);
        let my = (y * self.height / depth_height).min(self.height - 1);
        f64::from(self.data[my * self.width + mx]) > threshold * f64::from(u8::MAX)
    }
}

/// Segmentation result supplied alongside a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRegionMask {
    pub bounding_box: NormalizedRect,
    #[serde(default)]
    pub bitmap: Option<MaskBitmap>,
    pub confidence: f64,
}

impl FoodRegionMask {
    /// Whether depth pixel (x, y) belongs to the food region. Without a bitmap
    /// the bounding box stands in for the mask.
    pub fn contains(
        &self,
        x: usize,
        y: usize,
        depth_width: usize,
        depth_height: usize,
        threshold: f64,
    ) -> bool {
        match self.bitmap {
            Some(ref bitmap) => bitmap.contains_scaled(x, y, depth_width, depth_height, threshold),
            None => {
                let (x0, y0, x1, y1) = self.bounding_box.pixel_bounds(depth_width, depth_height);
                x >= x0 && x < x1 && y >= y0 && y < y1
            }
        }
    }
}
