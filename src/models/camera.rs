//! Camera optics and reference plane

use serde::{Deserialize, Serialize};

/// Pinhole intrinsics, in pixels of an image of `image_width` x `image_height`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub image_width: usize,
    pub image_height: usize,
}

impl CameraIntrinsics {
    /// Whether focal lengths are usable for unprojection
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0
    }

    /// Rescale to a different resolution (e.g. RGB intrinsics applied to a depth map)
    pub fn scaled_to(&self, width: usize, height: usize) -> Self {
        if self.image_width == 0 || self.image_height == 0 {
            return *self;
        }
        let sx = width as f64 / self.image_width as f64;
        let sy = height as f64 / self.image_height as f64;
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
            image_width: width,
            image_height: height,
        }
    }

    /// Pinhole inverse: pixel (u, v) at `depth` meters to a camera-frame point
    pub fn unproject(&self, u: f64, v: f64, depth: f64) -> [f64; 3] {
        [
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        ]
    }
}

/// Plate plane in camera coordinates; height(p) = offset - normal . p
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePlane {
    pub normal: [f64; 3],
    pub offset: f64,
}

impl ReferencePlane {
    /// Fronto-parallel plane at a fixed depth
    pub fn flat_at_depth(depth_m: f64) -> Self {
        Self {
            normal: [0.0, 0.0, 1.0],
            offset: depth_m,
        }
    }

    /// Height of a point above the plane, toward the camera
    pub fn height_of(&self, point: [f64; 3]) -> f64 {
        let dot = self.normal[0] * point[0] + self.normal[1] * point[1] + self.normal[2] * point[2];
        self.offset - dot
    }
}
