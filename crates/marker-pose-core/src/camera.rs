use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

use crate::distortion::{DistortionCoefficients, UndistortConfig, Undistorted};

/// Pinhole intrinsics (no skew).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum InvalidIntrinsics {
    #[error("invalid intrinsics (fx={fx}, fy={fy}, cx={cx}, cy={cy})")]
    Intrinsics { fx: f64, fy: f64, cx: f64, cy: f64 },
    #[error("distortion coefficients must be finite")]
    Distortion,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Finite values and focal lengths away from zero.
    pub fn validate(self) -> Result<Self, InvalidIntrinsics> {
        let finite = [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite());
        if finite && self.fx.abs() > 1e-12 && self.fy.abs() > 1e-12 {
            Ok(self)
        } else {
            Err(InvalidIntrinsics::Intrinsics {
                fx: self.fx,
                fy: self.fy,
                cx: self.cx,
                cy: self.cy,
            })
        }
    }

    /// The 3x3 camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read `fx, fy, cx, cy` from a camera matrix; skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    #[inline]
    pub fn pixel_to_normalized(&self, pixel: Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, normalized: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * normalized.x + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }
}

/// Intrinsics plus lens distortion. Fixed for a whole session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    #[serde(default)]
    pub distortion: DistortionCoefficients,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: DistortionCoefficients) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Distortion-free camera.
    pub fn pinhole(intrinsics: Intrinsics) -> Self {
        Self::new(intrinsics, DistortionCoefficients::NONE)
    }

    pub fn validate(self) -> Result<Self, InvalidIntrinsics> {
        self.intrinsics.validate()?;
        if !self.distortion.is_finite() {
            return Err(InvalidIntrinsics::Distortion);
        }
        Ok(self)
    }

    /// Observed pixel -> ideal normalized coordinates.
    pub fn undistort_pixel(&self, pixel: Point2<f64>, cfg: &UndistortConfig) -> Undistorted {
        let distorted = self.intrinsics.pixel_to_normalized(pixel);
        self.distortion.undistort(distorted, cfg)
    }

    /// Ideal normalized coordinates -> observed pixel.
    #[inline]
    pub fn normalized_to_pixel(&self, normalized: Point2<f64>) -> Point2<f64> {
        self.intrinsics
            .normalized_to_pixel(self.distortion.distort(normalized))
    }
}
