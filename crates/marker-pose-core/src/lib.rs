//! Core geometry for planar marker pose tracking.
//!
//! This crate is intentionally small and purely geometric: camera intrinsics,
//! the radial-tangential lens model, rigid poses and the distortion-aware
//! projector. It does *not* know how correspondences are detected.
//!
//! Conventions:
//! - pixel coordinates have their origin at the top-left pixel corner,
//!   `x` to the right and `y` down;
//! - camera space is `x` right, `y` down, `z` forward (optical axis);
//! - a [`Pose`] maps marker (model) coordinates into camera coordinates.

mod camera;
mod correspondence;
mod distortion;
mod homography;
mod logger;
mod pose;
mod projector;

pub use camera::{CameraModel, Intrinsics, InvalidIntrinsics};
pub use correspondence::Correspondence;
pub use distortion::{DistortionCoefficients, UndistortConfig, UndistortNonConvergent, Undistorted};
pub use homography::{estimate_homography, Homography, HomographyError};
pub use pose::{nearest_rotation, Pose};
pub use projector::{PartialProjection, ProjectError, PoseJacobian, MIN_DEPTH};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init, init_with_level, LoggerConfig};
