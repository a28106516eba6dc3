use marker_pose_core::InvalidIntrinsics;

use crate::params::InvalidParams;
use serde::{Deserialize, Serialize};

/// Which part of the input makes the pose unsolvable.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degeneracy {
    #[error("model points are collinear or coincident")]
    CollinearModel,
    #[error("image points are collinear or coincident")]
    CollinearImage,
    #[error("plane-to-image homography is rank deficient")]
    RankDeficientHomography,
    #[error("homography does not decompose into a rigid pose")]
    Decomposition,
    #[error("initial pose puts observed points behind the camera")]
    BehindCamera,
}

/// Errors returned by the pose solver.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum PoseError {
    #[error("need at least {required} usable correspondences, got {actual}")]
    InsufficientCorrespondences { required: usize, actual: usize },
    #[error("degenerate configuration: {0}")]
    DegenerateConfiguration(Degeneracy),
    #[error("model points are not coplanar (relative deviation {deviation:.3e})")]
    NonPlanarModel { deviation: f64 },
    #[error("refinement did not converge in {iterations} iterations (mean error {mean_error:.3} px)")]
    NonConvergent { iterations: usize, mean_error: f64 },
    #[error(transparent)]
    Camera(#[from] InvalidIntrinsics),
    #[error(transparent)]
    Params(#[from] InvalidParams),
}

impl From<Degeneracy> for PoseError {
    fn from(value: Degeneracy) -> Self {
        Self::DegenerateConfiguration(value)
    }
}
