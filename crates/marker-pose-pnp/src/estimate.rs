use marker_pose_core::Pose;
use serde::{Deserialize, Serialize};

use crate::error::PoseError;

/// Why the refinement stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    RelativeCost,
    AbsoluteCost,
    Gradient,
    /// Damping saturated without finding a better pose.
    Stationary,
    MaxIterations,
}

impl StopReason {
    pub fn is_converged(self) -> bool {
        !matches!(self, StopReason::MaxIterations)
    }
}

/// Solver output for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub pose: Pose,
    /// Mean pixel distance between observations and reprojections.
    pub mean_reprojection_error: f64,
    pub rms_reprojection_error: f64,
    /// Pixel error per used correspondence, in the order of `used`.
    pub residuals: Vec<f64>,
    /// Accepted refinement iterations.
    pub iterations: usize,
    pub converged: bool,
    pub stop_reason: StopReason,
    /// Input indices that took part in the solve.
    pub used: Vec<usize>,
    /// Input indices dropped before the solve (non-finite or not undistortable).
    pub dropped: Vec<usize>,
}

impl PoseEstimate {
    /// Turn a low-confidence estimate into [`PoseError::NonConvergent`].
    pub fn require_converged(self) -> Result<Self, PoseError> {
        if self.converged {
            Ok(self)
        } else {
            Err(PoseError::NonConvergent {
                iterations: self.iterations,
                mean_error: self.mean_reprojection_error,
            })
        }
    }

    pub fn max_reprojection_error(&self) -> f64 {
        self.residuals.iter().copied().fold(0.0, f64::max)
    }
}
