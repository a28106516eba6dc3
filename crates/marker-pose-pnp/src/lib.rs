//! Pose of a planar marker from 2-D/3-D correspondences.
//!
//! The solver runs in two stages:
//! 1. observations are undistorted and a plane-to-image homography is
//!    estimated and decomposed into an initial pose;
//! 2. the pose is refined by Levenberg-Marquardt on the pixel reprojection
//!    error through the full distortion model.
//!
//! ```no_run
//! use marker_pose_core::{CameraModel, Correspondence, Intrinsics};
//! use marker_pose_pnp::{PoseSolver, SolverParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = CameraModel::pinhole(Intrinsics::new(1667.5, 1669.7, 954.6, 527.9));
//! let solver = PoseSolver::new(camera, SolverParams::default())?;
//! let correspondences: Vec<Correspondence> = Vec::new();
//! let estimate = solver.solve(&correspondences)?;
//! println!("mean error {:.3} px", estimate.mean_reprojection_error);
//! # Ok(())
//! # }
//! ```

mod error;
mod estimate;
mod params;
mod planar;
mod refine;
mod solver;

pub use error::{Degeneracy, PoseError};
pub use estimate::{PoseEstimate, StopReason};
pub use params::{InvalidParams, LmParams, SolverParams, MIN_CORRESPONDENCES};
pub use planar::{decompose_homography, PlaneFrame};
pub use refine::{refine_pose, Refined, MAX_REJECTED_STEPS};
pub use solver::{solve_pose, PoseSolver};
