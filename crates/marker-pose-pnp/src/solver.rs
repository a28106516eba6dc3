use log::{debug, warn};
use marker_pose_core::{estimate_homography, CameraModel, Correspondence, Pose};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::{Degeneracy, PoseError};
use crate::estimate::PoseEstimate;
use crate::params::SolverParams;
use crate::planar::{check_image_spread, decompose_homography, PlaneFrame};
use crate::refine::refine_pose;

/// Planar pose solver bound to one camera.
///
/// Stateless across calls: every [`solve`](Self::solve) starts from the
/// linear initialisation, never from a previous result.
#[derive(Clone, Debug)]
pub struct PoseSolver {
    camera: CameraModel,
    params: SolverParams,
}

/// Observations that survived undistortion.
struct Usable {
    correspondences: Vec<Correspondence>,
    normalized: Vec<Point2<f64>>,
    used: Vec<usize>,
    dropped: Vec<usize>,
}

impl PoseSolver {
    /// Fails on invalid intrinsics or on parameters that cannot bound a
    /// solve (see [`SolverParams::validate`]).
    pub fn new(camera: CameraModel, params: SolverParams) -> Result<Self, PoseError> {
        params.validate()?;
        Ok(Self {
            camera: camera.validate()?,
            params,
        })
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Estimate the model-to-camera pose from one frame's correspondences.
    ///
    /// A refinement that hits its iteration cap is still returned, with
    /// `converged = false`; see [`PoseEstimate::require_converged`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, correspondences), fields(n = correspondences.len()))
    )]
    pub fn solve(&self, correspondences: &[Correspondence]) -> Result<PoseEstimate, PoseError> {
        let required = self.params.required_correspondences();
        if correspondences.len() < required {
            return Err(PoseError::InsufficientCorrespondences {
                required,
                actual: correspondences.len(),
            });
        }

        let usable = self.undistort_all(correspondences);
        if usable.used.len() < required {
            return Err(PoseError::InsufficientCorrespondences {
                required,
                actual: usable.used.len(),
            });
        }

        let initial = self.initial_pose_from(&usable)?;
        let refined = refine_pose(
            &self.camera,
            &usable.correspondences,
            initial,
            &self.params.refine,
        )
        .map_err(|_| Degeneracy::BehindCamera)?;

        let residuals = usable
            .correspondences
            .iter()
            .map(|c| {
                self.camera
                    .project(&refined.pose, &c.model)
                    .map(|px| (px - c.pixel).norm())
                    .map_err(|_| PoseError::from(Degeneracy::BehindCamera))
            })
            .collect::<Result<Vec<f64>, PoseError>>()?;
        let n = residuals.len() as f64;
        let mean_reprojection_error = residuals.iter().sum::<f64>() / n;
        let rms_reprojection_error = (refined.cost / n).sqrt();

        let converged = refined.converged();
        if !converged {
            warn!(
                "pose refinement stopped at {} iterations without converging (mean error {:.3} px)",
                refined.iterations, mean_reprojection_error
            );
        }
        debug!(
            "pose solved from {} points ({} dropped): mean error {:.4} px, {} iterations",
            usable.used.len(),
            usable.dropped.len(),
            mean_reprojection_error,
            refined.iterations
        );

        Ok(PoseEstimate {
            pose: refined.pose,
            mean_reprojection_error,
            rms_reprojection_error,
            residuals,
            iterations: refined.iterations,
            converged,
            stop_reason: refined.stop_reason,
            used: usable.used,
            dropped: usable.dropped,
        })
    }

    /// Homography-based pose before refinement.
    pub fn initial_pose(&self, correspondences: &[Correspondence]) -> Result<Pose, PoseError> {
        let usable = self.undistort_all(correspondences);
        let required = self.params.required_correspondences();
        if usable.used.len() < required {
            return Err(PoseError::InsufficientCorrespondences {
                required,
                actual: usable.used.len(),
            });
        }
        self.initial_pose_from(&usable)
    }

    fn initial_pose_from(&self, usable: &Usable) -> Result<Pose, PoseError> {
        let models: Vec<_> = usable.correspondences.iter().map(|c| c.model).collect();
        let frame = PlaneFrame::fit(
            &models,
            self.params.collinearity_tolerance,
            self.params.planarity_tolerance,
        )?;
        check_image_spread(&usable.normalized, self.params.collinearity_tolerance)?;

        let plane: Vec<_> = models.iter().map(|m| frame.to_plane(m)).collect();
        let h = estimate_homography(&plane, &usable.normalized)
            .map_err(|_| Degeneracy::RankDeficientHomography)?;
        let plane_pose = decompose_homography(&h.h)?;
        Ok(frame.to_model_pose(&plane_pose))
    }

    fn undistort_all(&self, correspondences: &[Correspondence]) -> Usable {
        let mut usable = Usable {
            correspondences: Vec::with_capacity(correspondences.len()),
            normalized: Vec::with_capacity(correspondences.len()),
            used: Vec::with_capacity(correspondences.len()),
            dropped: Vec::new(),
        };
        for (i, c) in correspondences.iter().enumerate() {
            if !c.is_finite() {
                warn!("dropping correspondence {i}: non-finite coordinates");
                usable.dropped.push(i);
                continue;
            }
            let und = self.camera.undistort_pixel(c.pixel, &self.params.undistort);
            if !und.converged {
                warn!(
                    "dropping correspondence {i}: undistortion residual {:.3e} after {} iterations",
                    und.residual, und.iterations
                );
                usable.dropped.push(i);
                continue;
            }
            usable.correspondences.push(*c);
            usable.normalized.push(und.point);
            usable.used.push(i);
        }
        usable
    }
}

/// One-shot form of [`PoseSolver::solve`].
pub fn solve_pose(
    camera: &CameraModel,
    correspondences: &[Correspondence],
    params: &SolverParams,
) -> Result<PoseEstimate, PoseError> {
    PoseSolver::new(*camera, *params)?.solve(correspondences)
}
