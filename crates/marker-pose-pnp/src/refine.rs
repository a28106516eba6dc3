//! Levenberg-Marquardt refinement of a pose on pixel reprojection error.

use log::{debug, trace};
use marker_pose_core::{CameraModel, Correspondence, Pose, ProjectError};
use nalgebra::{Matrix6, Vector6};

use crate::estimate::StopReason;
use crate::params::LmParams;

/// Rejected steps tolerated within one iteration before the pose is treated
/// as stationary, whatever the damping schedule.
pub const MAX_REJECTED_STEPS: usize = 64;

/// Result of [`refine_pose`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Refined {
    pub pose: Pose,
    /// Sum of squared pixel residuals at `pose`.
    pub cost: f64,
    /// Accepted iterations.
    pub iterations: usize,
    pub stop_reason: StopReason,
}

impl Refined {
    pub fn converged(&self) -> bool {
        self.stop_reason.is_converged()
    }
}

/// Normal equations of one linearization.
struct Linearized {
    jtj: Matrix6<f64>,
    gradient: Vector6<f64>,
    cost: f64,
}

fn linearize(
    camera: &CameraModel,
    correspondences: &[Correspondence],
    pose: &Pose,
) -> Result<Linearized, ProjectError> {
    let mut jtj = Matrix6::zeros();
    let mut gradient = Vector6::zeros();
    let mut cost = 0.0;
    for c in correspondences {
        let (pixel, j) = camera.project_with_jacobian(pose, &c.model)?;
        let r = pixel - c.pixel;
        jtj += j.transpose() * j;
        gradient += j.transpose() * r;
        cost += r.norm_squared();
    }
    Ok(Linearized {
        jtj,
        gradient,
        cost,
    })
}

/// Sum of squared residuals; `None` if any point is behind the camera.
fn evaluate_cost(camera: &CameraModel, correspondences: &[Correspondence], pose: &Pose) -> Option<f64> {
    correspondences.iter().try_fold(0.0, |acc, c| {
        let pixel = camera.project(pose, &c.model).ok()?;
        Some(acc + (pixel - c.pixel).norm_squared())
    })
}

/// Minimize the squared pixel reprojection error starting from `initial`.
///
/// Steps solve `(JᵀJ + λ diag(JᵀJ)) δ = -Jᵀr` and are applied with
/// [`Pose::retract`]. A step that raises the cost (or moves a point behind the
/// camera) is rejected and retried with larger `λ`, at most
/// [`MAX_REJECTED_STEPS`] times per iteration. Fails only when the initial
/// pose already puts a point behind the camera.
pub fn refine_pose(
    camera: &CameraModel,
    correspondences: &[Correspondence],
    initial: Pose,
    params: &LmParams,
) -> Result<Refined, ProjectError> {
    let mut pose = initial;
    let mut lin = linearize(camera, correspondences, &pose)?;
    let mut lambda = params.initial_damping;
    let mut iterations = 0;

    let stop_reason = 'outer: loop {
        if lin.cost <= params.absolute_cost_tolerance {
            break StopReason::AbsoluteCost;
        }
        if lin.gradient.amax() <= params.gradient_tolerance {
            break StopReason::Gradient;
        }
        if iterations >= params.max_iterations {
            break StopReason::MaxIterations;
        }

        let mut rejected = 0;
        let (candidate, candidate_cost) = loop {
            let mut damped = lin.jtj;
            for k in 0..6 {
                damped[(k, k)] += lambda * lin.jtj[(k, k)].max(1e-9);
            }
            let step = damped.cholesky().map(|ch| ch.solve(&(-lin.gradient)));
            if let Some(delta) = step.filter(|d| d.iter().all(|v| v.is_finite())) {
                let candidate = pose.retract(&delta);
                match evaluate_cost(camera, correspondences, &candidate) {
                    Some(cost) if cost < lin.cost => break (candidate, cost),
                    cost => trace!("rejected step: lambda={lambda:.3e} cost={cost:?}"),
                }
            }
            lambda *= params.damping_increase;
            rejected += 1;
            if !(lambda <= params.max_damping) || rejected >= MAX_REJECTED_STEPS {
                break 'outer StopReason::Stationary;
            }
        };

        iterations += 1;
        let relative = (lin.cost - candidate_cost) / lin.cost;
        pose = candidate;
        lambda = (lambda * params.damping_decrease).max(params.min_damping);
        lin = linearize(camera, correspondences, &pose)?;
        trace!(
            "lm iter {iterations}: cost={:.6e} relative={relative:.3e} lambda={lambda:.3e}",
            lin.cost
        );

        if relative < params.relative_cost_tolerance {
            break StopReason::RelativeCost;
        }
    };

    debug!(
        "lm finished after {iterations} iterations: cost={:.6e} reason={stop_reason:?}",
        lin.cost
    );

    Ok(Refined {
        pose,
        cost: lin.cost,
        iterations,
        stop_reason,
    })
}
