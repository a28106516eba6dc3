//! Per-frame pipeline: correspondences -> pose -> cube overlay.

use log::{debug, info, warn};
use marker_pose_core::{Correspondence, Pose};
use marker_pose_pnp::{Degeneracy, PoseError, PoseEstimate, PoseSolver};
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::cube::{CubeGeometry, ProjectedCube};
use crate::smoothing::{PoseSmoother, SmoothingParams};

/// Where a frame ended up in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameState {
    AwaitingCorrespondences,
    PoseEstimated,
    OverlayEmitted,
    TrackingLost,
}

/// What to draw while tracking is lost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum GapFillPolicy {
    /// Emit nothing.
    #[default]
    None,
    /// Re-project the cube with the last good pose for up to `max_frames`
    /// consecutive lost frames.
    HoldLast { max_frames: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerParams {
    /// Mean reprojection error (pixels) above which a pose is rejected.
    pub max_reprojection_error: f64,
    pub gap_fill: GapFillPolicy,
    /// Display smoothing; `None` keeps frames independent.
    pub smoothing: Option<SmoothingParams>,
    /// Treat a refinement that hit its iteration cap as tracking lost even
    /// when its error passes the threshold.
    pub require_converged: bool,
}

impl Default for SequencerParams {
    fn default() -> Self {
        Self {
            max_reprojection_error: 2.0,
            gap_fill: GapFillPolicy::None,
            smoothing: None,
            require_converged: false,
        }
    }
}

/// One frame of detector output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameCorrespondences {
    pub frame: u64,
    pub correspondences: Vec<Correspondence>,
}

impl FrameCorrespondences {
    pub fn new(frame: u64, correspondences: Vec<Correspondence>) -> Self {
        Self {
            frame,
            correspondences,
        }
    }
}

/// Why a frame has no fresh overlay.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LostReason {
    #[error("need {required} correspondences, got {actual}")]
    InsufficientCorrespondences { required: usize, actual: usize },
    #[error("degenerate configuration: {degeneracy}")]
    DegenerateConfiguration { degeneracy: Degeneracy },
    #[error("model points are not coplanar (relative deviation {deviation:.3e})")]
    NonPlanarModel { deviation: f64 },
    #[error("refinement did not converge after {iterations} iterations")]
    NonConvergent { iterations: usize, mean_error: f64 },
    #[error("mean reprojection error {mean_error:.3} px exceeds {threshold:.3} px")]
    ReprojectionError { mean_error: f64, threshold: f64 },
    #[error("cube vertices {vertices:?} are behind the camera")]
    BehindCamera { vertices: Vec<usize> },
    #[error("solver error: {message}")]
    Solver { message: String },
}

impl From<PoseError> for LostReason {
    fn from(err: PoseError) -> Self {
        match err {
            PoseError::InsufficientCorrespondences { required, actual } => {
                Self::InsufficientCorrespondences { required, actual }
            }
            PoseError::DegenerateConfiguration(degeneracy) => {
                Self::DegenerateConfiguration { degeneracy }
            }
            PoseError::NonPlanarModel { deviation } => Self::NonPlanarModel { deviation },
            PoseError::NonConvergent {
                iterations,
                mean_error,
            } => Self::NonConvergent {
                iterations,
                mean_error,
            },
            other => Self::Solver {
                message: other.to_string(),
            },
        }
    }
}

/// Projected cube ready for a renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub vertices: [[f64; 2]; 8],
    /// Pixel end points of the 12 cube edges.
    pub edges: [[[f64; 2]; 2]; 12],
    /// Pose the cube was projected with (smoothed, when enabled).
    pub pose: Pose,
    /// Re-projected from the last good pose while tracking is lost.
    #[serde(default)]
    pub held: bool,
}

impl Overlay {
    fn new(cube: &ProjectedCube, pose: Pose, held: bool) -> Self {
        Self {
            vertices: cube.vertices.map(|p| [p.x, p.y]),
            edges: cube
                .edge_segments()
                .map(|[a, b]| [[a.x, a.y], [b.x, b.y]]),
            pose,
            held,
        }
    }
}

/// Record emitted for every frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameOutput {
    pub frame: u64,
    pub state: FrameState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
    /// Mean reprojection error of the solved pose, if the solver succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose_error: Option<f64>,
    /// Raw per-frame pose, if the solver succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost: Option<LostReason>,
}

impl FrameOutput {
    pub fn has_fresh_overlay(&self) -> bool {
        self.state == FrameState::OverlayEmitted
    }
}

/// Result of [`FrameSequencer::estimate`], before any cross-frame state is
/// touched.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameEstimate {
    pub frame: u64,
    /// Solver output; kept when the pose is rejected by the error threshold.
    pub estimate: Option<PoseEstimate>,
    /// Set when the frame cannot produce a fresh overlay.
    pub lost: Option<LostReason>,
}

impl FrameEstimate {
    pub fn state(&self) -> FrameState {
        match (&self.estimate, &self.lost) {
            (Some(_), None) => FrameState::PoseEstimated,
            _ => FrameState::TrackingLost,
        }
    }
}

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceError {
    #[error("frame {frame} arrived after frame {last}")]
    OutOfOrder { frame: u64, last: u64 },
}

#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum SequencerConfigError {
    #[error("reprojection threshold must be finite and positive, got {0}")]
    Threshold(f64),
    #[error("smoothing alpha must be in (0, 1], got {0}")]
    SmoothingAlpha(f64),
}

/// Drives pose estimation and overlay emission over a stream of frames.
///
/// The only cross-frame state is the last good pose (for gap filling), the
/// lost-frame streak and the optional display smoother. The solver never
/// sees a previous pose.
#[derive(Clone, Debug)]
pub struct FrameSequencer {
    solver: PoseSolver,
    cube: CubeGeometry,
    params: SequencerParams,
    smoother: Option<PoseSmoother>,
    last_good: Option<Pose>,
    lost_streak: usize,
    last_frame: Option<u64>,
    state: FrameState,
}

impl FrameSequencer {
    pub fn new(
        solver: PoseSolver,
        cube: CubeGeometry,
        params: SequencerParams,
    ) -> Result<Self, SequencerConfigError> {
        let t = params.max_reprojection_error;
        if !t.is_finite() || t <= 0.0 {
            return Err(SequencerConfigError::Threshold(t));
        }
        let smoother = match params.smoothing {
            Some(s) if !s.is_valid() => return Err(SequencerConfigError::SmoothingAlpha(s.alpha)),
            Some(s) => Some(PoseSmoother::new(s)),
            None => None,
        };
        Ok(Self {
            solver,
            cube,
            params,
            smoother,
            last_good: None,
            lost_streak: 0,
            last_frame: None,
            state: FrameState::AwaitingCorrespondences,
        })
    }

    pub fn solver(&self) -> &PoseSolver {
        &self.solver
    }

    pub fn cube(&self) -> &CubeGeometry {
        &self.cube
    }

    pub fn params(&self) -> &SequencerParams {
        &self.params
    }

    /// State of the most recently committed frame;
    /// `AwaitingCorrespondences` before the first one.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Last frame index committed.
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Last pose that produced a fresh overlay.
    pub fn last_good_pose(&self) -> Option<&Pose> {
        self.last_good.as_ref()
    }

    /// Solve and threshold one frame. Pure: safe to run for many frames in
    /// parallel.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, input), fields(frame = input.frame, n = input.correspondences.len()))
    )]
    pub fn estimate(&self, input: &FrameCorrespondences) -> FrameEstimate {
        match self.solver.solve(&input.correspondences) {
            Ok(estimate) => {
                let mean_error = estimate.mean_reprojection_error;
                let threshold = self.params.max_reprojection_error;
                let lost = if !(mean_error <= threshold) {
                    Some(LostReason::ReprojectionError {
                        mean_error,
                        threshold,
                    })
                } else if self.params.require_converged && !estimate.converged {
                    Some(LostReason::NonConvergent {
                        iterations: estimate.iterations,
                        mean_error,
                    })
                } else {
                    None
                };
                FrameEstimate {
                    frame: input.frame,
                    estimate: Some(estimate),
                    lost,
                }
            }
            Err(err) => FrameEstimate {
                frame: input.frame,
                estimate: None,
                lost: Some(err.into()),
            },
        }
    }

    /// Apply an estimate to the stream state and build the frame record.
    ///
    /// Frames must be committed with strictly increasing indices; an
    /// out-of-order frame is rejected before any state changes.
    pub fn commit(&mut self, estimate: FrameEstimate) -> Result<FrameOutput, SequenceError> {
        if let Some(last) = self.last_frame {
            if estimate.frame <= last {
                return Err(SequenceError::OutOfOrder {
                    frame: estimate.frame,
                    last,
                });
            }
        }
        self.last_frame = Some(estimate.frame);

        let FrameEstimate {
            frame,
            estimate,
            lost,
        } = estimate;
        let pose_error = estimate.as_ref().map(|e| e.mean_reprojection_error);
        let converged = estimate.as_ref().map(|e| e.converged);
        let raw_pose = estimate.as_ref().map(|e| e.pose);

        let lost = match (raw_pose, lost) {
            (_, Some(reason)) => reason,
            (Some(pose), None) => {
                let display = match self.smoother.as_mut() {
                    Some(s) => s.apply(&pose),
                    None => pose,
                };
                match self.cube.project(self.solver.camera(), &display) {
                    Ok(cube) => {
                        self.last_good = Some(display);
                        self.lost_streak = 0;
                        self.state = FrameState::OverlayEmitted;
                        debug!("frame {frame}: overlay emitted");
                        return Ok(FrameOutput {
                            frame,
                            state: FrameState::OverlayEmitted,
                            overlay: Some(Overlay::new(&cube, display, false)),
                            pose_error,
                            pose: raw_pose,
                            converged,
                            lost: None,
                        });
                    }
                    Err(partial) => LostReason::BehindCamera {
                        vertices: partial.behind,
                    },
                }
            }
            (None, None) => LostReason::Solver {
                message: "no estimate".to_string(),
            },
        };

        warn!("frame {frame}: tracking lost ({lost})");
        if let Some(s) = self.smoother.as_mut() {
            s.reset();
        }
        self.lost_streak += 1;
        self.state = FrameState::TrackingLost;

        Ok(FrameOutput {
            frame,
            state: FrameState::TrackingLost,
            overlay: self.held_overlay(),
            pose_error,
            pose: raw_pose,
            converged,
            lost: Some(lost),
        })
    }

    fn held_overlay(&self) -> Option<Overlay> {
        let GapFillPolicy::HoldLast { max_frames } = self.params.gap_fill else {
            return None;
        };
        if self.lost_streak > max_frames {
            return None;
        }
        let pose = self.last_good?;
        let cube = self.cube.project(self.solver.camera(), &pose).ok()?;
        Some(Overlay::new(&cube, pose, true))
    }

    /// Estimate and commit one frame.
    pub fn process(&mut self, input: &FrameCorrespondences) -> Result<FrameOutput, SequenceError> {
        if let Some(last) = self.last_frame {
            if input.frame <= last {
                return Err(SequenceError::OutOfOrder {
                    frame: input.frame,
                    last,
                });
            }
        }
        let estimate = self.estimate(input);
        self.commit(estimate)
    }

    /// Reject a batch that is not strictly increasing or does not follow the
    /// last committed frame.
    fn check_order<'a, I>(&self, frames: I) -> Result<(), SequenceError>
    where
        I: IntoIterator<Item = &'a FrameCorrespondences>,
    {
        let mut last = self.last_frame;
        for f in frames {
            if let Some(prev) = last {
                if f.frame <= prev {
                    return Err(SequenceError::OutOfOrder {
                        frame: f.frame,
                        last: prev,
                    });
                }
            }
            last = Some(f.frame);
        }
        Ok(())
    }

    /// Process frames in order.
    ///
    /// The whole batch is checked for ordering first; on error no frame is
    /// committed and the sequencer state is unchanged.
    pub fn process_all<'a, I>(&mut self, frames: I) -> Result<Vec<FrameOutput>, SequenceError>
    where
        I: IntoIterator<Item = &'a FrameCorrespondences>,
    {
        let frames: Vec<&FrameCorrespondences> = frames.into_iter().collect();
        self.check_order(frames.iter().copied())?;
        let outputs = frames
            .into_iter()
            .map(|f| self.process(f))
            .collect::<Result<Vec<_>, _>>()?;
        log_summary(&outputs);
        Ok(outputs)
    }

    /// Estimate frames in parallel, then commit them in stream order.
    ///
    /// Ordering is checked as in [`process_all`](Self::process_all).
    #[cfg(feature = "rayon")]
    pub fn process_batch(
        &mut self,
        frames: &[FrameCorrespondences],
    ) -> Result<Vec<FrameOutput>, SequenceError> {
        self.check_order(frames)?;

        let estimates: Vec<FrameEstimate> = {
            let this = &*self;
            frames.par_iter().map(|f| this.estimate(f)).collect()
        };
        let outputs = estimates
            .into_iter()
            .map(|e| self.commit(e))
            .collect::<Result<Vec<_>, _>>()?;
        log_summary(&outputs);
        Ok(outputs)
    }
}

fn log_summary(outputs: &[FrameOutput]) {
    let emitted = outputs.iter().filter(|o| o.has_fresh_overlay()).count();
    let held = outputs
        .iter()
        .filter(|o| o.overlay.as_ref().is_some_and(|ov| ov.held))
        .count();
    info!(
        "{} frames: {} overlays, {} lost ({} held)",
        outputs.len(),
        emitted,
        outputs.len() - emitted,
        held
    );
}
