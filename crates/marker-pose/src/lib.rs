//! High-level facade for the `marker-pose-*` workspace.
//!
//! Given per-frame 2-D/3-D correspondences for a planar marker and a
//! calibrated camera, recover the marker pose and project a virtual cube
//! onto it.
//!
//! ## Quickstart
//!
//! ```no_run
//! use marker_pose::overlay::io::read_correspondences_csv;
//! use marker_pose::overlay::SessionConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = SessionConfig::load_json("session.json")?;
//! let frames = read_correspondences_csv("correspondences.csv", &cfg.ring)?;
//! let mut sequencer = cfg.build_sequencer()?;
//! for out in sequencer.process_all(&frames)? {
//!     println!("frame {}: {:?}", out.frame, out.state);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `marker_pose::core`: camera model, lens distortion, poses, projection.
//! - `marker_pose::pnp`: planar pose solver (homography + Levenberg-Marquardt).
//! - `marker_pose::overlay`: cube geometry, frame sequencer, file formats.

pub use marker_pose_core as core;
pub use marker_pose_overlay as overlay;
pub use marker_pose_pnp as pnp;
pub use nalgebra;

pub use marker_pose_core::{
    CameraModel, Correspondence, DistortionCoefficients, Intrinsics, Pose, ProjectError,
};
pub use marker_pose_overlay::{
    CubeGeometry, CubeSpec, FrameCorrespondences, FrameOutput, FrameSequencer, FrameState,
    SessionConfig,
};
pub use marker_pose_pnp::{PoseError, PoseEstimate, PoseSolver, SolverParams};

/// Run a whole correspondence stream through a session config.
///
/// Frames the detector skipped are filled in (and reported as lost); a jump
/// longer than `config.max_frame_gap` is an error.
pub fn track(
    config: &SessionConfig,
    frames: Vec<FrameCorrespondences>,
) -> Result<Vec<FrameOutput>, Box<dyn std::error::Error + Send + Sync>> {
    let frames = overlay::io::fill_missing_frames(frames, config.max_frame_gap)?;
    let mut sequencer = config.build_sequencer()?;
    #[cfg(feature = "rayon")]
    let outputs = sequencer.process_batch(&frames)?;
    #[cfg(not(feature = "rayon"))]
    let outputs = sequencer.process_all(&frames)?;
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn track_fills_gaps_and_emits_overlays() {
        let cfg = SessionConfig::reference();
        let pose = Pose::from_axis_angle(Vector3::new(0.1, 0.2, 0.0), Vector3::new(0.0, 0.0, 650.0));
        let view = |frame| {
            let correspondences = (0..24)
                .map(|id| {
                    let m = cfg.ring.model_point(id);
                    Correspondence::new(m, cfg.camera.project(&pose, &m).expect("in front"))
                })
                .collect();
            FrameCorrespondences::new(frame, correspondences)
        };

        let outputs = track(&cfg, vec![view(10), view(13)]).expect("track");
        let states: Vec<_> = outputs.iter().map(|o| (o.frame, o.state)).collect();
        assert_eq!(
            states,
            [
                (10, FrameState::OverlayEmitted),
                (11, FrameState::TrackingLost),
                (12, FrameState::TrackingLost),
                (13, FrameState::OverlayEmitted),
            ]
        );
    }

    #[test]
    fn track_rejects_absurd_frame_jumps() {
        let mut cfg = SessionConfig::reference();
        cfg.max_frame_gap = 5;
        let frames = vec![
            FrameCorrespondences::new(0, Vec::new()),
            FrameCorrespondences::new(4_000_000_000, Vec::new()),
        ];
        let err = track(&cfg, frames).unwrap_err();
        assert!(err.to_string().contains("gap exceeds 5 frames"));
    }
}
