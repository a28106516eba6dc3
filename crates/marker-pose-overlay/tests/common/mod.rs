#![allow(dead_code)]

use marker_pose_core::{CameraModel, Correspondence, Intrinsics, Pose};
use marker_pose_overlay::{
    CubeGeometry, CubeSpec, FrameCorrespondences, FrameSequencer, MarkerRing, SequencerParams,
};
use marker_pose_pnp::{PoseSolver, SolverParams};
use nalgebra::{Vector2, Vector3};

pub fn camera() -> CameraModel {
    CameraModel::pinhole(Intrinsics::new(1667.5, 1669.7, 954.6, 527.9))
}

pub fn sequencer(params: SequencerParams) -> FrameSequencer {
    sequencer_with(SolverParams::default(), params)
}

pub fn sequencer_with(solver: SolverParams, params: SequencerParams) -> FrameSequencer {
    let solver = PoseSolver::new(camera(), solver).expect("valid camera");
    let cube = CubeGeometry::from_spec(&CubeSpec::default()).expect("valid cube");
    FrameSequencer::new(solver, cube, params).expect("valid params")
}

pub fn pose(yaw: f64, z: f64) -> Pose {
    Pose::from_axis_angle(Vector3::new(0.2, yaw, 0.05), Vector3::new(10.0, -5.0, z))
}

/// Full ring of 24 markers seen from `pose`.
pub fn frame(index: u64, pose: &Pose) -> FrameCorrespondences {
    let ring = MarkerRing::default();
    let cam = camera();
    let correspondences = (0..24)
        .map(|id| {
            let m = ring.model_point(id);
            Correspondence::new(m, cam.project(pose, &m).expect("in front"))
        })
        .collect();
    FrameCorrespondences::new(index, correspondences)
}

/// Alternating +-`amplitude` pixel offsets: large, deterministic residuals.
pub fn jittered(index: u64, pose: &Pose, amplitude: f64) -> FrameCorrespondences {
    let mut f = frame(index, pose);
    for (i, c) in f.correspondences.iter_mut().enumerate() {
        let s = if i % 2 == 0 { amplitude } else { -amplitude };
        c.pixel += Vector2::new(s, -s * 0.5);
    }
    f
}

/// Too few points to solve.
pub fn sparse(index: u64, pose: &Pose) -> FrameCorrespondences {
    let mut f = frame(index, pose);
    f.correspondences.truncate(3);
    f
}
