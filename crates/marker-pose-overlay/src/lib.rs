//! Frame sequencing and cube overlays on top of the planar pose solver.
//!
//! [`FrameSequencer`] turns per-frame correspondences into [`FrameOutput`]
//! records: a projected cube when the pose is trusted, an explicit
//! tracking-lost record otherwise. One bad frame never stops the stream.

mod cube;
pub mod io;
mod ring;
mod sequencer;
mod smoothing;

pub use cube::{CubeError, CubeGeometry, CubeSpec, Extrude, ProjectedCube, CUBE_EDGES};
pub use io::{OverlayIoError, SessionConfig, SessionConfigError, DEFAULT_MAX_FRAME_GAP};
pub use ring::MarkerRing;
pub use sequencer::{
    FrameCorrespondences, FrameEstimate, FrameOutput, FrameSequencer, FrameState, GapFillPolicy,
    LostReason, Overlay, SequenceError, SequencerConfigError, SequencerParams,
};
pub use smoothing::{PoseSmoother, SmoothingParams};
