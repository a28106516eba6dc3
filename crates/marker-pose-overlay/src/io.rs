//! Session configuration, correspondence CSV intake and JSON Lines reports.

use std::fmt::Display;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use marker_pose_core::{CameraModel, Correspondence, Intrinsics};
use marker_pose_pnp::{PoseError, PoseSolver, SolverParams};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::cube::{CubeError, CubeGeometry, CubeSpec};
use crate::ring::MarkerRing;
use crate::sequencer::{
    FrameCorrespondences, FrameOutput, FrameSequencer, SequencerConfigError, SequencerParams,
};

#[derive(thiserror::Error, Debug)]
pub enum OverlayIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("line {line}: {message}")]
    Parse { line: u64, message: String },
    #[error("frame {frame} follows frame {after}: gap exceeds {max_gap} frames")]
    FrameGap { after: u64, frame: u64, max_gap: u64 },
}

/// Largest run of missing frames [`fill_missing_frames`] fills by default.
pub const DEFAULT_MAX_FRAME_GAP: u64 = 10_000;

fn default_max_frame_gap() -> u64 {
    DEFAULT_MAX_FRAME_GAP
}

#[derive(thiserror::Error, Debug)]
pub enum SessionConfigError {
    #[error(transparent)]
    Solver(#[from] PoseError),
    #[error(transparent)]
    Cube(#[from] CubeError),
    #[error(transparent)]
    Sequencer(#[from] SequencerConfigError),
}

/// Everything needed to process one video: camera, overlay and tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub camera: CameraModel,
    #[serde(default)]
    pub cube: CubeSpec,
    /// Layout used to resolve rows that carry only a marker id.
    #[serde(default)]
    pub ring: MarkerRing,
    #[serde(default)]
    pub solver: SolverParams,
    #[serde(default)]
    pub sequencer: SequencerParams,
    /// Longest run of missing frame indices filled with empty frames; a
    /// larger jump in the input is an error.
    #[serde(default = "default_max_frame_gap")]
    pub max_frame_gap: u64,
}

impl SessionConfig {
    pub fn new(camera: CameraModel) -> Self {
        Self {
            camera,
            cube: CubeSpec::default(),
            ring: MarkerRing::default(),
            solver: SolverParams::default(),
            sequencer: SequencerParams::default(),
            max_frame_gap: DEFAULT_MAX_FRAME_GAP,
        }
    }

    /// Defaults around the 1920x1080 reference camera, without distortion.
    pub fn reference() -> Self {
        Self::new(CameraModel::pinhole(Intrinsics::new(
            1667.5, 1669.7, 954.6, 527.9,
        )))
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, OverlayIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, OverlayIoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), OverlayIoError> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn build_solver(&self) -> Result<PoseSolver, SessionConfigError> {
        Ok(PoseSolver::new(self.camera, self.solver)?)
    }

    pub fn build_sequencer(&self) -> Result<FrameSequencer, SessionConfigError> {
        let cube = CubeGeometry::from_spec(&self.cube)?;
        Ok(FrameSequencer::new(
            self.build_solver()?,
            cube,
            self.sequencer,
        )?)
    }
}

/// Read detector output from a CSV file. See [`parse_correspondences`].
pub fn read_correspondences_csv(
    path: impl AsRef<Path>,
    ring: &MarkerRing,
) -> Result<Vec<FrameCorrespondences>, OverlayIoError> {
    let file = fs::File::open(path)?;
    parse_correspondences(file, ring)
}

/// Parse `frame,marker_id,px,py[,X,Y,Z]` rows into per-frame groups.
///
/// Rows without model coordinates take them from `ring`. A leading header
/// row is skipped, as are lines starting with `#`. Frame indices must not
/// decrease from one row to the next.
pub fn parse_correspondences<R: Read>(
    reader: R,
    ring: &MarkerRing,
) -> Result<Vec<FrameCorrespondences>, OverlayIoError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut frames: Vec<FrameCorrespondences> = Vec::new();
    for (idx, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let line = rec.position().map_or(idx as u64 + 1, |p| p.line());
        if idx == 0 && is_header(&rec) {
            continue;
        }
        let (frame, corr) = parse_row(&rec, ring, line)?;

        match frames.last_mut() {
            Some(last) if last.frame == frame => {
                last.correspondences.push(corr);
                continue;
            }
            Some(last) if last.frame > frame => {
                return Err(OverlayIoError::Parse {
                    line,
                    message: format!("frame {frame} follows frame {}", last.frame),
                });
            }
            _ => {}
        }
        frames.push(FrameCorrespondences::new(frame, vec![corr]));
    }
    debug!(
        "parsed {} correspondences in {} frames",
        frames.iter().map(|f| f.correspondences.len()).sum::<usize>(),
        frames.len()
    );
    Ok(frames)
}

fn is_header(rec: &StringRecord) -> bool {
    rec.get(0).is_some_and(|f| f.parse::<f64>().is_err())
}

fn field(rec: &StringRecord, i: usize, line: u64) -> Result<&str, OverlayIoError> {
    rec.get(i).ok_or_else(|| OverlayIoError::Parse {
        line,
        message: format!("missing column {}", i + 1),
    })
}

fn parse_field<T>(rec: &StringRecord, i: usize, line: u64) -> Result<T, OverlayIoError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = field(rec, i, line)?;
    raw.parse::<T>().map_err(|e| OverlayIoError::Parse {
        line,
        message: format!("column {}: {raw:?}: {e}", i + 1),
    })
}

fn parse_row(
    rec: &StringRecord,
    ring: &MarkerRing,
    line: u64,
) -> Result<(u64, Correspondence), OverlayIoError> {
    let frame: u64 = parse_field(rec, 0, line)?;
    let pixel = Point2::<f64>::new(parse_field(rec, 2, line)?, parse_field(rec, 3, line)?);
    let model = match rec.len() {
        4 => ring.model_point(parse_field(rec, 1, line)?),
        7 => Point3::<f64>::new(
            parse_field(rec, 4, line)?,
            parse_field(rec, 5, line)?,
            parse_field(rec, 6, line)?,
        ),
        n => {
            return Err(OverlayIoError::Parse {
                line,
                message: format!("expected 4 or 7 columns, got {n}"),
            })
        }
    };
    Ok((frame, Correspondence::new(model, pixel)))
}

/// Insert empty frames for indices the detector skipped, so every frame in
/// the covered range gets a record.
///
/// A jump of more than `max_gap` missing indices is rejected with
/// [`OverlayIoError::FrameGap`] before anything is allocated for it.
pub fn fill_missing_frames(
    frames: Vec<FrameCorrespondences>,
    max_gap: u64,
) -> Result<Vec<FrameCorrespondences>, OverlayIoError> {
    let mut out: Vec<FrameCorrespondences> = Vec::with_capacity(frames.len());
    for f in frames {
        if let Some(prev) = out.last().map(|p| p.frame) {
            let missing = f.frame.saturating_sub(prev).saturating_sub(1);
            if missing > max_gap {
                return Err(OverlayIoError::FrameGap {
                    after: prev,
                    frame: f.frame,
                    max_gap,
                });
            }
            out.extend((prev + 1..f.frame).map(|frame| FrameCorrespondences::new(frame, Vec::new())));
        }
        out.push(f);
    }
    Ok(out)
}

/// Write one JSON object per line.
pub fn write_reports_jsonl<W: Write>(
    writer: W,
    outputs: &[FrameOutput],
) -> Result<(), OverlayIoError> {
    let mut w = BufWriter::new(writer);
    for out in outputs {
        serde_json::to_writer(&mut w, out)?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(())
}

/// Read a report written by [`write_reports_jsonl`].
pub fn read_reports_jsonl(path: impl AsRef<Path>) -> Result<Vec<FrameOutput>, OverlayIoError> {
    let raw = fs::read_to_string(path)?;
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(OverlayIoError::from))
        .collect()
}
