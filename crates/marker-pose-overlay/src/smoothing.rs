use marker_pose_core::Pose;
use serde::{Deserialize, Serialize};

/// Exponential smoothing of the displayed pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    /// Weight of the newest pose, in `(0, 1]`; `1` disables smoothing.
    pub alpha: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

impl SmoothingParams {
    pub fn is_valid(&self) -> bool {
        self.alpha > 0.0 && self.alpha <= 1.0
    }
}

/// Blends each new pose with the previous output: slerp on rotation, lerp on
/// translation. The first pose after construction or [`reset`](Self::reset)
/// passes through unchanged.
#[derive(Clone, Debug)]
pub struct PoseSmoother {
    alpha: f64,
    last: Option<Pose>,
}

impl PoseSmoother {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            alpha: params.alpha.clamp(f64::MIN_POSITIVE, 1.0),
            last: None,
        }
    }

    pub fn apply(&mut self, pose: &Pose) -> Pose {
        let smoothed = match self.last {
            Some(last) => last.interpolate(pose, self.alpha),
            None => *pose,
        };
        self.last = Some(smoothed);
        smoothed
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn current(&self) -> Option<&Pose> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn first_pose_passes_through_then_blends() {
        let mut s = PoseSmoother::new(SmoothingParams { alpha: 0.25 });
        let a = Pose::from_axis_angle(Vector3::zeros(), Vector3::new(0.0, 0.0, 100.0));
        let b = Pose::from_axis_angle(Vector3::new(0.0, 0.4, 0.0), Vector3::new(8.0, 0.0, 100.0));

        assert_eq!(s.apply(&a), a);
        let out = s.apply(&b);
        assert_relative_eq!(out.translation, Vector3::new(2.0, 0.0, 100.0), epsilon = 1e-12);
        assert_relative_eq!(out.axis_angle(), Vector3::new(0.0, 0.1, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn reset_forgets_history() {
        let mut s = PoseSmoother::new(SmoothingParams { alpha: 0.1 });
        let a = Pose::from_axis_angle(Vector3::zeros(), Vector3::new(0.0, 0.0, 100.0));
        let b = Pose::from_axis_angle(Vector3::zeros(), Vector3::new(50.0, 0.0, 100.0));
        s.apply(&a);
        s.reset();
        assert!(s.current().is_none());
        assert_eq!(s.apply(&b), b);
    }

    #[test]
    fn alpha_range() {
        assert!(SmoothingParams { alpha: 1.0 }.is_valid());
        assert!(!SmoothingParams { alpha: 0.0 }.is_valid());
        assert!(!SmoothingParams { alpha: f64::NAN }.is_valid());
    }
}
