use marker_pose_core::UndistortConfig;
use serde::{Deserialize, Serialize};

/// A pose has 6 degrees of freedom and a homography needs 4 points.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Solver settings that would make a solve unbounded or meaningless.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum InvalidParams {
    #[error("initial_damping must be finite and positive, got {0}")]
    InitialDamping(f64),
    #[error("damping_increase must be finite and greater than 1, got {0}")]
    DampingIncrease(f64),
    #[error("damping_decrease must be in (0, 1), got {0}")]
    DampingDecrease(f64),
    #[error("damping bounds must satisfy 0 <= min_damping <= initial_damping < max_damping < inf (min {min}, max {max})")]
    DampingBounds { min: f64, max: f64 },
    #[error("tolerance `{name}` must be finite and non-negative, got {value}")]
    Tolerance { name: &'static str, value: f64 },
}

fn check_tolerance(name: &'static str, value: f64) -> Result<(), InvalidParams> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(InvalidParams::Tolerance { name, value })
    }
}

/// Levenberg-Marquardt settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmParams {
    /// Starting damping factor `lambda`.
    pub initial_damping: f64,
    /// Multiplier applied to `lambda` after a rejected step.
    pub damping_increase: f64,
    /// Multiplier applied to `lambda` after an accepted step.
    pub damping_decrease: f64,
    /// Refinement stops at a stationary point once `lambda` exceeds this.
    pub max_damping: f64,
    /// Lower clamp for `lambda`.
    pub min_damping: f64,
    /// Maximum number of accepted iterations.
    pub max_iterations: usize,
    /// Converged once `(cost - new_cost) / cost` falls below this.
    pub relative_cost_tolerance: f64,
    /// Converged once the sum of squared pixel residuals falls to this.
    pub absolute_cost_tolerance: f64,
    /// Converged once `max |J^T r|` falls to this.
    pub gradient_tolerance: f64,
}

impl Default for LmParams {
    fn default() -> Self {
        Self {
            initial_damping: 1e-3,
            damping_increase: 10.0,
            damping_decrease: 0.1,
            max_damping: 1e8,
            min_damping: 1e-12,
            max_iterations: 30,
            relative_cost_tolerance: 1e-6,
            absolute_cost_tolerance: 1e-12,
            gradient_tolerance: 1e-10,
        }
    }
}

/// Pose solver configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Inverse distortion applied to each observation.
    pub undistort: UndistortConfig,
    /// Non-linear refinement.
    pub refine: LmParams,
    /// Minimum usable correspondences; values below
    /// [`MIN_CORRESPONDENCES`] are raised to it.
    pub min_correspondences: usize,
    /// Largest out-of-plane deviation of a model point, relative to the
    /// model extent, still treated as planar.
    pub planarity_tolerance: f64,
    /// Ratio of the second to the first principal spread below which a point
    /// set counts as collinear.
    pub collinearity_tolerance: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            undistort: UndistortConfig::default(),
            refine: LmParams::default(),
            min_correspondences: MIN_CORRESPONDENCES,
            planarity_tolerance: 1e-3,
            collinearity_tolerance: 1e-3,
        }
    }
}

impl LmParams {
    /// Damping must strictly grow on rejection and be capped, otherwise the
    /// reject-and-retry loop has no exit.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        let l0 = self.initial_damping;
        if !l0.is_finite() || l0 <= 0.0 {
            return Err(InvalidParams::InitialDamping(l0));
        }
        if !self.damping_increase.is_finite() || self.damping_increase <= 1.0 {
            return Err(InvalidParams::DampingIncrease(self.damping_increase));
        }
        if !(self.damping_decrease > 0.0 && self.damping_decrease < 1.0) {
            return Err(InvalidParams::DampingDecrease(self.damping_decrease));
        }
        let (min, max) = (self.min_damping, self.max_damping);
        if !(min >= 0.0 && min <= l0 && l0 < max && max.is_finite()) {
            return Err(InvalidParams::DampingBounds { min, max });
        }
        check_tolerance("relative_cost_tolerance", self.relative_cost_tolerance)?;
        check_tolerance("absolute_cost_tolerance", self.absolute_cost_tolerance)?;
        check_tolerance("gradient_tolerance", self.gradient_tolerance)
    }
}

impl SolverParams {
    pub fn validate(&self) -> Result<(), InvalidParams> {
        self.refine.validate()?;
        check_tolerance("undistort.eps", self.undistort.eps)?;
        check_tolerance("planarity_tolerance", self.planarity_tolerance)?;
        check_tolerance("collinearity_tolerance", self.collinearity_tolerance)
    }

    pub fn required_correspondences(&self) -> usize {
        self.min_correspondences.max(MIN_CORRESPONDENCES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let params: SolverParams =
            serde_json::from_str(r#"{"refine": {"max_iterations": 5}}"#).expect("parse");
        assert_eq!(params.refine.max_iterations, 5);
        assert_eq!(params.refine.initial_damping, 1e-3);
        assert_eq!(params.undistort, UndistortConfig::default());
    }

    #[test]
    fn minimum_is_never_below_four() {
        let params = SolverParams {
            min_correspondences: 2,
            ..SolverParams::default()
        };
        assert_eq!(params.required_correspondences(), 4);
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SolverParams::default().validate(), Ok(()));
    }

    #[test]
    fn damping_schedules_without_an_exit_are_rejected() {
        let with = |f: fn(&mut LmParams)| {
            let mut p = LmParams::default();
            f(&mut p);
            p.validate()
        };
        assert_eq!(
            with(|p| p.damping_increase = 1.0),
            Err(InvalidParams::DampingIncrease(1.0))
        );
        assert_eq!(
            with(|p| p.initial_damping = 0.0),
            Err(InvalidParams::InitialDamping(0.0))
        );
        assert!(matches!(
            with(|p| p.max_damping = f64::INFINITY),
            Err(InvalidParams::DampingBounds { .. })
        ));
        assert!(matches!(
            with(|p| p.damping_decrease = 1.5),
            Err(InvalidParams::DampingDecrease(_))
        ));
        assert!(matches!(
            with(|p| p.gradient_tolerance = f64::NAN),
            Err(InvalidParams::Tolerance { name: "gradient_tolerance", .. })
        ));
    }
}
