use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Markers placed on a circle in the `Z = 0` plane, one every `step_degrees`.
///
/// Marker `id` sits at `(R cos(id * step), R sin(id * step), 0)`. The default
/// matches the printed target: 70 mm radius, 15 degrees clockwise per id.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerRing {
    pub radius: f64,
    pub step_degrees: f64,
}

impl Default for MarkerRing {
    fn default() -> Self {
        Self {
            radius: 70.0,
            step_degrees: -15.0,
        }
    }
}

impl MarkerRing {
    pub fn model_point(&self, id: u32) -> Point3<f64> {
        let theta = (self.step_degrees * f64::from(id)).to_radians();
        Point3::new(self.radius * theta.cos(), self.radius * theta.sin(), 0.0)
    }

    /// Ids that give distinct positions (a full turn), if the step divides 360.
    pub fn marker_count(&self) -> Option<u32> {
        let n = 360.0 / self.step_degrees.abs();
        (n.is_finite() && n >= 1.0 && (n - n.round()).abs() < 1e-9).then(|| n.round() as u32)
    }
}
