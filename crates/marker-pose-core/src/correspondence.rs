use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// A known model point and where it was observed in one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Point in the marker's own frame.
    pub model: Point3<f64>,
    /// Observed (distorted) pixel position.
    pub pixel: Point2<f64>,
}

impl Correspondence {
    pub fn new(model: Point3<f64>, pixel: Point2<f64>) -> Self {
        Self { model, pixel }
    }

    pub fn is_finite(&self) -> bool {
        self.model
            .coords
            .iter()
            .chain(self.pixel.coords.iter())
            .all(|v| v.is_finite())
    }
}
