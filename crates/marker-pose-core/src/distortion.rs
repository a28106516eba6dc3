//! Brown-Conrady radial-tangential lens model.
//!
//! Works on normalized image coordinates `(X/Z, Y/Z)`. The forward mapping is
//! closed-form; the inverse runs a Newton iteration on the forward model.

use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistortionCoefficients {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

/// Settings for the iterative inverse.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndistortConfig {
    /// Maximum Newton iterations.
    pub max_iters: usize,
    /// Stop once `|distort(p) - p_d|` drops to this value (normalized units).
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-8,
        }
    }
}

/// Outcome of [`DistortionCoefficients::undistort`].
///
/// When `converged` is false, `point` is the iterate with the smallest
/// residual seen, not a failure sentinel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Undistorted {
    pub point: Point2<f64>,
    pub residual: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
#[error("undistortion did not converge after {iterations} iterations (residual {residual:.3e})")]
pub struct UndistortNonConvergent {
    pub best: Point2<f64>,
    pub residual: f64,
    pub iterations: usize,
}

impl Undistorted {
    /// Treat a non-converged inverse as an error.
    pub fn into_result(self) -> Result<Point2<f64>, UndistortNonConvergent> {
        if self.converged {
            Ok(self.point)
        } else {
            Err(UndistortNonConvergent {
                best: self.point,
                residual: self.residual,
                iterations: self.iterations,
            })
        }
    }
}

impl DistortionCoefficients {
    pub const NONE: Self = Self {
        k1: 0.0,
        k2: 0.0,
        p1: 0.0,
        p2: 0.0,
        k3: 0.0,
    };

    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Self { k1, k2, p1, p2, k3 }
    }

    /// Build from the usual `[k1, k2, p1, p2, k3]` ordering.
    pub fn from_array(c: [f64; 5]) -> Self {
        Self::new(c[0], c[1], c[2], c[3], c[4])
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|&c| c == 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }

    /// Ideal normalized point -> distorted normalized point.
    #[inline]
    pub fn distort(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xy = x * y;
        Point2::new(
            x * radial + 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy,
        )
    }

    /// Jacobian of [`distort`](Self::distort) with respect to the ideal point.
    pub fn jacobian(&self, p: Point2<f64>) -> Matrix2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        // d(radial)/d(r2)
        let d_radial = self.k1 + r2 * (2.0 * self.k2 + 3.0 * self.k3 * r2);

        let dxd_dx = radial + 2.0 * x * x * d_radial + 2.0 * self.p1 * y + 6.0 * self.p2 * x;
        let dxd_dy = 2.0 * x * y * d_radial + 2.0 * self.p1 * x + 2.0 * self.p2 * y;
        let dyd_dx = 2.0 * x * y * d_radial + 2.0 * self.p1 * x + 2.0 * self.p2 * y;
        let dyd_dy = radial + 2.0 * y * y * d_radial + 6.0 * self.p1 * y + 2.0 * self.p2 * x;

        Matrix2::new(dxd_dx, dxd_dy, dyd_dx, dyd_dy)
    }

    /// Distorted normalized point -> ideal normalized point.
    ///
    /// Newton iteration starting at the distorted point. A singular Jacobian
    /// falls back to a plain fixed-point step for that iteration.
    pub fn undistort(&self, distorted: Point2<f64>, cfg: &UndistortConfig) -> Undistorted {
        if self.is_zero() && distorted.x.is_finite() && distorted.y.is_finite() {
            return Undistorted {
                point: distorted,
                residual: 0.0,
                iterations: 0,
                converged: true,
            };
        }

        let mut p = distorted;
        let mut best = (p, f64::INFINITY);

        for iter in 0..=cfg.max_iters {
            let f: Vector2<f64> = self.distort(p) - distorted;
            let residual = f.norm();
            if !residual.is_finite() {
                break;
            }
            if residual < best.1 {
                best = (p, residual);
            }
            if residual <= cfg.eps {
                return Undistorted {
                    point: p,
                    residual,
                    iterations: iter,
                    converged: true,
                };
            }
            if iter == cfg.max_iters {
                break;
            }

            let step = match self.jacobian(p).try_inverse() {
                Some(j_inv) => j_inv * f,
                None => f,
            };
            p -= step;
        }

        Undistorted {
            point: best.0,
            residual: best.1,
            iterations: cfg.max_iters,
            converged: false,
        }
    }
}
