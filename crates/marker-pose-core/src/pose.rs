use nalgebra::{
    Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3, Vector6,
};
use serde::{Deserialize, Serialize};

/// Rigid transform from marker (model) space into camera space:
/// `X_cam = R * X_model + t`.
///
/// Serialized as a row-major rotation matrix plus translation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PoseRepr", into = "PoseRepr")]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct PoseRepr {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

impl From<Pose> for PoseRepr {
    fn from(pose: Pose) -> Self {
        let r = pose.rotation.matrix();
        Self {
            rotation: [
                [r[(0, 0)], r[(0, 1)], r[(0, 2)]],
                [r[(1, 0)], r[(1, 1)], r[(1, 2)]],
                [r[(2, 0)], r[(2, 1)], r[(2, 2)]],
            ],
            translation: pose.translation.into(),
        }
    }
}

impl From<PoseRepr> for Pose {
    fn from(repr: PoseRepr) -> Self {
        let rows = repr.rotation;
        let m = Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]);
        let rotation = nearest_rotation(&m).unwrap_or_else(|| Rotation3::from_matrix_unchecked(m));
        Self::new(rotation, Vector3::from(repr.translation))
    }
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Rotation3::identity(), Vector3::zeros())
    }

    /// Rotation given as a scaled axis (Rodrigues vector, radians).
    pub fn from_axis_angle(axis_angle: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(axis_angle), translation)
    }

    pub fn axis_angle(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * *p + self.translation
    }

    /// Apply a 6-vector increment `[omega; dt]`: `R' = exp(omega) * R`,
    /// `t' = t + dt`. The rotation is projected back onto SO(3).
    pub fn retract(&self, delta: &Vector6<f64>) -> Self {
        let omega = delta.fixed_rows::<3>(0).into_owned();
        let dt = delta.fixed_rows::<3>(3).into_owned();
        let product = Rotation3::new(omega) * self.rotation;
        let rotation = nearest_rotation(product.matrix()).unwrap_or(product);
        Self::new(rotation, self.translation + dt)
    }

    /// Angle (radians) of the relative rotation between two poses.
    pub fn rotation_angle_to(&self, other: &Pose) -> f64 {
        // atan2 form stays accurate near zero, unlike acos of the trace.
        let q = UnitQuaternion::from_rotation_matrix(&self.rotation.rotation_to(&other.rotation));
        2.0 * q.imag().norm().atan2(q.w.abs())
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }

    /// Interpolate towards `other`: slerp on rotation, lerp on translation.
    ///
    /// `t = 0` returns `self`, `t = 1` returns `other`. Antipodal rotations
    /// (no unique geodesic) snap to `other`'s rotation.
    pub fn interpolate(&self, other: &Pose, t: f64) -> Pose {
        let q0 = UnitQuaternion::from_rotation_matrix(&self.rotation);
        let q1 = UnitQuaternion::from_rotation_matrix(&other.rotation);
        let rotation = q0
            .try_slerp(&q1, t, 1e-9)
            .map(|q| q.to_rotation_matrix())
            .unwrap_or(other.rotation);
        let translation = self.translation.lerp(&other.translation, t);
        Pose::new(rotation, translation)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Closest proper rotation to `m` in the Frobenius sense (SVD polar
/// decomposition with `det = +1`).
pub fn nearest_rotation(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    if !m.iter().all(|v| v.is_finite()) {
        return None;
    }
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Some(Rotation3::from_matrix_unchecked(r))
}
