//! Distortion-aware forward projection.
//!
//! `X_c = R * X_m + t` -> perspective divide -> lens distortion -> pixels.

use nalgebra::{Matrix2, Matrix2x3, Matrix2x6, Matrix3x6, Point2, Point3};

use crate::camera::CameraModel;
use crate::pose::Pose;

/// Points closer to the image plane than this (camera units) are treated as
/// behind the camera.
pub const MIN_DEPTH: f64 = 1e-9;

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum ProjectError {
    #[error("point is behind the camera (depth {depth:.3e})")]
    BehindCamera { depth: f64 },
}

/// Batch projection where some points could not be projected.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("{} of {} points are behind the camera", .behind.len(), .points.len())]
pub struct PartialProjection {
    /// One entry per input point; `None` where projection failed.
    pub points: Vec<Option<Point2<f64>>>,
    /// Indices of the points behind the camera.
    pub behind: Vec<usize>,
}

/// Derivative of a projected pixel with respect to the 6 pose parameters
/// `[omega_x, omega_y, omega_z, t_x, t_y, t_z]` of [`Pose::retract`].
pub type PoseJacobian = Matrix2x6<f64>;

impl CameraModel {
    /// Project a point already expressed in camera coordinates.
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Result<Point2<f64>, ProjectError> {
        // `!(z > MIN_DEPTH)` also rejects NaN depths.
        if !(pc.z > MIN_DEPTH) {
            return Err(ProjectError::BehindCamera { depth: pc.z });
        }
        let normalized = Point2::new(pc.x / pc.z, pc.y / pc.z);
        Ok(self.normalized_to_pixel(normalized))
    }

    /// Project a model point through `pose`.
    pub fn project(&self, pose: &Pose, model: &Point3<f64>) -> Result<Point2<f64>, ProjectError> {
        self.project_camera_point(&pose.transform_point(model))
    }

    /// Project every point; the batch succeeds only if all points do.
    pub fn project_points(
        &self,
        pose: &Pose,
        model: &[Point3<f64>],
    ) -> Result<Vec<Point2<f64>>, PartialProjection> {
        let projected: Vec<Option<Point2<f64>>> =
            model.iter().map(|p| self.project(pose, p).ok()).collect();
        let behind: Vec<usize> = projected
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.is_none().then_some(i))
            .collect();
        if behind.is_empty() {
            Ok(projected.into_iter().flatten().collect())
        } else {
            Err(PartialProjection {
                points: projected,
                behind,
            })
        }
    }

    /// Project a model point and return the pixel Jacobian with respect to a
    /// left-multiplied rotation increment and an additive translation.
    pub fn project_with_jacobian(
        &self,
        pose: &Pose,
        model: &Point3<f64>,
    ) -> Result<(Point2<f64>, PoseJacobian), ProjectError> {
        let rotated = pose.rotation * model.coords;
        let pc = Point3::from(rotated + pose.translation);
        let pixel = self.project_camera_point(&pc)?;

        let inv_z = 1.0 / pc.z;
        let normalized = Point2::new(pc.x * inv_z, pc.y * inv_z);

        // d(normalized) / d(X_c)
        let d_norm = Matrix2x3::new(
            inv_z, 0.0, -pc.x * inv_z * inv_z, //
            0.0, inv_z, -pc.y * inv_z * inv_z,
        );

        // d(X_c) / d[omega, t]: exp(omega) R X ~ R X + omega x (R X)
        let mut d_cam = Matrix3x6::zeros();
        d_cam
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(-rotated.cross_matrix()));
        d_cam.fixed_view_mut::<3, 3>(0, 3).fill_with_identity();

        let k = &self.intrinsics;
        let focal = Matrix2::new(k.fx, 0.0, 0.0, k.fy);
        let jacobian = focal * self.distortion.jacobian(normalized) * d_norm * d_cam;

        Ok((pixel, jacobian))
    }
}
