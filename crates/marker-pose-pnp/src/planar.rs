//! Linear initialisation for planar targets.

use marker_pose_core::{nearest_rotation, Pose};
use nalgebra::{Matrix2, Matrix3, Point2, Point3, Rotation3, Vector3};

use crate::error::{Degeneracy, PoseError};

/// 2-D coordinate frame of the plane containing the model points.
///
/// `axes` has the in-plane directions as its first two columns and the plane
/// normal as the third. Model points with `Z = 0` keep their own axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneFrame {
    pub origin: Point3<f64>,
    pub axes: Rotation3<f64>,
}

impl PlaneFrame {
    /// Fit the plane through `points` (centroid + principal axes).
    ///
    /// Fails with `CollinearModel` when the second principal spread is below
    /// `collinearity_tolerance` times the first, and with `NonPlanarModel`
    /// when a point leaves the plane by more than `planarity_tolerance`
    /// times the model extent.
    pub fn fit(
        points: &[Point3<f64>],
        collinearity_tolerance: f64,
        planarity_tolerance: f64,
    ) -> Result<Self, PoseError> {
        if points.is_empty() {
            return Err(Degeneracy::CollinearModel.into());
        }
        let n = points.len() as f64;
        let origin = Point3::from(points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n);

        let cov = points.iter().fold(Matrix3::zeros(), |acc, p| {
            let d = p - origin;
            acc + d * d.transpose()
        }) / n;
        let eig = cov.symmetric_eigen();

        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
        let l0 = eig.eigenvalues[order[0]];
        let l1 = eig.eigenvalues[order[1]].max(0.0);
        if !l0.is_finite() || l0 <= 0.0 || (l1 / l0).sqrt() < collinearity_tolerance {
            return Err(Degeneracy::CollinearModel.into());
        }

        let axes = if points.iter().all(|p| p.z == 0.0) {
            Rotation3::identity()
        } else {
            let e0 = eig.eigenvectors.column(order[0]).into_owned();
            let e1 = eig.eigenvectors.column(order[1]).into_owned();
            let normal = e0.cross(&e1);
            nearest_rotation(&Matrix3::from_columns(&[e0, e1, normal]))
                .ok_or(PoseError::DegenerateConfiguration(Degeneracy::CollinearModel))?
        };

        let normal = axes.matrix().column(2).into_owned();
        let extent = points
            .iter()
            .map(|p| (p - origin).norm())
            .fold(0.0, f64::max);
        let deviation = points
            .iter()
            .map(|p| normal.dot(&(p - origin)).abs())
            .fold(0.0, f64::max)
            / extent;
        if deviation > planarity_tolerance {
            return Err(PoseError::NonPlanarModel { deviation });
        }

        Ok(Self { origin, axes })
    }

    /// In-plane coordinates of a model point.
    pub fn to_plane(&self, p: &Point3<f64>) -> Point2<f64> {
        let local = self.axes.inverse() * (p - self.origin);
        Point2::new(local.x, local.y)
    }

    /// Convert a plane-to-camera pose into the model-to-camera pose.
    pub fn to_model_pose(&self, plane_pose: &Pose) -> Pose {
        let rotation = plane_pose.rotation * self.axes.inverse();
        let translation = plane_pose.translation - rotation * self.origin.coords;
        Pose::new(rotation, translation)
    }
}

/// Reject image points that are coincident or lie on a line.
pub(crate) fn check_image_spread(
    points: &[Point2<f64>],
    collinearity_tolerance: f64,
) -> Result<(), Degeneracy> {
    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.coords).sum::<nalgebra::Vector2<f64>>() / n;
    let cov = points.iter().fold(Matrix2::zeros(), |acc, p| {
        let d = p.coords - mean;
        acc + d * d.transpose()
    }) / n;
    let eig = cov.symmetric_eigen();
    let hi = eig.eigenvalues.max();
    let lo = eig.eigenvalues.min().max(0.0);
    if !hi.is_finite() || hi <= 0.0 || (lo / hi).sqrt() < collinearity_tolerance {
        return Err(Degeneracy::CollinearImage);
    }
    Ok(())
}

/// Decompose a plane-to-normalized-image homography `H ~ [r1 r2 t]`.
///
/// The scale is `2 / (|h1| + |h2|)` with the sign chosen so the plane origin
/// lies in front of the camera; the rotation is projected onto SO(3).
pub fn decompose_homography(h: &Matrix3<f64>) -> Result<Pose, Degeneracy> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let (n1, n2) = (h1.norm(), h2.norm());
    if !(n1 > 0.0 && n2 > 0.0) || !(n1 + n2).is_finite() || h3.z == 0.0 {
        return Err(Degeneracy::Decomposition);
    }
    let scale = (2.0 / (n1 + n2)).copysign(h3.z);

    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let r3 = r1.cross(&r2);
    let rotation = nearest_rotation(&Matrix3::from_columns(&[r1, r2, r3]))
        .ok_or(Degeneracy::Decomposition)?;

    Ok(Pose::new(rotation, h3 * scale))
}
