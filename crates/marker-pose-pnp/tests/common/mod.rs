//! Synthetic scenes shared by the solver integration tests.
#![allow(dead_code)]

use marker_pose_core::{CameraModel, Correspondence, DistortionCoefficients, Intrinsics, Pose};
use nalgebra::{Point3, Vector2, Vector3};

pub fn reference_intrinsics() -> Intrinsics {
    Intrinsics::new(1667.5, 1669.7, 954.6, 527.9)
}

pub fn pinhole() -> CameraModel {
    CameraModel::pinhole(reference_intrinsics())
}

pub fn distorted() -> CameraModel {
    CameraModel::new(
        reference_intrinsics(),
        DistortionCoefficients::new(-0.12, 0.03, 4e-4, -2e-4, 0.001),
    )
}

/// Markers every 15 degrees on a 70 mm circle, `Z = 0`.
pub fn ring(count: usize) -> Vec<Point3<f64>> {
    (0..count)
        .map(|id| {
            let theta = (-15.0 * id as f64).to_radians();
            Point3::new(70.0 * theta.cos(), 70.0 * theta.sin(), 0.0)
        })
        .collect()
}

pub fn tilted_pose() -> Pose {
    Pose::from_axis_angle(Vector3::new(0.25, -0.15, 0.1), Vector3::new(15.0, -10.0, 600.0))
}

pub fn observe(camera: &CameraModel, pose: &Pose, model: &[Point3<f64>]) -> Vec<Correspondence> {
    model
        .iter()
        .map(|m| Correspondence::new(*m, camera.project(pose, m).expect("point in front")))
        .collect()
}

/// Deterministic Gaussian pixel noise (SplitMix64 + Box-Muller).
#[derive(Clone, Copy, Debug)]
pub struct GaussianNoise {
    pub seed: u64,
    pub sigma_px: f64,
}

impl GaussianNoise {
    pub fn sample(&self, point_idx: usize) -> Vector2<f64> {
        let key = self.seed ^ (point_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        // 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - unit(splitmix64(key));
        let u2 = unit(splitmix64(key ^ 0x94D0_49BB_1331_11EB));
        let r = (-2.0 * u1.ln()).sqrt() * self.sigma_px;
        let phi = std::f64::consts::TAU * u2;
        Vector2::new(r * phi.cos(), r * phi.sin())
    }

    pub fn apply(&self, correspondences: &[Correspondence]) -> Vec<Correspondence> {
        correspondences
            .iter()
            .enumerate()
            .map(|(i, c)| Correspondence::new(c.model, c.pixel + self.sample(i)))
            .collect()
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(x: u64) -> f64 {
    (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}
