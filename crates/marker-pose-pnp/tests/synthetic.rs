mod common;

use common::*;
use marker_pose_core::{Correspondence, Pose, UndistortConfig};
use marker_pose_pnp::{
    solve_pose, Degeneracy, InvalidParams, LmParams, PoseError, PoseSolver, SolverParams,
    StopReason,
};
use nalgebra::{Point2, Point3, Rotation3, Vector3};

fn solve(camera: &marker_pose_core::CameraModel, corrs: &[Correspondence]) -> marker_pose_pnp::PoseEstimate {
    solve_pose(camera, corrs, &SolverParams::default()).expect("solve")
}

#[test]
fn noiseless_ring_recovers_pose() {
    for camera in [pinhole(), distorted()] {
        let gt = tilted_pose();
        let corrs = observe(&camera, &gt, &ring(24));
        let est = solve(&camera, &corrs);

        assert!(est.converged);
        assert!(est.pose.rotation_angle_to(&gt).to_degrees() < 0.5);
        let rel = (est.pose.translation - gt.translation).norm() / gt.translation.norm();
        assert!(rel < 1e-6, "relative translation error {rel}");
        assert!(est.mean_reprojection_error < 1e-6);
        assert_eq!(est.used.len(), 24);
        assert!(est.dropped.is_empty());
    }
}

#[test]
fn pixel_noise_degrades_gracefully() {
    let camera = distorted();
    let gt = tilted_pose();
    let clean = observe(&camera, &gt, &ring(24));

    let mut previous = 0.0;
    for sigma in [0.25, 1.0, 3.0] {
        let noisy = GaussianNoise { seed: 7, sigma_px: sigma }.apply(&clean);
        let est = solve(&camera, &noisy);
        assert!(est.converged);
        assert!(
            est.mean_reprojection_error > 0.4 * sigma && est.mean_reprojection_error < 2.0 * sigma,
            "sigma {sigma}: mean error {}",
            est.mean_reprojection_error
        );
        assert!(est.mean_reprojection_error > previous);
        assert!(est.pose.rotation_angle_to(&gt).to_degrees() < 2.0 * sigma);
        previous = est.mean_reprojection_error;
    }
}

#[test]
fn fewer_than_four_points_is_insufficient() {
    let camera = pinhole();
    let corrs = observe(&camera, &tilted_pose(), &ring(3));
    assert_eq!(
        solve_pose(&camera, &corrs, &SolverParams::default()),
        Err(PoseError::InsufficientCorrespondences {
            required: 4,
            actual: 3
        })
    );
}

#[test]
fn dropped_points_count_against_the_minimum() {
    let camera = pinhole();
    let mut corrs = observe(&camera, &tilted_pose(), &ring(4));
    corrs[2].pixel = Point2::new(f64::NAN, 10.0);
    assert_eq!(
        solve_pose(&camera, &corrs, &SolverParams::default()),
        Err(PoseError::InsufficientCorrespondences {
            required: 4,
            actual: 3
        })
    );
}

#[test]
fn non_finite_observation_is_dropped() {
    let camera = distorted();
    let gt = tilted_pose();
    let mut corrs = observe(&camera, &gt, &ring(12));
    corrs[5].pixel = Point2::new(f64::NAN, f64::NAN);
    let est = solve(&camera, &corrs);
    assert_eq!(est.dropped, vec![5]);
    assert_eq!(est.used.len(), 11);
    assert_eq!(est.residuals.len(), 11);
    assert!(est.pose.rotation_angle_to(&gt).to_degrees() < 0.5);
}

#[test]
fn points_that_fail_to_undistort_are_dropped() {
    let camera = distorted();
    let params = SolverParams {
        undistort: UndistortConfig {
            max_iters: 0,
            eps: 0.0,
        },
        ..SolverParams::default()
    };
    let corrs = observe(&camera, &tilted_pose(), &ring(12));
    assert_eq!(
        solve_pose(&camera, &corrs, &params),
        Err(PoseError::InsufficientCorrespondences {
            required: 4,
            actual: 0
        })
    );
}

#[test]
fn far_out_pixel_is_dropped_and_the_rest_solve() {
    let camera = distorted();
    let gt = tilted_pose();
    let mut corrs = observe(&camera, &gt, &ring(12));
    let far = Point2::new(1e9, 1e9);
    assert!(!camera.undistort_pixel(far, &UndistortConfig::default()).converged);
    corrs.insert(3, Correspondence::new(Point3::new(0.0, 0.0, 0.0), far));

    let est = solve(&camera, &corrs);
    assert_eq!(est.dropped, vec![3]);
    assert_eq!(est.used.len(), 12);
    assert!(!est.used.contains(&3));
    assert!(est.mean_reprojection_error < 1e-6);
    assert!(est.pose.rotation_angle_to(&gt).to_degrees() < 0.5);
}

#[test]
fn collinear_model_points_are_degenerate() {
    let camera = pinhole();
    let model: Vec<_> = (0..6).map(|i| Point3::new(i as f64 * 10.0, 5.0, 0.0)).collect();
    let corrs = observe(&camera, &tilted_pose(), &model);
    assert_eq!(
        solve_pose(&camera, &corrs, &SolverParams::default()),
        Err(PoseError::DegenerateConfiguration(Degeneracy::CollinearModel))
    );
}

#[test]
fn coincident_image_points_are_degenerate() {
    let camera = pinhole();
    let corrs: Vec<_> = ring(6)
        .into_iter()
        .map(|m| Correspondence::new(m, Point2::new(900.0, 500.0)))
        .collect();
    assert_eq!(
        solve_pose(&camera, &corrs, &SolverParams::default()),
        Err(PoseError::DegenerateConfiguration(Degeneracy::CollinearImage))
    );
}

#[test]
fn non_planar_model_is_rejected() {
    let camera = pinhole();
    let mut model = ring(12);
    model.push(Point3::new(0.0, 0.0, 40.0));
    let corrs = observe(&camera, &tilted_pose(), &model);
    assert!(matches!(
        solve_pose(&camera, &corrs, &SolverParams::default()),
        Err(PoseError::NonPlanarModel { .. })
    ));
}

#[test]
fn forced_non_convergence_is_reported() {
    let camera = distorted();
    let noisy = GaussianNoise { seed: 3, sigma_px: 1.5 }.apply(&observe(&camera, &tilted_pose(), &ring(24)));

    let strict = SolverParams {
        refine: LmParams {
            max_iterations: 1,
            relative_cost_tolerance: 0.0,
            absolute_cost_tolerance: 0.0,
            gradient_tolerance: 0.0,
            ..LmParams::default()
        },
        ..SolverParams::default()
    };
    let capped = solve_pose(&camera, &noisy, &strict).expect("estimate still returned");
    assert!(!capped.converged);
    assert_eq!(capped.stop_reason, StopReason::MaxIterations);
    assert_eq!(capped.iterations, 1);
    assert!(matches!(
        capped.clone().require_converged(),
        Err(PoseError::NonConvergent { iterations: 1, .. })
    ));

    let default = solve(&camera, &noisy);
    assert!(default.converged);
    assert!(default.require_converged().is_ok());
}

#[test]
fn repeated_solves_are_identical() {
    let camera = distorted();
    let noisy = GaussianNoise { seed: 11, sigma_px: 0.8 }.apply(&observe(&camera, &tilted_pose(), &ring(24)));
    let solver = PoseSolver::new(camera, SolverParams::default()).expect("valid camera");
    let a = solver.solve(&noisy).expect("solve");
    let b = solver.solve(&noisy).expect("solve");
    assert_eq!(a, b);
}

#[test]
fn frontal_centred_square_with_reference_camera() {
    let camera = pinhole();
    let gt = Pose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 500.0));
    let square = [
        Point3::new(-50.0, -50.0, 0.0),
        Point3::new(50.0, -50.0, 0.0),
        Point3::new(50.0, 50.0, 0.0),
        Point3::new(-50.0, 50.0, 0.0),
    ];
    let corrs = observe(&camera, &gt, &square);
    let est = solve(&camera, &corrs);
    assert!(est.pose.translation.z > 0.0);
    assert!(est.mean_reprojection_error < 1.0);
    assert!((est.pose.translation - gt.translation).norm() < 1e-6);
}

#[test]
fn model_plane_off_the_origin() {
    let camera = distorted();
    let placement = Pose::from_axis_angle(Vector3::new(0.5, 0.0, 0.3), Vector3::new(5.0, 3.0, 20.0));
    let model: Vec<_> = ring(24).iter().map(|p| placement.transform_point(p)).collect();
    let gt = Pose::from_axis_angle(Vector3::new(-0.3, 0.1, 0.0), Vector3::new(-10.0, 5.0, 700.0));
    let corrs = observe(&camera, &gt, &model);
    let est = solve(&camera, &corrs);
    assert!(est.pose.rotation_angle_to(&gt).to_degrees() < 0.5);
    assert!((est.pose.translation - gt.translation).norm() < 1e-3);
}

#[test]
fn invalid_camera_is_rejected_up_front() {
    let mut camera = pinhole();
    camera.intrinsics.fx = 0.0;
    assert!(matches!(
        PoseSolver::new(camera, SolverParams::default()),
        Err(PoseError::Camera(_))
    ));
}

#[test]
fn unbounded_damping_schedule_is_rejected() {
    let camera = pinhole();
    let corrs = observe(&camera, &tilted_pose(), &ring(24));
    let params = SolverParams {
        refine: LmParams {
            damping_increase: 1.0,
            relative_cost_tolerance: 0.0,
            absolute_cost_tolerance: 0.0,
            gradient_tolerance: 0.0,
            ..LmParams::default()
        },
        ..SolverParams::default()
    };
    assert_eq!(
        solve_pose(&camera, &corrs, &params),
        Err(PoseError::Params(InvalidParams::DampingIncrease(1.0)))
    );
    assert!(matches!(
        PoseSolver::new(camera, params),
        Err(PoseError::Params(_))
    ));
}
