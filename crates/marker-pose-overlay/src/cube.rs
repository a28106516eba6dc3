//! The virtual cube drawn on top of the marker.

use marker_pose_core::{CameraModel, PartialProjection, Pose};
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Vertex pairs of the 12 cube edges: base ring, top ring, then pillars.
pub const CUBE_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Which side of the marker plane the cube grows into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrude {
    /// Towards a camera looking at the marker front (model `-Z`).
    #[default]
    NegativeZ,
    PositiveZ,
}

/// Cube placement in marker coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeSpec {
    /// Edge length in model units.
    pub edge_length: f64,
    /// Centre of the cube face resting on the marker plane.
    pub base_center: [f64; 3],
    pub extrude: Extrude,
}

impl Default for CubeSpec {
    fn default() -> Self {
        Self {
            edge_length: 70.0,
            base_center: [0.0, 0.0, 0.0],
            extrude: Extrude::NegativeZ,
        }
    }
}

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum CubeError {
    #[error("cube edge length must be finite and positive, got {0}")]
    EdgeLength(f64),
    #[error("cube base centre must be finite")]
    BaseCenter,
}

/// 8 vertices and 12 edges, fixed for a session.
///
/// Vertices 0..4 lie on the marker plane in counter-clockwise order
/// (`-x-y`, `+x-y`, `+x+y`, `-x+y`); vertex `i + 4` sits above vertex `i`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeGeometry {
    pub vertices: [Point3<f64>; 8],
    pub edges: [[usize; 2]; 12],
}

impl CubeGeometry {
    pub fn from_spec(spec: &CubeSpec) -> Result<Self, CubeError> {
        let a = spec.edge_length;
        if !a.is_finite() || a <= 0.0 {
            return Err(CubeError::EdgeLength(a));
        }
        if !spec.base_center.iter().all(|v| v.is_finite()) {
            return Err(CubeError::BaseCenter);
        }

        let up = match spec.extrude {
            Extrude::NegativeZ => -a,
            Extrude::PositiveZ => a,
        };
        Ok(Self::build(Vector3::from(spec.base_center), a, up))
    }

    /// Unit cube resting on the marker origin, growing towards `-Z`.
    pub fn unit() -> Self {
        Self::build(Vector3::zeros(), 1.0, -1.0)
    }

    fn build(base_center: Vector3<f64>, edge: f64, up: f64) -> Self {
        let h = 0.5 * edge;
        let corners = [(-h, -h), (h, -h), (h, h), (-h, h)];
        let mut vertices = [Point3::origin(); 8];
        for (i, (x, y)) in corners.into_iter().enumerate() {
            vertices[i] = Point3::from(base_center + Vector3::new(x, y, 0.0));
            vertices[i + 4] = Point3::from(base_center + Vector3::new(x, y, up));
        }
        Self {
            vertices,
            edges: CUBE_EDGES,
        }
    }

    /// Project all 8 vertices; fails if any of them is behind the camera.
    pub fn project(
        &self,
        camera: &CameraModel,
        pose: &Pose,
    ) -> Result<ProjectedCube, PartialProjection> {
        let pixels = camera.project_points(pose, &self.vertices)?;
        let mut vertices = [Point2::origin(); 8];
        for (dst, src) in vertices.iter_mut().zip(pixels) {
            *dst = src;
        }
        Ok(ProjectedCube {
            vertices,
            edges: self.edges,
        })
    }
}

impl Default for CubeGeometry {
    fn default() -> Self {
        Self::unit()
    }
}

/// Cube vertices in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedCube {
    pub vertices: [Point2<f64>; 8],
    pub edges: [[usize; 2]; 12],
}

impl ProjectedCube {
    /// Pixel end points of every edge.
    pub fn edge_segments(&self) -> [[Point2<f64>; 2]; 12] {
        self.edges
            .map(|[a, b]| [self.vertices[a], self.vertices[b]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use marker_pose_core::Intrinsics;
    use nalgebra::Rotation3;

    #[test]
    fn edges_have_cube_edge_length() {
        let cube = CubeGeometry::from_spec(&CubeSpec {
            edge_length: 40.0,
            base_center: [5.0, -2.0, 0.0],
            extrude: Extrude::NegativeZ,
        })
        .expect("valid");
        for [a, b] in cube.edges {
            assert_relative_eq!((cube.vertices[a] - cube.vertices[b]).norm(), 40.0, epsilon = 1e-12);
        }
        assert_relative_eq!(cube.vertices[0], Point3::new(-15.0, -22.0, 0.0));
        assert_relative_eq!(cube.vertices[6], Point3::new(25.0, 18.0, -40.0));
    }

    #[test]
    fn every_vertex_has_three_edges() {
        let mut degree = [0; 8];
        for [a, b] in CUBE_EDGES {
            degree[a] += 1;
            degree[b] += 1;
        }
        assert_eq!(degree, [3; 8]);
        assert_eq!(CubeGeometry::default(), CubeGeometry::from_spec(&CubeSpec { edge_length: 1.0, ..CubeSpec::default() }).unwrap());
    }

    #[test]
    fn invalid_specs_are_rejected() {
        for a in [0.0, -1.0, f64::NAN] {
            let spec = CubeSpec {
                edge_length: a,
                ..CubeSpec::default()
            };
            assert!(matches!(CubeGeometry::from_spec(&spec), Err(CubeError::EdgeLength(_))));
        }
        let spec = CubeSpec {
            base_center: [0.0, f64::INFINITY, 0.0],
            ..CubeSpec::default()
        };
        assert_eq!(CubeGeometry::from_spec(&spec), Err(CubeError::BaseCenter));
    }

    #[test]
    fn projection_is_all_or_nothing() {
        let camera = CameraModel::pinhole(Intrinsics::new(1000.0, 1000.0, 640.0, 360.0));
        let cube = CubeGeometry::from_spec(&CubeSpec::default()).expect("valid");

        let front = Pose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 500.0));
        let projected = cube.project(&camera, &front).expect("in front");
        let segments = projected.edge_segments();
        assert_eq!(segments[8], [projected.vertices[0], projected.vertices[4]]);

        // Camera sits between the base and the top of the cube.
        let inside = Pose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 30.0));
        let err = cube.project(&camera, &inside).unwrap_err();
        assert_eq!(err.behind, vec![4, 5, 6, 7]);
    }
}
