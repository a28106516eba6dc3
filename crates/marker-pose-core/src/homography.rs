use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

/// Plane-to-plane projective map, `dst ~ H * src`.
///
/// Estimated homographies are scaled to unit Frobenius norm; only the
/// direction of `h` is meaningful.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomographyError {
    #[error("homography needs at least 4 point pairs, got {0}")]
    TooFewPoints(usize),
    #[error("mismatched point counts (src={src}, dst={dst})")]
    MismatchedLengths { src: usize, dst: usize },
    #[error("point configuration does not determine a unique homography")]
    Degenerate,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Map a point; `None` if it lands on the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < 1e-15 || !w.is_finite() {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2).
fn hartley_normalization(pts: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    let n = pts.len() as f64;
    let centroid = pts.iter().fold(Vector3::zeros(), |acc, p| {
        acc + Vector3::new(p.x, p.y, 0.0)
    }) / n;
    let (cx, cy) = (centroid.x, centroid.y);

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if !mean_dist.is_finite() || mean_dist <= 1e-12 {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Some((out, t))
}

/// Hartley-normalized DLT estimate of `H` with `dst ~ H * src`.
///
/// Fails with [`HomographyError::Degenerate`] when the null space of the
/// design matrix is not one-dimensional (e.g. three or more collinear points
/// in a 4-point set, or all points on one line).
pub fn estimate_homography(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> Result<Homography, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::MismatchedLengths {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(HomographyError::TooFewPoints(src.len()));
    }

    let (s, ts) = hartley_normalization(src).ok_or(HomographyError::Degenerate)?;
    let (d, td) = hartley_normalization(dst).ok_or(HomographyError::Degenerate)?;

    // Build A (max(2N, 9) x 9). The zero padding row for N = 4 keeps the
    // SVD square so V^T carries the full null space.
    let n = src.len();
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);

    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let vt = svd.v_t.ok_or(HomographyError::Degenerate)?;
    let sv = &svd.singular_values;

    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&i, &j| sv[i].total_cmp(&sv[j]));
    let (smallest, second) = (order[0], order[1]);
    let largest = sv.max();
    if !largest.is_finite() || largest <= 0.0 || sv[second] / largest < 1e-10 {
        return Err(HomographyError::Degenerate);
    }

    let h = vt.row(smallest);
    let hn = Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // H = Td^{-1} * Hn * Ts
    let td_inv = td.try_inverse().ok_or(HomographyError::Degenerate)?;
    let h_den = td_inv * hn * ts;
    let norm = h_den.norm();
    if !norm.is_finite() || norm <= 0.0 {
        return Err(HomographyError::Degenerate);
    }

    Ok(Homography::new(h_den / norm))
}
