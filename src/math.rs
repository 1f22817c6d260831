use nalgebra as na;
use num_traits::Float;

pub fn gauss<F: Float>(x: F, c: F) -> F {
    let two = F::one() + F::one();
    (-((x * x) / (two * c * c))).exp()
}

/// Solves for the homography mapping each `src[i]` onto `dst[i]`, with the
/// bottom-right entry fixed to one.
pub fn perspective_transform(
    src: &[na::Point2<f64>; 4],
    dst: &[na::Point2<f64>; 4],
) -> Option<na::Matrix3<f64>> {
    if has_collinear_triple(src) || has_collinear_triple(dst) {
        return None;
    }

    let mut a = na::SMatrix::<f64, 8, 8>::zeros();
    let mut b = na::SVector::<f64, 8>::zeros();

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let (r0, r1) = (2 * i, 2 * i + 1);

        a[(r0, 0)] = s.x;
        a[(r0, 1)] = s.y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -s.x * d.x;
        a[(r0, 7)] = -s.y * d.x;
        b[r0] = d.x;

        a[(r1, 3)] = s.x;
        a[(r1, 4)] = s.y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -s.x * d.y;
        a[(r1, 7)] = -s.y * d.y;
        b[r1] = d.y;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(na::Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

fn has_collinear_triple(pts: &[na::Point2<f64>; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];

    TRIPLES.iter().any(|&(i, j, k)| {
        let (u, v) = (pts[j] - pts[i], pts[k] - pts[i]);
        let cross = u.x * v.y - u.y * v.x;

        cross.abs() <= 1e-9 * (u.norm() * v.norm()).max(f64::MIN_POSITIVE)
    })
}

/// Applies `m` to a point in homogeneous coordinates.
#[inline]
pub fn apply_homography(m: &na::Matrix3<f64>, p: &na::Point2<f64>) -> na::Point2<f64> {
    let v = m * na::Vector3::new(p.x, p.y, 1.0);
    let w = if v.z.abs() < f64::EPSILON {
        f64::EPSILON.copysign(v.z)
    } else {
        v.z
    };

    na::Point2::new(v.x / w, v.y / w)
}

/// Arithmetic mean of `items`, `None` for an empty iterator.
pub fn mean<'a, I>(items: I) -> Option<na::Vector3<f32>>
where
    I: IntoIterator<Item = &'a na::Vector3<f32>>,
{
    let (sum, count) = items
        .into_iter()
        .fold((na::Vector3::zeros(), 0usize), |(s, n), v| (s + v, n + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f32)
    }
}
