//! Geometric predicates, generic over the arithmetic backend.
//!
//! All predicates return a [`Sign`]. With `f64` a result inside the forward
//! error bound comes back as [`Sign::Degenerate`]; with an exact backend
//! `Degenerate` means the configuration really is degenerate.

use super::scalar::{Scalar, Sign};
use super::{Point2, Point3, Vector3};

/// Error bound coefficient for the 3x3 determinant (a few ulps, rounded up).
const ORIENT3D_BOUND: f64 = 1.0e-14;

/// Error bound coefficient for the 2x2 determinant.
const ORIENT2D_BOUND: f64 = 4.0e-15;

/// Orientation of `d` relative to the plane through `a`, `b`, `c`.
///
/// Positive when `d` lies on the side the right-handed normal of `abc`
/// points to.
#[must_use]
pub fn orient3d<S: Scalar>(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Sign {
    let ax = S::from_f64(a.x);
    let ay = S::from_f64(a.y);
    let az = S::from_f64(a.z);

    let bx = S::from_f64(b.x) - ax.clone();
    let by = S::from_f64(b.y) - ay.clone();
    let bz = S::from_f64(b.z) - az.clone();
    let cx = S::from_f64(c.x) - ax.clone();
    let cy = S::from_f64(c.y) - ay.clone();
    let cz = S::from_f64(c.z) - az.clone();
    let dx = S::from_f64(d.x) - ax;
    let dy = S::from_f64(d.y) - ay;
    let dz = S::from_f64(d.z) - az;

    // (b - a) x (c - a) . (d - a)
    let nx = by.clone() * cz.clone() - bz.clone() * cy.clone();
    let ny = bz * cx.clone() - bx.clone() * cz;
    let nz = bx * cy - by * cx;
    let det = nx * dx + ny * dy + nz * dz;

    let permanent = orient3d_permanent(a, b, c, d);
    det.classify(ORIENT3D_BOUND * permanent)
}

fn orient3d_permanent(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    let ab = (b - a).abs();
    let ac = (c - a).abs();
    let ad = (d - a).abs();
    let nx = ab.y * ac.z + ab.z * ac.y;
    let ny = ab.z * ac.x + ab.x * ac.z;
    let nz = ab.x * ac.y + ab.y * ac.x;
    nx * ad.x + ny * ad.y + nz * ad.z
}

/// Orientation of `c` relative to the directed line `a -> b` (positive = left).
#[must_use]
pub fn orient2d<S: Scalar>(a: &Point2, b: &Point2, c: &Point2) -> Sign {
    let ax = S::from_f64(a.x);
    let ay = S::from_f64(a.y);
    let bx = S::from_f64(b.x) - ax.clone();
    let by = S::from_f64(b.y) - ay.clone();
    let cx = S::from_f64(c.x) - ax;
    let cy = S::from_f64(c.y) - ay;
    let det = bx * cy - by * cx;

    let permanent = ((b.x - a.x) * (c.y - a.y)).abs() + ((b.y - a.y) * (c.x - a.x)).abs();
    det.classify(ORIENT2D_BOUND * permanent)
}

/// Segment-segment intersection in the plane.
///
/// `Positive`: the open segments cross in a single interior point.
/// `Negative`: the segments are disjoint.
/// `Degenerate`: they touch at an endpoint or overlap collinearly.
#[must_use]
pub fn segment_segment_2d<S: Scalar>(p0: &Point2, p1: &Point2, q0: &Point2, q1: &Point2) -> Sign {
    let o1 = orient2d::<S>(p0, p1, q0);
    let o2 = orient2d::<S>(p0, p1, q1);
    if separated(o1, o2) {
        return Sign::Negative;
    }
    let o3 = orient2d::<S>(q0, q1, p0);
    let o4 = orient2d::<S>(q0, q1, p1);
    if separated(o3, o4) {
        return Sign::Negative;
    }

    let all_decided = !(o1.is_degenerate()
        || o2.is_degenerate()
        || o3.is_degenerate()
        || o4.is_degenerate());
    if all_decided {
        return Sign::Positive;
    }

    if o1.is_degenerate() && o2.is_degenerate() {
        // Collinear: overlap only if the projections onto the dominant axis meet.
        let use_x = (p1.x - p0.x).abs() >= (p1.y - p0.y).abs();
        let key = |p: &Point2| if use_x { p.x } else { p.y };
        let (pa, pb) = min_max(key(p0), key(p1));
        let (qa, qb) = min_max(key(q0), key(q1));
        if pb < qa || qb < pa {
            return Sign::Negative;
        }
    }
    Sign::Degenerate
}

/// Both signs decided and equal: the points sit strictly on one side.
fn separated(a: Sign, b: Sign) -> bool {
    a == b && !a.is_degenerate()
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Point-in-triangle test in the plane.
///
/// `Positive`: strictly inside. `Negative`: strictly outside.
/// `Degenerate`: on the boundary, or the triangle has no area.
#[must_use]
pub fn point_in_triangle<S: Scalar>(p: &Point2, a: &Point2, b: &Point2, c: &Point2) -> Sign {
    let orientation = orient2d::<S>(a, b, c);
    if orientation.is_degenerate() {
        return Sign::Degenerate;
    }
    let signs = [
        orient2d::<S>(a, b, p),
        orient2d::<S>(b, c, p),
        orient2d::<S>(c, a, p),
    ];
    if signs.iter().any(|&s| s == orientation.negate()) {
        Sign::Negative
    } else if signs.iter().all(|&s| s == orientation) {
        Sign::Positive
    } else {
        Sign::Degenerate
    }
}

/// Segment-triangle intersection in space.
///
/// `Positive`: the segment pierces the open triangle at one interior point.
/// `Negative`: no contact.
/// `Degenerate`: contact through an endpoint, a triangle edge or vertex, or a
/// coplanar overlap.
#[must_use]
pub fn segment_triangle<S: Scalar>(
    p0: &Point3,
    p1: &Point3,
    a: &Point3,
    b: &Point3,
    c: &Point3,
) -> Sign {
    let s0 = orient3d::<S>(a, b, c, p0);
    let s1 = orient3d::<S>(a, b, c, p1);
    if separated(s0, s1) {
        return Sign::Negative;
    }

    if s0.is_degenerate() && s1.is_degenerate() {
        return coplanar_segment_triangle::<S>(p0, p1, a, b, c);
    }

    let edges = [
        orient3d::<S>(p0, p1, a, b),
        orient3d::<S>(p0, p1, b, c),
        orient3d::<S>(p0, p1, c, a),
    ];
    let has_pos = edges.contains(&Sign::Positive);
    let has_neg = edges.contains(&Sign::Negative);
    if has_pos && has_neg {
        return Sign::Negative;
    }
    let through_interior = !edges.contains(&Sign::Degenerate);
    if through_interior && !s0.is_degenerate() && !s1.is_degenerate() {
        Sign::Positive
    } else {
        Sign::Degenerate
    }
}

/// Coplanar case: drop the dominant normal axis and test in 2D.
fn coplanar_segment_triangle<S: Scalar>(
    p0: &Point3,
    p1: &Point3,
    a: &Point3,
    b: &Point3,
    c: &Point3,
) -> Sign {
    let normal = (b - a).cross(&(c - a));
    let drop = dominant_axis(&normal);
    let flat = |p: &Point3| project_dropping(p, drop);
    let (fp0, fp1, fa, fb, fc) = (flat(p0), flat(p1), flat(a), flat(b), flat(c));

    let touches_edge = [(&fa, &fb), (&fb, &fc), (&fc, &fa)]
        .iter()
        .any(|(u, v)| segment_segment_2d::<S>(&fp0, &fp1, u, v) != Sign::Negative);
    let endpoint_inside = point_in_triangle::<S>(&fp0, &fa, &fb, &fc) != Sign::Negative
        || point_in_triangle::<S>(&fp1, &fa, &fb, &fc) != Sign::Negative;

    if touches_edge || endpoint_inside {
        Sign::Degenerate
    } else {
        Sign::Negative
    }
}

/// Index of the component with the largest magnitude.
#[must_use]
pub fn dominant_axis(v: &Vector3) -> usize {
    let v = v.abs();
    if v.x >= v.y && v.x >= v.z {
        0
    } else if v.y >= v.z {
        1
    } else {
        2
    }
}

/// Projects onto the coordinate plane orthogonal to axis `drop`.
///
/// Dropping a coordinate is exact, so predicates stay exact after projection.
#[must_use]
pub fn project_dropping(p: &Point3, drop: usize) -> Point2 {
    match drop {
        0 => Point2::new(p.y, p.z),
        1 => Point2::new(p.z, p.x),
        _ => Point2::new(p.x, p.y),
    }
}

#[cfg(test)]
mod tests {
    use num_rational::BigRational;

    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn q(x: f64, y: f64) -> Point2 {
        Point2::new(x, y)
    }

    #[test]
    fn orient3d_above_and_below() {
        let (a, b, c) = (p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        assert_eq!(orient3d::<f64>(&a, &b, &c, &p(0.2, 0.2, 1.0)), Sign::Positive);
        assert_eq!(orient3d::<f64>(&a, &b, &c, &p(0.2, 0.2, -1.0)), Sign::Negative);
        assert_eq!(orient3d::<f64>(&a, &b, &c, &p(5.0, 3.0, 0.0)), Sign::Degenerate);
    }

    #[test]
    fn float_never_contradicts_exact() {
        let (a, b, c) = (p(0.1, 0.7, 0.3), p(1.3, 0.2, 0.9), p(0.4, 1.1, 0.05));
        for i in 0..50 {
            let s = f64::from(i) / 50.0;
            let d = a + (b - a) * s + (c - a) * (1.0 - s);
            let fast = orient3d::<f64>(&a, &b, &c, &d);
            let exact = orient3d::<BigRational>(&a, &b, &c, &d);
            assert!(fast.is_degenerate() || fast == exact, "{fast:?} vs {exact:?}");
        }
    }

    #[test]
    fn orient3d_exact_coplanar_is_degenerate() {
        let (a, b, c) = (p(0.1, 0.2, 0.3), p(1.1, 0.2, 0.3), p(0.1, 1.2, 0.3));
        let d = p(0.7, 0.9, 0.3);
        assert_eq!(orient3d::<BigRational>(&a, &b, &c, &d), Sign::Degenerate);
    }

    #[test]
    fn orient2d_left_right() {
        let (a, b) = (q(0.0, 0.0), q(1.0, 0.0));
        assert_eq!(orient2d::<f64>(&a, &b, &q(0.5, 1.0)), Sign::Positive);
        assert_eq!(orient2d::<f64>(&a, &b, &q(0.5, -1.0)), Sign::Negative);
        assert_eq!(orient2d::<f64>(&a, &b, &q(2.0, 0.0)), Sign::Degenerate);
    }

    #[test]
    fn crossing_segments() {
        let s = segment_segment_2d::<f64>(&q(0.0, 0.0), &q(1.0, 1.0), &q(0.0, 1.0), &q(1.0, 0.0));
        assert_eq!(s, Sign::Positive);
    }

    #[test]
    fn disjoint_segments() {
        let s = segment_segment_2d::<f64>(&q(0.0, 0.0), &q(1.0, 0.0), &q(0.0, 1.0), &q(1.0, 1.0));
        assert_eq!(s, Sign::Negative);
    }

    #[test]
    fn touching_segments_are_degenerate() {
        let s = segment_segment_2d::<f64>(&q(0.0, 0.0), &q(1.0, 0.0), &q(1.0, 0.0), &q(1.0, 1.0));
        assert_eq!(s, Sign::Degenerate);
    }

    #[test]
    fn collinear_disjoint_segments() {
        let s = segment_segment_2d::<BigRational>(
            &q(0.0, 0.0),
            &q(1.0, 0.0),
            &q(2.0, 0.0),
            &q(3.0, 0.0),
        );
        assert_eq!(s, Sign::Negative);
    }

    #[test]
    fn point_in_triangle_cases() {
        let (a, b, c) = (q(0.0, 0.0), q(1.0, 0.0), q(0.0, 1.0));
        assert_eq!(point_in_triangle::<f64>(&q(0.2, 0.2), &a, &b, &c), Sign::Positive);
        assert_eq!(point_in_triangle::<f64>(&q(1.0, 1.0), &a, &b, &c), Sign::Negative);
        assert_eq!(point_in_triangle::<f64>(&q(0.5, 0.0), &a, &b, &c), Sign::Degenerate);
        // Clockwise triangle works too.
        assert_eq!(point_in_triangle::<f64>(&q(0.2, 0.2), &a, &c, &b), Sign::Positive);
    }

    #[test]
    fn segment_pierces_triangle() {
        let (a, b, c) = (p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        let s = segment_triangle::<f64>(&p(0.2, 0.2, -1.0), &p(0.2, 0.2, 1.0), &a, &b, &c);
        assert_eq!(s, Sign::Positive);
        let miss = segment_triangle::<f64>(&p(2.0, 2.0, -1.0), &p(2.0, 2.0, 1.0), &a, &b, &c);
        assert_eq!(miss, Sign::Negative);
    }

    #[test]
    fn segment_through_triangle_edge_is_degenerate() {
        let (a, b, c) = (p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        let s = segment_triangle::<BigRational>(
            &p(0.5, 0.0, -1.0),
            &p(0.5, 0.0, 1.0),
            &a,
            &b,
            &c,
        );
        assert_eq!(s, Sign::Degenerate);
    }

    #[test]
    fn coplanar_far_segment_misses() {
        let (a, b, c) = (p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        let s = segment_triangle::<BigRational>(
            &p(3.0, 3.0, 0.0),
            &p(4.0, 3.0, 0.0),
            &a,
            &b,
            &c,
        );
        assert_eq!(s, Sign::Negative);
    }
}
