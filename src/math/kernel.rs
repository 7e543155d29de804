use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use num_rational::BigRational;

use super::predicates;
use super::scalar::{Scalar, Sign};
use super::{Point2, Point3, Vector3};

/// Arithmetic used by a [`Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// Floating point, re-evaluated exactly whenever the result is degenerate.
    #[default]
    Adaptive,
    /// Exact rational arithmetic for every predicate and construction.
    Exact,
}

/// Predicate and construction front-end for one element's cut.
///
/// A kernel is element-local: it counts how often floating point could not
/// decide a predicate, and the cut pipeline escalates the element once that
/// count passes the configured threshold. A point snapped onto a plane by
/// the tolerance band counts once per plane.
#[derive(Debug)]
pub struct Kernel {
    precision: Precision,
    escalations: Cell<usize>,
    snapped: RefCell<BTreeSet<[u64; 9]>>,
}

impl Kernel {
    #[must_use]
    pub fn new(precision: Precision) -> Self {
        Self {
            precision,
            escalations: Cell::new(0),
            snapped: RefCell::new(BTreeSet::new()),
        }
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Number of predicates that needed the exact fallback or the tolerance
    /// band so far.
    #[must_use]
    pub fn escalations(&self) -> usize {
        self.escalations.get()
    }

    fn resolve(&self, fast: impl FnOnce() -> Sign, exact: impl FnOnce() -> Sign) -> Sign {
        match self.precision {
            Precision::Exact => exact(),
            Precision::Adaptive => match fast() {
                Sign::Degenerate => {
                    self.escalations.set(self.escalations.get() + 1);
                    exact()
                }
                decided => decided,
            },
        }
    }

    #[must_use]
    pub fn orient3d(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Sign {
        self.resolve(
            || predicates::orient3d::<f64>(a, b, c, d),
            || predicates::orient3d::<BigRational>(a, b, c, d),
        )
    }

    #[must_use]
    pub fn orient2d(&self, a: &Point2, b: &Point2, c: &Point2) -> Sign {
        self.resolve(
            || predicates::orient2d::<f64>(a, b, c),
            || predicates::orient2d::<BigRational>(a, b, c),
        )
    }

    #[must_use]
    pub fn segment_segment_2d(&self, p0: &Point2, p1: &Point2, q0: &Point2, q1: &Point2) -> Sign {
        self.resolve(
            || predicates::segment_segment_2d::<f64>(p0, p1, q0, q1),
            || predicates::segment_segment_2d::<BigRational>(p0, p1, q0, q1),
        )
    }

    #[must_use]
    pub fn segment_triangle(
        &self,
        p0: &Point3,
        p1: &Point3,
        tri: &[Point3; 3],
    ) -> Sign {
        self.resolve(
            || predicates::segment_triangle::<f64>(p0, p1, &tri[0], &tri[1], &tri[2]),
            || predicates::segment_triangle::<BigRational>(p0, p1, &tri[0], &tri[1], &tri[2]),
        )
    }

    #[must_use]
    pub fn point_in_triangle(&self, p: &Point2, a: &Point2, b: &Point2, c: &Point2) -> Sign {
        self.resolve(
            || predicates::point_in_triangle::<f64>(p, a, b, c),
            || predicates::point_in_triangle::<BigRational>(p, a, b, c),
        )
    }

    /// Side of `p` relative to the oriented plane through `plane`.
    ///
    /// Points within `tol` of the plane are reported as `Degenerate` (on the
    /// plane) so that every caller snaps the same points. In adaptive mode
    /// each distinct snap counts as an escalation.
    #[must_use]
    pub fn plane_side(&self, plane: &[Point3; 3], unit_normal: &Vector3, p: &Point3, tol: f64) -> Sign {
        let distance = unit_normal.dot(&(p - plane[0]));
        if distance.abs() <= tol {
            if self.precision == Precision::Adaptive {
                self.count_snap(plane, p);
            }
            return Sign::Degenerate;
        }
        self.orient3d(&plane[0], &plane[1], &plane[2], p)
    }

    fn count_snap(&self, plane: &[Point3; 3], p: &Point3) {
        let mut key = [0_u64; 9];
        for (slot, value) in key.iter_mut().zip(plane[0].iter().chain(plane[1].iter()).chain(p.iter())) {
            *slot = value.to_bits();
        }
        if self.snapped.borrow_mut().insert(key) {
            self.escalations.set(self.escalations.get() + 1);
        }
    }

    /// Point where segment `p -> q` crosses the plane through `plane`.
    ///
    /// Callers guarantee the endpoints lie strictly on opposite sides.
    #[must_use]
    pub fn plane_cut(&self, p: &Point3, q: &Point3, plane: &[Point3; 3]) -> Point3 {
        match self.precision {
            Precision::Adaptive => plane_cut_in::<f64>(p, q, plane),
            Precision::Exact => plane_cut_in::<BigRational>(p, q, plane),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(Precision::Adaptive)
    }
}

/// Segment/plane construction in the given arithmetic, rounded once at the end.
fn plane_cut_in<S: Scalar>(p: &Point3, q: &Point3, plane: &[Point3; 3]) -> Point3 {
    let lift = |v: &Point3| [S::from_f64(v.x), S::from_f64(v.y), S::from_f64(v.z)];
    let a = lift(&plane[0]);
    let b = lift(&plane[1]);
    let c = lift(&plane[2]);
    let sp = lift(p);
    let sq = lift(q);

    let sub = |u: &[S; 3], v: &[S; 3]| {
        [
            u[0].clone() - v[0].clone(),
            u[1].clone() - v[1].clone(),
            u[2].clone() - v[2].clone(),
        ]
    };
    let ab = sub(&b, &a);
    let ac = sub(&c, &a);
    let normal = [
        ab[1].clone() * ac[2].clone() - ab[2].clone() * ac[1].clone(),
        ab[2].clone() * ac[0].clone() - ab[0].clone() * ac[2].clone(),
        ab[0].clone() * ac[1].clone() - ab[1].clone() * ac[0].clone(),
    ];
    let dot = |u: &[S; 3], v: &[S; 3]| {
        u[0].clone() * v[0].clone() + u[1].clone() * v[1].clone() + u[2].clone() * v[2].clone()
    };

    let dp = dot(&normal, &sub(&sp, &a));
    let dq = dot(&normal, &sub(&sq, &a));
    let t = dp.ratio(&(dp.clone() - dq));
    let dir = sub(&sq, &sp);

    Point3::new(
        (sp[0].clone() + t.clone() * dir[0].clone()).to_f64(),
        (sp[1].clone() + t.clone() * dir[1].clone()).to_f64(),
        (sp[2].clone() + t * dir[2].clone()).to_f64(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn xy_plane() -> [Point3; 3] {
        [p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)]
    }

    #[test]
    fn adaptive_counts_escalations() {
        let kernel = Kernel::new(Precision::Adaptive);
        let plane = xy_plane();
        let on = kernel.orient3d(&plane[0], &plane[1], &plane[2], &p(0.3, 0.4, 0.0));
        assert_eq!(on, Sign::Degenerate);
        assert_eq!(kernel.escalations(), 1);

        let above = kernel.orient3d(&plane[0], &plane[1], &plane[2], &p(0.3, 0.4, 1.0));
        assert_eq!(above, Sign::Positive);
        assert_eq!(kernel.escalations(), 1);
    }

    #[test]
    fn exact_kernel_never_counts() {
        let kernel = Kernel::new(Precision::Exact);
        let plane = xy_plane();
        let _ = kernel.orient3d(&plane[0], &plane[1], &plane[2], &p(0.3, 0.4, 0.0));
        assert_eq!(kernel.escalations(), 0);
    }

    #[test]
    fn plane_cut_both_precisions_agree() {
        let plane = xy_plane();
        let a = p(0.1, 0.2, -0.3);
        let b = p(0.7, 0.5, 0.6);
        let fast = Kernel::new(Precision::Adaptive).plane_cut(&a, &b, &plane);
        let exact = Kernel::new(Precision::Exact).plane_cut(&a, &b, &plane);
        assert!(exact.z.abs() < 1e-16);
        assert!((fast - exact).norm() < 1e-14);
        assert!((exact.x - 0.3).abs() < 1e-14);
    }

    #[test]
    fn plane_side_snaps_within_tolerance() {
        let kernel = Kernel::default();
        let plane = xy_plane();
        let n = Vector3::z();
        assert_eq!(kernel.plane_side(&plane, &n, &p(0.5, 0.5, 1e-12), 1e-10), Sign::Degenerate);
        assert_eq!(kernel.plane_side(&plane, &n, &p(0.5, 0.5, -0.1), 1e-10), Sign::Negative);
    }

    #[test]
    fn tolerance_snaps_count_once_per_plane() {
        let kernel = Kernel::default();
        let plane = xy_plane();
        let n = Vector3::z();
        let near = p(0.5, 0.5, 1e-12);
        assert_eq!(kernel.plane_side(&plane, &n, &near, 1e-10), Sign::Degenerate);
        assert_eq!(kernel.escalations(), 1);
        let _ = kernel.plane_side(&plane, &n, &near, 1e-10);
        assert_eq!(kernel.escalations(), 1);
        let _ = kernel.plane_side(&plane, &n, &p(0.25, 0.5, 0.0), 1e-10);
        assert_eq!(kernel.escalations(), 2);

        let exact = Kernel::new(Precision::Exact);
        let _ = exact.plane_side(&plane, &n, &near, 1e-10);
        assert_eq!(exact.escalations(), 0);
    }
}
