//! Quadrature from the divergence theorem, reduced by moment fitting.
//!
//! For a cell `V` bounded by planar facets, `∫_V f = Σ_F ∫_F F n_x dA` with
//! `F(x, y, z) = ∫_{x0}^{x} f(s, y, z) ds`. Facet Gauss points are extruded
//! along `x` to the reference plane `x = x0` with a line rule, which yields a
//! rule exact for the target degree without decomposing the cell. The
//! monomial moments of that rule are then matched on a subset of its points,
//! selected by column pivoting, leaving one point per independent moment.

use nalgebra::{DMatrix, DVector};

use crate::error::QuadratureError;
use crate::math::polygon_3d::{newell_normal, vertex_centroid};
use crate::math::Point3;

use super::gauss::line_rule;
use super::tessellation::{facet_triangles, triangles_rule};

/// Divergence-theorem rule over outward-oriented facets, before reduction.
#[must_use]
pub fn divergence_points(facets: &[Vec<Point3>], degree: usize) -> Vec<(Point3, f64)> {
    let x0 = facets
        .iter()
        .flatten()
        .map(|p| p.x)
        .fold(f64::INFINITY, f64::min);
    let line = line_rule(degree);
    let mut points = Vec::new();
    for facet in facets {
        let Some(unit) = newell_normal(facet).try_normalize(f64::MIN_POSITIVE) else {
            continue;
        };
        if unit.x == 0.0 {
            continue;
        }
        // Signed areas against the facet normal keep folded fans exact.
        let surface = triangles_rule(
            &facet_triangles(std::slice::from_ref(facet)),
            degree + 1,
            Some(&unit),
        );
        for (q, w) in surface {
            let length = q.x - x0;
            if length == 0.0 {
                continue;
            }
            for &(t, wl) in &line {
                let x = Point3::new(x0 + t * length, q.y, q.z);
                points.push((x, w * unit.x * wl * length));
            }
        }
    }
    points
}

/// Exponents `(a, b, c)` with `a + b + c <= degree`.
fn monomials(degree: usize) -> Vec<[i32; 3]> {
    let d = i32::try_from(degree).unwrap_or(i32::MAX);
    let mut out = Vec::new();
    for total in 0..=d {
        for a in (0..=total).rev() {
            for b in (0..=total - a).rev() {
                out.push([a, b, total - a - b]);
            }
        }
    }
    out
}

/// Reduced cell rule exact for polynomials of `degree`.
///
/// # Errors
///
/// Returns [`QuadratureError::EmptyCell`] without facet points,
/// [`QuadratureError::SingularMoments`] if the selected points cannot carry
/// the moments, and [`QuadratureError::Residual`] if the fitted weights do
/// not reproduce them.
pub fn cell_rule(facets: &[Vec<Point3>], degree: usize) -> Result<Vec<(Point3, f64)>, QuadratureError> {
    let raw = divergence_points(facets, degree);
    if raw.is_empty() {
        return Err(QuadratureError::EmptyCell);
    }
    let all: Vec<Point3> = facets.iter().flatten().copied().collect();
    let centre = vertex_centroid(&all);
    let scale = all
        .iter()
        .map(|p| (p - centre).amax())
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);
    let basis = monomials(degree);
    let k = basis.len();

    let eval = |m: &[i32; 3], x: &Point3| {
        let s = (x - centre) / scale;
        s.x.powi(m[0]) * s.y.powi(m[1]) * s.z.powi(m[2])
    };
    let design = DMatrix::from_fn(k, raw.len(), |r, c| eval(&basis[r], &raw[c].0));
    let weights = DVector::from_iterator(raw.len(), raw.iter().map(|(_, w)| *w));
    let moments = &design * &weights;

    // Extruded points share lines along x, so the raw rule rarely spans every
    // monomial; keeping as many points as it has independent moments is
    // enough to reproduce them all.
    let chosen = independent_columns(&design, 1e-10);
    if chosen.is_empty() {
        return Err(QuadratureError::EmptyCell);
    }
    let reduced = DMatrix::from_fn(k, chosen.len(), |r, c| design[(r, chosen[c])]);
    let svd = reduced.clone().svd(true, true);
    let largest = svd.singular_values.max();
    let rank = svd.rank(largest * 1e-12);
    if rank < chosen.len() {
        return Err(QuadratureError::SingularMoments { rank, basis: k });
    }
    let fitted = svd
        .solve(&moments, largest * 1e-14)
        .map_err(|_| QuadratureError::SingularMoments { rank, basis: k })?;

    let residual = (&reduced * &fitted - &moments).norm();
    if residual > 1e-9 * moments.norm().max(1.0) {
        return Err(QuadratureError::Residual { residual });
    }
    Ok(chosen
        .iter()
        .zip(fitted.iter())
        .map(|(&c, &w)| (raw[c].0, w))
        .collect())
}

/// Greedy column pivoting: repeatedly takes the column with the largest
/// component outside the span of those already taken.
fn independent_columns(design: &DMatrix<f64>, tol: f64) -> Vec<usize> {
    let largest = design.column_iter().map(|c| c.norm()).fold(0.0, f64::max);
    let mut residual = design.clone();
    let mut chosen: Vec<usize> = Vec::new();
    while chosen.len() < design.nrows() {
        let best = (0..residual.ncols())
            .filter(|c| !chosen.contains(c))
            .map(|c| (c, residual.column(c).norm()))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((best, norm)) = best else {
            break;
        };
        if norm <= tol * largest {
            break;
        }
        let q = residual.column(best) / norm;
        for c in 0..residual.ncols() {
            let along = q.dot(&residual.column(c));
            residual.column_mut(c).axpy(-along, &q, 1.0);
        }
        chosen.push(best);
    }
    chosen
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::integration::tessellation;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    /// Outward facets of the tetrahedron `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
    fn unit_tet() -> Vec<Vec<Point3>> {
        let o = p(0.0, 0.0, 0.0);
        let a = p(1.0, 0.0, 0.0);
        let b = p(0.0, 1.0, 0.0);
        let c = p(0.0, 0.0, 1.0);
        vec![vec![o, b, a], vec![o, a, c], vec![o, c, b], vec![a, b, c]]
    }

    /// Unit cube with the corner `x + y + z > 2` cut off.
    fn truncated_cube() -> Vec<Vec<Point3>> {
        let top_cut = [p(1.0, 1.0, 0.0), p(0.0, 1.0, 1.0), p(1.0, 0.0, 1.0)];
        vec![
            vec![p(0.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(1.0, 1.0, 0.0), p(1.0, 0.0, 0.0)],
            vec![p(0.0, 0.0, 1.0), p(1.0, 0.0, 1.0), top_cut[1]],
            vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(1.0, 0.0, 1.0), p(0.0, 0.0, 1.0)],
            vec![p(1.0, 0.0, 0.0), p(1.0, 1.0, 0.0), top_cut[2]],
            vec![p(1.0, 1.0, 0.0), p(0.0, 1.0, 0.0), top_cut[1]],
            vec![p(0.0, 1.0, 0.0), p(0.0, 0.0, 0.0), p(0.0, 0.0, 1.0), p(0.0, 1.0, 1.0)],
            top_cut.to_vec(),
        ]
    }

    #[test]
    fn raw_points_integrate_tet_moments() {
        let rule = divergence_points(&unit_tet(), 2);
        let volume: f64 = rule.iter().map(|(_, w)| w).sum();
        let x2: f64 = rule.iter().map(|(x, w)| w * x.x * x.x).sum();
        assert!((volume - 1.0 / 6.0).abs() < 1e-14);
        assert!((x2 - 1.0 / 60.0).abs() < 1e-14);
    }

    #[test]
    fn reduced_rule_keeps_tet_moments() {
        for degree in 1..=4 {
            let raw = divergence_points(&unit_tet(), degree);
            let rule = cell_rule(&unit_tet(), degree).unwrap();
            assert!(rule.len() <= raw.len());
            let volume: f64 = rule.iter().map(|(_, w)| w).sum();
            assert!((volume - 1.0 / 6.0).abs() < 1e-12);
        }
        let rule = cell_rule(&unit_tet(), 2).unwrap();
        let xy: f64 = rule.iter().map(|(x, w)| w * x.x * x.y).sum();
        assert!((xy - 1.0 / 120.0).abs() < 1e-12);
    }

    #[test]
    fn reduced_rule_integrates_a_flat_box() {
        // [0, 1]² x [0, 1/2] with outward facets.
        let c = |x: f64, y: f64, z: f64| p(x, y, z * 0.5);
        let facets = vec![
            vec![c(0.0, 0.0, 0.0), c(0.0, 1.0, 0.0), c(1.0, 1.0, 0.0), c(1.0, 0.0, 0.0)],
            vec![c(0.0, 0.0, 1.0), c(1.0, 0.0, 1.0), c(1.0, 1.0, 1.0), c(0.0, 1.0, 1.0)],
            vec![c(0.0, 0.0, 0.0), c(1.0, 0.0, 0.0), c(1.0, 0.0, 1.0), c(0.0, 0.0, 1.0)],
            vec![c(1.0, 0.0, 0.0), c(1.0, 1.0, 0.0), c(1.0, 1.0, 1.0), c(1.0, 0.0, 1.0)],
            vec![c(1.0, 1.0, 0.0), c(0.0, 1.0, 0.0), c(0.0, 1.0, 1.0), c(1.0, 1.0, 1.0)],
            vec![c(0.0, 1.0, 0.0), c(0.0, 0.0, 0.0), c(0.0, 0.0, 1.0), c(0.0, 1.0, 1.0)],
        ];
        for degree in 1..=3 {
            let rule = cell_rule(&facets, degree).unwrap();
            let volume: f64 = rule.iter().map(|(_, w)| w).sum();
            assert!((volume - 0.5).abs() < 1e-12);
            let xz: f64 = rule.iter().map(|(x, w)| w * x.x * x.z).sum();
            // ∫x dx * ∫z dz over [0, 1] x [0, 1/2].
            assert!((xz - 0.5 * 0.125).abs() < 1e-12);
        }
    }

    #[test]
    fn matches_tessellation_on_truncated_cube() {
        let facets = truncated_cube();
        let reference = p(0.4, 0.4, 0.4);
        let tess = tessellation::cell_rule(&facets, &reference, 3);
        let fitted = cell_rule(&facets, 3).unwrap();
        let integrands: [fn(&Point3) -> f64; 4] = [
            |_| 1.0,
            |x| x.x * x.y,
            |x| x.z * x.z * x.y,
            |x| x.x - 2.0 * x.y * x.y * x.y,
        ];
        for f in integrands {
            let a: f64 = tess.iter().map(|(x, w)| w * f(x)).sum();
            let b: f64 = fitted.iter().map(|(x, w)| w * f(x)).sum();
            assert!((a - b).abs() < 1e-11, "{a} vs {b}");
        }
        let volume: f64 = fitted.iter().map(|(_, w)| w).sum();
        assert!((volume - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_cell_is_rejected() {
        let flat = vec![vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)]];
        // Normal along z: nothing to extrude along x.
        assert!(matches!(cell_rule(&flat, 2), Err(QuadratureError::EmptyCell)));
    }
}
