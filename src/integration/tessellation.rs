//! Quadrature by decomposition into simplices.

use std::collections::HashMap;

use spade::handles::FixedVertexHandle;
use spade::{ConstrainedDelaunayTriangulation, Point2 as SpadePoint2, Triangulation};

use crate::geometry::Plane;
use crate::math::polygon_3d::{area_centroid, newell_normal, winding_number_2d};
use crate::math::Point3;

use super::gauss::{tet_rule, triangle_rule};

/// Signed tetrahedra filling a closed cell.
///
/// Each outward-oriented facet is fanned from its centroid, and each fan
/// triangle is joined to `reference`. Tetrahedra of non-star-shaped cells
/// may be negative; the signed sum is still the cell.
#[must_use]
pub fn cell_tets(facets: &[Vec<Point3>], reference: &Point3) -> Vec<[Point3; 4]> {
    let mut tets = Vec::new();
    for facet in facets {
        if facet.len() < 3 {
            continue;
        }
        let centre = area_centroid(facet);
        for i in 0..facet.len() {
            let a = facet[i];
            let b = facet[(i + 1) % facet.len()];
            tets.push([*reference, centre, a, b]);
        }
    }
    tets
}

/// Signed volume of a tetrahedron `(apex, a, b, c)`; positive when `a, b, c`
/// turn counter-clockwise seen from outside, away from the apex.
#[must_use]
pub fn signed_volume(t: &[Point3; 4]) -> f64 {
    (t[1] - t[0]).dot(&(t[2] - t[0]).cross(&(t[3] - t[0]))) / 6.0
}

/// Volume enclosed by outward-oriented facets.
#[must_use]
pub fn cell_volume(facets: &[Vec<Point3>], reference: &Point3) -> f64 {
    cell_tets(facets, reference).iter().map(signed_volume).sum()
}

/// Cell rule exact for polynomials of `degree`, as `(point, weight)` pairs.
#[must_use]
pub fn cell_rule(facets: &[Vec<Point3>], reference: &Point3, degree: usize) -> Vec<(Point3, f64)> {
    let reference_rule = tet_rule(degree);
    let mut rule = Vec::new();
    for tet in cell_tets(facets, reference) {
        let volume = signed_volume(&tet);
        if volume == 0.0 {
            continue;
        }
        let e1 = tet[1] - tet[0];
        let e2 = tet[2] - tet[0];
        let e3 = tet[3] - tet[0];
        for (xi, w) in &reference_rule {
            let x = tet[0] + e1 * xi[0] + e2 * xi[1] + e3 * xi[2];
            rule.push((x, w * 6.0 * volume));
        }
    }
    rule
}

/// Triangles covering a planar facet, oriented like its outer loop.
///
/// `loops[0]` is the outer boundary; further loops are holes running the
/// other way. Uses a constrained Delaunay triangulation of all loops and
/// keeps triangles with non-zero total winding. Loops the triangulation
/// cannot take as constraints fall back to signed centroid fans.
#[must_use]
pub fn facet_triangles(loops: &[Vec<Point3>]) -> Vec<[Point3; 3]> {
    match loops {
        [] => Vec::new(),
        [tri] if tri.len() == 3 => vec![[tri[0], tri[1], tri[2]]],
        _ => constrained_triangles(loops)
            .unwrap_or_else(|| loops.iter().flat_map(|l| fan_triangles(l)).collect()),
    }
}

fn fan_triangles(polygon: &[Point3]) -> Vec<[Point3; 3]> {
    let centre = area_centroid(polygon);
    (0..polygon.len())
        .map(|i| [centre, polygon[i], polygon[(i + 1) % polygon.len()]])
        .collect()
}

fn constrained_triangles(loops: &[Vec<Point3>]) -> Option<Vec<[Point3; 3]>> {
    let outer = loops.first()?;
    let plane = Plane::from_polygon(outer)?;
    let normal = newell_normal(outer);
    let flatten = |l: &Vec<Point3>| -> Vec<SpadePoint2<f64>> {
        l.iter()
            .map(|p| {
                let uv = plane.project(p);
                SpadePoint2::new(uv.x, uv.y)
            })
            .collect()
    };
    let flat: Vec<Vec<SpadePoint2<f64>>> = loops.iter().map(flatten).collect();

    let mut cdt = ConstrainedDelaunayTriangulation::<SpadePoint2<f64>>::new();
    let mut lifted: HashMap<FixedVertexHandle, Point3> = HashMap::new();
    for (flat_loop, original) in flat.iter().zip(loops) {
        let mut handles = Vec::with_capacity(flat_loop.len());
        for (pt, p3) in flat_loop.iter().zip(original) {
            let handle = cdt.insert(*pt).ok()?;
            lifted.entry(handle).or_insert(*p3);
            handles.push(handle);
        }
        for i in 0..handles.len() {
            let from = handles[i];
            let to = handles[(i + 1) % handles.len()];
            if from == to {
                continue;
            }
            if !cdt.can_add_constraint(from, to) {
                return None;
            }
            cdt.add_constraint(from, to);
        }
    }

    let loops_uv: Vec<Vec<(f64, f64)>> = flat
        .iter()
        .map(|l| l.iter().map(|p| (p.x, p.y)).collect())
        .collect();
    let mut triangles = Vec::new();
    for face in cdt.inner_faces() {
        let verts = face.vertices();
        let uv = verts.map(|v| v.position());
        let cx = (uv[0].x + uv[1].x + uv[2].x) / 3.0;
        let cy = (uv[0].y + uv[1].y + uv[2].y) / 3.0;
        let winding: i32 = loops_uv.iter().map(|l| winding_number_2d(cx, cy, l)).sum();
        if winding == 0 {
            continue;
        }
        let mut tri = [
            *lifted.get(&verts[0].fix())?,
            *lifted.get(&verts[1].fix())?,
            *lifted.get(&verts[2].fix())?,
        ];
        if (tri[1] - tri[0]).cross(&(tri[2] - tri[0])).dot(&normal) < 0.0 {
            tri.swap(1, 2);
        }
        triangles.push(tri);
    }
    Some(triangles)
}

/// Facet rule exact for polynomials of `degree`; weights are physical areas.
///
/// Weights are signed against the outer loop's normal, so a fan fallback
/// over holes still sums to the facet area.
#[must_use]
pub fn facet_rule(loops: &[Vec<Point3>], degree: usize) -> Vec<(Point3, f64)> {
    let Some(normal) = loops
        .first()
        .and_then(|outer| newell_normal(outer).try_normalize(f64::MIN_POSITIVE))
    else {
        return Vec::new();
    };
    triangles_rule(&facet_triangles(loops), degree, Some(&normal))
}

/// Maps the reference triangle rule onto each triangle.
///
/// With a `normal`, weights are signed by the triangle orientation against
/// it; otherwise they are plain areas.
pub(crate) fn triangles_rule(
    triangles: &[[Point3; 3]],
    degree: usize,
    normal: Option<&crate::math::Vector3>,
) -> Vec<(Point3, f64)> {
    let reference = triangle_rule(degree);
    let mut rule = Vec::new();
    for tri in triangles {
        let e1 = tri[1] - tri[0];
        let e2 = tri[2] - tri[0];
        let cross = e1.cross(&e2);
        let jac = match normal {
            Some(n) => cross.dot(n),
            None => cross.norm(),
        };
        if jac == 0.0 {
            continue;
        }
        for (xi, w) in &reference {
            rule.push((tri[0] + e1 * xi[0] + e2 * xi[1], w * jac));
        }
    }
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::polygon_3d::polygon_area_3d;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    /// Outward facets of the box `[0, a] x [0, b] x [0, c]`.
    fn box_facets(a: f64, b: f64, c: f64) -> Vec<Vec<Point3>> {
        vec![
            vec![p(0.0, 0.0, 0.0), p(0.0, b, 0.0), p(a, b, 0.0), p(a, 0.0, 0.0)],
            vec![p(0.0, 0.0, c), p(a, 0.0, c), p(a, b, c), p(0.0, b, c)],
            vec![p(0.0, 0.0, 0.0), p(a, 0.0, 0.0), p(a, 0.0, c), p(0.0, 0.0, c)],
            vec![p(a, 0.0, 0.0), p(a, b, 0.0), p(a, b, c), p(a, 0.0, c)],
            vec![p(a, b, 0.0), p(0.0, b, 0.0), p(0.0, b, c), p(a, b, c)],
            vec![p(0.0, b, 0.0), p(0.0, 0.0, 0.0), p(0.0, 0.0, c), p(0.0, b, c)],
        ]
    }

    #[test]
    fn box_volume_from_any_reference() {
        let facets = box_facets(1.0, 2.0, 0.5);
        assert!((cell_volume(&facets, &p(0.3, 0.3, 0.3)) - 1.0).abs() < 1e-14);
        // A reference outside the cell still gives the signed total.
        assert!((cell_volume(&facets, &p(5.0, -2.0, 1.0)) - 1.0).abs() < 1e-13);
    }

    #[test]
    fn cell_rule_integrates_quadratics() {
        let facets = box_facets(1.0, 1.0, 1.0);
        let rule = cell_rule(&facets, &p(0.5, 0.5, 0.5), 2);
        let x2: f64 = rule.iter().map(|(x, w)| w * x.x * x.x).sum();
        let xy: f64 = rule.iter().map(|(x, w)| w * x.x * x.y).sum();
        assert!((x2 - 1.0 / 3.0).abs() < 1e-13);
        assert!((xy - 0.25).abs() < 1e-13);
    }

    #[test]
    fn concave_facet_triangulates_to_its_area() {
        let l_shape = vec![
            p(0.0, 0.0, 1.0),
            p(2.0, 0.0, 1.0),
            p(2.0, 1.0, 1.0),
            p(1.0, 1.0, 1.0),
            p(1.0, 2.0, 1.0),
            p(0.0, 2.0, 1.0),
        ];
        let tris = facet_triangles(&[l_shape.clone()]);
        assert_eq!(tris.len(), 4);
        let area: f64 = tris.iter().map(|t| polygon_area_3d(t)).sum();
        assert!((area - polygon_area_3d(&l_shape)).abs() < 1e-14);
        for t in &tris {
            assert!(newell_normal(t).z > 0.0);
        }
    }

    #[test]
    fn facet_rule_weights_sum_to_area() {
        let quad = vec![p(0.0, 0.0, 0.0), p(2.0, 0.0, 0.0), p(2.0, 0.0, 3.0), p(0.0, 0.0, 3.0)];
        let rule = facet_rule(&[quad], 3);
        let total: f64 = rule.iter().map(|(_, w)| w).sum();
        assert!((total - 6.0).abs() < 1e-13);
        let z: f64 = rule.iter().map(|(x, w)| w * x.z).sum();
        assert!((z - 9.0).abs() < 1e-13);
    }

    #[test]
    fn facet_with_hole_excludes_it() {
        let outer = vec![p(0.0, 0.0, 0.0), p(4.0, 0.0, 0.0), p(4.0, 4.0, 0.0), p(0.0, 4.0, 0.0)];
        let hole = vec![p(1.0, 1.0, 0.0), p(1.0, 3.0, 0.0), p(3.0, 3.0, 0.0), p(3.0, 1.0, 0.0)];
        let rule = facet_rule(&[outer, hole], 2);
        let area: f64 = rule.iter().map(|(_, w)| w).sum();
        assert!((area - 12.0).abs() < 1e-12);
        assert!(rule.iter().all(|(x, _)| !(x.x > 1.0 && x.x < 3.0 && x.y > 1.0 && x.y < 3.0)));
    }
}
