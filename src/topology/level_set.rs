//! Level-set input and its piecewise-linear zero iso-surface.
//!
//! Inside each element the field is interpolated linearly over the fixed
//! tetrahedral decomposition, so the iso-surface is a set of planar
//! triangles and quads that conform across the decomposition.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::math::polygon_3d::newell_normal;
use crate::math::{Matrix3, Point3, Vector3};

use super::element::{ElementData, ElementId};

/// Analytic level-set field sampled at element nodes.
pub type LevelSetFn = Arc<dyn Fn(&Point3) -> f64 + Send + Sync>;

/// Level-set values known to the store.
///
/// Explicit per-element values take precedence over the analytic field.
#[derive(Default, Clone)]
pub struct LevelSet {
    values: BTreeMap<ElementId, Vec<f64>>,
    field: Option<LevelSetFn>,
}

impl std::fmt::Debug for LevelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelSet")
            .field("values", &self.values)
            .field("field", &self.field.is_some())
            .finish()
    }
}

impl LevelSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.field.is_none()
    }

    pub(crate) fn insert_values(&mut self, element: ElementId, values: Vec<f64>) -> bool {
        self.values.insert(element, values).is_none()
    }

    pub(crate) fn set_field(&mut self, field: LevelSetFn) {
        self.field = Some(field);
    }

    #[must_use]
    pub fn explicit_values(&self, element: ElementId) -> Option<&[f64]> {
        self.values.get(&element).map(Vec::as_slice)
    }

    /// Nodal values for an element, explicit or sampled from the field.
    #[must_use]
    pub fn node_values(&self, element: &ElementData) -> Option<Vec<f64>> {
        if let Some(values) = self.values.get(&element.id) {
            return Some(values.clone());
        }
        self.field
            .as_ref()
            .map(|f| element.coords.iter().map(|x| f(x)).collect())
    }
}

/// True if the nodal values change sign or touch zero.
#[must_use]
pub fn is_cut(values: &[f64]) -> bool {
    let any_neg = values.iter().any(|&v| v < 0.0);
    let any_pos = values.iter().any(|&v| v > 0.0);
    let any_zero = values.iter().any(|&v| v == 0.0);
    (any_neg && any_pos) || any_zero
}

/// Zero iso-surface polygons of the element's level set.
///
/// Each polygon is planar, lies in one decomposition tetrahedron and is
/// oriented with its normal pointing to positive values.
#[must_use]
pub fn iso_polygons(element: &ElementData, values: &[f64]) -> Vec<Vec<Point3>> {
    let mut polygons = Vec::new();
    for tet in element.shape.tets() {
        let coords = element.tet_coords(tet);
        let vals = [values[tet[0]], values[tet[1]], values[tet[2]], values[tet[3]]];
        if let Some(poly) = tet_iso_polygon(tet, &coords, &vals) {
            polygons.push(poly);
        }
    }
    polygons
}

fn tet_iso_polygon(nodes: &[usize; 4], coords: &[Point3; 4], vals: &[f64; 4]) -> Option<Vec<Point3>> {
    // Crossing on edge (i, j); evaluated with the lower global node first so
    // neighbouring tetrahedra produce bit-identical points.
    let crossing = |i: usize, j: usize| {
        let (a, b) = if nodes[i] < nodes[j] { (i, j) } else { (j, i) };
        let t = vals[a] / (vals[a] - vals[b]);
        coords[a] + (coords[b] - coords[a]) * t
    };

    let neg: Vec<usize> = (0..4).filter(|&i| vals[i] < 0.0).collect();
    let pos: Vec<usize> = (0..4).filter(|&i| vals[i] > 0.0).collect();
    let zero: Vec<usize> = (0..4).filter(|&i| vals[i] == 0.0).collect();

    let mut points: Vec<Point3> = zero.iter().map(|&i| coords[i]).collect();
    if neg.len() == 2 && pos.len() == 2 {
        // Cyclic order around the quad.
        let (i, j, k, l) = (neg[0], neg[1], pos[0], pos[1]);
        points = vec![crossing(i, k), crossing(i, l), crossing(j, l), crossing(j, k)];
    } else {
        for &i in &neg {
            for &j in &pos {
                points.push(crossing(i, j));
            }
        }
    }
    if points.len() < 3 || (pos.is_empty() && neg.is_empty()) {
        return None;
    }

    let gradient = linear_gradient(coords, vals)?;
    if newell_normal(&points).dot(&gradient) < 0.0 {
        points.reverse();
    }
    Some(points)
}

/// Gradient of the linear interpolant over one tetrahedron.
fn linear_gradient(coords: &[Point3; 4], vals: &[f64; 4]) -> Option<Vector3> {
    let e1 = coords[1] - coords[0];
    let e2 = coords[2] - coords[0];
    let e3 = coords[3] - coords[0];
    let m = Matrix3::from_rows(&[e1.transpose(), e2.transpose(), e3.transpose()]);
    let rhs = Vector3::new(vals[1] - vals[0], vals[2] - vals[0], vals[3] - vals[0]);
    m.lu().solve(&rhs)
}

/// Barycentric coordinates of `x` in a tetrahedron.
fn barycentric(coords: &[Point3; 4], x: &Point3) -> Option<[f64; 4]> {
    let m = Matrix3::from_columns(&[
        coords[1] - coords[0],
        coords[2] - coords[0],
        coords[3] - coords[0],
    ]);
    let l = m.lu().solve(&(x - coords[0]))?;
    Some([1.0 - l.x - l.y - l.z, l.x, l.y, l.z])
}

/// Piecewise-linear level-set value at `x`.
///
/// Uses the decomposition tetrahedron that contains `x`, or the closest one
/// in barycentric terms when `x` sits on a shared face or just outside.
#[must_use]
pub fn interpolate(element: &ElementData, values: &[f64], x: &Point3) -> f64 {
    let mut best: Option<(f64, f64)> = None;
    for tet in element.shape.tets() {
        let coords = element.tet_coords(tet);
        let Some(bary) = barycentric(&coords, x) else {
            continue;
        };
        let min = bary.iter().copied().fold(f64::INFINITY, f64::min);
        let value = bary
            .iter()
            .zip(tet)
            .map(|(b, &node)| b * values[node])
            .sum();
        if best.is_none_or(|(m, _)| min > m) {
            best = Some((min, value));
        }
    }
    best.map_or(0.0, |(_, v)| v)
}
