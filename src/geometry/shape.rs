//! Closed set of element and side shapes.
//!
//! Connectivity tables and shape functions are dispatched by `match`; local
//! node numbering follows the usual finite-element conventions.

use std::fmt;

use crate::math::{Matrix3, Point3, Vector3};

/// Shape of a background element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementShape {
    /// Trilinear hexahedron, local coordinates in `[-1, 1]^3`.
    Hex8,
    /// Linear tetrahedron, local coordinates in the unit simplex.
    Tet4,
    /// Linear wedge, triangle `(r, s)` times `t` in `[-1, 1]`.
    Wedge6,
}

/// Shape of a cutter side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideShape {
    Tri3,
    /// Split along the 0-2 diagonal into two triangles.
    Quad4,
}

const HEX8_FACES: [&[usize]; 6] = [
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
];

const TET4_FACES: [&[usize]; 4] = [&[0, 2, 1], &[0, 1, 3], &[1, 2, 3], &[0, 3, 2]];

const WEDGE6_FACES: [&[usize]; 5] = [
    &[0, 2, 1],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[2, 0, 3, 5],
];

const HEX8_TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
    [0, 5, 1, 6],
];

const TET4_TETS: [[usize; 4]; 1] = [[0, 1, 2, 3]];

const WEDGE6_TETS: [[usize; 4]; 3] = [[0, 1, 2, 3], [1, 2, 3, 4], [2, 3, 4, 5]];

const HEX8_NODES: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

impl ElementShape {
    #[must_use]
    pub fn node_count(self) -> usize {
        match self {
            Self::Hex8 => 8,
            Self::Tet4 => 4,
            Self::Wedge6 => 6,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Hex8 => "hex8",
            Self::Tet4 => "tet4",
            Self::Wedge6 => "wedge6",
        }
    }

    /// Faces as local node loops, counter-clockwise seen from outside.
    #[must_use]
    pub fn faces(self) -> &'static [&'static [usize]] {
        match self {
            Self::Hex8 => &HEX8_FACES,
            Self::Tet4 => &TET4_FACES,
            Self::Wedge6 => &WEDGE6_FACES,
        }
    }

    /// Fixed, positively oriented tetrahedral decomposition over the nodes.
    ///
    /// Used for the element volume and the piecewise-linear level set.
    #[must_use]
    pub fn tets(self) -> &'static [[usize; 4]] {
        match self {
            Self::Hex8 => &HEX8_TETS,
            Self::Tet4 => &TET4_TETS,
            Self::Wedge6 => &WEDGE6_TETS,
        }
    }

    /// Sub-tetrahedra used when an element is escalated.
    ///
    /// Hexahedra and wedges use their node decomposition; a tetrahedron is
    /// split into four around its centroid so the sub-problems differ from
    /// the failed one.
    #[must_use]
    pub fn escalation_tets(self, nodes: &[Point3]) -> Vec<[Point3; 4]> {
        match self {
            Self::Hex8 | Self::Wedge6 => self
                .tets()
                .iter()
                .map(|t| [nodes[t[0]], nodes[t[1]], nodes[t[2]], nodes[t[3]]])
                .collect(),
            Self::Tet4 => {
                let c = Point3::from((nodes[0].coords + nodes[1].coords + nodes[2].coords + nodes[3].coords) / 4.0);
                TET4_FACES
                    .iter()
                    .map(|f| [nodes[f[0]], nodes[f[2]], nodes[f[1]], c])
                    .collect()
            }
        }
    }

    /// Local coordinates of the element centre.
    #[must_use]
    pub fn local_centroid(self) -> Point3 {
        match self {
            Self::Hex8 => Point3::origin(),
            Self::Tet4 => Point3::new(0.25, 0.25, 0.25),
            Self::Wedge6 => Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0),
        }
    }

    /// Shape function values at local coordinates `xi`.
    #[must_use]
    pub fn shape_values(self, xi: &Point3) -> Vec<f64> {
        match self {
            Self::Hex8 => HEX8_NODES
                .iter()
                .map(|n| 0.125 * (1.0 + n[0] * xi.x) * (1.0 + n[1] * xi.y) * (1.0 + n[2] * xi.z))
                .collect(),
            Self::Tet4 => vec![1.0 - xi.x - xi.y - xi.z, xi.x, xi.y, xi.z],
            Self::Wedge6 => {
                let tri = [1.0 - xi.x - xi.y, xi.x, xi.y];
                let lo = 0.5 * (1.0 - xi.z);
                let hi = 0.5 * (1.0 + xi.z);
                vec![tri[0] * lo, tri[1] * lo, tri[2] * lo, tri[0] * hi, tri[1] * hi, tri[2] * hi]
            }
        }
    }

    /// Shape function derivatives with respect to the local coordinates.
    #[must_use]
    pub fn shape_derivatives(self, xi: &Point3) -> Vec<Vector3> {
        match self {
            Self::Hex8 => HEX8_NODES
                .iter()
                .map(|n| {
                    let a = 1.0 + n[0] * xi.x;
                    let b = 1.0 + n[1] * xi.y;
                    let c = 1.0 + n[2] * xi.z;
                    Vector3::new(0.125 * n[0] * b * c, 0.125 * a * n[1] * c, 0.125 * a * b * n[2])
                })
                .collect(),
            Self::Tet4 => vec![
                Vector3::new(-1.0, -1.0, -1.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, 0.0, 1.0),
            ],
            Self::Wedge6 => {
                let tri = [1.0 - xi.x - xi.y, xi.x, xi.y];
                let dtri = [(-1.0, -1.0), (1.0, 0.0), (0.0, 1.0)];
                let lo = 0.5 * (1.0 - xi.z);
                let hi = 0.5 * (1.0 + xi.z);
                let mut out = Vec::with_capacity(6);
                for i in 0..3 {
                    out.push(Vector3::new(dtri[i].0 * lo, dtri[i].1 * lo, -0.5 * tri[i]));
                }
                for i in 0..3 {
                    out.push(Vector3::new(dtri[i].0 * hi, dtri[i].1 * hi, 0.5 * tri[i]));
                }
                out
            }
        }
    }

    /// Global position of local coordinates `xi`.
    #[must_use]
    pub fn map_to_global(self, nodes: &[Point3], xi: &Point3) -> Point3 {
        let values = self.shape_values(xi);
        let sum = nodes
            .iter()
            .zip(&values)
            .fold(Vector3::zeros(), |acc, (p, n)| acc + p.coords * *n);
        Point3::from(sum)
    }

    /// Jacobian `dx/dxi` at local coordinates `xi` (columns are `dx/dxi_j`).
    #[must_use]
    pub fn jacobian(self, nodes: &[Point3], xi: &Point3) -> Matrix3 {
        let derivs = self.shape_derivatives(xi);
        let mut jac = Matrix3::zeros();
        for (p, d) in nodes.iter().zip(&derivs) {
            jac += p.coords * d.transpose();
        }
        jac
    }

    /// Inverts the element map by Newton iteration.
    ///
    /// Returns `None` if the iteration does not converge, which happens only
    /// for badly distorted elements.
    #[must_use]
    pub fn local_coordinates(self, nodes: &[Point3], x: &Point3, tol: f64) -> Option<Point3> {
        let mut xi = self.local_centroid();
        for _ in 0..50 {
            let residual = x - self.map_to_global(nodes, &xi);
            let jac = self.jacobian(nodes, &xi);
            let step = jac.lu().solve(&residual)?;
            xi += step;
            if step.norm() <= tol {
                return Some(xi);
            }
        }
        None
    }
}

impl fmt::Display for ElementShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl SideShape {
    #[must_use]
    pub fn node_count(self) -> usize {
        match self {
            Self::Tri3 => 3,
            Self::Quad4 => 4,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Tri3 => "tri3",
            Self::Quad4 => "quad4",
        }
    }

    /// Triangles covering the side, in side node order.
    #[must_use]
    pub fn triangles(self) -> &'static [[usize; 3]] {
        match self {
            Self::Tri3 => &[[0, 1, 2]],
            Self::Quad4 => &[[0, 1, 2], [0, 2, 3]],
        }
    }
}

/// Signed volume of a tetrahedron (positive for a right-handed ordering).
#[must_use]
pub fn tet_volume(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    (b - a).cross(&(c - a)).dot(&(d - a)) / 6.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::polygon_3d::newell_normal;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn unit_hex() -> Vec<Point3> {
        vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
            p(0.0, 0.0, 1.0),
            p(1.0, 0.0, 1.0),
            p(1.0, 1.0, 1.0),
            p(0.0, 1.0, 1.0),
        ]
    }

    fn unit_wedge() -> Vec<Point3> {
        vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(0.0, 1.0, 0.0),
            p(0.0, 0.0, 1.0),
            p(1.0, 0.0, 1.0),
            p(0.0, 1.0, 1.0),
        ]
    }

    fn decomposed_volume(shape: ElementShape, nodes: &[Point3]) -> f64 {
        shape
            .tets()
            .iter()
            .map(|t| tet_volume(&nodes[t[0]], &nodes[t[1]], &nodes[t[2]], &nodes[t[3]]))
            .sum()
    }

    #[test]
    fn tets_are_positive_and_fill_the_element() {
        let hex = unit_hex();
        for t in ElementShape::Hex8.tets() {
            assert!(tet_volume(&hex[t[0]], &hex[t[1]], &hex[t[2]], &hex[t[3]]) > 0.0);
        }
        assert!((decomposed_volume(ElementShape::Hex8, &hex) - 1.0).abs() < 1e-14);
        assert!((decomposed_volume(ElementShape::Wedge6, &unit_wedge()) - 0.5).abs() < 1e-14);
    }

    #[test]
    fn faces_point_outward() {
        for (shape, nodes) in [(ElementShape::Hex8, unit_hex()), (ElementShape::Wedge6, unit_wedge())] {
            let centre = shape.map_to_global(&nodes, &shape.local_centroid());
            for face in shape.faces() {
                let pts: Vec<Point3> = face.iter().map(|&i| nodes[i]).collect();
                let n = newell_normal(&pts);
                assert!(n.dot(&(pts[0] - centre)) > 0.0, "{shape} face {face:?}");
            }
        }
    }

    #[test]
    fn escalation_tets_of_tet_fill_it() {
        let nodes = vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(0.0, 0.0, 1.0)];
        let tets = ElementShape::Tet4.escalation_tets(&nodes);
        assert_eq!(tets.len(), 4);
        let total: f64 = tets
            .iter()
            .map(|t| {
                let v = tet_volume(&t[0], &t[1], &t[2], &t[3]);
                assert!(v > 0.0);
                v
            })
            .sum();
        assert!((total - 1.0 / 6.0).abs() < 1e-15);
    }

    #[test]
    fn shape_values_partition_unity() {
        let xi = p(0.2, -0.3, 0.7);
        let sum: f64 = ElementShape::Hex8.shape_values(&xi).iter().sum();
        assert!((sum - 1.0).abs() < 1e-14);
        let sum: f64 = ElementShape::Wedge6.shape_values(&p(0.2, 0.3, -0.4)).iter().sum();
        assert!((sum - 1.0).abs() < 1e-14);
    }

    #[test]
    fn local_coordinates_invert_the_map() {
        let mut hex = unit_hex();
        hex[6] = p(1.2, 1.1, 1.3);
        let xi = p(0.3, -0.5, 0.1);
        let x = ElementShape::Hex8.map_to_global(&hex, &xi);
        let back = ElementShape::Hex8.local_coordinates(&hex, &x, 1e-13).unwrap();
        assert!((back - xi).norm() < 1e-10);

        let wedge = unit_wedge();
        let xi = p(0.2, 0.5, -0.25);
        let x = ElementShape::Wedge6.map_to_global(&wedge, &xi);
        let back = ElementShape::Wedge6.local_coordinates(&wedge, &x, 1e-13).unwrap();
        assert!((back - xi).norm() < 1e-10);
    }

    #[test]
    fn quad_side_splits_in_two() {
        assert_eq!(SideShape::Quad4.triangles().len(), 2);
        assert_eq!(SideShape::Tri3.node_count(), 3);
    }
}
