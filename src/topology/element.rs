use std::fmt;

use crate::geometry::{tet_volume, Aabb, ElementShape};
use crate::math::polygon_3d::{newell_normal, vertex_centroid};
use crate::math::Point3;

use super::edge::{loop_edges, EdgeData, EdgeOwner};
use super::point::PointId;

/// Caller-supplied identifier of a background element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered background element.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub id: ElementId,
    pub shape: ElementShape,
    pub nodes: Vec<PointId>,
    pub coords: Vec<Point3>,
    pub bbox: Aabb,
    /// Volume of the fixed tetrahedral decomposition.
    pub volume: f64,
}

impl ElementData {
    /// Characteristic length: the bounding box diagonal.
    #[must_use]
    pub fn size(&self) -> f64 {
        self.bbox.diagonal()
    }

    #[must_use]
    pub fn centroid(&self) -> Point3 {
        vertex_centroid(&self.coords)
    }

    /// Coordinates of the nodes of tetrahedron `tet` of the decomposition.
    #[must_use]
    pub fn tet_coords(&self, tet: &[usize; 4]) -> [Point3; 4] {
        [
            self.coords[tet[0]],
            self.coords[tet[1]],
            self.coords[tet[2]],
            self.coords[tet[3]],
        ]
    }

    /// Edges of every face, each undirected edge once.
    #[must_use]
    pub fn edges(&self) -> Vec<EdgeData> {
        let mut edges: Vec<EdgeData> = Vec::new();
        for (face, local) in self.shape.faces().iter().enumerate() {
            let loop_ids: Vec<PointId> = local.iter().map(|&i| self.nodes[i]).collect();
            let owner = EdgeOwner::ElementFace {
                element: self.id,
                face,
            };
            for edge in loop_edges(&loop_ids, owner) {
                if !edges.iter().any(|e| e.key() == edge.key()) {
                    edges.push(edge);
                }
            }
        }
        edges
    }

    /// True if every face is planar and the element lies on the inner side
    /// of every face plane, both within `tol`.
    #[must_use]
    pub fn is_convex(&self, tol: f64) -> bool {
        for local in self.shape.faces() {
            let pts: Vec<Point3> = local.iter().map(|&i| self.coords[i]).collect();
            let Some(normal) = newell_normal(&pts).try_normalize(f64::MIN_POSITIVE) else {
                return false;
            };
            let origin = pts[0];
            for (i, node) in self.coords.iter().enumerate() {
                let distance = normal.dot(&(node - origin));
                if local.contains(&i) {
                    if distance.abs() > tol {
                        return false;
                    }
                } else if distance > tol {
                    return false;
                }
            }
        }
        true
    }

    /// Local coordinates of a global point, if the inverse map converges.
    #[must_use]
    pub fn local_coordinates(&self, x: &Point3, tol: f64) -> Option<Point3> {
        self.shape.local_coordinates(&self.coords, x, tol)
    }
}

/// Volumes of the decomposition tetrahedra of `coords`.
#[must_use]
pub(crate) fn decomposition_volumes(shape: ElementShape, coords: &[Point3]) -> Vec<f64> {
    shape
        .tets()
        .iter()
        .map(|t| tet_volume(&coords[t[0]], &coords[t[1]], &coords[t[2]], &coords[t[3]]))
        .collect()
}
