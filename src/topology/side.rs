use std::fmt;

use crate::geometry::{Aabb, SideShape};
use crate::math::polygon_3d::newell_normal;
use crate::math::{Point3, Vector3};

use super::edge::{loop_edges, EdgeData, EdgeOwner};
use super::point::PointId;

/// Caller-supplied identifier of a cutter side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SideId(pub u64);

impl fmt::Display for SideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a cutter triangle comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CutterOrigin {
    /// A registered mesh side.
    Side(SideId),
    /// The zero iso-surface of the level set inside one element.
    LevelSet,
}

impl CutterOrigin {
    #[must_use]
    pub fn side(self) -> Option<SideId> {
        match self {
            Self::Side(id) => Some(id),
            Self::LevelSet => None,
        }
    }
}

/// Triangle of a cutting surface. The normal points to the outside.
#[derive(Debug, Clone)]
pub struct CutterTriangle {
    pub origin: CutterOrigin,
    pub points: [PointId; 3],
    pub coords: [Point3; 3],
    /// Unit normal following the vertex order.
    pub normal: Vector3,
    pub bbox: Aabb,
}

impl CutterTriangle {
    /// Builds a triangle; `None` if it has no area.
    #[must_use]
    pub fn new(origin: CutterOrigin, points: [PointId; 3], coords: [Point3; 3]) -> Option<Self> {
        let normal = (coords[1] - coords[0]).cross(&(coords[2] - coords[0]));
        let normal = normal.try_normalize(f64::MIN_POSITIVE)?;
        Some(Self {
            origin,
            points,
            coords,
            normal,
            bbox: Aabb::from_points(&coords),
        })
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        0.5 * (self.coords[1] - self.coords[0])
            .cross(&(self.coords[2] - self.coords[0]))
            .norm()
    }
}

/// A registered cutter side: one tri3 or quad4 face of the cutting mesh.
#[derive(Debug, Clone)]
pub struct SideData {
    pub id: SideId,
    pub shape: SideShape,
    pub nodes: Vec<PointId>,
    pub coords: Vec<Point3>,
    pub bbox: Aabb,
}

impl SideData {
    /// Outward normal, area weighted.
    #[must_use]
    pub fn normal(&self) -> Vector3 {
        newell_normal(&self.coords)
    }

    /// Triangles making up the side, all carrying this side's id.
    #[must_use]
    pub fn triangles(&self) -> Vec<CutterTriangle> {
        self.shape
            .triangles()
            .iter()
            .filter_map(|t| {
                CutterTriangle::new(
                    CutterOrigin::Side(self.id),
                    [self.nodes[t[0]], self.nodes[t[1]], self.nodes[t[2]]],
                    [self.coords[t[0]], self.coords[t[1]], self.coords[t[2]]],
                )
            })
            .collect()
    }

    /// Boundary and diagonal edges of the side triangles.
    #[must_use]
    pub fn edges(&self) -> Vec<EdgeData> {
        let mut edges: Vec<EdgeData> = Vec::new();
        for t in self.shape.triangles() {
            let tri = [self.nodes[t[0]], self.nodes[t[1]], self.nodes[t[2]]];
            for edge in loop_edges(&tri, EdgeOwner::Side(self.id)) {
                if !edges.iter().any(|e| e.key() == edge.key()) {
                    edges.push(edge);
                }
            }
        }
        edges
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn quad() -> SideData {
        let mut ids: SlotMap<PointId, ()> = SlotMap::with_key();
        let coords = vec![
            p(0.0, 0.0, 0.5),
            p(1.0, 0.0, 0.5),
            p(1.0, 1.0, 0.5),
            p(0.0, 1.0, 0.5),
        ];
        SideData {
            id: SideId(3),
            shape: SideShape::Quad4,
            nodes: coords.iter().map(|_| ids.insert(())).collect(),
            bbox: Aabb::from_points(&coords),
            coords,
        }
    }

    #[test]
    fn quad_splits_into_two_triangles_with_same_id() {
        let tris = quad().triangles();
        assert_eq!(tris.len(), 2);
        assert!(tris.iter().all(|t| t.origin == CutterOrigin::Side(SideId(3))));
        assert!(tris.iter().all(|t| (t.normal - Vector3::z()).norm() < 1e-14));
        let area: f64 = tris.iter().map(CutterTriangle::area).sum();
        assert!((area - 1.0).abs() < 1e-14);
    }

    #[test]
    fn quad_edges_include_diagonal_once() {
        assert_eq!(quad().edges().len(), 5);
    }

    #[test]
    fn degenerate_triangle_is_rejected() {
        let mut ids: SlotMap<PointId, ()> = SlotMap::with_key();
        let pts = [ids.insert(()), ids.insert(()), ids.insert(())];
        let coords = [p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(2.0, 0.0, 0.0)];
        assert!(CutterTriangle::new(CutterOrigin::LevelSet, pts, coords).is_none());
    }
}
