use super::element::ElementId;
use super::point::PointId;
use super::side::SideId;

/// Entity an edge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeOwner {
    /// Edge of a cutter side triangle.
    Side(SideId),
    /// Edge of face `face` of an element.
    ElementFace { element: ElementId, face: usize },
}

/// A straight edge between two registered points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeData {
    /// Start point of the edge.
    pub start: PointId,
    /// End point of the edge.
    pub end: PointId,
    /// The entity this edge bounds.
    pub owner: EdgeOwner,
}

impl EdgeData {
    #[must_use]
    pub fn new(start: PointId, end: PointId, owner: EdgeOwner) -> Self {
        Self { start, end, owner }
    }

    /// Endpoints ordered by id, so the same segment compares equal in both
    /// directions.
    #[must_use]
    pub fn key(&self) -> (PointId, PointId) {
        if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        }
    }

    #[must_use]
    pub fn shares_point(&self, other: &Self) -> bool {
        self.start == other.start
            || self.start == other.end
            || self.end == other.start
            || self.end == other.end
    }
}

/// Edges of a closed point loop.
pub(crate) fn loop_edges(points: &[PointId], owner: EdgeOwner) -> Vec<EdgeData> {
    let n = points.len();
    (0..n)
        .filter(|&i| points[i] != points[(i + 1) % n])
        .map(|i| EdgeData::new(points[i], points[(i + 1) % n], owner))
        .collect()
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn key_is_direction_independent() {
        let mut ids: SlotMap<PointId, ()> = SlotMap::with_key();
        let a = ids.insert(());
        let b = ids.insert(());
        let owner = EdgeOwner::Side(SideId(1));
        assert_eq!(EdgeData::new(a, b, owner).key(), EdgeData::new(b, a, owner).key());
    }

    #[test]
    fn loop_edges_skip_repeated_points() {
        let mut ids: SlotMap<PointId, ()> = SlotMap::with_key();
        let a = ids.insert(());
        let b = ids.insert(());
        let c = ids.insert(());
        let edges = loop_edges(&[a, b, b, c], EdgeOwner::Side(SideId(0)));
        assert_eq!(edges.len(), 3);
        assert!(edges[0].shares_point(&edges[1]));
    }
}
