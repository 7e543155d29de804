use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use slotmap::SlotMap;

use crate::math::Point3;

use super::element::ElementId;
use super::side::SideId;

slotmap::new_key_type! {
    /// Unique identifier for a point in the registry.
    pub struct PointId;
}

/// Entities that touch a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PointOwner {
    /// Node of a background element.
    Element(ElementId),
    /// Node of a cutter side.
    Side(SideId),
    /// Vertex of a boundary facet produced by cutting an element.
    Facet { element: ElementId, facet: usize },
}

/// Data associated with a registered point.
#[derive(Debug, Clone)]
pub struct PointData {
    /// Canonical position; the first coordinate that created the point.
    pub coord: Point3,
    /// Back-references to the entities touching this point.
    pub owners: BTreeSet<PointOwner>,
}

type CellKey = [i64; 3];

#[derive(Debug, Default)]
struct RegistryInner {
    points: SlotMap<PointId, PointData>,
    grid: HashMap<CellKey, Vec<PointId>>,
}

/// Tolerance-based deduplication of coordinates into canonical points.
///
/// A lookup returns the nearest registered point within the tolerance; ties
/// go to the older point. Lookups take a read lock, and insertion re-checks
/// under the write lock, so concurrent callers registering the same
/// coordinate always get the same point.
#[derive(Debug)]
pub struct PointRegistry {
    tolerance: f64,
    cell_size: f64,
    inner: RwLock<RegistryInner>,
}

impl PointRegistry {
    /// Creates an empty registry merging points closer than `tolerance`.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            cell_size: tolerance.max(1e-12),
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Number of registered points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key(&self, coord: &Point3) -> CellKey {
        [
            (coord.x / self.cell_size).floor() as i64,
            (coord.y / self.cell_size).floor() as i64,
            (coord.z / self.cell_size).floor() as i64,
        ]
    }

    fn nearest(&self, inner: &RegistryInner, coord: &Point3) -> Option<PointId> {
        let [kx, ky, kz] = self.key(coord);
        let mut best: Option<(f64, PointId)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = inner.grid.get(&[kx + dx, ky + dy, kz + dz]) else {
                        continue;
                    };
                    for &id in bucket {
                        let dist = (inner.points[id].coord - coord).norm();
                        if dist > self.tolerance {
                            continue;
                        }
                        let better = match best {
                            None => true,
                            Some((d, other)) => dist < d || (dist == d && id < other),
                        };
                        if better {
                            best = Some((dist, id));
                        }
                    }
                }
            }
        }
        best.map(|(_, id)| id)
    }

    /// Returns the point within tolerance of `coord`, if any.
    #[must_use]
    pub fn find(&self, coord: &Point3) -> Option<PointId> {
        let inner = self.inner.read();
        self.nearest(&inner, coord)
    }

    /// Returns an existing point within tolerance of `coord`, or creates one.
    pub fn insert_or_find(&self, coord: Point3) -> PointId {
        self.register(coord).0
    }

    /// Like [`Self::insert_or_find`], also returning the canonical coordinate.
    pub fn register(&self, coord: Point3) -> (PointId, Point3) {
        {
            let inner = self.inner.read();
            if let Some(id) = self.nearest(&inner, &coord) {
                return (id, inner.points[id].coord);
            }
        }
        let mut inner = self.inner.write();
        if let Some(id) = self.nearest(&inner, &coord) {
            return (id, inner.points[id].coord);
        }
        let id = inner.points.insert(PointData {
            coord,
            owners: BTreeSet::new(),
        });
        let key = self.key(&coord);
        inner.grid.entry(key).or_default().push(id);
        (id, coord)
    }

    /// Canonical coordinate of a point. Unknown ids yield `None`.
    #[must_use]
    pub fn coord(&self, id: PointId) -> Option<Point3> {
        self.inner.read().points.get(id).map(|p| p.coord)
    }

    /// Canonical coordinates of several points; unknown ids are skipped.
    #[must_use]
    pub fn coords(&self, ids: &[PointId]) -> Vec<Point3> {
        let inner = self.inner.read();
        ids.iter()
            .filter_map(|&id| inner.points.get(id).map(|p| p.coord))
            .collect()
    }

    /// Records that `owner` touches point `id`.
    pub fn add_owner(&self, id: PointId, owner: PointOwner) {
        if let Some(point) = self.inner.write().points.get_mut(id) {
            point.owners.insert(owner);
        }
    }

    /// Entities touching point `id`.
    #[must_use]
    pub fn owners(&self, id: PointId) -> Vec<PointOwner> {
        self.inner
            .read()
            .points
            .get(id)
            .map(|p| p.owners.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    #[test]
    fn close_coordinates_merge() {
        let registry = PointRegistry::new(1e-8);
        let a = registry.insert_or_find(p(1.0, 2.0, 3.0));
        let b = registry.insert_or_find(p(1.0 + 5e-9, 2.0, 3.0 - 5e-9));
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distant_coordinates_stay_apart() {
        let registry = PointRegistry::new(1e-8);
        let a = registry.insert_or_find(p(0.0, 0.0, 0.0));
        let b = registry.insert_or_find(p(2e-8, 0.0, 0.0));
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_coordinate_is_first_inserted() {
        let registry = PointRegistry::new(1e-6);
        let a = registry.insert_or_find(p(0.5, 0.5, 0.5));
        let _ = registry.insert_or_find(p(0.5 + 1e-7, 0.5, 0.5));
        assert_eq!(registry.coord(a), Some(p(0.5, 0.5, 0.5)));
    }

    #[test]
    fn merge_across_grid_cells() {
        let registry = PointRegistry::new(1e-3);
        // Straddles a cell boundary at x = 1e-3 * k.
        let a = registry.insert_or_find(p(0.999_9e-3, 0.0, 0.0));
        let b = registry.insert_or_find(p(1.000_1e-3, 0.0, 0.0));
        assert_eq!(a, b);
    }

    #[test]
    fn nearest_candidate_wins() {
        let registry = PointRegistry::new(1.0);
        let a = registry.insert_or_find(p(0.0, 0.0, 0.0));
        let b = registry.insert_or_find(p(1.5, 0.0, 0.0));
        assert_ne!(a, b);
        assert_eq!(registry.find(&p(0.9, 0.0, 0.0)), Some(b));
        assert_eq!(registry.find(&p(0.6, 0.0, 0.0)), Some(a));
    }

    #[test]
    fn owners_are_recorded() {
        let registry = PointRegistry::new(1e-10);
        let a = registry.insert_or_find(p(0.0, 0.0, 0.0));
        registry.add_owner(a, PointOwner::Side(SideId(7)));
        registry.add_owner(a, PointOwner::Element(ElementId(1)));
        registry.add_owner(a, PointOwner::Side(SideId(7)));
        assert_eq!(registry.owners(a).len(), 2);
    }

    #[test]
    fn concurrent_inserts_agree() {
        use rayon::prelude::*;
        let registry = PointRegistry::new(1e-9);
        let ids: Vec<PointId> = (0..64)
            .into_par_iter()
            .map(|i| registry.insert_or_find(p(0.25 + f64::from(i % 4) * 1e-12, 0.5, 0.75)))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.len(), 1);
    }

    proptest! {
        #[test]
        fn within_tolerance_always_merges(
            x in -10.0f64..10.0,
            y in -10.0f64..10.0,
            z in -10.0f64..10.0,
            dx in -0.5f64..0.5,
            dy in -0.5f64..0.5,
            dz in -0.5f64..0.5,
        ) {
            let tol = 1e-6;
            let registry = PointRegistry::new(tol);
            let a = registry.insert_or_find(p(x, y, z));
            let offset = nalgebra::Vector3::new(dx, dy, dz) * (tol * 0.9);
            let b = registry.insert_or_find(p(x, y, z) + offset);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn beyond_tolerance_never_merges(
            x in -10.0f64..10.0,
            y in -10.0f64..10.0,
            z in -10.0f64..10.0,
            scale in 1.5f64..100.0,
        ) {
            let tol = 1e-6;
            let registry = PointRegistry::new(tol);
            let a = registry.insert_or_find(p(x, y, z));
            let b = registry.insert_or_find(p(x + tol * scale, y, z));
            prop_assert_ne!(a, b);
        }
    }
}
