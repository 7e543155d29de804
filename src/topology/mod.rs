pub mod edge;
pub mod element;
pub mod level_set;
pub mod point;
pub mod side;

pub use edge::{EdgeData, EdgeOwner};
pub use element::{ElementData, ElementId};
pub use level_set::{LevelSet, LevelSetFn};
pub use point::{PointData, PointId, PointOwner, PointRegistry};
pub use side::{CutterOrigin, CutterTriangle, SideData, SideId};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::InputError;
use crate::geometry::{Aabb, ElementShape, SideShape};
use crate::math::{Kernel, Point3, Sign};
use crate::operations::cut::ElementResult;

use element::decomposition_volumes;

/// Central arena owning the points, elements, cutter sides and level-set
/// data of one cut problem.
///
/// Registration validates eagerly, so every entity in the store is
/// well-formed by the time a cut runs. Elements and sides are keyed by the
/// caller's ids; points are deduplicated through the [`PointRegistry`].
#[derive(Debug)]
pub struct CutStore {
    registry: PointRegistry,
    elements: BTreeMap<ElementId, ElementData>,
    sides: BTreeMap<SideId, SideData>,
    level_set: LevelSet,
    results: BTreeMap<ElementId, Arc<ElementResult>>,
    failed: BTreeSet<ElementId>,
}

impl CutStore {
    /// Creates an empty store merging points closer than `tolerance`.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            registry: PointRegistry::new(tolerance),
            elements: BTreeMap::new(),
            sides: BTreeMap::new(),
            level_set: LevelSet::default(),
            results: BTreeMap::new(),
            failed: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &PointRegistry {
        &self.registry
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.registry.tolerance()
    }

    // --- Element operations ---

    /// Registers a background element.
    ///
    /// # Errors
    ///
    /// Rejects duplicate ids, wrong node counts, non-finite coordinates,
    /// inverted or flat elements, and level-set values already registered
    /// for this id with the wrong length.
    pub fn add_element(
        &mut self,
        id: ElementId,
        shape: ElementShape,
        coords: &[Point3],
    ) -> Result<(), InputError> {
        if self.elements.contains_key(&id) {
            return Err(InputError::DuplicateId {
                entity: "element",
                id: id.0,
            });
        }
        check_nodes("element", id.0, shape.name(), shape.node_count(), coords)?;

        let volumes = decomposition_volumes(shape, coords);
        let volume: f64 = volumes.iter().sum();
        let smallest = volumes.iter().copied().fold(f64::INFINITY, f64::min);
        if smallest <= 0.0 {
            return Err(InputError::NonPositiveVolume {
                element: id,
                volume: if volume <= 0.0 { volume } else { smallest },
            });
        }
        if let Some(values) = self.level_set.explicit_values(id) {
            check_level_set_length(id, shape.node_count(), values)?;
        }

        let nodes = coords
            .iter()
            .map(|&c| {
                let point = self.registry.insert_or_find(c);
                self.registry.add_owner(point, PointOwner::Element(id));
                point
            })
            .collect();
        self.elements.insert(
            id,
            ElementData {
                id,
                shape,
                nodes,
                coords: coords.to_vec(),
                bbox: Aabb::from_points(coords),
                volume,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&ElementData> {
        self.elements.get(&id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementData> {
        self.elements.values()
    }

    // --- Side operations ---

    /// Registers a cutter side.
    ///
    /// # Errors
    ///
    /// Rejects duplicate ids, wrong node counts, non-finite coordinates,
    /// zero-area sides, and sides crossing an already registered side they
    /// share no point with.
    pub fn add_cut_side(
        &mut self,
        id: SideId,
        shape: SideShape,
        coords: &[Point3],
    ) -> Result<(), InputError> {
        if self.sides.contains_key(&id) {
            return Err(InputError::DuplicateId {
                entity: "side",
                id: id.0,
            });
        }
        check_nodes("side", id.0, shape.name(), shape.node_count(), coords)?;

        let tol = self.tolerance();
        let degenerate = shape.triangles().iter().any(|t| {
            let area = 0.5
                * (coords[t[1]] - coords[t[0]])
                    .cross(&(coords[t[2]] - coords[t[0]]))
                    .norm();
            area <= tol * tol
        });
        if degenerate {
            return Err(InputError::DegenerateSide { side: id });
        }

        let bbox = Aabb::from_points(coords);
        if let Some(other) = self.crossing_side(shape, coords, &bbox) {
            return Err(InputError::SelfIntersectingCutter {
                first: other,
                second: id,
            });
        }
        let nodes: Vec<PointId> = coords
            .iter()
            .map(|&c| self.registry.insert_or_find(c))
            .collect();
        for &point in &nodes {
            self.registry.add_owner(point, PointOwner::Side(id));
        }
        self.sides.insert(
            id,
            SideData {
                id,
                shape,
                nodes,
                coords: coords.to_vec(),
                bbox,
            },
        );
        Ok(())
    }

    /// First registered side that a new side at `coords` properly crosses.
    ///
    /// Runs on raw coordinates so a rejected side leaves the registry
    /// untouched.
    fn crossing_side(&self, shape: SideShape, coords: &[Point3], bbox: &Aabb) -> Option<SideId> {
        let kernel = Kernel::default();
        let tol = self.tolerance();
        let known: Vec<PointId> = coords.iter().filter_map(|c| self.registry.find(c)).collect();
        let tris = side_triangles(shape, coords);
        let pierces = |segments: &[(Point3, Point3)], tris: &[[Point3; 3]]| {
            segments.iter().any(|(p0, p1)| {
                tris.iter()
                    .any(|t| kernel.segment_triangle(p0, p1, t) == Sign::Positive)
            })
        };
        let segments = side_segments(shape, coords);
        self.sides
            .values()
            .filter(|other| other.bbox.overlaps(bbox, tol) && !other.nodes.iter().any(|n| known.contains(n)))
            .find(|other| {
                pierces(&segments, &side_triangles(other.shape, &other.coords))
                    || pierces(&side_segments(other.shape, &other.coords), &tris)
            })
            .map(|other| other.id)
    }

    #[must_use]
    pub fn side(&self, id: SideId) -> Option<&SideData> {
        self.sides.get(&id)
    }

    pub fn sides(&self) -> impl Iterator<Item = &SideData> {
        self.sides.values()
    }

    /// All cutter triangles of the registered mesh sides.
    #[must_use]
    pub fn cutter_triangles(&self) -> Vec<CutterTriangle> {
        self.sides.values().flat_map(SideData::triangles).collect()
    }

    // --- Level-set operations ---

    /// Registers nodal level-set values for one element.
    ///
    /// The element may be registered before or after its values.
    ///
    /// # Errors
    ///
    /// Rejects non-finite values, a length that does not match an already
    /// registered element, and a second set of values for the same element.
    pub fn add_level_set_values(&mut self, element: ElementId, values: &[f64]) -> Result<(), InputError> {
        if let Some((node, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(InputError::NonFiniteLevelSet {
                element,
                node,
                value,
            });
        }
        if let Some(data) = self.elements.get(&element) {
            check_level_set_length(element, data.shape.node_count(), values)?;
        }
        if self.level_set.insert_values(element, values.to_vec()) {
            Ok(())
        } else {
            Err(InputError::DuplicateId {
                entity: "level-set values for element",
                id: element.0,
            })
        }
    }

    /// Registers an analytic level-set field, sampled at element nodes for
    /// elements without explicit values.
    pub fn add_level_set_field(&mut self, field: LevelSetFn) {
        self.level_set.set_field(field);
    }

    #[must_use]
    pub fn level_set(&self) -> &LevelSet {
        &self.level_set
    }

    // --- Results ---

    /// Cut result of an element, once computed.
    #[must_use]
    pub fn result(&self, id: ElementId) -> Option<&Arc<ElementResult>> {
        self.results.get(&id)
    }

    pub fn results(&self) -> impl Iterator<Item = (&ElementId, &Arc<ElementResult>)> {
        self.results.iter()
    }

    /// Elements not yet cut and not failed.
    #[must_use]
    pub fn pending_elements(&self) -> Vec<ElementId> {
        self.elements
            .keys()
            .filter(|id| !self.results.contains_key(id) && !self.failed.contains(id))
            .copied()
            .collect()
    }

    #[must_use]
    pub fn is_failed(&self, id: ElementId) -> bool {
        self.failed.contains(&id)
    }

    /// Stores a result. Results are immutable: an existing one is kept.
    pub(crate) fn record_result(&mut self, result: Arc<ElementResult>) {
        self.results.entry(result.element).or_insert(result);
    }

    pub(crate) fn record_failure(&mut self, id: ElementId) {
        self.failed.insert(id);
    }
}

fn check_nodes(
    entity: &'static str,
    id: u64,
    shape: &'static str,
    expected: usize,
    coords: &[Point3],
) -> Result<(), InputError> {
    if coords.len() != expected {
        return Err(InputError::NodeCount {
            entity,
            id,
            shape,
            expected,
            found: coords.len(),
        });
    }
    if coords.iter().any(|c| !c.iter().all(|v| v.is_finite())) {
        return Err(InputError::NonFiniteCoordinate { entity, id });
    }
    Ok(())
}

fn check_level_set_length(element: ElementId, expected: usize, values: &[f64]) -> Result<(), InputError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(InputError::LevelSetLength {
            element,
            expected,
            found: values.len(),
        })
    }
}

fn side_triangles(shape: SideShape, coords: &[Point3]) -> Vec<[Point3; 3]> {
    shape
        .triangles()
        .iter()
        .map(|t| [coords[t[0]], coords[t[1]], coords[t[2]]])
        .collect()
}

/// Boundary and diagonal edges of the side triangles, each once.
fn side_segments(shape: SideShape, coords: &[Point3]) -> Vec<(Point3, Point3)> {
    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for t in shape.triangles() {
        for i in 0..3 {
            let (a, b) = (t[i], t[(i + 1) % 3]);
            pairs.insert((a.min(b), a.max(b)));
        }
    }
    pairs.into_iter().map(|(a, b)| (coords[a], coords[b])).collect()
}
