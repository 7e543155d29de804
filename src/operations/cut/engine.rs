use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::CutOptions;
use crate::error::GeometryError;
use crate::math::polygon_3d::{newell_normal, vertex_centroid};
use crate::math::{Kernel, Point3, Precision, Sign, Vector3};
use crate::topology::{ElementData, ElementId, PointId, PointRegistry};

use super::arrangement::split_polygon;
use super::assemble::assemble;
use super::cells::{build_cells, CellSide, Facet, FacetKind, RawCell};
use super::classify::{classify, Interfaces};
use super::escalate::escalate;
use super::intersect::{intersect, plane_triangle, Cutter, Intersection};
use super::{CutState, ElementResult, Position};

/// Element-local state shared by the pipeline stages.
pub(crate) struct CutContext<'a> {
    pub element: ElementId,
    pub registry: &'a PointRegistry,
    pub kernel: Kernel,
    pub tol: f64,
    known: RefCell<BTreeMap<PointId, Point3>>,
}

impl<'a> CutContext<'a> {
    pub fn new(element: ElementId, registry: &'a PointRegistry, precision: Precision, tol: f64) -> Self {
        Self {
            element,
            registry,
            kernel: Kernel::new(precision),
            tol,
            known: RefCell::new(BTreeMap::new()),
        }
    }

    /// Registers a coordinate and returns its canonical point.
    pub fn vertex(&self, coord: Point3) -> PointId {
        let (id, canonical) = self.registry.register(coord);
        self.known.borrow_mut().insert(id, canonical);
        id
    }

    /// Canonical coordinate of a point seen by this element.
    pub fn at(&self, id: PointId) -> Point3 {
        if let Some(x) = self.known.borrow().get(&id) {
            return *x;
        }
        let x = self.registry.coord(id).unwrap_or_else(Point3::origin);
        self.known.borrow_mut().insert(id, x);
        x
    }

    pub fn coords(&self, ids: &[PointId]) -> Vec<Point3> {
        ids.iter().map(|&id| self.at(id)).collect()
    }

    /// Offending points with coordinates, for error reports.
    pub fn describe(&self, ids: impl IntoIterator<Item = PointId>) -> Vec<(PointId, Point3)> {
        ids.into_iter().map(|id| (id, self.at(id))).collect()
    }
}

/// Result of a pipeline stage.
pub(crate) enum StageOutcome<T> {
    Ok(T),
    /// The element must be recut on sub-tetrahedra.
    NeedsEscalation(EscalationReason),
    Fatal(GeometryError),
}

/// Why an element needs the exact sub-tetrahedra path.
#[derive(Debug)]
pub(crate) enum EscalationReason {
    NonConvex,
    PredicateBudget(usize),
    NonManifold {
        points: Vec<(PointId, Point3)>,
        facets: Vec<usize>,
    },
    VolumeMismatch {
        cells: f64,
        expected: f64,
        points: Vec<(PointId, Point3)>,
    },
    Inconsistent {
        points: Vec<(PointId, Point3)>,
    },
}

impl EscalationReason {
    /// The error reported when escalation is disabled or itself fails.
    pub fn into_error(self, element: ElementId) -> GeometryError {
        match self {
            Self::NonConvex => GeometryError::Unresolved {
                element,
                reason: "element faces are not planar and convex".into(),
            },
            Self::PredicateBudget(count) => GeometryError::Unresolved {
                element,
                reason: format!("{count} predicates needed exact re-evaluation"),
            },
            Self::NonManifold { points, facets } => GeometryError::NonManifold {
                element,
                points,
                facets,
            },
            Self::VolumeMismatch {
                cells,
                expected,
                points,
            } => GeometryError::VolumeMismatch {
                element,
                cells,
                expected,
                points,
            },
            Self::Inconsistent { points } => GeometryError::InconsistentIntersection { element, points },
        }
    }
}

/// What a domain face is part of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaceKind {
    /// Lies on face `i` of the element.
    Element(usize),
    /// Inside the element, between two sub-tetrahedra.
    Internal,
}

/// A planar face of a convex cutting domain.
#[derive(Debug, Clone)]
pub(crate) struct DomainFace {
    /// Outward counter-clockwise loop.
    pub nodes: Vec<PointId>,
    /// Three nodes spanning the face plane, ordered like the loop.
    pub plane: [Point3; 3],
    pub normal: Vector3,
    pub kind: FaceKind,
}

/// A convex polyhedron cut as one unit: the element itself, or one of its
/// sub-tetrahedra.
#[derive(Debug, Clone)]
pub(crate) struct Domain {
    pub nodes: Vec<PointId>,
    pub faces: Vec<DomainFace>,
    pub volume: f64,
    pub centroid: Point3,
    pub size: f64,
}

impl Domain {
    pub fn from_element(ctx: &CutContext<'_>, element: &ElementData) -> Self {
        let nodes: Vec<PointId> = element.coords.iter().map(|&c| ctx.vertex(c)).collect();
        let faces = element
            .shape
            .faces()
            .iter()
            .enumerate()
            .filter_map(|(i, local)| {
                let loop_ids: Vec<PointId> = local.iter().map(|&n| nodes[n]).collect();
                face(ctx, loop_ids, FaceKind::Element(i))
            })
            .collect();
        Self {
            nodes,
            faces,
            volume: element.volume,
            centroid: element.centroid(),
            size: element.size(),
        }
    }

    /// Sub-tetrahedron domain; faces made of element face nodes keep their
    /// element face.
    pub fn from_tet(ctx: &CutContext<'_>, tet: &[Point3; 4], element: &ElementData) -> Self {
        const TET_FACES: [[usize; 3]; 4] = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
        let nodes: Vec<PointId> = tet.iter().map(|&c| ctx.vertex(c)).collect();
        let element_nodes: Vec<PointId> = element.coords.iter().map(|&c| ctx.vertex(c)).collect();
        let faces = TET_FACES
            .iter()
            .filter_map(|f| {
                let loop_ids: Vec<PointId> = f.iter().map(|&n| nodes[n]).collect();
                let kind = element
                    .shape
                    .faces()
                    .iter()
                    .position(|local| {
                        loop_ids
                            .iter()
                            .all(|id| local.iter().any(|&n| element_nodes[n] == *id))
                    })
                    .map_or(FaceKind::Internal, FaceKind::Element);
                face(ctx, loop_ids, kind)
            })
            .collect();
        let volume = crate::geometry::tet_volume(&tet[0], &tet[1], &tet[2], &tet[3]);
        Self {
            nodes,
            faces,
            volume,
            centroid: vertex_centroid(tet),
            size: crate::geometry::Aabb::from_points(tet).diagonal(),
        }
    }
}

fn face(ctx: &CutContext<'_>, nodes: Vec<PointId>, kind: FaceKind) -> Option<DomainFace> {
    let coords = ctx.coords(&nodes);
    let normal = newell_normal(&coords).try_normalize(f64::MIN_POSITIVE)?;
    let plane = plane_triangle(&coords)?;
    Some(DomainFace {
        nodes,
        plane,
        normal,
        kind,
    })
}

/// Facets and cells of one domain.
#[derive(Debug, Clone)]
pub(crate) struct DomainCut {
    pub state: CutState,
    pub facets: Vec<Facet>,
    pub cells: Vec<RawCell>,
}

/// Cuts one convex domain: intersection, facet arrangement, cell building.
pub(crate) fn cut_domain(
    ctx: &CutContext<'_>,
    domain: &Domain,
    cutters: &[Cutter],
    max_escalations: usize,
) -> StageOutcome<DomainCut> {
    let intersection = match intersect(ctx, domain, cutters) {
        StageOutcome::Ok(i) => i,
        StageOutcome::NeedsEscalation(r) => return StageOutcome::NeedsEscalation(r),
        StageOutcome::Fatal(e) => return StageOutcome::Fatal(e),
    };

    let mut candidates: BTreeSet<PointId> = domain.nodes.iter().copied().collect();
    for polygon in &intersection.polygons {
        candidates.extend(polygon.points.iter().copied());
        candidates.extend(polygon.segments.iter().flatten().copied());
    }

    // Arrangements can create crossing points other facets must see, so a
    // second pass runs with them as candidates.
    let mut facets = Vec::new();
    let mut face_points: Vec<BTreeSet<PointId>> = Vec::new();
    for _ in 0..2 {
        let before = candidates.len();
        let list: Vec<PointId> = candidates.iter().copied().collect();
        facets.clear();
        face_points.clear();

        for face in &domain.faces {
            let segments = intersection.segments_on(ctx, face);
            let split = split_polygon(ctx, &face.nodes, &segments, &face.normal, &list);
            candidates.extend(split.created);
            face_points.push(split.faces.iter().flatten().flatten().copied().collect());
            let kind = match face.kind {
                FaceKind::Element(i) => FacetKind::Boundary { face: i },
                FaceKind::Internal => FacetKind::Internal,
            };
            facets.extend(split.faces.into_iter().map(|loops| Facet {
                loops,
                normal: face.normal,
                kind,
            }));
        }
        for polygon in &intersection.polygons {
            let split = split_polygon(ctx, &polygon.points, &polygon.segments, &polygon.normal, &list);
            candidates.extend(split.created);
            facets.extend(split.faces.into_iter().map(|loops| Facet {
                loops,
                normal: polygon.normal,
                kind: FacetKind::Cut(polygon.origin),
            }));
        }
        if candidates.len() == before {
            break;
        }
    }
    let missing = missing_edge_points(ctx, domain, &intersection, &face_points);
    if !missing.is_empty() {
        return StageOutcome::NeedsEscalation(EscalationReason::Inconsistent {
            points: ctx.describe(missing),
        });
    }
    let facets = dedupe_facets(facets);

    let cells = match build_cells(ctx, domain, &facets) {
        StageOutcome::Ok(c) => c,
        StageOutcome::NeedsEscalation(r) => return StageOutcome::NeedsEscalation(r),
        StageOutcome::Fatal(e) => return StageOutcome::Fatal(e),
    };
    let escalations = ctx.kernel.escalations();
    if escalations > max_escalations {
        return StageOutcome::NeedsEscalation(EscalationReason::PredicateBudget(escalations));
    }
    StageOutcome::Ok(DomainCut {
        state: intersection.state,
        facets,
        cells,
    })
}

/// Cut points on a domain edge that are not a vertex of the pieces of every
/// face meeting there.
fn missing_edge_points(
    ctx: &CutContext<'_>,
    domain: &Domain,
    intersection: &Intersection,
    face_points: &[BTreeSet<PointId>],
) -> BTreeSet<PointId> {
    let mut missing = BTreeSet::new();
    for &id in intersection.polygons.iter().flat_map(|p| p.points.iter()) {
        let x = ctx.at(id);
        let on: Vec<usize> = (0..domain.faces.len())
            .filter(|&f| {
                let face = &domain.faces[f];
                ctx.kernel.plane_side(&face.plane, &face.normal, &x, ctx.tol) == Sign::Degenerate
            })
            .collect();
        if on.len() >= 2 && on.iter().any(|&f| !face_points[f].contains(&id)) {
            missing.insert(id);
        }
    }
    missing
}

/// Drops facets covering the same points as an earlier one.
///
/// Element-face pieces win over cut pieces; cut pieces win over internal
/// sub-tetrahedron faces.
fn dedupe_facets(facets: Vec<Facet>) -> Vec<Facet> {
    let rank = |f: &Facet| match f.kind {
        FacetKind::Boundary { .. } => 0,
        FacetKind::Cut(_) => 1,
        FacetKind::Internal => 2,
    };
    let mut order: Vec<usize> = (0..facets.len()).collect();
    order.sort_by_key(|&i| (rank(&facets[i]), i));
    let mut seen: BTreeSet<Vec<PointId>> = BTreeSet::new();
    let mut keep = vec![false; facets.len()];
    for i in order {
        if seen.insert(facets[i].point_set()) {
            keep[i] = true;
        }
    }
    facets
        .into_iter()
        .zip(keep)
        .filter_map(|(f, k)| k.then_some(f))
        .collect()
}

/// A classified cell of the element, before quadrature.
#[derive(Debug, Clone)]
pub(crate) struct DecomposedCell {
    pub sides: Vec<CellSide>,
    pub volume: f64,
    pub position: Position,
}

/// Facets and classified cells of a whole element.
#[derive(Debug, Clone)]
pub(crate) struct Decomposition {
    pub state: CutState,
    pub facets: Vec<Facet>,
    pub cells: Vec<DecomposedCell>,
    pub escalated: bool,
}

impl Default for Decomposition {
    fn default() -> Self {
        Self {
            state: CutState::Uncut,
            facets: Vec::new(),
            cells: Vec::new(),
            escalated: false,
        }
    }
}

/// Decomposes one element into classified cells.
///
/// Elements failing a robustness check on the fast path are recut on
/// sub-tetrahedra when escalation is enabled.
///
/// # Errors
///
/// Returns the [`GeometryError`] that stopped the element.
pub(crate) fn cut_element(
    element: &ElementData,
    registry: &PointRegistry,
    cutters: &[Cutter],
    interfaces: Interfaces<'_>,
    options: &CutOptions,
) -> Result<ElementResult, GeometryError> {
    let precision = if options.force_full_precision {
        Precision::Exact
    } else {
        Precision::Adaptive
    };
    let ctx = CutContext::new(element.id, registry, precision, options.tolerance);
    let domain = Domain::from_element(&ctx, element);

    let decomposition = if cutters.is_empty() {
        whole_element(&ctx, element, &domain, interfaces)?
    } else if element.is_convex(options.tolerance) {
        match fast_path(&ctx, element, &domain, cutters, interfaces, options) {
            StageOutcome::Ok(d) => d,
            StageOutcome::NeedsEscalation(reason) => recut(element, registry, cutters, interfaces, options, reason)?,
            StageOutcome::Fatal(err) => return Err(err),
        }
    } else {
        recut(element, registry, cutters, interfaces, options, EscalationReason::NonConvex)?
    };

    Ok(assemble(&ctx, element, decomposition, options))
}

fn fast_path(
    ctx: &CutContext<'_>,
    element: &ElementData,
    domain: &Domain,
    cutters: &[Cutter],
    interfaces: Interfaces<'_>,
    options: &CutOptions,
) -> StageOutcome<Decomposition> {
    let cut = match cut_domain(ctx, domain, cutters, options.max_predicate_escalations) {
        StageOutcome::Ok(cut) => cut,
        StageOutcome::NeedsEscalation(r) => return StageOutcome::NeedsEscalation(r),
        StageOutcome::Fatal(e) => return StageOutcome::Fatal(e),
    };
    let positions = match classify(ctx, element, &cut.facets, &cut.cells, interfaces) {
        StageOutcome::Ok(p) => p,
        StageOutcome::NeedsEscalation(r) => return StageOutcome::NeedsEscalation(r),
        StageOutcome::Fatal(e) => return StageOutcome::Fatal(e),
    };
    StageOutcome::Ok(Decomposition {
        state: cut.state,
        facets: cut.facets,
        cells: cut
            .cells
            .into_iter()
            .zip(positions)
            .map(|(cell, position)| DecomposedCell {
                sides: cell.sides,
                volume: cell.volume,
                position,
            })
            .collect(),
        escalated: false,
    })
}

fn recut(
    element: &ElementData,
    registry: &PointRegistry,
    cutters: &[Cutter],
    interfaces: Interfaces<'_>,
    options: &CutOptions,
    reason: EscalationReason,
) -> Result<Decomposition, GeometryError> {
    if !options.escalation_enabled {
        return Err(reason.into_error(element.id));
    }
    tracing::warn!(element = %element.id, ?reason, "recutting element on sub-tetrahedra");
    let exact = CutContext::new(element.id, registry, Precision::Exact, options.tolerance);
    let mut decomposition = escalate(&exact, element, cutters, interfaces)?;
    decomposition.escalated = true;
    Ok(decomposition)
}

/// The element as a single cell, for elements no cutter comes near.
fn whole_element(
    ctx: &CutContext<'_>,
    element: &ElementData,
    domain: &Domain,
    interfaces: Interfaces<'_>,
) -> Result<Decomposition, GeometryError> {
    let facets: Vec<Facet> = domain
        .faces
        .iter()
        .map(|face| Facet {
            loops: vec![face.nodes.clone()],
            normal: face.normal,
            kind: match face.kind {
                FaceKind::Element(i) => FacetKind::Boundary { face: i },
                FaceKind::Internal => FacetKind::Internal,
            },
        })
        .collect();
    let cell = RawCell {
        sides: (0..facets.len())
            .map(|facet| CellSide {
                facet,
                positive: false,
            })
            .collect(),
        volume: element.volume,
    };
    let position = match classify(ctx, element, &facets, std::slice::from_ref(&cell), interfaces) {
        StageOutcome::Ok(p) => p.first().copied().unwrap_or(Position::Outside),
        StageOutcome::NeedsEscalation(reason) => return Err(reason.into_error(element.id)),
        StageOutcome::Fatal(err) => return Err(err),
    };
    Ok(Decomposition {
        state: CutState::Uncut,
        facets,
        cells: vec![DecomposedCell {
            sides: cell.sides,
            volume: cell.volume,
            position,
        }],
        escalated: false,
    })
}
