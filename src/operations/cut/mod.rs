//! Decomposition of background elements into volume cells.
//!
//! Per element the pipeline clips the cutting surfaces against the element,
//! splits every face and cut polygon into planar facets, groups facets into
//! closed cells by walking around their shared edges, classifies each cell
//! as inside or outside, and builds quadrature rules. Elements that fail a
//! robustness check are cut again on sub-tetrahedra in exact arithmetic.

mod arrangement;
mod assemble;
mod cells;
mod classify;
mod engine;
mod escalate;
mod intersect;
mod run;

pub use run::{CutReport, RunCut};

use crate::integration::{IntegrationRule, IntegrationStrategy};
use crate::math::{Point3, Vector3};
use crate::topology::{CutterOrigin, ElementId, PointId, SideId};

/// How far the cutting surfaces reach into an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CutState {
    /// No cutter comes near the element.
    Uncut,
    /// A cutter's bounding box overlaps the element, but nothing cuts it.
    Touched,
    /// At least one cutter splits the element.
    Cut,
}

/// Side of the interface a cell lies on.
///
/// Cutter normals and positive level-set values point to the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Position {
    Inside,
    Outside,
    Undecided,
}

/// Where a cell facet comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetOrigin {
    /// Piece of face `face` of the element.
    ElementFace(usize),
    /// Piece of a cutting surface.
    Cutter(CutterOrigin),
    /// Piece of an internal face of the escalation sub-tetrahedra.
    Internal,
}

/// A planar facet of a volume cell, oriented with its normal pointing out
/// of the cell.
#[derive(Debug, Clone)]
pub struct CellFacet {
    pub origin: FacetOrigin,
    /// Outer loop first, then holes.
    pub loops: Vec<Vec<PointId>>,
    pub coords: Vec<Vec<Point3>>,
}

impl CellFacet {
    #[must_use]
    pub fn on_cut_surface(&self) -> bool {
        matches!(self.origin, FacetOrigin::Cutter(_))
    }
}

/// One closed polyhedral region of a cut element.
#[derive(Debug, Clone)]
pub struct VolumeCell {
    pub position: Position,
    pub volume: f64,
    pub centroid: Point3,
    pub facets: Vec<CellFacet>,
    pub rule: IntegrationRule,
    /// Strategy that produced `rule`; differs from the requested one after a
    /// fallback.
    pub strategy: IntegrationStrategy,
}

/// A piece of a cutting surface inside an element.
#[derive(Debug, Clone)]
pub struct BoundaryFacet {
    pub origin: CutterOrigin,
    /// Outer loop first, then holes; oriented like the cutter.
    pub loops: Vec<Vec<PointId>>,
    pub coords: Vec<Vec<Point3>>,
    /// Unit normal of the cutter, pointing to the outside.
    pub normal: Vector3,
    pub area: f64,
    pub rule: IntegrationRule,
    /// Index of the cell behind the facet (against the normal).
    pub inner_cell: Option<usize>,
    /// Index of the cell in front of the facet (along the normal).
    pub outer_cell: Option<usize>,
}

impl BoundaryFacet {
    #[must_use]
    pub fn side(&self) -> Option<SideId> {
        self.origin.side()
    }
}

/// Decomposition of one element.
#[derive(Debug, Clone)]
pub struct ElementResult {
    pub element: ElementId,
    pub state: CutState,
    /// The element was recut on sub-tetrahedra in exact arithmetic.
    pub escalated: bool,
    /// Predicates that needed exact re-evaluation or a tolerance snap.
    pub predicate_escalations: usize,
    /// Cells in a deterministic order: by position, then centroid.
    pub cells: Vec<VolumeCell>,
    pub boundary_facets: Vec<BoundaryFacet>,
}

impl ElementResult {
    /// Sum of the cell volumes.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.cells.iter().map(|c| c.volume).sum()
    }

    /// Total volume of the cells at `position`.
    #[must_use]
    pub fn volume_at(&self, position: Position) -> f64 {
        self.cells
            .iter()
            .filter(|c| c.position == position)
            .map(|c| c.volume)
            .sum()
    }

    pub fn cells_at(&self, position: Position) -> impl Iterator<Item = &VolumeCell> {
        self.cells.iter().filter(move |c| c.position == position)
    }

    /// Total area of the cut surface inside the element.
    #[must_use]
    pub fn cut_area(&self) -> f64 {
        self.boundary_facets.iter().map(|f| f.area).sum()
    }
}
