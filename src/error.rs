use thiserror::Error;

use crate::math::Point3;
use crate::topology::{ElementId, PointId, SideId};

/// Top-level error type for the cut library.
#[derive(Debug, Error)]
pub enum CutError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Quadrature(#[from] QuadratureError),
}

/// Malformed input, rejected at registration before any cut work.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{entity} {id} has a non-finite coordinate")]
    NonFiniteCoordinate { entity: &'static str, id: u64 },

    #[error("{entity} {id}: shape {shape} expects {expected} nodes, got {found}")]
    NodeCount {
        entity: &'static str,
        id: u64,
        shape: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("element {element} has non-positive volume {volume}")]
    NonPositiveVolume { element: ElementId, volume: f64 },

    #[error("cut side {side} is degenerate (zero area)")]
    DegenerateSide { side: SideId },

    #[error("cutter mesh self-intersects: sides {first} and {second} cross")]
    SelfIntersectingCutter { first: SideId, second: SideId },

    #[error("{entity} id {id} is already registered")]
    DuplicateId { entity: &'static str, id: u64 },

    #[error("level-set values for element {element}: expected {expected}, got {found}")]
    LevelSetLength {
        element: ElementId,
        expected: usize,
        found: usize,
    },

    #[error("level-set value {value} at node {node} of element {element} is not finite")]
    NonFiniteLevelSet {
        element: ElementId,
        node: usize,
        value: f64,
    },
}

/// Per-element fatal geometry failures.
///
/// Every variant carries the element id and the offending point ids together
/// with their coordinates, enough to rebuild a literal reproduction case.
#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    #[error(
        "element {element}: facet graph is not a closed 2-manifold ({count} points, {facet_count} facets involved)",
        count = .points.len(),
        facet_count = .facets.len()
    )]
    NonManifold {
        element: ElementId,
        points: Vec<(PointId, Point3)>,
        facets: Vec<usize>,
    },

    #[error("element {element}: cell volumes sum to {cells}, element volume is {expected}")]
    VolumeMismatch {
        element: ElementId,
        cells: f64,
        expected: f64,
        points: Vec<(PointId, Point3)>,
    },

    #[error("element {element}: intersection points on element edges are inconsistent")]
    InconsistentIntersection {
        element: ElementId,
        points: Vec<(PointId, Point3)>,
    },

    #[error("element {element}: position of cell {cell} is undecided after resampling")]
    UndecidedPosition {
        element: ElementId,
        cell: usize,
        samples: Vec<Point3>,
    },

    #[error("element {element}: {reason}")]
    Unresolved { element: ElementId, reason: String },
}

impl GeometryError {
    /// The element this failure belongs to.
    #[must_use]
    pub fn element(&self) -> ElementId {
        match self {
            Self::NonManifold { element, .. }
            | Self::VolumeMismatch { element, .. }
            | Self::InconsistentIntersection { element, .. }
            | Self::UndecidedPosition { element, .. }
            | Self::Unresolved { element, .. } => *element,
        }
    }
}

/// Errors raised while building quadrature rules.
#[derive(Debug, Error)]
pub enum QuadratureError {
    #[error("moment-fitting system is singular (rank {rank} of {basis})")]
    SingularMoments { rank: usize, basis: usize },

    #[error("moment-fitting residual {residual} exceeds tolerance")]
    Residual { residual: f64 },

    #[error("cell has no facets to integrate over")]
    EmptyCell,
}

/// Convenience type alias for results using [`CutError`].
pub type Result<T> = std::result::Result<T, CutError>;
