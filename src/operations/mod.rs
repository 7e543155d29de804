pub mod cut;
pub mod interface;

pub use cut::{
    BoundaryFacet, CellFacet, CutReport, CutState, ElementResult, FacetOrigin, Position, RunCut, VolumeCell,
};
pub use interface::{CombinedIntersection, LevelSetIntersection, MeshIntersection};
