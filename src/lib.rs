pub mod config;
pub mod error;
pub mod geometry;
pub mod integration;
pub mod math;
pub mod operations;
pub mod topology;

pub use config::{CutOptions, IntegrationStrategy};
pub use error::{CutError, Result};
pub use operations::{
    BoundaryFacet, CellFacet, CombinedIntersection, CutReport, CutState, ElementResult, FacetOrigin,
    LevelSetIntersection, MeshIntersection, Position, RunCut, VolumeCell,
};
