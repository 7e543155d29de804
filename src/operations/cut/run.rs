use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::CutOptions;
use crate::error::GeometryError;
use crate::topology::level_set::{is_cut, iso_polygons};
use crate::topology::{CutStore, CutterOrigin, ElementId};

use super::classify::{Interfaces, MeshSurface};
use super::engine::cut_element;
use super::intersect::Cutter;
use super::ElementResult;

/// Cuts every pending element of a store.
///
/// Elements are independent: each one is cut from the registered sides and
/// level-set data alone, sharing only the point registry. A failing element
/// is recorded in the report and does not stop the others.
pub struct RunCut {
    options: CutOptions,
}

impl RunCut {
    /// Creates a new `RunCut` operation.
    #[must_use]
    pub fn new(options: CutOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &CutOptions {
        &self.options
    }

    /// Executes the cut, storing results and failures in the store.
    ///
    /// Elements cut or failed by an earlier run are skipped.
    pub fn execute(&self, store: &mut CutStore) -> CutReport {
        let pending = store.pending_elements();
        let surface = MeshSurface::new(store.cutter_triangles());
        tracing::info!(
            elements = pending.len(),
            sides = store.sides().count(),
            parallel = self.options.parallel,
            "cutting elements"
        );

        let shared: &CutStore = store;
        let cut = |id: &ElementId| (*id, self.cut_one(shared, *id, surface.as_ref()));
        let outcomes: Vec<(ElementId, Result<ElementResult, GeometryError>)> = if self.options.parallel {
            pending.par_iter().map(cut).collect()
        } else {
            pending.iter().map(cut).collect()
        };

        let mut report = CutReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    tracing::debug!(
                        element = %id,
                        state = ?result.state,
                        cells = result.cells.len(),
                        escalated = result.escalated,
                        "element cut"
                    );
                    let result = Arc::new(result);
                    store.record_result(Arc::clone(&result));
                    report.results.insert(id, result);
                }
                Err(err) => {
                    tracing::warn!(element = %id, %err, "element failed");
                    store.record_failure(id);
                    report.failures.insert(id, err);
                }
            }
        }
        tracing::info!(
            cut = report.cut_count(),
            uncut = report.uncut_count(),
            escalated = report.escalated_count(),
            failed = report.failed_count(),
            "cut finished"
        );
        report
    }

    fn cut_one(
        &self,
        store: &CutStore,
        id: ElementId,
        surface: Option<&MeshSurface>,
    ) -> Result<ElementResult, GeometryError> {
        let Some(element) = store.element(id) else {
            return Err(GeometryError::Unresolved {
                element: id,
                reason: "element is not registered".into(),
            });
        };
        let tol = self.options.tolerance;

        let mut cutters: Vec<Cutter> = surface
            .map(|s| {
                s.triangles
                    .iter()
                    .filter(|t| t.bbox.overlaps(&element.bbox, tol))
                    .map(Cutter::from_triangle)
                    .collect()
            })
            .unwrap_or_default();

        let values = store.level_set().node_values(element);
        if let Some(values) = values.as_deref().filter(|v| is_cut(v)) {
            cutters.extend(
                iso_polygons(element, values)
                    .into_iter()
                    .filter_map(|polygon| Cutter::from_polygon(CutterOrigin::LevelSet, polygon)),
            );
        }

        let interfaces = Interfaces {
            mesh: surface,
            level_set: values.as_deref(),
        };
        cut_element(element, store.registry(), &cutters, interfaces, &self.options)
    }
}

/// Outcome of one [`RunCut`] execution.
#[derive(Debug, Default)]
pub struct CutReport {
    pub results: BTreeMap<ElementId, Arc<ElementResult>>,
    pub failures: BTreeMap<ElementId, GeometryError>,
}

impl CutReport {
    /// True if no element failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn result(&self, id: ElementId) -> Option<&Arc<ElementResult>> {
        self.results.get(&id)
    }

    #[must_use]
    pub fn failure(&self, id: ElementId) -> Option<&GeometryError> {
        self.failures.get(&id)
    }

    /// Elements split into more than one piece by a cutter.
    #[must_use]
    pub fn cut_count(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.state == super::CutState::Cut)
            .count()
    }

    /// Elements no cutter reaches.
    #[must_use]
    pub fn uncut_count(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.state == super::CutState::Uncut)
            .count()
    }

    #[must_use]
    pub fn escalated_count(&self) -> usize {
        self.results.values().filter(|r| r.escalated).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}
