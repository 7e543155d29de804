//! Front-ends bundling a [`CutStore`] with the options of its runs.
//!
//! Each front-end only exposes the registration calls of its interface
//! kind; all of them cut through [`RunCut`].

use std::sync::Arc;

use crate::config::CutOptions;
use crate::error::Result;
use crate::geometry::{ElementShape, SideShape};
use crate::math::Point3;
use crate::topology::{CutStore, ElementId, LevelSetFn, SideId};

use super::cut::{CutReport, ElementResult, RunCut};

/// State shared by the front-ends.
#[derive(Debug)]
struct Session {
    store: CutStore,
    options: CutOptions,
    report: CutReport,
}

impl Session {
    fn new(options: CutOptions) -> Self {
        Self {
            store: CutStore::new(options.tolerance),
            options,
            report: CutReport::default(),
        }
    }

    fn add_element(&mut self, id: ElementId, shape: ElementShape, coords: &[Point3]) -> Result<()> {
        self.store.add_element(id, shape, coords)?;
        Ok(())
    }

    fn run_cut(&mut self) -> CutReport {
        let report = RunCut::new(self.options.clone()).execute(&mut self.store);
        for (id, result) in &report.results {
            self.report.results.insert(*id, Arc::clone(result));
        }
        for (id, err) in &report.failures {
            self.report.failures.insert(*id, err.clone());
        }
        report
    }

    fn finalize(mut self) -> (CutStore, CutReport) {
        if !self.store.pending_elements().is_empty() {
            self.run_cut();
        }
        (self.store, self.report)
    }
}

macro_rules! session_methods {
    () => {
        /// Creates an empty problem cut with `options`.
        #[must_use]
        pub fn new(options: CutOptions) -> Self {
            Self {
                session: Session::new(options),
            }
        }

        /// Registers a background element.
        ///
        /// # Errors
        ///
        /// Returns [`crate::error::InputError`] for malformed elements.
        pub fn add_element(&mut self, id: ElementId, shape: ElementShape, coords: &[Point3]) -> Result<()> {
            self.session.add_element(id, shape, coords)
        }

        /// Cuts every element registered since the last run.
        pub fn run_cut(&mut self) -> CutReport {
            self.session.run_cut()
        }

        /// Cuts any remaining elements and hands out the store with every
        /// result, plus the report accumulated over all runs.
        #[must_use]
        pub fn finalize(self) -> (CutStore, CutReport) {
            self.session.finalize()
        }

        #[must_use]
        pub fn store(&self) -> &CutStore {
            &self.session.store
        }

        #[must_use]
        pub fn options(&self) -> &CutOptions {
            &self.session.options
        }

        /// Result of an element cut by an earlier run.
        #[must_use]
        pub fn result(&self, id: ElementId) -> Option<&Arc<ElementResult>> {
            self.session.store.result(id)
        }
    };
}

/// Cuts a background mesh with an explicit surface mesh of tri3/quad4 sides.
#[derive(Debug)]
pub struct MeshIntersection {
    session: Session,
}

impl MeshIntersection {
    session_methods!();

    /// Registers a side of the cutting surface; its normal points to the
    /// outside.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InputError`] for malformed or
    /// self-intersecting sides.
    pub fn add_cut_side(&mut self, id: SideId, shape: SideShape, coords: &[Point3]) -> Result<()> {
        self.session.store.add_cut_side(id, shape, coords)?;
        Ok(())
    }
}

/// Cuts a background mesh with the zero iso-surface of a level set; negative
/// values are inside.
#[derive(Debug)]
pub struct LevelSetIntersection {
    session: Session,
}

impl LevelSetIntersection {
    session_methods!();

    /// Registers nodal level-set values of one element.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InputError`] for non-finite values, a wrong
    /// count or values given twice.
    pub fn add_level_set_values(&mut self, element: ElementId, values: &[f64]) -> Result<()> {
        self.session.store.add_level_set_values(element, values)?;
        Ok(())
    }

    /// Samples `field` at the nodes of elements without explicit values.
    pub fn add_level_set_field(&mut self, field: impl Fn(&Point3) -> f64 + Send + Sync + 'static) {
        let field: LevelSetFn = Arc::new(field);
        self.session.store.add_level_set_field(field);
    }
}

/// Cuts a background mesh with both a surface mesh and a level set. A cell
/// is inside if either interface puts it inside.
#[derive(Debug)]
pub struct CombinedIntersection {
    session: Session,
}

impl CombinedIntersection {
    session_methods!();

    /// See [`MeshIntersection::add_cut_side`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InputError`] for malformed or
    /// self-intersecting sides.
    pub fn add_cut_side(&mut self, id: SideId, shape: SideShape, coords: &[Point3]) -> Result<()> {
        self.session.store.add_cut_side(id, shape, coords)?;
        Ok(())
    }

    /// See [`LevelSetIntersection::add_level_set_values`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InputError`] for non-finite values, a wrong
    /// count or values given twice.
    pub fn add_level_set_values(&mut self, element: ElementId, values: &[f64]) -> Result<()> {
        self.session.store.add_level_set_values(element, values)?;
        Ok(())
    }

    /// See [`LevelSetIntersection::add_level_set_field`].
    pub fn add_level_set_field(&mut self, field: impl Fn(&Point3) -> f64 + Send + Sync + 'static) {
        let field: LevelSetFn = Arc::new(field);
        self.session.store.add_level_set_field(field);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::operations::cut::Position;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn unit_cube() -> Vec<Point3> {
        vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
            p(0.0, 0.0, 1.0),
            p(1.0, 0.0, 1.0),
            p(1.0, 1.0, 1.0),
            p(0.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn mesh_front_end_cuts_and_finalizes() {
        let mut mesh = MeshIntersection::new(CutOptions::default().with_parallel(false));
        mesh.add_element(ElementId(1), ElementShape::Hex8, &unit_cube()).unwrap();
        mesh.add_cut_side(
            SideId(1),
            SideShape::Quad4,
            &[p(-1.0, -1.0, 0.5), p(2.0, -1.0, 0.5), p(2.0, 2.0, 0.5), p(-1.0, 2.0, 0.5)],
        )
        .unwrap();
        let report = mesh.run_cut();
        assert!(report.is_success());
        let result = mesh.result(ElementId(1)).unwrap();
        assert_relative_eq!(result.volume_at(Position::Inside), 0.5, epsilon = 1e-12);

        mesh.add_element(
            ElementId(2),
            ElementShape::Tet4,
            &[p(5.0, 0.0, 0.0), p(6.0, 0.0, 0.0), p(5.0, 1.0, 0.0), p(5.0, 0.0, 1.0)],
        )
        .unwrap();
        let (store, report) = mesh.finalize();
        assert_eq!(report.results.len(), 2);
        assert!(store.result(ElementId(2)).is_some());
    }

    #[test]
    fn level_set_field_cuts_without_values() {
        let mut level_set = LevelSetIntersection::new(CutOptions::default());
        level_set.add_element(ElementId(1), ElementShape::Hex8, &unit_cube()).unwrap();
        level_set.add_level_set_field(|x| x.x - 0.25);
        let report = level_set.run_cut();
        let result = report.result(ElementId(1)).unwrap();
        assert_relative_eq!(result.volume_at(Position::Inside), 0.25, epsilon = 1e-12);
        assert_relative_eq!(result.volume_at(Position::Outside), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn input_errors_surface_as_cut_errors() {
        let mut level_set = LevelSetIntersection::new(CutOptions::default());
        let err = level_set.add_level_set_values(ElementId(1), &[f64::NAN]).unwrap_err();
        assert!(matches!(err, crate::error::CutError::Input(_)));
    }
}
