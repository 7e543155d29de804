//! Options controlling a cut run.
//!
//! ```
//! use cutcell::{CutOptions, IntegrationStrategy};
//!
//! let options = CutOptions::default()
//!     .with_strategy(IntegrationStrategy::DirectDivergence)
//!     .with_quadrature_degree(4);
//! assert!(options.escalation_enabled);
//! ```

use crate::math::TOLERANCE;

/// How volume-cell quadrature rules are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationStrategy {
    /// Split each cell into tetrahedra and map a reference rule onto each.
    #[default]
    Tessellation,
    /// Divergence-theorem points on the cell facets, reduced by moment
    /// fitting. Falls back to tessellation if the fit is ill-conditioned.
    DirectDivergence,
}

/// Configuration of a cut run.
#[derive(Debug, Clone, PartialEq)]
pub struct CutOptions {
    /// Distance below which two points are the same point, and below which
    /// a point counts as lying on a plane.
    pub tolerance: f64,

    /// Retry failed elements on sub-tetrahedra in exact arithmetic.
    pub escalation_enabled: bool,

    /// Quadrature construction for volume cells.
    pub strategy: IntegrationStrategy,

    /// Polynomial degree integrated exactly by cell and facet rules.
    pub quadrature_degree: usize,

    /// Evaluate every predicate in exact arithmetic from the start.
    pub force_full_precision: bool,

    /// Number of undecided floating-point predicates in one element after
    /// which the element is escalated.
    pub max_predicate_escalations: usize,

    /// Cut elements concurrently (via rayon).
    pub parallel: bool,
}

impl Default for CutOptions {
    fn default() -> Self {
        Self {
            tolerance: TOLERANCE,
            escalation_enabled: true,
            strategy: IntegrationStrategy::default(),
            quadrature_degree: 2,
            force_full_precision: false,
            max_predicate_escalations: 256,
            parallel: true,
        }
    }
}

impl CutOptions {
    /// Exact arithmetic on a single thread; runs are bit-for-bit
    /// reproducible.
    #[must_use]
    pub fn reproducible() -> Self {
        Self {
            force_full_precision: true,
            parallel: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_escalation(mut self, enabled: bool) -> Self {
        self.escalation_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: IntegrationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_quadrature_degree(mut self, degree: usize) -> Self {
        self.quadrature_degree = degree;
        self
    }

    #[must_use]
    pub fn with_full_precision(mut self, enabled: bool) -> Self {
        self.force_full_precision = enabled;
        self
    }

    #[must_use]
    pub fn with_max_predicate_escalations(mut self, count: usize) -> Self {
        self.max_predicate_escalations = count;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
