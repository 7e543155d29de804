//! Quadrature rules over volume cells and boundary facets.

pub mod direct_divergence;
pub mod gauss;
pub mod tessellation;

pub use crate::config::IntegrationStrategy;

use crate::math::Point3;
use crate::topology::ElementData;

/// A quadrature point with its physical weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraturePoint {
    /// Coordinates in the element's reference space.
    pub local: Point3,
    /// Global coordinates.
    pub global: Point3,
    /// Weight in physical measure: volumes for cells, areas for facets.
    pub weight: f64,
}

/// A set of quadrature points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationRule {
    points: Vec<QuadraturePoint>,
}

impl IntegrationRule {
    #[must_use]
    pub fn new(points: Vec<QuadraturePoint>) -> Self {
        Self { points }
    }

    /// Attaches local coordinates of `element` to global `(point, weight)`
    /// pairs.
    #[must_use]
    pub fn in_element(element: &ElementData, raw: Vec<(Point3, f64)>, tol: f64) -> Self {
        let fallback = element.shape.local_centroid();
        let points = raw
            .into_iter()
            .map(|(global, weight)| {
                let local = element.local_coordinates(&global, tol).unwrap_or_else(|| {
                    tracing::warn!(element = %element.id, ?global, "local coordinates did not converge");
                    fallback
                });
                QuadraturePoint {
                    local,
                    global,
                    weight,
                }
            })
            .collect();
        Self { points }
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuadraturePoint> {
        self.points.iter()
    }

    #[must_use]
    pub fn points(&self) -> &[QuadraturePoint] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of the weights: the measure of the integration domain.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.points.iter().map(|q| q.weight).sum()
    }

    /// Integrates `f` given in global coordinates.
    pub fn integrate(&self, f: impl Fn(&Point3) -> f64) -> f64 {
        self.points.iter().map(|q| q.weight * f(&q.global)).sum()
    }
}

impl<'a> IntoIterator for &'a IntegrationRule {
    type Item = &'a QuadraturePoint;
    type IntoIter = std::slice::Iter<'a, QuadraturePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Global cell rule for outward-oriented facets.
///
/// Returns the strategy that actually produced the rule: direct divergence
/// degrades to tessellation when moment fitting fails.
#[must_use]
pub fn cell_rule(
    facets: &[Vec<Point3>],
    reference: &Point3,
    strategy: IntegrationStrategy,
    degree: usize,
) -> (Vec<(Point3, f64)>, IntegrationStrategy) {
    match strategy {
        IntegrationStrategy::Tessellation => (
            tessellation::cell_rule(facets, reference, degree),
            IntegrationStrategy::Tessellation,
        ),
        IntegrationStrategy::DirectDivergence => match direct_divergence::cell_rule(facets, degree) {
            Ok(rule) => (rule, IntegrationStrategy::DirectDivergence),
            Err(err) => {
                tracing::warn!(%err, "moment fitting failed, falling back to tessellation");
                (
                    tessellation::cell_rule(facets, reference, degree),
                    IntegrationStrategy::Tessellation,
                )
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    #[test]
    fn rule_integrates_through_global_points() {
        let rule = IntegrationRule::new(vec![
            QuadraturePoint {
                local: p(0.0, 0.0, 0.0),
                global: p(1.0, 0.0, 0.0),
                weight: 0.5,
            },
            QuadraturePoint {
                local: p(0.0, 0.0, 0.0),
                global: p(3.0, 0.0, 0.0),
                weight: 0.5,
            },
        ]);
        assert!((rule.total_weight() - 1.0).abs() < 1e-15);
        assert!((rule.integrate(|x| x.x) - 2.0).abs() < 1e-15);
        assert_eq!((&rule).into_iter().count(), 2);
    }

    #[test]
    fn direct_divergence_falls_back_on_empty_cell() {
        let flat = vec![vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)]];
        let (_, used) = cell_rule(&flat, &p(0.0, 0.0, 1.0), IntegrationStrategy::DirectDivergence, 2);
        assert_eq!(used, IntegrationStrategy::Tessellation);
    }
}
