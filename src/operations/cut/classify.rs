use crate::error::GeometryError;
use crate::geometry::Aabb;
use crate::math::polygon_3d::area_centroid;
use crate::math::{Point3, Sign, Vector3};
use crate::topology::level_set::interpolate;
use crate::topology::{CutterOrigin, CutterTriangle, ElementData};

use super::cells::{Facet, FacetKind, RawCell};
use super::engine::{CutContext, StageOutcome};
use super::Position;

/// Skew ray directions; none is parallel to a coordinate plane.
const RAY_DIRECTIONS: [[f64; 3]; 3] = [
    [0.913_812_2, 0.286_629_6, 0.287_837_5],
    [-0.253_962_8, 0.902_701_4, 0.347_266_9],
    [0.343_181_9, -0.114_389_8, 0.932_275_6],
];

/// Offsets of level-set samples from their facet, relative to the element
/// size.
const SAMPLE_OFFSETS: [f64; 4] = [1e-3, 2e-3, 4e-3, 8e-3];

/// The whole cutting mesh, for ray casting.
#[derive(Debug, Clone)]
pub(crate) struct MeshSurface {
    pub triangles: Vec<CutterTriangle>,
    pub bbox: Aabb,
}

impl MeshSurface {
    pub fn new(triangles: Vec<CutterTriangle>) -> Option<Self> {
        if triangles.is_empty() {
            return None;
        }
        let bbox = Aabb::from_points(triangles.iter().flat_map(|t| t.coords.iter()));
        Some(Self { triangles, bbox })
    }
}

/// Interfaces present for one element.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Interfaces<'a> {
    pub mesh: Option<&'a MeshSurface>,
    pub level_set: Option<&'a [f64]>,
}

/// Positions of the cells of one domain.
pub(crate) fn classify(
    ctx: &CutContext<'_>,
    element: &ElementData,
    facets: &[Facet],
    cells: &[RawCell],
    interfaces: Interfaces<'_>,
) -> StageOutcome<Vec<Position>> {
    let mut positions = Vec::with_capacity(cells.len());
    for (index, cell) in cells.iter().enumerate() {
        let mesh = interfaces
            .mesh
            .map(|surface| mesh_position(ctx, element, facets, cell, surface));
        let level_set = interfaces
            .level_set
            .map(|values| level_set_position(ctx, element, facets, cell, values));
        let position = combine(mesh, level_set);
        if position == Position::Undecided {
            return StageOutcome::Fatal(GeometryError::UndecidedPosition {
                element: element.id,
                cell: index,
                samples: samples(ctx, facets, cell, SAMPLE_OFFSETS[0] * element.size()),
            });
        }
        positions.push(position);
    }
    StageOutcome::Ok(positions)
}

/// Inside wins; otherwise every present interface must agree on outside.
fn combine(mesh: Option<Position>, level_set: Option<Position>) -> Position {
    let present: Vec<Position> = mesh.into_iter().chain(level_set).collect();
    if present.contains(&Position::Inside) {
        Position::Inside
    } else if present.iter().all(|p| *p == Position::Outside) {
        Position::Outside
    } else {
        Position::Undecided
    }
}

/// Position from the cut facets bounding the cell on one side only.
fn votes(facets: &[Facet], cell: &RawCell, wanted: impl Fn(CutterOrigin) -> bool) -> Option<Position> {
    let mut decided = None;
    for side in &cell.sides {
        let FacetKind::Cut(origin) = facets[side.facet].kind else {
            continue;
        };
        if !wanted(origin) {
            continue;
        }
        let both = cell
            .sides
            .iter()
            .any(|s| s.facet == side.facet && s.positive != side.positive);
        if both {
            continue;
        }
        let vote = if side.positive {
            Position::Outside
        } else {
            Position::Inside
        };
        match decided {
            None => decided = Some(vote),
            Some(p) if p != vote => return Some(Position::Undecided),
            Some(_) => {}
        }
    }
    decided
}

fn mesh_position(
    ctx: &CutContext<'_>,
    element: &ElementData,
    facets: &[Facet],
    cell: &RawCell,
    surface: &MeshSurface,
) -> Position {
    match votes(facets, cell, |o| o.side().is_some()) {
        Some(Position::Undecided) | None => {}
        Some(decided) => return decided,
    }
    let delta = SAMPLE_OFFSETS[0] * element.size();
    for sample in samples(ctx, facets, cell, delta) {
        if let Some(position) = ray_position(ctx, &sample, surface) {
            return position;
        }
    }
    Position::Undecided
}

/// Casts rays from `origin` and reports the side of the first surface hit.
///
/// `None` if every ray first grazes an edge or runs along a triangle.
fn ray_position(ctx: &CutContext<'_>, origin: &Point3, surface: &MeshSurface) -> Option<Position> {
    let reach = 2.0 * (surface.bbox.diagonal() + (origin - surface.bbox.min).norm()) + 1.0;
    for d in RAY_DIRECTIONS {
        let direction = Vector3::new(d[0], d[1], d[2]);
        let far = origin + direction * reach;
        let ray_box = Aabb::from_points(&[*origin, far]);
        let mut nearest: Option<(f64, Sign, f64)> = None;
        for triangle in &surface.triangles {
            if !triangle.bbox.overlaps(&ray_box, ctx.tol) {
                continue;
            }
            let hit = ctx.kernel.segment_triangle(origin, &far, &triangle.coords);
            if hit == Sign::Negative {
                continue;
            }
            let facing = direction.dot(&triangle.normal);
            let distance = if facing == 0.0 {
                0.0
            } else {
                (triangle.coords[0] - origin).dot(&triangle.normal) / facing
            };
            if nearest.is_none_or(|(best, _, _)| distance < best) {
                nearest = Some((distance, hit, facing));
            }
        }
        match nearest {
            None => return Some(Position::Outside),
            Some((_, Sign::Positive, facing)) if facing > 0.0 => return Some(Position::Inside),
            Some((_, Sign::Positive, facing)) if facing < 0.0 => return Some(Position::Outside),
            Some(_) => {}
        }
    }
    None
}

fn level_set_position(
    ctx: &CutContext<'_>,
    element: &ElementData,
    facets: &[Facet],
    cell: &RawCell,
    values: &[f64],
) -> Position {
    match votes(facets, cell, |o| o == CutterOrigin::LevelSet) {
        Some(Position::Undecided) | None => {}
        Some(decided) => return decided,
    }
    // Samples on the zero set are retried further away from the facets.
    let threshold = 1e-14 * values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    for offset in SAMPLE_OFFSETS {
        for x in samples(ctx, facets, cell, offset * element.size()) {
            let phi = interpolate(element, values, &x);
            if phi.abs() > threshold {
                return if phi < 0.0 {
                    Position::Inside
                } else {
                    Position::Outside
                };
            }
        }
    }
    Position::Undecided
}

/// Points just inside the cell, one per facet side, element and internal
/// facets first.
fn samples(ctx: &CutContext<'_>, facets: &[Facet], cell: &RawCell, delta: f64) -> Vec<Point3> {
    let mut sides = cell.sides.clone();
    sides.sort_by_key(|s| matches!(facets[s.facet].kind, FacetKind::Cut(_)));
    sides
        .iter()
        .filter_map(|side| {
            let facet = &facets[side.facet];
            let outer = ctx.coords(facet.loops.first()?);
            let inward = if side.positive {
                facet.normal
            } else {
                -facet.normal
            };
            Some(area_centroid(&outer) + inward * delta)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Precision;
    use crate::topology::{ElementId, PointRegistry, SideId};

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    /// Closed axis-aligned box surface with outward normals.
    fn box_surface(registry: &PointRegistry, lo: f64, hi: f64) -> MeshSurface {
        let corners = [
            p(lo, lo, lo),
            p(hi, lo, lo),
            p(hi, hi, lo),
            p(lo, hi, lo),
            p(lo, lo, hi),
            p(hi, lo, hi),
            p(hi, hi, hi),
            p(lo, hi, hi),
        ];
        let quads = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [1, 2, 6, 5],
            [2, 3, 7, 6],
            [3, 0, 4, 7],
        ];
        let mut triangles = Vec::new();
        for (k, q) in quads.iter().enumerate() {
            for tri in [[q[0], q[1], q[2]], [q[0], q[2], q[3]]] {
                let coords = tri.map(|i| corners[i]);
                let points = coords.map(|c| registry.insert_or_find(c));
                triangles.push(
                    CutterTriangle::new(CutterOrigin::Side(SideId(u64::try_from(k).unwrap())), points, coords).unwrap(),
                );
            }
        }
        MeshSurface::new(triangles).unwrap()
    }

    #[test]
    fn rays_find_inside_of_closed_surface() {
        let registry = PointRegistry::new(1e-10);
        let surface = box_surface(&registry, -1.0, 1.0);
        let ctx = CutContext::new(ElementId(1), &registry, Precision::Adaptive, 1e-10);
        assert_eq!(ray_position(&ctx, &p(0.1, 0.2, 0.3), &surface), Some(Position::Inside));
        assert_eq!(ray_position(&ctx, &p(3.0, 0.2, 0.3), &surface), Some(Position::Outside));
        assert_eq!(ray_position(&ctx, &p(-5.0, -5.0, -5.0), &surface), Some(Position::Outside));
    }

    #[test]
    fn inside_wins_when_combined() {
        assert_eq!(combine(Some(Position::Inside), Some(Position::Outside)), Position::Inside);
        assert_eq!(combine(Some(Position::Outside), Some(Position::Undecided)), Position::Undecided);
        assert_eq!(combine(None, Some(Position::Outside)), Position::Outside);
        assert_eq!(combine(None, None), Position::Outside);
    }
}
