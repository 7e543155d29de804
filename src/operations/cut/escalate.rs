use std::collections::BTreeMap;

use crate::error::GeometryError;
use crate::topology::{ElementData, PointId};

use super::cells::{CellSide, FacetKind};
use super::classify::{classify, Interfaces};
use super::engine::{cut_domain, CutContext, DecomposedCell, Decomposition, Domain, StageOutcome};
use super::intersect::Cutter;
use super::Position;

/// Cuts the element again on its sub-tetrahedra in exact arithmetic and
/// glues the pieces back together across the internal faces.
///
/// # Errors
///
/// Any failure on a sub-tetrahedron is final for the element.
pub(crate) fn escalate(
    ctx: &CutContext<'_>,
    element: &ElementData,
    cutters: &[Cutter],
    interfaces: Interfaces<'_>,
) -> Result<Decomposition, GeometryError> {
    let mut merged = Decomposition::default();
    for tet in element.shape.escalation_tets(&element.coords) {
        let domain = Domain::from_tet(ctx, &tet, element);
        let cut = match cut_domain(ctx, &domain, cutters, usize::MAX) {
            StageOutcome::Ok(cut) => cut,
            StageOutcome::NeedsEscalation(reason) => return Err(reason.into_error(element.id)),
            StageOutcome::Fatal(err) => return Err(err),
        };
        let positions = match classify(ctx, element, &cut.facets, &cut.cells, interfaces) {
            StageOutcome::Ok(p) => p,
            StageOutcome::NeedsEscalation(reason) => return Err(reason.into_error(element.id)),
            StageOutcome::Fatal(err) => return Err(err),
        };

        let offset = merged.facets.len();
        merged.state = merged.state.max(cut.state);
        merged.facets.extend(cut.facets);
        merged
            .cells
            .extend(cut.cells.into_iter().zip(positions).map(|(cell, position)| DecomposedCell {
                sides: cell
                    .sides
                    .into_iter()
                    .map(|s| CellSide {
                        facet: s.facet + offset,
                        positive: s.positive,
                    })
                    .collect(),
                volume: cell.volume,
                position,
            }));
    }
    glue(ctx, &mut merged);
    Ok(merged)
}

/// Merges cells meeting on matching pieces of internal faces.
fn glue(ctx: &CutContext<'_>, decomposition: &mut Decomposition) {
    let mut owner_of: BTreeMap<usize, usize> = BTreeMap::new();
    for (c, cell) in decomposition.cells.iter().enumerate() {
        for side in &cell.sides {
            owner_of.insert(side.facet, c);
        }
    }

    let mut by_points: BTreeMap<Vec<PointId>, Vec<usize>> = BTreeMap::new();
    for (f, facet) in decomposition.facets.iter().enumerate() {
        if facet.kind == FacetKind::Internal && owner_of.contains_key(&f) {
            by_points.entry(facet.point_set()).or_default().push(f);
        }
    }

    let n = decomposition.cells.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let find = |parent: &mut Vec<usize>, mut x: usize| {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    };
    let mut matched = vec![false; decomposition.facets.len()];
    for pair in by_points.values().filter(|fs| fs.len() == 2) {
        let (a, b) = (owner_of[&pair[0]], owner_of[&pair[1]]);
        matched[pair[0]] = true;
        matched[pair[1]] = true;
        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let mut groups: BTreeMap<usize, DecomposedCell> = BTreeMap::new();
    for (c, cell) in std::mem::take(&mut decomposition.cells).into_iter().enumerate() {
        let root = find(&mut parent, c);
        let sides: Vec<CellSide> = cell.sides.into_iter().filter(|s| !matched[s.facet]).collect();
        match groups.get_mut(&root) {
            None => {
                groups.insert(
                    root,
                    DecomposedCell {
                        sides,
                        volume: cell.volume,
                        position: cell.position,
                    },
                );
            }
            Some(group) => {
                if group.position != cell.position {
                    tracing::warn!(
                        element = %ctx.element,
                        first = ?group.position,
                        second = ?cell.position,
                        "glued sub-tetrahedron cells disagree on position"
                    );
                    if cell.position == Position::Inside {
                        group.position = Position::Inside;
                    }
                }
                group.sides.extend(sides);
                group.volume += cell.volume;
            }
        }
    }
    decomposition.cells = groups.into_values().collect();
}
