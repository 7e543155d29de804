use std::collections::BTreeMap;

use crate::config::CutOptions;
use crate::integration::tessellation::{cell_tets, facet_rule, facet_triangles, signed_volume};
use crate::integration::{self, IntegrationRule};
use crate::math::{Point3, Vector3};
use crate::topology::{ElementData, PointId, PointOwner};

use super::cells::FacetKind;
use super::engine::{CutContext, Decomposition};
use super::{BoundaryFacet, CellFacet, ElementResult, FacetOrigin, VolumeCell};

/// Builds the public result: oriented cell facets, quadrature rules and the
/// cut-surface pieces with the cells on either side.
pub(crate) fn assemble(
    ctx: &CutContext<'_>,
    element: &ElementData,
    decomposition: Decomposition,
    options: &CutOptions,
) -> ElementResult {
    let Decomposition {
        state,
        facets,
        cells,
        escalated,
    } = decomposition;
    let degree = options.quadrature_degree;
    let reference = element.centroid();

    let mut built: Vec<(usize, VolumeCell)> = cells
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let cell_facets: Vec<CellFacet> = cell
                .sides
                .iter()
                .map(|side| {
                    let facet = &facets[side.facet];
                    let loops: Vec<Vec<PointId>> = facet
                        .loops
                        .iter()
                        .map(|l| {
                            let mut l = l.clone();
                            if side.positive {
                                l.reverse();
                            }
                            l
                        })
                        .collect();
                    let coords = loops.iter().map(|l| ctx.coords(l)).collect();
                    CellFacet {
                        origin: match facet.kind {
                            FacetKind::Boundary { face } => FacetOrigin::ElementFace(face),
                            FacetKind::Internal => FacetOrigin::Internal,
                            FacetKind::Cut(origin) => FacetOrigin::Cutter(origin),
                        },
                        loops,
                        coords,
                    }
                })
                .collect();

            // Holed facets go to the rules as triangles.
            let polygons: Vec<Vec<Point3>> = cell_facets
                .iter()
                .flat_map(|f| match f.coords.as_slice() {
                    [single] => vec![single.clone()],
                    loops => facet_triangles(loops).into_iter().map(|t| t.to_vec()).collect(),
                })
                .collect();
            let centroid = volume_centroid(&polygons, &reference).unwrap_or(reference);
            let (raw, strategy) = integration::cell_rule(&polygons, &reference, options.strategy, degree);
            let rule = IntegrationRule::in_element(element, raw, options.tolerance);
            (
                index,
                VolumeCell {
                    position: cell.position,
                    volume: cell.volume,
                    centroid,
                    facets: cell_facets,
                    rule,
                    strategy,
                },
            )
        })
        .collect();

    let grid = (element.size() * 1e-6).max(f64::MIN_POSITIVE);
    #[allow(clippy::cast_possible_truncation)]
    let key = |c: &VolumeCell| {
        let r = |v: f64| (v / grid).round() as i64;
        (c.position, r(c.centroid.x), r(c.centroid.y), r(c.centroid.z))
    };
    built.sort_by(|a, b| key(&a.1).cmp(&key(&b.1)));
    let slot: BTreeMap<usize, usize> = built.iter().enumerate().map(|(new, (old, _))| (*old, new)).collect();

    // Sides of cut facets, by cell.
    let mut behind: BTreeMap<usize, usize> = BTreeMap::new();
    let mut ahead: BTreeMap<usize, usize> = BTreeMap::new();
    for (c, cell) in cells.iter().enumerate() {
        for side in &cell.sides {
            let target = if side.positive { &mut ahead } else { &mut behind };
            target.entry(side.facet).or_insert(slot[&c]);
        }
    }

    let mut seen: BTreeMap<Vec<PointId>, usize> = BTreeMap::new();
    let mut boundary_facets: Vec<BoundaryFacet> = Vec::new();
    for (f, facet) in facets.iter().enumerate() {
        let FacetKind::Cut(origin) = facet.kind else {
            continue;
        };
        if !behind.contains_key(&f) && !ahead.contains_key(&f) {
            continue;
        }
        if let Some(&existing) = seen.get(&facet.point_set()) {
            let kept = &mut boundary_facets[existing];
            kept.inner_cell = kept.inner_cell.or(behind.get(&f).copied());
            kept.outer_cell = kept.outer_cell.or(ahead.get(&f).copied());
            continue;
        }
        let coords: Vec<Vec<Point3>> = facet.loops.iter().map(|l| ctx.coords(l)).collect();
        let raw = facet_rule(&coords, degree);
        let area: f64 = raw.iter().map(|(_, w)| w).sum();
        let index = boundary_facets.len();
        for &point in facet.loops.iter().flatten() {
            ctx.registry.add_owner(
                point,
                PointOwner::Facet {
                    element: element.id,
                    facet: index,
                },
            );
        }
        seen.insert(facet.point_set(), index);
        boundary_facets.push(BoundaryFacet {
            origin,
            loops: facet.loops.clone(),
            coords,
            normal: facet.normal,
            area,
            rule: IntegrationRule::in_element(element, raw, options.tolerance),
            inner_cell: behind.get(&f).copied(),
            outer_cell: ahead.get(&f).copied(),
        });
    }

    ElementResult {
        element: element.id,
        state,
        escalated,
        predicate_escalations: ctx.kernel.escalations(),
        cells: built.into_iter().map(|(_, cell)| cell).collect(),
        boundary_facets,
    }
}

/// Volume centroid of the cell bounded by outward `polygons`.
fn volume_centroid(polygons: &[Vec<Point3>], reference: &Point3) -> Option<Point3> {
    let mut volume = 0.0;
    let mut moment = Vector3::zeros();
    for tet in cell_tets(polygons, reference) {
        let v = signed_volume(&tet);
        volume += v;
        moment += (tet[0].coords + tet[1].coords + tet[2].coords + tet[3].coords) * (v / 4.0);
    }
    (volume.abs() > f64::MIN_POSITIVE).then(|| Point3::from(moment / volume))
}
