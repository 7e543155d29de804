use std::collections::{BTreeMap, BTreeSet};

use crate::integration::tessellation::signed_volume;
use crate::math::polygon_3d::{area_centroid, solid_angle};
use crate::math::{Point3, Vector3};
use crate::topology::{CutterOrigin, PointId};

use super::engine::{CutContext, Domain, EscalationReason, StageOutcome};

/// What a facet of the arrangement lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FacetKind {
    /// Element face `face`.
    Boundary { face: usize },
    /// Face between two escalation sub-tetrahedra.
    Internal,
    Cut(CutterOrigin),
}

/// A planar facet; loops run counter-clockwise around `normal`, holes
/// clockwise.
#[derive(Debug, Clone)]
pub(crate) struct Facet {
    pub loops: Vec<Vec<PointId>>,
    pub normal: Vector3,
    pub kind: FacetKind,
}

impl Facet {
    pub fn point_set(&self) -> Vec<PointId> {
        let set: BTreeSet<PointId> = self.loops.iter().flatten().copied().collect();
        set.into_iter().collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = (PointId, PointId)> + '_ {
        self.loops.iter().flat_map(|l| {
            let n = l.len();
            (0..n).map(move |i| (l[i], l[(i + 1) % n]))
        })
    }

    /// Signed volume of the cone from `apex`, with the facet oriented along
    /// its normal.
    pub fn cone_volume(&self, ctx: &CutContext<'_>, apex: &Point3) -> f64 {
        self.loops
            .iter()
            .map(|l| {
                let x = ctx.coords(l);
                (1..x.len().saturating_sub(1))
                    .map(|i| signed_volume(&[*apex, x[0], x[i], x[i + 1]]))
                    .sum::<f64>()
            })
            .sum()
    }
}

/// One side of a facet. The positive side is the one the normal points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct CellSide {
    pub facet: usize,
    pub positive: bool,
}

impl CellSide {
    fn key(self) -> usize {
        2 * self.facet + usize::from(!self.positive)
    }

    fn from_key(key: usize) -> Self {
        Self {
            facet: key / 2,
            positive: key % 2 == 0,
        }
    }
}

/// A closed region bounded by facet sides, before classification.
#[derive(Debug, Clone)]
pub(crate) struct RawCell {
    pub sides: Vec<CellSide>,
    pub volume: f64,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Groups facet sides into closed cells.
///
/// Around every edge the incident facets are sorted by angle; the two sides
/// facing each wedge between consecutive facets belong to the same cell.
/// Sides connected to the outer side of the domain faces are discarded.
/// Closed cutter surfaces floating inside a cell become cavities of the
/// smallest cell around them.
pub(crate) fn build_cells(ctx: &CutContext<'_>, domain: &Domain, facets: &[Facet]) -> StageOutcome<Vec<RawCell>> {
    // (facet, forward) per undirected edge, forward meaning lower id first.
    let mut incidences: BTreeMap<(PointId, PointId), Vec<(usize, bool)>> = BTreeMap::new();
    for (f, facet) in facets.iter().enumerate() {
        for (a, b) in facet.edges() {
            if a == b {
                continue;
            }
            let key = if a < b { (a, b) } else { (b, a) };
            incidences.entry(key).or_default().push((f, a < b));
        }
    }

    let mut sides = UnionFind::new(2 * facets.len());
    let side = |facet: usize, positive: bool| CellSide { facet, positive }.key();
    for (&(a, b), list) in &mut incidences {
        let d = ctx.at(b) - ctx.at(a);
        let Some(axis) = d.try_normalize(f64::MIN_POSITIVE) else {
            continue;
        };
        let wing = |&(f, forward): &(usize, bool)| {
            let w = facets[f].normal.cross(&axis);
            if forward {
                w
            } else {
                -w
            }
        };
        let u0 = wing(&list[0]);
        let v0 = axis.cross(&u0);
        list.sort_by(|x, y| {
            let angle = |i: &(usize, bool)| {
                let w = wing(i);
                let t = w.dot(&v0).atan2(w.dot(&u0));
                if t < 0.0 {
                    t + std::f64::consts::TAU
                } else {
                    t
                }
            };
            angle(x).total_cmp(&angle(y)).then(x.cmp(y))
        });
        for i in 0..list.len() {
            let (current, current_forward) = list[i];
            let (next, next_forward) = list[(i + 1) % list.len()];
            sides.union(side(current, current_forward), side(next, !next_forward));
        }
    }

    let domain_facets: Vec<usize> = (0..facets.len())
        .filter(|&f| !matches!(facets[f].kind, FacetKind::Cut(_)))
        .collect();
    let exterior: BTreeSet<usize> = domain_facets.iter().map(|&f| sides.find(side(f, true))).collect();
    let leaking: Vec<usize> = domain_facets
        .iter()
        .copied()
        .filter(|&f| exterior.contains(&sides.find(side(f, false))))
        .collect();
    if !leaking.is_empty() {
        let points = leaking.iter().flat_map(|&f| facets[f].point_set()).collect::<BTreeSet<_>>();
        return StageOutcome::NeedsEscalation(EscalationReason::NonManifold {
            points: ctx.describe(points),
            facets: leaking,
        });
    }

    let mut groups: BTreeMap<usize, Vec<CellSide>> = BTreeMap::new();
    for key in 0..2 * facets.len() {
        let root = sides.find(key);
        if !exterior.contains(&root) {
            groups.entry(root).or_default().push(CellSide::from_key(key));
        }
    }

    let floor = ctx.tol * domain.size * domain.size;
    let mut cells = Vec::new();
    let mut shells = Vec::new();
    let mut cut_points = BTreeSet::new();
    for group in groups.into_values() {
        if let Some(edge) = open_edge(facets, &group) {
            return StageOutcome::NeedsEscalation(EscalationReason::NonManifold {
                points: ctx.describe([edge.0, edge.1]),
                facets: group.iter().map(|s| s.facet).collect(),
            });
        }
        let volume: f64 = group
            .iter()
            .map(|s| {
                let v = facets[s.facet].cone_volume(ctx, &domain.centroid);
                if s.positive {
                    -v
                } else {
                    v
                }
            })
            .sum();
        if volume.abs() <= floor {
            continue;
        }
        let on_cutters = group.iter().all(|s| matches!(facets[s.facet].kind, FacetKind::Cut(_)));
        if volume < 0.0 && !on_cutters {
            return StageOutcome::NeedsEscalation(EscalationReason::VolumeMismatch {
                cells: volume,
                expected: domain.volume,
                points: ctx.describe(group.iter().flat_map(|s| facets[s.facet].point_set())),
            });
        }
        cut_points.extend(
            group
                .iter()
                .filter(|s| matches!(facets[s.facet].kind, FacetKind::Cut(_)))
                .flat_map(|s| facets[s.facet].point_set()),
        );
        let cell = RawCell { sides: group, volume };
        // A closed cutter surface inside the domain bounds a cavity of the
        // cell around it.
        if volume < 0.0 {
            shells.push(cell);
        } else {
            cells.push(cell);
        }
    }

    let mut hosts = Vec::with_capacity(shells.len());
    for shell in &shells {
        let Some(host) = enclosing_cell(ctx, facets, &cells, shell) else {
            return StageOutcome::NeedsEscalation(EscalationReason::VolumeMismatch {
                cells: shell.volume,
                expected: domain.volume,
                points: ctx.describe(shell.sides.iter().flat_map(|s| facets[s.facet].point_set())),
            });
        };
        hosts.push(host);
    }
    for (shell, host) in shells.into_iter().zip(hosts) {
        let cell = &mut cells[host];
        cell.volume += shell.volume;
        cell.sides.extend(shell.sides);
        cell.sides.sort();
    }

    let total: f64 = cells.iter().map(|c| c.volume).sum();
    let allowed = (1e-9 * domain.volume.abs()).max(10.0 * floor);
    if (total - domain.volume).abs() > allowed {
        return StageOutcome::NeedsEscalation(EscalationReason::VolumeMismatch {
            cells: total,
            expected: domain.volume,
            points: ctx.describe(cut_points),
        });
    }
    StageOutcome::Ok(cells)
}

/// Index of the smallest cell whose boundary winds around `shell`.
fn enclosing_cell(ctx: &CutContext<'_>, facets: &[Facet], cells: &[RawCell], shell: &RawCell) -> Option<usize> {
    let first = shell.sides.first()?;
    let sample = area_centroid(&ctx.coords(facets[first.facet].loops.first()?));
    let own: BTreeSet<usize> = shell.sides.iter().map(|s| s.facet).collect();
    cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| !cell.sides.iter().any(|s| own.contains(&s.facet)))
        .filter(|(_, cell)| winding_number(ctx, facets, cell, &sample).abs() > 0.5)
        .min_by(|a, b| a.1.volume.total_cmp(&b.1.volume))
        .map(|(index, _)| index)
}

/// Generalized winding number of the cell boundary around `point`.
fn winding_number(ctx: &CutContext<'_>, facets: &[Facet], cell: &RawCell, point: &Point3) -> f64 {
    let total: f64 = cell
        .sides
        .iter()
        .map(|s| {
            let angle: f64 = facets[s.facet]
                .loops
                .iter()
                .map(|l| solid_angle(point, &ctx.coords(l)))
                .sum();
            if s.positive {
                -angle
            } else {
                angle
            }
        })
        .sum();
    total / (4.0 * std::f64::consts::PI)
}

/// An edge whose two directions do not balance over the cell's outward
/// facets.
fn open_edge(facets: &[Facet], sides: &[CellSide]) -> Option<(PointId, PointId)> {
    let mut balance: BTreeMap<(PointId, PointId), i64> = BTreeMap::new();
    for s in sides {
        for (a, b) in facets[s.facet].edges() {
            // Outward from the cell the positive side runs reversed.
            let along = (a < b) != s.positive;
            let key = if a < b { (a, b) } else { (b, a) };
            *balance.entry(key).or_default() += if along { 1 } else { -1 };
        }
    }
    balance.into_iter().find(|(_, n)| *n != 0).map(|(e, _)| e)
}
