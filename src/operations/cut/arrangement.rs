use std::collections::{BTreeMap, BTreeSet};

use crate::math::polygon_3d::{point_segment_distance, winding_number_2d};
use crate::math::predicates::{dominant_axis, project_dropping};
use crate::math::{Point2, Sign, Vector3};
use crate::topology::PointId;

use super::engine::CutContext;

/// Faces of a split polygon.
#[derive(Debug, Default)]
pub(crate) struct Split {
    /// Each face is an outer loop followed by its holes; outer loops run
    /// counter-clockwise around the normal, holes clockwise.
    pub faces: Vec<Vec<Vec<PointId>>>,
    /// Points created where edges cross.
    pub created: Vec<PointId>,
}

/// Splits a planar polygon along segments lying on it.
///
/// Edges are first split at every candidate point lying on them, so that
/// neighbouring facets share their vertices. Dangling segment ends are
/// stripped from the traced loops.
pub(crate) fn split_polygon(
    ctx: &CutContext<'_>,
    boundary: &[PointId],
    segments: &[[PointId; 2]],
    normal: &Vector3,
    candidates: &[PointId],
) -> Split {
    let mut split = Split::default();
    if boundary.len() < 3 {
        return split;
    }
    let drop = dominant_axis(normal);
    let mirror = normal[drop] < 0.0;
    let project = |id: PointId| {
        let q = project_dropping(&ctx.at(id), drop);
        if mirror {
            Point2::new(q.x, -q.y)
        } else {
            q
        }
    };

    let n = boundary.len();
    let mut edges: Vec<[PointId; 2]> = (0..n).map(|i| [boundary[i], boundary[(i + 1) % n]]).collect();
    let boundary_count = edges.len();
    edges.extend(segments.iter().copied().filter(|[a, b]| a != b));

    // Proper crossings between edges become new points.
    let mut points: BTreeSet<PointId> = candidates.iter().copied().collect();
    for i in 0..edges.len() {
        for j in i + 1..edges.len() {
            let ([a, b], [c, d]) = (edges[i], edges[j]);
            if a == c || a == d || b == c || b == d {
                continue;
            }
            let (pa, pb, pc, pd) = (project(a), project(b), project(c), project(d));
            if ctx.kernel.segment_segment_2d(&pa, &pb, &pc, &pd) != Sign::Positive {
                continue;
            }
            let r = pb - pa;
            let s = pd - pc;
            let denom = r.perp(&s);
            if denom == 0.0 {
                continue;
            }
            let t = (pc - pa).perp(&s) / denom;
            let (xa, xb) = (ctx.at(a), ctx.at(b));
            let id = ctx.vertex(xa + (xb - xa) * t);
            if points.insert(id) {
                split.created.push(id);
            }
        }
    }

    // Split every edge at the points lying on it.
    let mut directed_boundary = BTreeSet::new();
    let mut pieces: BTreeSet<(PointId, PointId)> = BTreeSet::new();
    for (k, [a, b]) in edges.iter().copied().enumerate() {
        let (xa, xb) = (ctx.at(a), ctx.at(b));
        let mut stops: Vec<(f64, PointId)> = points
            .iter()
            .filter(|&&c| c != a && c != b)
            .filter_map(|&c| {
                let x = ctx.at(c);
                let (dist, t) = point_segment_distance(&x, &xa, &xb);
                let inner = dist <= ctx.tol
                    && t > 0.0
                    && t < 1.0
                    && (x - xa).norm() > ctx.tol
                    && (x - xb).norm() > ctx.tol;
                inner.then_some((t, c))
            })
            .collect();
        stops.sort_by(|x, y| x.0.total_cmp(&y.0));
        let mut chain = vec![a];
        chain.extend(stops.into_iter().map(|(_, c)| c));
        chain.push(b);
        chain.dedup();
        for w in chain.windows(2) {
            if w[0] == w[1] {
                continue;
            }
            if k < boundary_count {
                directed_boundary.insert((w[0], w[1]));
            }
            pieces.insert(if w[0] < w[1] { (w[0], w[1]) } else { (w[1], w[0]) });
        }
    }

    // Neighbours in counter-clockwise order.
    let mut neighbours: BTreeMap<PointId, Vec<PointId>> = BTreeMap::new();
    for &(a, b) in &pieces {
        neighbours.entry(a).or_default().push(b);
        neighbours.entry(b).or_default().push(a);
    }
    let coords: BTreeMap<PointId, Point2> = neighbours.keys().map(|&id| (id, project(id))).collect();
    for (id, list) in &mut neighbours {
        let origin = coords[id];
        list.sort_by(|x, y| {
            let (dx, dy) = (coords[x] - origin, coords[y] - origin);
            dx.y.atan2(dx.x).total_cmp(&dy.y.atan2(dy.x))
        });
    }

    // Trace faces keeping their interior on the left.
    let mut visited: BTreeSet<(PointId, PointId)> = BTreeSet::new();
    let mut outer: Vec<(Vec<PointId>, f64)> = Vec::new();
    let mut holes: Vec<Vec<PointId>> = Vec::new();
    for &(a, b) in &pieces {
        for start in [(a, b), (b, a)] {
            if visited.contains(&start) {
                continue;
            }
            let mut cycle = Vec::new();
            let (mut u, mut v) = start;
            let mut unbounded = false;
            while visited.insert((u, v)) {
                cycle.push(u);
                if directed_boundary.contains(&(v, u)) {
                    unbounded = true;
                }
                let list = &neighbours[&v];
                let pos = list.iter().position(|&w| w == u).unwrap_or(0);
                let next = list[(pos + list.len() - 1) % list.len()];
                (u, v) = (v, next);
            }
            let cycle = strip_spikes(cycle);
            if cycle.len() < 3 {
                continue;
            }
            let area = signed_area(&cycle, &coords);
            if area > ctx.tol * ctx.tol {
                outer.push((cycle, area));
            } else if area < -ctx.tol * ctx.tol && !unbounded {
                holes.push(cycle);
            }
        }
    }

    let mut faces: Vec<Vec<Vec<PointId>>> = outer.iter().map(|(l, _)| vec![l.clone()]).collect();
    for hole in holes {
        let owner = outer
            .iter()
            .enumerate()
            .filter(|(_, (l, _))| contains(l, &hole, &coords))
            .min_by(|x, y| x.1 .1.total_cmp(&y.1 .1))
            .map(|(i, _)| i);
        if let Some(i) = owner {
            faces[i].push(hole);
        }
    }
    split.faces = faces;
    split
}

/// Removes back-and-forth steps along dangling edges.
fn strip_spikes(mut cycle: Vec<PointId>) -> Vec<PointId> {
    loop {
        let n = cycle.len();
        if n < 3 {
            return cycle;
        }
        let Some(i) = (0..n).find(|&i| cycle[(i + n - 1) % n] == cycle[(i + 1) % n]) else {
            return cycle;
        };
        let j = (i + 1) % n;
        cycle.remove(i.max(j));
        cycle.remove(i.min(j));
    }
}

fn signed_area(cycle: &[PointId], coords: &BTreeMap<PointId, Point2>) -> f64 {
    let n = cycle.len();
    (0..n)
        .map(|i| {
            let (a, b) = (coords[&cycle[i]], coords[&cycle[(i + 1) % n]]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        * 0.5
}

/// True if `hole` lies inside `outer`, judged on a hole vertex not on it.
fn contains(outer: &[PointId], hole: &[PointId], coords: &BTreeMap<PointId, Point2>) -> bool {
    let ring: Vec<(f64, f64)> = outer.iter().map(|id| (coords[id].x, coords[id].y)).collect();
    hole.iter()
        .find(|id| !outer.contains(id))
        .is_some_and(|id| winding_number_2d(coords[id].x, coords[id].y, &ring) != 0)
}
