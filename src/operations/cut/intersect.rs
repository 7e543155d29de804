use std::collections::BTreeSet;

use crate::geometry::Aabb;
use crate::math::polygon_3d::{newell_normal, polygon_area_3d};
use crate::math::{Point3, Sign, Vector3};
use crate::topology::{CutterOrigin, CutterTriangle, PointId};

use super::engine::{CutContext, Domain, DomainFace, EscalationReason, FaceKind, StageOutcome};
use super::CutState;

/// A convex planar piece of a cutting surface, before clipping.
#[derive(Debug, Clone)]
pub(crate) struct Cutter {
    pub origin: CutterOrigin,
    pub coords: Vec<Point3>,
    /// Unit normal, pointing to the outside.
    pub normal: Vector3,
    pub plane: [Point3; 3],
    pub bbox: Aabb,
}

impl Cutter {
    pub fn from_triangle(triangle: &CutterTriangle) -> Self {
        Self {
            origin: triangle.origin,
            coords: triangle.coords.to_vec(),
            normal: triangle.normal,
            plane: triangle.coords,
            bbox: triangle.bbox,
        }
    }

    /// Builds a cutter from a planar convex polygon; `None` if it has no area.
    pub fn from_polygon(origin: CutterOrigin, coords: Vec<Point3>) -> Option<Self> {
        let normal = newell_normal(&coords).try_normalize(f64::MIN_POSITIVE)?;
        let plane = plane_triangle(&coords)?;
        let bbox = Aabb::from_points(&coords);
        Some(Self {
            origin,
            coords,
            normal,
            plane,
            bbox,
        })
    }
}

/// Three consecutive vertices spanning the largest corner of a polygon,
/// ordered like the polygon.
pub(crate) fn plane_triangle(coords: &[Point3]) -> Option<[Point3; 3]> {
    let n = coords.len();
    if n < 3 {
        return None;
    }
    let span = |i: usize| {
        (coords[(i + 1) % n] - coords[i])
            .cross(&(coords[(i + n - 1) % n] - coords[i]))
            .norm()
    };
    let corner = (0..n).max_by(|&a, &b| span(a).total_cmp(&span(b)))?;
    Some([
        coords[(corner + n - 1) % n],
        coords[corner],
        coords[(corner + 1) % n],
    ])
}

/// A cutter clipped to a domain, on canonical points.
#[derive(Debug, Clone)]
pub(crate) struct CutPolygon {
    pub origin: CutterOrigin,
    pub points: Vec<PointId>,
    pub normal: Vector3,
    pub plane: [Point3; 3],
    /// Crossings with other cut polygons, inside this polygon.
    pub segments: Vec<[PointId; 2]>,
}

#[derive(Debug, Clone)]
pub(crate) struct Intersection {
    pub state: CutState,
    pub polygons: Vec<CutPolygon>,
}

impl Intersection {
    /// Edges of cut polygons lying on `face`.
    pub fn segments_on(&self, ctx: &CutContext<'_>, face: &DomainFace) -> Vec<[PointId; 2]> {
        let on_face =
            |id: PointId| ctx.kernel.plane_side(&face.plane, &face.normal, &ctx.at(id), ctx.tol) == Sign::Degenerate;
        let mut segments = Vec::new();
        for polygon in &self.polygons {
            let n = polygon.points.len();
            for i in 0..n {
                let (a, b) = (polygon.points[i], polygon.points[(i + 1) % n]);
                if on_face(a) && on_face(b) {
                    segments.push([a, b]);
                }
            }
        }
        segments
    }
}

/// Clips every cutter to the domain and records where cut polygons cross.
pub(crate) fn intersect(ctx: &CutContext<'_>, domain: &Domain, cutters: &[Cutter]) -> StageOutcome<Intersection> {
    let domain_box = Aabb::from_points(&ctx.coords(&domain.nodes));
    let mut state = CutState::Uncut;
    let mut polygons = Vec::new();

    for cutter in cutters {
        if !cutter.bbox.overlaps(&domain_box, ctx.tol) {
            continue;
        }
        state = state.max(CutState::Touched);
        let Some(points) = clip(ctx, domain, cutter) else {
            continue;
        };
        state = CutState::Cut;
        polygons.push(CutPolygon {
            origin: cutter.origin,
            points,
            normal: cutter.normal,
            plane: cutter.plane,
            segments: Vec::new(),
        });
    }

    add_crossings(ctx, &mut polygons);

    // Merged points move by at most the tolerance.
    let mut outside = BTreeSet::new();
    for polygon in &polygons {
        for &id in polygon.points.iter().chain(polygon.segments.iter().flatten()) {
            let x = ctx.at(id);
            if domain
                .faces
                .iter()
                .any(|f| ctx.kernel.plane_side(&f.plane, &f.normal, &x, 2.0 * ctx.tol) == Sign::Positive)
            {
                outside.insert(id);
            }
        }
    }
    if !outside.is_empty() {
        return StageOutcome::NeedsEscalation(EscalationReason::Inconsistent {
            points: ctx.describe(outside),
        });
    }

    StageOutcome::Ok(Intersection { state, polygons })
}

/// Clips a cutter against every face plane of the domain.
///
/// Returns `None` when nothing of positive area is left, or when the piece
/// lies on an element face.
fn clip(ctx: &CutContext<'_>, domain: &Domain, cutter: &Cutter) -> Option<Vec<PointId>> {
    let mut polygon = cutter.coords.clone();
    for face in &domain.faces {
        polygon = clip_by_face(ctx, &polygon, face);
        if polygon.len() < 3 {
            return None;
        }
    }

    let mut points: Vec<PointId> = Vec::with_capacity(polygon.len());
    for coord in polygon {
        let id = ctx.vertex(coord);
        if points.last() != Some(&id) {
            points.push(id);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return None;
    }
    let coords = ctx.coords(&points);
    if polygon_area_3d(&coords) < ctx.tol * ctx.tol {
        return None;
    }

    let tangent = domain.faces.iter().any(|face| {
        matches!(face.kind, FaceKind::Element(_))
            && coords
                .iter()
                .all(|x| ctx.kernel.plane_side(&face.plane, &face.normal, x, ctx.tol) == Sign::Degenerate)
    });
    if tangent {
        tracing::trace!(element = %ctx.element, origin = ?cutter.origin, "cutter lies on an element face");
        return None;
    }
    Some(points)
}

/// Keeps the part of a convex polygon on the inner side of one face.
fn clip_by_face(ctx: &CutContext<'_>, polygon: &[Point3], face: &DomainFace) -> Vec<Point3> {
    let sides: Vec<Sign> = polygon
        .iter()
        .map(|x| ctx.kernel.plane_side(&face.plane, &face.normal, x, ctx.tol))
        .collect();
    if sides.iter().all(|s| *s != Sign::Positive) {
        return polygon.to_vec();
    }
    let n = polygon.len();
    let mut out = Vec::with_capacity(n + 1);
    for i in 0..n {
        let j = (i + 1) % n;
        if sides[i] != Sign::Positive {
            out.push(polygon[i]);
        }
        let crosses = matches!(
            (sides[i], sides[j]),
            (Sign::Positive, Sign::Negative) | (Sign::Negative, Sign::Positive)
        );
        if crosses {
            out.push(ctx.kernel.plane_cut(&polygon[i], &polygon[j], &face.plane));
        }
    }
    out
}

/// Records the crossing segment of every level-set polygon with every mesh
/// polygon on both of them.
fn add_crossings(ctx: &CutContext<'_>, polygons: &mut [CutPolygon]) {
    let level_set: Vec<usize> = (0..polygons.len())
        .filter(|&i| polygons[i].origin == CutterOrigin::LevelSet)
        .collect();
    let mesh: Vec<usize> = (0..polygons.len())
        .filter(|&i| polygons[i].origin != CutterOrigin::LevelSet)
        .collect();
    for &a in &level_set {
        for &b in &mesh {
            if let Some(segment) = crossing(ctx, &polygons[a], &polygons[b]) {
                polygons[a].segments.push(segment);
                polygons[b].segments.push(segment);
            }
        }
    }
}

/// Segment shared by two convex polygons on non-parallel planes.
fn crossing(ctx: &CutContext<'_>, a: &CutPolygon, b: &CutPolygon) -> Option<[PointId; 2]> {
    let direction = a.normal.cross(&b.normal);
    if direction.norm() < 1e-9 {
        return None;
    }
    let on_a = section(ctx, b, a, &direction)?;
    let on_b = section(ctx, a, b, &direction)?;
    let t = |x: &Point3| direction.dot(&x.coords);

    let start = if t(&on_a.0) >= t(&on_b.0) { on_a.0 } else { on_b.0 };
    let end = if t(&on_a.1) <= t(&on_b.1) { on_a.1 } else { on_b.1 };
    if (end - start).dot(&direction) / direction.norm() <= ctx.tol {
        return None;
    }
    let (s, e) = (ctx.vertex(start), ctx.vertex(end));
    (s != e).then_some([s, e])
}

/// Part of `polygon` on the plane of `other`, as its extreme points along
/// the crossing direction.
fn section(
    ctx: &CutContext<'_>,
    polygon: &CutPolygon,
    other: &CutPolygon,
    direction: &Vector3,
) -> Option<(Point3, Point3)> {
    let coords = ctx.coords(&polygon.points);
    let sides: Vec<Sign> = coords
        .iter()
        .map(|x| ctx.kernel.plane_side(&other.plane, &other.normal, x, ctx.tol))
        .collect();
    let n = coords.len();
    let mut hits = Vec::new();
    for i in 0..n {
        let j = (i + 1) % n;
        if sides[i] == Sign::Degenerate {
            hits.push(coords[i]);
        }
        let crosses = matches!(
            (sides[i], sides[j]),
            (Sign::Positive, Sign::Negative) | (Sign::Negative, Sign::Positive)
        );
        if crosses {
            hits.push(ctx.kernel.plane_cut(&coords[i], &coords[j], &other.plane));
        }
    }
    let t = |x: &Point3| direction.dot(&x.coords);
    let first = hits.iter().min_by(|x, y| t(x).total_cmp(&t(y)))?;
    let last = hits.iter().max_by(|x, y| t(x).total_cmp(&t(y)))?;
    Some((*first, *last))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::ElementShape;
    use crate::math::Precision;
    use crate::topology::{CutStore, ElementId};

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

    fn with_cube(f: impl FnOnce(&CutContext<'_>, &Domain)) {
        let mut store = CutStore::new(1e-10);
        store.add_element(ElementId(1), ElementShape::Hex8, &unit_cube()).unwrap();
        let element = store.element(ElementId(1)).unwrap();
        let ctx = CutContext::new(element.id, store.registry(), Precision::Adaptive, 1e-10);
        let domain = Domain::from_element(&ctx, element);
        f(&ctx, &domain);
    }

    fn square(z: f64, half: f64) -> Cutter {
        let c = 0.5;
        Cutter::from_polygon(
            CutterOrigin::LevelSet,
            vec![
                p(c - half, c - half, z),
                p(c + half, c - half, z),
                p(c + half, c + half, z),
                p(c - half, c + half, z),
            ],
        )
        .unwrap()
    }

    #[test]
    fn oversized_cutter_is_clipped_to_the_section() {
        with_cube(|ctx, domain| {
            let StageOutcome::Ok(result) = intersect(ctx, domain, &[square(0.5, 2.0)]) else {
                panic!("intersection failed");
            };
            assert_eq!(result.state, CutState::Cut);
            let polygon = &result.polygons[0];
            assert_eq!(polygon.points.len(), 4);
            let area = polygon_area_3d(&ctx.coords(&polygon.points));
            assert!((area - 1.0).abs() < 1e-12);
        });
    }

    #[test]
    fn cutter_on_a_face_only_touches() {
        with_cube(|ctx, domain| {
            let StageOutcome::Ok(result) = intersect(ctx, domain, &[square(1.0, 2.0)]) else {
                panic!("intersection failed");
            };
            assert_eq!(result.state, CutState::Touched);
            assert!(result.polygons.is_empty());
        });
    }

    #[test]
    fn distant_cutter_leaves_element_uncut() {
        with_cube(|ctx, domain| {
            let StageOutcome::Ok(result) = intersect(ctx, domain, &[square(3.0, 0.5)]) else {
                panic!("intersection failed");
            };
            assert_eq!(result.state, CutState::Uncut);
        });
    }

    #[test]
    fn face_segments_follow_clipped_edges() {
        with_cube(|ctx, domain| {
            let StageOutcome::Ok(result) = intersect(ctx, domain, &[square(0.5, 2.0)]) else {
                panic!("intersection failed");
            };
            let side_faces = domain
                .faces
                .iter()
                .filter(|f| result.segments_on(ctx, f).len() == 1)
                .count();
            assert_eq!(side_faces, 4);
        });
    }

    #[test]
    fn crossing_polygons_share_a_segment() {
        with_cube(|ctx, domain| {
            let wall = Cutter::from_polygon(
                CutterOrigin::Side(crate::topology::SideId(1)),
                vec![p(0.5, -1.0, -1.0), p(0.5, 2.0, -1.0), p(0.5, 2.0, 2.0), p(0.5, -1.0, 2.0)],
            )
            .unwrap();
            let StageOutcome::Ok(result) = intersect(ctx, domain, &[square(0.5, 2.0), wall]) else {
                panic!("intersection failed");
            };
            assert_eq!(result.polygons[0].segments.len(), 1);
            assert_eq!(result.polygons[0].segments, result.polygons[1].segments);
            let [a, b] = result.polygons[0].segments[0];
            assert!(((ctx.at(a) - ctx.at(b)).norm() - 1.0).abs() < 1e-12);
        });
    }
}
