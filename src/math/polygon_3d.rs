use super::{Point3, Vector3};

/// Newell normal of a (possibly non-convex) polygon.
///
/// The length equals twice the polygon area; the direction follows the
/// right-hand rule over the vertex order.
#[must_use]
pub fn newell_normal(points: &[Point3]) -> Vector3 {
    let n = points.len();
    let mut normal = Vector3::zeros();
    for i in 0..n {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal
}

/// Arithmetic mean of the vertices.
#[must_use]
pub fn vertex_centroid(points: &[Point3]) -> Point3 {
    let n = points.len();
    if n == 0 {
        return Point3::origin();
    }
    #[allow(clippy::cast_precision_loss)]
    let inv_n = 1.0 / n as f64;
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum * inv_n)
}

/// Area of a planar polygon.
#[must_use]
pub fn polygon_area_3d(points: &[Point3]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    0.5 * newell_normal(points).norm()
}

/// Area-weighted centroid of a planar polygon.
///
/// Falls back to the vertex centroid for polygons without area.
#[must_use]
pub fn area_centroid(points: &[Point3]) -> Point3 {
    let normal = newell_normal(points);
    let norm_sq = normal.norm_squared();
    if points.len() < 3 || norm_sq == 0.0 {
        return vertex_centroid(points);
    }
    let o = points[0];
    let mut weighted = Vector3::zeros();
    let mut total = 0.0;
    for i in 1..points.len() - 1 {
        let a = points[i] - o;
        let b = points[i + 1] - o;
        let w = a.cross(&b).dot(&normal) / norm_sq.sqrt();
        weighted += (a + b) * (w / 3.0);
        total += w;
    }
    if total.abs() < f64::MIN_POSITIVE {
        return vertex_centroid(points);
    }
    o + weighted / total
}

/// Winding number of point `(px, py)` with respect to polygon `verts`.
///
/// Non-zero => inside, zero => outside.
#[must_use]
pub fn winding_number_2d(px: f64, py: f64, verts: &[(f64, f64)]) -> i32 {
    let n = verts.len();
    let mut winding = 0i32;
    for i in 0..n {
        let (x0, y0) = verts[i];
        let (x1, y1) = verts[(i + 1) % n];

        if y0 <= py {
            if y1 > py && cross_2d(x1 - x0, y1 - y0, px - x0, py - y0) > 0.0 {
                winding += 1;
            }
        } else if y1 <= py && cross_2d(x1 - x0, y1 - y0, px - x0, py - y0) < 0.0 {
            winding -= 1;
        }
    }
    winding
}

/// 2D cross product: `(ax * by - ay * bx)`.
#[inline]
fn cross_2d(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Distance from `point` to segment `a-b`, and the clamped segment parameter.
#[must_use]
pub fn point_segment_distance(point: &Point3, a: &Point3, b: &Point3) -> (f64, f64) {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq == 0.0 {
        return ((point - a).norm(), 0.0);
    }
    let t = ((point - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    ((point - (a + ab * t)).norm(), t)
}

/// Signed solid angle of `polygon` seen from `point`.
///
/// Positive when the polygon runs counter-clockwise around a normal pointing
/// away from `point`, so the angles of a closed outward surface sum to `4π`
/// for points inside it and to zero outside.
#[must_use]
pub fn solid_angle(point: &Point3, polygon: &[Point3]) -> f64 {
    let Some(first) = polygon.first() else {
        return 0.0;
    };
    let a = first - point;
    let la = a.norm();
    polygon
        .windows(2)
        .skip(1)
        .map(|w| {
            let (b, c) = (w[0] - point, w[1] - point);
            let (lb, lc) = (b.norm(), c.norm());
            let numerator = a.dot(&b.cross(&c));
            let denominator = la * lb * lc + a.dot(&b) * lc + a.dot(&c) * lb + b.dot(&c) * la;
            2.0 * numerator.atan2(denominator)
        })
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn unit_square() -> Vec<Point3> {
        vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn newell_normal_of_square() {
        let n = newell_normal(&unit_square());
        assert!((n - Vector3::new(0.0, 0.0, 2.0)).norm() < 1e-14);
    }

    #[test]
    fn unit_square_area() {
        assert!((polygon_area_3d(&unit_square()) - 1.0).abs() < 1e-14);
    }

    #[test]
    fn triangle_area() {
        let tri = vec![p(0.0, 0.0, 0.0), p(4.0, 0.0, 0.0), p(0.0, 3.0, 0.0)];
        assert!((polygon_area_3d(&tri) - 6.0).abs() < 1e-14);
    }

    #[test]
    fn centroid_of_l_shape() {
        // Two unit squares side by side along x: centroid at (1, 0.5).
        let poly = vec![
            p(0.0, 0.0, 0.0),
            p(2.0, 0.0, 0.0),
            p(2.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
        ];
        let c = area_centroid(&poly);
        assert!((c - p(1.0, 0.5, 0.0)).norm() < 1e-14);
    }

    #[test]
    fn segment_distance() {
        let (d, t) = point_segment_distance(&p(0.5, 1.0, 0.0), &p(0.0, 0.0, 0.0), &p(1.0, 0.0, 0.0));
        assert!((d - 1.0).abs() < 1e-14);
        assert!((t - 0.5).abs() < 1e-14);
    }

    #[test]
    fn solid_angles_of_a_closed_box() {
        let faces = [
            [p(0.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(1.0, 1.0, 0.0), p(1.0, 0.0, 0.0)],
            [p(0.0, 0.0, 1.0), p(1.0, 0.0, 1.0), p(1.0, 1.0, 1.0), p(0.0, 1.0, 1.0)],
            [p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(1.0, 0.0, 1.0), p(0.0, 0.0, 1.0)],
            [p(1.0, 0.0, 0.0), p(1.0, 1.0, 0.0), p(1.0, 1.0, 1.0), p(1.0, 0.0, 1.0)],
            [p(1.0, 1.0, 0.0), p(0.0, 1.0, 0.0), p(0.0, 1.0, 1.0), p(1.0, 1.0, 1.0)],
            [p(0.0, 1.0, 0.0), p(0.0, 0.0, 0.0), p(0.0, 0.0, 1.0), p(0.0, 1.0, 1.0)],
        ];
        let winding = |x: Point3| faces.iter().map(|f| solid_angle(&x, f)).sum::<f64>() / (4.0 * std::f64::consts::PI);
        assert!((winding(p(0.3, 0.6, 0.2)) - 1.0).abs() < 1e-12);
        assert!(winding(p(1.5, 0.5, 0.5)).abs() < 1e-12);
        // One face seen from the centre covers a sixth of the sphere.
        let sixth = solid_angle(&p(0.5, 0.5, 0.5), &faces[1]) / (4.0 * std::f64::consts::PI);
        assert!((sixth - 1.0 / 6.0).abs() < 1e-12);
    }
}
