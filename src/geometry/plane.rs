use crate::math::{Point2, Point3, Vector3, TOLERANCE};

/// An oriented plane with an orthonormal in-plane frame.
///
/// Parametric form: `P(u, v) = origin + u * u_dir + v * v_dir`, and the
/// normal is `u_dir x v_dir`.
#[derive(Debug, Clone)]
pub struct Plane {
    origin: Point3,
    u_dir: Vector3,
    v_dir: Vector3,
    normal: Vector3,
}

impl Plane {
    /// Creates a plane from an origin and a normal vector.
    ///
    /// Returns `None` if the normal is (numerically) zero.
    #[must_use]
    pub fn from_normal(origin: Point3, normal: Vector3) -> Option<Self> {
        let len = normal.norm();
        if len < TOLERANCE * TOLERANCE {
            return None;
        }
        let normal = normal / len;

        // Reference vector not parallel to the normal
        let reference = if normal.x.abs() < 0.9 {
            Vector3::new(1.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };

        let u_dir = normal.cross(&reference).normalize();
        let v_dir = normal.cross(&u_dir);

        Some(Self {
            origin,
            u_dir,
            v_dir,
            normal,
        })
    }

    /// Best-fit plane of a polygon (Newell normal, vertex centroid origin).
    #[must_use]
    pub fn from_polygon(points: &[Point3]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let normal = crate::math::polygon_3d::newell_normal(points);
        let origin = crate::math::polygon_3d::vertex_centroid(points);
        Self::from_normal(origin, normal)
    }

    /// Unit normal of the plane.
    #[must_use]
    pub fn normal(&self) -> &Vector3 {
        &self.normal
    }

    /// Coordinates of `point` in the plane frame.
    #[must_use]
    pub fn project(&self, point: &Point3) -> Point2 {
        let diff = point - self.origin;
        Point2::new(diff.dot(&self.u_dir), diff.dot(&self.v_dir))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    #[test]
    fn zero_normal_is_rejected() {
        assert!(Plane::from_normal(p(0.0, 0.0, 0.0), Vector3::zeros()).is_none());
    }

    #[test]
    fn projection_keeps_in_plane_distances() {
        let plane = Plane::from_normal(p(0.0, 0.0, 1.0), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let a = p(1.0, 0.0, 0.0);
        let b = p(0.0, 1.0, 0.0);
        let (ua, ub) = (plane.project(&a), plane.project(&b));
        assert!(((ua - ub).norm() - (a - b).norm()).abs() < 1e-12);
    }

    #[test]
    fn polygon_plane_follows_winding() {
        let square = [p(0.0, 0.0, 2.0), p(1.0, 0.0, 2.0), p(1.0, 1.0, 2.0), p(0.0, 1.0, 2.0)];
        let plane = Plane::from_polygon(&square).unwrap();
        assert!((plane.normal().z - 1.0).abs() < 1e-12);
        let centre = plane.project(&p(0.5, 0.5, 2.0));
        assert!(centre.coords.norm() < 1e-12);
    }
}
