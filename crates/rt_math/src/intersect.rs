//! Stateless ray intersection tests.
//!
//! Every test takes the admissible parameter range as an [`Interval`] and
//! only reports hits strictly inside it, so a caller hunting for the nearest
//! hit shrinks `ray_t.max` as it goes.

use crate::{Aabb, Interval, Ray, Vec2, Vec3};

/// Determinant threshold below which a ray is treated as parallel to a triangle.
const PARALLEL_EPSILON: f32 = 1e-9;

/// Result of a ray-triangle test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Ray parameter of the hit.
    pub t: f32,
    /// Barycentric weights of the second and third vertex.
    pub barycentric: Vec2,
}

/// Slab test against a box. Used to reject whole meshes before their
/// triangles are visited.
#[inline]
pub fn ray_aabb(ray: &Ray, aabb: &Aabb, ray_t: Interval) -> bool {
    aabb.intersect(ray, ray_t).is_some()
}

/// Two-sided Möller-Trumbore ray-triangle intersection.
pub fn ray_triangle(ray: &Ray, p0: Vec3, p1: Vec3, p2: Vec3, ray_t: Interval) -> Option<TriangleHit> {
    let edge1 = p1 - p0;
    let edge2 = p2 - p0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Both faces count, so only the magnitude matters
    if a.abs() < PARALLEL_EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - p0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    if !ray_t.surrounds(t) {
        return None;
    }

    Some(TriangleHit {
        t,
        barycentric: Vec2::new(u, v),
    })
}

/// Closed-form ray-sphere intersection. Returns the nearest root inside `ray_t`.
pub fn ray_sphere(ray: &Ray, center: Vec3, radius: f32, ray_t: Interval) -> Option<f32> {
    let oc = center - ray.origin;
    let a = ray.direction.length_squared();
    let h = ray.direction.dot(oc);
    let c = oc.length_squared() - radius * radius;

    let discriminant = h * h - a * c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrtd = discriminant.sqrt();

    // Find the nearest root in the acceptable range
    let root = (h - sqrtd) / a;
    if ray_t.surrounds(root) {
        return Some(root);
    }
    let root = (h + sqrtd) / a;
    if ray_t.surrounds(root) {
        return Some(root);
    }
    None
}

/// Ray against the plane `dot(normal, p) == offset`.
pub fn ray_plane(ray: &Ray, normal: Vec3, offset: f32, ray_t: Interval) -> Option<f32> {
    let denom = normal.dot(ray.direction);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let t = (offset - normal.dot(ray.origin)) / denom;
    ray_t.surrounds(t).then_some(t)
}

/// Interpolate per-vertex attributes with barycentric weights `(u, v)` of the
/// second and third vertex.
#[inline]
pub fn interpolate(a: Vec3, b: Vec3, c: Vec3, barycentric: Vec2) -> Vec3 {
    let w = 1.0 - barycentric.x - barycentric.y;
    a * w + b * barycentric.x + c * barycentric.y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_triangle() -> (Vec3, Vec3, Vec3) {
        (
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(0.0, 1.0, -1.0),
        )
    }

    #[test]
    fn test_triangle_hit() {
        let (a, b, c) = quad_triangle();
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = ray_triangle(&ray, a, b, c, Interval::FORWARD).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_triangle_is_two_sided() {
        let (a, b, c) = quad_triangle();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        let hit = ray_triangle(&ray, a, b, c, Interval::FORWARD).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_triangle_miss() {
        let (a, b, c) = quad_triangle();

        // Pointing away
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(ray_triangle(&ray, a, b, c, Interval::FORWARD).is_none());

        // Passing beside
        let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), -Vec3::Z);
        assert!(ray_triangle(&ray, a, b, c, Interval::FORWARD).is_none());
    }

    #[test]
    fn test_triangle_barycentric_interpolation() {
        let (a, b, c) = quad_triangle();
        let ray = Ray::new(Vec3::new(0.0, 0.0, 0.0), -Vec3::Z);
        let hit = ray_triangle(&ray, a, b, c, Interval::FORWARD).unwrap();
        let p = interpolate(a, b, c, hit.barycentric);
        assert!((p - ray.at(hit.t)).length() < 1e-5);
    }

    #[test]
    fn test_sphere_nearest_root() {
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let t = ray_sphere(&ray, Vec3::new(0.0, 0.0, -3.0), 1.0, Interval::FORWARD).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_from_inside_returns_far_root() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let t = ray_sphere(&ray, Vec3::ZERO, 2.0, Interval::FORWARD).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_behind_origin_is_ignored() {
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(ray_sphere(&ray, Vec3::new(0.0, 0.0, -3.0), 1.0, Interval::FORWARD).is_none());
    }

    #[test]
    fn test_plane() {
        let ray = Ray::new(Vec3::new(0.0, 4.0, 0.0), -Vec3::Y);
        let t = ray_plane(&ray, Vec3::Y, 1.0, Interval::FORWARD).unwrap();
        assert!((t - 3.0).abs() < 1e-5);

        let parallel = Ray::new(Vec3::new(0.0, 4.0, 0.0), Vec3::X);
        assert!(ray_plane(&parallel, Vec3::Y, 1.0, Interval::FORWARD).is_none());
    }

    #[test]
    fn test_aabb_guard() {
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(ray_aabb(&Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z), &aabb, Interval::FORWARD));
        assert!(!ray_aabb(&Ray::new(Vec3::new(0.0, 3.0, 5.0), -Vec3::Z), &aabb, Interval::FORWARD));
    }
}
