use crate::{Vec3, RAY_EPSILON};

/// A ray in 3D space with an origin and a direction.
///
/// The direction is not required to be normalized, but every ray the
/// tracer spawns for shading carries a unit direction so that `t` is a
/// distance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Create a ray leaving a surface point, nudged along `normal` to the side
    /// the direction points to so it does not re-hit the surface it left.
    #[inline]
    pub fn spawn(point: Vec3, normal: Vec3, direction: Vec3) -> Self {
        let side = if direction.dot(normal) >= 0.0 { normal } else { -normal };
        Self::new(point + side * RAY_EPSILON, direction)
    }

    /// Get the origin point of the ray.
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Get the direction vector of the ray.
    #[inline]
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Get the point along the ray at parameter t.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::Z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(1.0), Vec3::X);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_spawn_offsets_to_direction_side() {
        let above = Ray::spawn(Vec3::ZERO, Vec3::Y, Vec3::new(0.0, 1.0, 1.0));
        assert!(above.origin.y > 0.0);

        let below = Ray::spawn(Vec3::ZERO, Vec3::Y, Vec3::new(0.0, -1.0, 1.0));
        assert!(below.origin.y < 0.0);
    }
}
