use crate::{Interval, Ray, Vec3};

/// Axis-Aligned Bounding Box used for mesh rejection and KD-tree construction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An empty box; growing it by any point yields that point.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an AABB from two corner points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Bounding box of a set of points.
    pub fn enclosing(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| acc.grow(p))
    }

    /// Box extended to contain `p`.
    pub fn grow(&self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(a: &Aabb, b: &Aabb) -> Self {
        Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn diagonal(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.diagonal();
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    /// Returns the index (0=X, 1=Y, 2=Z) of the axis with the longest extent.
    pub fn longest_axis(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Slab test. Returns the parametric overlap of the ray with the box,
    /// clipped to `ray_t`, or `None` if they do not overlap.
    pub fn intersect(&self, r: &Ray, ray_t: Interval) -> Option<(f32, f32)> {
        let mut t_min = ray_t.min;
        let mut t_max = ray_t.max;

        for axis in 0..3 {
            let inv_d = 1.0 / r.direction[axis];
            let mut t0 = (self.min[axis] - r.origin[axis]) * inv_d;
            let mut t1 = (self.max[axis] - r.origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            // NaN from 0 * inf keeps the previous bound
            if t0 > t_min {
                t_min = t0;
            }
            if t1 < t_max {
                t_max = t1;
            }
            if t_max < t_min {
                return None;
            }
        }

        Some((t_min, t_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_aabb_surrounding() {
        let box1 = Aabb::from_points(Vec3::ZERO, Vec3::splat(5.0));
        let box2 = Aabb::from_points(Vec3::splat(3.0), Vec3::splat(10.0));
        let surrounding = Aabb::surrounding(&box1, &box2);

        assert_eq!(surrounding.min, Vec3::ZERO);
        assert_eq!(surrounding.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_aabb_intersect() {
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        let range = Interval::new(0.0, 100.0);

        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let (t0, t1) = aabb.intersect(&ray, range).unwrap();
        assert!((t0 - 4.0).abs() < 1e-5);
        assert!((t1 - 6.0).abs() < 1e-5);

        // Ray pointing away
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), -Vec3::Z);
        assert!(aabb.intersect(&ray, range).is_none());

        // Ray missing the box
        let ray = Ray::new(Vec3::new(10.0, 0.0, 0.0), Vec3::Z);
        assert!(aabb.intersect(&ray, range).is_none());
    }

    #[test]
    fn test_aabb_flat_box_is_hit() {
        // A planar quad has zero extent along Y
        let aabb = Aabb::from_points(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.0, 1.0));
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y);
        assert!(aabb.intersect(&ray, Interval::new(0.0, 100.0)).is_some());
    }

    #[test]
    fn test_aabb_surface_area_and_axis() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.surface_area(), 22.0);
        assert_eq!(aabb.longest_axis(), 2);
        assert_eq!(Aabb::EMPTY.surface_area(), 0.0);
    }

    #[test]
    fn test_aabb_centroid() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::splat(10.0));
        assert_eq!(aabb.centroid(), Vec3::splat(5.0));
    }
}
