//! Math types shared by the rt path tracer.
//!
//! Re-exports glam and adds the ray, interval, bounding box and
//! intersection primitives the tracer is built on.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod ray;

pub mod intersect;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;

/// Offset used to push secondary ray origins off the surface they start on.
pub const RAY_EPSILON: f32 = 1e-4;

/// Build an orthonormal basis `(tangent, bitangent)` around a unit vector.
///
/// Branchless construction from Duff et al., "Building an Orthonormal Basis,
/// Revisited".
#[inline]
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let sign = 1.0_f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    let tangent = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bitangent = Vec3::new(b, sign + n.y * n.y * a, -n.y);
    (tangent, bitangent)
}

/// Reflect `v` about the normal `n`.
#[inline]
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthonormal_basis() {
        for n in [Vec3::X, Vec3::Y, Vec3::Z, -Vec3::Z, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let (t, b) = orthonormal_basis(n);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reflect() {
        let v = Vec3::new(1.0, -1.0, 0.0);
        assert_eq!(reflect(v, Vec3::Y), Vec3::new(1.0, 1.0, 0.0));
    }
}
