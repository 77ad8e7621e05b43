//! Camera for ray generation and image-plane projection.

use std::f32::consts::{PI, TAU};

use rt_math::{Ray, UVec2, Vec2, Vec3};

/// Camera placement as delivered by the host scene graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraDescription {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub vertical_fov: f32,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            target: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::Y,
            vertical_fov: 60.0,
        }
    }
}

impl CameraDescription {
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3, vertical_fov: f32) -> Self {
        Self {
            position,
            target,
            up,
            vertical_fov,
        }
    }
}

/// A thin-lens camera bound to an image resolution.
///
/// Pixel coordinates grow right and down from the top-left corner. The image
/// plane sits at `image_plane_distance` in pixel units, so one pixel covers
/// unit area on it.
#[derive(Debug, Clone)]
pub struct Camera {
    origin: Vec3,
    // Camera basis: u right, v up, w backwards
    u: Vec3,
    v: Vec3,
    w: Vec3,
    width: u32,
    height: u32,
    image_plane_distance: f32,
    focus_distance: f32,
    aperture_radius: f32,
    aperture_blades: u32,
}

impl Camera {
    /// Bind a camera description to an image size and lens settings.
    ///
    /// A `focus_distance` of zero focuses on the description's target.
    pub fn new(
        description: &CameraDescription,
        image_size: UVec2,
        aperture_radius: f32,
        aperture_blades: u32,
        focus_distance: f32,
    ) -> Self {
        let forward = description.target - description.position;
        let w = (-forward).try_normalize().unwrap_or(Vec3::Z);
        let u = description
            .up
            .cross(w)
            .try_normalize()
            .unwrap_or_else(|| rt_math::orthonormal_basis(w).0);
        let v = w.cross(u);

        let width = image_size.x.max(1);
        let height = image_size.y.max(1);
        let half_fov = (description.vertical_fov.clamp(1.0, 179.0) * 0.5).to_radians();
        let image_plane_distance = height as f32 * 0.5 / half_fov.tan();

        let focus_distance = if focus_distance > 0.0 {
            focus_distance
        } else {
            forward.length().max(1e-3)
        };

        Self {
            origin: description.position,
            u,
            v,
            w,
            width,
            height,
            image_plane_distance,
            focus_distance,
            aperture_radius,
            aperture_blades,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Unit viewing direction.
    pub fn forward(&self) -> Vec3 {
        -self.w
    }

    pub fn image_size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn image_plane_distance(&self) -> f32 {
        self.image_plane_distance
    }

    /// Generate a primary ray through `pixel`.
    ///
    /// `jitter` is the sub-pixel position in [0,1)^2 and `lens` a sample in
    /// [0,1)^2 used to pick a point on the aperture.
    pub fn get_ray(&self, pixel: UVec2, jitter: Vec2, lens: Vec2) -> Ray {
        let film = Vec2::new(pixel.x as f32 + jitter.x, pixel.y as f32 + jitter.y);
        let dx = film.x - self.width as f32 * 0.5;
        let dy = self.height as f32 * 0.5 - film.y;
        let direction = (self.u * dx + self.v * dy - self.w * self.image_plane_distance).normalize();

        if self.aperture_radius <= 0.0 {
            return Ray::new(self.origin, direction);
        }

        // Thin lens: every ray through this film point meets at the focus plane
        let focus_point = self.origin + direction * (self.focus_distance / direction.dot(-self.w));
        let offset = sample_aperture(lens, self.aperture_blades) * self.aperture_radius;
        let origin = self.origin + self.u * offset.x + self.v * offset.y;
        Ray::new(origin, (focus_point - origin).normalize())
    }

    /// Project a world-space point to normalized device coordinates in
    /// [-1,1]^2. Returns `None` for points behind the camera.
    pub fn project(&self, point: Vec3) -> Option<Vec2> {
        let local = point - self.origin;
        let depth = local.dot(-self.w);
        if depth <= 0.0 {
            return None;
        }
        let scale = self.image_plane_distance / depth;
        let x = local.dot(self.u) * scale / (self.width as f32 * 0.5);
        let y = local.dot(self.v) * scale / (self.height as f32 * 0.5);
        Some(Vec2::new(x, y))
    }

    /// Pixel containing a projected point, or `None` outside the image.
    pub fn ndc_to_pixel(&self, ndc: Vec2) -> Option<UVec2> {
        if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 {
            return None;
        }
        let x = ((ndc.x + 1.0) * 0.5 * self.width as f32) as u32;
        let y = ((1.0 - ndc.y) * 0.5 * self.height as f32) as u32;
        Some(UVec2::new(x.min(self.width - 1), y.min(self.height - 1)))
    }
}

/// Map a unit-square sample onto the aperture, a disk or a regular polygon
/// with `blades` corners.
fn sample_aperture(sample: Vec2, blades: u32) -> Vec2 {
    if blades < 3 {
        let r = sample.x.sqrt();
        let theta = TAU * sample.y;
        return Vec2::new(r * theta.cos(), r * theta.sin());
    }

    // Pick a wedge, then a uniform point in the triangle (center, c0, c1)
    let scaled = sample.x * blades as f32;
    let wedge = (scaled as u32).min(blades - 1);
    let remapped = scaled - wedge as f32;
    let step = TAU / blades as f32;
    let c0 = Vec2::from_angle(wedge as f32 * step + PI * 0.5);
    let c1 = Vec2::from_angle((wedge + 1) as f32 * step + PI * 0.5);

    let (mut a, mut b) = (remapped, sample.y);
    if a + b > 1.0 {
        a = 1.0 - a;
        b = 1.0 - b;
    }
    c0 * a + c1 * b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(width: u32, height: u32) -> Camera {
        let description =
            CameraDescription::look_at(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y, 90.0);
        Camera::new(&description, UVec2::new(width, height), 0.0, 0, 0.0)
    }

    #[test]
    fn test_center_ray_looks_forward() {
        let camera = camera(100, 100);
        let ray = camera.get_ray(UVec2::new(50, 50), Vec2::ZERO, Vec2::ZERO);
        assert!((ray.direction - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_pixel_orientation() {
        let camera = camera(100, 100);
        let top_left = camera.get_ray(UVec2::new(0, 0), Vec2::splat(0.5), Vec2::ZERO);
        assert!(top_left.direction.x < 0.0);
        assert!(top_left.direction.y > 0.0);
    }

    #[test]
    fn test_project_inverts_get_ray() {
        let camera = camera(64, 48);
        let pixel = UVec2::new(10, 37);
        let ray = camera.get_ray(pixel, Vec2::splat(0.5), Vec2::ZERO);
        let ndc = camera.project(ray.at(7.0)).unwrap();
        assert_eq!(camera.ndc_to_pixel(ndc), Some(pixel));
    }

    #[test]
    fn test_project_behind_camera() {
        let camera = camera(64, 48);
        assert!(camera.project(Vec3::new(0.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_thin_lens_converges_at_focus() {
        let description =
            CameraDescription::look_at(Vec3::ZERO, Vec3::new(0.0, 0.0, -4.0), Vec3::Y, 60.0);
        let camera = Camera::new(&description, UVec2::new(32, 32), 0.5, 6, 0.0);
        let pixel = UVec2::new(16, 16);
        let a = camera.get_ray(pixel, Vec2::ZERO, Vec2::new(0.1, 0.2));
        let b = camera.get_ray(pixel, Vec2::ZERO, Vec2::new(0.9, 0.7));
        assert_ne!(a.origin, b.origin);

        // Both rays cross the focus plane z = -4 at the same point
        let pa = a.at((-4.0 - a.origin.z) / a.direction.z);
        let pb = b.at((-4.0 - b.origin.z) / b.direction.z);
        assert!((pa - pb).length() < 1e-4);
    }

    #[test]
    fn test_polygon_aperture_stays_inside_unit_disk() {
        for i in 0..64 {
            for j in 0..64 {
                let s = Vec2::new(i as f32 / 64.0, j as f32 / 64.0);
                assert!(sample_aperture(s, 5).length() <= 1.0 + 1e-5);
                assert!(sample_aperture(s, 0).length() <= 1.0 + 1e-5);
            }
        }
    }
}
