//! Equirectangular environment maps.

use std::f32::consts::{PI, TAU};
use std::path::Path;

use rt_math::Vec3;

use crate::error::Result;
use crate::material::Color;

/// A latitude-longitude radiance map sampled with bilinear filtering.
///
/// The map's top row looks along +Y, the horizontal center looks along -Z.
#[derive(Debug, Clone)]
pub struct EnvironmentMap {
    width: u32,
    height: u32,
    texels: Vec<Color>,
}

impl EnvironmentMap {
    /// Build from row-major texels. Returns `None` if the sizes disagree.
    pub fn new(width: u32, height: u32, texels: Vec<Color>) -> Option<Self> {
        if width == 0 || height == 0 || texels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            texels,
        })
    }

    /// Build from a floating-point RGB image.
    pub fn from_rgb32f(image: &image::Rgb32FImage) -> Option<Self> {
        let texels = image
            .pixels()
            .map(|p| Color::new(p[0], p[1], p[2]))
            .collect();
        Self::new(image.width(), image.height(), texels)
    }

    /// Load any format the `image` crate understands (HDR, EXR, PNG, ...).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let image = image::open(path.as_ref())?.into_rgb32f();
        Self::from_rgb32f(&image).ok_or_else(|| {
            crate::RenderError::config(format!(
                "environment map {} is empty",
                path.as_ref().display()
            ))
        })
    }

    /// Radiance arriving from `direction`.
    pub fn sample(&self, direction: Vec3) -> Color {
        let d = direction.try_normalize().unwrap_or(Vec3::Y);
        let u = 0.5 + d.x.atan2(-d.z) / TAU;
        let v = d.y.clamp(-1.0, 1.0).acos() / PI;

        // Texel centers sit at half-integer coordinates
        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let c00 = self.texel(x0 as i64, y0 as i64);
        let c10 = self.texel(x0 as i64 + 1, y0 as i64);
        let c01 = self.texel(x0 as i64, y0 as i64 + 1);
        let c11 = self.texel(x0 as i64 + 1, y0 as i64 + 1);

        c00.lerp(c10, fx).lerp(c01.lerp(c11, fx), fy)
    }

    /// Texel lookup wrapping horizontally and clamping vertically.
    fn texel(&self, x: i64, y: i64) -> Color {
        let x = x.rem_euclid(self.width as i64) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texels[y * self.width as usize + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mismatch_rejected() {
        assert!(EnvironmentMap::new(2, 2, vec![Color::ONE; 3]).is_none());
        assert!(EnvironmentMap::new(0, 0, vec![]).is_none());
    }

    #[test]
    fn test_constant_map() {
        let map = EnvironmentMap::new(8, 4, vec![Color::new(0.1, 0.2, 0.3); 32]).unwrap();
        for d in [Vec3::X, Vec3::Y, -Vec3::Y, Vec3::new(1.0, -2.0, 0.5)] {
            assert!((map.sample(d) - Color::new(0.1, 0.2, 0.3)).length() < 1e-6);
        }
    }

    #[test]
    fn test_sky_and_ground() {
        // Top row bright, bottom row dark
        let mut texels = vec![Color::ONE; 4];
        texels.extend(vec![Color::ZERO; 4]);
        let map = EnvironmentMap::new(4, 2, texels).unwrap();
        assert!(map.sample(Vec3::Y).x > 0.99);
        assert!(map.sample(-Vec3::Y).x < 0.01);
        // The horizon blends both rows
        let horizon = map.sample(Vec3::X).x;
        assert!(horizon > 0.4 && horizon < 0.6);
    }
}
