//! Surface materials.

use rt_math::Vec3;

/// Color type alias (linear RGB, typically 0-1 for reflectances)
pub type Color = Vec3;

/// A surface description shared by index between scene objects.
///
/// `roughness` blends between a perfect mirror (or perfect refraction for
/// dielectrics) at 0 and a fully Lambertian surface at 1. A
/// `refractive_index` of 0 marks an opaque material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneMaterial {
    pub diffuse: Color,
    pub reflective: Color,
    pub emissive: Color,
    pub roughness: f32,
    pub refractive_index: f32,
}

impl Default for SceneMaterial {
    fn default() -> Self {
        Self {
            diffuse: Color::splat(0.5),
            reflective: Color::ZERO,
            emissive: Color::ZERO,
            roughness: 1.0,
            refractive_index: 0.0,
        }
    }
}

impl SceneMaterial {
    /// Lambertian surface.
    pub fn diffuse(color: Color) -> Self {
        Self {
            diffuse: color,
            ..Default::default()
        }
    }

    /// Opaque reflector. Roughness 0 is a perfect mirror.
    pub fn mirror(color: Color, roughness: f32) -> Self {
        Self {
            diffuse: Color::ZERO,
            reflective: color,
            roughness: roughness.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Clear dielectric with the given index of refraction.
    pub fn glass(refractive_index: f32) -> Self {
        Self {
            diffuse: Color::ONE,
            reflective: Color::ONE,
            roughness: 0.0,
            refractive_index,
            ..Default::default()
        }
    }

    /// Light emitter that absorbs everything it receives.
    pub fn emissive(color: Color) -> Self {
        Self {
            diffuse: Color::ZERO,
            emissive: color,
            ..Default::default()
        }
    }

    /// Material assigned to geometry that arrives without one.
    pub fn missing() -> Self {
        Self::diffuse(Color::new(0.8, 0.0, 0.8))
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_emissive(mut self, emissive: Color) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive.max_element() > 0.0
    }

    pub fn is_refractive(&self) -> bool {
        self.refractive_index > 0.0
    }
}
