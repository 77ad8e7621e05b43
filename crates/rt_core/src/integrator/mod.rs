//! Light transport estimators.
//!
//! An [`Integrator`] turns one camera ray into a radiance estimate. Two ship
//! with the crate: [`SimpleIntegrator`], a diffuse chain composed back to
//! front, and [`BsdfIntegrator`], which adds mirror reflection, refraction
//! with Fresnel and nested dielectrics through an [`IorStack`].
//!
//! The forward method lives in [`forward`]; it splats whole light paths onto
//! the image and does not fit the per-ray trait.

mod bsdf;
pub mod forward;
mod ior;
mod simple;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rt_math::{orthonormal_basis, Ray, Vec2, Vec3, Vec4};

use crate::material::Color;
use crate::options::Options;
use crate::scene::Scene;

pub use bsdf::BsdfIntegrator;
pub use ior::{IorStack, IOR_STACK_CAPACITY};
pub use simple::SimpleIntegrator;

/// Per-ray radiance estimator shared by all workers.
pub trait Integrator: Send + Sync {
    /// Estimate the radiance arriving along `ray`.
    fn evaluate(&self, scene: &Scene, ray: &Ray, ctx: &mut EvalContext) -> Color;
}

impl<F> Integrator for F
where
    F: Fn(&Scene, &Ray, &mut EvalContext) -> Color + Send + Sync,
{
    fn evaluate(&self, scene: &Scene, ray: &Ray, ctx: &mut EvalContext) -> Color {
        self(scene, ray, ctx)
    }
}

/// Mutable per-worker state threaded through an evaluation.
#[derive(Debug)]
pub struct EvalContext {
    rng: StdRng,
    sample: Vec4,
    primary_pending: bool,
    /// Bounces the last evaluation took before terminating.
    pub bounces: u32,
    /// Path vertices an evaluation may visit.
    pub max_depth: u32,
    /// Radiance assumed once `max_depth` is reached.
    pub terminating_color: Color,
    chain: Vec<(Color, Color)>,
}

impl EvalContext {
    pub fn new(seed: u64, options: &Options) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            sample: Vec4::ZERO,
            primary_pending: false,
            bounces: 0,
            max_depth: options.max_depth(),
            terminating_color: options.terminating_color,
            chain: Vec::new(),
        }
    }

    /// Start a new camera sample. The `zw` half of `sample` drives the first
    /// scattering direction.
    pub fn begin_sample(&mut self, sample: Vec4) {
        self.sample = sample;
        self.primary_pending = true;
        self.bounces = 0;
    }

    /// Uniform number in [0,1).
    pub fn random(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Two-dimensional sample for a scattering direction.
    pub fn direction_sample(&mut self) -> Vec2 {
        if std::mem::take(&mut self.primary_pending) {
            return Vec2::new(self.sample.z, self.sample.w);
        }
        Vec2::new(self.rng.gen(), self.rng.gen())
    }
}

/// Largest `f32` below one.
const BELOW_ONE: f32 = 1.0 - f32::EPSILON / 2.0;

/// Exposure tonemap `1 - exp(-exposure * x)`, per channel. Stays in [0, 1)
/// for any finite non-negative input.
pub fn tonemap(color: Color, exposure: f32) -> Color {
    let map = |x: f32| (-(-exposure * x.max(0.0)).exp_m1()).min(BELOW_ONE);
    Color::new(map(color.x), map(color.y), map(color.z))
}

/// Cosine-weighted direction in the hemisphere around `normal`.
pub(crate) fn cosine_hemisphere(normal: Vec3, u: Vec2) -> Vec3 {
    let r = u.x.sqrt();
    let phi = std::f32::consts::TAU * u.y;
    let (t, b) = orthonormal_basis(normal);
    let z = (1.0 - u.x).max(0.0).sqrt();
    (t * (r * phi.cos()) + b * (r * phi.sin()) + normal * z).normalize_or_zero()
}

/// Blend a cosine lobe around `ideal` toward `ideal` by `1 - roughness`.
///
/// Directions that end up on the wrong side of `side` fall back to `ideal`.
pub(crate) fn perturb(ideal: Vec3, roughness: f32, side: Vec3, ctx: &mut EvalContext) -> Vec3 {
    if roughness <= 0.0 {
        return ideal;
    }
    let lobe = cosine_hemisphere(ideal, ctx.direction_sample());
    let direction = (ideal * (1.0 - roughness) + lobe * roughness)
        .try_normalize()
        .unwrap_or(ideal);
    if direction.dot(side) > 0.0 {
        direction
    } else {
        ideal
    }
}

/// Schlick's approximation for light going from index `n1` into `n2`.
/// `cos_incident` is the cosine against the normal on the incident side.
pub(crate) fn fresnel_schlick(cos_incident: f32, n1: f32, n2: f32) -> f32 {
    let r0 = ((n1 - n2) / (n1 + n2)).powi(2);
    let mut cos = cos_incident.clamp(0.0, 1.0);
    if n1 > n2 {
        let sin2_t = (n1 / n2).powi(2) * (1.0 - cos * cos);
        if sin2_t > 1.0 {
            return 1.0;
        }
        cos = (1.0 - sin2_t).sqrt();
    }
    r0 + (1.0 - r0) * (1.0 - cos).powi(5)
}

/// Refract unit `direction` through a surface whose `normal` faces the
/// incoming side. `None` on total internal reflection.
pub(crate) fn refract(direction: Vec3, normal: Vec3, eta: f32) -> Option<Vec3> {
    let cos_i = -direction.dot(normal);
    let k = 1.0 - eta * eta * (1.0 - cos_i * cos_i);
    if k < 0.0 {
        return None;
    }
    Some((direction * eta + normal * (eta * cos_i - k.sqrt())).normalize())
}
