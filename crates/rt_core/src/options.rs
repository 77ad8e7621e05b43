//! Render configuration.

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::material::Color;
use crate::region::ClaimOrder;
use crate::sampler::SamplerKind;

/// Light transport direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Camera-to-light path tracing, one region per claim.
    #[default]
    Backward,
    /// Light-to-camera tracing into a shared accumulation buffer.
    Forward,
}

/// Triangle intersection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accelerator {
    /// Test every object, rejecting meshes by their bounding box first.
    Linear,
    /// Route triangle queries through a SAH KD-tree.
    #[default]
    KdTree,
}

/// Render options, read once at the start of [`Renderer::perform`].
///
/// [`Renderer::perform`]: crate::Renderer::perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Camera rays per pixel (or light paths per pixel for the forward method).
    pub samples: u32,
    /// Scattering events after the primary hit.
    pub bounces: u32,
    /// Scale applied before the `1 - exp(-exposure * x)` tonemap.
    pub exposure: f32,
    /// Lens radius in world units. Zero renders a pinhole camera.
    pub aperture_size: f32,
    /// Number of aperture blades. Below three the aperture is circular.
    pub aperture_blades: u32,
    /// Distance to the plane of perfect focus. Zero focuses on the camera target.
    pub focus_distance: f32,
    /// Edge length of the square render regions in pixels.
    pub render_region_size: u32,
    /// Worker thread count. Zero uses the available hardware parallelism.
    pub threads: usize,
    pub method: Method,
    pub sampler: SamplerKind,
    /// Fraction of each stratum left unused on every side by the stratified sampler.
    pub stratified_padding: f32,
    /// Radiance returned when a path runs out of bounces.
    pub terminating_color: Color,
    pub claim_order: ClaimOrder,
    /// Estimate the cost of every region before dispatch and render the expensive ones first.
    pub estimate_regions_order: bool,
    /// Keep workers polling for regions until stopped instead of exiting when
    /// the pool runs dry. Used for progressive re-rendering with `restart`.
    pub persistent_workers: bool,
    pub accelerator: Accelerator,
    pub seed: u64,
    /// Light paths a forward-tracing worker traces between flushes.
    pub forward_flush_interval: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            samples: 16,
            bounces: 8,
            exposure: 1.0,
            aperture_size: 0.0,
            aperture_blades: 0,
            focus_distance: 0.0,
            render_region_size: 32,
            threads: 0,
            method: Method::Backward,
            sampler: SamplerKind::Stratified,
            stratified_padding: 0.1,
            terminating_color: Color::ZERO,
            claim_order: ClaimOrder::Sequential,
            estimate_regions_order: false,
            persistent_workers: false,
            accelerator: Accelerator::KdTree,
            seed: 0,
            forward_flush_interval: 4096,
        }
    }
}

impl Options {
    /// Reject settings the renderer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.render_region_size == 0 {
            return Err(RenderError::config("render_region_size must be greater than zero"));
        }
        if self.samples == 0 {
            return Err(RenderError::config("samples must be greater than zero"));
        }
        let region_samples = u128::from(self.render_region_size).pow(2) * u128::from(self.samples);
        if region_samples > u128::from(u32::MAX) {
            return Err(RenderError::config(format!(
                "render_region_size^2 * samples must fit in 32 bits, got {region_samples}"
            )));
        }
        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            return Err(RenderError::config(format!(
                "exposure must be positive and finite, got {}",
                self.exposure
            )));
        }
        if !(0.0..0.5).contains(&self.stratified_padding) {
            return Err(RenderError::config(format!(
                "stratified_padding must be in [0, 0.5), got {}",
                self.stratified_padding
            )));
        }
        if self.aperture_size < 0.0 {
            return Err(RenderError::config("aperture_size must not be negative"));
        }
        if self.method == Method::Forward && self.forward_flush_interval == 0 {
            return Err(RenderError::config("forward_flush_interval must be greater than zero"));
        }
        Ok(())
    }

    /// Number of worker threads to spawn.
    pub fn thread_count(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Path vertices an estimator may visit: the primary hit plus `bounces`.
    pub fn max_depth(&self) -> u32 {
        self.bounces.saturating_add(1)
    }
}
