//! Worker thread body.
//!
//! A worker claims regions until the pool runs dry or the render is stopped.
//! Backward workers trace every pixel of their region and hand the finished
//! color to the output callback. Forward workers use the region only as a
//! unit of work: they trace `pixel_count * samples` light paths for it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rt_math::{UVec2, Vec2};

use crate::integrator::forward::{trace_light_path, Film, ForwardBuffer};
use crate::integrator::{tonemap, EvalContext, Integrator};
use crate::material::Color;
use crate::options::{Method, Options};
use crate::progress::RenderProgress;
use crate::region::{Region, RegionQueue};
use crate::renderer::OutputFunction;
use crate::scene::Scene;

/// Pause between claim attempts of a persistent worker facing an empty pool.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// State shared by the controller and every worker of one render.
pub(crate) struct RenderShared {
    pub scene: Arc<Scene>,
    pub options: Options,
    pub integrator: Arc<dyn Integrator>,
    pub queue: RegionQueue,
    /// The full region list, kept for restarts.
    pub regions: Vec<Region>,
    pub progress: RenderProgress,
    pub running: AtomicBool,
    pub active_workers: AtomicUsize,
    pub output: OutputFunction,
    pub forward: Option<ForwardBuffer>,
    pub image_size: UVec2,
}

impl RenderShared {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Next region to work on, or `None` when this worker should exit.
    fn claim(&self) -> Option<Region> {
        while self.is_running() {
            if let Some(region) = self.queue.get_next_region() {
                return Some(region);
            }
            if !self.options.persistent_workers {
                return None;
            }
            thread::sleep(IDLE_POLL);
        }
        None
    }
}

/// Entry point of worker `id`.
pub(crate) fn run(shared: Arc<RenderShared>, id: usize) {
    log::debug!("Worker {id} started");

    match shared.options.method {
        Method::Backward => run_backward(&shared),
        Method::Forward => run_forward(&shared, id),
    }

    // The last worker out reports for the whole render
    if shared.active_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
        let stopped = !shared.is_running();
        log::info!("Render {}", if stopped { "stopped" } else { "finished" });
        shared.progress.report();
    }
    log::debug!("Worker {id} exiting");
}

fn run_backward(shared: &RenderShared) {
    while let Some(region) = shared.claim() {
        let start = Instant::now();
        if !render_region(shared, &region) {
            break;
        }
        let elapsed = start.elapsed();
        shared.progress.record_region(elapsed);
        log::debug!(
            "Region {} ({}x{} at {},{}) took {:.2} ms",
            region.index,
            region.width,
            region.height,
            region.x,
            region.y,
            elapsed.as_secs_f64() * 1000.0
        );
    }
}

/// Render every pixel of `region`. Returns `false` if the render was stopped
/// part way; the interrupted pixel is not written.
fn render_region(shared: &RenderShared, region: &Region) -> bool {
    let options = &shared.options;
    let scene = &*shared.scene;
    let camera = scene.camera();
    let seed = region_seed(options.seed, region.index);
    let mut sampler = options.sampler.build(seed, options.stratified_padding);
    let mut ctx = EvalContext::new(splitmix64(seed), options);
    let mut non_finite = 0_u32;

    for pixel in region.pixels() {
        if !shared.is_running() {
            return false;
        }

        let mut sum = Color::ZERO;
        for index in 0..options.samples {
            if !shared.is_running() {
                return false;
            }
            let sample = sampler.sample(index, options.samples);
            let lens = Vec2::new(ctx.random(), ctx.random());
            let ray = camera.get_ray(pixel, sample.truncate().truncate(), lens);
            ctx.begin_sample(sample);

            let radiance = shared.integrator.evaluate(scene, &ray, &mut ctx);
            if radiance.is_finite() {
                sum += radiance;
            } else {
                non_finite += 1;
            }
        }

        let color = tonemap(sum / options.samples as f32, options.exposure);
        (shared.output)(pixel, color.extend(1.0));
    }

    if non_finite > 0 {
        log::warn!(
            "Region {}: {non_finite} samples produced non-finite radiance and were treated as black",
            region.index
        );
    }
    true
}

fn run_forward(shared: &RenderShared, id: usize) {
    let Some(buffer) = &shared.forward else {
        return;
    };
    let scene = &*shared.scene;
    if scene.emissive_triangles().is_empty() {
        log::error!("Worker {id}: forward tracing needs at least one emissive triangle, nothing to render");
        return;
    }

    let options = &shared.options;
    let flush_interval = u64::from(options.forward_flush_interval);
    let mut film = Film::new(shared.image_size);

    'regions: while let Some(region) = shared.claim() {
        let start = Instant::now();
        let seed = region_seed(options.seed, region.index);
        let mut sampler = options.sampler.build(seed, options.stratified_padding);
        let mut ctx = EvalContext::new(splitmix64(seed), options);
        // Fits: validate() bounds render_region_size^2 * samples
        let paths = region.pixel_count() * options.samples;

        for index in 0..paths {
            if !shared.is_running() {
                break 'regions;
            }
            ctx.begin_sample(sampler.sample(index, paths));
            trace_light_path(scene, &mut ctx, &mut film);
            if film.paths() >= flush_interval {
                buffer.flush(&mut film, options.exposure, &*shared.output);
            }
        }

        shared.progress.record_region(start.elapsed());
    }

    if film.paths() > 0 {
        buffer.flush(&mut film, options.exposure, &*shared.output);
    }
}

/// Seed for the per-region random streams; independent of which worker
/// claims the region.
pub(crate) fn region_seed(seed: u64, index: usize) -> u64 {
    splitmix64(seed ^ splitmix64(index as u64))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_seeds_differ() {
        let seeds: std::collections::HashSet<_> = (0..1000).map(|i| region_seed(0, i)).collect();
        assert_eq!(seeds.len(), 1000);
        assert_ne!(region_seed(0, 3), region_seed(1, 3));
        assert_eq!(region_seed(5, 3), region_seed(5, 3));
    }
}
