//! Render controller.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rt_math::{UVec2, Vec2, Vec4};

use crate::error::{RenderError, Result};
use crate::integrator::forward::ForwardBuffer;
use crate::integrator::{BsdfIntegrator, EvalContext, Integrator};
use crate::material::Color;
use crate::options::{Method, Options};
use crate::progress::{ProgressSnapshot, RenderProgress};
use crate::region::{estimate_regions_order, generate_regions, RegionQueue};
use crate::scene::{Scene, SceneDescription};
use crate::worker::{self, region_seed, RenderShared};

/// Destination for finished pixels: `(pixel, rgba)` with tonemapped color.
///
/// Called concurrently from worker threads. The backward method never calls
/// it twice at once for the same pixel.
pub type OutputFunction = Arc<dyn Fn(UVec2, Vec4) + Send + Sync>;

struct Session {
    shared: Arc<RenderShared>,
    handles: Vec<JoinHandle<()>>,
}

impl Session {
    fn is_active(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }
}

/// Owns the scene, the worker threads and the progress counters of a render.
pub struct Renderer {
    options: Options,
    integrator: Arc<dyn Integrator>,
    scene: Option<Arc<Scene>>,
    session: Option<Session>,
    last_progress: Option<ProgressSnapshot>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Renderer {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            integrator: Arc::new(BsdfIntegrator),
            scene: None,
            session: None,
            last_progress: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Options apply from the next [`perform`](Self::perform) on.
    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    /// Replace the estimator used by the backward method.
    pub fn set_integrator(&mut self, integrator: Arc<dyn Integrator>) {
        self.integrator = integrator;
    }

    /// Scene built by the last successful `perform`.
    pub fn scene(&self) -> Option<&Arc<Scene>> {
        self.scene.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_active)
    }

    /// Build the scene and start rendering on the worker pool.
    ///
    /// Returns once the workers are running; pixels arrive through `output`.
    /// Fails with [`RenderError::AlreadyRunning`] while a previous render is
    /// still in flight.
    pub fn perform(&mut self, description: &SceneDescription, image_size: UVec2, output: OutputFunction) -> Result<()> {
        if self.is_running() {
            return Err(RenderError::AlreadyRunning);
        }
        // Reap a finished render before starting the next
        self.wait_for_completion();

        self.options.validate()?;
        if image_size.x == 0 || image_size.y == 0 {
            return Err(RenderError::config(format!(
                "image size must be non-zero, got {}x{}",
                image_size.x, image_size.y
            )));
        }
        if description.is_empty() {
            return Err(RenderError::config("scene has nothing to render"));
        }

        let options = self.options.clone();
        let scene = Arc::new(Scene::build(description, image_size, &options)?);
        self.scene = Some(Arc::clone(&scene));

        let mut regions = generate_regions(image_size.x, image_size.y, options.render_region_size);
        if options.estimate_regions_order && options.method == Method::Backward {
            estimate_regions_order(&mut regions, &scene, &*self.integrator, &options);
        }

        let thread_count = options.thread_count();
        log::info!(
            "Rendering {}x{} ({:?}): {} regions, {} samples, {} bounces, {} threads",
            image_size.x,
            image_size.y,
            options.method,
            regions.len(),
            options.samples,
            options.bounces,
            thread_count
        );

        let shared = Arc::new(RenderShared {
            scene,
            integrator: Arc::clone(&self.integrator),
            queue: RegionQueue::new(regions.clone(), options.claim_order, options.seed),
            progress: RenderProgress::new(regions.len()),
            regions,
            running: AtomicBool::new(true),
            active_workers: AtomicUsize::new(thread_count),
            output,
            forward: (options.method == Method::Forward).then(|| ForwardBuffer::new(image_size)),
            image_size,
            options,
        });

        let mut handles = Vec::with_capacity(thread_count);
        for id in 0..thread_count {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("rt-worker-{id}"))
                .spawn(move || worker::run(worker_shared, id));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    log::error!("Failed to spawn worker {id}: {e}");
                    shared.running.store(false, Ordering::Release);
                    shared
                        .active_workers
                        .fetch_sub(thread_count - handles.len(), Ordering::AcqRel);
                    self.session = Some(Session { shared, handles });
                    self.wait_for_completion();
                    return Err(RenderError::ThreadSpawn(e));
                }
            }
        }

        self.session = Some(Session { shared, handles });
        Ok(())
    }

    /// Ask the workers to stop and wait for them. Pixels already delivered
    /// stay delivered.
    pub fn stop(&mut self) {
        if let Some(session) = &self.session {
            session.shared.running.store(false, Ordering::Release);
        }
        self.wait_for_completion();
    }

    /// Block until every worker of the current render has exited.
    pub fn wait_for_completion(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        for handle in session.handles {
            let name = handle.thread().name().unwrap_or("rt-worker").to_string();
            if handle.join().is_err() {
                log::error!("Worker thread {name} panicked");
            }
        }
        self.last_progress = Some(session.shared.progress.snapshot());
    }

    /// Start over on every region of a persistent render, keeping the scene
    /// and the worker threads.
    pub fn restart(&self) -> Result<()> {
        let session = self.session.as_ref().ok_or(RenderError::NoScene)?;
        let shared = &session.shared;
        if !shared.options.persistent_workers {
            return Err(RenderError::config("restart requires persistent_workers"));
        }
        shared.queue.refill(shared.regions.clone());
        shared.progress.add_total(shared.regions.len());
        log::debug!("Restarted render with {} regions", shared.regions.len());
        Ok(())
    }

    /// Counters of the current render, or of the last one once it is reaped.
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        match &self.session {
            Some(session) => Some(session.shared.progress.snapshot()),
            None => self.last_progress,
        }
    }

    /// Log a progress line for the current render.
    pub fn report_progress(&self) {
        match &self.session {
            Some(session) => session.shared.progress.report(),
            None => log::info!("No render in progress"),
        }
    }

    /// Evaluate a single sample through the center of `pixel` on the calling
    /// thread and return its radiance before tonemapping.
    pub fn perform_at_point(&self, pixel: UVec2) -> Result<Color> {
        let scene = self.scene.as_ref().ok_or(RenderError::NoScene)?;
        let size = scene.camera().image_size();
        if pixel.x >= size.x || pixel.y >= size.y {
            return Err(RenderError::config(format!(
                "pixel {},{} is outside the {}x{} image",
                pixel.x, pixel.y, size.x, size.y
            )));
        }

        let index = pixel.y as usize * size.x as usize + pixel.x as usize;
        let mut ctx = EvalContext::new(region_seed(self.options.seed, index), &self.options);
        let lens = Vec2::new(ctx.random(), ctx.random());
        let ray = scene.camera().get_ray(pixel, Vec2::splat(0.5), lens);
        let direction = ctx.direction_sample();
        ctx.begin_sample(Vec4::new(0.5, 0.5, direction.x, direction.y));

        let radiance = self.integrator.evaluate(scene, &ray, &mut ctx);
        Ok(if radiance.is_finite() { radiance } else { Color::ZERO })
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.stop();
    }
}
