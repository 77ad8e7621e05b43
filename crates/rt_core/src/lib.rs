//! rt - multi-threaded CPU path tracer core.
//!
//! Builds a flat, read-only [`Scene`] from an external [`SceneDescription`],
//! splits the image into [`Region`]s and renders them on a fixed pool of
//! worker threads. Finished pixels are pushed to a caller supplied
//! [`OutputFunction`]; the renderer never owns the destination image.
//!
//! ```ignore
//! use rt_core::{Options, Renderer, SceneDescription};
//!
//! let mut renderer = Renderer::new(Options::default());
//! renderer.perform(&description, UVec2::new(640, 480), output)?;
//! renderer.wait_for_completion();
//! ```

mod camera;
mod environment;
mod error;
mod kd_tree;
mod material;
mod options;
mod progress;
mod region;
mod renderer;
mod sampler;
mod scene;
mod worker;

pub mod integrator;

pub use camera::{Camera, CameraDescription};
pub use environment::EnvironmentMap;
pub use error::{RenderError, Result};
pub use integrator::{
    tonemap, BsdfIntegrator, EvalContext, Integrator, IorStack, SimpleIntegrator,
};
pub use kd_tree::{KdTree, TraverseResult};
pub use material::{Color, SceneMaterial};
pub use options::{Accelerator, Method, Options};
pub use progress::{ProgressSnapshot, RenderProgress};
pub use region::{estimate_regions_order, generate_regions, ClaimOrder, Region, RegionQueue};
pub use renderer::{OutputFunction, Renderer};
pub use sampler::{Sampler, SamplerKind};
pub use scene::{
    Intersection, LightDescription, PlaneDescription, Renderable, Scene, SceneDescription,
    SceneObject, SceneTriangle, SphereDescription,
};

/// Re-export the math types callers need to describe scenes.
pub use rt_math::{Mat4, Ray, UVec2, Vec2, Vec3, Vec4};
