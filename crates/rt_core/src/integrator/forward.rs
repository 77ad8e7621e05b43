//! Forward light tracing.
//!
//! Paths start on emissive triangles and are splatted onto the film at every
//! vertex the camera can see. Workers accumulate into a private film and
//! merge it into a [`ForwardBuffer`] every few thousand paths; the merging
//! worker then publishes the running average through the output callback.
//!
//! The published image is an approximation while the render is in flight:
//! the average is taken over the paths merged so far, so workers that flush
//! at different rates weigh the image toward their own regions of path space.

use std::f32::consts::PI;
use std::sync::{Mutex, PoisonError};

use rt_math::{Ray, UVec2, Vec2, Vec3, Vec4};

use super::bsdf::scatter;
use super::{cosine_hemisphere, tonemap, EvalContext, IorStack};
use crate::material::Color;
use crate::scene::Scene;

/// Film-sized accumulation of splatted light paths.
#[derive(Debug, Clone)]
pub struct Film {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
    paths: u64,
}

impl Film {
    pub fn new(size: UVec2) -> Self {
        Self {
            width: size.x,
            height: size.y,
            pixels: vec![Color::ZERO; size.x as usize * size.y as usize],
            paths: 0,
        }
    }

    pub fn paths(&self) -> u64 {
        self.paths
    }

    pub fn pixel(&self, pixel: UVec2) -> Color {
        self.pixels[(pixel.y * self.width + pixel.x) as usize]
    }

    fn add(&mut self, pixel: UVec2, value: Color) {
        self.pixels[(pixel.y * self.width + pixel.x) as usize] += value;
    }

    fn clear(&mut self) {
        self.pixels.fill(Color::ZERO);
        self.paths = 0;
    }
}

/// Film shared by every forward worker of one render.
#[derive(Debug)]
pub struct ForwardBuffer {
    film: Mutex<Film>,
}

impl ForwardBuffer {
    pub fn new(size: UVec2) -> Self {
        Self {
            film: Mutex::new(Film::new(size)),
        }
    }

    /// Total paths merged so far.
    pub fn paths(&self) -> u64 {
        self.film.lock().unwrap_or_else(PoisonError::into_inner).paths
    }

    /// Merge `local` into the shared film, clear it, and publish the running
    /// average of every pixel through `output` before releasing the lock.
    pub fn flush(&self, local: &mut Film, exposure: f32, output: &(dyn Fn(UVec2, Vec4) + Send + Sync)) {
        let mut film = self.film.lock().unwrap_or_else(PoisonError::into_inner);
        for (shared, &value) in film.pixels.iter_mut().zip(&local.pixels) {
            *shared += value;
        }
        film.paths += local.paths;
        local.clear();

        if film.paths == 0 {
            return;
        }
        let scale = 1.0 / film.paths as f32;
        for y in 0..film.height {
            for x in 0..film.width {
                let pixel = UVec2::new(x, y);
                let color = tonemap(film.pixel(pixel) * scale, exposure);
                output(pixel, color.extend(1.0));
            }
        }
    }
}

/// Trace one light path and splat what the camera sees of it into `film`.
///
/// Returns `false` without tracing when the scene has no emissive triangles.
/// Each splat is an unbiased estimate of the pixel's radiance once divided by
/// the number of paths traced.
pub fn trace_light_path(scene: &Scene, ctx: &mut EvalContext, film: &mut Film) -> bool {
    let lights = scene.emissive_triangles();
    if lights.is_empty() {
        return false;
    }
    film.paths += 1;

    let pick = ((ctx.random() * lights.len() as f32) as usize).min(lights.len() - 1);
    let triangle = scene.triangles()[lights[pick]];
    let (origin, _) = triangle.sample_point(Vec2::new(ctx.random(), ctx.random()));
    let normal = triangle.face_normal();
    let emitted = scene.material(triangle.material).emissive;

    // Inverse of the light pick and the area pdfs
    let area_scale = triangle.area() * lights.len() as f32;
    splat(scene, origin, normal, emitted * area_scale, film);

    // The cosine of the emission direction cancels against its pdf
    let mut throughput = emitted * area_scale * PI;
    let direction = cosine_hemisphere(normal, ctx.direction_sample());
    let mut ray = Ray::spawn(origin, normal, direction);
    let mut ior_stack = IorStack::new();

    for _ in 0..ctx.max_depth {
        let Some(hit) = scene.find_nearest_intersection(&ray) else {
            break;
        };
        let material = *scene.material(hit.material);
        if material.is_emissive() || scene.objects()[hit.object].is_light() {
            break;
        }

        if !material.is_refractive() && material.diffuse.max_element() > 0.0 {
            let facing = if ray.direction.dot(hit.normal) > 0.0 {
                -hit.normal
            } else {
                hit.normal
            };
            splat(scene, hit.point, facing, throughput * material.diffuse / PI, film);
        }

        let scattered = scatter(&material, ray.direction, hit.normal, &mut ior_stack, ctx);
        throughput *= scattered.weight;
        if throughput.max_element() <= 0.0 {
            break;
        }
        ray = Ray::spawn(hit.point, scattered.side, scattered.direction);
    }

    true
}

/// Connect a path vertex to the pinhole at the camera origin.
fn splat(scene: &Scene, point: Vec3, normal: Vec3, value: Color, film: &mut Film) {
    let camera = scene.camera();
    let to_camera = camera.origin() - point;
    let distance_sq = to_camera.length_squared();
    if distance_sq <= 0.0 {
        return;
    }
    let to_camera = to_camera / distance_sq.sqrt();

    let cos_surface = normal.dot(to_camera);
    if cos_surface <= 0.0 {
        return;
    }
    let Some(pixel) = camera.project(point).and_then(|ndc| camera.ndc_to_pixel(ndc)) else {
        return;
    };
    // The camera ray must reach the vertex unobstructed
    if scene.is_occluded(camera.origin(), point) {
        return;
    }

    // Convert the solid-angle sample to the pixel's importance
    let v_dot_d = (-to_camera).dot(camera.forward());
    let plane_distance = camera.image_plane_distance();
    let importance = plane_distance * plane_distance / (v_dot_d.powi(3) * distance_sq);
    film.add(pixel, value * cos_surface * importance);
}
