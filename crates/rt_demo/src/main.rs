//! Command-line driver: renders a small closed room to a PNG.
//!
//! Usage: `rt_demo [options.json] [output.png]`

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rt_core::{
    CameraDescription, Color, Options, OutputFunction, Renderable, Renderer, SceneDescription,
    SceneMaterial, UVec2, Vec3, Vec4,
};

const IMAGE_SIZE: UVec2 = UVec2::new(320, 240);

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let options = match args.next() {
        Some(path) => load_options(&path)?,
        None => Options::default(),
    };
    let output_path = PathBuf::from(args.next().unwrap_or_else(|| "render.png".to_string()));

    let description = room();
    let pixels: Arc<Vec<AtomicU32>> = Arc::new(
        (0..IMAGE_SIZE.x * IMAGE_SIZE.y)
            .map(|_| AtomicU32::new(0))
            .collect(),
    );
    let sink = Arc::clone(&pixels);
    let output: OutputFunction = Arc::new(move |pixel: UVec2, color: Vec4| {
        let index = (pixel.y * IMAGE_SIZE.x + pixel.x) as usize;
        if let Some(slot) = sink.get(index) {
            slot.store(pack_rgba(color), Ordering::Relaxed);
        }
    });

    let start = Instant::now();
    let mut renderer = Renderer::new(options);
    renderer.perform(&description, IMAGE_SIZE, output)?;
    finish_one_pass(&mut renderer, Duration::from_secs(1));
    log::info!("Rendered in {:.2}s", start.elapsed().as_secs_f64());

    let raw: Vec<u8> = pixels
        .iter()
        .flat_map(|p| p.load(Ordering::Relaxed).to_le_bytes())
        .collect();
    let image = image::RgbaImage::from_raw(IMAGE_SIZE.x, IMAGE_SIZE.y, raw)
        .context("pixel buffer does not match image size")?;
    image
        .save(&output_path)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    log::info!("Saved {}", output_path.display());
    Ok(())
}

/// Wait until every region has been rendered once, reporting progress every
/// `poll`, then stop. Persistent workers would otherwise idle forever.
fn finish_one_pass(renderer: &mut Renderer, poll: Duration) {
    while renderer.is_running() {
        std::thread::sleep(poll);
        renderer.report_progress();
        if renderer
            .progress()
            .is_some_and(|p| p.processed_regions >= p.total_regions)
        {
            break;
        }
    }
    renderer.stop();
}

fn load_options(path: &str) -> Result<Options> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let options = serde_json::from_str(&text).with_context(|| format!("invalid options in {path}"))?;
    log::info!("Loaded options from {path}");
    Ok(options)
}

/// Tonemapped color in [0, 1) to little-endian RGBA8.
fn pack_rgba(color: Vec4) -> u32 {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    u32::from_le_bytes([c.x as u8, c.y as u8, c.z as u8, c.w as u8])
}

/// Closed box lit by a ceiling panel, with a glass and a mirror sphere.
fn room() -> SceneDescription {
    let mut description = SceneDescription {
        camera: CameraDescription::look_at(Vec3::new(0.0, 1.0, 3.4), Vec3::new(0.0, 1.0, 0.0), Vec3::Y, 45.0),
        ..Default::default()
    };

    let white = description.add_material(SceneMaterial::diffuse(Color::splat(0.73)));
    let red = description.add_material(SceneMaterial::diffuse(Color::new(0.65, 0.05, 0.05)));
    let green = description.add_material(SceneMaterial::diffuse(Color::new(0.12, 0.45, 0.15)));
    let light = description.add_material(SceneMaterial::emissive(Color::splat(15.0)));
    let glass = description.add_material(SceneMaterial::glass(1.5));
    let mirror = description.add_material(SceneMaterial::mirror(Color::splat(0.9), 0.05));

    // Walls of a 2x2x2 box centered on x = 0, open towards the camera
    description
        .add_renderable(Renderable::quad(Vec3::new(-1.0, 0.0, -1.0), Vec3::Z * 2.0, Vec3::X * 2.0, Some(white)))
        .add_renderable(Renderable::quad(Vec3::new(-1.0, 2.0, -1.0), Vec3::X * 2.0, Vec3::Z * 2.0, Some(white)))
        .add_renderable(Renderable::quad(Vec3::new(-1.0, 0.0, -1.0), Vec3::X * 2.0, Vec3::Y * 2.0, Some(white)))
        .add_renderable(Renderable::quad(Vec3::new(-1.0, 0.0, -1.0), Vec3::Y * 2.0, Vec3::Z * 2.0, Some(red)))
        .add_renderable(Renderable::quad(Vec3::new(1.0, 0.0, -1.0), Vec3::Z * 2.0, Vec3::Y * 2.0, Some(green)))
        .add_renderable(Renderable::quad(Vec3::new(-0.3, 1.99, -0.3), Vec3::X * 0.6, Vec3::Z * 0.6, Some(light)))
        .add_sphere(Vec3::new(-0.4, 0.35, -0.3), 0.35, glass)
        .add_sphere(Vec3::new(0.45, 0.4, 0.2), 0.4, mirror);

    description
}
