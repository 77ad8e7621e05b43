use rt_math::{reflect, Ray, Vec3};

use super::{cosine_hemisphere, fresnel_schlick, perturb, refract, EvalContext, Integrator, IorStack};
use crate::material::{Color, SceneMaterial};
use crate::scene::Scene;

/// Path tracer with mirror reflection, rough refraction and Fresnel.
///
/// Every bounce makes exactly one random choice between the lobes of the hit
/// material. The path is walked iteratively; `throughput` carries the product
/// of the colors and weights gathered on the way down, which gives the same
/// value as composing `emissive + color * weight * deeper` on the way back up.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsdfIntegrator;

impl BsdfIntegrator {
    pub fn new() -> Self {
        Self
    }

    /// Trace `ray` with the media in `ior_stack` as the starting surroundings.
    pub fn gather_bounces(
        &self,
        scene: &Scene,
        ray: &Ray,
        ctx: &mut EvalContext,
        ior_stack: &mut IorStack,
    ) -> Color {
        let mut radiance = Color::ZERO;
        let mut throughput = Color::ONE;
        let mut ray = *ray;
        let mut depth = 0;

        loop {
            if depth >= ctx.max_depth {
                radiance += throughput * ctx.terminating_color;
                break;
            }

            let Some(hit) = scene.find_nearest_intersection(&ray) else {
                radiance += throughput * scene.sample_environment_color(ray.direction);
                break;
            };

            let material = *scene.material(hit.material);
            radiance += throughput * material.emissive;
            depth += 1;
            ctx.bounces = depth;

            let scattered = scatter(&material, ray.direction, hit.normal, ior_stack, ctx);
            throughput *= scattered.weight;
            if throughput.max_element() <= 0.0 {
                break;
            }
            ray = Ray::spawn(hit.point, scattered.side, scattered.direction);
        }

        radiance
    }
}

/// Outcome of one scattering decision.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scatter {
    pub direction: Vec3,
    pub weight: Color,
    /// Side of the surface the new ray leaves from.
    pub side: Vec3,
}

/// Pick one lobe of `material` for a ray arriving along `direction` and
/// sample it. Updates `ior_stack` when the ray crosses a dielectric boundary.
pub(crate) fn scatter(
    material: &SceneMaterial,
    direction: Vec3,
    normal: Vec3,
    ior_stack: &mut IorStack,
    ctx: &mut EvalContext,
) -> Scatter {
    let reflect_off = |normal: Vec3, ctx: &mut EvalContext| {
        let ideal = reflect(direction, normal);
        let scattered = perturb(ideal, material.roughness, normal, ctx);
        Scatter {
            direction: scattered,
            weight: material.reflective * scattered.dot(ideal).max(0.0),
            side: normal,
        }
    };

    if !material.is_refractive() {
        let normal = if direction.dot(normal) > 0.0 { -normal } else { normal };
        if ctx.random() > material.roughness {
            return reflect_off(normal, ctx);
        }
        let scattered = cosine_hemisphere(normal, ctx.direction_sample());
        return Scatter {
            direction: scattered,
            weight: material.diffuse * scattered.dot(normal).max(0.0),
            side: normal,
        };
    }

    let entering = direction.dot(normal) < 0.0;
    let (normal, current, target) = if entering {
        (normal, ior_stack.top(), material.refractive_index)
    } else if ior_stack.len() > 1 {
        (-normal, ior_stack.top(), ior_stack.second())
    } else {
        (-normal, material.refractive_index, ior_stack.top())
    };

    match refract(direction, normal, current / target) {
        None => reflect_off(normal, ctx),
        Some(_) if ctx.random() < fresnel_schlick(-direction.dot(normal), current, target) => {
            reflect_off(normal, ctx)
        }
        Some(ideal) => {
            if entering {
                ior_stack.push(target);
            } else {
                ior_stack.pop();
            }
            let scattered = perturb(ideal, material.roughness, -normal, ctx);
            Scatter {
                direction: scattered,
                weight: material.diffuse * scattered.dot(ideal).max(0.0),
                side: -normal,
            }
        }
    }
}

impl Integrator for BsdfIntegrator {
    fn evaluate(&self, scene: &Scene, ray: &Ray, ctx: &mut EvalContext) -> Color {
        let mut ior_stack = IorStack::new();
        self.gather_bounces(scene, ray, ctx, &mut ior_stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Options, SceneDescription, SceneMaterial};
    use rt_math::UVec2;

    fn scene(description: &SceneDescription) -> Scene {
        Scene::build(description, UVec2::new(8, 8), &Options::default()).unwrap()
    }

    fn context(bounces: u32, terminating_color: Color) -> EvalContext {
        let options = Options {
            bounces,
            terminating_color,
            ..Default::default()
        };
        EvalContext::new(7, &options)
    }

    #[test]
    fn test_void_returns_environment() {
        let description = SceneDescription {
            ambient: Color::new(0.2, 0.3, 0.4),
            ..Default::default()
        };
        let scene = scene(&description);
        let mut ctx = context(4, Color::ONE);
        let color = BsdfIntegrator.evaluate(&scene, &Ray::new(Vec3::ZERO, Vec3::X), &mut ctx);
        assert_eq!(color, Color::new(0.2, 0.3, 0.4));
        assert_eq!(ctx.bounces, 0);
    }

    #[test]
    fn test_depth_limit_returns_terminating_color() {
        let mut description = SceneDescription::default();
        let mirror = description.add_material(SceneMaterial::mirror(Color::ONE, 0.0));
        // Two facing mirrors trap the path
        description
            .add_plane(Vec3::Z, -1.0, mirror)
            .add_plane(Vec3::Z, 1.0, mirror);
        let scene = scene(&description);

        let mut ctx = context(3, Color::new(0.5, 0.25, 0.125));
        let color = BsdfIntegrator.evaluate(&scene, &Ray::new(Vec3::ZERO, Vec3::Z), &mut ctx);
        assert!((color - Color::new(0.5, 0.25, 0.125)).length() < 1e-5);
        assert_eq!(ctx.bounces, 4);
    }

    #[test]
    fn test_emitter_seen_directly() {
        let mut description = SceneDescription::default();
        description.add_light(Vec3::new(0.0, 0.0, -5.0), 1.0, Color::splat(3.0));
        let scene = scene(&description);
        let mut ctx = context(2, Color::ZERO);
        let color = BsdfIntegrator.evaluate(&scene, &Ray::new(Vec3::ZERO, -Vec3::Z), &mut ctx);
        assert_eq!(color, Color::splat(3.0));
    }

    #[test]
    fn test_nested_glass_keeps_stack_balanced() {
        let mut description = SceneDescription {
            ambient: Color::X,
            ..Default::default()
        };
        let outer = description.add_material(SceneMaterial::glass(1.5));
        let inner = description.add_material(SceneMaterial::glass(1.33));
        description
            .add_sphere(Vec3::ZERO, 2.0, outer)
            .add_sphere(Vec3::ZERO, 1.0, inner);
        let scene = scene(&description);

        let mut ctx = context(64, Color::Y);
        let mut escaped = 0;
        for i in 0..500 {
            let offset = (i as f32 / 500.0) * 1.9;
            let ray = Ray::new(Vec3::new(offset, 0.1, 10.0), -Vec3::Z);
            let mut stack = IorStack::new();
            let color = BsdfIntegrator.gather_bounces(&scene, &ray, &mut ctx, &mut stack);

            assert!(stack.len() >= 1);
            assert!(stack.depth() <= 2);
            // Glass keeps full throughput, so the color tells how the path ended
            if color.x > 0.5 {
                escaped += 1;
                assert_eq!(stack.depth(), 0, "escaped path left media on the stack");
            }
        }
        assert!(escaped > 0);
    }
}
