use rt_math::{reflect, Ray};

use super::{perturb, EvalContext, Integrator};
use crate::material::Color;
use crate::scene::Scene;

/// Diffuse-chain estimator.
///
/// Each bounce scatters into a cosine lobe around the mirror direction whose
/// width follows the material roughness. The chain is recorded on the way
/// out and composed from the last bounce back to the first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleIntegrator;

impl SimpleIntegrator {
    pub fn new() -> Self {
        Self
    }

    /// Walk the bounce chain for `ray` and compose its color.
    pub fn compute_color_sequence(&self, scene: &Scene, ray: &Ray, ctx: &mut EvalContext) -> Color {
        let mut chain = std::mem::take(&mut ctx.chain);
        chain.clear();

        let mut ray = *ray;
        let mut intermediate = loop {
            if chain.len() as u32 >= ctx.max_depth {
                break ctx.terminating_color;
            }
            let Some(hit) = scene.find_nearest_intersection(&ray) else {
                break scene.sample_environment_color(ray.direction);
            };

            let material = scene.material(hit.material);
            chain.push((material.diffuse, material.emissive));
            if material.is_emissive() || scene.objects()[hit.object].is_light() {
                break Color::ZERO;
            }

            let normal = if ray.direction.dot(hit.normal) > 0.0 {
                -hit.normal
            } else {
                hit.normal
            };
            let ideal = reflect(ray.direction, normal);
            let direction = perturb(ideal, material.roughness, normal, ctx);
            ray = Ray::spawn(hit.point, normal, direction);
        };

        ctx.bounces = chain.len() as u32;
        for &(color, emissive) in chain.iter().rev() {
            intermediate = intermediate * color + emissive;
        }

        ctx.chain = chain;
        intermediate
    }
}

impl Integrator for SimpleIntegrator {
    fn evaluate(&self, scene: &Scene, ray: &Ray, ctx: &mut EvalContext) -> Color {
        self.compute_color_sequence(scene, ray, ctx)
    }
}
