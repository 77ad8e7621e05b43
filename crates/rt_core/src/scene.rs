//! Scene description and the flat, read-only render scene built from it.

use std::sync::Arc;

use rt_math::intersect::{interpolate, ray_aabb, ray_plane, ray_sphere, ray_triangle};
use rt_math::{Aabb, Interval, Mat4, Ray, UVec2, Vec2, Vec3};

use crate::camera::{Camera, CameraDescription};
use crate::environment::EnvironmentMap;
use crate::error::{RenderError, Result};
use crate::kd_tree::KdTree;
use crate::material::{Color, SceneMaterial};
use crate::options::{Accelerator, Options};

/// Triangle mesh handed over by the host application.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub positions: Vec<Vec3>,
    /// Per-vertex normals. Left empty (or mismatched) the faces shade flat.
    pub normals: Vec<Vec3>,
    /// Carried for the host's benefit; shading ignores texture coordinates.
    pub uvs: Vec<Vec2>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
    /// Index into [`SceneDescription::materials`]. `None` uses a fallback.
    pub material: Option<usize>,
    pub transform: Mat4,
}

impl Default for Renderable {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
            material: None,
            transform: Mat4::IDENTITY,
        }
    }
}

impl Renderable {
    /// Parallelogram spanned by `edge_u` and `edge_v` from `corner`.
    /// The face normal is `edge_u x edge_v`.
    pub fn quad(corner: Vec3, edge_u: Vec3, edge_v: Vec3, material: Option<usize>) -> Self {
        let normal = edge_u.cross(edge_v).normalize_or_zero();
        Self {
            positions: vec![corner, corner + edge_u, corner + edge_u + edge_v, corner + edge_v],
            normals: vec![normal; 4],
            uvs: vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            indices: vec![0, 1, 2, 0, 2, 3],
            material,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereDescription {
    pub center: Vec3,
    pub radius: f32,
    pub material: Option<usize>,
}

/// Infinite plane `dot(normal, p) == offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneDescription {
    pub normal: Vec3,
    pub offset: f32,
    pub material: Option<usize>,
}

/// Spherical light. Rendered as an emitter that ends every path reaching it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDescription {
    pub position: Vec3,
    pub radius: f32,
    pub color: Color,
}

/// Everything the renderer needs to know about a scene, in host terms.
#[derive(Debug, Clone, Default)]
pub struct SceneDescription {
    pub renderables: Vec<Renderable>,
    pub spheres: Vec<SphereDescription>,
    pub planes: Vec<PlaneDescription>,
    pub lights: Vec<LightDescription>,
    pub materials: Vec<SceneMaterial>,
    pub camera: CameraDescription,
    /// Radiance of the void when no environment map is set.
    pub ambient: Color,
    pub environment: Option<Arc<EnvironmentMap>>,
}

impl SceneDescription {
    /// Register a material and return its index.
    pub fn add_material(&mut self, material: SceneMaterial) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_renderable(&mut self, renderable: Renderable) -> &mut Self {
        self.renderables.push(renderable);
        self
    }

    pub fn add_sphere(&mut self, center: Vec3, radius: f32, material: usize) -> &mut Self {
        self.spheres.push(SphereDescription {
            center,
            radius,
            material: Some(material),
        });
        self
    }

    pub fn add_plane(&mut self, normal: Vec3, offset: f32, material: usize) -> &mut Self {
        self.planes.push(PlaneDescription {
            normal,
            offset,
            material: Some(material),
        });
        self
    }

    pub fn add_light(&mut self, position: Vec3, radius: f32, color: Color) -> &mut Self {
        self.lights.push(LightDescription {
            position,
            radius,
            color,
        });
        self
    }

    /// True when nothing in the description can be hit.
    pub fn is_empty(&self) -> bool {
        self.renderables.iter().all(|r| r.triangle_count() == 0)
            && self.spheres.is_empty()
            && self.planes.is_empty()
            && self.lights.is_empty()
    }
}

/// An intersectable object in the render scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneObject {
    Mesh {
        first_triangle: usize,
        num_triangles: usize,
        bounds: Aabb,
        material: usize,
    },
    Sphere {
        center: Vec3,
        radius: f32,
        material: usize,
    },
    Plane {
        normal: Vec3,
        offset: f32,
        material: usize,
    },
    Light {
        center: Vec3,
        radius: f32,
        material: usize,
    },
}

impl SceneObject {
    pub fn material(&self) -> usize {
        match *self {
            SceneObject::Mesh { material, .. }
            | SceneObject::Sphere { material, .. }
            | SceneObject::Plane { material, .. }
            | SceneObject::Light { material, .. } => material,
        }
    }

    pub fn is_light(&self) -> bool {
        matches!(self, SceneObject::Light { .. })
    }
}

/// World-space triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneTriangle {
    pub positions: [Vec3; 3],
    /// All zero when the mesh carried no usable normals.
    pub normals: [Vec3; 3],
    pub material: usize,
}

impl SceneTriangle {
    /// Unit normal following the winding order.
    pub fn face_normal(&self) -> Vec3 {
        let [a, b, c] = self.positions;
        (b - a).cross(c - a).normalize_or_zero()
    }

    pub fn area(&self) -> f32 {
        let [a, b, c] = self.positions;
        0.5 * (b - a).cross(c - a).length()
    }

    /// Shading normal at barycentric `(u, v)`.
    pub fn shading_normal(&self, barycentric: Vec2) -> Vec3 {
        let [na, nb, nc] = self.normals;
        interpolate(na, nb, nc, barycentric)
            .try_normalize()
            .unwrap_or_else(|| self.face_normal())
    }

    /// Uniformly distributed point for a unit-square sample.
    pub fn sample_point(&self, sample: Vec2) -> (Vec3, Vec2) {
        let su = sample.x.sqrt();
        let barycentric = Vec2::new(su * (1.0 - sample.y), su * sample.y);
        let [a, b, c] = self.positions;
        (interpolate(a, b, c, barycentric), barycentric)
    }
}

/// A ray-surface hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub t: f32,
    pub point: Vec3,
    /// Shading normal; interpolated for smooth meshes. Not oriented toward the ray.
    pub normal: Vec3,
    pub geometric_normal: Vec3,
    pub material: usize,
    pub object: usize,
    /// Set for mesh hits only.
    pub triangle: Option<usize>,
    /// Barycentric weights of the second and third vertex. Zero off meshes.
    pub barycentric: Vec2,
}

/// Flat, read-only scene the workers render.
#[derive(Debug)]
pub struct Scene {
    objects: Vec<SceneObject>,
    triangles: Vec<SceneTriangle>,
    /// Owning object of every triangle.
    triangle_objects: Vec<usize>,
    materials: Vec<SceneMaterial>,
    emissive_triangles: Vec<usize>,
    camera: Camera,
    ambient: Color,
    environment: Option<Arc<EnvironmentMap>>,
    kd_tree: Option<KdTree>,
}

impl Scene {
    /// Flatten a description into render storage.
    ///
    /// Fails with [`RenderError::Configuration`] when a material or vertex
    /// index points outside its array. Meshes without triangles are dropped.
    pub fn build(description: &SceneDescription, image_size: UVec2, options: &Options) -> Result<Self> {
        let mut materials = description.materials.clone();
        let fallback = materials.len();
        materials.push(SceneMaterial::missing());

        let resolve = |material: Option<usize>, what: &str| -> Result<usize> {
            match material {
                None => Ok(fallback),
                Some(index) if index < description.materials.len() => Ok(index),
                Some(index) => Err(RenderError::config(format!(
                    "{what} references material {index}, but only {} exist",
                    description.materials.len()
                ))),
            }
        };

        let mut objects = Vec::new();
        let mut triangles = Vec::new();
        let mut triangle_objects = Vec::new();

        for (mesh_index, renderable) in description.renderables.iter().enumerate() {
            if renderable.triangle_count() == 0 {
                log::debug!("Skipping renderable {mesh_index}: no triangles");
                continue;
            }
            let material = resolve(renderable.material, &format!("renderable {mesh_index}"))?;
            let mesh_triangles = flatten_mesh(renderable, mesh_index, material)?;

            let object = objects.len();
            let bounds = Aabb::enclosing(mesh_triangles.iter().flat_map(|t| t.positions));
            objects.push(SceneObject::Mesh {
                first_triangle: triangles.len(),
                num_triangles: mesh_triangles.len(),
                bounds,
                material,
            });
            triangle_objects.extend(std::iter::repeat(object).take(mesh_triangles.len()));
            triangles.extend(mesh_triangles);
        }

        for (i, sphere) in description.spheres.iter().enumerate() {
            objects.push(SceneObject::Sphere {
                center: sphere.center,
                radius: sphere.radius,
                material: resolve(sphere.material, &format!("sphere {i}"))?,
            });
        }

        for (i, plane) in description.planes.iter().enumerate() {
            let normal = plane.normal.try_normalize().ok_or_else(|| {
                RenderError::config(format!("plane {i} has a degenerate normal"))
            })?;
            objects.push(SceneObject::Plane {
                normal,
                offset: plane.offset / plane.normal.length(),
                material: resolve(plane.material, &format!("plane {i}"))?,
            });
        }

        for light in &description.lights {
            materials.push(SceneMaterial::emissive(light.color));
            objects.push(SceneObject::Light {
                center: light.position,
                radius: light.radius,
                material: materials.len() - 1,
            });
        }

        let emissive_triangles = triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| materials[t.material].is_emissive() && t.area() > 0.0)
            .map(|(i, _)| i)
            .collect();

        let kd_tree = match options.accelerator {
            Accelerator::KdTree if !triangles.is_empty() => {
                Some(KdTree::build(triangles.iter().map(|t| t.positions).collect()))
            }
            _ => None,
        };

        let camera = Camera::new(
            &description.camera,
            image_size,
            options.aperture_size,
            options.aperture_blades,
            options.focus_distance,
        );

        log::debug!(
            "Scene built: {} objects, {} triangles, {} materials",
            objects.len(),
            triangles.len(),
            materials.len()
        );

        Ok(Self {
            objects,
            triangles,
            triangle_objects,
            materials,
            emissive_triangles,
            camera,
            ambient: description.ambient,
            environment: description.environment.clone(),
            kd_tree,
        })
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn triangles(&self) -> &[SceneTriangle] {
        &self.triangles
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn material(&self, index: usize) -> &SceneMaterial {
        &self.materials[index]
    }

    /// Triangles whose material emits light.
    pub fn emissive_triangles(&self) -> &[usize] {
        &self.emissive_triangles
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Radiance arriving from the void along `direction`.
    pub fn sample_environment_color(&self, direction: Vec3) -> Color {
        match &self.environment {
            Some(map) => map.sample(direction),
            None => self.ambient,
        }
    }

    /// Closest hit in front of the ray origin, or `None`.
    pub fn find_nearest_intersection(&self, ray: &Ray) -> Option<Intersection> {
        self.nearest_within(ray, Interval::FORWARD)
    }

    /// True when something blocks the segment between `from` and `to`.
    pub fn is_occluded(&self, from: Vec3, to: Vec3) -> bool {
        let delta = to - from;
        let distance = delta.length();
        if distance <= rt_math::RAY_EPSILON * 2.0 {
            return false;
        }
        let ray = Ray::new(from, delta / distance);
        let ray_t = Interval::new(rt_math::RAY_EPSILON, distance - rt_math::RAY_EPSILON);
        self.nearest_within(&ray, ray_t).is_some()
    }

    fn nearest_within(&self, ray: &Ray, ray_t: Interval) -> Option<Intersection> {
        let mut closest = ray_t.max;
        let mut best = None;

        if let Some(tree) = &self.kd_tree {
            if let Some(hit) = tree.traverse_within(ray, ray_t) {
                closest = hit.t;
                best = Some(self.triangle_intersection(hit.triangle_index, hit.t, hit.point, hit.barycentric));
            }
        }

        for (object_index, object) in self.objects.iter().enumerate() {
            let range = ray_t.with_max(closest);
            let hit = match *object {
                SceneObject::Mesh {
                    first_triangle,
                    num_triangles,
                    ref bounds,
                    ..
                } => {
                    if self.kd_tree.is_some() || !ray_aabb(ray, bounds, range) {
                        continue;
                    }
                    self.nearest_in_mesh(ray, range, first_triangle, num_triangles)
                }
                SceneObject::Sphere {
                    center,
                    radius,
                    material,
                }
                | SceneObject::Light {
                    center,
                    radius,
                    material,
                } => ray_sphere(ray, center, radius, range).map(|t| {
                    let point = ray.at(t);
                    let normal = ((point - center) / radius).normalize_or_zero();
                    Intersection {
                        t,
                        point,
                        normal,
                        geometric_normal: normal,
                        material,
                        object: object_index,
                        triangle: None,
                        barycentric: Vec2::ZERO,
                    }
                }),
                SceneObject::Plane {
                    normal,
                    offset,
                    material,
                } => ray_plane(ray, normal, offset, range).map(|t| Intersection {
                    t,
                    point: ray.at(t),
                    normal,
                    geometric_normal: normal,
                    material,
                    object: object_index,
                    triangle: None,
                    barycentric: Vec2::ZERO,
                }),
            };

            if let Some(hit) = hit {
                closest = hit.t;
                best = Some(hit);
            }
        }

        best
    }

    fn nearest_in_mesh(&self, ray: &Ray, ray_t: Interval, first: usize, count: usize) -> Option<Intersection> {
        let mut closest = ray_t.max;
        let mut best = None;
        for index in first..first + count {
            let [a, b, c] = self.triangles[index].positions;
            if let Some(hit) = ray_triangle(ray, a, b, c, ray_t.with_max(closest)) {
                closest = hit.t;
                best = Some((index, hit));
            }
        }
        best.map(|(index, hit)| self.triangle_intersection(index, hit.t, ray.at(hit.t), hit.barycentric))
    }

    fn triangle_intersection(&self, index: usize, t: f32, point: Vec3, barycentric: Vec2) -> Intersection {
        let triangle = &self.triangles[index];
        Intersection {
            t,
            point,
            normal: triangle.shading_normal(barycentric),
            geometric_normal: triangle.face_normal(),
            material: triangle.material,
            object: self.triangle_objects[index],
            triangle: Some(index),
            barycentric,
        }
    }
}

/// Transform one renderable into world-space triangles.
fn flatten_mesh(renderable: &Renderable, mesh_index: usize, material: usize) -> Result<Vec<SceneTriangle>> {
    if renderable.indices.len() % 3 != 0 {
        return Err(RenderError::config(format!(
            "renderable {mesh_index} has {} indices, not a multiple of three",
            renderable.indices.len()
        )));
    }

    let transform = renderable.transform;
    let normal_matrix = transform.inverse().transpose();
    let positions: Vec<Vec3> = renderable
        .positions
        .iter()
        .map(|&p| transform.transform_point3(p))
        .collect();
    let normals: Option<Vec<Vec3>> = (renderable.normals.len() == renderable.positions.len()).then(|| {
        renderable
            .normals
            .iter()
            .map(|&n| normal_matrix.transform_vector3(n).normalize_or_zero())
            .collect()
    });

    renderable
        .indices
        .chunks_exact(3)
        .map(|face| {
            let mut corners = [0_usize; 3];
            for (corner, &index) in corners.iter_mut().zip(face) {
                let index = index as usize;
                if index >= positions.len() {
                    return Err(RenderError::config(format!(
                        "renderable {mesh_index} references vertex {index}, but only {} exist",
                        positions.len()
                    )));
                }
                *corner = index;
            }
            Ok(SceneTriangle {
                positions: corners.map(|i| positions[i]),
                normals: match &normals {
                    Some(normals) => corners.map(|i| normals[i]),
                    None => [Vec3::ZERO; 3],
                },
                material,
            })
        })
        .collect()
}
