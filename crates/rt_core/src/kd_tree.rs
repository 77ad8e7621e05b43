//! KD-tree over scene triangles.
//!
//! Surface area heuristic construction, iterative front-to-back traversal
//! with a fixed-size to-do stack.

use std::cmp::Ordering;

use rt_math::intersect::ray_triangle;
use rt_math::{Aabb, Interval, Ray, Vec2, Vec3};

/// Depth of the to-do stack used during traversal. Construction never builds
/// a tree deeper than this.
const MAX_TODO: usize = 64;

/// Cost of one ray-triangle test relative to one traversal step.
const ISECT_COST: f32 = 80.0;
const TRAVERSAL_COST: f32 = 1.0;
/// Bonus applied when one side of a split is empty.
const EMPTY_BONUS: f32 = 0.5;
/// Leaves are allowed to hold this many triangles without further splitting.
const MAX_PRIMS: usize = 1;

/// Result of a successful traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraverseResult {
    /// Index into the triangle list the tree was built from.
    pub triangle_index: usize,
    pub point: Vec3,
    /// Barycentric weights of the second and third vertex.
    pub barycentric: Vec2,
    /// Ray parameter of the hit.
    pub t: f32,
}

#[derive(Debug, Clone, Copy)]
enum KdNode {
    Interior {
        split_pos: f32,
        axis: usize,
        /// The below child always directly follows its parent.
        above_child: usize,
    },
    Leaf {
        /// Range into `primitive_indices`.
        first: usize,
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EdgeType {
    Start,
    End,
}

#[derive(Debug, Clone, Copy)]
struct BoundEdge {
    t: f32,
    prim: usize,
    edge_type: EdgeType,
}

/// Best split found for a node.
struct Split {
    axis: usize,
    offset: usize,
    cost: f32,
}

/// Spatial partition of a triangle soup.
#[derive(Debug)]
pub struct KdTree {
    triangles: Vec<[Vec3; 3]>,
    nodes: Vec<KdNode>,
    primitive_indices: Vec<usize>,
    bounds: Aabb,
}

impl KdTree {
    /// Build a tree over `triangles`. Triangle indices in traversal results
    /// refer to positions in this list.
    pub fn build(triangles: Vec<[Vec3; 3]>) -> Self {
        let count = triangles.len();
        let mut tree = Self {
            triangles,
            nodes: Vec::new(),
            primitive_indices: Vec::new(),
            bounds: Aabb::EMPTY,
        };
        if count == 0 {
            return tree;
        }

        let prim_bounds: Vec<Aabb> = tree
            .triangles
            .iter()
            .map(|tri| Aabb::enclosing(tri.iter().copied()))
            .collect();
        let bounds = prim_bounds
            .iter()
            .fold(Aabb::EMPTY, |acc, b| Aabb::surrounding(&acc, b));
        tree.bounds = bounds;

        let max_depth = ((8.0 + 1.3 * (count as f32).log2()).round() as usize).min(MAX_TODO - 1);
        let prims: Vec<usize> = (0..count).collect();
        tree.build_node(&bounds, &prim_bounds, &prims, max_depth, 0);

        log::debug!(
            "Built KD-tree: {} triangles, {} nodes, {} leaf references",
            count,
            tree.nodes.len(),
            tree.primitive_indices.len()
        );
        tree
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn push_leaf(&mut self, node_index: usize, prims: &[usize]) {
        let first = self.primitive_indices.len();
        self.primitive_indices.extend_from_slice(prims);
        self.nodes[node_index] = KdNode::Leaf {
            first,
            count: prims.len(),
        };
    }

    fn build_node(
        &mut self,
        node_bounds: &Aabb,
        prim_bounds: &[Aabb],
        prims: &[usize],
        depth: usize,
        bad_refines: u32,
    ) {
        let node_index = self.nodes.len();
        self.nodes.push(KdNode::Leaf { first: 0, count: 0 });

        let total_sa = node_bounds.surface_area();
        if prims.len() <= MAX_PRIMS || depth == 0 || total_sa <= 0.0 {
            self.push_leaf(node_index, prims);
            return;
        }

        let n = prims.len();
        let old_cost = ISECT_COST * n as f32;
        let inv_total_sa = 1.0 / total_sa;
        let d = node_bounds.diagonal();

        let mut edges: [Vec<BoundEdge>; 3] = Default::default();
        let mut best: Option<Split> = None;
        let mut axis = node_bounds.longest_axis();

        for _ in 0..3 {
            let axis_edges = &mut edges[axis];
            for &prim in prims {
                let b = &prim_bounds[prim];
                axis_edges.push(BoundEdge {
                    t: b.min[axis],
                    prim,
                    edge_type: EdgeType::Start,
                });
                axis_edges.push(BoundEdge {
                    t: b.max[axis],
                    prim,
                    edge_type: EdgeType::End,
                });
            }
            axis_edges.sort_by(|a, b| {
                a.t.partial_cmp(&b.t)
                    .unwrap_or(Ordering::Equal)
                    .then(a.edge_type.cmp(&b.edge_type))
            });

            // Sweep the candidate planes and keep the cheapest
            let (mut n_below, mut n_above) = (0_usize, n);
            let other0 = (axis + 1) % 3;
            let other1 = (axis + 2) % 3;
            for (i, edge) in axis_edges.iter().enumerate() {
                if edge.edge_type == EdgeType::End {
                    n_above -= 1;
                }
                let t = edge.t;
                if t > node_bounds.min[axis] && t < node_bounds.max[axis] {
                    let below_sa = 2.0
                        * (d[other0] * d[other1]
                            + (t - node_bounds.min[axis]) * (d[other0] + d[other1]));
                    let above_sa = 2.0
                        * (d[other0] * d[other1]
                            + (node_bounds.max[axis] - t) * (d[other0] + d[other1]));
                    let p_below = below_sa * inv_total_sa;
                    let p_above = above_sa * inv_total_sa;
                    let eb = if n_above == 0 || n_below == 0 {
                        EMPTY_BONUS
                    } else {
                        0.0
                    };
                    let cost = TRAVERSAL_COST
                        + ISECT_COST
                            * (1.0 - eb)
                            * (p_below * n_below as f32 + p_above * n_above as f32);
                    if best.as_ref().map_or(true, |b| cost < b.cost) {
                        best = Some(Split {
                            axis,
                            offset: i,
                            cost,
                        });
                    }
                }
                if edge.edge_type == EdgeType::Start {
                    n_below += 1;
                }
            }

            if best.is_some() {
                break;
            }
            axis = (axis + 1) % 3;
        }

        let Some(split) = best else {
            self.push_leaf(node_index, prims);
            return;
        };

        let bad_refines = if split.cost > old_cost {
            bad_refines + 1
        } else {
            bad_refines
        };
        if (split.cost > 4.0 * old_cost && n < 16) || bad_refines == 3 {
            self.push_leaf(node_index, prims);
            return;
        }

        // Classify triangles with respect to the split
        let axis_edges = &edges[split.axis];
        let below: Vec<usize> = axis_edges[..split.offset]
            .iter()
            .filter(|e| e.edge_type == EdgeType::Start)
            .map(|e| e.prim)
            .collect();
        let above: Vec<usize> = axis_edges[split.offset + 1..]
            .iter()
            .filter(|e| e.edge_type == EdgeType::End)
            .map(|e| e.prim)
            .collect();

        let t_split = axis_edges[split.offset].t;
        let mut bounds_below = *node_bounds;
        let mut bounds_above = *node_bounds;
        bounds_below.max[split.axis] = t_split;
        bounds_above.min[split.axis] = t_split;

        self.build_node(&bounds_below, prim_bounds, &below, depth - 1, bad_refines);
        let above_child = self.nodes.len();
        self.nodes[node_index] = KdNode::Interior {
            split_pos: t_split,
            axis: split.axis,
            above_child,
        };
        self.build_node(&bounds_above, prim_bounds, &above, depth - 1, bad_refines);
    }

    /// Nearest triangle hit in front of the ray origin.
    pub fn traverse(&self, ray: &Ray) -> Option<TraverseResult> {
        self.traverse_within(ray, Interval::FORWARD)
    }

    /// Nearest triangle hit with its ray parameter strictly inside `ray_t`.
    pub fn traverse_within(&self, ray: &Ray, ray_t: Interval) -> Option<TraverseResult> {
        if self.nodes.is_empty() {
            return None;
        }
        let (mut t_min, mut t_max) = self.bounds.intersect(ray, ray_t)?;

        let inv_dir = ray.direction.recip();
        let mut todo = [(0_usize, 0.0_f32, 0.0_f32); MAX_TODO];
        let mut todo_len = 0;
        let mut closest = ray_t.max;
        let mut best = None;
        let mut node_index = 0;

        loop {
            // Bail out if we found a hit closer than the current node
            if closest < t_min {
                break;
            }

            match self.nodes[node_index] {
                KdNode::Interior {
                    split_pos,
                    axis,
                    above_child,
                } => {
                    let origin = ray.origin[axis];
                    let t_plane = (split_pos - origin) * inv_dir[axis];
                    let below_first = origin < split_pos
                        || (origin == split_pos && ray.direction[axis] <= 0.0);
                    let (first, second) = if below_first {
                        (node_index + 1, above_child)
                    } else {
                        (above_child, node_index + 1)
                    };

                    if t_plane.is_nan() || t_plane > t_max || t_plane <= 0.0 {
                        node_index = first;
                    } else if t_plane < t_min {
                        node_index = second;
                    } else {
                        todo[todo_len] = (second, t_plane, t_max);
                        todo_len += 1;
                        node_index = first;
                        t_max = t_plane;
                    }
                }
                KdNode::Leaf { first, count } => {
                    for &prim in &self.primitive_indices[first..first + count] {
                        let [a, b, c] = self.triangles[prim];
                        if let Some(hit) = ray_triangle(ray, a, b, c, ray_t.with_max(closest)) {
                            closest = hit.t;
                            best = Some(TraverseResult {
                                triangle_index: prim,
                                point: ray.at(hit.t),
                                barycentric: hit.barycentric,
                                t: hit.t,
                            });
                        }
                    }

                    if todo_len == 0 {
                        break;
                    }
                    todo_len -= 1;
                    (node_index, t_min, t_max) = todo[todo_len];
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_point(rng: &mut StdRng, extent: f32) -> Vec3 {
        Vec3::new(
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
        )
    }

    fn random_triangles(rng: &mut StdRng, count: usize) -> Vec<[Vec3; 3]> {
        (0..count)
            .map(|_| {
                let center = random_point(rng, 10.0);
                [
                    center + random_point(rng, 1.0),
                    center + random_point(rng, 1.0),
                    center + random_point(rng, 1.0),
                ]
            })
            .collect()
    }

    fn brute_force(triangles: &[[Vec3; 3]], ray: &Ray) -> Option<(usize, f32)> {
        let mut closest = Interval::FORWARD;
        let mut best = None;
        for (i, [a, b, c]) in triangles.iter().enumerate() {
            if let Some(hit) = ray_triangle(ray, *a, *b, *c, closest) {
                closest = closest.with_max(hit.t);
                best = Some((i, hit.t));
            }
        }
        best
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(Vec::new());
        assert_eq!(tree.node_count(), 0);
        assert!(tree.traverse(&Ray::new(Vec3::ZERO, Vec3::X)).is_none());
    }

    #[test]
    fn test_single_triangle() {
        let tree = KdTree::build(vec![[
            Vec3::new(-1.0, -1.0, -2.0),
            Vec3::new(1.0, -1.0, -2.0),
            Vec3::new(0.0, 1.0, -2.0),
        ]]);
        let hit = tree.traverse(&Ray::new(Vec3::ZERO, -Vec3::Z)).unwrap();
        assert_eq!(hit.triangle_index, 0);
        assert!((hit.t - 2.0).abs() < 1e-5);
        assert!((hit.point - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-5);
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let triangles = random_triangles(&mut rng, 500);
        let tree = KdTree::build(triangles.clone());
        assert!(tree.node_count() > 1);

        for _ in 0..2000 {
            let origin = random_point(&mut rng, 15.0);
            let direction = random_point(&mut rng, 1.0).normalize();
            let ray = Ray::new(origin, direction);

            let expected = brute_force(&triangles, &ray);
            let actual = tree.traverse(&ray).map(|r| (r.triangle_index, r.t));
            match (expected, actual) {
                (None, None) => {}
                (Some((_, te)), Some((_, ta))) => assert!((te - ta).abs() < 1e-4),
                other => panic!("mismatch for {ray:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_axis_aligned_rays() {
        // Rays parallel to split planes exercise the NaN plane distance path
        let mut rng = StdRng::seed_from_u64(11);
        let triangles = random_triangles(&mut rng, 200);
        let tree = KdTree::build(triangles.clone());

        for axis in [Vec3::X, Vec3::Y, Vec3::Z, -Vec3::X] {
            for _ in 0..200 {
                let ray = Ray::new(random_point(&mut rng, 15.0), axis);
                let expected = brute_force(&triangles, &ray).map(|(_, t)| t);
                let actual = tree.traverse(&ray).map(|r| r.t);
                match (expected, actual) {
                    (None, None) => {}
                    (Some(te), Some(ta)) => assert!((te - ta).abs() < 1e-4),
                    other => panic!("mismatch for {ray:?}: {other:?}"),
                }
            }
        }
    }
}
