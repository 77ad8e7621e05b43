//! Region-based tile scheduling.
//!
//! Divides the image into rectangular regions that are claimed one at a
//! time by the worker threads.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rt_math::{UVec2, Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::integrator::{EvalContext, Integrator};
use crate::options::Options;
use crate::scene::Scene;

/// A rectangular part of the image rendered by a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// X coordinate of the region's top-left corner
    pub x: u32,
    /// Y coordinate of the region's top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Set once a worker has claimed the region.
    pub sampled: bool,
    /// Bounces summed over the cost estimation rays, zero until estimated.
    pub estimated_bounces: u32,
    /// Raster position of this region, stable across reordering.
    pub index: usize,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            sampled: false,
            estimated_bounces: 0,
            index,
        }
    }

    /// Get the total number of pixels in this region.
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    pub fn contains(&self, pixel: UVec2) -> bool {
        pixel.x >= self.x && pixel.x < self.x + self.width && pixel.y >= self.y && pixel.y < self.y + self.height
    }

    /// Pixels of the region in raster order.
    pub fn pixels(&self) -> impl Iterator<Item = UVec2> + '_ {
        (self.y..self.y + self.height)
            .flat_map(move |y| (self.x..self.x + self.width).map(move |x| UVec2::new(x, y)))
    }
}

/// Split an image into `size` x `size` regions in raster order. Regions on
/// the right and bottom edges are clipped to the image.
pub fn generate_regions(width: u32, height: u32, size: u32) -> Vec<Region> {
    let mut regions = Vec::new();
    if size == 0 {
        return regions;
    }

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let rw = size.min(width - x);
            let rh = size.min(height - y);
            regions.push(Region::new(x, y, rw, rh, regions.len()));
            x += size;
        }
        y += size;
    }
    regions
}

/// How workers pick their next region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrder {
    /// First unclaimed region in list order.
    #[default]
    Sequential,
    /// Uniformly random unclaimed region.
    Random,
}

#[derive(Debug)]
struct QueueState {
    regions: Vec<Region>,
    /// Everything before the cursor has been claimed (sequential order).
    cursor: usize,
    rng: StdRng,
}

/// Pool of regions shared by the workers of one render.
#[derive(Debug)]
pub struct RegionQueue {
    state: Mutex<QueueState>,
    order: ClaimOrder,
}

impl RegionQueue {
    pub fn new(regions: Vec<Region>, order: ClaimOrder, seed: u64) -> Self {
        Self {
            state: Mutex::new(QueueState {
                regions,
                cursor: 0,
                rng: StdRng::seed_from_u64(seed),
            }),
            order,
        }
    }

    /// Claim the next region, or `None` once the pool is drained.
    ///
    /// Each region is handed out at most once per fill. The lock is held only
    /// for the scan or the swap-remove.
    pub fn get_next_region(&self) -> Option<Region> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match self.order {
            ClaimOrder::Sequential => {
                let start = state.cursor;
                let offset = state.regions[start..].iter().position(|r| !r.sampled)?;
                let index = start + offset;
                state.cursor = index + 1;
                let region = &mut state.regions[index];
                region.sampled = true;
                Some(*region)
            }
            ClaimOrder::Random => {
                let remaining = state.regions.len();
                if remaining == 0 {
                    return None;
                }
                let pick = state.rng.gen_range(0..remaining);
                let mut region = state.regions.swap_remove(pick);
                region.sampled = true;
                Some(region)
            }
        }
    }

    /// Replace the pool with a fresh set of regions.
    pub fn refill(&self, regions: Vec<Region>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.regions = regions;
        state.cursor = 0;
    }

    /// Regions not yet claimed.
    pub fn remaining(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match self.order {
            ClaimOrder::Sequential => state.regions[state.cursor..].iter().filter(|r| !r.sampled).count(),
            ClaimOrder::Random => state.regions.len(),
        }
    }
}

/// Fractional positions inside a region traced for cost estimation.
const ESTIMATE_OFFSETS: [Vec2; 5] = [
    Vec2::new(0.5, 0.5),
    Vec2::new(0.25, 0.25),
    Vec2::new(0.75, 0.25),
    Vec2::new(0.25, 0.75),
    Vec2::new(0.75, 0.75),
];

/// Trace a handful of rays through every region and sort the most expensive
/// (most bounces) first. Regions are estimated in parallel.
pub fn estimate_regions_order(regions: &mut [Region], scene: &Scene, integrator: &dyn Integrator, options: &Options) {
    let camera = scene.camera();
    regions.par_iter_mut().for_each(|region| {
        let mut ctx = EvalContext::new(options.seed ^ region.index as u64, options);
        region.estimated_bounces = ESTIMATE_OFFSETS
            .iter()
            .map(|offset| {
                let position = Vec2::new(region.x as f32, region.y as f32)
                    + *offset * Vec2::new(region.width as f32, region.height as f32);
                let pixel = position.floor().as_uvec2();
                let jitter = position - position.floor();
                let ray = camera.get_ray(pixel, jitter, Vec2::splat(0.5));
                ctx.begin_sample(Vec4::new(jitter.x, jitter.y, 0.5, 0.5));
                integrator.evaluate(scene, &ray, &mut ctx);
                ctx.bounces
            })
            .sum();
    });
    regions.sort_by(|a, b| b.estimated_bounces.cmp(&a.estimated_bounces));
    log::debug!("Estimated region costs for {} regions", regions.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_generate_regions_exact_fit() {
        let regions = generate_regions(128, 128, 64);
        assert_eq!(regions.len(), 4);
        let total_pixels: u32 = regions.iter().map(|r| r.pixel_count()).sum();
        assert_eq!(total_pixels, 128 * 128);
    }

    #[test]
    fn test_generate_regions_partial_fit() {
        let regions = generate_regions(100, 70, 64);
        assert_eq!(regions.len(), 4);
        assert_eq!((regions[3].width, regions[3].height), (36, 6));
        let total_pixels: u32 = regions.iter().map(|r| r.pixel_count()).sum();
        assert_eq!(total_pixels, 100 * 70);
    }

    #[test]
    fn test_regions_cover_each_pixel_once() {
        let (width, height) = (37, 23);
        let regions = generate_regions(width, height, 8);
        let mut seen = vec![0_u32; (width * height) as usize];
        for region in &regions {
            for pixel in region.pixels() {
                seen[(pixel.y * width + pixel.x) as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_raster_order_and_indices() {
        let regions = generate_regions(64, 64, 32);
        let corners: Vec<_> = regions.iter().map(|r| (r.x, r.y)).collect();
        assert_eq!(corners, vec![(0, 0), (32, 0), (0, 32), (32, 32)]);
        assert!(regions.iter().enumerate().all(|(i, r)| r.index == i && !r.sampled));
    }

    #[test]
    fn test_zero_size_generates_nothing() {
        assert!(generate_regions(64, 64, 0).is_empty());
        assert!(generate_regions(0, 64, 8).is_empty());
    }

    #[test]
    fn test_sequential_claims_in_order() {
        let queue = RegionQueue::new(generate_regions(64, 64, 32), ClaimOrder::Sequential, 0);
        let claimed: Vec<_> = std::iter::from_fn(|| queue.get_next_region()).map(|r| r.index).collect();
        assert_eq!(claimed, vec![0, 1, 2, 3]);
        assert_eq!(queue.remaining(), 0);
    }

    #[test]
    fn test_random_claims_each_once() {
        let queue = RegionQueue::new(generate_regions(100, 100, 10), ClaimOrder::Random, 42);
        let claimed: Vec<_> = std::iter::from_fn(|| queue.get_next_region()).collect();
        assert_eq!(claimed.len(), 100);
        assert!(claimed.iter().all(|r| r.sampled));
        let unique: HashSet<_> = claimed.iter().map(|r| r.index).collect();
        assert_eq!(unique.len(), 100);
    }

    #[test]
    fn test_refill_restarts_pool() {
        let queue = RegionQueue::new(generate_regions(16, 16, 8), ClaimOrder::Sequential, 0);
        while queue.get_next_region().is_some() {}
        queue.refill(generate_regions(16, 16, 8));
        assert_eq!(queue.remaining(), 4);
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        for order in [ClaimOrder::Sequential, ClaimOrder::Random] {
            let queue = Arc::new(RegionQueue::new(generate_regions(256, 256, 8), order, 7));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    std::thread::spawn(move || {
                        let mut mine = Vec::new();
                        while let Some(region) = queue.get_next_region() {
                            mine.push(region.index);
                        }
                        mine
                    })
                })
                .collect();

            let mut all: Vec<usize> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
            all.sort_unstable();
            assert_eq!(all, (0..1024).collect::<Vec<_>>(), "{order:?}");
        }
    }
}
