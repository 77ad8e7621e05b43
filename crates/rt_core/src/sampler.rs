//! Sample generators for pixel jitter and first-bounce direction sampling.
//!
//! Every sampler returns a [`Vec4`] in [0,1)^4 for a `(index, total)` pair.
//! The first two components jitter the pixel position, the last two drive
//! the first scattering decision of the path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rt_math::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

/// Largest f32 below one; keeps jittered samples inside [0,1).
const ONE_MINUS_EPSILON: f32 = 1.0 - f32::EPSILON / 2.0;

/// Trait for per-worker sample generators.
pub trait Sampler: Send {
    /// Sample `index` out of `total` samples for the current pixel.
    fn sample(&mut self, index: u32, total: u32) -> Vec4;
}

/// Sampler selection in [`Options`](crate::Options).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Independent uniform samples.
    Random,
    /// Deterministic grid cell centers.
    Uniform,
    /// Jittered grid with padding inside each stratum.
    #[default]
    Stratified,
    /// Halton sequence with a per-sampler random rotation.
    Halton,
}

impl SamplerKind {
    /// Construct a sampler. `seed` initializes any internal RNG once.
    pub fn build(self, seed: u64, padding: f32) -> Box<dyn Sampler> {
        match self {
            SamplerKind::Random => Box::new(RandomSampler::new(seed)),
            SamplerKind::Uniform => Box::new(UniformSampler),
            SamplerKind::Stratified => Box::new(StratifiedSampler::new(seed, padding)),
            SamplerKind::Halton => Box::new(HaltonSampler::new(seed)),
        }
    }
}

pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, _index: u32, _total: u32) -> Vec4 {
        Vec4::new(self.rng.gen(), self.rng.gen(), self.rng.gen(), self.rng.gen())
    }
}

/// Regular grid, identical output for identical arguments.
pub struct UniformSampler;

impl Sampler for UniformSampler {
    fn sample(&mut self, index: u32, total: u32) -> Vec4 {
        let cell = grid_cell(index, total);
        let side = grid_side(total) as f32;
        let xy = (cell + Vec2::splat(0.5)) / side;
        Vec4::new(xy.x, xy.y, radical_inverse(2, index), radical_inverse(3, index))
            .min(Vec4::splat(ONE_MINUS_EPSILON))
    }
}

/// Jittered grid. The stratum is a pure function of `(index, total)`; only
/// the position inside the padded stratum is random.
pub struct StratifiedSampler {
    rng: StdRng,
    padding: f32,
}

impl StratifiedSampler {
    pub fn new(seed: u64, padding: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            padding: padding.clamp(0.0, 0.49),
        }
    }

    fn jitter(&mut self) -> f32 {
        self.padding + self.rng.gen::<f32>() * (1.0 - 2.0 * self.padding)
    }
}

impl Sampler for StratifiedSampler {
    fn sample(&mut self, index: u32, total: u32) -> Vec4 {
        let total = total.max(1);
        let index = index % total;

        let side = grid_side(total) as f32;
        let cell = grid_cell(index, total);
        let x = (cell.x + self.jitter()) / side;
        let y = (cell.y + self.jitter()) / side;

        // Second pair: 1D strata, the w stratum permuted so z and w decorrelate
        let z = (index as f32 + self.jitter()) / total as f32;
        let permuted = (index as u64 * coprime_step(total) as u64 % total as u64) as f32;
        let w = (permuted + self.jitter()) / total as f32;

        Vec4::new(x, y, z, w).min(Vec4::splat(ONE_MINUS_EPSILON))
    }
}

pub struct HaltonSampler {
    rotation: Vec4,
}

impl HaltonSampler {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            rotation: Vec4::new(rng.gen(), rng.gen(), rng.gen(), rng.gen()),
        }
    }
}

impl Sampler for HaltonSampler {
    fn sample(&mut self, index: u32, _total: u32) -> Vec4 {
        // Skip the first point, it sits on the origin in every base
        let i = index + 1;
        let raw = Vec4::new(
            radical_inverse(2, i),
            radical_inverse(3, i),
            radical_inverse(5, i),
            radical_inverse(7, i),
        );
        let rotated = raw + self.rotation;
        (rotated - rotated.floor()).min(Vec4::splat(ONE_MINUS_EPSILON))
    }
}

/// Side length of the smallest square grid holding `total` cells.
fn grid_side(total: u32) -> u64 {
    let total = u64::from(total.max(1));
    let mut side = (total as f64).sqrt() as u64;
    while side * side < total {
        side += 1;
    }
    side.max(1)
}

fn grid_cell(index: u32, total: u32) -> Vec2 {
    let side = grid_side(total);
    let index = u64::from(index) % (side * side);
    Vec2::new((index % side) as f32, (index / side) as f32)
}

/// Van der Corput radical inverse of `index` in `base`.
fn radical_inverse(base: u32, mut index: u32) -> f32 {
    let inv_base = 1.0 / base as f64;
    let mut inv_base_n = 1.0;
    let mut reversed: u64 = 0;
    while index > 0 {
        let next = index / base;
        let digit = index - next * base;
        reversed = reversed * base as u64 + digit as u64;
        inv_base_n *= inv_base;
        index = next;
    }
    ((reversed as f64 * inv_base_n) as f32).min(ONE_MINUS_EPSILON)
}

/// A multiplier that permutes `0..total` when applied modulo `total`.
fn coprime_step(total: u32) -> u32 {
    const PRIMES: [u32; 4] = [7919, 104_729, 1_299_709, 15_485_863];
    PRIMES
        .into_iter()
        .find(|p| total % p != 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_unit_range(v: Vec4) -> bool {
        v.cmpge(Vec4::ZERO).all() && v.cmplt(Vec4::ONE).all()
    }

    #[test]
    fn test_all_samplers_stay_in_range() {
        for kind in [
            SamplerKind::Random,
            SamplerKind::Uniform,
            SamplerKind::Stratified,
            SamplerKind::Halton,
        ] {
            let mut sampler = kind.build(3, 0.1);
            for total in [1, 2, 7, 16, 100] {
                for index in 0..total {
                    let s = sampler.sample(index, total);
                    assert!(in_unit_range(s), "{kind:?} produced {s:?}");
                }
            }
        }
    }

    #[test]
    fn test_grid_larger_than_u16_squared() {
        let total = u32::MAX;
        assert_eq!(grid_side(total), 65_536);
        for kind in [SamplerKind::Uniform, SamplerKind::Stratified] {
            let mut sampler = kind.build(3, 0.1);
            for index in [0, 1, total / 2, total - 1] {
                let s = sampler.sample(index, total);
                assert!(in_unit_range(s), "{kind:?} produced {s:?} at {index}");
            }
        }
    }

    #[test]
    fn test_uniform_is_deterministic() {
        let mut a = UniformSampler;
        let mut b = UniformSampler;
        for i in 0..16 {
            assert_eq!(a.sample(i, 16), b.sample(i, 16));
        }
    }

    #[test]
    fn test_stratified_stratum_is_deterministic() {
        let mut a = StratifiedSampler::new(1, 0.1);
        let mut b = StratifiedSampler::new(99, 0.1);
        let total = 16;
        for i in 0..total {
            let sa = a.sample(i, total);
            let sb = b.sample(i, total);
            // Same 4x4 cell for both seeds
            assert_eq!((sa.x * 4.0).floor(), (sb.x * 4.0).floor());
            assert_eq!((sa.y * 4.0).floor(), (sb.y * 4.0).floor());
            assert_eq!((sa.z * 16.0).floor(), (sb.z * 16.0).floor());
            assert_eq!((sa.w * 16.0).floor(), (sb.w * 16.0).floor());
        }
    }

    #[test]
    fn test_stratified_covers_every_stratum() {
        let mut sampler = StratifiedSampler::new(5, 0.0);
        let total = 9;
        let mut seen = [false; 9];
        for i in 0..total {
            let s = sampler.sample(i, total);
            let cell = (s.y * 3.0) as usize * 3 + (s.x * 3.0) as usize;
            seen[cell] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_stratified_padding_keeps_away_from_cell_edges() {
        let mut sampler = StratifiedSampler::new(5, 0.25);
        for i in 0..4 {
            let s = sampler.sample(i, 4);
            let fx = (s.x * 2.0).fract();
            assert!((0.25..=0.75).contains(&fx), "{fx}");
        }
    }

    #[test]
    fn test_random_differs_between_calls() {
        let mut sampler = RandomSampler::new(0);
        assert_ne!(sampler.sample(0, 1), sampler.sample(0, 1));
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(2, 1), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(2, 3), 0.75);
        assert!((radical_inverse(3, 1) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_coprime_step_permutes() {
        for total in [1_u32, 7, 16, 7919 * 2] {
            let step = coprime_step(total) as u64;
            let mut seen: Vec<u64> = (0..total as u64).map(|i| i * step % total as u64).collect();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), total as usize);
        }
    }
}
