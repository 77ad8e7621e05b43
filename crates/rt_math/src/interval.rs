/// Open range of ray parameters `(min, max)` a hit must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Every parameter in front of a ray origin, excluding self-hits.
    pub const FORWARD: Interval = Interval {
        min: crate::RAY_EPSILON,
        max: f32::INFINITY,
    };

    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Strictly inside; endpoints are rejected.
    pub fn surrounds(&self, t: f32) -> bool {
        self.min < t && t < self.max
    }

    /// Same lower bound, upper bound pulled in to the closest hit so far.
    pub fn with_max(&self, max: f32) -> Interval {
        Interval::new(self.min, max)
    }
}
