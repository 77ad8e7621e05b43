//! Render progress counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Region counters and timing shared by all workers of a render.
///
/// Every counter only ever grows (the minimum only ever shrinks), so readers
/// on other threads see a monotonic view without further synchronization.
#[derive(Debug)]
pub struct RenderProgress {
    total_regions: AtomicUsize,
    processed_regions: AtomicUsize,
    min_region_micros: AtomicU64,
    max_region_micros: AtomicU64,
    total_region_micros: AtomicU64,
}

/// Point-in-time copy of [`RenderProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub total_regions: usize,
    pub processed_regions: usize,
    /// Zero until the first region finishes.
    pub min_region_micros: u64,
    pub max_region_micros: u64,
    pub total_region_micros: u64,
}

impl ProgressSnapshot {
    /// Completed share in [0, 1].
    pub fn fraction(&self) -> f32 {
        if self.total_regions == 0 {
            return 0.0;
        }
        (self.processed_regions as f32 / self.total_regions as f32).min(1.0)
    }

    pub fn average_region_micros(&self) -> u64 {
        self.total_region_micros
            .checked_div(self.processed_regions as u64)
            .unwrap_or(0)
    }
}

impl RenderProgress {
    pub fn new(total_regions: usize) -> Self {
        Self {
            total_regions: AtomicUsize::new(total_regions),
            processed_regions: AtomicUsize::new(0),
            min_region_micros: AtomicU64::new(u64::MAX),
            max_region_micros: AtomicU64::new(0),
            total_region_micros: AtomicU64::new(0),
        }
    }

    /// Account for regions added by a restart.
    pub fn add_total(&self, regions: usize) {
        self.total_regions.fetch_add(regions, Ordering::Relaxed);
    }

    /// Record one finished region and how long it took.
    pub fn record_region(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.min_region_micros.fetch_min(micros, Ordering::Relaxed);
        self.max_region_micros.fetch_max(micros, Ordering::Relaxed);
        self.total_region_micros.fetch_add(micros, Ordering::Relaxed);
        self.processed_regions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let min = self.min_region_micros.load(Ordering::Relaxed);
        ProgressSnapshot {
            total_regions: self.total_regions.load(Ordering::Relaxed),
            processed_regions: self.processed_regions.load(Ordering::Relaxed),
            min_region_micros: if min == u64::MAX { 0 } else { min },
            max_region_micros: self.max_region_micros.load(Ordering::Relaxed),
            total_region_micros: self.total_region_micros.load(Ordering::Relaxed),
        }
    }

    /// Log one progress line.
    pub fn report(&self) {
        let s = self.snapshot();
        log::info!(
            "Progress: {}/{} regions ({:.1}%), region time min {:.2} ms, avg {:.2} ms, max {:.2} ms",
            s.processed_regions,
            s.total_regions,
            s.fraction() * 100.0,
            s.min_region_micros as f64 / 1000.0,
            s.average_region_micros() as f64 / 1000.0,
            s.max_region_micros as f64 / 1000.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let progress = RenderProgress::new(4);
        let s = progress.snapshot();
        assert_eq!(s.total_regions, 4);
        assert_eq!(s.processed_regions, 0);
        assert_eq!(s.min_region_micros, 0);
        assert_eq!(s.fraction(), 0.0);
        assert_eq!(s.average_region_micros(), 0);
    }

    #[test]
    fn test_record_region() {
        let progress = RenderProgress::new(2);
        progress.record_region(Duration::from_micros(300));
        progress.record_region(Duration::from_micros(100));
        let s = progress.snapshot();
        assert_eq!(s.processed_regions, 2);
        assert_eq!(s.min_region_micros, 100);
        assert_eq!(s.max_region_micros, 300);
        assert_eq!(s.average_region_micros(), 200);
        assert_eq!(s.fraction(), 1.0);
    }

    #[test]
    fn test_counters_are_monotonic_across_threads() {
        let progress = std::sync::Arc::new(RenderProgress::new(400));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let progress = std::sync::Arc::clone(&progress);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for i in 0..100 {
                        progress.record_region(Duration::from_micros(i));
                        let now = progress.snapshot().processed_regions;
                        assert!(now >= last);
                        last = now;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.snapshot().processed_regions, 400);
    }
}
