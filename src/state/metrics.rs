/// Rolling performance metrics
///
/// Exponential moving averages of load and transition time plus the
/// cache hit ratio and the last probe latency. Mutated after every load
/// and transition; persisted (debounced) as part of the snapshot.

use serde::{Deserialize, Serialize};

/// Weight given to each new sample in the moving averages
const SAMPLE_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Rolling average image load time (fetch + decode), milliseconds
    pub avg_load_ms: f64,
    /// Rolling average transition time, milliseconds
    pub avg_transition_ms: f64,
    /// Decoded-image cache hit ratio, 0.0–1.0
    pub cache_hit_ratio: f64,
    /// Last measured network latency from the connection probe
    pub last_latency_ms: Option<u64>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            avg_load_ms: 0.0,
            avg_transition_ms: 0.0,
            cache_hit_ratio: 0.0,
            last_latency_ms: None,
        }
    }
}

impl PerformanceMetrics {
    pub fn record_load(&mut self, elapsed_ms: f64) {
        self.avg_load_ms = roll(self.avg_load_ms, elapsed_ms);
    }

    pub fn record_transition(&mut self, elapsed_ms: f64) {
        self.avg_transition_ms = roll(self.avg_transition_ms, elapsed_ms);
    }

    pub fn record_latency(&mut self, latency_ms: u64) {
        self.last_latency_ms = Some(latency_ms);
    }

    pub fn record_hit_ratio(&mut self, ratio: f64) {
        self.cache_hit_ratio = ratio.clamp(0.0, 1.0);
    }

    /// Whether measured load performance is poor enough to degrade
    /// quality and transitions (threshold: 3000 ms average load)
    pub fn is_load_degraded(&self) -> bool {
        self.avg_load_ms > 3000.0
    }
}

/// First sample seeds the average; later samples blend in
fn roll(current: f64, sample: f64) -> f64 {
    if current == 0.0 {
        sample
    } else {
        current + SAMPLE_WEIGHT * (sample - current)
    }
}
