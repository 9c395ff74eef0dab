//! Windowed bob rate and derived session metrics.
//!
//! Rates are recomputed on demand from the bob timestamp window rather
//! than maintained incrementally, so a read is exact for the instant it
//! is taken.

use serde::{Deserialize, Serialize};

use crate::detect::bob::BobState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Rolling window for the bob rate (ms).
    pub window_ms: f64,
    /// Distance credited per counted bob (m).
    pub distance_per_bob_m: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000.0,
            distance_per_bob_m: 0.75,
        }
    }
}

impl MetricsConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:window-ms {:.0} :distance-per-bob-m {:.2})",
            self.window_ms, self.distance_per_bob_m
        )
    }
}

/// Bobs with timestamps in `(now - window, now]`.
///
/// Prunes the window first, so the timestamp queue never grows past one
/// window of history.
pub fn bobs_per_minute(state: &mut BobState, now_ms: f64, config: &MetricsConfig) -> u32 {
    state.prune(now_ms, config.window_ms);
    state.bob_timestamps.iter().filter(|t| **t <= now_ms).count() as u32
}

/// Stride-length estimate of distance covered.
pub fn distance_m(bob_count: u32, config: &MetricsConfig) -> f64 {
    f64::from(bob_count) * config.distance_per_bob_m
}

// ── Snapshot ───────────────────────────────────────────────

/// Point-in-time session metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub bob_count: u32,
    pub bobs_per_minute: u32,
    pub distance_m: f64,
    pub slashes: u32,
    /// Committed collections.
    pub collected: u32,
    pub score: u64,
    pub session_s: f64,
    pub detection_failures: u64,
    /// Collectibles spawned so far.
    pub spawned: u64,
    /// Misses reported after throttling.
    pub misses: u32,
    /// Events lost to a full queue.
    pub events_dropped: u64,
}

impl MetricsSnapshot {
    pub fn to_sexp(&self) -> String {
        format!(
            "(:bob-count {} :bobs-per-minute {} :distance-m {:.2} :slashes {} :collected {} :score {} :session-s {:.1} :detection-failures {} :spawned {} :misses {} :events-dropped {})",
            self.bob_count,
            self.bobs_per_minute,
            self.distance_m,
            self.slashes,
            self.collected,
            self.score,
            self.session_s,
            self.detection_failures,
            self.spawned,
            self.misses,
            self.events_dropped,
        )
    }
}
