//! Engine configuration: every tunable threshold, grouped per component.
//!
//! Loaded from JSON.  Missing fields fall back to their defaults, so a
//! file only needs to name what it overrides.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detect::{BobConfig, GestureConfig, RegionConfig, SlashConfig};
use crate::error::TrackerError;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::game::{CollectConfig, SpawnConfig};
use crate::landmarks::FrameSize;
use crate::metrics::MetricsConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capture resolution the thresholds are tuned against.
    pub frame: FrameSize,
    pub region: RegionConfig,
    pub gesture: GestureConfig,
    pub bob: BobConfig,
    pub slash: SlashConfig,
    pub spawn: SpawnConfig,
    pub collect: CollectConfig,
    pub metrics: MetricsConfig,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame: FrameSize::default(),
            region: RegionConfig::default(),
            gesture: GestureConfig::default(),
            bob: BobConfig::default(),
            slash: SlashConfig::default(),
            spawn: SpawnConfig::default(),
            collect: CollectConfig::default(),
            metrics: MetricsConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file.  A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        if !path.exists() {
            info!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, TrackerError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, TrackerError> {
        serde_json::to_string_pretty(self).map_err(|e| TrackerError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), TrackerError> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<(), TrackerError> {
        fn check(ok: bool, what: &str) -> Result<(), TrackerError> {
            if ok {
                Ok(())
            } else {
                Err(TrackerError::Config(what.to_string()))
            }
        }

        check(
            self.frame.width > 0.0 && self.frame.height > 0.0,
            "frame size must be positive",
        )?;
        check(self.bob.threshold_px > 0.0, "bob threshold must be positive")?;
        check(
            self.gesture.pinch_cap_px > 0.0 && self.gesture.pinch_reach_ratio > 0.0,
            "pinch cap and reach ratio must be positive",
        )?;
        check(
            self.gesture.fist_finger_threshold_px > 0.0 && self.gesture.fist_thumb_threshold_px > 0.0,
            "fist thresholds must be positive",
        )?;
        check(
            self.gesture.flat_min_extension_px > 0.0 && self.gesture.flat_parallel_tolerance_px >= 0.0,
            "flat-hand thresholds out of range",
        )?;
        check(
            (0.0..=1.0).contains(&self.region.face_zone_top_fraction)
                && (0.0..=1.0).contains(&self.region.face_zone_center_fraction),
            "face zone fractions must lie in [0, 1]",
        )?;
        check(self.slash.min_speed_px_s > 0.0, "slash speed must be positive")?;
        check(
            self.slash.min_samples >= 2 && self.slash.min_samples <= self.slash.history_len,
            "slash needs 2 <= min_samples <= history_len",
        )?;
        check(self.slash.cooldown_ms >= 0.0, "slash cooldown must not be negative")?;
        check(
            self.spawn.min_interval_ms > 0.0 && self.spawn.min_interval_ms <= self.spawn.max_interval_ms,
            "spawn interval needs 0 < min <= max",
        )?;
        check(
            self.spawn.initial_scale > 0.0 && self.spawn.initial_scale <= self.spawn.max_scale,
            "spawn scale needs 0 < initial <= max",
        )?;
        check(
            self.spawn.fall_speed_px_s >= 0.0 && self.spawn.growth_per_s >= 0.0,
            "collectible drift and growth must not be negative",
        )?;
        check(
            self.spawn.offscreen_margin_px >= 0.0,
            "offscreen margin must not be negative",
        )?;
        check(
            self.collect.base_size_px > 0.0 && self.collect.hit_margin_px >= 0.0,
            "collectible size must be positive and hit margin not negative",
        )?;
        check(
            self.collect.commit_delay_ms >= 0.0 && self.collect.miss_interval_ms >= 0.0,
            "collection timings must not be negative",
        )?;
        check(self.metrics.window_ms > 0.0, "metrics window must be positive")?;
        check(self.event_capacity > 0, "event capacity must be positive")?;
        Ok(())
    }

    pub fn config_sexp(&self) -> String {
        format!(
            "(:frame (:width {:.0} :height {:.0}) :region {} :gesture {} :bob {} :slash {} :spawn {} :collect {} :metrics {})",
            self.frame.width,
            self.frame.height,
            self.region.config_sexp(),
            self.gesture.config_sexp(),
            self.bob.config_sexp(),
            self.slash.config_sexp(),
            self.spawn.config_sexp(),
            self.collect.config_sexp(),
            self.metrics.config_sexp(),
        )
    }
}
