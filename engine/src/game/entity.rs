//! Collectible entities and their spawn/aging lifecycle.
//!
//! Each entity moves through `Spawned → Aging → (Collected | OutOfBounds)`.
//! Position and scale are pure functions of age: linear downward drift and
//! linear growth clamped to a maximum.  Spawns arrive on a randomized
//! timer drawn uniformly from `[min_interval_ms, max_interval_ms)`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{FrameSize, Point};

// ── Catalog ────────────────────────────────────────────────

/// Kinds of collectible, all equally likely to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectibleKind {
    Apple,
    Banana,
    Cherry,
    Coin,
    Gem,
}

impl CollectibleKind {
    pub const ALL: [CollectibleKind; 5] = [
        Self::Apple,
        Self::Banana,
        Self::Cherry,
        Self::Coin,
        Self::Gem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apple => "apple",
            Self::Banana => "banana",
            Self::Cherry => "cherry",
            Self::Coin => "coin",
            Self::Gem => "gem",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }

    /// Score awarded when a collection of this kind commits.
    pub fn points(&self) -> u32 {
        match self {
            Self::Apple | Self::Banana | Self::Cherry => 10,
            Self::Coin => 25,
            Self::Gem => 50,
        }
    }
}

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Enable spawning.  Live entities still age when disabled.
    pub enabled: bool,
    /// Shortest gap between spawns (ms), inclusive.
    pub min_interval_ms: f64,
    /// Longest gap between spawns (ms), exclusive.
    pub max_interval_ms: f64,
    /// Horizontal keep-out at each frame edge (px).
    pub side_margin_px: f32,
    /// Vertical position at spawn (px).
    pub initial_y_px: f32,
    /// Downward drift (px/s).
    pub fall_speed_px_s: f32,
    pub initial_scale: f32,
    /// Scale gained per second of age.
    pub growth_per_s: f32,
    pub max_scale: f32,
    /// Distance past the bottom edge before an entity is pruned (px).
    pub offscreen_margin_px: f32,
    /// Fixed RNG seed for reproducible sessions.
    pub seed: Option<u64>,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: 10_000.0,
            max_interval_ms: 20_000.0,
            side_margin_px: 80.0,
            initial_y_px: 40.0,
            fall_speed_px_s: 30.0,
            initial_scale: 0.5,
            growth_per_s: 0.05,
            max_scale: 1.5,
            offscreen_margin_px: 100.0,
            seed: None,
        }
    }
}

impl SpawnConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:enabled {} :min-interval-ms {:.0} :max-interval-ms {:.0} :fall-speed {:.1} :max-scale {:.2})",
            if self.enabled { "t" } else { "nil" },
            self.min_interval_ms,
            self.max_interval_ms,
            self.fall_speed_px_s,
            self.max_scale,
        )
    }
}

// ── Entity ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Collectible {
    pub id: u64,
    pub kind: CollectibleKind,
    pub x: f32,
    pub y: f32,
    pub spawn_time_ms: f64,
    pub scale: f32,
    pub max_scale: f32,
    initial_y: f32,
    initial_scale: f32,
}

impl Collectible {
    pub fn new(
        id: u64,
        kind: CollectibleKind,
        x: f32,
        spawn_time_ms: f64,
        config: &SpawnConfig,
    ) -> Self {
        Self {
            id,
            kind,
            x,
            y: config.initial_y_px,
            spawn_time_ms,
            scale: config.initial_scale.min(config.max_scale),
            max_scale: config.max_scale,
            initial_y: config.initial_y_px,
            initial_scale: config.initial_scale,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn age_ms(&self, now_ms: f64) -> f64 {
        (now_ms - self.spawn_time_ms).max(0.0)
    }

    /// Recompute position and scale for `now_ms`.
    pub fn age_to(&mut self, now_ms: f64, config: &SpawnConfig) {
        let age_s = (self.age_ms(now_ms) / 1000.0) as f32;
        self.y = self.initial_y + config.fall_speed_px_s * age_s;
        self.scale = (self.initial_scale + config.growth_per_s * age_s).min(self.max_scale);
    }

    pub fn is_out_of_bounds(&self, frame: FrameSize, config: &SpawnConfig) -> bool {
        self.y > frame.height + config.offscreen_margin_px
    }

    pub fn to_sexp(&self) -> String {
        format!(
            "(:id {} :kind :{} :x {:.1} :y {:.1} :scale {:.2})",
            self.id,
            self.kind.as_str(),
            self.x,
            self.y,
            self.scale
        )
    }
}

// ── Lifecycle ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Spawned { id: u64, kind: CollectibleKind, x: f32 },
    OutOfBounds { id: u64, kind: CollectibleKind },
}

/// Owns the live entity set and the spawn timer.
pub struct Spawner {
    rng: StdRng,
    live: Vec<Collectible>,
    next_spawn_ms: Option<f64>,
    last_spawn_ms: Option<f64>,
    next_id: u64,
    spawned_total: u64,
}

impl Spawner {
    pub fn new(config: &SpawnConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            live: Vec::new(),
            next_spawn_ms: None,
            last_spawn_ms: None,
            next_id: 1,
            spawned_total: 0,
        }
    }

    /// Live entities, oldest first.
    pub fn live(&self) -> &[Collectible] {
        &self.live
    }

    pub fn next_spawn_ms(&self) -> Option<f64> {
        self.next_spawn_ms
    }

    pub fn last_spawn_ms(&self) -> Option<f64> {
        self.last_spawn_ms
    }

    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    fn draw_interval(&mut self, config: &SpawnConfig) -> f64 {
        if config.max_interval_ms > config.min_interval_ms {
            self.rng.gen_range(config.min_interval_ms..config.max_interval_ms)
        } else {
            config.min_interval_ms
        }
    }

    fn draw_x(&mut self, frame: FrameSize, config: &SpawnConfig) -> f32 {
        let lo = config.side_margin_px;
        let hi = frame.width - config.side_margin_px;
        if hi > lo {
            self.rng.gen_range(lo..hi)
        } else {
            frame.width / 2.0
        }
    }

    /// Advance the lifecycle: spawn if due, age every entity, prune the
    /// ones that left the frame.
    ///
    /// Spawn times follow the schedule rather than the tick clock, so the
    /// gap between consecutive spawns is always one drawn interval.  At
    /// most one entity spawns per call.
    pub fn tick(&mut self, now_ms: f64, frame: FrameSize, config: &SpawnConfig) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        if config.enabled {
            let due = match self.next_spawn_ms {
                Some(t) => t,
                None => {
                    let t = now_ms + self.draw_interval(config);
                    self.next_spawn_ms = Some(t);
                    t
                }
            };
            if now_ms >= due {
                let kind = CollectibleKind::ALL[self.rng.gen_range(0..CollectibleKind::ALL.len())];
                let x = self.draw_x(frame, config);
                let id = self.next_id;
                self.next_id += 1;
                self.spawned_total += 1;
                self.live.push(Collectible::new(id, kind, x, due, config));
                self.last_spawn_ms = Some(due);
                self.next_spawn_ms = Some(due + self.draw_interval(config));
                debug!("Spawned {} #{} at x={:.0}", kind.as_str(), id, x);
                events.push(LifecycleEvent::Spawned { id, kind, x });
            }
        }

        for entity in &mut self.live {
            entity.age_to(now_ms, config);
        }

        self.live.retain(|e| {
            if e.is_out_of_bounds(frame, config) {
                debug!("Pruned {} #{} (out of bounds)", e.kind.as_str(), e.id);
                events.push(LifecycleEvent::OutOfBounds { id: e.id, kind: e.kind });
                false
            } else {
                true
            }
        });

        events
    }

    /// Remove an entity from the live set (collection).
    pub fn remove(&mut self, id: u64) -> Option<Collectible> {
        let pos = self.live.iter().position(|e| e.id == id)?;
        Some(self.live.remove(pos))
    }

    /// Drop every live entity and restart the spawn timer.
    pub fn reset(&mut self) {
        self.live.clear();
        self.next_spawn_ms = None;
        self.last_spawn_ms = None;
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, entity: Collectible) {
        self.live.push(entity);
    }
}
