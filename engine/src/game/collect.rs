//! Pinch-driven collection of live collectibles.
//!
//! A hit removes the entity from the live set at once, but the inventory
//! and score only change once the commit delay has passed.  Misses are
//! reported at most once per throttle interval.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entity::{Collectible, CollectibleKind, Spawner};
use crate::landmarks::Point;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Sprite diameter at scale 1.0 (px).
    pub base_size_px: f32,
    /// Extra slack added to the hit radius (px).
    pub hit_margin_px: f32,
    /// Delay between a hit and its inventory/score commit (ms).
    pub commit_delay_ms: f64,
    /// Minimum gap between miss notifications (ms).
    pub miss_interval_ms: f64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            base_size_px: 80.0,
            hit_margin_px: 20.0,
            commit_delay_ms: 2000.0,
            miss_interval_ms: 1000.0,
        }
    }
}

impl CollectConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:base-size-px {:.1} :hit-margin-px {:.1} :commit-delay-ms {:.0} :miss-interval-ms {:.0})",
            self.base_size_px, self.hit_margin_px, self.commit_delay_ms, self.miss_interval_ms
        )
    }

    /// Hit radius for an entity at `scale`.
    pub fn hit_radius(&self, scale: f32) -> f32 {
        self.base_size_px * scale / 2.0 + self.hit_margin_px
    }
}

// ── Inventory ──────────────────────────────────────────────

/// Committed counts per collectible kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    counts: BTreeMap<CollectibleKind, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: CollectibleKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CollectibleKind, u32)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }

    /// Kind name to count, for consumers that key by string.
    pub fn to_map(&self) -> BTreeMap<String, u32> {
        self.iter().map(|(k, v)| (k.as_str().to_string(), v)).collect()
    }

    fn add(&mut self, kind: CollectibleKind) -> u32 {
        let count = self.counts.entry(kind).or_insert(0);
        *count += 1;
        *count
    }

    pub fn to_sexp(&self) -> String {
        let items: Vec<String> = self
            .iter()
            .map(|(k, v)| format!("(:kind :{} :count {})", k.as_str(), v))
            .collect();
        format!("({})", items.join(" "))
    }
}

// ── Outcomes ───────────────────────────────────────────────

/// A hit awaiting its commit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCollection {
    pub id: u64,
    pub kind: CollectibleKind,
    pub point: Point,
    pub collected_at_ms: f64,
    pub commit_at_ms: f64,
}

/// A collection whose delay has elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommittedCollection {
    pub kind: CollectibleKind,
    /// Inventory count of `kind` after this commit.
    pub count: u32,
    /// Total score after this commit.
    pub score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectOutcome {
    Hit(PendingCollection),
    /// Nothing in range; the miss should be reported.
    Missed(Point),
    /// Nothing in range, inside the miss throttle window.
    MissSuppressed,
}

/// Index of the newest live entity whose hit radius contains `anchor`.
pub fn hit_test(anchor: Point, live: &[Collectible], config: &CollectConfig) -> Option<usize> {
    live.iter()
        .enumerate()
        .rev()
        .find(|(_, e)| anchor.distance(&e.center()) <= config.hit_radius(e.scale))
        .map(|(i, _)| i)
}

// ── Collector ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Collector {
    pending: VecDeque<PendingCollection>,
    inventory: Inventory,
    score: u64,
    last_miss_ms: Option<f64>,
    misses_reported: u32,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingCollection> {
        self.pending.iter()
    }

    pub fn misses_reported(&self) -> u32 {
        self.misses_reported
    }

    /// Hit-test the pinch anchor and remove at most one entity.
    pub fn try_collect(
        &mut self,
        anchor: Point,
        spawner: &mut Spawner,
        now_ms: f64,
        config: &CollectConfig,
    ) -> CollectOutcome {
        let hit = hit_test(anchor, spawner.live(), config)
            .map(|i| spawner.live()[i].id)
            .and_then(|id| spawner.remove(id));

        match hit {
            Some(entity) => {
                let pending = PendingCollection {
                    id: entity.id,
                    kind: entity.kind,
                    point: anchor,
                    collected_at_ms: now_ms,
                    commit_at_ms: now_ms + config.commit_delay_ms,
                };
                debug!(
                    "Collected {} #{} at ({:.0}, {:.0}), commit at {:.0}ms",
                    entity.kind.as_str(),
                    entity.id,
                    anchor.x,
                    anchor.y,
                    pending.commit_at_ms
                );
                self.pending.push_back(pending);
                CollectOutcome::Hit(pending)
            }
            None => {
                let allowed = self
                    .last_miss_ms
                    .map_or(true, |last| now_ms - last >= config.miss_interval_ms);
                if allowed {
                    self.last_miss_ms = Some(now_ms);
                    self.misses_reported += 1;
                    CollectOutcome::Missed(anchor)
                } else {
                    CollectOutcome::MissSuppressed
                }
            }
        }
    }

    /// Commit every pending collection whose delay has elapsed.
    pub fn commit_due(&mut self, now_ms: f64) -> Vec<CommittedCollection> {
        let mut committed = Vec::new();
        while let Some(p) = self.pending.front().copied() {
            if now_ms < p.commit_at_ms {
                break;
            }
            self.pending.pop_front();
            let count = self.inventory.add(p.kind);
            self.score += u64::from(p.kind.points());
            debug!(
                "Committed {} #{} (count {}, score {})",
                p.kind.as_str(),
                p.id,
                count,
                self.score
            );
            committed.push(CommittedCollection {
                kind: p.kind,
                count,
                score: self.score,
            });
        }
        committed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
