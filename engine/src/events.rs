//! Typed tracker events and the queue consumers drain them from.
//!
//! The session pushes events as they happen; a consumer (UI, analytics,
//! the stdout printer in the binary) drains the queue once per tick.
//! Every event renders as an s-expression in the
//! `(:type :event :event :<name> ...)` shape.

use std::collections::VecDeque;

use tracing::warn;

use crate::detect::bob::Direction;
use crate::detect::gesture::{gesture_str, GestureType};
use crate::game::entity::CollectibleKind;
use crate::landmarks::Point;

/// Default queue capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    BobDetected {
        total: u32,
        timestamp_ms: f64,
    },
    Movement {
        magnitude: f32,
        raw_delta: f32,
        direction: Direction,
    },
    GestureChanged {
        from: Option<GestureType>,
        to: Option<GestureType>,
    },
    Slash {
        start: Point,
        end: Point,
        angle: f32,
        speed: f32,
    },
    Spawned {
        id: u64,
        kind: CollectibleKind,
        x: f32,
    },
    OutOfBounds {
        id: u64,
        kind: CollectibleKind,
    },
    /// Entity removed; inventory changes by `pending_delta` once committed.
    Collected {
        id: u64,
        kind: CollectibleKind,
        pending_delta: u32,
        point: Point,
    },
    CollectionCommitted {
        kind: CollectibleKind,
        count: u32,
        score: u64,
    },
    Missed {
        point: Point,
    },
    HandRejected {
        anchor: Point,
    },
    DetectionFailed {
        reason: String,
    },
}

impl TrackerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BobDetected { .. } => "bob-detected",
            Self::Movement { .. } => "movement",
            Self::GestureChanged { .. } => "gesture-changed",
            Self::Slash { .. } => "slash",
            Self::Spawned { .. } => "spawned",
            Self::OutOfBounds { .. } => "out-of-bounds",
            Self::Collected { .. } => "collected",
            Self::CollectionCommitted { .. } => "collection-committed",
            Self::Missed { .. } => "missed",
            Self::HandRejected { .. } => "hand-rejected",
            Self::DetectionFailed { .. } => "detection-failed",
        }
    }

    pub fn to_sexp(&self) -> String {
        let fields: Vec<(&str, String)> = match self {
            Self::BobDetected { total, timestamp_ms } => vec![
                ("total", total.to_string()),
                ("timestamp-ms", format!("{:.0}", timestamp_ms)),
            ],
            Self::Movement {
                magnitude,
                raw_delta,
                direction,
            } => vec![
                ("magnitude", format!("{:.2}", magnitude)),
                ("raw-delta", format!("{:.2}", raw_delta)),
                ("direction", format!(":{}", direction.as_str())),
            ],
            Self::GestureChanged { from, to } => vec![
                ("from", keyword_or_nil(*from)),
                ("to", keyword_or_nil(*to)),
            ],
            Self::Slash {
                start,
                end,
                angle,
                speed,
            } => vec![
                ("start", start.to_sexp()),
                ("end", end.to_sexp()),
                ("angle", format!("{:.3}", angle)),
                ("speed", format!("{:.1}", speed)),
            ],
            Self::Spawned { id, kind, x } => vec![
                ("id", id.to_string()),
                ("kind", format!(":{}", kind.as_str())),
                ("x", format!("{:.1}", x)),
            ],
            Self::OutOfBounds { id, kind } => vec![
                ("id", id.to_string()),
                ("kind", format!(":{}", kind.as_str())),
            ],
            Self::Collected {
                id,
                kind,
                pending_delta,
                point,
            } => vec![
                ("id", id.to_string()),
                ("kind", format!(":{}", kind.as_str())),
                ("pending-delta", pending_delta.to_string()),
                ("point", point.to_sexp()),
            ],
            Self::CollectionCommitted { kind, count, score } => vec![
                ("kind", format!(":{}", kind.as_str())),
                ("count", count.to_string()),
                ("score", score.to_string()),
            ],
            Self::Missed { point } => vec![("point", point.to_sexp())],
            Self::HandRejected { anchor } => vec![("anchor", anchor.to_sexp())],
            Self::DetectionFailed { reason } => {
                vec![("reason", format!("\"{}\"", escape_string(reason)))]
            }
        };
        let borrowed: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        format_event(self.name(), &borrowed)
    }
}

fn keyword_or_nil(gesture: Option<GestureType>) -> String {
    match gesture {
        Some(g) => format!(":{}", g.as_str()),
        None => gesture_str(None).to_string(),
    }
}

/// Escape a string for s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Format an event s-expression.
pub fn format_event(event_type: &str, fields: &[(&str, &str)]) -> String {
    let mut s = format!("(:type :event :event :{}", event_type);
    for (key, val) in fields {
        s.push_str(&format!(" :{} {}", key, val));
    }
    s.push(')');
    s
}

// ── Queue ──────────────────────────────────────────────────

/// Bounded FIFO of tracker events.  When full, the oldest event is dropped.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<TrackerEvent>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: TrackerEvent) {
        if self.events.len() >= self.capacity {
            if let Some(old) = self.events.pop_front() {
                self.dropped += 1;
                warn!("event queue full ({}), dropping {}", self.capacity, old.name());
            }
        }
        self.events.push_back(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = TrackerEvent>) {
        for e in events {
            self.push(e);
        }
    }

    /// Take every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<TrackerEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
