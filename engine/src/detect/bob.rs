//! Head-bob detection from a facial reference point.
//!
//! A bob is one reversal of vertical movement direction.  Frame-to-frame
//! deltas inside the dead zone carry no direction, so jitter never counts.
//! One physical up-down-up cycle therefore yields two bobs; distance and
//! rate calibration assume that convention.
//!
//! `BobState` is a plain value and `BobState::advance` a pure transition,
//! so the state machine can be driven from recorded reference points.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{Point, PoseResult, FACE_NOSE_TIP};

// ── Direction ──────────────────────────────────────────────

/// Classified vertical movement of the reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Classify a frame delta (image y grows downward).
pub fn classify_direction(delta: f32, threshold: f32) -> Option<Direction> {
    if delta > threshold {
        Some(Direction::Down)
    } else if delta < -threshold {
        Some(Direction::Up)
    } else {
        None
    }
}

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BobConfig {
    /// Dead zone (px): deltas with magnitude at or below this carry no direction.
    pub threshold_px: f32,
    /// Face mesh index used as the reference point.
    pub reference_landmark: usize,
}

impl Default for BobConfig {
    fn default() -> Self {
        Self {
            threshold_px: 5.0,
            reference_landmark: FACE_NOSE_TIP,
        }
    }
}

impl BobConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:threshold-px {:.1} :reference-landmark {})",
            self.threshold_px, self.reference_landmark
        )
    }

    /// Position of the reference landmark, if present.
    pub fn reference_point(&self, face: &PoseResult) -> Option<Point> {
        face.keypoint(self.reference_landmark).map(|kp| kp.point())
    }
}

// ── Events ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum BobEvent {
    /// The reference point moved beyond the dead zone.
    Movement {
        magnitude: f32,
        raw_delta: f32,
        direction: Direction,
    },
    /// A direction reversal was counted.
    Bob { total: u32, timestamp_ms: f64 },
}

// ── State ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BobState {
    /// Reference y of the previous detected face, if the last frame had one.
    pub previous_reference_y: Option<f32>,
    /// Last non-None direction.
    pub last_direction: Option<Direction>,
    pub bob_count: u32,
    /// Timestamps (ms) of counted bobs, oldest first.
    pub bob_timestamps: VecDeque<f64>,
}

impl BobState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one frame.
    ///
    /// `reference_y` is `None` when no face was detected; that drops the
    /// baseline so two consecutive detections are needed before the next
    /// delta.  Direction memory and the count survive the gap.
    pub fn advance(
        mut self,
        reference_y: Option<f32>,
        timestamp_ms: f64,
        config: &BobConfig,
    ) -> (Self, Vec<BobEvent>) {
        let mut events = Vec::new();

        let current = match reference_y {
            Some(y) => y,
            None => {
                self.previous_reference_y = None;
                return (self, events);
            }
        };

        let previous = self.previous_reference_y.replace(current);
        let delta = match previous {
            Some(prev) => current - prev,
            None => return (self, events),
        };

        let direction = match classify_direction(delta, config.threshold_px) {
            Some(d) => d,
            None => return (self, events),
        };

        events.push(BobEvent::Movement {
            magnitude: delta.abs(),
            raw_delta: delta,
            direction,
        });

        match self.last_direction {
            Some(last) if last != direction => {
                self.bob_count += 1;
                self.bob_timestamps.push_back(timestamp_ms);
                debug!(
                    "Bob {} counted ({} -> {}) at {:.0}ms",
                    self.bob_count,
                    last.as_str(),
                    direction.as_str(),
                    timestamp_ms
                );
                events.push(BobEvent::Bob {
                    total: self.bob_count,
                    timestamp_ms,
                });
            }
            _ => {}
        }
        self.last_direction = Some(direction);

        (self, events)
    }

    /// Drop timestamps at or before `now_ms - window_ms`.
    pub fn prune(&mut self, now_ms: f64, window_ms: f64) {
        let cutoff = now_ms - window_ms;
        while self.bob_timestamps.front().map_or(false, |t| *t <= cutoff) {
            self.bob_timestamps.pop_front();
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:bob-count {} :direction {} :baseline {})",
            self.bob_count,
            self.last_direction.map_or("nil", |d| d.as_str()),
            if self.previous_reference_y.is_some() { "t" } else { "nil" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn run(ys: &[Option<f32>], config: &BobConfig) -> (BobState, Vec<BobEvent>) {
        let mut state = BobState::new();
        let mut all = Vec::new();
        for (i, y) in ys.iter().enumerate() {
            let (next, events) = state.advance(*y, i as f64 * 100.0, config);
            state = next;
            all.extend(events);
        }
        (state, all)
    }

    #[test]
    fn test_direction_classification() {
        assert_eq!(classify_direction(6.0, 5.0), Some(Direction::Down));
        assert_eq!(classify_direction(-6.0, 5.0), Some(Direction::Up));
        assert_eq!(classify_direction(5.0, 5.0), None);
        assert_eq!(classify_direction(-5.0, 5.0), None);
        assert_eq!(classify_direction(0.0, 5.0), None);
    }

    #[test]
    fn test_single_reversal_scenario() {
        let config = BobConfig::default();
        let ys: Vec<Option<f32>> = [100.0, 94.0, 88.0, 94.0, 100.0, 106.0]
            .iter()
            .map(|y| Some(*y))
            .collect();
        let (state, events) = run(&ys, &config);
        assert_eq!(state.bob_count, 1);
        assert_eq!(state.last_direction, Some(Direction::Down));
        let bobs: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, BobEvent::Bob { .. }))
            .collect();
        assert_eq!(bobs, vec![&BobEvent::Bob { total: 1, timestamp_ms: 300.0 }]);
        assert_eq!(state.bob_timestamps, VecDeque::from(vec![300.0]));
    }

    #[test]
    fn test_full_cycle_counts_two() {
        let config = BobConfig::default();
        let ys: Vec<Option<f32>> = [100.0, 90.0, 100.0, 90.0].iter().map(|y| Some(*y)).collect();
        let (state, _) = run(&ys, &config);
        assert_eq!(state.bob_count, 2);
    }

    #[test]
    fn test_jitter_inside_dead_zone_ignored() {
        let config = BobConfig::default();
        let ys: Vec<Option<f32>> = [100.0, 103.0, 99.0, 104.0, 100.0, 96.0]
            .iter()
            .map(|y| Some(*y))
            .collect();
        let (state, events) = run(&ys, &config);
        assert_eq!(state.bob_count, 0);
        assert!(events.is_empty(), "no movement expected, got {:?}", events);
    }

    #[test]
    fn test_none_frames_never_constitute_a_change() {
        let config = BobConfig::default();
        // Up, dead-zone, Up: still one direction, no bob
        let ys: Vec<Option<f32>> = [100.0, 90.0, 89.0, 80.0].iter().map(|y| Some(*y)).collect();
        let (state, _) = run(&ys, &config);
        assert_eq!(state.bob_count, 0);
        assert_eq!(state.last_direction, Some(Direction::Up));
    }

    #[test]
    fn test_missing_face_resets_baseline() {
        let config = BobConfig::default();
        let (state, _) = run(&[Some(100.0), Some(90.0), None, Some(200.0)], &config);
        // the 90 -> 200 jump spans the gap and is never measured
        assert_eq!(state.bob_count, 0);
        assert_eq!(state.previous_reference_y, Some(200.0));
        assert_eq!(state.last_direction, Some(Direction::Up));

        let (state, events) = state.advance(Some(210.0), 500.0, &config);
        assert_eq!(state.bob_count, 1);
        assert!(events.contains(&BobEvent::Bob { total: 1, timestamp_ms: 500.0 }));
    }

    #[test]
    fn test_movement_event_carries_delta() {
        let config = BobConfig::default();
        let (_, events) = run(&[Some(100.0), Some(92.5)], &config);
        assert_eq!(
            events,
            vec![BobEvent::Movement {
                magnitude: 7.5,
                raw_delta: -7.5,
                direction: Direction::Up,
            }]
        );
    }

    #[test]
    fn test_count_equals_sign_changes_random() {
        let config = BobConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut y = 240.0f32;
            let mut ys = vec![Some(y)];
            for _ in 0..200 {
                let delta: f32 = rng.gen_range(-12.0..12.0);
                y += delta;
                ys.push(Some(y));
            }

            // independent count: sign changes among non-dead-zone deltas
            let mut last: Option<Direction> = None;
            let mut changes = 0;
            for w in ys.windows(2) {
                let (a, b) = (w[0].unwrap(), w[1].unwrap());
                if let Some(d) = classify_direction(b - a, config.threshold_px) {
                    if last.map_or(false, |l| l != d) {
                        changes += 1;
                    }
                    last = Some(d);
                }
            }

            let (state, _) = run(&ys, &config);
            assert_eq!(state.bob_count, changes);
            assert_eq!(state.bob_timestamps.len() as u32, changes);
        }
    }

    #[test]
    fn test_prune_window() {
        let mut state = BobState::new();
        state.bob_timestamps = VecDeque::from(vec![0.0, 1000.0, 30_000.0, 61_000.0]);
        state.prune(61_000.0, 60_000.0);
        assert_eq!(state.bob_timestamps, VecDeque::from(vec![30_000.0, 61_000.0]));
    }

    #[test]
    fn test_reset() {
        let config = BobConfig::default();
        let (mut state, _) = run(&[Some(100.0), Some(90.0), Some(100.0)], &config);
        assert_eq!(state.bob_count, 1);
        state.reset();
        assert_eq!(state, BobState::default());
    }

    #[test]
    fn test_reference_point_lookup() {
        use crate::landmarks::Keypoint;
        let config = BobConfig::default();
        let face = PoseResult::new(vec![Keypoint::new(0, 1.0, 2.0), Keypoint::new(1, 3.0, 4.0)]);
        assert_eq!(config.reference_point(&face), Some(Point::new(3.0, 4.0)));
        assert_eq!(config.reference_point(&PoseResult::default()), None);
    }

    #[test]
    fn test_status_sexp() {
        let sexp = BobState::new().status_sexp();
        assert!(sexp.contains(":bob-count 0"));
        assert!(sexp.contains(":direction nil"));
    }
}
