//! Slash detection: fast, straight wrist sweeps while the hand is flat.
//!
//! Keeps a short ring buffer of wrist samples.  Speed is measured between
//! the oldest and newest sample, and a cooldown stops one sweep from
//! firing repeatedly.  Losing the flat-hand pose clears the history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::Point;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashConfig {
    /// Maximum wrist samples retained.
    pub history_len: usize,
    /// Samples required before speed is evaluated.
    pub min_samples: usize,
    /// Minimum straight-line speed (px/s) to fire.
    pub min_speed_px_s: f32,
    /// Time after a slash during which no further slash fires (ms).
    pub cooldown_ms: f64,
}

impl Default for SlashConfig {
    fn default() -> Self {
        Self {
            history_len: 10,
            min_samples: 5,
            min_speed_px_s: 800.0,
            cooldown_ms: 500.0,
        }
    }
}

impl SlashConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:history-len {} :min-samples {} :min-speed {:.0} :cooldown-ms {:.0})",
            self.history_len, self.min_samples, self.min_speed_px_s, self.cooldown_ms
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlashSample {
    pub point: Point,
    pub timestamp_ms: f64,
}

/// A detected slash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlashEvent {
    pub start: Point,
    pub end: Point,
    /// `atan2(dy, dx)` in radians, image coordinates.
    pub angle: f32,
    /// Pixels per second.
    pub speed: f32,
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlashState {
    pub history: VecDeque<SlashSample>,
    pub cooldown_until_ms: Option<f64>,
    pub slash_count: u32,
}

impl SlashState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_cooldown(&self, now_ms: f64) -> bool {
        self.cooldown_until_ms.map_or(false, |until| now_ms < until)
    }

    /// Advance by one frame.  `wrist` is `Some` only while the hand is
    /// classified flat; `None` clears the history.
    pub fn advance(
        mut self,
        wrist: Option<Point>,
        now_ms: f64,
        config: &SlashConfig,
    ) -> (Self, Option<SlashEvent>) {
        let point = match wrist {
            Some(p) => p,
            None => {
                self.history.clear();
                return (self, None);
            }
        };

        self.history.push_back(SlashSample {
            point,
            timestamp_ms: now_ms,
        });
        while self.history.len() > config.history_len.max(1) {
            self.history.pop_front();
        }

        if self.history.len() < config.min_samples {
            return (self, None);
        }

        let (oldest, newest) = match (self.history.front(), self.history.back()) {
            (Some(a), Some(b)) => (*a, *b),
            _ => return (self, None),
        };
        let elapsed_s = ((newest.timestamp_ms - oldest.timestamp_ms) / 1000.0) as f32;
        if elapsed_s <= 0.0 {
            return (self, None);
        }

        let dx = newest.point.x - oldest.point.x;
        let dy = newest.point.y - oldest.point.y;
        let speed = (dx * dx + dy * dy).sqrt() / elapsed_s;

        if speed <= config.min_speed_px_s || self.in_cooldown(now_ms) {
            return (self, None);
        }

        self.cooldown_until_ms = Some(now_ms + config.cooldown_ms);
        self.slash_count += 1;
        let event = SlashEvent {
            start: oldest.point,
            end: newest.point,
            angle: dy.atan2(dx),
            speed,
            timestamp_ms: now_ms,
        };
        debug!(
            "Slash detected: speed={:.0}px/s angle={:.2}rad",
            event.speed, event.angle
        );
        (self, Some(event))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `n` flat-hand samples moving `step_px` in x every `dt_ms`.
    fn sweep(
        mut state: SlashState,
        start_ms: f64,
        n: usize,
        step_px: f32,
        dt_ms: f64,
        config: &SlashConfig,
    ) -> (SlashState, Vec<SlashEvent>) {
        let mut events = Vec::new();
        for i in 0..n {
            let p = Point::new(100.0 + i as f32 * step_px, 200.0);
            let (next, evt) = state.advance(Some(p), start_ms + i as f64 * dt_ms, config);
            state = next;
            events.extend(evt);
        }
        (state, events)
    }

    #[test]
    fn test_needs_min_samples() {
        let config = SlashConfig::default();
        // 4 very fast samples: not enough history yet
        let (state, events) = sweep(SlashState::new(), 0.0, 4, 100.0, 10.0, &config);
        assert!(events.is_empty());
        assert_eq!(state.history.len(), 4);
    }

    #[test]
    fn test_fast_sweep_fires() {
        let config = SlashConfig::default();
        // 30px per 16ms ≈ 1875 px/s
        let (state, events) = sweep(SlashState::new(), 0.0, 5, 30.0, 16.0, &config);
        assert_eq!(events.len(), 1);
        let evt = events[0];
        assert_eq!(evt.start, Point::new(100.0, 200.0));
        assert_eq!(evt.end, Point::new(220.0, 200.0));
        assert!((evt.speed - 1875.0).abs() < 1.0, "speed {}", evt.speed);
        assert!(evt.angle.abs() < 1e-6);
        assert_eq!(state.slash_count, 1);
    }

    #[test]
    fn test_slow_sweep_ignored() {
        let config = SlashConfig::default();
        // 5px per 16ms ≈ 312 px/s
        let (_, events) = sweep(SlashState::new(), 0.0, 10, 5.0, 16.0, &config);
        assert!(events.is_empty());
    }

    #[test]
    fn test_cooldown_suppresses_continued_motion() {
        let config = SlashConfig::default();
        let (state, events) = sweep(SlashState::new(), 0.0, 12, 30.0, 16.0, &config);
        // all 12 frames lie within 500ms of the first slash at t=64
        assert_eq!(events.len(), 1);
        assert!(state.in_cooldown(100.0));
        assert!(!state.in_cooldown(564.0));
    }

    #[test]
    fn test_fires_again_after_cooldown() {
        let config = SlashConfig::default();
        let (state, first) = sweep(SlashState::new(), 0.0, 5, 30.0, 16.0, &config);
        assert_eq!(first.len(), 1);
        let (state, _) = state.advance(None, 300.0, &config);
        let (state, second) = sweep(state, 600.0, 5, 30.0, 16.0, &config);
        assert_eq!(second.len(), 1);
        assert_eq!(state.slash_count, 2);
    }

    #[test]
    fn test_losing_flat_hand_clears_history() {
        let config = SlashConfig::default();
        let (state, _) = sweep(SlashState::new(), 0.0, 4, 1.0, 16.0, &config);
        let (state, evt) = state.advance(None, 80.0, &config);
        assert!(evt.is_none());
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_history_bounded() {
        let config = SlashConfig::default();
        let (state, _) = sweep(SlashState::new(), 0.0, 25, 1.0, 16.0, &config);
        assert_eq!(state.history.len(), 10);
        assert_eq!(state.history.front().map(|s| s.timestamp_ms), Some(15.0 * 16.0));
    }

    #[test]
    fn test_angle_of_downward_sweep() {
        let config = SlashConfig::default();
        let mut state = SlashState::new();
        let mut fired = None;
        for i in 0..5 {
            let p = Point::new(300.0, 100.0 + i as f32 * 40.0);
            let (next, evt) = state.advance(Some(p), i as f64 * 16.0, &config);
            state = next;
            fired = fired.or(evt);
        }
        let evt = fired.expect("downward sweep should fire");
        assert!((evt.angle - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_zero_elapsed_time_ignored() {
        let config = SlashConfig::default();
        let mut state = SlashState::new();
        for i in 0..5 {
            let (next, evt) = state.advance(Some(Point::new(i as f32 * 100.0, 0.0)), 10.0, &config);
            state = next;
            assert!(evt.is_none());
        }
    }
}
