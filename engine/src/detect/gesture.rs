//! Gesture classification from hand landmark positions.
//!
//! Classifies fist, flat hand, and pinch from a single frame's `HandPose`.
//! The classifiers keep no memory; `GestureState` only tracks which gesture
//! is active so that changes can be reported.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{HandJoint, HandPose, Point};

// ── Gesture types ──────────────────────────────────────────

/// Recognized gesture types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureType {
    /// Thumb and index fingertips close together.
    Pinch,
    /// All fingertips close to the palm.
    Fist,
    /// Index, middle and ring extended and level.
    FlatHand,
}

impl GestureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pinch => "pinch",
            Self::Fist => "fist",
            Self::FlatHand => "flat-hand",
        }
    }
}

/// Render an optional gesture the way the command surface expects.
pub fn gesture_str(gesture: Option<GestureType>) -> &'static str {
    gesture.map_or("nil", |g| g.as_str())
}

// ── Config ─────────────────────────────────────────────────

/// Thresholds for gesture classification, in frame pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Upper bound on the pinch distance threshold.
    pub pinch_cap_px: f32,
    /// Pinch threshold as a fraction of the thumb-index reach distance.
    pub pinch_reach_ratio: f32,
    /// Maximum tip-to-palm distance for index through pinky in a fist.
    pub fist_finger_threshold_px: f32,
    /// Maximum thumb-tip-to-palm distance in a fist.
    pub fist_thumb_threshold_px: f32,
    /// Minimum tip-to-knuckle distance for a finger to count as extended.
    pub flat_min_extension_px: f32,
    /// Maximum vertical spread of the index, middle and ring tips.
    pub flat_parallel_tolerance_px: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_cap_px: 60.0,
            pinch_reach_ratio: 0.5,
            fist_finger_threshold_px: 80.0,
            fist_thumb_threshold_px: 60.0,
            flat_min_extension_px: 60.0,
            flat_parallel_tolerance_px: 30.0,
        }
    }
}

impl GestureConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:pinch-cap-px {:.1} :pinch-reach-ratio {:.2} :fist-finger-px {:.1} :fist-thumb-px {:.1} :flat-min-extension-px {:.1} :flat-tolerance-px {:.1})",
            self.pinch_cap_px,
            self.pinch_reach_ratio,
            self.fist_finger_threshold_px,
            self.fist_thumb_threshold_px,
            self.flat_min_extension_px,
            self.flat_parallel_tolerance_px,
        )
    }
}

// ── Classifiers ────────────────────────────────────────────

/// Distance below which thumb and index tips count as pinched.
pub fn pinch_threshold(hand: &HandPose, config: &GestureConfig) -> f32 {
    let reach = hand.joint_distance(HandJoint::ThumbIp, HandJoint::IndexPip);
    config.pinch_cap_px.min(reach * config.pinch_reach_ratio)
}

pub fn is_pinch(hand: &HandPose, config: &GestureConfig) -> bool {
    let pinch_dist = hand.joint_distance(HandJoint::ThumbTip, HandJoint::IndexTip);
    pinch_dist < pinch_threshold(hand, config)
}

pub fn is_closed_fist(hand: &HandPose, config: &GestureConfig) -> bool {
    let palm = hand.palm_center();
    HandJoint::fingertip_joints().iter().all(|tip| {
        let limit = if *tip == HandJoint::ThumbTip {
            config.fist_thumb_threshold_px
        } else {
            config.fist_finger_threshold_px
        };
        hand.joint(*tip).distance(&palm) < limit
    })
}

pub fn is_flat_hand(hand: &HandPose, config: &GestureConfig) -> bool {
    let fingers = [
        (HandJoint::IndexTip, HandJoint::IndexMcp),
        (HandJoint::MiddleTip, HandJoint::MiddleMcp),
        (HandJoint::RingTip, HandJoint::RingMcp),
    ];

    let extended = fingers
        .iter()
        .all(|(tip, base)| hand.joint_distance(*tip, *base) > config.flat_min_extension_px);
    if !extended {
        return false;
    }

    let (min_y, max_y) = fingers.iter().fold((f32::MAX, f32::MIN), |(lo, hi), (tip, _)| {
        let y = hand.joint(*tip).y;
        (lo.min(y), hi.max(y))
    });
    max_y - min_y <= config.flat_parallel_tolerance_px
}

/// Classify one frame.  Fist wins over flat hand, and flat hand
/// suppresses pinch evaluation.
pub fn classify(hand: &HandPose, config: &GestureConfig) -> Option<GestureType> {
    if is_closed_fist(hand, config) {
        return Some(GestureType::Fist);
    }
    if is_flat_hand(hand, config) {
        return Some(GestureType::FlatHand);
    }
    if is_pinch(hand, config) {
        return Some(GestureType::Pinch);
    }
    None
}

/// Hit-test point while pinching: midpoint of thumb and index tips.
pub fn pinch_anchor(hand: &HandPose) -> Point {
    hand.joint(HandJoint::ThumbTip)
        .midpoint(&hand.joint(HandJoint::IndexTip))
}

// ── Active gesture tracking ────────────────────────────────

/// A change in the active gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureChange {
    pub from: Option<GestureType>,
    pub to: Option<GestureType>,
    /// How long `from` was held (ms).
    pub held_ms: f64,
}

/// Tracks the active gesture across frames.
#[derive(Debug, Clone, Default)]
pub struct GestureState {
    active: Option<GestureType>,
    since_ms: f64,
}

impl GestureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<GestureType> {
        self.active
    }

    pub fn is_active(&self, gesture: GestureType) -> bool {
        self.active == Some(gesture)
    }

    /// Record this frame's classification; returns a change if it differs.
    pub fn update(&mut self, detected: Option<GestureType>, now_ms: f64) -> Option<GestureChange> {
        if detected == self.active {
            return None;
        }
        let change = GestureChange {
            from: self.active,
            to: detected,
            held_ms: if self.active.is_some() { now_ms - self.since_ms } else { 0.0 },
        };
        debug!(
            "Gesture {} -> {} after {:.0}ms",
            gesture_str(change.from),
            gesture_str(change.to),
            change.held_ms
        );
        self.active = detected;
        self.since_ms = now_ms;
        Some(change)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ── Test helpers ───────────────────────────────────────────


// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::landmarks::HAND_JOINT_COUNT;

    /// Hand whose only meaningful joints set the pinch geometry.
    fn pinch_geometry(pinch_dist: f32, reach: f32) -> HandPose {
        let mut pts = *open_hand(300.0, 400.0).points();
        pts[HandJoint::ThumbIp.index()] = Point::new(0.0, 0.0);
        pts[HandJoint::IndexPip.index()] = Point::new(reach, 0.0);
        pts[HandJoint::ThumbTip.index()] = Point::new(0.0, 50.0);
        pts[HandJoint::IndexTip.index()] = Point::new(pinch_dist, 50.0);
        HandPose::from_points(pts)
    }

    #[test]
    fn test_open_hand_no_gesture() {
        let config = GestureConfig::default();
        let hand = open_hand(300.0, 400.0);
        assert!(!is_pinch(&hand, &config));
        assert!(!is_closed_fist(&hand, &config));
        assert!(!is_flat_hand(&hand, &config));
        assert_eq!(classify(&hand, &config), None);
    }

    #[test]
    fn test_pinch_scenario_threshold() {
        // 8px pinch, 40px reach, ratio 0.5, cap 60 → threshold 20
        let config = GestureConfig::default();
        let hand = pinch_geometry(8.0, 40.0);
        assert!((pinch_threshold(&hand, &config) - 20.0).abs() < 1e-4);
        assert!(is_pinch(&hand, &config));
    }

    #[test]
    fn test_pinch_threshold_capped() {
        let config = GestureConfig::default();
        let hand = pinch_geometry(59.0, 400.0);
        assert!((pinch_threshold(&hand, &config) - 60.0).abs() < 1e-4);
        assert!(is_pinch(&hand, &config));
        assert!(!is_pinch(&pinch_geometry(61.0, 400.0), &config));
    }

    #[test]
    fn test_pinch_scale_invariant() {
        let config = GestureConfig::default();
        for (dist, reach) in [(8.0, 40.0), (25.0, 40.0), (5.0, 12.0), (19.0, 40.0)] {
            let hand = pinch_geometry(dist, reach);
            let base = is_pinch(&hand, &config);
            for k in [0.5, 0.8, 1.25, 1.4] {
                assert_eq!(
                    is_pinch(&hand.scaled(k), &config),
                    base,
                    "pinch flipped for dist {} reach {} scale {}",
                    dist,
                    reach,
                    k
                );
            }
        }
    }

    #[test]
    fn test_pinch_detection() {
        let config = GestureConfig::default();
        let hand = pinching_hand(300.0, 400.0);
        assert_eq!(classify(&hand, &config), Some(GestureType::Pinch));
        let anchor = pinch_anchor(&hand);
        assert_eq!(anchor, Point::new(260.0, 276.0));
    }

    #[test]
    fn test_fist_detection() {
        let config = GestureConfig::default();
        let hand = fist(300.0, 400.0);
        assert!(is_closed_fist(&hand, &config));
        assert_eq!(classify(&hand, &config), Some(GestureType::Fist));
    }

    #[test]
    fn test_fist_thumb_has_own_threshold() {
        let config = GestureConfig::default();
        let mut pts = *fist(300.0, 400.0).points();
        // palm centre is (307.4, 329); 70px away passes the finger limit only
        pts[HandJoint::ThumbTip.index()] = Point::new(237.4, 329.0);
        let hand = HandPose::from_points(pts);
        assert!(!is_closed_fist(&hand, &config));
    }

    #[test]
    fn test_fist_precedes_pinch() {
        let config = GestureConfig::default();
        let mut pts = *fist(300.0, 400.0).points();
        pts[HandJoint::ThumbTip.index()] = Point::new(286.0, 345.0);
        let hand = HandPose::from_points(pts);
        assert!(is_pinch(&hand, &config), "geometry should also read as pinch");
        assert_eq!(classify(&hand, &config), Some(GestureType::Fist));
    }

    #[test]
    fn test_flat_hand_detection() {
        let config = GestureConfig::default();
        let hand = flat_hand(300.0, 400.0);
        assert!(is_flat_hand(&hand, &config));
        assert_eq!(classify(&hand, &config), Some(GestureType::FlatHand));
    }

    #[test]
    fn test_flat_hand_suppresses_pinch() {
        let config = GestureConfig::default();
        let mut pts = *flat_hand(300.0, 400.0).points();
        pts[HandJoint::ThumbTip.index()] = Point::new(270.0, 222.0);
        let hand = HandPose::from_points(pts);
        assert!(is_pinch(&hand, &config), "geometry should also read as pinch");
        assert_eq!(classify(&hand, &config), Some(GestureType::FlatHand));
    }

    #[test]
    fn test_flat_hand_requires_level_tips() {
        let config = GestureConfig::default();
        let mut pts = *flat_hand(300.0, 400.0).points();
        pts[HandJoint::RingTip.index()] = Point::new(328.0, 250.0);
        assert!(!is_flat_hand(&HandPose::from_points(pts), &config));
    }

    #[test]
    fn test_flat_hand_requires_extension() {
        let config = GestureConfig::default();
        let mut pts = [Point::new(0.0, 0.0); HAND_JOINT_COUNT];
        pts[HandJoint::IndexTip.index()] = Point::new(0.0, 10.0);
        pts[HandJoint::MiddleTip.index()] = Point::new(0.0, 10.0);
        pts[HandJoint::RingTip.index()] = Point::new(0.0, 10.0);
        assert!(!is_flat_hand(&HandPose::from_points(pts), &config));
    }

    #[test]
    fn test_gesture_state_changes() {
        let mut state = GestureState::new();
        assert!(state.update(None, 0.0).is_none());

        let change = state.update(Some(GestureType::Pinch), 100.0).unwrap();
        assert_eq!(change.from, None);
        assert_eq!(change.to, Some(GestureType::Pinch));
        assert!(state.is_active(GestureType::Pinch));

        assert!(state.update(Some(GestureType::Pinch), 150.0).is_none());

        let change = state.update(None, 400.0).unwrap();
        assert_eq!(change.from, Some(GestureType::Pinch));
        assert!((change.held_ms - 300.0).abs() < 1e-9);

        state.update(Some(GestureType::Fist), 500.0);
        state.reset();
        assert_eq!(state.active(), None);
    }

    #[test]
    fn test_gesture_type_as_str() {
        assert_eq!(GestureType::Pinch.as_str(), "pinch");
        assert_eq!(GestureType::Fist.as_str(), "fist");
        assert_eq!(GestureType::FlatHand.as_str(), "flat-hand");
        assert_eq!(gesture_str(None), "nil");
    }

    #[test]
    fn test_config_sexp() {
        let sexp = GestureConfig::default().config_sexp();
        assert!(sexp.contains(":pinch-cap-px 60.0"));
        assert!(sexp.contains(":pinch-reach-ratio 0.50"));
    }
}
