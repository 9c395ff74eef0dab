//! Face-region rejection for spurious hand detections.
//!
//! The hand model occasionally fires on facial features.  Such detections
//! sit in the upper-central part of the frame and have a much tighter
//! keypoint spread than a real hand at the same confidence.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{FrameSize, HandJoint, Point, PoseResult};

/// Thresholds for the face-zone heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Enable face false-positive rejection.
    pub enabled: bool,
    /// Fraction of the frame height, from the top, treated as face zone.
    pub face_zone_top_fraction: f32,
    /// Central fraction of the frame width treated as face zone.
    pub face_zone_center_fraction: f32,
    /// Mean consecutive-keypoint distance (px) below which a detection
    /// inside the face zone is rejected.
    pub min_spread_px: f32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            face_zone_top_fraction: 0.4,
            face_zone_center_fraction: 0.6,
            min_spread_px: 15.0,
        }
    }
}

impl RegionConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:enabled {} :face-zone-top {:.2} :face-zone-center {:.2} :min-spread-px {:.1})",
            if self.enabled { "t" } else { "nil" },
            self.face_zone_top_fraction,
            self.face_zone_center_fraction,
            self.min_spread_px,
        )
    }
}

/// Outcome of the face-zone test for one hand detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionVerdict {
    pub anchor: Point,
    pub in_face_zone: bool,
    pub mean_spread: f32,
    pub rejected: bool,
}

/// Evaluate a hand detection against the face zone.
///
/// Returns `None` for an empty pose.  The anchor is the wrist when present,
/// otherwise the first keypoint.
pub fn evaluate(pose: &PoseResult, frame: FrameSize, config: &RegionConfig) -> Option<RegionVerdict> {
    let anchor = pose
        .keypoint(HandJoint::Wrist.index())
        .or_else(|| pose.keypoints.first())?
        .point();

    let in_face_zone = in_face_zone(anchor, frame, config);
    let mean_spread = mean_consecutive_distance(pose);
    let rejected = config.enabled && in_face_zone && mean_spread < config.min_spread_px;

    if rejected {
        debug!(
            "Hand rejected as face false-positive at ({:.0}, {:.0}), spread {:.1}px",
            anchor.x, anchor.y, mean_spread
        );
    }

    Some(RegionVerdict {
        anchor,
        in_face_zone,
        mean_spread,
        rejected,
    })
}

/// True if the detection should be discarded as a face false-positive.
pub fn is_face_false_positive(pose: &PoseResult, frame: FrameSize, config: &RegionConfig) -> bool {
    evaluate(pose, frame, config).map_or(false, |v| v.rejected)
}

fn in_face_zone(p: Point, frame: FrameSize, config: &RegionConfig) -> bool {
    let top_limit = frame.height * config.face_zone_top_fraction;
    let side_margin = frame.width * (1.0 - config.face_zone_center_fraction) / 2.0;
    p.y < top_limit && p.x >= side_margin && p.x <= frame.width - side_margin
}

/// Mean distance between consecutive keypoints in result order.
fn mean_consecutive_distance(pose: &PoseResult) -> f32 {
    if pose.len() < 2 {
        return 0.0;
    }
    let total: f32 = pose
        .keypoints
        .windows(2)
        .map(|w| w[0].point().distance(&w[1].point()))
        .sum();
    total / (pose.len() - 1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Keypoint, HAND_JOINT_COUNT};

    /// 21 keypoints laid out horizontally from `(x, y)` with `step` spacing.
    fn strip(x: f32, y: f32, step: f32) -> PoseResult {
        PoseResult::new(
            (0..HAND_JOINT_COUNT)
                .map(|i| Keypoint::new(i, x + i as f32 * step, y))
                .collect(),
        )
    }

    fn frame() -> FrameSize {
        FrameSize::new(640.0, 480.0)
    }

    #[test]
    fn test_tight_cluster_in_face_zone_rejected() {
        let config = RegionConfig::default();
        let pose = strip(300.0, 100.0, 2.0);
        let verdict = evaluate(&pose, frame(), &config).unwrap();
        assert!(verdict.in_face_zone);
        assert!((verdict.mean_spread - 2.0).abs() < 1e-4);
        assert!(verdict.rejected);
        assert!(is_face_false_positive(&pose, frame(), &config));
    }

    #[test]
    fn test_wide_hand_in_face_zone_kept() {
        let config = RegionConfig::default();
        let pose = strip(200.0, 100.0, 20.0);
        assert!(!is_face_false_positive(&pose, frame(), &config));
    }

    #[test]
    fn test_tight_cluster_outside_zone_kept() {
        let config = RegionConfig::default();
        // below the top 40%
        assert!(!is_face_false_positive(&strip(300.0, 300.0, 2.0), frame(), &config));
        // left of the central 60% (margin = 128px)
        assert!(!is_face_false_positive(&strip(50.0, 100.0, 2.0), frame(), &config));
    }

    #[test]
    fn test_zone_boundaries() {
        let config = RegionConfig::default();
        let f = frame();
        assert!(in_face_zone(Point::new(128.0, 0.0), f, &config));
        assert!(in_face_zone(Point::new(512.0, 191.9), f, &config));
        assert!(!in_face_zone(Point::new(127.9, 50.0), f, &config));
        assert!(!in_face_zone(Point::new(320.0, 192.0), f, &config));
    }

    #[test]
    fn test_disabled_never_rejects() {
        let config = RegionConfig {
            enabled: false,
            ..RegionConfig::default()
        };
        assert!(!is_face_false_positive(&strip(300.0, 100.0, 1.0), frame(), &config));
    }

    #[test]
    fn test_empty_pose() {
        let config = RegionConfig::default();
        assert!(evaluate(&PoseResult::default(), frame(), &config).is_none());
        assert!(!is_face_false_positive(&PoseResult::default(), frame(), &config));
    }

    #[test]
    fn test_config_sexp() {
        let sexp = RegionConfig::default().config_sexp();
        assert!(sexp.contains(":enabled t"));
        assert!(sexp.contains(":min-spread-px 15.0"));
    }
}
