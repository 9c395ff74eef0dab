//! Keypoint data model for face and hand landmark results.
//!
//! Models the 21-joint hand topology and the 468-point face mesh as
//! delivered by the external landmark model, in frame-pixel space.
//! Provides validated hand views, joint distance queries, and the
//! palm-centre estimate used by the gesture classifiers.

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

// ── Geometry ───────────────────────────────────────────────

/// A 2D position in frame-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn to_sexp(&self) -> String {
        format!("(:x {:.1} :y {:.1})", self.x, self.y)
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: f32,
    pub height: f32,
}

impl FrameSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(640.0, 480.0)
    }
}

// ── Keypoints ──────────────────────────────────────────────

/// A single landmark position. `id` indexes a fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Keypoint {
    pub fn new(id: usize, x: f32, y: f32) -> Self {
        Self { id, x, y, z: None }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// All keypoints for one detected subject in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseResult {
    pub keypoints: Vec<Keypoint>,
}

impl PoseResult {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Look up a keypoint by topology id.
    ///
    /// Results are normally ordered by id, so the positional slot is
    /// checked before falling back to a scan.
    pub fn keypoint(&self, id: usize) -> Option<&Keypoint> {
        match self.keypoints.get(id) {
            Some(kp) if kp.id == id => Some(kp),
            _ => self.keypoints.iter().find(|kp| kp.id == id),
        }
    }
}

// ── Face topology ──────────────────────────────────────────

/// Number of points in the face mesh topology.
pub const FACE_LANDMARK_COUNT: usize = 468;

/// Face mesh index of the nose tip, the default bob reference point.
pub const FACE_NOSE_TIP: usize = 1;

// ── Hand topology ──────────────────────────────────────────

/// The 21 hand joints of the landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandJoint {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of joints per hand.
pub const HAND_JOINT_COUNT: usize = 21;

impl HandJoint {
    const ALL: [HandJoint; HAND_JOINT_COUNT] = [
        Self::Wrist,
        Self::ThumbCmc,
        Self::ThumbMcp,
        Self::ThumbIp,
        Self::ThumbTip,
        Self::IndexMcp,
        Self::IndexPip,
        Self::IndexDip,
        Self::IndexTip,
        Self::MiddleMcp,
        Self::MiddlePip,
        Self::MiddleDip,
        Self::MiddleTip,
        Self::RingMcp,
        Self::RingPip,
        Self::RingDip,
        Self::RingTip,
        Self::PinkyMcp,
        Self::PinkyPip,
        Self::PinkyDip,
        Self::PinkyTip,
    ];

    /// Convert joint enum to topology index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }

    /// Fingertip joints, thumb first.
    pub fn fingertip_joints() -> [HandJoint; 5] {
        [
            Self::ThumbTip,
            Self::IndexTip,
            Self::MiddleTip,
            Self::RingTip,
            Self::PinkyTip,
        ]
    }

    /// Knuckles that, together with the wrist, bound the palm.
    pub fn palm_joints() -> [HandJoint; 5] {
        [
            Self::Wrist,
            Self::IndexMcp,
            Self::MiddleMcp,
            Self::RingMcp,
            Self::PinkyMcp,
        ]
    }
}

// ── Hand pose ──────────────────────────────────────────────

/// A complete hand with every joint present, indexed by `HandJoint`.
#[derive(Debug, Clone, PartialEq)]
pub struct HandPose {
    joints: [Point; HAND_JOINT_COUNT],
}

impl HandPose {
    /// Build a hand view from a raw pose result.
    ///
    /// Every one of the 21 joint ids must be present exactly once.
    pub fn from_pose(pose: &PoseResult) -> Result<Self, DetectionError> {
        let mut joints = [Point::default(); HAND_JOINT_COUNT];
        let mut seen = [false; HAND_JOINT_COUNT];
        for kp in &pose.keypoints {
            if kp.id >= HAND_JOINT_COUNT || seen[kp.id] {
                return Err(DetectionError::MalformedPose {
                    expected: HAND_JOINT_COUNT,
                    got: pose.len(),
                });
            }
            seen[kp.id] = true;
            joints[kp.id] = kp.point();
        }
        if seen.iter().any(|s| !s) {
            return Err(DetectionError::MalformedPose {
                expected: HAND_JOINT_COUNT,
                got: pose.len(),
            });
        }
        Ok(Self { joints })
    }

    pub fn from_points(joints: [Point; HAND_JOINT_COUNT]) -> Self {
        Self { joints }
    }

    pub fn joint(&self, joint: HandJoint) -> Point {
        self.joints[joint.index()]
    }

    pub fn points(&self) -> &[Point; HAND_JOINT_COUNT] {
        &self.joints
    }

    /// Euclidean distance between two joints, in pixels.
    pub fn joint_distance(&self, a: HandJoint, b: HandJoint) -> f32 {
        self.joint(a).distance(&self.joint(b))
    }

    /// Mean of the wrist and the four finger knuckles.
    pub fn palm_center(&self) -> Point {
        let joints = HandJoint::palm_joints();
        let (sx, sy) = joints.iter().fold((0.0, 0.0), |(sx, sy), j| {
            let p = self.joint(*j);
            (sx + p.x, sy + p.y)
        });
        let n = joints.len() as f32;
        Point::new(sx / n, sy / n)
    }

    /// Uniformly scale every joint about the origin.
    pub fn scaled(&self, k: f32) -> Self {
        let mut joints = self.joints;
        for p in &mut joints {
            p.x *= k;
            p.y *= k;
        }
        Self { joints }
    }

    pub fn to_pose(&self) -> PoseResult {
        PoseResult::new(
            self.joints
                .iter()
                .enumerate()
                .map(|(id, p)| Keypoint::new(id, p.x, p.y))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_hand() -> PoseResult {
        PoseResult::new(
            (0..HAND_JOINT_COUNT)
                .map(|i| Keypoint::new(i, i as f32 * 10.0, 100.0))
                .collect(),
        )
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.midpoint(&b), Point::new(1.5, 2.0));
    }

    #[test]
    fn test_keypoint_lookup_out_of_order() {
        let pose = PoseResult::new(vec![Keypoint::new(1, 5.0, 6.0), Keypoint::new(0, 1.0, 2.0)]);
        assert_eq!(pose.keypoint(0).map(|k| k.x), Some(1.0));
        assert_eq!(pose.keypoint(1).map(|k| k.y), Some(6.0));
        assert!(pose.keypoint(2).is_none());
    }

    #[test]
    fn test_hand_pose_from_complete_pose() {
        let hand = HandPose::from_pose(&line_hand()).unwrap();
        assert_eq!(hand.joint(HandJoint::IndexTip), Point::new(80.0, 100.0));
        assert!((hand.joint_distance(HandJoint::Wrist, HandJoint::PinkyTip) - 200.0).abs() < 1e-4);
    }

    #[test]
    fn test_hand_pose_rejects_missing_joint() {
        let mut pose = line_hand();
        pose.keypoints.pop();
        assert!(matches!(
            HandPose::from_pose(&pose),
            Err(DetectionError::MalformedPose { expected: 21, got: 20 })
        ));
    }

    #[test]
    fn test_hand_pose_rejects_duplicate_joint() {
        let mut pose = line_hand();
        pose.keypoints[20].id = 3;
        assert!(HandPose::from_pose(&pose).is_err());
    }

    #[test]
    fn test_palm_center() {
        let hand = HandPose::from_pose(&line_hand()).unwrap();
        // wrist 0, mcps 50, 90, 130, 170 → mean x = 88
        assert_eq!(hand.palm_center(), Point::new(88.0, 100.0));
    }

    #[test]
    fn test_joint_index_roundtrip() {
        for i in 0..HAND_JOINT_COUNT {
            assert_eq!(HandJoint::from_index(i).map(|j| j.index()), Some(i));
        }
        assert_eq!(HandJoint::from_index(21), None);
        assert_eq!(HandJoint::ThumbTip.as_str(), "thumb-tip");
    }
}
