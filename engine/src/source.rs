//! External collaborators: the capture device and the landmark model.
//!
//! The engine never touches pixels.  A `CameraProvider` hands out a frame
//! stream, held through a `CameraLease` that releases it on every exit
//! path, and a `KeypointSource` turns frames into pose results.
//!
//! Shipped implementations:
//! - `VirtualCamera`: frame clock with an optional frame limit
//! - `ReplaySource`: JSON-lines recording of per-frame keypoints
//! - `SyntheticSource`: sinusoidal nose-tip oscillation for demos

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{DetectionError, TrackerError};
use crate::landmarks::{FrameSize, Keypoint, PoseResult, FACE_LANDMARK_COUNT, FACE_NOSE_TIP};

// ── Frames ─────────────────────────────────────────────────

/// One captured frame.  Only metadata travels through the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub timestamp_ms: f64,
    pub size: FrameSize,
}

/// An open capture stream.
pub trait FrameStream {
    fn next_frame(&mut self, now_ms: f64) -> Result<Frame, DetectionError>;

    /// True once the stream can deliver no further frames.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Return the device.  Called exactly once by `CameraLease`.
    fn release(&mut self);
}

pub trait CameraProvider {
    /// Open the capture device.  Fails with `CameraAccess` when permission
    /// is denied or no device exists.
    fn acquire(&mut self) -> Result<Box<dyn FrameStream>, TrackerError>;
}

/// Exclusive hold on an acquired stream, released on drop.
pub struct CameraLease {
    stream: Option<Box<dyn FrameStream>>,
}

impl CameraLease {
    pub fn acquire(provider: &mut dyn CameraProvider) -> Result<Self, TrackerError> {
        let stream = provider.acquire()?;
        info!("camera acquired");
        Ok(Self {
            stream: Some(stream),
        })
    }

    pub fn is_held(&self) -> bool {
        self.stream.is_some()
    }

    pub fn next_frame(&mut self, now_ms: f64) -> Result<Frame, DetectionError> {
        match self.stream.as_mut() {
            Some(stream) => stream.next_frame(now_ms),
            None => Err(DetectionError::FrameUnavailable),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.stream.as_ref().map_or(true, |s| s.is_exhausted())
    }

    /// Release the stream now.  Idempotent.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            info!("camera released");
        }
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Virtual camera ─────────────────────────────────────────

/// A frame clock standing in for a capture device.
#[derive(Debug, Clone)]
pub struct VirtualCamera {
    size: FrameSize,
    frame_limit: Option<u64>,
}

impl VirtualCamera {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            frame_limit: None,
        }
    }

    /// Stop delivering frames after `limit` (e.g. the length of a replay).
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }
}

impl CameraProvider for VirtualCamera {
    fn acquire(&mut self) -> Result<Box<dyn FrameStream>, TrackerError> {
        if self.size.width <= 0.0 || self.size.height <= 0.0 {
            return Err(TrackerError::CameraAccess(format!(
                "unsupported resolution {}x{}",
                self.size.width, self.size.height
            )));
        }
        Ok(Box::new(VirtualStream {
            size: self.size,
            frame_limit: self.frame_limit,
            next_index: 0,
        }))
    }
}

struct VirtualStream {
    size: FrameSize,
    frame_limit: Option<u64>,
    next_index: u64,
}

impl FrameStream for VirtualStream {
    fn next_frame(&mut self, now_ms: f64) -> Result<Frame, DetectionError> {
        if self.is_exhausted() {
            return Err(DetectionError::FrameUnavailable);
        }
        let frame = Frame {
            index: self.next_index,
            timestamp_ms: now_ms,
            size: self.size,
        };
        self.next_index += 1;
        Ok(frame)
    }

    fn is_exhausted(&self) -> bool {
        self.frame_limit.map_or(false, |limit| self.next_index >= limit)
    }

    fn release(&mut self) {
        debug!("virtual stream released after {} frames", self.next_index);
    }
}

// ── Keypoint source ────────────────────────────────────────

/// The landmark model.  `Ok(None)` means nothing was detected; `Err` is a
/// transient inference failure.
pub trait KeypointSource {
    /// Initialise the model.  Fails with `ModelLoad`.
    fn load(&mut self) -> Result<(), TrackerError>;

    fn estimate_face_pose(&mut self, frame: &Frame) -> Result<Option<PoseResult>, DetectionError>;

    fn estimate_hand_pose(&mut self, frame: &Frame) -> Result<Option<PoseResult>, DetectionError>;
}

// ── Replay ─────────────────────────────────────────────────

/// One line of a recording.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReplayRecord {
    pub face: Option<PoseResult>,
    pub hand: Option<PoseResult>,
    /// Simulate an inference failure on this frame.
    pub fail: bool,
}

/// Plays back a JSON-lines recording, one record per frame index.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    records: Vec<ReplayRecord>,
    loaded: bool,
}

impl ReplaySource {
    pub fn new(records: Vec<ReplayRecord>) -> Self {
        Self {
            records,
            loaded: false,
        }
    }

    pub fn open(path: &Path) -> Result<Self, TrackerError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse a recording.  Blank lines and `#` comments are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, TrackerError> {
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(trimmed).map_err(|e| {
                TrackerError::ModelLoad(format!("recording line {}: {}", lineno + 1, e))
            })?;
            records.push(record);
        }
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, frame: &Frame) -> Result<&ReplayRecord, DetectionError> {
        if !self.loaded {
            return Err(DetectionError::Inference("model not loaded".to_string()));
        }
        let record = usize::try_from(frame.index)
            .ok()
            .and_then(|i| self.records.get(i))
            .ok_or(DetectionError::FrameUnavailable)?;
        if record.fail {
            return Err(DetectionError::Inference(format!(
                "recorded failure at frame {}",
                frame.index
            )));
        }
        Ok(record)
    }
}

impl KeypointSource for ReplaySource {
    fn load(&mut self) -> Result<(), TrackerError> {
        if self.records.is_empty() {
            return Err(TrackerError::ModelLoad("recording is empty".to_string()));
        }
        self.loaded = true;
        info!("replay loaded: {} frames", self.records.len());
        Ok(())
    }

    fn estimate_face_pose(&mut self, frame: &Frame) -> Result<Option<PoseResult>, DetectionError> {
        Ok(self.record(frame)?.face.clone())
    }

    fn estimate_hand_pose(&mut self, frame: &Frame) -> Result<Option<PoseResult>, DetectionError> {
        Ok(self.record(frame)?.hand.clone())
    }
}

// ── Synthetic ──────────────────────────────────────────────

/// A face whose nose tip oscillates vertically; no hands.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    /// Full oscillation period (ms).
    pub period_ms: f64,
    /// Peak vertical displacement (px).
    pub amplitude_px: f32,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            period_ms: 1000.0,
            amplitude_px: 20.0,
        }
    }
}

impl SyntheticSource {
    /// Face mesh whose nose tip sits at `(x, y)`.
    pub fn face_at(x: f32, y: f32) -> PoseResult {
        const COLS: usize = 26;
        PoseResult::new(
            (0..FACE_LANDMARK_COUNT)
                .map(|id| {
                    if id == FACE_NOSE_TIP {
                        Keypoint::new(id, x, y)
                    } else {
                        let col = (id % COLS) as f32 - COLS as f32 / 2.0;
                        let row = (id / COLS) as f32 - 9.0;
                        Keypoint::new(id, x + col * 4.0, y + row * 5.0)
                    }
                })
                .collect(),
        )
    }
}

impl KeypointSource for SyntheticSource {
    fn load(&mut self) -> Result<(), TrackerError> {
        if self.period_ms <= 0.0 {
            return Err(TrackerError::ModelLoad("period must be positive".to_string()));
        }
        Ok(())
    }

    fn estimate_face_pose(&mut self, frame: &Frame) -> Result<Option<PoseResult>, DetectionError> {
        let phase = (frame.timestamp_ms / self.period_ms) * std::f64::consts::TAU;
        let y = frame.size.height / 2.0 + self.amplitude_px * phase.sin() as f32;
        Ok(Some(Self::face_at(frame.size.width / 2.0, y)))
    }

    fn estimate_hand_pose(&mut self, _frame: &Frame) -> Result<Option<PoseResult>, DetectionError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    struct CountingStream {
        releases: Rc<Cell<u32>>,
    }

    impl FrameStream for CountingStream {
        fn next_frame(&mut self, now_ms: f64) -> Result<Frame, DetectionError> {
            Ok(Frame {
                index: 0,
                timestamp_ms: now_ms,
                size: FrameSize::default(),
            })
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    struct CountingCamera {
        releases: Rc<Cell<u32>>,
    }

    impl CameraProvider for CountingCamera {
        fn acquire(&mut self) -> Result<Box<dyn FrameStream>, TrackerError> {
            Ok(Box::new(CountingStream {
                releases: self.releases.clone(),
            }))
        }
    }

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            timestamp_ms: index as f64 * 33.0,
            size: FrameSize::default(),
        }
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let releases = Rc::new(Cell::new(0));
        let mut camera = CountingCamera {
            releases: releases.clone(),
        };
        {
            let lease = CameraLease::acquire(&mut camera).unwrap();
            assert!(lease.is_held());
        }
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_lease_release_idempotent() {
        let releases = Rc::new(Cell::new(0));
        let mut camera = CountingCamera {
            releases: releases.clone(),
        };
        let mut lease = CameraLease::acquire(&mut camera).unwrap();
        lease.release();
        lease.release();
        assert!(!lease.is_held());
        assert_eq!(lease.next_frame(0.0), Err(DetectionError::FrameUnavailable));
        drop(lease);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_virtual_camera_frame_limit() {
        let mut camera = VirtualCamera::new(FrameSize::default()).with_frame_limit(2);
        let mut lease = CameraLease::acquire(&mut camera).unwrap();
        assert_eq!(lease.next_frame(0.0).map(|f| f.index), Ok(0));
        assert_eq!(lease.next_frame(33.0).map(|f| f.index), Ok(1));
        assert!(lease.is_exhausted());
        assert_eq!(lease.next_frame(66.0), Err(DetectionError::FrameUnavailable));
    }

    #[test]
    fn test_virtual_camera_rejects_zero_size() {
        let mut camera = VirtualCamera::new(FrameSize::new(0.0, 0.0));
        assert!(matches!(
            CameraLease::acquire(&mut camera),
            Err(TrackerError::CameraAccess(_))
        ));
    }

    #[test]
    fn test_replay_parse_and_play() {
        let data = r#"
# face only
{"face": [{"id": 0, "x": 1.0, "y": 2.0}, {"id": 1, "x": 3.0, "y": 4.0}]}
{"fail": true}

{"hand": [{"id": 0, "x": 10.0, "y": 20.0, "z": 0.5}]}
"#;
        let mut source = ReplaySource::from_reader(Cursor::new(data)).unwrap();
        assert_eq!(source.len(), 3);
        source.load().unwrap();

        let face = source.estimate_face_pose(&frame(0)).unwrap().unwrap();
        assert_eq!(face.keypoint(1).map(|k| k.y), Some(4.0));
        assert_eq!(source.estimate_hand_pose(&frame(0)), Ok(None));

        assert!(matches!(
            source.estimate_face_pose(&frame(1)),
            Err(DetectionError::Inference(_))
        ));

        let hand = source.estimate_hand_pose(&frame(2)).unwrap().unwrap();
        assert_eq!(hand.keypoints[0].z, Some(0.5));
        assert_eq!(source.estimate_face_pose(&frame(3)), Err(DetectionError::FrameUnavailable));
    }

    #[test]
    fn test_replay_bad_line_reports_line_number() {
        let err = ReplaySource::from_reader(Cursor::new("{}\nnot json\n")).unwrap_err();
        assert!(err.to_string().contains("line 2"), "got: {}", err);
    }

    #[test]
    fn test_empty_replay_fails_to_load() {
        let mut source = ReplaySource::new(Vec::new());
        assert!(matches!(source.load(), Err(TrackerError::ModelLoad(_))));
    }

    #[test]
    fn test_replay_requires_load() {
        let mut source = ReplaySource::new(vec![ReplayRecord::default()]);
        assert!(source.estimate_face_pose(&frame(0)).is_err());
    }

    #[test]
    fn test_synthetic_face_oscillates() {
        let mut source = SyntheticSource::default();
        source.load().unwrap();
        let at = |t: f64, source: &mut SyntheticSource| {
            let f = Frame {
                index: 0,
                timestamp_ms: t,
                size: FrameSize::new(640.0, 480.0),
            };
            let face = source.estimate_face_pose(&f).unwrap().unwrap();
            assert_eq!(face.len(), FACE_LANDMARK_COUNT);
            face.keypoint(FACE_NOSE_TIP).map(|k| k.y).unwrap()
        };
        assert!((at(0.0, &mut source) - 240.0).abs() < 1e-3);
        assert!((at(250.0, &mut source) - 260.0).abs() < 1e-3);
        assert!((at(750.0, &mut source) - 220.0).abs() < 1e-3);
    }
}
