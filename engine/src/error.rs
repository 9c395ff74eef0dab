//! Error types for tracking sessions.
//!
//! `TrackerError` is fatal and surfaces from session start or config
//! loading.  `DetectionError` is per-frame and never leaves the frame loop.

use thiserror::Error;

/// Fatal errors.  No automatic retry: the caller must start a new session.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Camera permission denied or no capture device.
    #[error("camera access failed: {0}")]
    CameraAccess(String),

    /// The landmark model failed to initialise.
    #[error("landmark model failed to load: {0}")]
    ModelLoad(String),

    /// Configuration could not be parsed or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transient per-frame failures.  Logged, then treated as "no detection".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// The landmark model raised during inference.
    #[error("inference failed: {0}")]
    Inference(String),

    /// No frame could be read from the camera stream this tick.
    #[error("frame unavailable")]
    FrameUnavailable,

    /// A pose result did not match the expected topology.
    #[error("malformed pose: expected {expected} keypoints, got {got}")]
    MalformedPose { expected: usize, got: usize },
}
