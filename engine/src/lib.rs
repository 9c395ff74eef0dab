//! Bobfit engine: motion and gesture event detection over landmark streams.
//!
//! Turns per-frame face and hand keypoints from an external landmark model
//! into discrete events: head bobs, gesture changes, slashes, and pinch
//! collection of spawned collectibles.  A `TrackingSession` owns every
//! stateful component and is driven one `tick` per frame.

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod game;
pub mod ipc;
pub mod landmarks;
pub mod metrics;
pub mod session;
pub mod source;

pub use config::EngineConfig;
pub use error::{DetectionError, TrackerError};
pub use events::{EventQueue, TrackerEvent};
pub use session::{FrameReport, TrackingSession};
