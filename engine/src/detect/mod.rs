//! Per-frame detection: face-zone filtering, gesture classifiers, and
//! the cross-frame motion detectors.
//!
//! Provides:
//! - `region`: rejects hand detections that land on the face
//! - `gesture`: pinch, fist and flat-hand predicates
//! - `bob`: head-bob reversal counting
//! - `slash`: fast flat-hand sweeps

pub mod bob;
pub mod gesture;
pub mod region;
pub mod slash;

pub use bob::{BobConfig, BobEvent, BobState, Direction};
pub use gesture::{GestureConfig, GestureState, GestureType};
pub use region::RegionConfig;
pub use slash::{SlashConfig, SlashEvent, SlashState};
