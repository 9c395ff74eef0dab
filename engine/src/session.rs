//! The frame loop: one tracking session from camera acquisition to stop.
//!
//! Each `tick` pulls a frame, asks the keypoint source for face and hand
//! poses, then runs the detectors, the entity lifecycle and collection in
//! a fixed order.  Everything here is owned by the session and touched
//! from one thread only; the stop flag is the single shared value.
//!
//! Per-frame detection failures are logged, counted and reported as
//! events.  They leave detector state exactly as it was.  A frame where
//! the model ran and found no face is different: it drops the bob
//! baseline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::detect::bob::{BobEvent, BobState};
use crate::detect::gesture::{self, GestureState, GestureType};
use crate::detect::region;
use crate::detect::slash::SlashState;
use crate::error::{DetectionError, TrackerError};
use crate::events::{EventQueue, TrackerEvent};
use crate::game::collect::{CollectOutcome, Collector, Inventory, PendingCollection};
use crate::game::entity::{Collectible, LifecycleEvent, Spawner};
use crate::landmarks::{HandJoint, HandPose, Point, PoseResult};
use crate::metrics::{self, MetricsSnapshot};
use crate::source::{CameraLease, CameraProvider, Frame, KeypointSource};

// ── Frame report ───────────────────────────────────────────

/// Geometry produced by one tick, for renderers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    /// Bob reference point, if a face was detected.
    pub face_reference: Option<Point>,
    /// Accepted hand keypoints.
    pub hand: Option<PoseResult>,
    pub hand_rejected: bool,
    pub gesture: Option<GestureType>,
    /// Pinch hit-test point.
    pub anchor: Option<Point>,
    pub collectibles: Vec<Collectible>,
    pub pending: Vec<PendingCollection>,
    pub detection_failed: bool,
}

impl FrameReport {
    pub fn to_sexp(&self) -> String {
        let opt_point = |p: Option<Point>| p.map_or_else(|| "nil".to_string(), |p| p.to_sexp());
        let entities: Vec<String> = self.collectibles.iter().map(|c| c.to_sexp()).collect();
        format!(
            "(:frame {} :timestamp-ms {:.0} :face {} :hand {} :hand-rejected {} :gesture {} :anchor {} :collectibles ({}) :pending {} :failed {})",
            self.frame_index,
            self.timestamp_ms,
            opt_point(self.face_reference),
            self.hand.as_ref().map_or(0, |h| h.len()),
            if self.hand_rejected { "t" } else { "nil" },
            gesture::gesture_str(self.gesture),
            opt_point(self.anchor),
            entities.join(" "),
            self.pending.len(),
            if self.detection_failed { "t" } else { "nil" },
        )
    }
}

// ── Session ────────────────────────────────────────────────

pub struct TrackingSession {
    config: EngineConfig,
    camera: CameraLease,
    source: Box<dyn KeypointSource>,
    stop: Arc<AtomicBool>,

    bob: BobState,
    slash: SlashState,
    gesture: GestureState,
    spawner: Spawner,
    collector: Collector,
    events: EventQueue,

    started_at_ms: Option<f64>,
    last_tick_ms: f64,
    final_metrics: Option<MetricsSnapshot>,
    frames: u64,
    detection_failures: u64,
    last_report: FrameReport,
}

impl TrackingSession {
    /// Load the model, then acquire the camera.
    ///
    /// Both failures are fatal and returned as-is; nothing is retried.
    pub fn start(
        config: EngineConfig,
        camera: &mut dyn CameraProvider,
        mut source: Box<dyn KeypointSource>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        source.load()?;
        let camera = CameraLease::acquire(camera)?;

        info!(
            "tracking session started ({}x{})",
            config.frame.width, config.frame.height
        );

        Ok(Self {
            spawner: Spawner::new(&config.spawn),
            events: EventQueue::with_capacity(config.event_capacity),
            config,
            camera,
            source,
            stop: Arc::new(AtomicBool::new(false)),
            bob: BobState::new(),
            slash: SlashState::new(),
            gesture: GestureState::new(),
            collector: Collector::new(),
            started_at_ms: None,
            last_tick_ms: 0.0,
            final_metrics: None,
            frames: 0,
            detection_failures: 0,
            last_report: FrameReport::default(),
        })
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bob_state(&self) -> &BobState {
        &self.bob
    }

    pub fn inventory(&self) -> &Inventory {
        self.collector.inventory()
    }

    pub fn live_collectibles(&self) -> &[Collectible] {
        self.spawner.live()
    }

    pub fn last_report(&self) -> &FrameReport {
        &self.last_report
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn detection_failures(&self) -> u64 {
        self.detection_failures
    }

    /// Shared flag that stops the session from another context.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn camera_held(&self) -> bool {
        self.camera.is_held()
    }

    pub fn drain_events(&mut self) -> Vec<TrackerEvent> {
        self.events.drain()
    }

    // ── Control ────────────────────────────────────────────

    /// Request a stop and release the camera now.
    pub fn stop(&mut self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("tracking session stopping after {} frames", self.frames);
        }
        self.finish();
    }

    /// Freeze the final metrics, then release the camera and clear the bob
    /// detector.  Runs once per stop.
    fn finish(&mut self) {
        if self.final_metrics.is_none() {
            let snapshot = self.live_metrics(self.last_tick_ms);
            self.final_metrics = Some(snapshot);
            self.bob.reset();
        }
        self.camera.release();
    }

    /// Clear all counters, detectors, entities and the inventory.
    pub fn reset(&mut self) {
        self.bob.reset();
        self.slash.reset();
        self.gesture.reset();
        self.spawner.reset();
        self.collector.reset();
        self.events.clear();
        self.detection_failures = 0;
        self.started_at_ms = None;
        self.final_metrics = None;
        self.last_report = FrameReport::default();
        info!("tracking session reset");
    }

    pub fn set_bob_threshold(&mut self, px: f32) -> Result<(), TrackerError> {
        if !px.is_finite() || px <= 0.0 {
            return Err(TrackerError::Config(format!("invalid bob threshold: {px}")));
        }
        self.config.bob.threshold_px = px;
        info!("bob threshold set to {:.1}px", px);
        Ok(())
    }

    pub fn set_slash_speed(&mut self, px_s: f32) -> Result<(), TrackerError> {
        if !px_s.is_finite() || px_s <= 0.0 {
            return Err(TrackerError::Config(format!("invalid slash speed: {px_s}")));
        }
        self.config.slash.min_speed_px_s = px_s;
        info!("slash speed set to {:.0}px/s", px_s);
        Ok(())
    }

    // ── Metrics ────────────────────────────────────────────

    /// Bob rate over the trailing window.  After a stop this is the rate
    /// at the last tick.
    pub fn bobs_per_minute(&mut self, now_ms: f64) -> u32 {
        match &self.final_metrics {
            Some(m) => m.bobs_per_minute,
            None => metrics::bobs_per_minute(&mut self.bob, now_ms, &self.config.metrics),
        }
    }

    /// Session metrics.  A stopped session reports the snapshot taken when
    /// it stopped.
    pub fn metrics(&mut self, now_ms: f64) -> MetricsSnapshot {
        match &self.final_metrics {
            Some(m) => m.clone(),
            None => self.live_metrics(now_ms),
        }
    }

    fn live_metrics(&mut self, now_ms: f64) -> MetricsSnapshot {
        let bobs_per_minute = metrics::bobs_per_minute(&mut self.bob, now_ms, &self.config.metrics);
        MetricsSnapshot {
            bob_count: self.bob.bob_count,
            bobs_per_minute,
            distance_m: metrics::distance_m(self.bob.bob_count, &self.config.metrics),
            slashes: self.slash.slash_count,
            collected: self.collector.inventory().total(),
            score: self.collector.score(),
            session_s: self
                .started_at_ms
                .map_or(0.0, |start| (now_ms - start).max(0.0) / 1000.0),
            detection_failures: self.detection_failures,
            spawned: self.spawner.spawned_total(),
            misses: self.collector.misses_reported(),
            events_dropped: self.events.dropped(),
        }
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:running {} :camera {} :frames {} :last-tick-ms {:.0} :bob {} :gesture {} :live {} :pending {} :score {})",
            if self.is_stopped() { "nil" } else { "t" },
            if self.camera.is_held() { "t" } else { "nil" },
            self.frames,
            self.last_tick_ms,
            self.bob.status_sexp(),
            gesture::gesture_str(self.gesture.active()),
            self.spawner.live().len(),
            self.collector.pending().count(),
            self.collector.score(),
        )
    }

    // ── Frame loop ─────────────────────────────────────────

    /// Run one frame.  Returns `None` once the session has stopped,
    /// including when a stop arrives while the model is running; that
    /// frame's results are discarded.
    pub fn tick(&mut self, now_ms: f64) -> Option<&FrameReport> {
        if self.is_stopped() {
            self.finish();
            return None;
        }
        self.started_at_ms.get_or_insert(now_ms);
        self.last_tick_ms = now_ms;

        let mut report = FrameReport {
            timestamp_ms: now_ms,
            ..FrameReport::default()
        };

        match self.camera.next_frame(now_ms) {
            Ok(frame) => {
                report.frame_index = frame.index;
                if !self.detect(&frame, &mut report) {
                    self.finish();
                    return None;
                }
            }
            Err(_) if self.camera.is_exhausted() => {
                info!("camera stream ended");
                self.stop();
                return None;
            }
            Err(e) => {
                self.record_failure(&e);
                report.detection_failed = true;
            }
        }

        self.advance_game(now_ms, &mut report);
        self.bob.prune(now_ms, self.config.metrics.window_ms);

        self.frames += 1;
        report.collectibles = self.spawner.live().to_vec();
        report.pending = self.collector.pending().copied().collect();
        self.last_report = report;
        Some(&self.last_report)
    }

    /// Face and hand detection for one frame.  Returns false if a stop
    /// arrived during an estimate call.
    fn detect(&mut self, frame: &Frame, report: &mut FrameReport) -> bool {
        let face = self.source.estimate_face_pose(frame);
        if self.is_stopped() {
            return false;
        }
        let hand = self.source.estimate_hand_pose(frame);
        if self.is_stopped() {
            return false;
        }

        match face {
            Ok(face) => self.update_bob(face.as_ref(), frame.timestamp_ms, report),
            Err(e) => {
                self.record_failure(&e);
                report.detection_failed = true;
            }
        }

        match hand {
            Ok(hand) => {
                if let Err(e) = self.update_hand(hand, frame, report) {
                    self.record_failure(&e);
                    report.detection_failed = true;
                }
            }
            Err(e) => {
                self.record_failure(&e);
                report.detection_failed = true;
            }
        }
        true
    }

    fn update_bob(&mut self, face: Option<&PoseResult>, now_ms: f64, report: &mut FrameReport) {
        let reference = face.and_then(|f| self.config.bob.reference_point(f));
        report.face_reference = reference;

        let bob = std::mem::take(&mut self.bob);
        let (bob, events) = bob.advance(reference.map(|p| p.y), now_ms, &self.config.bob);
        self.bob = bob;

        for event in events {
            self.events.push(match event {
                BobEvent::Movement {
                    magnitude,
                    raw_delta,
                    direction,
                } => TrackerEvent::Movement {
                    magnitude,
                    raw_delta,
                    direction,
                },
                BobEvent::Bob {
                    total,
                    timestamp_ms,
                } => TrackerEvent::BobDetected {
                    total,
                    timestamp_ms,
                },
            });
        }
    }

    /// Region filter, gesture classification and slash detection.
    ///
    /// A malformed hand is returned as an error before any state changes.
    fn update_hand(
        &mut self,
        raw: Option<PoseResult>,
        frame: &Frame,
        report: &mut FrameReport,
    ) -> Result<(), DetectionError> {
        let mut hand = None;
        if let Some(pose) = raw {
            let verdict = region::evaluate(&pose, frame.size, &self.config.region);
            match verdict {
                Some(v) if v.rejected => {
                    report.hand_rejected = true;
                    self.events.push(TrackerEvent::HandRejected { anchor: v.anchor });
                }
                Some(_) => {
                    hand = Some(HandPose::from_pose(&pose)?);
                    report.hand = Some(pose);
                }
                None => {}
            }
        }

        let detected = hand
            .as_ref()
            .and_then(|h| gesture::classify(h, &self.config.gesture));
        if let Some(change) = self.gesture.update(detected, frame.timestamp_ms) {
            self.events.push(TrackerEvent::GestureChanged {
                from: change.from,
                to: change.to,
            });
        }
        report.gesture = detected;

        let flat_wrist = match (&hand, detected) {
            (Some(h), Some(GestureType::FlatHand)) => Some(h.joint(HandJoint::Wrist)),
            _ => None,
        };
        let slash = std::mem::take(&mut self.slash);
        let (slash, fired) = slash.advance(flat_wrist, frame.timestamp_ms, &self.config.slash);
        self.slash = slash;
        if let Some(s) = fired {
            self.events.push(TrackerEvent::Slash {
                start: s.start,
                end: s.end,
                angle: s.angle,
                speed: s.speed,
            });
        }

        if let (Some(h), Some(GestureType::Pinch)) = (&hand, detected) {
            report.anchor = Some(gesture::pinch_anchor(h));
        }
        Ok(())
    }

    /// Spawn/age/prune, pinch collection, then due commits.
    fn advance_game(&mut self, now_ms: f64, report: &mut FrameReport) {
        for event in self.spawner.tick(now_ms, self.config.frame, &self.config.spawn) {
            self.events.push(match event {
                LifecycleEvent::Spawned { id, kind, x } => TrackerEvent::Spawned { id, kind, x },
                LifecycleEvent::OutOfBounds { id, kind } => TrackerEvent::OutOfBounds { id, kind },
            });
        }

        if let Some(anchor) = report.anchor {
            match self
                .collector
                .try_collect(anchor, &mut self.spawner, now_ms, &self.config.collect)
            {
                CollectOutcome::Hit(p) => self.events.push(TrackerEvent::Collected {
                    id: p.id,
                    kind: p.kind,
                    pending_delta: 1,
                    point: p.point,
                }),
                CollectOutcome::Missed(point) => self.events.push(TrackerEvent::Missed { point }),
                CollectOutcome::MissSuppressed => {}
            }
        }

        for c in self.collector.commit_due(now_ms) {
            self.events.push(TrackerEvent::CollectionCommitted {
                kind: c.kind,
                count: c.count,
                score: c.score,
            });
        }
    }

    fn record_failure(&mut self, err: &DetectionError) {
        self.detection_failures += 1;
        warn!("frame detection failed: {}", err);
        self.events.push(TrackerEvent::DetectionFailed {
            reason: err.to_string(),
        });
    }
}
