//! Frame loop: pull a frame, apply pending commands, run the detectors of
//! the current mode, publish.
//!
//! Detectors are plain synchronous calls; the only suspension points are
//! the frame source and the shared record.

use lapwing_link::CommHandle;
use lapwing_proto::{BoundingBox, DetectionReport, FailureFlags, ModuleObservation, VisionMode};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info, warn};

use crate::error::{VisionError, VisionResult};
use crate::frame::{Frame, FrameSource};
use crate::module;
use crate::obstacle::ObstacleFinder;
use crate::text::TextDetector;
use crate::tracker::Tracker;

pub struct Detectors {
    pub finder: ObstacleFinder,
    pub tracker: Tracker,
    pub text: TextDetector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A finite source ran dry.
    Exhausted,
    /// `stop` command from the flight side.
    Stopped,
    /// Shared state reached `final` or `exit`.
    MissionOver,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub frames: u64,
    pub last_mode: VisionMode,
    pub reason: StopReason,
}

pub struct VisionPipeline {
    source: FrameSource,
    comm: CommHandle,
    detectors: Detectors,
    mode: VisionMode,
    failures: HashMap<VisionMode, FailureFlags>,
    frames: u64,
}

impl VisionPipeline {
    pub fn new(source: FrameSource, comm: CommHandle, detectors: Detectors, mode: VisionMode) -> Self {
        Self { source, comm, detectors, mode, failures: HashMap::new(), frames: 0 }
    }

    pub fn mode(&self) -> VisionMode {
        self.mode
    }

    /// Flags from the last frame processed in `mode`.
    pub fn failures(&self, mode: VisionMode) -> FailureFlags {
        self.failures.get(&mode).copied().unwrap_or_default()
    }

    pub async fn run(mut self) -> VisionResult<PipelineSummary> {
        info!("vision: pipeline up in {:?}", self.mode);
        let reason = loop {
            let frame = match self.source.next_frame().await {
                Ok(f) => f,
                Err(VisionError::FrameSourceExhausted) => break StopReason::Exhausted,
                Err(e) => return Err(e),
            };

            if !self.apply_commands().await? {
                break StopReason::Stopped;
            }
            if self.comm.get_state().await?.is_terminal() {
                break StopReason::MissionOver;
            }

            let report = self.process(&frame);
            if report.mode != VisionMode::Idle {
                self.comm.set_environment(report.boxes.clone()).await?;
                self.comm.push_detection(report).await?;
            }
        };
        info!("vision: pipeline done after {} frames ({:?})", self.frames, reason);
        Ok(PipelineSummary { frames: self.frames, last_mode: self.mode, reason })
    }

    /// Drains the command queue; false on `stop`.
    async fn apply_commands(&mut self) -> VisionResult<bool> {
        while let Some(cmd) = self.comm.pop_command().await? {
            match cmd.mode() {
                Some(mode) => {
                    if mode != self.mode {
                        info!("vision: mode {:?} -> {:?}", self.mode, mode);
                        if self.mode == VisionMode::ObstacleDetection {
                            self.detectors.tracker.clear();
                        }
                    }
                    self.mode = mode;
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Runs the detectors of the current mode on one frame.
    pub fn process(&mut self, frame: &Frame) -> DetectionReport {
        self.frames += 1;
        let mode = self.mode;
        let mut flags = FailureFlags::default();
        let mut module_obs: Option<ModuleObservation> = None;

        let boxes: Vec<BoundingBox> = match mode {
            VisionMode::ObstacleDetection => {
                let finder = &self.detectors.finder;
                match guarded("obstacle", || Ok(finder.find(&frame.color))) {
                    Ok(found) => {
                        self.detectors.tracker.update(found);
                        self.detectors.tracker.persistent()
                    }
                    Err(e) => {
                        warn!("vision: frame {}: {}", frame.index, e);
                        flags.obstacle_failed = true;
                        Vec::new()
                    }
                }
            }
            VisionMode::TextDetection => {
                let text = &self.detectors.text;
                match guarded("text", || text.detect(&frame.color, &frame.depth)) {
                    Ok(found) => found,
                    Err(e) => {
                        warn!("vision: frame {}: {}", frame.index, e);
                        flags.text_failed = true;
                        Vec::new()
                    }
                }
            }
            VisionMode::ModuleDetection => {
                match guarded("module", || Ok(module::observe(&frame.color, &frame.depth))) {
                    Ok((outcome, geometry)) => {
                        let mut boxes = Vec::new();
                        if let Some((x, y)) = outcome.center() {
                            boxes.push(module::center_box(x, y));
                        }
                        match geometry {
                            Some(Ok(obs)) => {
                                boxes.push(obs.bounds.clone());
                                module_obs = Some(obs);
                            }
                            Some(Err(e)) => {
                                warn!("vision: frame {}: geometry: {}", frame.index, e);
                                flags.geometry_failed = true;
                            }
                            None => {}
                        }
                        boxes
                    }
                    Err(e) => {
                        warn!("vision: frame {}: {}", frame.index, e);
                        flags.module_failed = true;
                        Vec::new()
                    }
                }
            }
            VisionMode::Idle => Vec::new(),
        };

        debug!("vision: frame {} {:?}: {} boxes", frame.index, mode, boxes.len());
        self.failures.insert(mode, flags);
        DetectionReport { frame_index: frame.index, mode, boxes, module: module_obs, failures: flags }
    }
}

/// Runs a detector, turning a panic into a `DetectorFailure`.
fn guarded<T>(detector: &'static str, f: impl FnOnce() -> VisionResult<T>) -> VisionResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".into());
            Err(VisionError::detector(detector, reason))
        }
    }
}
