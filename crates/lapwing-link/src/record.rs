use lapwing_proto::wire::{Request, Response};
use lapwing_proto::{BoundingBox, DetectionReport, StateTag, VisionCommand};
use std::collections::VecDeque;

/// Queue bound; the oldest entries are dropped when a side stops draining.
pub const QUEUE_CAP: usize = 256;

/// The record shared by the flight and vision processes.
#[derive(Debug, Clone)]
pub struct CommState {
    state: StateTag,
    commands: VecDeque<VisionCommand>,
    detections: VecDeque<DetectionReport>,
    environment: Vec<BoundingBox>,
}

impl Default for CommState {
    fn default() -> Self {
        Self::new(StateTag::Start)
    }
}

impl CommState {
    pub fn new(state: StateTag) -> Self {
        Self { state, commands: VecDeque::new(), detections: VecDeque::new(), environment: Vec::new() }
    }

    pub fn state(&self) -> StateTag {
        self.state
    }

    pub fn set_state(&mut self, state: StateTag) {
        self.state = state;
    }

    pub fn push_command(&mut self, command: VisionCommand) {
        if self.commands.len() == QUEUE_CAP {
            self.commands.pop_front();
        }
        self.commands.push_back(command);
    }

    pub fn pop_command(&mut self) -> Option<VisionCommand> {
        self.commands.pop_front()
    }

    pub fn push_detection(&mut self, report: DetectionReport) {
        if self.detections.len() == QUEUE_CAP {
            self.detections.pop_front();
        }
        self.detections.push_back(report);
    }

    pub fn drain_detections(&mut self) -> Vec<DetectionReport> {
        self.detections.drain(..).collect()
    }

    pub fn set_environment(&mut self, boxes: Vec<BoundingBox>) {
        self.environment = boxes;
    }

    pub fn environment(&self) -> Vec<BoundingBox> {
        self.environment.clone()
    }

    /// Executes one protocol request against the record.
    pub fn apply(&mut self, req: Request) -> Response {
        match req {
            Request::GetState => Response::State { state: self.state() },
            Request::SetState { state } => {
                self.set_state(state);
                Response::Ok
            }
            Request::PushCommand { command } => {
                self.push_command(command);
                Response::Ok
            }
            Request::PopCommand => Response::Command { command: self.pop_command() },
            Request::PushDetection { report } => {
                self.push_detection(report);
                Response::Ok
            }
            Request::DrainDetections => Response::Detections { reports: self.drain_detections() },
            Request::SetEnvironment { boxes } => {
                self.set_environment(boxes);
                Response::Ok
            }
            Request::GetEnvironment => Response::Environment { boxes: self.environment() },
        }
    }
}
