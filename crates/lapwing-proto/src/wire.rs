//! Request/response frames for the shared-record protocol.
//!
//! One JSON document per line; every request gets exactly one response.

use serde::{Deserialize, Serialize};

use crate::command::{DetectionReport, VisionCommand};
use crate::detection::BoundingBox;
use crate::state::StateTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    GetState,
    SetState { state: StateTag },
    PushCommand { command: VisionCommand },
    PopCommand,
    PushDetection { report: DetectionReport },
    DrainDetections,
    SetEnvironment { boxes: Vec<BoundingBox> },
    GetEnvironment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    State { state: StateTag },
    Command { command: Option<VisionCommand> },
    Detections { reports: Vec<DetectionReport> },
    Environment { boxes: Vec<BoundingBox> },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_tagged_by_op() {
        let s = serde_json::to_string(&Request::SetState { state: StateTag::Land }).unwrap();
        assert_eq!(s, r#"{"op":"set_state","state":"land"}"#);
        let back: Request = serde_json::from_str(&s).unwrap();
        assert_eq!(back, Request::SetState { state: StateTag::Land });
    }
}
