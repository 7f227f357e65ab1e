use serde::{Deserialize, Serialize};

use crate::detection::{BoundingBox, FailureFlags};

/// Detector set the vision pipeline runs on each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionMode {
    ObstacleDetection,
    TextDetection,
    ModuleDetection,
    #[default]
    Idle,
}

/// Flight -> vision instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionCommand {
    /// Mission started; watch for obstacles during the laps.
    Start,
    /// Transit to the mast; look for the module label.
    ToMast,
    ModuleDetection,
    TextDetection,
    ObstacleDetection,
    Idle,
    /// Leave the frame loop.
    Stop,
}

impl VisionCommand {
    /// Mode the pipeline switches to, `None` for `Stop`.
    pub fn mode(&self) -> Option<VisionMode> {
        match self {
            VisionCommand::Start | VisionCommand::ObstacleDetection => Some(VisionMode::ObstacleDetection),
            VisionCommand::ToMast | VisionCommand::TextDetection => Some(VisionMode::TextDetection),
            VisionCommand::ModuleDetection => Some(VisionMode::ModuleDetection),
            VisionCommand::Idle => Some(VisionMode::Idle),
            VisionCommand::Stop => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleObservation {
    pub center_x: u32,
    pub center_y: u32,
    pub depth_mm: f64,
    pub bounds: BoundingBox,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    /// `None` when no usable rectangle edge was found.
    pub roll_deg: Option<f64>,
}

/// Vision -> flight result for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub frame_index: u64,
    pub mode: VisionMode,
    pub boxes: Vec<BoundingBox>,
    pub module: Option<ModuleObservation>,
    pub failures: FailureFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_modes() {
        assert_eq!(VisionCommand::Start.mode(), Some(VisionMode::ObstacleDetection));
        assert_eq!(VisionCommand::ToMast.mode(), Some(VisionMode::TextDetection));
        assert_eq!(VisionCommand::ModuleDetection.mode(), Some(VisionMode::ModuleDetection));
        assert_eq!(VisionCommand::Stop.mode(), None);
    }
}
