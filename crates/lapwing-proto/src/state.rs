use serde::{Deserialize, Serialize};
use std::fmt;

/// Mission stage published through the shared record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    Start,
    Takeoff,
    EarlyLaps,
    ToMast,
    DetectModule,
    ReturnLaps,
    Land,
    Final,
    Exit,
}

impl StateTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateTag::Start => "start",
            StateTag::Takeoff => "takeoff",
            StateTag::EarlyLaps => "early_laps",
            StateTag::ToMast => "to_mast",
            StateTag::DetectModule => "detect_module",
            StateTag::ReturnLaps => "return_laps",
            StateTag::Land => "land",
            StateTag::Final => "final",
            StateTag::Exit => "exit",
        }
    }

    /// `final` and `exit` both end the mission for the supervisor.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StateTag::Final | StateTag::Exit)
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionTestKind {
    #[default]
    None,
    Text,
    Module,
}

/// Which mission stages run and how many laps each performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    pub early_laps_enabled: bool,
    pub early_laps_count: u32,
    pub go_to_mast_enabled: bool,
    pub detect_module_enabled: bool,
    pub return_laps_enabled: bool,
    pub return_laps_count: u32,
    pub simple_takeoff_enabled: bool,
    pub vision_enabled: bool,
    pub vision_test_kind: VisionTestKind,
    pub run_title: String,
    pub run_description: String,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            early_laps_enabled: true,
            early_laps_count: 2,
            go_to_mast_enabled: true,
            detect_module_enabled: true,
            return_laps_enabled: true,
            return_laps_count: 2,
            simple_takeoff_enabled: false,
            vision_enabled: true,
            vision_test_kind: VisionTestKind::None,
            run_title: "competition run".into(),
            run_description: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_match_wire_format() {
        for tag in [StateTag::EarlyLaps, StateTag::DetectModule, StateTag::Exit] {
            let s = serde_json::to_string(&tag).unwrap();
            assert_eq!(s, format!("\"{}\"", tag));
        }
        assert!(StateTag::Exit.is_terminal());
        assert!(!StateTag::Land.is_terminal());
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let s: StateSettings = serde_json::from_str(r#"{"early_laps_count": 1}"#).unwrap();
        assert_eq!(s.early_laps_count, 1);
        assert!(s.go_to_mast_enabled);
        assert_eq!(s.vision_test_kind, VisionTestKind::None);
    }
}
