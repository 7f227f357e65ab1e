use anyhow::{Context, Result};
use lapwing_fc::FcConfig;
use lapwing_link::LinkConfig;
use lapwing_nav::MissionPlan;
use lapwing_proto::StateSettings;
use lapwing_vision::VisionConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mission: MissionCfg,
    pub fc: FcConfig,
    pub vision: VisionConfig,
    pub link: LinkConfig,
    pub supervisor: SupervisorCfg,
}

/// Stage switches sit directly under `[mission]`, geometry under
/// `[mission.plan]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MissionCfg {
    #[serde(flatten)]
    pub settings: StateSettings,
    pub plan: MissionPlan,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorCfg {
    /// Child respawns allowed over the whole run, crashes only.
    pub max_restarts: u32,
    pub poll_interval_ms: u64,
    /// How long the vision child gets to notice the mission is over.
    pub vision_grace_ms: u64,
}

impl Default for SupervisorCfg {
    fn default() -> Self {
        Self { max_restarts: 3, poll_interval_ms: 500, vision_grace_ms: 5000 }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapwing_proto::VisionTestKind;
    use lapwing_vision::SourceKind;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.mission.settings, StateSettings::default());
        assert_eq!(cfg.mission.plan, MissionPlan::default());
        assert_eq!(cfg.supervisor.max_restarts, 3);
    }

    #[test]
    fn sections_parse() {
        let cfg: Config = toml::from_str(
            r#"
            [mission]
            early_laps_count = 1
            return_laps_enabled = false
            vision_test_kind = "module"

            [mission.plan]
            mast_alt_m = 4.5

            [vision]
            source = "replay"
            replay_dir = "/data/run3"

            [link]
            bind = "127.0.0.1:47700"

            [supervisor]
            max_restarts = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mission.settings.early_laps_count, 1);
        assert!(!cfg.mission.settings.return_laps_enabled);
        assert!(cfg.mission.settings.early_laps_enabled);
        assert_eq!(cfg.mission.settings.vision_test_kind, VisionTestKind::Module);
        assert_eq!(cfg.mission.plan.mast_alt_m, 4.5);
        assert_eq!(cfg.vision.source, SourceKind::Replay);
        assert_eq!(cfg.link.bind, "127.0.0.1:47700");
        assert_eq!(cfg.supervisor.max_restarts, 0);
        assert_eq!(cfg.supervisor.poll_interval_ms, 500);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/lapwing.toml"))).is_err());
        assert!(load_config(None).is_ok());
    }
}
