use anyhow::Result;
use tracing::info;

use crate::config::{SourceKind, VisionConfig};

pub fn check_vision(cfg: &VisionConfig) -> Result<()> {
    match cfg.source {
        SourceKind::Live => {
            anyhow::ensure!(!cfg.live_command.is_empty(), "vision.live_command is empty");
        }
        SourceKind::Replay => {
            anyhow::ensure!(cfg.replay_dir.is_dir(), "vision.replay_dir {} is not a directory", cfg.replay_dir.display());
        }
        SourceKind::Sim => {
            let s = &cfg.sim;
            anyhow::ensure!(s.width >= 32 && s.height >= 32, "vision.sim frame too small");
            anyhow::ensure!(s.fps > 0.0, "vision.sim.fps must be positive");
            anyhow::ensure!(s.module_center.0 < s.width && s.module_center.1 < s.height, "vision.sim.module_center outside the frame");
        }
    }
    anyhow::ensure!(cfg.depth_scale > 0.0, "vision.depth_scale must be positive");
    let o = &cfg.obstacle;
    anyhow::ensure!(o.min_threshold < o.max_threshold, "vision.obstacle thresholds are reversed");
    anyhow::ensure!(o.threshold_step > 0, "vision.obstacle.threshold_step must be positive");
    anyhow::ensure!(o.min_area < o.max_area, "vision.obstacle area bounds are reversed");
    anyhow::ensure!(!cfg.ocr_command.is_empty(), "vision.ocr_command is empty");
    info!("doctor: vision config OK ({:?} source)", cfg.source);
    Ok(())
}
