use serde::Deserialize;
use std::path::PathBuf;

use crate::frame::synth::SceneConfig;
use crate::obstacle::BlobParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Live,
    Replay,
    Sim,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub source: SourceKind,

    /// Camera helper and its arguments; it must speak the LWF1 stream.
    pub live_command: Vec<String>,

    pub replay_dir: PathBuf,
    pub replay_repeat: bool,

    pub sim: SceneConfig,

    /// Write the latest frame here as a JPEG (headless display).
    pub display_path: Option<PathBuf>,
    /// Record every frame to this directory.
    pub record_dir: Option<PathBuf>,

    /// Metres per depth unit for sources that do not carry one.
    pub depth_scale: f32,

    pub obstacle: BlobParams,

    pub ocr_command: String,
    pub ocr_language: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Live,
            live_command: vec!["lapwing-camera".into()],
            replay_dir: PathBuf::from("recordings"),
            replay_repeat: false,
            sim: SceneConfig::default(),
            display_path: None,
            record_dir: None,
            depth_scale: 0.001,
            obstacle: BlobParams::default(),
            ocr_command: "tesseract".into(),
            ocr_language: "rus".into(),
        }
    }
}
