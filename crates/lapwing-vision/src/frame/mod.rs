//! Aligned depth + color frames from a camera helper, a recording or a
//! synthetic scene.

pub mod live;
pub mod preview;
pub mod record;
pub mod replay;
pub mod synth;

use image::RgbImage;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::{SourceKind, VisionConfig};
use crate::error::{VisionError, VisionResult};
use crate::imgproc::DepthImage;
use live::LiveCamera;
use preview::Preview;
use record::Recorder;
use replay::Replay;
use synth::SyntheticScene;

/// One aligned capture. `depth` is millimetres with 0 for no reading;
/// `color` is RGB on the same pixel grid.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub captured_at: OffsetDateTime,
    pub color: RgbImage,
    pub depth: DepthImage,
    /// Metres per raw depth unit as reported by the sensor.
    pub depth_scale: f32,
}

pub enum Feed {
    Live(LiveCamera),
    Replay(Replay),
    Sim(SyntheticScene),
}

/// What a feed hands back before indexing.
pub struct Capture {
    pub color: RgbImage,
    pub depth: DepthImage,
    pub depth_scale: f32,
    pub captured_at: OffsetDateTime,
}

pub struct FrameSource {
    feed: Feed,
    recorder: Option<Recorder>,
    preview: Option<Preview>,
    next_index: u64,
}

impl FrameSource {
    pub fn new(feed: Feed) -> Self {
        Self { feed, recorder: None, preview: None, next_index: 0 }
    }

    pub async fn open(cfg: &VisionConfig) -> VisionResult<Self> {
        let feed = match cfg.source {
            SourceKind::Live => Feed::Live(LiveCamera::spawn(&cfg.live_command, cfg.depth_scale).await?),
            SourceKind::Replay => Feed::Replay(Replay::open(&cfg.replay_dir, cfg.replay_repeat).await?),
            SourceKind::Sim => Feed::Sim(SyntheticScene::new(cfg.sim.clone(), cfg.depth_scale)),
        };
        info!("vision: {:?} source", cfg.source);
        let mut src = Self::new(feed);
        if let Some(dir) = &cfg.record_dir {
            src.recorder = Some(Recorder::create(dir).await?);
        }
        if let Some(path) = &cfg.display_path {
            src.preview = Some(Preview::new(path.clone()));
        }
        Ok(src)
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_preview(mut self, preview: Preview) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Next frame; `FrameSourceExhausted` once a finite feed runs out.
    pub async fn next_frame(&mut self) -> VisionResult<Frame> {
        let cap = match &mut self.feed {
            Feed::Live(cam) => cam.next().await?,
            Feed::Replay(r) => r.next().await?,
            Feed::Sim(s) => s.next().await?,
        };
        if cap.color.dimensions() != cap.depth.dimensions() {
            return Err(VisionError::Source(format!(
                "color {:?} and depth {:?} grids differ",
                cap.color.dimensions(),
                cap.depth.dimensions()
            )));
        }
        let frame = Frame {
            index: self.next_index,
            captured_at: cap.captured_at,
            color: cap.color,
            depth: cap.depth,
            depth_scale: cap.depth_scale,
        };
        self.next_index += 1;

        if let Some(rec) = &mut self.recorder {
            if let Err(e) = rec.write(&frame).await {
                warn!("record: frame {}: {}", frame.index, e);
            }
        }
        if let Some(p) = &self.preview {
            if let Err(e) = p.show(&frame.color).await {
                warn!("display: {}", e);
            }
        }
        Ok(frame)
    }
}
