//! Vision side of the stack: frame sources, detectors and the frame loop
//! that feeds them.

pub mod config;
pub mod doctor;
pub mod error;
pub mod frame;
pub mod imgproc;
pub mod module;
pub mod obstacle;
pub mod pipeline;
pub mod text;
pub mod tracker;

pub use config::{SourceKind, VisionConfig};
pub use error::{VisionError, VisionResult};
pub use frame::{Frame, FrameSource};
pub use pipeline::{Detectors, PipelineSummary, StopReason, VisionPipeline};

use lapwing_link::CommHandle;
use lapwing_proto::VisionMode;

use obstacle::ObstacleFinder;
use text::{TesseractCli, TextDetector};
use tracker::Tracker;

impl Detectors {
    pub fn from_config(cfg: &VisionConfig) -> Self {
        Self {
            finder: ObstacleFinder::new(cfg.obstacle.clone()),
            tracker: Tracker::new(),
            text: TextDetector::new(Box::new(TesseractCli::new(cfg.ocr_command.clone(), cfg.ocr_language.clone()))),
        }
    }
}

/// Opens the configured source and runs the frame loop until the source
/// ends, a `stop` arrives or the mission is over.
pub async fn run_vision(cfg: &VisionConfig, comm: CommHandle, mode: VisionMode) -> VisionResult<PipelineSummary> {
    let source = FrameSource::open(cfg).await?;
    VisionPipeline::new(source, comm, Detectors::from_config(cfg), mode).run().await
}
