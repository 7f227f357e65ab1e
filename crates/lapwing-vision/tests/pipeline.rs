use image::{Luma, Rgb, RgbImage};
use lapwing_link::CommHandle;
use lapwing_proto::{StateTag, VisionCommand, VisionMode};
use lapwing_vision::frame::record::Recorder;
use lapwing_vision::frame::replay::Replay;
use lapwing_vision::frame::synth::{SceneConfig, SyntheticScene};
use lapwing_vision::frame::Feed;
use lapwing_vision::imgproc::DepthImage;
use lapwing_vision::obstacle::{BlobParams, ObstacleFinder};
use lapwing_vision::text::{Ocr, OcrWord, TextDetector};
use lapwing_vision::tracker::Tracker;
use lapwing_vision::{Detectors, Frame, FrameSource, StopReason, VisionError, VisionPipeline, VisionResult};
use time::macros::datetime;

struct NoText;

impl Ocr for NoText {
    fn recognize(&self, _: &RgbImage) -> VisionResult<Vec<OcrWord>> {
        Ok(Vec::new())
    }
}

fn detectors() -> Detectors {
    Detectors {
        finder: ObstacleFinder::new(BlobParams::default()),
        tracker: Tracker::new(),
        text: TextDetector::new(Box::new(NoText)),
    }
}

fn sim(frames: u64) -> FrameSource {
    let cfg = SceneConfig { frames: Some(frames), ..SceneConfig::default() };
    FrameSource::new(Feed::Sim(SyntheticScene::new(cfg, 0.001)))
}

#[tokio::test(start_paused = true)]
async fn sim_run_ends_when_the_scene_does() {
    let comm = CommHandle::local(StateTag::DetectModule);
    comm.push_command(VisionCommand::ModuleDetection).await.unwrap();

    let summary = VisionPipeline::new(sim(3), comm.clone(), detectors(), VisionMode::Idle).run().await.unwrap();

    assert_eq!(summary.reason, StopReason::Exhausted);
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.last_mode, VisionMode::ModuleDetection);
    let reports = comm.drain_detections().await.unwrap();
    assert_eq!(reports.len(), 3);
    for (i, r) in reports.iter().enumerate() {
        assert_eq!(r.frame_index, i as u64);
        assert_eq!(r.mode, VisionMode::ModuleDetection);
        assert!(!r.failures.module_failed);
    }
}

#[tokio::test(start_paused = true)]
async fn stop_command_ends_the_loop() {
    let comm = CommHandle::local(StateTag::EarlyLaps);
    comm.push_command(VisionCommand::Start).await.unwrap();
    comm.push_command(VisionCommand::Stop).await.unwrap();

    let summary = VisionPipeline::new(sim(10), comm.clone(), detectors(), VisionMode::Idle).run().await.unwrap();

    assert_eq!(summary.reason, StopReason::Stopped);
    assert_eq!(summary.frames, 0);
    assert!(comm.drain_detections().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn finished_mission_ends_the_loop() {
    let comm = CommHandle::local(StateTag::Final);
    let summary =
        VisionPipeline::new(sim(10), comm, detectors(), VisionMode::ObstacleDetection).run().await.unwrap();
    assert_eq!(summary.reason, StopReason::MissionOver);
}

#[tokio::test(start_paused = true)]
async fn idle_mode_publishes_nothing() {
    let comm = CommHandle::local(StateTag::Start);
    let summary = VisionPipeline::new(sim(2), comm.clone(), detectors(), VisionMode::Idle).run().await.unwrap();
    assert_eq!(summary.frames, 2);
    assert!(comm.drain_detections().await.unwrap().is_empty());
}

fn frame(index: u64, shade: u8, captured_at: time::OffsetDateTime) -> Frame {
    Frame {
        index,
        captured_at,
        color: RgbImage::from_pixel(32, 24, Rgb([shade, shade, shade])),
        depth: DepthImage::from_fn(32, 24, |x, y| Luma([(x * 100 + y) as u16 + index as u16])),
        depth_scale: 0.001,
    }
}

#[tokio::test]
async fn recording_replays_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let frames = [
        frame(0, 40, datetime!(2024-05-17 13:04:05.25 UTC)),
        frame(1, 200, datetime!(2024-05-17 13:04:05.5 UTC)),
    ];
    let mut rec = Recorder::create(dir.path()).await.unwrap();
    for f in &frames {
        rec.write(f).await.unwrap();
    }

    let replay = Replay::open(dir.path(), false).await.unwrap();
    assert_eq!(replay.len(), 2);
    let mut src = FrameSource::new(Feed::Replay(replay));
    for want in &frames {
        let got = src.next_frame().await.unwrap();
        assert_eq!(got.index, want.index);
        assert_eq!(got.depth, want.depth);
        assert!((got.depth_scale - 0.001).abs() < 1e-9);
        let shade = got.color.get_pixel(16, 12).0[0] as i32;
        assert!((shade - want.color.get_pixel(16, 12).0[0] as i32).abs() <= 4);
    }
    assert!(matches!(src.next_frame().await, Err(VisionError::FrameSourceExhausted)));
}
