use lapwing_link::{CommHandle, CommServer, CommState, LinkConfig, LinkError};
use lapwing_proto::{BoundingBox, DetectionReport, FailureFlags, ObjectType, StateTag, VisionCommand, VisionMode};

async fn spawn_server() -> (CommHandle, String) {
    let server = CommServer::bind("127.0.0.1:0", CommState::default()).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let local = server.handle();
    tokio::spawn(server.serve());
    (local, addr)
}

#[tokio::test]
async fn state_written_remotely_is_visible_locally() {
    let (local, addr) = spawn_server().await;
    let remote = LinkConfig::default().connect(&addr).await.unwrap();

    assert_eq!(remote.get_state().await.unwrap(), StateTag::Start);
    remote.set_state(StateTag::ToMast).await.unwrap();
    assert_eq!(local.get_state().await.unwrap(), StateTag::ToMast);

    local.set_state(StateTag::Land).await.unwrap();
    assert_eq!(remote.get_state().await.unwrap(), StateTag::Land);
}

#[tokio::test]
async fn queues_cross_two_clients() {
    let (_local, addr) = spawn_server().await;
    let flight = LinkConfig::default().connect(&addr).await.unwrap();
    let vision = LinkConfig::default().connect(&addr).await.unwrap();

    flight.push_command(VisionCommand::ModuleDetection).await.unwrap();
    assert_eq!(vision.pop_command().await.unwrap(), Some(VisionCommand::ModuleDetection));
    assert_eq!(vision.pop_command().await.unwrap(), None);

    let report = DetectionReport {
        frame_index: 7,
        mode: VisionMode::ObstacleDetection,
        boxes: vec![BoundingBox::from_corners(100.0, 100.0, 200.0, 200.0, ObjectType::Avoid)],
        module: None,
        failures: FailureFlags::default(),
    };
    vision.push_detection(report.clone()).await.unwrap();
    vision.set_environment(report.boxes.clone()).await.unwrap();

    assert_eq!(flight.drain_detections().await.unwrap(), vec![report.clone()]);
    assert!(flight.drain_detections().await.unwrap().is_empty());
    assert_eq!(flight.get_environment().await.unwrap(), report.boxes);
}

#[tokio::test]
async fn concurrent_calls_on_one_client_stay_paired() {
    let (_local, addr) = spawn_server().await;
    let remote = LinkConfig::default().connect(&addr).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let r = remote.clone();
        tasks.push(tokio::spawn(async move {
            r.push_command(VisionCommand::Idle).await.unwrap();
            r.get_state().await.unwrap()
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap(), StateTag::Start);
    }
}

#[tokio::test]
async fn connect_to_nothing_fails() {
    let cfg = LinkConfig { connect_attempts: 1, connect_backoff_ms: 1, ..Default::default() };
    let err = cfg.connect("127.0.0.1:1").await.err().unwrap();
    assert!(matches!(err, LinkError::Io(_)));
}
