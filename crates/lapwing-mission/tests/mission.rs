use lapwing_fc::{Drone, FcError, FlightMode, PositionNed, SimConfig, VelocityBody, VelocityNed};
use lapwing_link::CommHandle;
use lapwing_mission::{FlightContext, MissionError, Movement, State, StateMachine};
use lapwing_nav::MissionPlan;
use lapwing_proto::{StateSettings, StateTag, VisionCommand};
use std::time::Duration;

fn quick_plan() -> MissionPlan {
    MissionPlan { mast_settle_s: 1.0, detect_window_s: 1.0, ..MissionPlan::default() }
}

fn context(sim: SimConfig, settings: StateSettings) -> FlightContext {
    FlightContext {
        drone: Drone::simulated(sim),
        comm: CommHandle::local(StateTag::Start),
        plan: quick_plan(),
        settings,
    }
}

fn hovering() -> SimConfig {
    SimConfig { start_alt_m: Some(6.0), ..SimConfig::default() }
}

async fn enter_offboard(drone: &Drone) {
    drone.set_position_ned(PositionNed::default()).await.unwrap();
    drone.set_velocity_body(VelocityBody::default()).await.unwrap();
    drone.set_velocity_ned(VelocityNed::default()).await.unwrap();
    drone.offboard_start().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn move_to_pylon_converges() {
    let drone = Drone::simulated(hovering());
    enter_offboard(&drone).await;
    let plan = MissionPlan::default();

    let out = Movement::new(&drone, &plan).move_to(&plan.pylon1_waypoint()).await.unwrap();

    assert!(out.samples <= 100, "samples={}", out.samples);
    assert!(out.residual.0.abs() <= 0.2 * out.initial.0.abs(), "{:?}", out);
    assert!(out.residual.1.abs() <= 0.2 * out.initial.1.abs(), "{:?}", out);
    let here = drone.telemetry().latest();
    let d = lapwing_nav::GeoPoint::new(here.lat, here.lon).distance(&out.target) * 1000.0;
    assert!(d < 6.0, "d={}", d);
}

#[tokio::test(start_paused = true)]
async fn turn_reverses_heading() {
    let drone = Drone::simulated(hovering());
    enter_offboard(&drone).await;
    let plan = MissionPlan::default();

    let yaw = Movement::new(&drone, &plan).turn(180.0).await.unwrap();
    let diff = yaw.rem_euclid(360.0);
    assert!((diff - 180.0).abs() <= 10.0, "yaw={}", yaw);
}

#[tokio::test(start_paused = true)]
async fn mast_is_passed_at_a_standoff() {
    let mast = quick_plan().mast;
    let settings =
        StateSettings { detect_module_enabled: false, return_laps_enabled: false, ..StateSettings::default() };
    // due south of the mast, so the standoff lies to the east
    let ctx = context(SimConfig { home: mast.displaced_m(0.0, -60.0), ..hovering() }, settings);
    enter_offboard(&ctx.drone).await;

    let next = State::ToMast.step(&ctx).await.unwrap();
    assert_eq!(next, State::Land);

    let here = ctx.drone.telemetry().latest();
    let (east, north) = mast.local_offset_m(&lapwing_nav::GeoPoint::new(here.lat, here.lon));
    assert!(east > 3.5 && east < 6.5, "east={}", east);
    assert!(north.abs() < 13.0, "north={}", north);
}

#[tokio::test(start_paused = true)]
async fn mission_without_module_detection() {
    let settings = StateSettings {
        early_laps_enabled: true,
        early_laps_count: 1,
        go_to_mast_enabled: true,
        detect_module_enabled: false,
        return_laps_enabled: false,
        ..StateSettings::default()
    };
    let ctx = context(SimConfig::default(), settings);

    let out = StateMachine::new(&ctx).run(State::Start).await.unwrap();

    assert_eq!(
        out.trace,
        vec![State::Start, State::Takeoff, State::EarlyLaps, State::ToMast, State::Land, State::Final]
    );
    assert_eq!(out.end, StateTag::Final);
    assert!(out.recovered.is_none());
    assert_eq!(ctx.comm.get_state().await.unwrap(), StateTag::Final);
    assert_eq!(ctx.comm.pop_command().await.unwrap(), Some(VisionCommand::Start));
    assert_eq!(ctx.comm.pop_command().await.unwrap(), Some(VisionCommand::ToMast));
    assert_eq!(ctx.drone.telemetry().latest().flight_mode, FlightMode::Land);
}

#[tokio::test(start_paused = true)]
async fn every_stage_combination_reaches_final() {
    for bits in 0u8..32 {
        let settings = StateSettings {
            early_laps_enabled: bits & 1 != 0,
            early_laps_count: 1,
            go_to_mast_enabled: bits & 2 != 0,
            detect_module_enabled: bits & 4 != 0,
            return_laps_enabled: bits & 8 != 0,
            return_laps_count: 1,
            simple_takeoff_enabled: bits & 16 != 0,
            ..StateSettings::default()
        };
        let ctx = context(SimConfig::default(), settings);
        let out = StateMachine::new(&ctx).run(State::Start).await.unwrap();
        assert_eq!(out.trace.last(), Some(&State::Final), "bits={:05b}", bits);
        assert!(out.recovered.is_none(), "bits={:05b}: {:?}", bits, out.recovered);
        // simple takeoff goes straight to the mast stages
        assert_eq!(out.trace.contains(&State::EarlyLaps), bits & 1 != 0 && bits & 16 == 0);
        assert_eq!(out.trace.contains(&State::ReturnLaps), bits & 8 != 0);
    }
}

#[tokio::test(start_paused = true)]
async fn autopilot_failure_forces_landing() {
    let ctx = context(hovering(), StateSettings::default());
    ctx.drone.as_sim().unwrap().inject_transport_faults(1);

    let out = StateMachine::new(&ctx).run(State::ToMast).await.unwrap();

    assert_eq!(out.trace, vec![State::ToMast, State::Final]);
    assert!(out.recovered.unwrap().contains("transport"));
    assert_eq!(ctx.drone.telemetry().latest().flight_mode, FlightMode::Land);
}

#[tokio::test(start_paused = true)]
async fn external_land_request_preempts() {
    let mut ctx = context(hovering(), StateSettings::default());
    ctx.comm = CommHandle::local(StateTag::Land);

    let out = StateMachine::new(&ctx).run(State::EarlyLaps).await.unwrap();

    assert_eq!(out.trace, vec![State::Land, State::Final]);
}

#[tokio::test(start_paused = true)]
async fn touchdown_stops_the_machine() {
    let ctx = context(SimConfig { start_alt_m: Some(3.0), ..SimConfig::default() }, StateSettings::default());
    let ctx = FlightContext { plan: MissionPlan { detect_window_s: 60.0, ..quick_plan() }, ..ctx };

    let machine = StateMachine::new(&ctx);
    let (out, _) = tokio::join!(machine.run(State::DetectModule), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.drone.land().await.unwrap();
    });
    let out = out.unwrap();

    assert_eq!(out.end, StateTag::Exit);
    assert_eq!(ctx.comm.get_state().await.unwrap(), StateTag::Exit);
}

#[tokio::test(start_paused = true)]
async fn exit_holds_when_a_state_ends_at_touchdown() {
    let settings = StateSettings { return_laps_enabled: false, ..StateSettings::default() };
    // touchdown lands around 4 s; sweep the detect window across it
    for tenths in 35..=47u32 {
        let ctx = context(SimConfig { start_alt_m: Some(3.0), ..SimConfig::default() }, settings.clone());
        let ctx = FlightContext { plan: MissionPlan { detect_window_s: tenths as f64 / 10.0, ..quick_plan() }, ..ctx };

        let machine = StateMachine::new(&ctx);
        let (out, _) = tokio::join!(machine.run(State::DetectModule), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            ctx.drone.land().await.unwrap();
        });

        assert_eq!(out.unwrap().end, StateTag::Exit, "window={}", tenths);
        assert_eq!(ctx.comm.get_state().await.unwrap(), StateTag::Exit, "window={}", tenths);
    }
}

#[tokio::test(start_paused = true)]
async fn arming_is_retried() {
    let settings = StateSettings {
        early_laps_enabled: false,
        go_to_mast_enabled: false,
        detect_module_enabled: false,
        return_laps_enabled: false,
        ..StateSettings::default()
    };
    let ctx = context(SimConfig { arm_rejections: 2, ..SimConfig::default() }, settings.clone());
    let out = StateMachine::new(&ctx).run(State::Start).await.unwrap();
    assert_eq!(out.trace, vec![State::Start, State::Takeoff, State::Land, State::Final]);

    let mut ctx = context(SimConfig { arm_rejections: 10, ..SimConfig::default() }, settings);
    ctx.plan.arm_attempts = 3;
    let err = StateMachine::new(&ctx).run(State::Start).await.unwrap_err();
    assert!(matches!(err, MissionError::Fc(FcError::Precondition(_))));
}
