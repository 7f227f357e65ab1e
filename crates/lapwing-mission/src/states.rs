use lapwing_fc::{FcError, PositionNed, VelocityBody, VelocityNed};
use lapwing_proto::{StateSettings, StateTag, VisionCommand};
use std::time::Duration;
use tracing::{info, warn};

use crate::movement::Movement;
use crate::{FlightContext, MissionError};

/// Mission states. Each `step` runs one state to completion and returns its
/// successor; `Final` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    Takeoff,
    SimpleTakeoff,
    EarlyLaps,
    ToMast,
    DetectModule,
    ReturnLaps,
    Land,
    Final,
}

impl State {
    pub fn tag(&self) -> StateTag {
        match self {
            State::Start => StateTag::Start,
            State::Takeoff | State::SimpleTakeoff => StateTag::Takeoff,
            State::EarlyLaps => StateTag::EarlyLaps,
            State::ToMast => StateTag::ToMast,
            State::DetectModule => StateTag::DetectModule,
            State::ReturnLaps => StateTag::ReturnLaps,
            State::Land => StateTag::Land,
            State::Final => StateTag::Final,
        }
    }

    /// State to resume at after a restart that last published `tag`.
    pub fn resume_from(tag: StateTag, settings: &StateSettings) -> State {
        match tag {
            StateTag::Start => State::Start,
            StateTag::Takeoff if settings.simple_takeoff_enabled => State::SimpleTakeoff,
            StateTag::Takeoff => State::Takeoff,
            StateTag::EarlyLaps => State::EarlyLaps,
            StateTag::ToMast => State::ToMast,
            StateTag::DetectModule => State::DetectModule,
            StateTag::ReturnLaps => State::ReturnLaps,
            StateTag::Land => State::Land,
            StateTag::Final | StateTag::Exit => State::Final,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Final)
    }

    pub async fn step(self, ctx: &FlightContext) -> Result<State, MissionError> {
        match self {
            State::Start => start(ctx).await,
            State::Takeoff => takeoff(ctx).await,
            State::SimpleTakeoff => simple_takeoff(ctx).await,
            State::EarlyLaps => early_laps(ctx).await,
            State::ToMast => to_mast(ctx).await,
            State::DetectModule => detect_module(ctx).await,
            State::ReturnLaps => return_laps(ctx).await,
            State::Land => land(ctx).await,
            State::Final => Ok(State::Final),
        }
    }
}

fn after_takeoff(s: &StateSettings) -> State {
    if s.early_laps_enabled {
        State::EarlyLaps
    } else {
        after_early_laps(s)
    }
}

fn after_early_laps(s: &StateSettings) -> State {
    if s.go_to_mast_enabled {
        State::ToMast
    } else {
        after_mast(s)
    }
}

fn after_mast(s: &StateSettings) -> State {
    if s.detect_module_enabled {
        State::DetectModule
    } else {
        after_detect(s)
    }
}

fn after_detect(s: &StateSettings) -> State {
    if s.return_laps_enabled {
        State::ReturnLaps
    } else {
        State::Land
    }
}

async fn tell_vision(ctx: &FlightContext, cmd: VisionCommand) -> Result<(), MissionError> {
    if ctx.settings.vision_enabled {
        ctx.comm.push_command(cmd).await?;
    }
    Ok(())
}

async fn start(ctx: &FlightContext) -> Result<State, MissionError> {
    info!("mission: {} {}", ctx.settings.run_title, ctx.settings.run_description);
    tell_vision(ctx, VisionCommand::Start).await?;
    Ok(if ctx.settings.simple_takeoff_enabled { State::SimpleTakeoff } else { State::Takeoff })
}

async fn arm(ctx: &FlightContext) -> Result<(), MissionError> {
    if ctx.drone.telemetry().latest().armed {
        return Ok(());
    }
    let attempts = ctx.plan.arm_attempts.max(1);
    for attempt in 1..=attempts {
        match ctx.drone.arm().await {
            Ok(()) => {
                info!("mission: armed");
                return Ok(());
            }
            Err(FcError::Precondition(why)) if attempt < attempts => {
                warn!("mission: arm attempt {}/{} refused: {}", attempt, attempts, why);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(FcError::Precondition("arming retries exhausted".into()).into())
}

/// One setpoint of every variant, ending on zero velocity so that is what
/// the autopilot holds once offboard starts.
async fn seed_setpoints(ctx: &FlightContext) -> Result<(), MissionError> {
    let yaw = ctx.drone.telemetry().latest().yaw_deg as f32;
    ctx.drone.set_position_ned(PositionNed::default()).await?;
    ctx.drone.set_velocity_body(VelocityBody::default()).await?;
    ctx.drone.set_velocity_ned(VelocityNed { yaw_deg: yaw, ..Default::default() }).await?;
    Ok(())
}

async fn takeoff(ctx: &FlightContext) -> Result<State, MissionError> {
    arm(ctx).await?;
    ctx.drone.takeoff().await?;
    let alt = Movement::new(&ctx.drone, &ctx.plan).check_altitude().await?;
    info!("mission: takeoff reached {:.1} m", alt);

    seed_setpoints(ctx).await?;
    match ctx.drone.offboard_start().await {
        Ok(()) => Ok(after_takeoff(&ctx.settings)),
        Err(e) if e.is_offboard() => {
            warn!("mission: offboard refused after takeoff, landing: {}", e);
            ctx.drone.land().await?;
            Ok(State::Final)
        }
        Err(e) => Err(e.into()),
    }
}

async fn simple_takeoff(ctx: &FlightContext) -> Result<State, MissionError> {
    let mut positions = ctx.drone.telemetry().position();
    let takeoff_pos = positions.next().await?;
    info!("mission: simple takeoff from {:.6},{:.6}", takeoff_pos.lat, takeoff_pos.lon);

    arm(ctx).await?;
    seed_setpoints(ctx).await?;
    ctx.drone.offboard_start().await?;
    ctx.drone
        .set_velocity_ned(VelocityNed { down_mps: -1.0, ..Default::default() })
        .await?;
    loop {
        let pos = positions.next().await?;
        if pos.relative_alt_m >= ctx.plan.mast_alt_m {
            break;
        }
    }
    Movement::new(&ctx.drone, &ctx.plan).hold().await?;
    Ok(after_mast(&ctx.settings))
}

async fn early_laps(ctx: &FlightContext) -> Result<State, MissionError> {
    let s = &ctx.settings;
    if !s.early_laps_enabled {
        return Ok(after_early_laps(s));
    }
    let mv = Movement::new(&ctx.drone, &ctx.plan);
    let (p1, p2) = (ctx.plan.pylon1_waypoint(), ctx.plan.pylon2_waypoint());

    mv.move_to(&p1).await?;
    for lap in 0..s.early_laps_count {
        info!("mission: early lap {}/{}", lap + 1, s.early_laps_count);
        mv.move_to(&p2).await?;
        mv.turn(180.0).await?;
        mv.move_to(&p1).await?;
        mv.turn(180.0).await?;
    }
    Ok(after_early_laps(s))
}

async fn to_mast(ctx: &FlightContext) -> Result<State, MissionError> {
    if !ctx.settings.go_to_mast_enabled {
        return Ok(after_mast(&ctx.settings));
    }
    tell_vision(ctx, VisionCommand::ToMast).await?;
    let mv = Movement::new(&ctx.drone, &ctx.plan);
    mv.move_to(&ctx.plan.mast_waypoint()).await?;
    mv.hold().await?;
    info!("mission: at mast, settling {:.0} s", ctx.plan.mast_settle_s);
    tokio::time::sleep(Duration::from_secs_f64(ctx.plan.mast_settle_s.max(0.0))).await;
    Ok(after_mast(&ctx.settings))
}

async fn detect_module(ctx: &FlightContext) -> Result<State, MissionError> {
    if !ctx.settings.detect_module_enabled {
        return Ok(after_detect(&ctx.settings));
    }
    Movement::new(&ctx.drone, &ctx.plan).hold().await?;
    if ctx.settings.vision_enabled {
        // results from earlier modes are not ours
        ctx.comm.drain_detections().await?;
    }
    tell_vision(ctx, VisionCommand::ModuleDetection).await?;
    tokio::time::sleep(Duration::from_secs_f64(ctx.plan.detect_window_s.max(0.0))).await;

    if ctx.settings.vision_enabled {
        let reports = ctx.comm.drain_detections().await?;
        let failed = reports.iter().filter(|r| r.failures.module_failed || r.failures.geometry_failed).count();
        let found: Vec<_> = reports.iter().filter_map(|r| r.module.as_ref().map(|m| (r.frame_index, m))).collect();
        info!("mission: {} frames, module seen in {}, {} detector failures", reports.len(), found.len(), failed);
        for (frame, m) in &found {
            let roll = m.roll_deg.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "unknown".into());
            info!(
                "mission: frame {} module at ({}, {}) depth {:.0} mm pitch {:.1} yaw {:.1} roll {}",
                frame, m.center_x, m.center_y, m.depth_mm, m.pitch_deg, m.yaw_deg, roll
            );
        }
        tell_vision(ctx, VisionCommand::Idle).await?;
    }
    Ok(after_detect(&ctx.settings))
}

async fn return_laps(ctx: &FlightContext) -> Result<State, MissionError> {
    let s = &ctx.settings;
    if !s.return_laps_enabled || s.return_laps_count == 0 {
        return Ok(State::Land);
    }
    let mv = Movement::new(&ctx.drone, &ctx.plan).with_offset(ctx.plan.offset.mirrored());
    let (p1, p2) = (ctx.plan.pylon1_waypoint(), ctx.plan.pylon2_waypoint());

    for lap in 1..s.return_laps_count {
        info!("mission: return lap {}/{}", lap, s.return_laps_count);
        mv.move_to(&p1).await?;
        mv.turn(180.0).await?;
        mv.move_to(&p2).await?;
        mv.turn(180.0).await?;
    }
    mv.move_to(&p1).await?;
    Ok(State::Land)
}

async fn land(ctx: &FlightContext) -> Result<State, MissionError> {
    ctx.drone.set_position_ned(PositionNed::default()).await?;
    ctx.drone.set_velocity_ned(VelocityNed::default()).await?;
    ctx.drone.set_velocity_body(VelocityBody::default()).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    if let Err(e) = ctx.drone.offboard_stop().await {
        warn!("mission: offboard stop before landing: {}", e);
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    ctx.drone.land().await?;
    info!("mission: landing");
    Ok(State::Final)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(early: bool, mast: bool, detect: bool, ret: bool) -> StateSettings {
        StateSettings {
            early_laps_enabled: early,
            go_to_mast_enabled: mast,
            detect_module_enabled: detect,
            return_laps_enabled: ret,
            ..StateSettings::default()
        }
    }

    #[test]
    fn disabled_stages_are_skipped() {
        let s = settings(false, false, false, false);
        assert_eq!(after_takeoff(&s), State::Land);
        let s = settings(true, false, true, false);
        assert_eq!(after_early_laps(&s), State::DetectModule);
        assert_eq!(after_detect(&s), State::Land);
        let s = settings(false, true, false, true);
        assert_eq!(after_takeoff(&s), State::ToMast);
        assert_eq!(after_mast(&s), State::ReturnLaps);
    }

    #[test]
    fn resume_maps_tags_back() {
        let s = StateSettings { simple_takeoff_enabled: true, ..StateSettings::default() };
        assert_eq!(State::resume_from(StateTag::Takeoff, &s), State::SimpleTakeoff);
        assert_eq!(State::resume_from(StateTag::Exit, &s), State::Final);
        for st in [State::Start, State::EarlyLaps, State::ToMast, State::DetectModule, State::ReturnLaps, State::Land] {
            assert_eq!(State::resume_from(st.tag(), &StateSettings::default()), st);
        }
    }
}
