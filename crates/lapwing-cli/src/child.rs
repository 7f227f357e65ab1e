//! Entry points of the two child processes. Both reach the supervisor's
//! shared record over the loopback link.

use anyhow::{Context, Result};
use lapwing_fc::{Drone, SimConfig};
use lapwing_mission::{FlightContext, State, StateMachine};
use lapwing_proto::{StateTag, VisionMode};
use lapwing_vision::SourceKind;
use tracing::info;

use crate::config::Config;

pub async fn flight(cfg: &Config, simulation: bool, link: &str, resume: StateTag) -> Result<()> {
    let comm = cfg.link.connect(link).await.context("connect to supervisor")?;
    let plan = cfg.mission.plan.clone();
    let drone = if simulation {
        // a resumed run is already airborne
        let start_alt_m = (resume != StateTag::Start).then_some(plan.takeoff_alt_m);
        Drone::simulated(SimConfig { start_alt_m, ..SimConfig::default() })
    } else {
        Drone::connect(&cfg.fc).await.context("autopilot connect")?
    };
    drone.apply_params().await.context("apply autopilot params")?;

    let ctx = FlightContext { drone, comm, plan, settings: cfg.mission.settings.clone() };
    let initial = State::resume_from(resume, &ctx.settings);
    info!("flight: {:?} starting at {:?}", ctx.settings.run_title, initial);
    let out = StateMachine::new(&ctx).run(initial).await?;
    match &out.recovered {
        Some(e) => info!("flight: ended {} after forced landing ({})", out.end, e),
        None => info!("flight: ended {} after {} states", out.end, out.trace.len()),
    }
    Ok(())
}

pub async fn vision(cfg: &Config, simulation: bool, link: &str, mode: VisionMode) -> Result<()> {
    let comm = cfg.link.connect(link).await.context("connect to supervisor")?;
    let mut vcfg = cfg.vision.clone();
    if simulation {
        vcfg.source = SourceKind::Sim;
    }
    let summary = lapwing_vision::run_vision(&vcfg, comm, mode).await.context("vision pipeline")?;
    info!("vision: {} frames, stopped: {:?}", summary.frames, summary.reason);
    Ok(())
}
