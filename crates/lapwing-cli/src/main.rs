mod child;
mod config;
mod supervisor;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::info;

use lapwing_fc::AUTOPILOT_PARAMS;
use lapwing_link::doctor as link_doctor;
use lapwing_nav::doctor as nav_doctor;
use lapwing_proto::{StateTag, VisionMode};
use lapwing_vision::doctor as vision_doctor;

use config::{load_config, Config};
use supervisor::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "lapwing", version, about = "Lapwing - onboard mission autonomy")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fly the kinematic simulator and render a synthetic camera.
    #[arg(short, long, global = true)]
    simulation: bool,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Supervise a full mission (default).
    Run,
    /// Validate the configuration.
    Doctor,
    /// Print the autopilot parameter table.
    Params,
    #[command(hide = true)]
    Flight {
        #[arg(long)]
        link: String,
        #[arg(long, value_parser = parse_snake::<StateTag>, default_value = "start")]
        resume: StateTag,
    },
    #[command(hide = true)]
    Vision {
        #[arg(long)]
        link: String,
        #[arg(long, value_parser = parse_snake::<VisionMode>, default_value = "idle")]
        mode: VisionMode,
    },
}

/// Parses the snake_case wire name of a serde enum.
fn parse_snake<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd.unwrap_or(Command::Run) {
        Command::Run => Supervisor::start(cfg, cli.config, cli.simulation).await?.run().await?,
        Command::Doctor => doctor(&cfg)?,
        Command::Params => params(),
        Command::Flight { link, resume } => child::flight(&cfg, cli.simulation, &link, resume).await?,
        Command::Vision { link, mode } => child::vision(&cfg, cli.simulation, &link, mode).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    nav_doctor::check_mission(&cfg.mission.plan)?;
    let s = &cfg.mission.settings;
    anyhow::ensure!(!s.early_laps_enabled || s.early_laps_count > 0, "mission.early_laps_count must be > 0");
    anyhow::ensure!(!s.return_laps_enabled || s.return_laps_count > 0, "mission.return_laps_count must be > 0");

    link_doctor::check_link(&cfg.link)?;
    if s.vision_enabled {
        vision_doctor::check_vision(&cfg.vision)?;
    }

    let fc = &cfg.fc;
    if fc.autodetect {
        anyhow::ensure!(!fc.candidate_bauds.is_empty(), "fc.candidate_bauds empty with autodetect on");
        info!("doctor: fc autodetect enabled (OK)");
    } else {
        anyhow::ensure!(fc.address.contains(':'), "fc.address {:?} is not a mavlink connection string", fc.address);
    }
    anyhow::ensure!(fc.setpoint_rate_hz >= 2.0, "fc.setpoint_rate_hz below 2 Hz drops offboard");

    anyhow::ensure!(cfg.supervisor.poll_interval_ms > 0, "supervisor.poll_interval_ms must be > 0");

    info!("doctor: OK");
    Ok(())
}

fn params() {
    for (name, value) in AUTOPILOT_PARAMS {
        println!("{:<18} {}", name, value);
    }
}
