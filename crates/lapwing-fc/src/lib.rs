pub mod autodetect;
pub mod error;
pub mod mav;
pub mod params;
pub mod setpoint;
pub mod sim;
pub mod telemetry;

pub use error::{FcError, FcResult};
pub use mav::MavlinkDrone;
pub use params::{ParamValue, AUTOPILOT_PARAMS};
pub use setpoint::{PositionNed, Setpoint, SetpointKind, VelocityBody, VelocityNed};
pub use sim::{SimConfig, SimDrone};
pub use telemetry::{Attitude, FlightMode, Position, Telemetry, TelemetrySample, TelemetryStream};

use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    /// Fixed mavlink connection string, e.g. "udpin:0.0.0.0:14540" or
    /// "serial:/dev/ttyACM0:57600". Unused when autodetect is on.
    pub address: String,

    /// Probe candidate serial ports/bauds and pick the first that yields a
    /// HEARTBEAT.
    pub autodetect: bool,
    pub candidate_devs: Vec<String>,
    pub candidate_bauds: Vec<u32>,

    /// Heartbeat wait per connect or probe attempt.
    pub heartbeat_timeout_ms: u64,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (autopilot side)
    pub target_sys: u8,
    pub target_comp: u8,

    pub send_heartbeat_hz: f32,
    pub command_timeout_ms: u64,

    /// Offboard setpoint re-send rate. PX4 drops out of offboard below 2 Hz.
    pub setpoint_rate_hz: f32,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            address: "udpin:0.0.0.0:14540".into(),
            autodetect: false,
            candidate_devs: autodetect::default_candidate_devs(),
            candidate_bauds: autodetect::default_candidate_bauds(),
            heartbeat_timeout_ms: 3000,
            sys_id: 245,
            comp_id: 191,
            target_sys: 1,
            target_comp: 1,
            send_heartbeat_hz: 1.0,
            command_timeout_ms: 1500,
            setpoint_rate_hz: 20.0,
        }
    }
}

impl FcConfig {
    /// Resolves the connection string, probing serial candidates when
    /// autodetect is enabled.
    pub async fn resolve_address(&self) -> FcResult<String> {
        if !self.autodetect {
            return Ok(self.address.clone());
        }
        let devs = autodetect::candidate_devs(&self.candidate_devs);
        let bauds = self.candidate_bauds.clone();
        let timeout = Duration::from_millis(self.heartbeat_timeout_ms);
        let res = tokio::task::spawn_blocking(move || autodetect::autodetect_fc(&devs, &bauds, timeout))
            .await
            .map_err(|e| FcError::Transport(format!("autodetect task: {}", e)))?;
        res.address()
            .ok_or_else(|| FcError::Transport(format!("autodetect: no heartbeat on {} probes", res.probes.len())))
    }
}

/// The autopilot session. Chosen once at startup; both variants expose the
/// same operations and never retry internally.
pub enum Drone {
    Mavlink(MavlinkDrone),
    Sim(SimDrone),
}

impl Drone {
    pub async fn connect(cfg: &FcConfig) -> FcResult<Self> {
        let address = cfg.resolve_address().await?;
        info!("fc: connecting to {}", address);
        Ok(Drone::Mavlink(MavlinkDrone::connect(&address, cfg).await?))
    }

    pub fn simulated(cfg: SimConfig) -> Self {
        Drone::Sim(SimDrone::spawn(cfg))
    }

    pub fn telemetry(&self) -> Telemetry {
        match self {
            Drone::Mavlink(d) => d.telemetry(),
            Drone::Sim(d) => d.telemetry(),
        }
    }

    pub async fn param_set(&self, name: &str, value: ParamValue) -> FcResult<()> {
        match self {
            Drone::Mavlink(d) => d.param_set(name, value).await,
            Drone::Sim(d) => d.param_set(name, value).await,
        }
    }

    pub async fn arm(&self) -> FcResult<()> {
        match self {
            Drone::Mavlink(d) => d.arm().await,
            Drone::Sim(d) => d.arm().await,
        }
    }

    pub async fn disarm(&self) -> FcResult<()> {
        match self {
            Drone::Mavlink(d) => d.disarm().await,
            Drone::Sim(d) => d.disarm().await,
        }
    }

    pub async fn takeoff(&self) -> FcResult<()> {
        match self {
            Drone::Mavlink(d) => d.takeoff().await,
            Drone::Sim(d) => d.takeoff().await,
        }
    }

    pub async fn land(&self) -> FcResult<()> {
        match self {
            Drone::Mavlink(d) => d.land().await,
            Drone::Sim(d) => d.land().await,
        }
    }

    pub async fn offboard_start(&self) -> FcResult<()> {
        match self {
            Drone::Mavlink(d) => d.offboard_start().await,
            Drone::Sim(d) => d.offboard_start().await,
        }
    }

    pub async fn offboard_stop(&self) -> FcResult<()> {
        match self {
            Drone::Mavlink(d) => d.offboard_stop().await,
            Drone::Sim(d) => d.offboard_stop().await,
        }
    }

    pub async fn set_position_ned(&self, sp: PositionNed) -> FcResult<()> {
        self.set_setpoint(Setpoint::PositionNed(sp)).await
    }

    pub async fn set_velocity_ned(&self, sp: VelocityNed) -> FcResult<()> {
        self.set_setpoint(Setpoint::VelocityNed(sp)).await
    }

    pub async fn set_velocity_body(&self, sp: VelocityBody) -> FcResult<()> {
        self.set_setpoint(Setpoint::VelocityBody(sp)).await
    }

    async fn set_setpoint(&self, sp: Setpoint) -> FcResult<()> {
        if !sp.is_finite() {
            return Err(FcError::Precondition(format!("non-finite {} setpoint", sp.kind())));
        }
        match self {
            Drone::Mavlink(d) => d.set_setpoint(sp).await,
            Drone::Sim(d) => d.set_setpoint(sp).await,
        }
    }

    /// Writes the full autopilot parameter table, stopping at the first failure.
    pub async fn apply_params(&self) -> FcResult<()> {
        for (name, value) in AUTOPILOT_PARAMS {
            self.param_set(name, *value).await?;
        }
        info!("fc: {} autopilot params written", AUTOPILOT_PARAMS.len());
        Ok(())
    }

    pub fn as_sim(&self) -> Option<&SimDrone> {
        match self {
            Drone::Sim(d) => Some(d),
            Drone::Mavlink(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: FcConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.target_sys, 1);
        assert!(!cfg.autodetect);
        assert!(cfg.address.starts_with("udpin:"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_finite_setpoints_never_reach_the_vehicle() {
        let drone = Drone::simulated(SimConfig::default());
        let err = drone
            .set_velocity_ned(VelocityNed { north_mps: f32::NAN, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, FcError::Precondition(_)));
        assert!(drone.as_sim().unwrap().setpoint_log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn params_are_applied_to_sim() {
        let drone = Drone::simulated(SimConfig::default());
        drone.apply_params().await.unwrap();
        let sim = drone.as_sim().unwrap();
        assert_eq!(sim.param("COM_OBL_RC_ACT"), Some(ParamValue::Int(5)));
        assert_eq!(sim.param("MIS_TAKEOFF_ALT"), Some(ParamValue::Float(6.0)));
    }
}
