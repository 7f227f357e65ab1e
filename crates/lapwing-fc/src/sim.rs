//! In-process kinematic vehicle used for `--simulation` runs and tests.
//!
//! The model is deliberately simple: velocity setpoints are tracked
//! instantly, takeoff and landing use fixed vertical rates, and telemetry is
//! published at a fixed tick rate on the tokio clock.

use lapwing_nav::GeoPoint;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{FcError, FcResult};
use crate::params::{param_id, ParamValue};
use crate::setpoint::{SeedSet, Setpoint};
use crate::telemetry::{bus, FlightMode, Telemetry, TelemetrySample};

const GROUND_EPS_M: f64 = 0.2;
const POSITION_SPEED_MPS: f64 = 6.352;
const POSITION_CLIMB_MPS: f64 = 1.0;
/// Setpoints kept for inspection; older ones are dropped.
pub const SETPOINT_LOG_CAP: usize = 1024;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub home: GeoPoint,
    pub home_yaw_deg: f64,
    pub takeoff_alt_m: f64,
    pub climb_rate_mps: f64,
    pub land_rate_mps: f64,
    pub tick_hz: f64,
    /// Start hovering at this altitude instead of on the ground.
    pub start_alt_m: Option<f64>,
    /// Number of arm requests rejected before one succeeds.
    pub arm_rejections: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            home: GeoPoint::new(37.948955, -91.784440),
            home_yaw_deg: 0.0,
            takeoff_alt_m: 6.0,
            climb_rate_mps: 1.5,
            land_rate_mps: 1.0,
            tick_hz: 10.0,
            start_alt_m: None,
            arm_rejections: 0,
        }
    }
}

#[derive(Debug)]
struct SimVehicle {
    pos: GeoPoint,
    alt: f64,
    yaw: f64,
    armed: bool,
    in_air: bool,
    mode: FlightMode,
    origin: GeoPoint,
    takeoff_alt: f64,
    climb_rate: f64,
    land_rate: f64,
    seeds: SeedSet,
    last_setpoint: Option<Setpoint>,
    setpoint_log: VecDeque<Setpoint>,
    params: HashMap<String, ParamValue>,
    arm_rejections: u32,
    transport_faults: u32,
}

impl SimVehicle {
    fn sample(&self) -> TelemetrySample {
        TelemetrySample {
            lat: self.pos.lat,
            lon: self.pos.lon,
            relative_alt_m: self.alt,
            yaw_deg: self.yaw,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            in_air: self.in_air,
            armed: self.armed,
            flight_mode: self.mode,
        }
    }

    fn check_link(&mut self) -> FcResult<()> {
        if self.transport_faults > 0 {
            self.transport_faults -= 1;
            return Err(FcError::Transport("simulated link drop".into()));
        }
        Ok(())
    }

    fn step(&mut self, dt: f64) {
        match self.mode {
            FlightMode::Takeoff => {
                self.alt = (self.alt + self.climb_rate * dt).min(self.takeoff_alt);
                if self.alt >= self.takeoff_alt {
                    self.mode = FlightMode::Hold;
                }
            }
            FlightMode::Land => {
                self.alt -= self.land_rate * dt;
                if self.alt <= 0.0 {
                    self.alt = 0.0;
                    self.armed = false;
                    self.mode = FlightMode::Ready;
                    self.seeds = SeedSet::default();
                }
            }
            FlightMode::Offboard if self.armed => {
                if let Some(sp) = self.last_setpoint {
                    self.apply(sp, dt);
                }
            }
            _ => {}
        }

        if self.alt > GROUND_EPS_M {
            self.in_air = true;
        } else if self.alt <= 0.0 {
            self.in_air = false;
        }
    }

    fn apply(&mut self, sp: Setpoint, dt: f64) {
        match sp {
            Setpoint::VelocityNed(v) => {
                self.translate(v.north_mps as f64 * dt, v.east_mps as f64 * dt);
                self.climb(-v.down_mps as f64 * dt);
                self.yaw = (v.yaw_deg as f64).rem_euclid(360.0);
            }
            Setpoint::VelocityBody(b) => {
                let yaw = self.yaw.to_radians();
                let (f, r) = (b.forward_mps as f64, b.right_mps as f64);
                let vn = f * yaw.cos() - r * yaw.sin();
                let ve = f * yaw.sin() + r * yaw.cos();
                self.translate(vn * dt, ve * dt);
                self.climb(-b.down_mps as f64 * dt);
                self.yaw = (self.yaw + b.yawspeed_dps as f64 * dt).rem_euclid(360.0);
            }
            Setpoint::PositionNed(p) => {
                let target = self.origin.displaced_m(p.east_m as f64, p.north_m as f64);
                let (de, dn) = self.pos.local_offset_m(&target);
                let d = (de * de + dn * dn).sqrt();
                let step = (POSITION_SPEED_MPS * dt).min(d);
                if d > 1e-6 {
                    self.translate(dn / d * step, de / d * step);
                }
                let dz = -p.down_m as f64 - self.alt;
                self.climb(dz.clamp(-POSITION_CLIMB_MPS * dt, POSITION_CLIMB_MPS * dt));
                self.yaw = (p.yaw_deg as f64).rem_euclid(360.0);
            }
        }
    }

    fn translate(&mut self, north_m: f64, east_m: f64) {
        self.pos = self.pos.displaced_m(east_m, north_m);
    }

    fn climb(&mut self, up_m: f64) {
        self.alt = (self.alt + up_m).max(0.0);
    }
}

/// Simulation variant of the autopilot adapter.
pub struct SimDrone {
    vehicle: Arc<Mutex<SimVehicle>>,
    bus: Arc<watch::Sender<TelemetrySample>>,
    telemetry: Telemetry,
    ticker: JoinHandle<()>,
}

impl SimDrone {
    /// Starts the tick loop on the current tokio runtime.
    pub fn spawn(cfg: SimConfig) -> Self {
        let alt = cfg.start_alt_m.unwrap_or(0.0);
        let airborne = alt > GROUND_EPS_M;
        let vehicle = SimVehicle {
            pos: cfg.home,
            alt,
            yaw: cfg.home_yaw_deg.rem_euclid(360.0),
            armed: airborne,
            in_air: airborne,
            mode: if airborne { FlightMode::Hold } else { FlightMode::Ready },
            origin: cfg.home,
            takeoff_alt: cfg.takeoff_alt_m,
            climb_rate: cfg.climb_rate_mps,
            land_rate: cfg.land_rate_mps,
            seeds: SeedSet::default(),
            last_setpoint: None,
            setpoint_log: VecDeque::with_capacity(SETPOINT_LOG_CAP),
            params: HashMap::new(),
            arm_rejections: cfg.arm_rejections,
            transport_faults: 0,
        };
        let (tx, telemetry) = bus(vehicle.sample());
        let vehicle = Arc::new(Mutex::new(vehicle));
        let tx = Arc::new(tx);

        let period = Duration::from_secs_f64(1.0 / cfg.tick_hz.max(1.0));
        let dt = period.as_secs_f64();
        let (v2, tx2) = (vehicle.clone(), tx.clone());
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let sample = {
                    let mut v = lock(&v2);
                    v.step(dt);
                    v.sample()
                };
                tx2.send_replace(sample);
            }
        });

        info!("sim: vehicle spawned at {:.6},{:.6} alt={:.1}", cfg.home.lat, cfg.home.lon, alt);
        Self { vehicle, bus: tx, telemetry, ticker }
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.clone()
    }

    /// The most recent setpoints written, oldest first, at most
    /// [`SETPOINT_LOG_CAP`].
    pub fn setpoint_log(&self) -> Vec<Setpoint> {
        lock(&self.vehicle).setpoint_log.iter().copied().collect()
    }

    pub fn param(&self, name: &str) -> Option<ParamValue> {
        lock(&self.vehicle).params.get(name).copied()
    }

    /// Makes the next `n` commands fail with a transport error.
    pub fn inject_transport_faults(&self, n: u32) {
        lock(&self.vehicle).transport_faults = n;
    }

    pub async fn param_set(&self, name: &str, value: ParamValue) -> FcResult<()> {
        let mut v = lock(&self.vehicle);
        v.check_link()?;
        if param_id(name).is_none() {
            return Err(FcError::Param { name: name.into(), reason: "invalid parameter id".into() });
        }
        if name == "MIS_TAKEOFF_ALT" {
            v.takeoff_alt = value.as_f64();
        }
        v.params.insert(name.to_string(), value);
        debug!("sim: param {}={}", name, value);
        Ok(())
    }

    pub async fn arm(&self) -> FcResult<()> {
        self.command(|v| {
            if v.arm_rejections > 0 {
                v.arm_rejections -= 1;
                return Err(FcError::Precondition("vehicle not ready to arm".into()));
            }
            if !v.armed {
                v.armed = true;
                v.origin = v.pos;
            }
            Ok(())
        })
    }

    pub async fn disarm(&self) -> FcResult<()> {
        self.command(|v| {
            if v.in_air {
                return Err(FcError::Precondition("refusing to disarm in air".into()));
            }
            v.armed = false;
            v.mode = FlightMode::Ready;
            Ok(())
        })
    }

    pub async fn takeoff(&self) -> FcResult<()> {
        self.command(|v| {
            if !v.armed {
                return Err(FcError::Precondition("takeoff requires an armed vehicle".into()));
            }
            v.mode = FlightMode::Takeoff;
            Ok(())
        })
    }

    pub async fn land(&self) -> FcResult<()> {
        self.command(|v| {
            if !v.armed {
                return Err(FcError::Precondition("land requires an armed vehicle".into()));
            }
            v.mode = FlightMode::Land;
            Ok(())
        })
    }

    pub async fn offboard_start(&self) -> FcResult<()> {
        self.command(|v| {
            if !v.seeds.complete() {
                let missing: Vec<String> = v.seeds.missing().iter().map(|k| k.to_string()).collect();
                return Err(FcError::Offboard(format!("setpoints not seeded: {}", missing.join(","))));
            }
            v.mode = FlightMode::Offboard;
            Ok(())
        })
    }

    pub async fn offboard_stop(&self) -> FcResult<()> {
        self.command(|v| {
            if v.mode != FlightMode::Offboard {
                return Err(FcError::Offboard("offboard not active".into()));
            }
            v.mode = FlightMode::Hold;
            v.seeds = SeedSet::default();
            Ok(())
        })
    }

    pub async fn set_setpoint(&self, sp: Setpoint) -> FcResult<()> {
        let mut v = lock(&self.vehicle);
        v.check_link()?;
        v.seeds.record(sp.kind());
        v.last_setpoint = Some(sp);
        if v.setpoint_log.len() == SETPOINT_LOG_CAP {
            v.setpoint_log.pop_front();
        }
        v.setpoint_log.push_back(sp);
        Ok(())
    }

    fn command(&self, f: impl FnOnce(&mut SimVehicle) -> FcResult<()>) -> FcResult<()> {
        let sample = {
            let mut v = lock(&self.vehicle);
            v.check_link()?;
            f(&mut v)?;
            v.sample()
        };
        self.bus.send_replace(sample);
        Ok(())
    }
}

impl Drop for SimDrone {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

fn lock(m: &Mutex<SimVehicle>) -> MutexGuard<'_, SimVehicle> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
