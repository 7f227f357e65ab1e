use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavLandedState, MavMessage, MavModeFlag, MavParamType, MavResult,
        MavState, MavType, PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA, PARAM_SET_DATA,
        SET_POSITION_TARGET_LOCAL_NED_DATA,
    },
    MavConnection, MavHeader,
};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{FcError, FcResult};
use crate::params::{param_id, param_name, ParamValue};
use crate::setpoint::{SeedSet, Setpoint};
use crate::telemetry::{bus, FlightMode, Telemetry, TelemetrySample};
use crate::FcConfig;

type Conn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

const PX4_MAIN_MODE_AUTO: f32 = 4.0;
const PX4_MAIN_MODE_OFFBOARD: f32 = 6.0;
const PX4_AUTO_SUB_MODE_LOITER: f32 = 3.0;
const GLOBAL_POSITION_INT_ID: f32 = 33.0;
const ATTITUDE_ID: f32 = 30.0;

// SET_POSITION_TARGET type_mask bits
const IGNORE_POS: u16 = 0b0000_0000_0111;
const IGNORE_VEL: u16 = 0b0000_0011_1000;
const IGNORE_ACC: u16 = 0b0001_1100_0000;
const IGNORE_YAW: u16 = 0b0100_0000_0000;
const IGNORE_YAW_RATE: u16 = 0b1000_0000_0000;

#[derive(Debug, Clone)]
enum LinkEvent {
    Ack { command: MavCmd, result: MavResult },
    Param { name: String, value: f32 },
}

#[derive(Debug, Default)]
struct OffboardState {
    seeds: SeedSet,
    last: Option<Setpoint>,
    active: bool,
}

/// Hardware (or SITL over UDP) variant of the autopilot adapter.
pub struct MavlinkDrone {
    conn: Conn,
    sys_id: u8,
    comp_id: u8,
    target_sys: u8,
    target_comp: u8,
    sequence: Arc<AtomicU8>,
    boot: Instant,
    command_timeout: Duration,
    setpoint_period: Duration,
    telemetry: Telemetry,
    events: broadcast::Sender<LinkEvent>,
    offboard: Arc<Mutex<OffboardState>>,
    closed: Arc<AtomicBool>,
    streamer: Mutex<Option<JoinHandle<()>>>,
    heartbeat: JoinHandle<()>,
}

impl MavlinkDrone {
    /// Opens `address` (any mavlink connection string) and waits for the
    /// autopilot heartbeat.
    pub async fn connect(address: &str, cfg: &FcConfig) -> FcResult<Self> {
        let conn: Conn = mavlink::connect::<MavMessage>(address)
            .map(Arc::from)
            .map_err(|e| FcError::Transport(format!("mavlink connect {}: {}", address, e)))?;

        let (tx, telemetry) = bus(TelemetrySample::default());
        let (events, _) = broadcast::channel(64);
        let closed = Arc::new(AtomicBool::new(false));
        let (hb_tx, mut hb_rx) = watch::channel(false);

        {
            let conn = conn.clone();
            let events = events.clone();
            let closed = closed.clone();
            let target_sys = cfg.target_sys;
            // mavlink recv blocks; keep it off the async workers.
            tokio::task::spawn_blocking(move || reader_loop(conn, tx, events, hb_tx, closed, target_sys));
        }

        let sequence = Arc::new(AtomicU8::new(0));
        let heartbeat = {
            let conn = conn.clone();
            let sequence = sequence.clone();
            let hdr = (cfg.sys_id, cfg.comp_id);
            let period = Duration::from_secs_f32(1.0 / cfg.send_heartbeat_hz.max(0.2));
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    let hb = HEARTBEAT_DATA {
                        custom_mode: 0,
                        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
                        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
                        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
                        system_status: MavState::MAV_STATE_ACTIVE,
                        mavlink_version: 3,
                    };
                    if let Err(e) = send_raw(&conn, &sequence, hdr, &MavMessage::HEARTBEAT(hb)) {
                        warn!("fc: companion heartbeat failed: {}", e);
                    }
                }
            })
        };

        let wait = Duration::from_millis(cfg.heartbeat_timeout_ms);
        let seen = matches!(tokio::time::timeout(wait, hb_rx.wait_for(|seen| *seen)).await, Ok(Ok(_)));
        if !seen {
            closed.store(true, Ordering::Relaxed);
            heartbeat.abort();
            return Err(FcError::Transport(format!("no autopilot heartbeat on {} within {:?}", address, wait)));
        }
        info!("fc: connected to autopilot on {}", address);

        let drone = Self {
            conn,
            sys_id: cfg.sys_id,
            comp_id: cfg.comp_id,
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            sequence,
            boot: Instant::now(),
            command_timeout: Duration::from_millis(cfg.command_timeout_ms),
            setpoint_period: Duration::from_secs_f32(1.0 / cfg.setpoint_rate_hz.max(2.0)),
            telemetry,
            events,
            offboard: Arc::new(Mutex::new(OffboardState::default())),
            closed,
            streamer: Mutex::new(None),
            heartbeat,
        };

        for id in [GLOBAL_POSITION_INT_ID, ATTITUDE_ID] {
            let interval_us = 100_000.0;
            if let Err(e) = drone.command_long(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, [id, interval_us, 0.0, 0.0, 0.0, 0.0, 0.0]).await {
                debug!("fc: message interval for {} not accepted: {}", id, e);
            }
        }
        Ok(drone)
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.clone()
    }

    pub async fn param_set(&self, name: &str, value: ParamValue) -> FcResult<()> {
        let param_err = |reason: String| FcError::Param { name: name.to_string(), reason };
        let id = param_id(name).ok_or_else(|| param_err("invalid parameter id".into()))?;
        let (wire, param_type) = match value {
            ParamValue::Int(v) => (f32::from_bits(v as u32), MavParamType::MAV_PARAM_TYPE_INT32),
            ParamValue::Float(v) => (v, MavParamType::MAV_PARAM_TYPE_REAL32),
        };

        let mut rx = self.events.subscribe();
        self.send(MavMessage::PARAM_SET(PARAM_SET_DATA {
            param_value: wire,
            target_system: self.target_sys,
            target_component: self.target_comp,
            param_id: id,
            param_type,
        }))
        .map_err(|e| param_err(e.to_string()))?;

        let echoed = tokio::time::timeout(self.command_timeout, async {
            loop {
                match rx.recv().await {
                    Ok(LinkEvent::Param { name: n, value: v }) if n == name => return Ok(v),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(()),
                }
            }
        })
        .await;

        match echoed {
            Ok(Ok(v)) if v.to_bits() == wire.to_bits() => {
                debug!("fc: param {}={}", name, value);
                Ok(())
            }
            Ok(Ok(v)) => Err(param_err(format!("autopilot kept {} (raw)", v))),
            _ => Err(param_err("no PARAM_VALUE echo".into())),
        }
    }

    pub async fn arm(&self) -> FcResult<()> {
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .await
            .map_err(|e| into_precondition(e, "arm"))
    }

    pub async fn disarm(&self) -> FcResult<()> {
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0; 7])
            .await
            .map_err(|e| into_precondition(e, "disarm"))
    }

    pub async fn takeoff(&self) -> FcResult<()> {
        // NaN altitude: autopilot uses MIS_TAKEOFF_ALT
        let nan = f32::NAN;
        self.command_long(MavCmd::MAV_CMD_NAV_TAKEOFF, [-1.0, 0.0, 0.0, nan, nan, nan, nan])
            .await
            .map_err(|e| into_precondition(e, "takeoff"))
    }

    pub async fn land(&self) -> FcResult<()> {
        let nan = f32::NAN;
        self.command_long(MavCmd::MAV_CMD_NAV_LAND, [0.0, 0.0, 0.0, nan, nan, nan, nan])
            .await
            .map_err(|e| into_precondition(e, "land"))
    }

    pub async fn offboard_start(&self) -> FcResult<()> {
        {
            let st = lock(&self.offboard);
            if !st.seeds.complete() {
                let missing: Vec<String> = st.seeds.missing().iter().map(|k| k.to_string()).collect();
                return Err(FcError::Offboard(format!("setpoints not seeded: {}", missing.join(","))));
            }
        }
        let custom = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        self.command_long(MavCmd::MAV_CMD_DO_SET_MODE, [custom, PX4_MAIN_MODE_OFFBOARD, 0.0, 0.0, 0.0, 0.0, 0.0])
            .await
            .map_err(|e| FcError::Offboard(format!("start: {}", e)))?;
        lock(&self.offboard).active = true;
        info!("fc: offboard started");
        Ok(())
    }

    pub async fn offboard_stop(&self) -> FcResult<()> {
        let custom = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        let res = self
            .command_long(
                MavCmd::MAV_CMD_DO_SET_MODE,
                [custom, PX4_MAIN_MODE_AUTO, PX4_AUTO_SUB_MODE_LOITER, 0.0, 0.0, 0.0, 0.0],
            )
            .await
            .map_err(|e| FcError::Offboard(format!("stop: {}", e)));

        if let Some(h) = lock_streamer(&self.streamer).take() {
            h.abort();
        }
        *lock(&self.offboard) = OffboardState::default();
        res.map(|_| info!("fc: offboard stopped"))
    }

    /// Records the setpoint, sends it once and keeps re-sending it so the
    /// autopilot's offboard watchdog stays fed.
    pub async fn set_setpoint(&self, sp: Setpoint) -> FcResult<()> {
        {
            let mut st = lock(&self.offboard);
            st.seeds.record(sp.kind());
            st.last = Some(sp);
        }
        self.send(self.encode(sp))?;
        self.ensure_streamer();
        Ok(())
    }

    fn ensure_streamer(&self) {
        let mut slot = lock_streamer(&self.streamer);
        if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }
        let conn = self.conn.clone();
        let sequence = self.sequence.clone();
        let offboard = self.offboard.clone();
        let hdr = (self.sys_id, self.comp_id);
        let target = (self.target_sys, self.target_comp);
        let boot = self.boot;
        let period = self.setpoint_period;
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let last = lock(&offboard).last;
                if let Some(sp) = last {
                    let msg = encode_setpoint(sp, target, boot);
                    if let Err(e) = send_raw(&conn, &sequence, hdr, &msg) {
                        warn!("fc: setpoint stream send failed: {}", e);
                    }
                }
            }
        }));
    }

    fn encode(&self, sp: Setpoint) -> MavMessage {
        encode_setpoint(sp, (self.target_sys, self.target_comp), self.boot)
    }

    async fn command_long(&self, command: MavCmd, p: [f32; 7]) -> FcResult<()> {
        let mut rx = self.events.subscribe();
        self.send(MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command,
            confirmation: 0,
            param1: p[0],
            param2: p[1],
            param3: p[2],
            param4: p[3],
            param5: p[4],
            param6: p[5],
            param7: p[6],
        }))?;

        let ack = tokio::time::timeout(self.command_timeout, async {
            loop {
                match rx.recv().await {
                    Ok(LinkEvent::Ack { command: c, result }) if c == command => return Some(result),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await;

        ack_result(command, ack.ok())
    }

    fn send(&self, msg: MavMessage) -> FcResult<()> {
        send_raw(&self.conn, &self.sequence, (self.sys_id, self.comp_id), &msg)
    }
}

impl Drop for MavlinkDrone {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
        self.heartbeat.abort();
        if let Some(h) = lock_streamer(&self.streamer).take() {
            h.abort();
        }
    }
}

/// `None` means the ack never came; `Some(None)` that the link closed first.
fn ack_result(command: MavCmd, ack: Option<Option<MavResult>>) -> FcResult<()> {
    match ack {
        Some(Some(MavResult::MAV_RESULT_ACCEPTED)) => Ok(()),
        Some(Some(result)) => Err(FcError::Precondition(format!("{:?} rejected: {:?}", command, result))),
        Some(None) => Err(FcError::Transport("link closed".into())),
        None => Err(FcError::Transport(format!("no ack for {:?}", command))),
    }
}

fn into_precondition(e: FcError, what: &str) -> FcError {
    match e {
        FcError::Precondition(msg) => FcError::Precondition(format!("{}: {}", what, msg)),
        other => other,
    }
}

fn send_raw(conn: &Conn, sequence: &AtomicU8, (sys, comp): (u8, u8), msg: &MavMessage) -> FcResult<()> {
    let hdr = MavHeader { system_id: sys, component_id: comp, sequence: sequence.fetch_add(1, Ordering::Relaxed) };
    conn.send(&hdr, msg).map_err(|e| FcError::Transport(format!("mavlink send: {}", e)))?;
    Ok(())
}

fn encode_setpoint(sp: Setpoint, (target_system, target_component): (u8, u8), boot: Instant) -> MavMessage {
    let mut data = SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms: boot.elapsed().as_millis() as u32,
        target_system,
        target_component,
        coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
        type_mask: PositionTargetTypemask::empty(),
        x: 0.0,
        y: 0.0,
        z: 0.0,
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        afx: 0.0,
        afy: 0.0,
        afz: 0.0,
        yaw: 0.0,
        yaw_rate: 0.0,
    };
    let mask = match sp {
        Setpoint::PositionNed(p) => {
            data.x = p.north_m;
            data.y = p.east_m;
            data.z = p.down_m;
            data.yaw = p.yaw_deg.to_radians();
            IGNORE_VEL | IGNORE_ACC | IGNORE_YAW_RATE
        }
        Setpoint::VelocityNed(v) => {
            data.vx = v.north_mps;
            data.vy = v.east_mps;
            data.vz = v.down_mps;
            data.yaw = v.yaw_deg.to_radians();
            IGNORE_POS | IGNORE_ACC | IGNORE_YAW_RATE
        }
        Setpoint::VelocityBody(b) => {
            data.coordinate_frame = MavFrame::MAV_FRAME_BODY_NED;
            data.vx = b.forward_mps;
            data.vy = b.right_mps;
            data.vz = b.down_mps;
            data.yaw_rate = b.yawspeed_dps.to_radians();
            IGNORE_POS | IGNORE_ACC | IGNORE_YAW
        }
    };
    data.type_mask = PositionTargetTypemask::from_bits_truncate(mask);
    MavMessage::SET_POSITION_TARGET_LOCAL_NED(data)
}

fn reader_loop(
    conn: Conn,
    tx: watch::Sender<TelemetrySample>,
    events: broadcast::Sender<LinkEvent>,
    hb_tx: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
    target_sys: u8,
) {
    let mut failures = 0u32;
    while !closed.load(Ordering::Relaxed) {
        let (hdr, msg) = match conn.recv() {
            Ok(m) => {
                failures = 0;
                m
            }
            Err(e) => {
                failures += 1;
                if failures % 100 == 1 {
                    debug!("fc: recv error ({}): {}", failures, e);
                }
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
        };
        if hdr.system_id != target_sys {
            continue;
        }
        match msg {
            MavMessage::HEARTBEAT(hb) if hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID => {
                let armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                let mode = if hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED) {
                    FlightMode::from_px4_custom_mode(hb.custom_mode)
                } else {
                    FlightMode::Unknown
                };
                tx.send_modify(|s| {
                    s.armed = armed;
                    s.flight_mode = mode;
                });
                hb_tx.send_replace(true);
            }
            MavMessage::GLOBAL_POSITION_INT(p) => tx.send_modify(|s| {
                s.lat = p.lat as f64 / 1e7;
                s.lon = p.lon as f64 / 1e7;
                s.relative_alt_m = p.relative_alt as f64 / 1000.0;
            }),
            MavMessage::ATTITUDE(a) => tx.send_modify(|s| {
                s.yaw_deg = (a.yaw as f64).to_degrees().rem_euclid(360.0);
                s.pitch_deg = (a.pitch as f64).to_degrees();
                s.roll_deg = (a.roll as f64).to_degrees();
            }),
            MavMessage::EXTENDED_SYS_STATE(x) => {
                let in_air = matches!(
                    x.landed_state,
                    MavLandedState::MAV_LANDED_STATE_IN_AIR
                        | MavLandedState::MAV_LANDED_STATE_TAKEOFF
                        | MavLandedState::MAV_LANDED_STATE_LANDING
                );
                tx.send_modify(|s| s.in_air = in_air);
            }
            MavMessage::COMMAND_ACK(ack) => {
                let _ = events.send(LinkEvent::Ack { command: ack.command, result: ack.result });
            }
            MavMessage::PARAM_VALUE(p) => {
                let _ = events.send(LinkEvent::Param { name: param_name(&p.param_id), value: p.param_value });
            }
            _ => {}
        }
    }
    debug!("fc: reader loop exiting");
}

fn lock(m: &Mutex<OffboardState>) -> MutexGuard<'_, OffboardState> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_streamer(m: &Mutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setpoint::{VelocityBody, VelocityNed};

    #[test]
    fn rejected_commands_are_precondition_failures() {
        let arm = MavCmd::MAV_CMD_COMPONENT_ARM_DISARM;
        assert_eq!(ack_result(arm, Some(Some(MavResult::MAV_RESULT_ACCEPTED))), Ok(()));
        assert!(matches!(
            ack_result(arm, Some(Some(MavResult::MAV_RESULT_TEMPORARILY_REJECTED))),
            Err(FcError::Precondition(_))
        ));
        assert!(matches!(ack_result(arm, Some(None)), Err(FcError::Transport(_))));
        assert!(matches!(ack_result(arm, None), Err(FcError::Transport(_))));
    }

    #[test]
    fn velocity_setpoint_masks_position() {
        let sp = Setpoint::VelocityNed(VelocityNed { north_mps: 1.0, east_mps: 2.0, down_mps: -0.15, yaw_deg: 90.0 });
        match encode_setpoint(sp, (1, 1), Instant::now()) {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(d) => {
                assert_eq!(d.type_mask.bits(), IGNORE_POS | IGNORE_ACC | IGNORE_YAW_RATE);
                assert_eq!(d.coordinate_frame, MavFrame::MAV_FRAME_LOCAL_NED);
                assert_eq!(d.vy, 2.0);
                assert!((d.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn body_setpoint_uses_body_frame_and_yaw_rate() {
        let sp = Setpoint::VelocityBody(VelocityBody::new(5.0, -3.0, -0.1, -60.0));
        match encode_setpoint(sp, (1, 1), Instant::now()) {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(d) => {
                assert_eq!(d.coordinate_frame, MavFrame::MAV_FRAME_BODY_NED);
                assert_eq!(d.type_mask.bits() & IGNORE_YAW, IGNORE_YAW);
                assert!((d.yaw_rate + 60f32.to_radians()).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
