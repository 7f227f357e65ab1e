use lapwing_nav::GeoPoint;
use std::fmt;
use tokio::sync::watch;

use crate::error::{FcError, FcResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlightMode {
    #[default]
    Unknown,
    Ready,
    Takeoff,
    Hold,
    Mission,
    ReturnToLaunch,
    Land,
    Offboard,
    Manual,
    Altctl,
    Posctl,
    Acro,
    Stabilized,
}

impl FlightMode {
    /// Decodes a PX4 custom mode word (main mode in bits 16..24, sub mode in 24..32).
    pub fn from_px4_custom_mode(custom_mode: u32) -> Self {
        let main = (custom_mode >> 16) & 0xff;
        let sub = (custom_mode >> 24) & 0xff;
        match (main, sub) {
            (1, _) => FlightMode::Manual,
            (2, _) => FlightMode::Altctl,
            (3, _) => FlightMode::Posctl,
            (4, 1) => FlightMode::Ready,
            (4, 2) => FlightMode::Takeoff,
            (4, 3) => FlightMode::Hold,
            (4, 4) => FlightMode::Mission,
            (4, 5) => FlightMode::ReturnToLaunch,
            (4, 6) => FlightMode::Land,
            (5, _) => FlightMode::Acro,
            (6, _) => FlightMode::Offboard,
            (7, _) => FlightMode::Stabilized,
            _ => FlightMode::Unknown,
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One snapshot of the vehicle as last reported by the autopilot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySample {
    pub lat: f64,
    pub lon: f64,
    pub relative_alt_m: f64,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub in_air: bool,
    pub armed: bool,
    pub flight_mode: FlightMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub relative_alt_m: f64,
}

impl Position {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
}

/// Producer side, owned by the adapter variant that talks to the vehicle.
pub(crate) fn bus(initial: TelemetrySample) -> (watch::Sender<TelemetrySample>, Telemetry) {
    let (tx, rx) = watch::channel(initial);
    (tx, Telemetry { rx })
}

/// Cheap handle from which any number of telemetry streams can be opened.
#[derive(Debug, Clone)]
pub struct Telemetry {
    rx: watch::Receiver<TelemetrySample>,
}

impl Telemetry {
    pub fn latest(&self) -> TelemetrySample {
        *self.rx.borrow()
    }

    pub fn samples(&self) -> TelemetryStream<TelemetrySample> {
        self.stream(|s| *s)
    }

    pub fn position(&self) -> TelemetryStream<Position> {
        self.stream(|s| Position { lat: s.lat, lon: s.lon, relative_alt_m: s.relative_alt_m })
    }

    pub fn attitude(&self) -> TelemetryStream<Attitude> {
        self.stream(|s| Attitude { roll_deg: s.roll_deg, pitch_deg: s.pitch_deg, yaw_deg: s.yaw_deg })
    }

    pub fn in_air(&self) -> TelemetryStream<bool> {
        self.stream(|s| s.in_air)
    }

    pub fn armed(&self) -> TelemetryStream<bool> {
        self.stream(|s| s.armed)
    }

    pub fn flight_mode(&self) -> TelemetryStream<FlightMode> {
        self.stream(|s| s.flight_mode)
    }

    fn stream<T>(&self, project: fn(&TelemetrySample) -> T) -> TelemetryStream<T> {
        TelemetryStream { rx: self.rx.clone(), project, started: false }
    }
}

/// Lazy, infinite sequence of projected samples. The first call yields the
/// current value; later calls wait for the next update. Dropping it cancels.
pub struct TelemetryStream<T> {
    rx: watch::Receiver<TelemetrySample>,
    project: fn(&TelemetrySample) -> T,
    started: bool,
}

impl<T> TelemetryStream<T> {
    pub async fn next(&mut self) -> FcResult<T> {
        if self.started {
            self.rx
                .changed()
                .await
                .map_err(|_| FcError::Transport("telemetry stream closed".into()))?;
        }
        self.started = true;
        let sample = self.rx.borrow_and_update();
        Ok((self.project)(&sample))
    }
}
