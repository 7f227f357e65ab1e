//! Closed-loop movement on top of the autopilot's offboard interface.
//!
//! A [`Movement`] is built fresh by each state with the lateral offset it
//! wants. Every operation blocks on telemetry; abandoning one leaves the
//! last setpoint in force, and none of them writes a final zero setpoint.

use lapwing_fc::{Drone, FcResult, VelocityBody, VelocityNed};
use lapwing_nav::{GeoPoint, LateralOffset, MissionPlan, Waypoint};
use std::f64::consts::FRAC_PI_2;
use tracing::{debug, info};

/// Body-frame command used while turning around a pylon.
pub const TURN_BODY_VELOCITY: (f32, f32, f32, f32) = (5.0, -3.0, -0.1, -60.0);
/// Accepted deviation from the requested turn angle, degrees.
pub const TURN_TOLERANCE_DEG: f64 = 10.0;
/// Vertical bias while inside the altitude band (NED, negative climbs).
pub const IN_BAND_DOWN_MPS: f64 = -0.15;
/// Floor under the per-axis arrival tolerance. One 10 Hz step at full speed
/// is about 0.64 m, so a smaller box can be stepped over on every sample.
pub const MIN_ARRIVAL_M: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub target: GeoPoint,
    /// (east, north) residual at entry, metres.
    pub initial: (f64, f64),
    /// (east, north) residual when the loop ended, metres.
    pub residual: (f64, f64),
    pub samples: u32,
}

pub struct Movement<'a> {
    drone: &'a Drone,
    plan: &'a MissionPlan,
    offset: LateralOffset,
}

impl<'a> Movement<'a> {
    pub fn new(drone: &'a Drone, plan: &'a MissionPlan) -> Self {
        Self { drone, plan, offset: plan.offset }
    }

    pub fn with_offset(mut self, offset: LateralOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Flies to a standoff point beside `wp`. The standoff is fixed from the
    /// first position sample.
    pub async fn move_to(&self, wp: &Waypoint) -> FcResult<MoveOutcome> {
        let mut positions = self.drone.telemetry().position();
        let start = positions.next().await?;
        let target = wp.standoff_from(&start.point(), self.offset);
        let initial = start.point().local_offset_m(&target);
        let tol = (
            arrival_tolerance(initial.0, self.plan.point_percent_accuracy),
            arrival_tolerance(initial.1, self.plan.point_percent_accuracy),
        );
        let band = (
            wp.altitude_m * (1.0 - self.plan.alt_percent_accuracy),
            wp.altitude_m * (1.0 + self.plan.alt_percent_accuracy),
        );
        info!(
            "move_to: target {:.6},{:.6} residual e={:.1}m n={:.1}m",
            target.lat, target.lon, initial.0, initial.1
        );

        let mut residual = initial;
        let mut samples = 0u32;
        while residual.0.abs() > tol.0 || residual.1.abs() > tol.1 {
            let pos = positions.next().await?;
            samples += 1;
            residual = pos.point().local_offset_m(&target);
            if residual.0.abs() <= tol.0 && residual.1.abs() <= tol.1 {
                break;
            }
            let sp = velocity_toward(&pos.point(), &target, pos.relative_alt_m, band, self.plan);
            self.drone.set_velocity_ned(sp).await?;
        }
        debug!("move_to: arrived after {} samples, e={:.2}m n={:.2}m", samples, residual.0, residual.1);
        Ok(MoveOutcome { target, initial, residual, samples })
    }

    /// Turns in place (roughly) until yaw has changed by `angle_deg`.
    pub async fn turn(&self, angle_deg: f64) -> FcResult<f64> {
        let mut attitude = self.drone.telemetry().attitude();
        let entry = attitude.next().await?.yaw_deg;
        let (f, r, d, yr) = TURN_BODY_VELOCITY;
        self.drone.set_velocity_body(VelocityBody::new(f, r, d, yr)).await?;
        loop {
            let yaw = attitude.next().await?.yaw_deg;
            if turn_complete(entry, yaw, angle_deg) {
                debug!("turn: {:.1} -> {:.1}", entry, yaw);
                return Ok(yaw);
            }
        }
    }

    /// Waits until the vehicle is at least at the bottom of the altitude band.
    pub async fn check_altitude(&self) -> FcResult<f64> {
        let mut positions = self.drone.telemetry().position();
        loop {
            let alt = positions.next().await?.relative_alt_m;
            if alt >= self.plan.alt_range_min() {
                return Ok(alt);
            }
        }
    }

    /// Zero velocity, keeping the current heading.
    pub async fn hold(&self) -> FcResult<()> {
        let yaw = self.drone.telemetry().latest().yaw_deg as f32;
        self.drone.set_velocity_ned(VelocityNed { yaw_deg: yaw, ..Default::default() }).await
    }
}

fn arrival_tolerance(initial: f64, ratio: f64) -> f64 {
    (initial.abs() * ratio).max(MIN_ARRIVAL_M)
}

/// Velocity-NED setpoint of `plan.max_speed_mps` from `from` toward `to`,
/// nose on the bearing.
pub fn velocity_toward(from: &GeoPoint, to: &GeoPoint, alt_m: f64, band: (f64, f64), plan: &MissionPlan) -> VelocityNed {
    let (dx, dy) = from.local_offset_m(to);
    let (vn, ve) = decompose(dx, dy, plan.max_speed_mps);
    let bearing = from.heading_initial(to);
    VelocityNed {
        north_mps: vn as f32,
        east_mps: ve as f32,
        down_mps: vertical_speed(alt_m, band, plan.alt_correction_speed_mps) as f32,
        yaw_deg: if bearing.is_finite() { bearing as f32 } else { 0.0 },
    }
}

/// Splits `speed` into (north, east) along the residual (dx east, dy north).
pub fn decompose(dx: f64, dy: f64, speed: f64) -> (f64, f64) {
    let h = dx.hypot(dy);
    if !(h > f64::EPSILON) || !speed.is_finite() {
        return (0.0, 0.0);
    }
    let theta = if dy != 0.0 { (dx / dy).abs().atan() } else { FRAC_PI_2 - (dy / h).abs().asin() };
    ((speed * theta.cos()).copysign(dy), (speed * theta.sin()).copysign(dx))
}

pub fn vertical_speed(alt_m: f64, (min, max): (f64, f64), correction: f64) -> f64 {
    if alt_m > max {
        correction
    } else if alt_m < min {
        -correction
    } else {
        IN_BAND_DOWN_MPS
    }
}

/// True once `yaw` differs from `entry` by `angle_deg` within the tolerance,
/// measured the short way round.
pub fn turn_complete(entry: f64, yaw: f64, angle_deg: f64) -> bool {
    let diff = (yaw - entry).rem_euclid(360.0);
    let turned = diff.min(360.0 - diff);
    let wanted = angle_deg.rem_euclid(360.0);
    let wanted = wanted.min(360.0 - wanted);
    (turned - wanted).abs() <= TURN_TOLERANCE_DEG
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decompose_points_at_target() {
        let (vn, ve) = decompose(3.0, 4.0, 5.0);
        assert!((vn - 4.0).abs() < 1e-9 && (ve - 3.0).abs() < 1e-9);
        let (vn, ve) = decompose(-3.0, -4.0, 5.0);
        assert!((vn + 4.0).abs() < 1e-9 && (ve + 3.0).abs() < 1e-9);
    }

    #[test]
    fn decompose_due_east_and_west() {
        let (vn, ve) = decompose(10.0, 0.0, 6.352);
        assert!(vn.abs() < 1e-9);
        assert!((ve - 6.352).abs() < 1e-9);
        let (_, ve) = decompose(-10.0, 0.0, 6.352);
        assert!((ve + 6.352).abs() < 1e-9);
        assert_eq!(decompose(0.0, 0.0, 6.352), (0.0, 0.0));
    }

    #[test]
    fn arrival_tolerance_is_proportional_above_the_floor() {
        assert!((arrival_tolerance(60.0, 0.2) - 12.0).abs() < 1e-9);
        assert!((arrival_tolerance(-60.0, 0.2) - 12.0).abs() < 1e-9);
        // a near-aligned axis would otherwise demand centimetre accuracy
        assert_eq!(arrival_tolerance(0.2, 0.2), MIN_ARRIVAL_M);
        assert_eq!(arrival_tolerance(0.0, 0.2), MIN_ARRIVAL_M);
    }

    #[test]
    fn vertical_band() {
        let band = (5.1, 6.9);
        assert_eq!(vertical_speed(7.5, band, 0.25), 0.25);
        assert_eq!(vertical_speed(3.0, band, 0.25), -0.25);
        assert_eq!(vertical_speed(6.0, band, 0.25), IN_BAND_DOWN_MPS);
    }

    #[test]
    fn turn_window() {
        assert!(!turn_complete(10.0, 10.0, 180.0));
        assert!(turn_complete(10.0, 196.0, 180.0));
        assert!(turn_complete(350.0, 175.0, 180.0));
        assert!(!turn_complete(0.0, 150.0, 180.0));
        assert!(turn_complete(0.0, 265.0, 90.0));
    }

    proptest! {
        #[test]
        fn setpoints_are_never_nan(
            lat in -80.0f64..80.0, lon in -179.0f64..179.0,
            de in -500.0f64..500.0, dn in -500.0f64..500.0,
            alt in 0.0f64..20.0,
        ) {
            let plan = MissionPlan::default();
            let from = GeoPoint::new(lat, lon);
            let to = from.displaced_m(de, dn);
            let sp = velocity_toward(&from, &to, alt, (plan.alt_range_min(), plan.alt_range_max()), &plan);
            prop_assert!(sp.north_mps.is_finite() && sp.east_mps.is_finite());
            prop_assert!(sp.down_mps.is_finite() && sp.yaw_deg.is_finite());
            prop_assert!(velocity_toward(&from, &from, alt, (5.1, 6.9), &plan).north_mps.is_finite());
        }
    }
}
