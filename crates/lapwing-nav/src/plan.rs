use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

pub const TAKEOFF_ALT: f64 = 6.0;
pub const MAX_ALT: f64 = 9.0;
pub const MAX_SPEED: f64 = 6.352;
pub const ALT_CORRECTION_SPEED: f64 = 0.25;
pub const ALT_PERCENT_ACCURACY: f64 = 0.15;
pub const POINT_PERCENT_ACCURACY: f64 = 0.2;
/// Lateral standoff distance around a pylon, km.
pub const OFFSET: f64 = 0.005;
/// Lateral standoff bearing relative to the approach heading.
pub const DEG_OFFSET: f64 = 90.0;
pub const NUM_LAPS: u32 = 2;

/// 37°56′55.6″ N, 91°47′03.3″ W
pub fn pylon1() -> GeoPoint {
    GeoPoint::from_dms((37.0, 56.0, 55.6), (-91.0, 47.0, 3.3))
}

/// 37°56′53.3″ N, 91°47′00.0″ W
pub fn pylon2() -> GeoPoint {
    GeoPoint::from_dms((37.0, 56.0, 53.3), (-91.0, 47.0, 0.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateralOffset {
    pub bearing_deg: f64,
    pub dist_km: f64,
}

impl Default for LateralOffset {
    fn default() -> Self {
        Self { bearing_deg: DEG_OFFSET, dist_km: OFFSET }
    }
}

impl LateralOffset {
    /// Same distance on the opposite side of the track.
    pub fn mirrored(self) -> Self {
        Self { bearing_deg: -self.bearing_deg, ..self }
    }
}

/// Geodetic target plus the altitude to hold on the way there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub point: GeoPoint,
    pub altitude_m: f64,
    #[serde(default)]
    pub offset: Option<LateralOffset>,
}

impl Waypoint {
    pub fn new(point: GeoPoint, altitude_m: f64) -> Self {
        Self { point, altitude_m, offset: None }
    }

    pub fn with_offset(mut self, offset: LateralOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Point beside `self.point`, offset perpendicular-ish to the approach from `from`.
    pub fn standoff_from(&self, from: &GeoPoint, fallback: LateralOffset) -> GeoPoint {
        let off = self.offset.unwrap_or(fallback);
        if off.dist_km <= 0.0 {
            return self.point;
        }
        let bearing = from.heading_initial(&self.point);
        self.point.offset(bearing + off.bearing_deg, off.dist_km)
    }
}

/// Surveyed geometry and flight envelope of one mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionPlan {
    pub pylon1: GeoPoint,
    pub pylon2: GeoPoint,
    pub mast: GeoPoint,
    pub takeoff_alt_m: f64,
    pub mast_alt_m: f64,
    pub max_alt_m: f64,
    pub max_speed_mps: f64,
    pub alt_correction_speed_mps: f64,
    pub alt_percent_accuracy: f64,
    pub point_percent_accuracy: f64,
    pub offset: LateralOffset,
    /// Hover time at the mast before moving on.
    pub mast_settle_s: f64,
    /// How long DetectModule collects vision results.
    pub detect_window_s: f64,
    pub arm_attempts: u32,
}

impl Default for MissionPlan {
    fn default() -> Self {
        Self {
            pylon1: pylon1(),
            pylon2: pylon2(),
            mast: GeoPoint::new(37.949350, -91.783900),
            takeoff_alt_m: TAKEOFF_ALT,
            mast_alt_m: 3.0,
            max_alt_m: MAX_ALT,
            max_speed_mps: MAX_SPEED,
            alt_correction_speed_mps: ALT_CORRECTION_SPEED,
            alt_percent_accuracy: ALT_PERCENT_ACCURACY,
            point_percent_accuracy: POINT_PERCENT_ACCURACY,
            offset: LateralOffset::default(),
            mast_settle_s: 20.0,
            detect_window_s: 10.0,
            arm_attempts: 5,
        }
    }
}

impl MissionPlan {
    pub fn alt_range_min(&self) -> f64 {
        self.takeoff_alt_m * (1.0 - self.alt_percent_accuracy)
    }

    pub fn alt_range_max(&self) -> f64 {
        self.takeoff_alt_m * (1.0 + self.alt_percent_accuracy)
    }

    pub fn pylon1_waypoint(&self) -> Waypoint {
        Waypoint::new(self.pylon1, self.takeoff_alt_m)
    }

    pub fn pylon2_waypoint(&self) -> Waypoint {
        Waypoint::new(self.pylon2, self.takeoff_alt_m)
    }

    /// Approached like a pylon, so the pole stays beside the vehicle.
    pub fn mast_waypoint(&self) -> Waypoint {
        Waypoint::new(self.mast, self.takeoff_alt_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn altitude_band() {
        let p = MissionPlan::default();
        assert!((p.alt_range_min() - 5.1).abs() < 1e-9);
        assert!((p.alt_range_max() - 6.9).abs() < 1e-9);
    }

    #[test]
    fn pylons_are_about_a_hundred_metres_apart() {
        let d = pylon1().distance(&pylon2()) * 1000.0;
        assert!(d > 90.0 && d < 120.0, "d={}", d);
    }

    #[test]
    fn standoff_sits_beside_target() {
        let from = GeoPoint::new(37.948955, -91.784440);
        let wp = Waypoint::new(pylon1(), 6.0);
        let stand = wp.standoff_from(&from, LateralOffset::default());
        let d = stand.distance(&wp.point) * 1000.0;
        assert!((d - 5.0).abs() < 0.01, "d={}", d);

        let mirrored = wp.standoff_from(&from, LateralOffset::default().mirrored());
        assert!(mirrored.distance(&stand) * 1000.0 > 9.9);
    }

    #[test]
    fn mast_is_approached_with_the_standoff() {
        let p = MissionPlan::default();
        let stand = p.mast_waypoint().standoff_from(&p.pylon1, p.offset);
        let d = stand.distance(&p.mast) * 1000.0;
        assert!((d - 5.0).abs() < 0.01, "d={}", d);
    }

    #[test]
    fn zero_offset_keeps_point() {
        let p = MissionPlan::default();
        let wp = p.mast_waypoint().with_offset(LateralOffset { bearing_deg: 0.0, dist_km: 0.0 });
        assert_eq!(wp.standoff_from(&p.pylon1, p.offset), p.mast);
    }

    #[test]
    fn plan_from_partial_toml() {
        let p: MissionPlan = toml::from_str("takeoff_alt_m = 5.0\n[mast]\nlat = 37.95\nlon = -91.78\n").unwrap();
        assert_eq!(p.takeoff_alt_m, 5.0);
        assert_eq!(p.mast, GeoPoint::new(37.95, -91.78));
        assert_eq!(p.max_speed_mps, MAX_SPEED);
    }
}
