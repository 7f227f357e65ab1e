use serde::{Deserialize, Serialize};

/// Mean Earth radius used by every spherical formula in this crate.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geodetic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Builds a point from degrees/minutes/seconds; southern and western
    /// hemispheres take negative degrees.
    pub fn from_dms(lat: (f64, f64, f64), lon: (f64, f64, f64)) -> Self {
        Self::new(dms_to_deg(lat), dms_to_deg(lon))
    }

    /// Initial great-circle bearing towards `other`, in [0, 360).
    pub fn heading_initial(&self, other: &GeoPoint) -> f64 {
        if self == other {
            return 0.0;
        }
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let x = dlon.sin() * phi2.cos();
        let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
        let h = x.atan2(y).to_degrees().rem_euclid(360.0);
        // rem_euclid rounds tiny negatives up to exactly 360.0
        if h >= 360.0 { 0.0 } else { h }
    }

    /// Haversine distance in kilometres.
    pub fn distance(&self, other: &GeoPoint) -> f64 {
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// Destination reached by walking `dist_km` along `bearing_deg`.
    pub fn offset(&self, bearing_deg: f64, dist_km: f64) -> GeoPoint {
        let delta = dist_km / EARTH_RADIUS_KM;
        let theta = bearing_deg.to_radians();
        let phi1 = self.lat.to_radians();
        let lambda1 = self.lon.to_radians();

        let sin_phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).clamp(-1.0, 1.0);
        let phi2 = sin_phi2.asin();
        let lambda2 = lambda1
            + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * sin_phi2);

        let lon = (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
        GeoPoint::new(phi2.to_degrees(), lon)
    }

    /// Local east/north offset in metres from `self` to `other`.
    ///
    /// Equirectangular projection around `self`; only meaningful over a few km.
    pub fn local_offset_m(&self, other: &GeoPoint) -> (f64, f64) {
        let r = EARTH_RADIUS_KM * 1000.0;
        let east = (other.lon - self.lon).to_radians() * r * self.lat.to_radians().cos();
        let north = (other.lat - self.lat).to_radians() * r;
        (east, north)
    }

    /// Inverse of [`GeoPoint::local_offset_m`].
    pub fn displaced_m(&self, east_m: f64, north_m: f64) -> GeoPoint {
        let r = EARTH_RADIUS_KM * 1000.0;
        let lat = self.lat + (north_m / r).to_degrees();
        let lon = self.lon + (east_m / (r * self.lat.to_radians().cos())).to_degrees();
        GeoPoint::new(lat, lon)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.lat.abs() <= 90.0 && self.lon.abs() <= 180.0
    }
}

fn dms_to_deg((d, m, s): (f64, f64, f64)) -> f64 {
    let mag = d.abs() + m / 60.0 + s / 3600.0;
    if d.is_sign_negative() { -mag } else { mag }
}
