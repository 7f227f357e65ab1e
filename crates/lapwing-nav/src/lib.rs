pub mod doctor;
pub mod geo;
pub mod plan;

pub use geo::{GeoPoint, EARTH_RADIUS_KM};
pub use plan::{LateralOffset, MissionPlan, Waypoint};
