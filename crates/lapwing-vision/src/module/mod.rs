//! Module detection: locate the four-hole face, then measure it.

pub mod geometry;
pub mod locator;

use image::RgbImage;
use lapwing_proto::{BoundingBox, ModuleObservation, ObjectType};
use tracing::debug;

use crate::imgproc::DepthImage;
use geometry::{depth_to_gray, get_module_bounds, get_module_depth, get_module_orientation, get_module_roll, region_of_interest};
use locator::{locate, Outcome};

/// Runs the locator and, when the module is in frame, the geometry stage.
/// Geometry failures come back as `Err` with the centre box still usable.
pub fn observe(color: &RgbImage, depth: &DepthImage) -> (Outcome, Option<Result<ModuleObservation, String>>) {
    let outcome = locate(color, depth);
    let Some((x, y)) = outcome.center() else {
        debug!("module: not in frame ({:?})", outcome);
        return (outcome, None);
    };
    let geometry = measure(depth, (x, y));
    (outcome, Some(geometry))
}

pub fn center_box(x: u32, y: u32) -> BoundingBox {
    BoundingBox::point(x as f32, y as f32, ObjectType::Module)
}

fn measure(depth: &DepthImage, center: (u32, u32)) -> Result<ModuleObservation, String> {
    let at_center = depth.get_pixel(center.0, center.1).0[0] as f64;
    let d = get_module_depth(depth, center, at_center);
    if d <= 0.0 {
        return Err("no valid depth around centre".into());
    }
    let roi = region_of_interest(depth, d, center).ok_or("empty region of interest")?;
    let bounds = get_module_bounds(depth.dimensions(), center, d).ok_or("empty module bounds")?;
    let (pitch_deg, yaw_deg) = get_module_orientation(&roi);
    let roll_deg = get_module_roll(&depth_to_gray(&roi));
    Ok(ModuleObservation { center_x: center.0, center_y: center.1, depth_mm: d, bounds, pitch_deg, yaw_deg, roll_deg })
}
