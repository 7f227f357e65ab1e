//! Module depth, region of interest, bounds and attitude relative to the
//! camera.

use image::{GrayImage, Luma};
use lapwing_proto::{BoundingBox, ObjectType};

use crate::imgproc::canny::canny;
use crate::imgproc::contours::{find_contours, Retrieval};
use crate::imgproc::shapes::{approx_poly_dp, arc_length, min_area_rect};
use crate::imgproc::{DepthImage, Point2f};

pub const MODULE_HEIGHT_MM: f64 = 76.2;
pub const MODULE_WIDTH_MM: f64 = 50.8;
pub const V_FOV_DEG: f64 = 57.0;
pub const H_FOV_DEG: f64 = 86.0;
pub const PAD: f64 = 0.85;
/// Depth at which the averaging window is at its nominal size.
pub const SWEET_SPOT_MM: f64 = 750.0;

/// 1 at the sweet spot, falling linearly to a 0.01 floor at twice that
/// distance, rising the same way when closer.
fn depth_factor(depth_mm: f64) -> f64 {
    (2.0 - depth_mm / SWEET_SPOT_MM).max(0.01)
}

pub fn adjusted_radius(depth_mm: f64) -> u32 {
    (20.0 * depth_factor(depth_mm)).clamp(10.0, 20.0).round() as u32
}

/// Mean of the non-zero depths in a square window around `center`; 0 when
/// the window holds no valid depth.
pub fn get_module_depth(depth: &DepthImage, center: (u32, u32), depth_mm: f64) -> f64 {
    let r = adjusted_radius(depth_mm) as i64;
    let (w, h) = (depth.width() as i64, depth.height() as i64);
    let (cx, cy) = (center.0 as i64, center.1 as i64);
    let (mut sum, mut n) = (0u64, 0u64);
    for y in (cy - r).max(0)..=(cy + r).min(h - 1) {
        for x in (cx - r).max(0)..=(cx + r).min(w - 1) {
            let d = depth.get_pixel(x as u32, y as u32).0[0];
            if d > 0 {
                sum += d as u64;
                n += 1;
            }
        }
    }
    if n == 0 {
        0.0
    } else {
        sum as f64 / n as f64
    }
}

/// Window in pixels, clipped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Roi {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }
}

fn half_extent(size_mm: f64, depth_mm: f64, fov_deg: f64, resolution: u32) -> f64 {
    let ratio = (size_mm / 2.0 / depth_mm).atan() / (fov_deg.to_radians() / 2.0);
    ratio * resolution as f64 / 2.0 * PAD
}

/// Rectangle the module face should cover at `depth_mm`. `None` for a
/// non-positive depth or an empty image.
pub fn module_window(dims: (u32, u32), center: (u32, u32), depth_mm: f64) -> Option<Roi> {
    let (w, h) = dims;
    if !(depth_mm > 0.0) || w == 0 || h == 0 {
        return None;
    }
    let hh = half_extent(MODULE_HEIGHT_MM, depth_mm, V_FOV_DEG, h);
    let hw = half_extent(MODULE_WIDTH_MM, depth_mm, H_FOV_DEG, w);
    let (cx, cy) = (center.0 as f64, center.1 as f64);
    let clip = |v: f64, max: u32| v.round().clamp(0.0, (max - 1) as f64) as u32;
    Some(Roi { x0: clip(cx - hw, w), y0: clip(cy - hh, h), x1: clip(cx + hw, w), y1: clip(cy + hh, h) })
}

pub fn region_of_interest(depth: &DepthImage, depth_mm: f64, center: (u32, u32)) -> Option<DepthImage> {
    let roi = module_window(depth.dimensions(), center, depth_mm)?;
    Some(image::imageops::crop_imm(depth, roi.x0, roi.y0, roi.width(), roi.height()).to_image())
}

pub fn get_module_bounds(dims: (u32, u32), center: (u32, u32), depth_mm: f64) -> Option<BoundingBox> {
    let roi = module_window(dims, center, depth_mm)?;
    Some(BoundingBox::from_corners(roi.x0 as f32, roi.y0 as f32, roi.x1 as f32, roi.y1 as f32, ObjectType::Module))
}

/// (pitch, yaw) in degrees from the depth gradient across the ROI: pitch
/// from last column minus first, yaw from last row minus first. Pairs with
/// a missing depth on either end are ignored.
pub fn get_module_orientation(roi: &DepthImage) -> (f64, f64) {
    let (w, h) = roi.dimensions();
    if w == 0 || h == 0 {
        return (0.0, 0.0);
    }
    let d = |x: u32, y: u32| roi.get_pixel(x, y).0[0];
    let mean_diff = |pairs: &mut dyn Iterator<Item = (u16, u16)>| {
        let (mut sum, mut n) = (0.0, 0usize);
        for (a, b) in pairs {
            if a > 0 && b > 0 {
                sum += b as f64 - a as f64;
                n += 1;
            }
        }
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    };
    let cols = mean_diff(&mut (0..h).map(|y| (d(0, y), d(w - 1, y))));
    let rows = mean_diff(&mut (0..w).map(|x| (d(x, 0), d(x, h - 1))));
    ((cols / 1000.0).atan().to_degrees(), (rows / 1000.0).atan().to_degrees())
}

/// Mean tilt of the rectangular outlines in an 8-bit view of the region,
/// degrees in `[-45, 45)`. `None` when no outline qualifies.
pub fn get_module_roll(region: &GrayImage) -> Option<f64> {
    let edges = canny(region, 150.0, 450.0);
    let mut angles = Vec::new();
    for contour in find_contours(&edges, Retrieval::External) {
        let eps = 0.01 * arc_length(&contour.points, true);
        let approx = approx_poly_dp(&contour.points, eps, true);
        if approx.len() >= 8 {
            continue;
        }
        let pts: Vec<Point2f> = contour.points.iter().map(|&p| p.into()).collect();
        let Some(rect) = min_area_rect(&pts) else { continue };
        // dots and straight runs carry no orientation
        if rect.width < 1.0 || rect.height < 1.0 {
            continue;
        }
        let angle = rect.upright().angle;
        if angle.abs() < 45.0 {
            angles.push(angle);
        }
    }
    if angles.is_empty() {
        return None;
    }
    Some(angles.iter().sum::<f64>() / angles.len() as f64)
}

/// Depth ROI stretched to 8 bits over its valid range, for edge finding.
pub fn depth_to_gray(roi: &DepthImage) -> GrayImage {
    let valid = roi.pixels().map(|p| p.0[0]).filter(|&d| d > 0);
    let (lo, hi) = valid.fold((u16::MAX, 0u16), |(lo, hi), d| (lo.min(d), hi.max(d)));
    let span = hi.saturating_sub(lo).max(1) as f32;
    GrayImage::from_fn(roi.width(), roi.height(), |x, y| {
        let d = roi.get_pixel(x, y).0[0];
        if d == 0 || lo > hi {
            Luma([0])
        } else {
            Luma([((d - lo) as f32 / span * 255.0).round() as u8])
        }
    })
}
