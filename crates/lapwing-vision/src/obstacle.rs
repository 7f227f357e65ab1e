//! Blob finder for obstacles.
//!
//! The gray frame is thresholded at a sweep of levels; connected regions
//! passing the area, circularity, convexity and colour filters at one
//! level are matched to those at other levels by centre distance, and a
//! blob is kept once it shows up at `min_repeatability` levels.

use image::{GrayImage, Luma, RgbImage};
use lapwing_proto::{BoundingBox, ObjectType};
use serde::Deserialize;
use tracing::debug;

use crate::imgproc::contours::{find_contours, Retrieval};
use crate::imgproc::filter::to_gray;
use crate::imgproc::shapes::{arc_length, contour_area, convex_hull};
use crate::imgproc::Point2f;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    pub min_threshold: u8,
    pub max_threshold: u8,
    pub threshold_step: u8,
    pub min_repeatability: usize,
    pub min_dist_between_blobs: f32,

    pub filter_by_color: bool,
    /// 0 for dark blobs on a bright background, 255 for the reverse.
    pub blob_color: u8,

    pub filter_by_area: bool,
    pub min_area: f64,
    pub max_area: f64,

    pub filter_by_circularity: bool,
    pub min_circularity: f64,
    pub max_circularity: f64,

    pub filter_by_convexity: bool,
    pub min_convexity: f64,
    pub max_convexity: f64,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            min_threshold: 10,
            max_threshold: 220,
            threshold_step: 10,
            min_repeatability: 2,
            min_dist_between_blobs: 10.0,
            filter_by_color: true,
            blob_color: 0,
            filter_by_area: true,
            min_area: 1500.0,
            max_area: 40_000.0,
            filter_by_circularity: true,
            min_circularity: 0.1,
            max_circularity: f64::MAX,
            filter_by_convexity: true,
            min_convexity: 0.87,
            max_convexity: f64::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub center: Point2f,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    center: Point2f,
    radius: f64,
}

pub struct ObstacleFinder {
    params: BlobParams,
}

impl ObstacleFinder {
    pub fn new(params: BlobParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BlobParams {
        &self.params
    }

    /// `avoid` boxes around every blob, clipped to the frame.
    pub fn find(&self, color: &RgbImage) -> Vec<BoundingBox> {
        let (w, h) = color.dimensions();
        if w == 0 || h == 0 {
            return Vec::new();
        }
        let (xm, ym) = ((w - 1) as f32, (h - 1) as f32);
        self.blobs(&to_gray(color))
            .into_iter()
            .map(|b| {
                let (cx, cy, r) = (b.center.x as f32, b.center.y as f32, b.radius as f32);
                BoundingBox::from_corners(
                    (cx - r).clamp(0.0, xm),
                    (cy - r).clamp(0.0, ym),
                    (cx + r).clamp(0.0, xm),
                    (cy + r).clamp(0.0, ym),
                    ObjectType::Avoid,
                )
            })
            .collect()
    }

    pub fn blobs(&self, gray: &GrayImage) -> Vec<Blob> {
        let p = &self.params;
        let step = p.threshold_step.max(1) as usize;
        let mut groups: Vec<Vec<Candidate>> = Vec::new();
        for t in (p.min_threshold as usize..p.max_threshold as usize).step_by(step) {
            let level = self.candidates(gray, t as u8);
            let mut fresh = Vec::new();
            for c in level {
                let hit = groups.iter_mut().find(|g| {
                    let last = g[g.len() - 1];
                    let d = (last.center.x - c.center.x).hypot(last.center.y - c.center.y);
                    d < p.min_dist_between_blobs as f64 && d < last.radius.max(c.radius)
                });
                match hit {
                    Some(g) => g.push(c),
                    None => fresh.push(vec![c]),
                }
            }
            groups.extend(fresh);
        }

        let blobs: Vec<Blob> = groups
            .into_iter()
            .filter(|g| g.len() >= p.min_repeatability)
            .map(|g| {
                let n = g.len() as f64;
                let cx = g.iter().map(|c| c.center.x).sum::<f64>() / n;
                let cy = g.iter().map(|c| c.center.y).sum::<f64>() / n;
                let mut radii: Vec<f64> = g.iter().map(|c| c.radius).collect();
                radii.sort_by(f64::total_cmp);
                Blob { center: Point2f::new(cx, cy), radius: radii[radii.len() / 2] }
            })
            .collect();
        debug!("obstacle: {} blobs", blobs.len());
        blobs
    }

    /// Regions at one threshold level that pass the shape filters.
    fn candidates(&self, gray: &GrayImage, threshold: u8) -> Vec<Candidate> {
        let p = &self.params;
        let mut out = Vec::new();
        // dark regions are the foreground when looking for dark blobs
        let polarities: &[bool] = if !p.filter_by_color {
            &[true, false]
        } else if p.blob_color == 0 {
            &[true]
        } else {
            &[false]
        };
        for &dark in polarities {
            let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
                let below = gray.get_pixel(x, y).0[0] < threshold;
                Luma([if below == dark { 255 } else { 0 }])
            });
            for contour in find_contours(&mask, Retrieval::TwoLevel) {
                if contour.is_hole || contour.points.len() < 3 {
                    continue;
                }
                let area = contour_area(&contour.points);
                if p.filter_by_area && (area < p.min_area || area >= p.max_area) {
                    continue;
                }
                let perimeter = arc_length(&contour.points, true);
                if p.filter_by_circularity {
                    let circ = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
                    if circ < p.min_circularity || circ >= p.max_circularity {
                        continue;
                    }
                }
                let pts: Vec<Point2f> = contour.points.iter().map(|&q| q.into()).collect();
                if p.filter_by_convexity {
                    let hull = convex_hull(&pts);
                    let hull_area = polygon_area(&hull);
                    if hull_area <= 0.0 {
                        continue;
                    }
                    let ratio = area / hull_area;
                    if ratio < p.min_convexity || ratio >= p.max_convexity {
                        continue;
                    }
                }
                let n = pts.len() as f64;
                let center = Point2f::new(pts.iter().map(|q| q.x).sum::<f64>() / n, pts.iter().map(|q| q.y).sum::<f64>() / n);
                let mut dists: Vec<f64> = pts.iter().map(|q| (q.x - center.x).hypot(q.y - center.y)).collect();
                dists.sort_by(f64::total_cmp);
                let radius = (dists[(dists.len() - 1) / 2] + dists[dists.len() / 2]) / 2.0;
                out.push(Candidate { center, radius });
            }
        }
        out
    }
}

fn polygon_area(points: &[Point2f]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        area += p.x * q.y - q.x * p.y;
    }
    area.abs() * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scene(disks: &[(f32, f32, f32, u8)]) -> RgbImage {
        RgbImage::from_fn(320, 240, |x, y| {
            for &(cx, cy, r, v) in disks {
                if (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2) <= r * r {
                    return Rgb([v, v, v]);
                }
            }
            Rgb([240, 240, 240])
        })
    }

    #[test]
    fn dark_disk_becomes_an_avoid_box() {
        let finder = ObstacleFinder::new(BlobParams::default());
        let boxes = finder.find(&scene(&[(160.0, 120.0, 40.0, 20)]));
        assert_eq!(boxes.len(), 1, "{:?}", boxes);
        let b = &boxes[0];
        assert_eq!(b.object_type, ObjectType::Avoid);
        assert_eq!(b.vertices().len(), 4);
        let c = b.center();
        assert!((c.x - 160.0).abs() < 2.0 && (c.y - 120.0).abs() < 2.0, "{:?}", c);
        assert!((b.width() - 80.0).abs() < 6.0, "{}", b.width());
    }

    #[test]
    fn small_and_bright_blobs_are_filtered() {
        let finder = ObstacleFinder::new(BlobParams::default());
        // area ~300 px is under min_area
        assert!(finder.find(&scene(&[(100.0, 100.0, 10.0, 20)])).is_empty());
        // brighter than the background with a dark-blob filter
        let bright = RgbImage::from_fn(320, 240, |x, y| {
            let inside = (x as f32 - 160.0).powi(2) + (y as f32 - 120.0).powi(2) <= 1600.0;
            Rgb(if inside { [250, 250, 250] } else { [100, 100, 100] })
        });
        assert!(finder.find(&bright).is_empty());
    }

    #[test]
    fn concave_shapes_fail_convexity() {
        // an L made of two bars
        let img = RgbImage::from_fn(320, 240, |x, y| {
            let bar1 = (40..200).contains(&x) && (40..70).contains(&y);
            let bar2 = (40..70).contains(&x) && (40..200).contains(&y);
            Rgb(if bar1 || bar2 { [10, 10, 10] } else { [240, 240, 240] })
        });
        assert!(ObstacleFinder::new(BlobParams::default()).find(&img).is_empty());
    }

    #[test]
    fn boxes_stay_inside_the_frame() {
        let finder = ObstacleFinder::new(BlobParams::default());
        for b in finder.find(&scene(&[(10.0, 10.0, 40.0, 20), (300.0, 230.0, 35.0, 20)])) {
            assert!(b.within(320, 240), "{:?}", b);
        }
    }
}
