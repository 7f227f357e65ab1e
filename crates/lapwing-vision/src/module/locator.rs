//! Finds the centre of the four-hole module face.
//!
//! Holes show up as circles in the Laplacian of the blurred gray image.
//! Circles close enough to be on the module (by depth) are paired up; the
//! hole pattern is the set of circles whose pairwise directions agree, so
//! the slopes are histogrammed and the fullest bucket wins.

use image::{GrayImage, RgbImage};
use tracing::debug;

use crate::imgproc::filter::{gaussian_blur, laplacian_abs, to_gray};
use crate::imgproc::hough::{hough_circles, Circle, HoughParams};
use crate::imgproc::DepthImage;

/// Farthest a hole centre may be, millimetres.
pub const DEPTH_THRESH_MM: u16 = 1000;
/// Circle counts above this are clutter, not a module.
pub const MAX_CIRCLES: usize = 100;
pub const MIN_HOLES: usize = 4;

pub const HOUGH: HoughParams =
    HoughParams { min_dist: 14.0, param1: 63.0, param2: 30, min_radius: 0, max_radius: 50 };

#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub x: u32,
    pub y: u32,
    pub holes: Vec<Circle>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    InFrame(Located),
    /// Not enough circles at module range.
    TooFew(usize),
    /// More circles than any module could produce.
    Clutter(usize),
    /// Circles found but no bucket yielded four holes.
    NoPattern { holes: usize },
}

impl Outcome {
    pub fn center(&self) -> Option<(u32, u32)> {
        match self {
            Outcome::InFrame(l) => Some((l.x, l.y)),
            _ => None,
        }
    }

    pub fn in_frame(&self) -> bool {
        matches!(self, Outcome::InFrame(_))
    }
}

/// Circle candidates on the color frame, before any depth check.
pub fn detect_circles(color: &RgbImage) -> Vec<Circle> {
    let gray: GrayImage = to_gray(color);
    let lap = laplacian_abs(&gaussian_blur(&gray, 9));
    hough_circles(&lap, &HOUGH)
}

fn depth_at(depth: &DepthImage, x: f32, y: f32) -> Option<u16> {
    let (xi, yi) = (x.round(), y.round());
    if xi < 0.0 || yi < 0.0 || xi >= depth.width() as f32 || yi >= depth.height() as f32 {
        return None;
    }
    Some(depth.get_pixel(xi as u32, yi as u32).0[0])
}

pub fn locate(color: &RgbImage, depth: &DepthImage) -> Outcome {
    let circles = detect_circles(color);
    let near: Vec<Circle> = circles
        .into_iter()
        .filter(|c| matches!(depth_at(depth, c.x, c.y), Some(d) if d > 0 && d <= DEPTH_THRESH_MM))
        .collect();
    debug!("module: {} circles at range", near.len());
    if near.len() < MIN_HOLES {
        return Outcome::TooFew(near.len());
    }
    if near.len() > MAX_CIRCLES {
        return Outcome::Clutter(near.len());
    }

    let holes = dominant_parallel(&near);
    if holes.len() < MIN_HOLES {
        return Outcome::NoPattern { holes: holes.len() };
    }
    let n = holes.len() as f64;
    let mx = holes.iter().map(|c| c.x as f64).sum::<f64>() / n;
    let my = holes.iter().map(|c| c.y as f64).sum::<f64>() / n;
    let (x, y) = (mx.round() as u32, my.round() as u32);
    // the mean of in-image circles is in the image; the depth there is not
    // guaranteed
    match depth_at(depth, x as f32, y as f32) {
        Some(d) if d > 0 && d <= DEPTH_THRESH_MM => Outcome::InFrame(Located { x, y, holes }),
        _ => Outcome::NoPattern { holes: holes.len() },
    }
}

/// Pairwise direction of every unordered pair, in degrees. Vertical pairs
/// and coincident centres have no finite slope and are skipped.
pub fn pair_slopes(circles: &[Circle]) -> Vec<(f64, usize, usize)> {
    let mut out = Vec::new();
    for i in 0..circles.len() {
        for j in i + 1..circles.len() {
            let dx = (circles[j].x - circles[i].x) as f64;
            let dy = (circles[j].y - circles[i].y) as f64;
            if dx == 0.0 {
                continue;
            }
            out.push(((dy / dx).atan().to_degrees(), i, j));
        }
    }
    out
}

/// Circles contributing to the fullest slope bucket, deduplicated, in
/// input order.
pub fn dominant_parallel(circles: &[Circle]) -> Vec<Circle> {
    let slopes = pair_slopes(circles);
    let Some(bucket) = fullest_bucket(slopes.iter().map(|s| s.0)) else {
        return Vec::new();
    };
    let mut member = vec![false; circles.len()];
    for (k, &(_, i, j)) in slopes.iter().enumerate() {
        if bucket[k] {
            member[i] = true;
            member[j] = true;
        }
    }
    circles.iter().zip(member).filter(|(_, m)| *m).map(|(c, _)| *c).collect()
}

/// Marks the values falling in the most populated of `⌈(max − min)/2⌉`
/// equal-width buckets; the first such bucket wins ties.
fn fullest_bucket(values: impl Iterator<Item = f64>) -> Option<Vec<bool>> {
    let values: Vec<f64> = values.collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return None;
    }
    let n = ((0.5 * (max - min)).ceil() as usize).max(1);
    let width = (max - min) / n as f64;
    let index = |v: f64| {
        if width <= 0.0 {
            0
        } else {
            (((v - min) / width).floor() as usize).min(n - 1)
        }
    };
    let mut counts = vec![0usize; n];
    for &v in &values {
        counts[index(v)] += 1;
    }
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    debug!("module: dominant slope bucket {} of {} ({} pairs)", best, n, counts[best]);
    Some(values.iter().map(|&v| index(v) == best).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f32, y: f32) -> Circle {
        Circle { x, y, radius: 10.0, votes: 50 }
    }

    #[test]
    fn square_pattern_votes_for_horizontal_pairs() {
        let circles = [c(200.0, 200.0), c(400.0, 200.0), c(200.0, 400.0), c(400.0, 400.0)];
        let slopes = pair_slopes(&circles);
        assert_eq!(slopes.len(), 4);
        assert_eq!(dominant_parallel(&circles).len(), 4);
    }

    #[test]
    fn stray_circle_is_left_out() {
        let circles = [
            c(100.0, 100.0),
            c(300.0, 102.0),
            c(100.0, 300.0),
            c(300.0, 302.0),
            c(620.0, 40.0),
        ];
        let holes = dominant_parallel(&circles);
        assert_eq!(holes.len(), 4, "{:?}", holes);
        assert!(holes.iter().all(|h| h.x < 600.0));
    }

    #[test]
    fn single_slope_fills_one_bucket() {
        let marks = fullest_bucket([3.0, 3.0].into_iter()).unwrap();
        assert_eq!(marks, vec![true, true]);
        assert!(fullest_bucket(std::iter::empty()).is_none());
    }
}
