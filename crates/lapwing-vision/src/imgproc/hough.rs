//! Circle detection by the Hough gradient method.
//!
//! Edge pixels vote for centres along their gradient direction (both
//! ways) for every radius in range. Accumulator peaks above `param2` are
//! taken strongest first, rejecting any closer than `min_dist` to one
//! already accepted. The radius of each survivor is the most common
//! edge distance around it.

use image::GrayImage;

use super::canny::{canny, sobel};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    pub min_dist: f32,
    /// Upper Canny threshold; the lower one is half of it.
    pub param1: f32,
    /// Accumulator threshold for centres.
    pub param2: u32,
    pub min_radius: u32,
    pub max_radius: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub votes: u32,
}

pub fn hough_circles(gray: &GrayImage, p: &HoughParams) -> Vec<Circle> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w < 3 || h < 3 || p.max_radius == 0 {
        return Vec::new();
    }
    let edges = canny(gray, (p.param1 / 2.0).max(1.0), p.param1);
    let grad = sobel(gray);
    let r_lo = p.min_radius.max(1);
    let r_hi = p.max_radius.max(r_lo);

    let mut points = Vec::new();
    let mut acc = vec![0u32; w * h];
    for y in 0..h {
        for x in 0..w {
            if edges.as_raw()[y * w + x] == 0 {
                continue;
            }
            let (gx, gy) = grad.at(x, y);
            let norm = ((gx * gx + gy * gy) as f32).sqrt();
            if norm == 0.0 {
                continue;
            }
            points.push((x as f32, y as f32));
            let (vx, vy) = (gx as f32 / norm, gy as f32 / norm);
            for sign in [1.0f32, -1.0] {
                for r in r_lo..=r_hi {
                    let cx = (x as f32 + sign * r as f32 * vx).round();
                    let cy = (y as f32 + sign * r as f32 * vy).round();
                    if cx < 0.0 || cy < 0.0 || cx >= w as f32 || cy >= h as f32 {
                        break;
                    }
                    acc[cy as usize * w + cx as usize] += 1;
                }
            }
        }
    }

    let mut centres = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let v = acc[i];
            if v > p.param2 && v > acc[i - 1] && v >= acc[i + 1] && v > acc[i - w] && v >= acc[i + w] {
                centres.push((v, x, y));
            }
        }
    }
    // strongest first, ties in raster order
    centres.sort_by(|a, b| b.0.cmp(&a.0).then((a.2, a.1).cmp(&(b.2, b.1))));

    let grid = PointGrid::new(&points, w, h, r_hi as usize + 1);
    let min_d2 = p.min_dist * p.min_dist;
    let mut out: Vec<Circle> = Vec::new();
    for (votes, x, y) in centres {
        let (cx, cy) = (x as f32, y as f32);
        if out.iter().any(|c| (c.x - cx).powi(2) + (c.y - cy).powi(2) < min_d2) {
            continue;
        }
        if let Some(radius) = estimate_radius(grid.near(x, y), cx, cy, r_lo, r_hi) {
            out.push(Circle { x: cx, y: cy, radius, votes });
        }
    }
    out
}

/// Edge points bucketed into square cells at least one radius wide.
struct PointGrid<'a> {
    points: &'a [(f32, f32)],
    cells: Vec<Vec<usize>>,
    cols: usize,
    rows: usize,
    cell: usize,
}

impl<'a> PointGrid<'a> {
    fn new(points: &'a [(f32, f32)], w: usize, h: usize, cell: usize) -> Self {
        let (cols, rows) = (w.div_ceil(cell), h.div_ceil(cell));
        let mut cells = vec![Vec::new(); cols * rows];
        for (i, &(x, y)) in points.iter().enumerate() {
            cells[(y as usize / cell) * cols + x as usize / cell].push(i);
        }
        Self { points, cells, cols, rows, cell }
    }

    /// Points in the 3×3 block of cells around `(x, y)`.
    fn near(&self, x: usize, y: usize) -> impl Iterator<Item = (f32, f32)> + '_ {
        let (cx, cy) = (x / self.cell, y / self.cell);
        let xs = cx.saturating_sub(1)..=(cx + 1).min(self.cols - 1);
        let ys = cy.saturating_sub(1)..=(cy + 1).min(self.rows - 1);
        ys.flat_map(move |row| xs.clone().map(move |col| row * self.cols + col))
            .flat_map(move |c| self.cells[c].iter().map(move |&i| self.points[i]))
    }
}

/// Most populated integer distance from the centre to an edge point,
/// smoothed over its neighbours.
fn estimate_radius(points: impl Iterator<Item = (f32, f32)>, cx: f32, cy: f32, r_lo: u32, r_hi: u32) -> Option<f32> {
    let mut hist = vec![0u32; r_hi as usize + 2];
    let lim = r_hi as f32 + 0.5;
    for (x, y) in points {
        let (dx, dy) = (x - cx, y - cy);
        if dx.abs() > lim || dy.abs() > lim {
            continue;
        }
        let d = (dx * dx + dy * dy).sqrt().round() as u32;
        if d >= r_lo && d <= r_hi {
            hist[d as usize] += 1;
        }
    }
    let mut best = None;
    let mut best_count = 0;
    for r in r_lo as usize..=r_hi as usize {
        let count = hist[r - 1] + hist[r] + hist[r + 1];
        if count > best_count {
            best_count = count;
            best = Some(r as f32);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imgproc::filter::{gaussian_blur, laplacian_abs};
    use image::Luma;

    fn disks(w: u32, h: u32, centres: &[(f32, f32, f32)]) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let inside = centres
                .iter()
                .any(|&(cx, cy, r)| (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2) <= r * r);
            Luma([if inside { 0 } else { 255 }])
        })
    }

    fn params() -> HoughParams {
        HoughParams { min_dist: 14.0, param1: 63.0, param2: 30, min_radius: 0, max_radius: 50 }
    }

    #[test]
    fn finds_a_single_disk() {
        let img = disks(120, 120, &[(60.0, 60.0, 20.0)]);
        let lap = laplacian_abs(&gaussian_blur(&img, 9));
        let found = hough_circles(&lap, &params());
        let c = found[0];
        assert!((c.x - 60.0).abs() <= 1.0 && (c.y - 60.0).abs() <= 1.0, "{:?}", c);
        assert!(c.radius > 12.0 && c.radius < 28.0, "{:?}", c);
    }

    #[test]
    fn blank_image_has_no_circles() {
        let img = GrayImage::from_pixel(64, 64, Luma([255]));
        assert!(hough_circles(&img, &params()).is_empty());
    }

    #[test]
    fn min_dist_separates_accepted_centres() {
        let img = disks(200, 120, &[(60.0, 60.0, 20.0), (140.0, 60.0, 20.0)]);
        let lap = laplacian_abs(&gaussian_blur(&img, 9));
        let near = hough_circles(&lap, &params());
        for target in [60.0, 140.0] {
            assert!(near.iter().any(|c| (c.x - target).abs() <= 1.0 && (c.y - 60.0).abs() <= 1.0), "{:?}", near);
        }
        let wide = hough_circles(&lap, &HoughParams { min_dist: 100.0, ..params() });
        assert!(!wide.is_empty());
        for (i, a) in wide.iter().enumerate() {
            for b in &wide[i + 1..] {
                assert!((a.x - b.x).hypot(a.y - b.y) >= 100.0);
            }
        }
    }
}
