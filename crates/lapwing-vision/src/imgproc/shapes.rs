//! Polygon measures, convex hull, minimum-area rectangle and
//! Douglas–Peucker simplification.

use super::{Point, Point2f};

/// Signed-free shoelace area of a closed polygon.
pub fn contour_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    area.unsigned_abs() as f64 * 0.5
}

pub fn arc_length(points: &[Point], closed: bool) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut len: f64 = points
        .windows(2)
        .map(|w| ((w[1].x - w[0].x) as f64).hypot((w[1].y - w[0].y) as f64))
        .sum();
    if closed {
        let (a, b) = (points[0], points[points.len() - 1]);
        len += ((a.x - b.x) as f64).hypot((a.y - b.y) as f64);
    }
    len
}

fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let mag = dx.hypot(dy);
    if mag < 1e-9 {
        return ((p.x - a.x) as f64).hypot((p.y - a.y) as f64);
    }
    (dy * p.x as f64 - dx * p.y as f64 + b.x as f64 * a.y as f64 - b.y as f64 * a.x as f64).abs() / mag
}

fn douglas_peucker(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end - start < 2 {
            continue;
        }
        let mut dmax = 0.0;
        let mut index = start;
        for i in start + 1..end {
            let d = perpendicular_distance(points[i], points[start], points[end]);
            if d > dmax {
                index = i;
                dmax = d;
            }
        }
        if dmax > epsilon {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }
    points.iter().zip(keep).filter(|(_, k)| *k).map(|(p, _)| *p).collect()
}

/// Douglas–Peucker with tolerance `epsilon`. Closed curves are split at
/// the point farthest from the first one and each half simplified.
pub fn approx_poly_dp(points: &[Point], epsilon: f64, closed: bool) -> Vec<Point> {
    if !closed || points.len() < 3 {
        return douglas_peucker(points, epsilon);
    }
    let p0 = points[0];
    let (far, _) = points.iter().enumerate().fold((0, -1i64), |best, (i, p)| {
        let d = (p.x - p0.x) as i64 * (p.x - p0.x) as i64 + (p.y - p0.y) as i64 * (p.y - p0.y) as i64;
        if d > best.1 {
            (i, d)
        } else {
            best
        }
    });
    if far == 0 {
        return vec![p0];
    }
    let mut first = douglas_peucker(&points[..=far], epsilon);
    let mut tail: Vec<Point> = points[far..].to_vec();
    tail.push(p0);
    let second = douglas_peucker(&tail, epsilon);
    first.pop();
    first.extend_from_slice(&second[..second.len() - 1]);
    first
}

fn cross(o: Point2f, a: Point2f, b: Point2f) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Monotone-chain hull, counter-clockwise in a y-up frame, no repeated
/// first point.
pub fn convex_hull(points: &[Point2f]) -> Vec<Point2f> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let mut hull: Vec<Point2f> = Vec::with_capacity(pts.len() * 2);
    for pass in 0..2 {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &Point2f>> =
            if pass == 0 { Box::new(pts.iter()) } else { Box::new(pts.iter().rev()) };
        for &p in iter {
            while hull.len() >= start + 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
    }
    hull
}

/// Rotated rectangle with the classic angle convention: `angle` lies in
/// `[-90, 0)` degrees and is the direction of the `width` side; an
/// axis-aligned box reports `-90` with width and height swapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: Point2f,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedRect {
    /// Corners, starting from the one that `-width/2, +height/2` maps to.
    pub fn corners(&self) -> [Point2f; 4] {
        let (s, c) = self.angle.to_radians().sin_cos();
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let at = |u: f64, v: f64| Point2f::new(self.center.x + u * c - v * s, self.center.y + u * s + v * c);
        [at(-hw, hh), at(-hw, -hh), at(hw, -hh), at(hw, hh)]
    }

    /// Same rectangle with the angle folded into `[-45, 45)`, swapping the
    /// sides when it turns by a quarter.
    pub fn upright(&self) -> RotatedRect {
        if self.angle < -45.0 {
            RotatedRect { angle: self.angle + 90.0, width: self.height, height: self.width, ..*self }
        } else {
            *self
        }
    }
}

/// Rotating calipers over the hull edges.
pub fn min_area_rect(points: &[Point2f]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    match hull.len() {
        0 => return None,
        1 => return Some(RotatedRect { center: hull[0], width: 0.0, height: 0.0, angle: -90.0 }),
        _ => {}
    }

    let mut best: Option<(f64, f64, f64, f64, Point2f)> = None;
    for i in 0..hull.len() {
        let (a, b) = (hull[i], hull[(i + 1) % hull.len()]);
        let len = (b.x - a.x).hypot(b.y - a.y);
        if len < 1e-12 {
            continue;
        }
        let (ux, uy) = ((b.x - a.x) / len, (b.y - a.y) / len);
        let (mut u0, mut u1, mut v0, mut v1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for p in &hull {
            let u = p.x * ux + p.y * uy;
            let v = -p.x * uy + p.y * ux;
            u0 = u0.min(u);
            u1 = u1.max(u);
            v0 = v0.min(v);
            v1 = v1.max(v);
        }
        let area = (u1 - u0) * (v1 - v0);
        if best.map_or(true, |(best_area, ..)| area < best_area - 1e-9) {
            let (um, vm) = ((u0 + u1) / 2.0, (v0 + v1) / 2.0);
            let center = Point2f::new(um * ux - vm * uy, um * uy + vm * ux);
            best = Some((area, uy.atan2(ux).to_degrees(), u1 - u0, v1 - v0, center));
        }
    }
    let (_, theta, along, across, center) = best?;

    // angle = theta - 90·quarters, in [-90, 0)
    let mut quarters = (theta / 90.0).floor() as i64 + 1;
    let mut angle = theta - 90.0 * quarters as f64;
    if angle >= 0.0 {
        angle -= 90.0;
        quarters += 1;
    } else if angle < -90.0 {
        angle += 90.0;
        quarters -= 1;
    }
    let (width, height) = if quarters % 2 == 0 { (along, across) } else { (across, along) };
    Some(RotatedRect { center, width, height, angle })
}
