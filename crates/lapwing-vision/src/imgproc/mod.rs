//! Pure-Rust image kernels used by the detectors.
//!
//! Everything here works on `image` buffers: 8-bit gray and RGB, 16-bit
//! depth. Borders reflect without repeating the edge pixel
//! (`dcb|abcd|cba`) unless a kernel says otherwise.

pub mod canny;
pub mod contours;
pub mod filter;
pub mod hough;
pub mod shapes;
pub mod warp;

use image::{ImageBuffer, Luma};

pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Integer pixel coordinate; signed so neighbour arithmetic never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Sub-pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2f {
    pub x: f64,
    pub y: f64,
}

impl Point2f {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point> for Point2f {
    fn from(p: Point) -> Self {
        Self::new(p.x as f64, p.y as f64)
    }
}

/// Mirror index into `0..n` without duplicating the edge sample.
#[inline]
pub(crate) fn reflect101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}
