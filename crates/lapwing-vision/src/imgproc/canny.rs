//! Sobel gradients and Canny edge detection.
//!
//! Magnitude is the L1 norm `|gx| + |gy|`; thresholds are compared against
//! that, so `canny(img, 250.0, 255.0)` behaves the way the classic 8-bit
//! detector does with the same numbers. Output is a 0/255 mask.

use image::{GrayImage, Luma};

use super::reflect101;

/// Integer 3×3 Sobel derivatives, row-major.
#[derive(Clone, Debug)]
pub struct Gradients {
    pub width: usize,
    pub height: usize,
    pub gx: Vec<i32>,
    pub gy: Vec<i32>,
}

impl Gradients {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> (i32, i32) {
        let i = y * self.width + x;
        (self.gx[i], self.gy[i])
    }
}

pub fn sobel(gray: &GrayImage) -> Gradients {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let mut gx = vec![0i32; w * h];
    let mut gy = vec![0i32; w * h];
    if w == 0 || h == 0 {
        return Gradients { width: w, height: h, gx, gy };
    }
    let src = gray.as_raw();
    for y in 0..h {
        let ys = [reflect101(y as isize - 1, h), y, reflect101(y as isize + 1, h)];
        for x in 0..w {
            let xs = [reflect101(x as isize - 1, w), x, reflect101(x as isize + 1, w)];
            let p = |r: usize, c: usize| src[ys[r] * w + xs[c]] as i32;
            gx[y * w + x] = (p(0, 2) + 2 * p(1, 2) + p(2, 2)) - (p(0, 0) + 2 * p(1, 0) + p(2, 0));
            gy[y * w + x] = (p(2, 0) + 2 * p(2, 1) + p(2, 2)) - (p(0, 0) + 2 * p(0, 1) + p(0, 2));
        }
    }
    Gradients { width: w, height: h, gx, gy }
}

/// tan(22.5°) and tan(67.5°) for the four-way direction split.
const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

pub fn canny(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let grad = sobel(gray);
    let (w, h) = (grad.width, grad.height);
    let mut out = GrayImage::new(w as u32, h as u32);
    if w == 0 || h == 0 {
        return out;
    }

    let mag: Vec<f32> = grad
        .gx
        .iter()
        .zip(&grad.gy)
        .map(|(x, y)| (x.abs() + y.abs()) as f32)
        .collect();
    let m = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut class = vec![0u8; w * h];
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let v = mag[i];
            if v <= low {
                continue;
            }
            let (gx, gy) = grad.at(x, y);
            let (ax, ay) = (gx.abs() as f32, gy.abs() as f32);
            let (xi, yi) = (x as isize, y as isize);
            let keep = if ay < ax * TAN_22_5 {
                v > m(xi - 1, yi) && v >= m(xi + 1, yi)
            } else if ay > ax * TAN_67_5 {
                v > m(xi, yi - 1) && v >= m(xi, yi + 1)
            } else if (gx > 0) == (gy > 0) {
                v > m(xi - 1, yi - 1) && v > m(xi + 1, yi + 1)
            } else {
                v > m(xi + 1, yi - 1) && v > m(xi - 1, yi + 1)
            };
            if !keep {
                continue;
            }
            if v > high {
                class[i] = 2;
                stack.push(i);
            } else {
                class[i] = 1;
            }
        }
    }

    // hysteresis: grow strong edges through weak neighbours
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if class[j] == 1 {
                    class[j] = 2;
                    stack.push(j);
                }
            }
        }
    }

    for (p, c) in out.pixels_mut().zip(&class) {
        if *c == 2 {
            *p = Luma([255]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(w: u32, h: u32, at: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([if x < at { 0 } else { 200 }]))
    }

    #[test]
    fn sobel_sign_follows_intensity() {
        let g = sobel(&step(8, 4, 4));
        let (gx, gy) = g.at(4, 2);
        assert!(gx > 0);
        assert_eq!(gy, 0);
    }

    #[test]
    fn vertical_step_gives_one_thin_line() {
        let edges = canny(&step(20, 10, 10), 100.0, 200.0);
        for y in 1..9 {
            let row: Vec<u32> = (0..20).filter(|&x| edges.get_pixel(x, y).0[0] == 255).collect();
            assert_eq!(row.len(), 1, "row {}: {:?}", y, row);
            assert!(row[0] == 9 || row[0] == 10);
        }
    }

    #[test]
    fn flat_image_has_no_edges() {
        let img = GrayImage::from_pixel(12, 12, Luma([90]));
        assert!(canny(&img, 10.0, 20.0).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn weak_edges_need_a_strong_anchor() {
        // contrast 30 -> magnitude 120: above low, below high
        let img = GrayImage::from_fn(16, 8, |x, _| Luma([if x < 8 { 100 } else { 130 }]));
        assert!(canny(&img, 50.0, 200.0).pixels().all(|p| p.0[0] == 0));
        assert!(canny(&img, 50.0, 100.0).pixels().any(|p| p.0[0] == 255));
    }
}
