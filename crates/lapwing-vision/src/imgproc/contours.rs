//! Connected components and their boundaries on a binary mask.
//!
//! Foreground (non-zero) components are 8-connected, background ones
//! 4-connected. A background component that does not touch the image
//! border is a hole of the foreground component directly above its first
//! pixel. Boundaries are traced with the Moore neighbourhood and stop when
//! the walk is about to repeat its first step.

use image::GrayImage;

use super::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    /// Outer boundaries of components not nested inside a hole.
    External,
    /// Every outer boundary plus its holes as children.
    TwoLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point>,
    pub is_hole: bool,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

// Clockwise from right: R, BR, B, BL, L, TL, T, TR
const DX: [i32; 8] = [1, 1, 0, -1, -1, -1, 0, 1];
const DY: [i32; 8] = [0, 1, 1, 1, 0, -1, -1, -1];

fn dir_of(dx: i32, dy: i32) -> usize {
    (0..8).find(|&d| DX[d] == dx && DY[d] == dy).unwrap_or(4)
}

/// Labels connected regions of pixels where `select` holds; 0 = unlabelled.
fn label(
    mask: &[u8],
    w: usize,
    h: usize,
    select: impl Fn(u8) -> bool,
    eight: bool,
) -> (Vec<u32>, u32) {
    let mut labels = vec![0u32; w * h];
    let mut next = 0u32;
    let mut stack = Vec::new();
    for start in 0..w * h {
        if labels[start] != 0 || !select(mask[start]) {
            continue;
        }
        next += 1;
        labels[start] = next;
        stack.push(start);
        while let Some(i) = stack.pop() {
            let (x, y) = ((i % w) as i32, (i / w) as i32);
            for d in 0..8 {
                if !eight && d % 2 == 1 {
                    continue;
                }
                let (nx, ny) = (x + DX[d], y + DY[d]);
                if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if labels[j] == 0 && select(mask[j]) {
                    labels[j] = next;
                    stack.push(j);
                }
            }
        }
    }
    (labels, next)
}

/// First pixel of each label in raster order (topmost, then leftmost).
fn first_pixels(labels: &[u32], count: u32) -> Vec<usize> {
    let mut first = vec![usize::MAX; count as usize + 1];
    for (i, &l) in labels.iter().enumerate() {
        if l != 0 && first[l as usize] == usize::MAX {
            first[l as usize] = i;
        }
    }
    first
}

fn trace(labels: &[u32], w: usize, h: usize, start: usize, target: u32) -> Vec<Point> {
    let inside = |x: i32, y: i32| {
        x >= 0 && y >= 0 && x < w as i32 && y < h as i32 && labels[y as usize * w + x as usize] == target
    };
    let s = Point::new((start % w) as i32, (start / w) as i32);
    // the left neighbour of a first-in-raster pixel is never part of it
    let (mut c, mut b) = (s, Point::new(s.x - 1, s.y));
    let mut points = vec![s];
    let mut first_step = None;
    for _ in 0..4 * w * h + 8 {
        let from = dir_of(b.x - c.x, b.y - c.y);
        let mut prev = b;
        let mut found = None;
        for i in 1..=8 {
            let d = (from + i) % 8;
            let n = Point::new(c.x + DX[d], c.y + DY[d]);
            if inside(n.x, n.y) {
                found = Some(n);
                break;
            }
            prev = n;
        }
        let Some(n) = found else { break };
        if c == s {
            match first_step {
                Some(f) if f == n => break,
                None => first_step = Some(n),
                _ => {}
            }
        }
        b = prev;
        c = n;
        if c != s {
            points.push(c);
        }
    }
    points
}

pub fn find_contours(mask: &GrayImage, mode: Retrieval) -> Vec<Contour> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let raw = mask.as_raw();
    let (fg, nfg) = label(raw, w, h, |v| v != 0, true);
    let (bg, nbg) = label(raw, w, h, |v| v == 0, false);

    let mut touches_border = vec![false; nbg as usize + 1];
    for x in 0..w {
        touches_border[bg[x] as usize] = true;
        touches_border[bg[(h - 1) * w + x] as usize] = true;
    }
    for y in 0..h {
        touches_border[bg[y * w] as usize] = true;
        touches_border[bg[y * w + w - 1] as usize] = true;
    }
    touches_border[0] = true;

    let fg_first = first_pixels(&fg, nfg);
    let bg_first = first_pixels(&bg, nbg);

    let mut out = Vec::new();
    let mut index_of = vec![usize::MAX; nfg as usize + 1];
    for l in 1..=nfg {
        let start = fg_first[l as usize];
        if mode == Retrieval::External && start % w > 0 {
            let left = bg[start - 1];
            if !touches_border[left as usize] {
                continue;
            }
        }
        index_of[l as usize] = out.len();
        out.push(Contour { points: trace(&fg, w, h, start, l), is_hole: false, parent: None, children: Vec::new() });
    }

    if mode == Retrieval::TwoLevel {
        for l in 1..=nbg {
            if touches_border[l as usize] {
                continue;
            }
            let start = bg_first[l as usize];
            // the pixel above a hole's first pixel belongs to its enclosure
            let owner = fg[start - w];
            let parent = index_of[owner as usize];
            let idx = out.len();
            out.push(Contour { points: trace(&bg, w, h, start, l), is_hole: true, parent: Some(parent), children: Vec::new() });
            out[parent].children.push(idx);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn rect_mask(w: u32, h: u32, rects: &[(u32, u32, u32, u32)]) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let on = rects.iter().any(|&(x0, y0, x1, y1)| x >= x0 && x <= x1 && y >= y0 && y <= y1);
            Luma([if on { 255 } else { 0 }])
        })
    }

    #[test]
    fn square_boundary_is_its_rim() {
        let m = rect_mask(10, 10, &[(2, 2, 5, 5)]);
        let c = find_contours(&m, Retrieval::External);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].points.len(), 12);
        assert_eq!(c[0].points[0], Point::new(2, 2));
        assert!(c[0].points.iter().all(|p| p.x == 2 || p.x == 5 || p.y == 2 || p.y == 5));
    }

    #[test]
    fn single_pixel_and_diagonal_chain() {
        let mut m = GrayImage::new(6, 6);
        m.put_pixel(1, 1, Luma([255]));
        m.put_pixel(2, 2, Luma([255]));
        m.put_pixel(3, 3, Luma([255]));
        let c = find_contours(&m, Retrieval::External);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].points.len(), 4);

        let mut m = GrayImage::new(3, 3);
        m.put_pixel(1, 1, Luma([1]));
        assert_eq!(find_contours(&m, Retrieval::External)[0].points, vec![Point::new(1, 1)]);
    }

    #[test]
    fn ring_has_one_hole() {
        let mut m = rect_mask(12, 12, &[(1, 1, 10, 10)]);
        for y in 4..=7 {
            for x in 4..=7 {
                m.put_pixel(x, y, Luma([0]));
            }
        }
        let c = find_contours(&m, Retrieval::TwoLevel);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].children, vec![1]);
        assert!(c[1].is_hole);
        assert_eq!(c[1].parent, Some(0));
    }

    #[test]
    fn external_skips_islands_inside_holes() {
        let mut m = rect_mask(20, 20, &[(1, 1, 18, 18)]);
        for y in 4..=15 {
            for x in 4..=15 {
                m.put_pixel(x, y, Luma([0]));
            }
        }
        m.put_pixel(9, 9, Luma([255]));
        assert_eq!(find_contours(&m, Retrieval::External).len(), 1);
        let two = find_contours(&m, Retrieval::TwoLevel);
        assert_eq!(two.iter().filter(|c| !c.is_hole).count(), 2);
        assert_eq!(two.iter().filter(|c| c.is_hole).count(), 1);
    }
}
