//! Rotation about a point and bilinear affine warping.

use image::{Rgb, RgbImage};

use super::Point2f;

/// 2×3 affine map `[a b c; d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [f64; 6]);

impl Affine {
    /// Counter-clockwise (as seen on screen) rotation by `angle_deg` about `center`.
    pub fn rotation(center: Point2f, angle_deg: f64) -> Self {
        let (b, a) = angle_deg.to_radians().sin_cos();
        Affine([
            a,
            b,
            (1.0 - a) * center.x - b * center.y,
            -b,
            a,
            b * center.x + (1.0 - a) * center.y,
        ])
    }

    pub fn apply(&self, p: Point2f) -> Point2f {
        let m = &self.0;
        Point2f::new(m[0] * p.x + m[1] * p.y + m[2], m[3] * p.x + m[4] * p.y + m[5])
    }

    pub fn invert(&self) -> Option<Affine> {
        let m = &self.0;
        let det = m[0] * m[4] - m[1] * m[3];
        if det.abs() < 1e-12 {
            return None;
        }
        let (a, b, d, e) = (m[4] / det, -m[1] / det, -m[3] / det, m[0] / det);
        Some(Affine([a, b, -(a * m[2] + b * m[5]), d, e, -(d * m[2] + e * m[5])]))
    }
}

fn sample(src: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let (x0, y0) = (x.floor() as i64, y.floor() as i64);
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);
    let px = |xx: i64, yy: i64| -> [f64; 3] {
        if xx < 0 || yy < 0 || xx >= w || yy >= h {
            [0.0; 3]
        } else {
            let p = src.get_pixel(xx as u32, yy as u32).0;
            [p[0] as f64, p[1] as f64, p[2] as f64]
        }
    };
    let (p00, p10, p01, p11) = (px(x0, y0), px(x0 + 1, y0), px(x0, y0 + 1), px(x0 + 1, y0 + 1));
    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// `dst(p) = src(M⁻¹ p)`, black outside the source.
pub fn warp_affine(src: &RgbImage, m: &Affine, width: u32, height: u32) -> RgbImage {
    let Some(inv) = m.invert() else {
        return RgbImage::new(width, height);
    };
    RgbImage::from_fn(width, height, |x, y| {
        let s = inv.apply(Point2f::new(x as f64, y as f64));
        sample(src, s.x, s.y)
    })
}

/// Crop of the axis-aligned `width`×`height` window centred on `center`,
/// clipped to the image. Returns the crop and its top-left corner.
pub fn crop_centered(src: &RgbImage, center: Point2f, width: f64, height: f64) -> Option<(RgbImage, (u32, u32))> {
    let x0 = (center.x - width / 2.0).round().max(0.0) as u32;
    let y0 = (center.y - height / 2.0).round().max(0.0) as u32;
    let x1 = ((center.x + width / 2.0).round().max(0.0) as u32).min(src.width());
    let y1 = ((center.y + height / 2.0).round().max(0.0) as u32).min(src.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let crop = image::imageops::crop_imm(src, x0, y0, x1 - x0, y1 - y0).to_image();
    Some((crop, (x0, y0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_round_trips() {
        let m = Affine::rotation(Point2f::new(50.0, 40.0), 30.0);
        let inv = m.invert().unwrap();
        let p = inv.apply(m.apply(Point2f::new(12.0, 77.0)));
        assert!((p.x - 12.0).abs() < 1e-9 && (p.y - 77.0).abs() < 1e-9);
        let c = m.apply(Point2f::new(50.0, 40.0));
        assert!((c.x - 50.0).abs() < 1e-9 && (c.y - 40.0).abs() < 1e-9);
    }

    #[test]
    fn quarter_turn_moves_right_to_top() {
        let m = Affine::rotation(Point2f::new(0.0, 0.0), 90.0);
        let p = m.apply(Point2f::new(1.0, 0.0));
        assert!(p.x.abs() < 1e-9 && (p.y + 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_rotation_is_identity_warp() {
        let src = RgbImage::from_fn(9, 7, |x, y| Rgb([x as u8 * 20, y as u8 * 30, 5]));
        let out = warp_affine(&src, &Affine::rotation(Point2f::new(4.0, 3.0), 0.0), 9, 7);
        assert_eq!(out, src);
    }

    #[test]
    fn crop_is_clipped() {
        let src = RgbImage::new(20, 10);
        let (crop, origin) = crop_centered(&src, Point2f::new(2.0, 5.0), 10.0, 4.0).unwrap();
        assert_eq!(origin, (0, 3));
        assert_eq!(crop.dimensions(), (7, 4));
        assert!(crop_centered(&src, Point2f::new(-30.0, 5.0), 10.0, 4.0).is_none());
    }
}
