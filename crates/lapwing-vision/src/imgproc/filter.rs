//! Color conversion, separable Gaussian smoothing and the 3×3 Laplacian.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

use super::reflect101;

/// Luma with the BT.601 weights, rounded.
pub fn to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let mut out = GrayImage::new(w, h);
    for (dst, src) in out.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = src.0;
        let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        dst.0[0] = y.round().clamp(0.0, 255.0) as u8;
    }
    out
}

const SMALL_GAUSSIAN: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// Normalized taps of a `ksize`-long Gaussian. Sizes up to 7 use the binomial
/// tables; larger ones derive sigma as `0.3·((k−1)/2 − 1) + 0.8`.
pub fn gaussian_taps(ksize: usize) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    if ksize <= 7 {
        return SMALL_GAUSSIAN[ksize / 2].to_vec();
    }
    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (ksize / 2) as f64;
    let mut taps: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    taps.into_iter().map(|t| t as f32).collect()
}

/// Separable convolution over interleaved 8-bit channels.
fn separable_u8(src: &[u8], w: usize, h: usize, ch: usize, taps: &[f32]) -> Vec<u8> {
    let half = (taps.len() / 2) as isize;
    let mut tmp = vec![0f32; src.len()];
    for y in 0..h {
        let row = &src[y * w * ch..(y + 1) * w * ch];
        let out = &mut tmp[y * w * ch..(y + 1) * w * ch];
        for x in 0..w {
            for c in 0..ch {
                let mut acc = 0.0;
                for (k, t) in taps.iter().enumerate() {
                    let xx = reflect101(x as isize + k as isize - half, w);
                    acc += t * row[xx * ch + c] as f32;
                }
                out[x * ch + c] = acc;
            }
        }
    }

    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        let rows: Vec<usize> = (0..taps.len())
            .map(|k| reflect101(y as isize + k as isize - half, h))
            .collect();
        for i in 0..w * ch {
            let mut acc = 0.0;
            for (k, t) in taps.iter().enumerate() {
                acc += t * tmp[rows[k] * w * ch + i];
            }
            out[y * w * ch + i] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

pub fn gaussian_blur(gray: &GrayImage, ksize: usize) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let data = separable_u8(gray.as_raw(), w as usize, h as usize, 1, &gaussian_taps(ksize));
    ImageBuffer::<Luma<u8>, _>::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
}

pub fn gaussian_blur_rgb(rgb: &RgbImage, ksize: usize) -> RgbImage {
    let (w, h) = rgb.dimensions();
    if w == 0 || h == 0 {
        return rgb.clone();
    }
    let data = separable_u8(rgb.as_raw(), w as usize, h as usize, 3, &gaussian_taps(ksize));
    ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data).unwrap_or_else(|| RgbImage::new(w, h))
}

/// |∇²| with the 3×3 aperture `[[2,0,2],[0,−8,0],[2,0,2]]`, saturated to 8 bits.
pub fn laplacian_abs(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let mut out = GrayImage::new(w, h);
    if wu == 0 || hu == 0 {
        return out;
    }
    let src = gray.as_raw();
    let px = |x: isize, y: isize| src[reflect101(y, hu) * wu + reflect101(x, wu)] as i32;
    for y in 0..hu as isize {
        for x in 0..wu as isize {
            let v = 2 * (px(x - 1, y - 1) + px(x + 1, y - 1) + px(x - 1, y + 1) + px(x + 1, y + 1))
                - 8 * px(x, y);
            out.put_pixel(x as u32, y as u32, Luma([v.unsigned_abs().min(255) as u8]));
        }
    }
    out
}

/// Bitwise inverse of an 8-bit mask.
pub fn invert(gray: &GrayImage) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taps_match_known_kernels() {
        let t = gaussian_taps(3);
        assert!((t[0] - 0.25).abs() < 1e-6 && (t[1] - 0.5).abs() < 1e-6);
        let t = gaussian_taps(9);
        assert_eq!(t.len(), 9);
        assert!((t.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(t[4] > t[3] && t[3] > t[0]);
    }

    #[test]
    fn blur_keeps_flat_images_flat() {
        let img = GrayImage::from_pixel(17, 9, Luma([77]));
        let out = gaussian_blur(&img, 9);
        assert!(out.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn gray_weights() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(to_gray(&img).get_pixel(0, 0).0[0], 76);
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        assert_eq!(to_gray(&img).get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn laplacian_fires_on_a_spot() {
        let mut img = GrayImage::new(5, 5);
        img.put_pixel(2, 2, Luma([10]));
        let out = laplacian_abs(&img);
        assert_eq!(out.get_pixel(2, 2).0[0], 80);
        assert_eq!(out.get_pixel(1, 1).0[0], 20);
        assert_eq!(out.get_pixel(2, 1).0[0], 0);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }
}
