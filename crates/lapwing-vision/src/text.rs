//! Label reader: isolates the blue-bordered sign, squares it up and runs
//! OCR on the inside.

use image::{GrayImage, Luma, RgbImage};
use lapwing_proto::{BoundingBox, ObjectType, Vertex};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::{VisionError, VisionResult};
use crate::imgproc::canny::canny;
use crate::imgproc::contours::{find_contours, Contour, Retrieval};
use crate::imgproc::filter::{gaussian_blur, gaussian_blur_rgb, invert};
use crate::imgproc::shapes::{contour_area, min_area_rect};
use crate::imgproc::warp::{crop_centered, warp_affine, Affine};
use crate::imgproc::{DepthImage, Point2f};

/// Characters of the label text; a word sharing any of them is reported.
pub const TARGET: &str = "модулииртибот";
/// Anything this far away is background, millimetres.
pub const MAX_DEPTH_MM: u16 = 8000;

#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

pub trait Ocr: Send {
    fn recognize(&self, image: &RgbImage) -> VisionResult<Vec<OcrWord>>;
}

/// Runs the `tesseract` binary with the image on stdin and reads word
/// boxes back as TSV.
pub struct TesseractCli {
    pub command: String,
    pub language: String,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self { command: command.into(), language: language.into() }
    }
}

impl Ocr for TesseractCli {
    fn recognize(&self, image: &RgbImage) -> VisionResult<Vec<OcrWord>> {
        let mut png = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VisionError::detector("text", format!("spawn {}: {}", self.command, e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png)?;
        }
        let out = child.wait_with_output()?;
        if !out.status.success() {
            let err = String::from_utf8_lossy(&out.stderr);
            return Err(VisionError::detector("text", format!("{} exited with {}: {}", self.command, out.status, err.trim())));
        }
        Ok(parse_tsv(&String::from_utf8_lossy(&out.stdout)))
    }
}

/// Word rows (level 5) with non-empty text.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            Some(OcrWord {
                text: text.to_string(),
                left: cols[6].parse().ok()?,
                top: cols[7].parse().ok()?,
                width: cols[8].parse().ok()?,
                height: cols[9].parse().ok()?,
            })
        })
        .collect()
}

pub fn is_target_word(word: &str) -> bool {
    word.to_lowercase().chars().any(|c| TARGET.contains(c))
}

/// Pixels that are strongly blue and closer than `MAX_DEPTH_MM`.
pub fn blue_mask(color: &RgbImage, depth: &DepthImage) -> GrayImage {
    let blurred = gaussian_blur_rgb(color, 5);
    GrayImage::from_fn(color.width(), color.height(), |x, y| {
        let [r, g, b] = blurred.get_pixel(x, y).0;
        let (r, g, b) = (r as i32, g as i32, b as i32);
        let far = depth.get_pixel_checked(x, y).is_some_and(|d| d.0[0] >= MAX_DEPTH_MM);
        Luma([if b - r > 120 && b - g > 20 && !far { 255 } else { 0 }])
    })
}

/// Largest outline that encloses a hole, i.e. both sides of a border.
pub fn sign_outline(mask: &GrayImage) -> Option<Contour> {
    let edges = gaussian_blur(&canny(&invert(mask), 250.0, 255.0), 5);
    find_contours(&edges, Retrieval::TwoLevel)
        .into_iter()
        .filter(|c| !c.is_hole && !c.children.is_empty())
        .max_by(|a, b| contour_area(&a.points).total_cmp(&contour_area(&b.points)))
}

pub struct TextDetector {
    ocr: Box<dyn Ocr>,
}

impl TextDetector {
    pub fn new(ocr: Box<dyn Ocr>) -> Self {
        Self { ocr }
    }

    pub fn detect(&self, color: &RgbImage, depth: &DepthImage) -> VisionResult<Vec<BoundingBox>> {
        let (w, h) = color.dimensions();
        let Some(outline) = sign_outline(&blue_mask(color, depth)) else {
            return Ok(Vec::new());
        };
        let pts: Vec<Point2f> = outline.points.iter().map(|&p| p.into()).collect();
        let Some(rect) = min_area_rect(&pts).map(|r| r.upright()) else {
            return Ok(Vec::new());
        };

        let m = Affine::rotation(Point2f::new(w as f64 / 2.0, h as f64 / 2.0), rect.angle);
        let back = m.invert().ok_or_else(|| VisionError::detector("text", "singular rotation"))?;
        let rotated = warp_affine(color, &m, w, h);
        let Some((crop, (ox, oy))) = crop_centered(&rotated, m.apply(rect.center), rect.width, rect.height) else {
            return Ok(Vec::new());
        };
        debug!("text: sign {:.0}x{:.0} at {:.1} deg", rect.width, rect.height, rect.angle);

        let words = self.ocr.recognize(&crop)?;
        let (xm, ym) = ((w.max(1) - 1) as f64, (h.max(1) - 1) as f64);
        let boxes = words
            .iter()
            .filter(|word| is_target_word(&word.text))
            .filter_map(|word| {
                let (l, t) = ((ox + word.left) as f64, (oy + word.top) as f64);
                let (r, b) = (l + word.width as f64, t + word.height as f64);
                let vertices = [(l, t), (r, t), (r, b), (l, b)]
                    .iter()
                    .map(|&(x, y)| {
                        let p = back.apply(Point2f::new(x, y));
                        Vertex::new(p.x.clamp(0.0, xm) as f32, p.y.clamp(0.0, ym) as f32)
                    })
                    .collect();
                BoundingBox::new(vertices, ObjectType::Text)
            })
            .collect::<Vec<_>>();
        debug!("text: {} of {} words kept", boxes.len(), words.len());
        Ok(boxes)
    }
}
