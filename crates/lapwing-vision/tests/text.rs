use image::{Luma, Rgb, RgbImage};
use lapwing_proto::ObjectType;
use lapwing_vision::imgproc::DepthImage;
use lapwing_vision::text::{Ocr, OcrWord, TextDetector};
use lapwing_vision::VisionResult;
use std::sync::{Arc, Mutex};

/// Returns canned words and remembers the size of the crop it was shown.
struct ScriptedOcr {
    words: Vec<OcrWord>,
    seen: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl Ocr for ScriptedOcr {
    fn recognize(&self, image: &RgbImage) -> VisionResult<Vec<OcrWord>> {
        self.seen.lock().unwrap().push(image.dimensions());
        Ok(self.words.clone())
    }
}

fn word(text: &str, left: u32, top: u32, width: u32, height: u32) -> OcrWord {
    OcrWord { text: text.into(), left, top, width, height }
}

/// Blue rectangular frame, 240×140 outside, 14 px thick, tilted by `deg`.
fn sign(deg: f64) -> RgbImage {
    let (s, c) = deg.to_radians().sin_cos();
    RgbImage::from_fn(400, 300, |x, y| {
        let (dx, dy) = (x as f64 - 200.0, y as f64 - 150.0);
        let (u, v) = (dx * c + dy * s, -dx * s + dy * c);
        let outside = u.abs() <= 120.0 && v.abs() <= 70.0;
        let inside = u.abs() <= 106.0 && v.abs() <= 56.0;
        Rgb(if outside && !inside { [20, 60, 230] } else { [250, 250, 250] })
    })
}

fn detector(words: Vec<OcrWord>) -> (TextDetector, Arc<Mutex<Vec<(u32, u32)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    (TextDetector::new(Box::new(ScriptedOcr { words, seen: seen.clone() })), seen)
}

#[test]
fn label_words_are_boxed_inside_the_image() {
    let (det, seen) = detector(vec![
        word("МОДУЛЬ", 20, 40, 90, 30),
        word("XYZ", 130, 40, 40, 30),
        word("робот", 0, 0, 5000, 5000),
    ]);
    let depth = DepthImage::from_pixel(400, 300, Luma([1500]));

    let boxes = det.detect(&sign(10.0), &depth).unwrap();

    assert_eq!(boxes.len(), 2);
    for b in &boxes {
        assert_eq!(b.object_type, ObjectType::Text);
        assert_eq!(b.vertices().len(), 4);
        assert!(b.within(400, 300), "{:?}", b);
    }
    let crops = seen.lock().unwrap();
    assert_eq!(crops.len(), 1);
    let (w, h) = crops[0];
    assert!((230..=260).contains(&w) && (130..=160).contains(&h), "crop {}x{}", w, h);
}

#[test]
fn no_sign_no_ocr() {
    let (det, seen) = detector(vec![word("модуль", 0, 0, 10, 10)]);
    let blank = RgbImage::from_pixel(200, 100, Rgb([250, 250, 250]));
    let depth = DepthImage::from_pixel(200, 100, Luma([1000]));
    assert!(det.detect(&blank, &depth).unwrap().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn sign_beyond_eight_metres_is_ignored() {
    let (det, seen) = detector(vec![word("модуль", 0, 0, 10, 10)]);
    let depth = DepthImage::from_pixel(400, 300, Luma([9000]));
    assert!(det.detect(&sign(0.0), &depth).unwrap().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}
