use image::{Luma, Rgb, RgbImage};
use lapwing_vision::imgproc::DepthImage;
use lapwing_vision::module::locator::{locate, Outcome};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const MODULE: [(f32, f32); 4] = [(200.0, 200.0), (400.0, 200.0), (200.0, 400.0), (400.0, 400.0)];

fn draw(w: u32, h: u32, disks: &[(f32, f32, f32)]) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as f32, y as f32);
        let dark = disks.iter().any(|&(cx, cy, r)| (x - cx).powi(2) + (y - cy).powi(2) <= r * r);
        Rgb(if dark { [0, 0, 0] } else { [255, 255, 255] })
    })
}

fn module_disks() -> Vec<(f32, f32, f32)> {
    MODULE.iter().map(|&(x, y)| (x, y, 20.0)).collect()
}

#[test]
fn module_in_frame() {
    let color = draw(800, 800, &module_disks());
    let depth = DepthImage::from_pixel(800, 800, Luma([800]));

    let out = locate(&color, &depth);
    let (x, y) = out.center().unwrap_or_else(|| panic!("not found: {:?}", out));
    assert!(out.in_frame());
    assert!((x as f32 - 300.0).abs() <= 5.0 && (y as f32 - 300.0).abs() <= 5.0, "({}, {})", x, y);
    if let Outcome::InFrame(l) = out {
        assert_eq!(l.holes.len(), 4);
    }
}

#[test]
fn clutter_hides_the_module() {
    let mut cells: Vec<(f32, f32)> = (0..20)
        .flat_map(|i| (0..20).map(move |j| (20.0 + 40.0 * i as f32, 20.0 + 40.0 * j as f32)))
        .filter(|&(x, y)| MODULE.iter().all(|&(mx, my)| (x - mx).hypot(y - my) > 50.0))
        .collect();
    cells.shuffle(&mut StdRng::seed_from_u64(42));
    let mut disks = module_disks();
    disks.extend(cells.iter().take(200).map(|&(x, y)| (x, y, 12.0)));
    assert_eq!(disks.len(), 204);

    let color = draw(800, 800, &disks);
    let depth = DepthImage::from_pixel(800, 800, Luma([800]));

    let out = locate(&color, &depth);
    assert!(!out.in_frame(), "{:?}", out.center());
    assert!(out.center().is_none());
}

#[test]
fn far_holes_are_not_the_module() {
    let color = draw(800, 800, &module_disks());
    let depth = DepthImage::from_pixel(800, 800, Luma([2500]));
    assert!(matches!(locate(&color, &depth), Outcome::TooFew(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn center_is_inside_and_at_valid_depth(
        disks in prop::collection::vec((15.0f32..145.0, 15.0f32..105.0, 6.0f32..14.0), 0..8),
        holes in prop::collection::vec((0u32..160, 0u32..120, 1u32..40), 0..6),
        far in any::<bool>(),
    ) {
        let color = draw(160, 120, &disks);
        let mut depth = DepthImage::from_pixel(160, 120, Luma([if far { 1200 } else { 700 }]));
        // punch missing-depth rectangles
        for (x, y, s) in holes {
            for yy in y..(y + s).min(120) {
                for xx in x..(x + s).min(160) {
                    depth.put_pixel(xx, yy, Luma([0]));
                }
            }
        }
        if let Some((x, y)) = locate(&color, &depth).center() {
            prop_assert!(x < 160 && y < 120);
            let d = depth.get_pixel(x, y).0[0];
            prop_assert!(d > 0 && d <= 1000);
        }
    }
}
