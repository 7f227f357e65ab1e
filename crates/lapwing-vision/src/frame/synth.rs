//! Synthetic module scene for simulation runs: a white plate with four
//! dark holes in front of a far grey wall, wobbling a little per frame.

use image::{Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::Capture;
use crate::error::{VisionError, VisionResult};
use crate::imgproc::DepthImage;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Stop after this many frames; endless when unset.
    pub frames: Option<u64>,
    pub module_center: (u32, u32),
    /// Distance between neighbouring hole centres, pixels.
    pub hole_spacing: u32,
    pub hole_radius: u32,
    pub plate_depth_mm: u16,
    pub wall_depth_mm: u16,
    /// Largest per-frame shift of the whole module, pixels.
    pub jitter: u32,
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15.0,
            frames: None,
            module_center: (320, 240),
            hole_spacing: 160,
            hole_radius: 18,
            plate_depth_mm: 800,
            wall_depth_mm: 3000,
            jitter: 3,
            seed: 7,
        }
    }
}

pub struct SyntheticScene {
    cfg: SceneConfig,
    rng: StdRng,
    ticker: Interval,
    produced: u64,
    depth_scale: f32,
}

impl SyntheticScene {
    pub fn new(cfg: SceneConfig, depth_scale: f32) -> Self {
        let period = Duration::from_secs_f64(1.0 / cfg.fps.clamp(0.1, 240.0));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let rng = StdRng::seed_from_u64(cfg.seed);
        Self { cfg, rng, ticker, produced: 0, depth_scale }
    }

    pub async fn next(&mut self) -> VisionResult<Capture> {
        if self.cfg.frames.is_some_and(|n| self.produced >= n) {
            return Err(VisionError::FrameSourceExhausted);
        }
        self.ticker.tick().await;
        self.produced += 1;

        let j = self.cfg.jitter as i64;
        let (dx, dy) = if j > 0 { (self.rng.gen_range(-j..=j), self.rng.gen_range(-j..=j)) } else { (0, 0) };
        let cx = (self.cfg.module_center.0 as i64 + dx).max(0) as u32;
        let cy = (self.cfg.module_center.1 as i64 + dy).max(0) as u32;
        let (color, depth) = render_module(&self.cfg, (cx, cy));
        Ok(Capture { color, depth, depth_scale: self.depth_scale, captured_at: OffsetDateTime::now_utc() })
    }
}

/// Hole centres, clockwise from top-left.
pub fn hole_centers(center: (u32, u32), spacing: u32) -> [(f32, f32); 4] {
    let (cx, cy, h) = (center.0 as f32, center.1 as f32, spacing as f32 / 2.0);
    [(cx - h, cy - h), (cx + h, cy - h), (cx + h, cy + h), (cx - h, cy + h)]
}

pub fn render_module(cfg: &SceneConfig, center: (u32, u32)) -> (RgbImage, DepthImage) {
    let holes = hole_centers(center, cfg.hole_spacing);
    let r = cfg.hole_radius as f32;
    let half_plate = cfg.hole_spacing as f32 / 2.0 + 2.5 * r;
    let (cx, cy) = (center.0 as f32, center.1 as f32);
    let on_plate = |x: f32, y: f32| (x - cx).abs() <= half_plate && (y - cy).abs() <= half_plate;
    let in_hole = |x: f32, y: f32| holes.iter().any(|&(hx, hy)| (x - hx).powi(2) + (y - hy).powi(2) <= r * r);

    let color = RgbImage::from_fn(cfg.width, cfg.height, |x, y| {
        let (x, y) = (x as f32, y as f32);
        if in_hole(x, y) {
            Rgb([25, 25, 25])
        } else if on_plate(x, y) {
            Rgb([245, 245, 245])
        } else {
            Rgb([128, 128, 128])
        }
    });
    // holes are blind: their floor sits just behind the plate
    let depth = DepthImage::from_fn(cfg.width, cfg.height, |x, y| {
        let (x, y) = (x as f32, y as f32);
        if in_hole(x, y) {
            Luma([cfg.plate_depth_mm.saturating_add(20)])
        } else if on_plate(x, y) {
            Luma([cfg.plate_depth_mm])
        } else {
            Luma([cfg.wall_depth_mm])
        }
    });
    (color, depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn finite_scene_runs_out() {
        let cfg = SceneConfig { width: 64, height: 48, frames: Some(2), hole_spacing: 20, hole_radius: 4, ..Default::default() };
        let mut scene = SyntheticScene::new(cfg, 0.001);
        assert!(scene.next().await.is_ok());
        assert!(scene.next().await.is_ok());
        assert!(matches!(scene.next().await, Err(VisionError::FrameSourceExhausted)));
    }

    #[test]
    fn holes_are_dark_and_near() {
        let cfg = SceneConfig::default();
        let (color, depth) = render_module(&cfg, (320, 240));
        let (hx, hy) = hole_centers((320, 240), cfg.hole_spacing)[0];
        assert_eq!(color.get_pixel(hx as u32, hy as u32).0, [25, 25, 25]);
        assert_eq!(depth.get_pixel(hx as u32, hy as u32).0[0], 820);
        assert_eq!(depth.get_pixel(320, 240).0[0], 800);
        assert_eq!(depth.get_pixel(2, 2).0[0], 3000);
    }
}
