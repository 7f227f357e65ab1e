use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::record::{COLOR_EXT, DEPTH_EXT, SCALE_FILE};
use super::Capture;
use crate::error::{VisionError, VisionResult};
use crate::imgproc::DepthImage;

/// `stem` + `.ext`; stems contain dots, so `with_extension` would eat part
/// of the timestamp.
fn sibling(stem: &Path, ext: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Plays back a directory written by the recorder, in file-name order.
pub struct Replay {
    stems: Vec<PathBuf>,
    pos: usize,
    repeat: bool,
    depth_scale: f32,
}

impl Replay {
    pub async fn open(dir: &Path, repeat: bool) -> VisionResult<Self> {
        let mut stems = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| VisionError::Source(format!("replay dir {}: {}", dir.display(), e)))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(COLOR_EXT) {
                stems.push(path.with_extension(""));
            }
        }
        stems.sort();

        let depth_scale = match tokio::fs::read_to_string(dir.join(SCALE_FILE)).await {
            Ok(s) => s
                .trim()
                .parse()
                .map_err(|e| VisionError::Source(format!("{}: {}", SCALE_FILE, e)))?,
            Err(e) => {
                warn!("replay: no {} ({}), assuming millimetres", SCALE_FILE, e);
                0.001
            }
        };
        info!("replay: {} frames from {}", stems.len(), dir.display());
        Ok(Self { stems, pos: 0, repeat, depth_scale })
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub async fn next(&mut self) -> VisionResult<Capture> {
        if self.pos >= self.stems.len() {
            if !self.repeat || self.stems.is_empty() {
                return Err(VisionError::FrameSourceExhausted);
            }
            debug!("replay: wrapping around");
            self.pos = 0;
        }
        let stem = &self.stems[self.pos];
        self.pos += 1;

        let jpeg = tokio::fs::read(sibling(stem, COLOR_EXT)).await?;
        let color = image::load_from_memory(&jpeg)?.to_rgb8();
        let raw = tokio::fs::read(sibling(stem, DEPTH_EXT)).await?;
        let (w, h) = color.dimensions();
        if raw.len() != w as usize * h as usize * 2 {
            return Err(VisionError::Source(format!(
                "{}: {} depth bytes for a {}x{} frame",
                stem.display(),
                raw.len(),
                w,
                h
            )));
        }
        let px: Vec<u16> = raw.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
        let depth = DepthImage::from_raw(w, h, px)
            .ok_or_else(|| VisionError::Source(format!("{}: depth size mismatch", stem.display())))?;
        Ok(Capture { color, depth, depth_scale: self.depth_scale, captured_at: OffsetDateTime::now_utc() })
    }
}
