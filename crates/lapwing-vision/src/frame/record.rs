//! On-disk frame format.
//!
//! Per frame: `<stem>.jpg` (color) and `<stem>.depth` (raw u16 LE
//! millimetres, same grid). One `depth_scale.txt` per directory. The stem
//! is the capture time with `:` and ` ` replaced by `.` and `_`.

use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

use super::Frame;
use crate::error::{VisionError, VisionResult};

pub const COLOR_EXT: &str = "jpg";
pub const DEPTH_EXT: &str = "depth";
pub const SCALE_FILE: &str = "depth_scale.txt";
const JPEG_QUALITY: u8 = 90;

pub fn frame_stem(t: OffsetDateTime) -> VisionResult<String> {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
    let s = t.format(fmt).map_err(|e| VisionError::Source(format!("timestamp: {}", e)))?;
    Ok(s.replace(':', ".").replace(' ', "_"))
}

pub fn encode_depth(depth: &[u16]) -> Vec<u8> {
    depth.iter().flat_map(|d| d.to_le_bytes()).collect()
}

pub struct Recorder {
    dir: PathBuf,
    wrote_scale: bool,
    last_stem: Option<String>,
}

impl Recorder {
    pub async fn create(dir: &Path) -> VisionResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        info!("record: writing frames to {}", dir.display());
        Ok(Self { dir: dir.to_path_buf(), wrote_scale: false, last_stem: None })
    }

    /// Writes both images; returns the stem used.
    pub async fn write(&mut self, frame: &Frame) -> VisionResult<String> {
        if !self.wrote_scale {
            tokio::fs::write(self.dir.join(SCALE_FILE), format!("{}\n", frame.depth_scale)).await?;
            self.wrote_scale = true;
        }
        let mut stem = frame_stem(frame.captured_at)?;
        // two frames inside one microsecond would overwrite each other
        if self.last_stem.as_deref() == Some(stem.as_str()) {
            stem = format!("{}-{}", stem, frame.index);
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&frame.color)?;
        tokio::fs::write(self.dir.join(format!("{}.{}", stem, COLOR_EXT)), jpeg).await?;
        tokio::fs::write(self.dir.join(format!("{}.{}", stem, DEPTH_EXT)), encode_depth(frame.depth.as_raw())).await?;

        self.last_stem = Some(stem.clone());
        Ok(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn stem_has_no_colons_or_spaces() {
        let stem = frame_stem(datetime!(2024-05-17 13:04:05.25 UTC)).unwrap();
        assert_eq!(stem, "2024-05-17_13.04.05.250000");
    }

    #[test]
    fn depth_is_little_endian() {
        assert_eq!(encode_depth(&[0x0102, 800]), vec![0x02, 0x01, 0x20, 0x03]);
    }
}
