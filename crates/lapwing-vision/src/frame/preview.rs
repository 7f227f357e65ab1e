use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::path::PathBuf;

use crate::error::VisionResult;

/// Headless display: the latest color frame as a JPEG at a fixed path,
/// replaced atomically so viewers never read a half-written file.
pub struct Preview {
    path: PathBuf,
}

impl Preview {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn show(&self, color: &RgbImage) -> VisionResult<()> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 75).encode_image(color)?;
        let tmp = self.path.with_extension("part");
        tokio::fs::write(&tmp, jpeg).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
