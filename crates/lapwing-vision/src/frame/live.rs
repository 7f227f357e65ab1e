//! Camera helper process.
//!
//! The helper owns the sensor and streams frames on stdout:
//! `"LWF1"`, u32 LE width, u32 LE height, `w·h` u16 LE depth (mm),
//! then `w·h·3` BGR bytes.

use image::{ImageBuffer, Rgb, RgbImage};
use std::process::Stdio;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

use super::Capture;
use crate::error::{VisionError, VisionResult};
use crate::imgproc::DepthImage;

pub const MAGIC: &[u8; 4] = b"LWF1";
/// Larger headers are a corrupt stream, not a camera.
const MAX_PIXELS: u64 = 4096 * 4096;

pub struct LiveCamera {
    child: Child,
    stdout: BufReader<ChildStdout>,
    depth_scale: f32,
}

impl LiveCamera {
    pub async fn spawn(command: &[String], depth_scale: f32) -> VisionResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| VisionError::Config("vision.live_command is empty".into()))?;
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).kill_on_drop(true);

        debug!("camera: spawning {}", program);
        let mut child = cmd.spawn().map_err(|e| VisionError::Source(format!("run {}: {}", program, e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VisionError::Source(format!("{} has no stdout", program)))?;
        info!("camera: {} started (pid {:?})", program, child.id());
        Ok(Self { child, stdout: BufReader::new(stdout), depth_scale })
    }

    pub async fn next(&mut self) -> VisionResult<Capture> {
        match read_frame(&mut self.stdout).await? {
            Some((color, depth)) => Ok(Capture {
                color,
                depth,
                depth_scale: self.depth_scale,
                captured_at: OffsetDateTime::now_utc(),
            }),
            None => {
                let status = self.child.try_wait()?;
                Err(VisionError::Source(format!("camera helper closed its stream (status {:?})", status)))
            }
        }
    }
}

/// One frame off the stream; `None` on a clean end before a header.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> VisionResult<Option<(RgbImage, DepthImage)>> {
    let mut magic = [0u8; 4];
    match r.read_exact(&mut magic).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    if &magic != MAGIC {
        return Err(VisionError::Source(format!("bad frame magic {:02x?}", magic)));
    }
    let width = r.read_u32_le().await?;
    let height = r.read_u32_le().await?;
    let pixels = width as u64 * height as u64;
    if pixels == 0 || pixels > MAX_PIXELS {
        return Err(VisionError::Source(format!("implausible frame size {}x{}", width, height)));
    }

    let mut raw = vec![0u8; pixels as usize * 2];
    r.read_exact(&mut raw).await?;
    let depth_px: Vec<u16> = raw.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();

    let mut bgr = vec![0u8; pixels as usize * 3];
    r.read_exact(&mut bgr).await?;
    for px in bgr.chunks_exact_mut(3) {
        px.swap(0, 2);
    }

    let depth = DepthImage::from_raw(width, height, depth_px)
        .ok_or_else(|| VisionError::Source("depth buffer size mismatch".into()))?;
    let color = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, bgr)
        .ok_or_else(|| VisionError::Source("color buffer size mismatch".into()))?;
    Ok(Some((color, depth)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(w: u32, h: u32, depth: &[u16], bgr: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&w.to_le_bytes());
        out.extend_from_slice(&h.to_le_bytes());
        for d in depth {
            out.extend_from_slice(&d.to_le_bytes());
        }
        out.extend_from_slice(bgr);
        out
    }

    #[tokio::test]
    async fn decodes_and_swaps_to_rgb() {
        let bytes = encode(2, 1, &[800, 0], &[255, 0, 1, 10, 20, 30]);
        let mut r = bytes.as_slice();
        let (color, depth) = read_frame(&mut r).await.unwrap().unwrap();
        assert_eq!(color.get_pixel(0, 0).0, [1, 0, 255]);
        assert_eq!(color.get_pixel(1, 0).0, [30, 20, 10]);
        assert_eq!(depth.get_pixel(0, 0).0[0], 800);
        assert!(read_frame(&mut r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let mut r: &[u8] = b"JPEG\x01\x00\x00\x00";
        assert!(matches!(read_frame(&mut r).await, Err(VisionError::Source(_))));
        let bytes = encode(2, 2, &[1, 2, 3, 4], &[0; 5]);
        assert!(read_frame(&mut bytes.as_slice()).await.is_err());
    }

    #[tokio::test]
    async fn empty_command_is_a_config_error() {
        assert!(matches!(LiveCamera::spawn(&[], 0.001).await, Err(VisionError::Config(_))));
    }
}
