use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    /// A finite replay ran out of frames; the pipeline exits cleanly.
    #[error("frame source exhausted")]
    FrameSourceExhausted,

    #[error("{detector} failed: {reason}")]
    DetectorFailure { detector: &'static str, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    /// Frame source broke (helper died, malformed stream, bad recording).
    #[error("frame source: {0}")]
    Source(String),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Link(#[from] lapwing_link::LinkError),
}

pub type VisionResult<T> = Result<T, VisionError>;

impl VisionError {
    pub fn detector(detector: &'static str, reason: impl Into<String>) -> Self {
        VisionError::DetectorFailure { detector, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_failure_names_detector() {
        let e = VisionError::detector("text", "ocr exited with 1");
        assert_eq!(e.to_string(), "text failed: ocr exited with 1");
    }

    #[test]
    fn io_converts() {
        let e: VisionError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, VisionError::Io(_)));
    }
}
