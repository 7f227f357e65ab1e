use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("remote: {0}")]
    Remote(String),

    #[error("unexpected response to {op}: {got}")]
    Unexpected { op: &'static str, got: String },
}

pub type LinkResult<T> = Result<T, LinkError>;
