use thiserror::Error;

/// Failures reported by the autopilot adapter. The adapter never retries;
/// callers decide.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FcError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("param {name}: {reason}")]
    Param { name: String, reason: String },

    #[error("precondition: {0}")]
    Precondition(String),

    #[error("offboard: {0}")]
    Offboard(String),
}

impl FcError {
    pub fn is_offboard(&self) -> bool {
        matches!(self, FcError::Offboard(_))
    }
}

pub type FcResult<T> = Result<T, FcError>;
