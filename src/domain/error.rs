use serde::{Deserialize, Serialize};

/// Uniform failure taxonomy for every remote call, regardless of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("timed out")]
    Timeout,
    #[error("unreachable")]
    Unreachable,
    #[error("protocol error")]
    Protocol,
    #[error("not found")]
    NotFound,
}

impl ErrorKind {
    /// Short label used by table output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::Protocol => "protocol",
            Self::NotFound => "not-found",
        }
    }
}
