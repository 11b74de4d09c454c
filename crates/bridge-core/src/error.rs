use thiserror::Error;

use crate::types::Side;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("adapter error on {side}: {message}")]
    Adapter { side: Side, message: String },

    #[error("transform error: {0}")]
    Transform(String),

    #[error("buffer full")]
    Overflow,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown mapping: {0}")]
    UnknownMapping(String),
}

impl BridgeError {
    /// Exit code the CLI should use when this error is fatal at startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) => 2,
            BridgeError::Store(_) => 3,
            _ => 1,
        }
    }
}
