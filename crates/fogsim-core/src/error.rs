//! Error types for fogsim

use thiserror::Error;

use crate::types::DeviceId;

/// Result type for fogsim operations
pub type Result<T> = std::result::Result<T, FogError>;

/// Errors that abort a simulation run.
///
/// Task-level outcomes (admission rejected, deadline missed, transmission
/// bounced) are ordinary values handled inside the tick loop, never errors.
#[derive(Error, Debug)]
pub enum FogError {
    /// Invalid run configuration; the simulation refuses to start
    #[error("configuration error: {0}")]
    Config(String),

    /// A device id was referenced that is not part of the fleet
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// Broken internal invariant (programmer error); fail fast
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// IO error while exporting results
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FogError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invariant-violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}
