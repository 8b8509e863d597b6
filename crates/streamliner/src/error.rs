//! Fleet error types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the fleet, the proxies and the executors.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("model '{0}' not found in model configuration")]
    ModelNotFound(String),

    #[error("method '{method}' not configured for proxy on model '{model}'")]
    MethodNotConfigured { model: String, method: String },

    #[error("object not found in registry: {0}")]
    UnknownClass(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker on device {device} failed: {message}")]
    Worker { device: usize, message: String },

    #[error("worker on device {0} has exited")]
    WorkerExited(usize),

    #[error("call on device {device} timed out after {timeout:?}")]
    Timeout { device: usize, timeout: Duration },

    #[error("remote fleet returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FleetError {
    /// Recover a typed error that travelled through `anyhow`.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<FleetError>() {
            Ok(typed) => typed,
            Err(other) => FleetError::Other(other),
        }
    }

    /// True for errors raised before any call crosses a worker boundary.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FleetError::ModelNotFound(_)
                | FleetError::MethodNotConfigured { .. }
                | FleetError::UnknownClass(_)
                | FleetError::Config(_)
        )
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
