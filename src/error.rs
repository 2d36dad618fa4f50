//! Error taxonomy for the render core.
//!
//! None of these are fatal: the window stays usable and a new job can start right after.

use thiserror::Error;

/// Returned by `Orchestrator::start`.
#[derive(Debug, Error)]
pub enum StartError {
    /// A job is already running. Flow control, resolved by deferring the request.
    #[error("a render job is already running")]
    Busy,
    #[error("could not spawn render worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("render stopped before completion")]
    JobAborted,
    #[error("render failed: {0}")]
    JobFailed(String),
    #[error("{what} unavailable: {reason}")]
    ResourceUnavailable { what: String, reason: String },
}

impl JobError {
    pub fn unavailable(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        JobError::ResourceUnavailable {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Internal fault raised by a rendering engine.
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("invalid canvas size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("minimum shape size must be positive, got {0}")]
    InvalidMinimumSize(f64),
}
