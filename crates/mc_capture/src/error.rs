use std::thread::ThreadId;

use thiserror::Error;

use crate::types::SurfaceFormat;

/// Capture error type shared by the worker, the registry and platform backends.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture worker already started")]
    AlreadyStarted,

    #[error("Hook registry is not initialized")]
    NotInitialized,

    #[error("Thread {0:?} already has a registered capture worker")]
    DuplicateRegistration(ThreadId),

    #[error("Host window setup failed: {0}")]
    Host(String),

    #[error("Compositor error: {0}")]
    Compositor(String),

    #[error("Graphics device error: {0}")]
    Device(String),

    #[error("Unsupported back buffer format: {0:?}")]
    UnsupportedFormat(SurfaceFormat),

    #[error("Called off the owning thread")]
    WrongThread,

    #[error("Function interception failed: {0}")]
    Hook(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Worker thread exited before reporting readiness")]
    WorkerExited,

    #[error("Settings error: {0}")]
    Settings(String),
}

/// Result type alias for convenience
pub type CaptureResult<T> = Result<T, CaptureError>;

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Settings(err.to_string())
    }
}
