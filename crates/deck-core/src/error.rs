//! Error types for ProxyDeck.

use thiserror::Error;

/// Failures talking to the proxy core's control plane.
///
/// Note that an individual latency probe failing is *not* surfaced
/// through the engine API as an error; the scheduler normalizes probe
/// failures into the failed-delay sentinel. These variants describe the
/// failure to the log line and to callers that hit the control plane
/// directly (topology refresh, selection commit).
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("control plane returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors returned by the engine API.
///
/// The argument-validation variants indicate caller bugs, never runtime
/// conditions; runtime probe failures degrade silently to sentinels.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid probe timeout: {0}ms")]
    InvalidTimeout(u64),

    #[error("empty proxy list for batch delay check")]
    EmptyBatch,

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("group {0} does not accept manual selection")]
    NotSelectable(String),

    #[error("control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),
}
