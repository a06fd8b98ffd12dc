//! Library error types.

use thiserror::Error;

use crate::draw::MapViewId;
use crate::status::StatusCode;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced to application code.
///
/// Nothing here ever crosses the native boundary: native failures arrive as
/// status codes and are only turned into a `BridgeError` on request (see
/// [`crate::native::OperationOutcome::into_result`]).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No map view is attached under this id.
    #[error("Unknown map view: {0}")]
    UnknownMapView(MapViewId),

    /// A native call reported failure.
    #[error("Native call '{op}' failed with {status}: {message}")]
    NativeCall {
        op: String,
        status: StatusCode,
        message: String,
    },

    /// The operation was cancelled through its progress callback or token.
    #[error("Operation '{0}' was cancelled")]
    Cancelled(String),

    /// The map view's scheduler has shut down (view detached).
    #[error("Draw scheduler for {0} has stopped")]
    SchedulerStopped(MapViewId),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
