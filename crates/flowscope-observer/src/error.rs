//! Error types surfaced by the observer.

use thiserror::Error;

use crate::fieldmask::FieldMaskError;
use crate::filters::FilterError;
use crate::hooks::HookError;
use crate::transport::TransportError;

/// Errors returned by the observer's query endpoints.
///
/// End-of-stream is not an error: streaming calls return `Ok(())` when a
/// non-follow query is exhausted. Ring overrun is not an error either; it is
/// materialized as a lost-event marker inside the stream.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Illegal request combination or malformed request field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The query was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// A construction or query-admission hook failed.
    #[error("hook failed: {0}")]
    Hook(#[from] HookError),

    /// Delivering a response to the client failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The requested operation is not implemented.
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

impl From<FilterError> for ObserverError {
    fn from(err: FilterError) -> Self {
        ObserverError::InvalidArgument(err.to_string())
    }
}

impl From<FieldMaskError> for ObserverError {
    fn from(err: FieldMaskError) -> Self {
        ObserverError::InvalidArgument(err.to_string())
    }
}
