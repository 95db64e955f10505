//! Session controller messages
//!
//! Errors returned to callers and items passed from stream readers to the
//! controller.

use thiserror::Error;

use super::state::Phase;
use crate::api::ApiError;
use crate::sse::DecodedEvent;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot {operation} while session is {phase}")]
    InvalidTransition { phase: Phase, operation: &'static str },

    #[error("No thread id assigned yet, nothing to resume")]
    NoThread,

    #[error("Session is already bound to thread {0}, start a new session instead")]
    ThreadBound(String),

    #[error("Session controller has been disposed")]
    Disposed,

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// What a stream reader observed
#[derive(Debug)]
pub(crate) enum StreamItem {
    Event(DecodedEvent),
    TransportError(String),
    Closed,
}

/// Reader output tagged with the epoch of the stream it came from
#[derive(Debug)]
pub(crate) struct StreamMessage {
    pub epoch: u64,
    pub item: StreamItem,
}
