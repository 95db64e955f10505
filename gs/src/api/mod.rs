//! Thread API - the generation server as seen by the client
//!
//! Provides the generation stream plus the thread operations around it.

use async_trait::async_trait;
use futures::stream::BoxStream;

mod error;
mod http;
mod types;

#[cfg(test)]
pub mod mock;

pub use error::ApiError;
pub use http::HttpThreadApi;
pub use types::{
    APPROVE, ChatMessage, ChatReply, GenerateRequest, GenerationInput, ResumeAction, ThreadSnapshot, ThreadSummary,
};

use crate::sse::DecodedEvent;

/// Decoded events of one generation response, ending at transport close
pub type EventStream = BoxStream<'static, Result<DecodedEvent, ApiError>>;

/// Network collaborator used by the session controller and the CLI
#[async_trait]
pub trait ThreadApi: Send + Sync {
    /// Start or resume a generation; the response body is the event stream
    ///
    /// A non-success status is an error here, before any event is read.
    async fn open_generation(&self, request: &GenerateRequest) -> Result<EventStream, ApiError>;

    /// Fetch the stored artifacts of a thread, bypassing the event stream
    async fn load_thread(&self, thread_id: &str) -> Result<ThreadSnapshot, ApiError>;

    /// Most recent threads, newest first
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, ApiError>;

    /// Flip the archived flag of a thread and return its new value
    async fn toggle_archive(&self, thread_id: &str) -> Result<bool, ApiError>;

    /// Ask the dungeon master about a finished campaign
    async fn chat(&self, thread_id: &str, message: &str) -> Result<ChatReply, ApiError>;

    /// Server liveness check
    async fn health(&self) -> Result<(), ApiError>;
}
