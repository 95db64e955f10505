//! Scripted ThreadApi for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ApiError, ChatReply, EventStream, GenerateRequest, ThreadApi, ThreadSnapshot, ThreadSummary};
use crate::sse::decode_stream;

type ChunkResult = Result<Vec<u8>, ApiError>;

enum Script {
    Stream(mpsc::UnboundedReceiver<ChunkResult>),
    Fail(ApiError),
}

/// Mock server: each `open_generation` consumes the next scripted response
#[derive(Default)]
pub struct MockThreadApi {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerateRequest>>,
    snapshot: Mutex<Option<ThreadSnapshot>>,
}

impl MockThreadApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a live stream; bytes sent on the returned handle reach the client
    pub fn push_stream(&self) -> mpsc::UnboundedSender<ChunkResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(Script::Stream(rx));
        tx
    }

    /// Script a complete response body that closes after `body`
    pub fn push_body(&self, body: &str) {
        let tx = self.push_stream();
        tx.send(Ok(body.as_bytes().to_vec())).unwrap();
    }

    /// Script a failure to open the stream
    pub fn push_error(&self, err: ApiError) {
        self.scripts.lock().unwrap().push_back(Script::Fail(err));
    }

    pub fn set_snapshot(&self, snapshot: ThreadSnapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot);
    }

    /// Generation requests received so far
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreadApi for MockThreadApi {
    async fn open_generation(&self, request: &GenerateRequest) -> Result<EventStream, ApiError> {
        debug!("MockThreadApi::open_generation: called");
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Stream(rx)) => {
                let chunks = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|c| (c, rx)) });
                Ok(decode_stream(Box::pin(chunks)).boxed())
            }
            Some(Script::Fail(err)) => Err(err),
            None => Err(ApiError::InvalidResponse("No more scripted streams".to_string())),
        }
    }

    async fn load_thread(&self, thread_id: &str) -> Result<ThreadSnapshot, ApiError> {
        debug!(%thread_id, "MockThreadApi::load_thread: called");
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::Server("Thread not found".to_string()))
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, ApiError> {
        Ok(Vec::new())
    }

    async fn toggle_archive(&self, _thread_id: &str) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, _thread_id: &str, message: &str) -> Result<ChatReply, ApiError> {
        Ok(ChatReply {
            response: format!("You asked: {message}"),
            chat_messages: Vec::new(),
        })
    }

    async fn health(&self) -> Result<(), ApiError> {
        Ok(())
    }
}
