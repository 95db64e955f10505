//! GenerationSessionController - drives one generation session
//!
//! Each outbound request gets its own reader task and a fresh epoch. Readers
//! forward decoded events tagged with their epoch; the controller folds only
//! items from the current epoch, so a superseded stream can never touch the
//! state even if its items are already queued.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bus::SessionBus;
use super::messages::{SessionError, StreamItem, StreamMessage};
use super::state::{Phase, SessionState};
use super::store::SessionStore;
use crate::api::{ApiError, GenerateRequest, GenerationInput, ResumeAction, ThreadApi};
use crate::config::SessionConfig;
use crate::sse::DecodedEvent;

/// Buffered reader items; keeps decoding only slightly ahead of folding
const READER_CHANNEL_CAPACITY: usize = 16;

/// Error message when the body ends before done/hitl/error
pub const STREAM_CLOSED_MESSAGE: &str = "Stream closed before generation finished";

/// Owner of one [`SessionState`] and the streams that feed it
pub struct GenerationSessionController {
    api: Arc<dyn ThreadApi>,
    store: Arc<dyn SessionStore>,
    state: SessionState,
    input: GenerationInput,
    bus: SessionBus,
    epoch: u64,
    reader: Option<JoinHandle<()>>,
    tx: mpsc::Sender<StreamMessage>,
    rx: mpsc::Receiver<StreamMessage>,
    idle_timeout: Option<Duration>,
    disposed: bool,
}

impl GenerationSessionController {
    /// New idle session with no thread
    pub fn new(api: Arc<dyn ThreadApi>, store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        debug!(?config, "GenerationSessionController::new: called");
        let (tx, rx) = mpsc::channel(READER_CHANNEL_CAPACITY);
        Self {
            api,
            store,
            state: SessionState::new(),
            input: GenerationInput::default(),
            bus: SessionBus::new(config.channel_capacity),
            epoch: 0,
            reader: None,
            tx,
            rx,
            idle_timeout: (config.idle_timeout_ms > 0).then(|| Duration::from_millis(config.idle_timeout_ms)),
            disposed: false,
        }
    }

    /// Session for an existing thread, loaded from the server instead of a stream
    ///
    /// The loaded thread becomes the persisted last active thread.
    pub async fn hydrate(
        api: Arc<dyn ThreadApi>,
        store: Arc<dyn SessionStore>,
        config: &SessionConfig,
        thread_id: &str,
    ) -> Result<Self, SessionError> {
        debug!(%thread_id, "hydrate: called");
        let snapshot = api.load_thread(thread_id).await?;
        let mut controller = Self::new(api, store, config);
        controller.state = SessionState::from_snapshot(thread_id, snapshot);
        controller.persist_thread_id(thread_id);
        info!(%thread_id, "Session hydrated from thread store");
        Ok(controller)
    }

    /// Hydrate the last persisted thread, if there is one
    ///
    /// A store that can't be read counts as empty.
    pub async fn restore(
        api: Arc<dyn ThreadApi>,
        store: Arc<dyn SessionStore>,
        config: &SessionConfig,
    ) -> Result<Option<Self>, SessionError> {
        debug!("restore: called");
        let thread_id = match store.load() {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("restore: no persisted thread");
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "restore: could not read session store");
                return Ok(None);
            }
        };
        Self::hydrate(api, store, config, &thread_id).await.map(Some)
    }

    /// Input fields carried on later resume requests
    pub fn with_input(mut self, input: GenerationInput) -> Self {
        self.input = input;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Snapshots published after every change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.bus.subscribe()
    }

    /// Start a new generation: `Idle -> Connecting`
    ///
    /// Must be called within a tokio runtime.
    pub fn start_generation(&mut self, input: GenerationInput) -> Result<(), SessionError> {
        debug!(prompt_len = input.prompt.len(), "start_generation: called");
        self.ensure_not_disposed()?;
        if self.state.phase != Phase::Idle {
            return Err(SessionError::InvalidTransition {
                phase: self.state.phase,
                operation: "start a generation",
            });
        }
        if let Some(thread_id) = &self.state.thread_id {
            return Err(SessionError::ThreadBound(thread_id.clone()));
        }

        self.state.begin_connecting();
        let request = GenerateRequest::start(&input);
        self.input = input;
        self.open_stream(request);
        info!(epoch = self.epoch, "Generation started");
        self.publish();
        Ok(())
    }

    /// Continue the thread with `action`, superseding any current stream
    ///
    /// Allowed while idle with a known thread, while a stream is live, and at
    /// an approval pause. Must be called within a tokio runtime.
    pub fn resume(&mut self, action: ResumeAction) -> Result<(), SessionError> {
        debug!(?action, phase = %self.state.phase, "resume: called");
        self.ensure_not_disposed()?;
        if !self.state.phase.can_transition_to(Phase::Connecting) {
            return Err(SessionError::InvalidTransition {
                phase: self.state.phase,
                operation: "resume",
            });
        }
        let Some(thread_id) = self.state.thread_id.clone() else {
            return Err(SessionError::NoThread);
        };

        // Retire the old stream before the state moves on
        self.retire_stream();
        self.state.begin_connecting();
        let request = GenerateRequest::resume(&self.input, &thread_id, &action);
        self.open_stream(request);
        info!(%thread_id, epoch = self.epoch, action = action.as_wire(), "Generation resumed");
        self.publish();
        Ok(())
    }

    /// Fold the next item of the current stream
    ///
    /// Returns the updated state, or `None` once no stream is active (paused,
    /// finished, failed, closed, or disposed).
    pub async fn next_state(&mut self) -> Option<&SessionState> {
        loop {
            if self.disposed || self.reader.is_none() {
                return None;
            }

            let received = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.rx.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        warn!(timeout_ms = limit.as_millis() as u64, "next_state: stream idle timeout");
                        self.retire_stream();
                        if self.state.fail_transport(ApiError::Timeout(limit).to_string()) {
                            self.publish();
                        }
                        return Some(&self.state);
                    }
                },
                None => self.rx.recv().await,
            };

            // The controller holds a sender, so the channel never closes
            let Some(message) = received else {
                return None;
            };

            if message.epoch != self.epoch {
                debug!(
                    stale_epoch = message.epoch,
                    current_epoch = self.epoch,
                    "next_state: discarding item from superseded stream"
                );
                continue;
            }

            if self.handle(message.item) {
                return Some(&self.state);
            }
        }
    }

    /// Fold until no stream is active
    pub async fn run(&mut self) -> &SessionState {
        while self.next_state().await.is_some() {}
        &self.state
    }

    /// Release the stream; later items and operations are ignored
    pub fn dispose(&mut self) {
        debug!(epoch = self.epoch, "dispose: called");
        self.retire_stream();
        self.disposed = true;
    }

    fn ensure_not_disposed(&self) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }

    /// Apply one current-epoch item; true if the state changed
    fn handle(&mut self, item: StreamItem) -> bool {
        match item {
            StreamItem::Event(event) => {
                if !self.state.apply(&event) {
                    return false;
                }
                if let DecodedEvent::ThreadAssigned { thread_id } = &event
                    && self.state.thread_id.as_deref() == Some(thread_id.as_str())
                {
                    self.persist_thread_id(thread_id);
                }
                match self.state.phase {
                    Phase::AwaitingApproval => {
                        info!(thread_id = ?self.state.thread_id, "Generation paused for approval");
                        self.retire_stream();
                    }
                    Phase::Complete => {
                        info!(thread_id = ?self.state.thread_id, "Generation complete");
                        self.retire_stream();
                    }
                    Phase::Failed => {
                        warn!(error = ?self.state.error_message, "Generation failed on server");
                        self.retire_stream();
                    }
                    _ => {}
                }
                self.publish();
                true
            }
            StreamItem::TransportError(message) => {
                warn!(%message, "handle: transport error");
                self.retire_stream();
                let changed = self.state.fail_transport(message);
                if changed {
                    self.publish();
                }
                changed
            }
            StreamItem::Closed => {
                debug!(phase = %self.state.phase, "handle: stream closed");
                self.retire_stream();
                let changed = self.state.phase.is_live() && self.state.fail_transport(STREAM_CLOSED_MESSAGE);
                if changed {
                    self.publish();
                }
                changed
            }
        }
    }

    fn open_stream(&mut self, request: GenerateRequest) {
        self.retire_stream();
        let epoch = self.epoch;
        debug!(epoch, "open_stream: spawning reader");
        let handle = tokio::spawn(read_stream(self.api.clone(), request, epoch, self.tx.clone()));
        self.reader = Some(handle);
    }

    /// Stop reading the current stream and invalidate anything it queued
    fn retire_stream(&mut self) {
        if let Some(handle) = self.reader.take() {
            debug!(epoch = self.epoch, "retire_stream: aborting reader");
            handle.abort();
        }
        self.epoch += 1;
    }

    /// Fire-and-forget save of the thread id
    fn persist_thread_id(&self, thread_id: &str) {
        if let Err(e) = self.store.save(thread_id) {
            warn!(%thread_id, error = %e, "persist_thread_id: could not save thread id");
        }
    }

    fn publish(&self) {
        if !self.disposed {
            self.bus.emit(self.state.clone());
        }
    }
}

impl Drop for GenerationSessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
    }
}

/// Reader task: open the request and forward decoded events
async fn read_stream(
    api: Arc<dyn ThreadApi>,
    request: GenerateRequest,
    epoch: u64,
    tx: mpsc::Sender<StreamMessage>,
) {
    debug!(epoch, "read_stream: opening");
    let mut events = match api.open_generation(&request).await {
        Ok(events) => events,
        Err(e) => {
            let item = StreamItem::TransportError(e.to_string());
            let _ = tx.send(StreamMessage { epoch, item }).await;
            return;
        }
    };

    while let Some(result) = events.next().await {
        let item = match result {
            Ok(event) => StreamItem::Event(event),
            Err(e) => {
                let item = StreamItem::TransportError(e.to_string());
                let _ = tx.send(StreamMessage { epoch, item }).await;
                return;
            }
        };
        if tx.send(StreamMessage { epoch, item }).await.is_err() {
            debug!(epoch, "read_stream: controller gone");
            return;
        }
    }

    debug!(epoch, "read_stream: transport closed");
    let _ = tx
        .send(StreamMessage {
            epoch,
            item: StreamItem::Closed,
        })
        .await;
}
