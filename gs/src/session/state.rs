//! Session state and the pure reducer over decoded events

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::ThreadSnapshot;
use crate::sse::{ApprovalRequest, DecodedEvent};

/// Discrete state of a generation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Connecting,
    Streaming,
    AwaitingApproval,
    Complete,
    Failed,
}

impl Phase {
    /// Whether `self -> next` is an edge of the session state machine
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Streaming)
                | (Streaming, Streaming)
                | (Streaming, AwaitingApproval)
                | (AwaitingApproval, Connecting)
                | (Streaming, Complete)
                | (Connecting | Streaming | AwaitingApproval, Failed)
                // Resume while a stream is still live supersedes it
                | (Connecting | Streaming, Connecting)
        )
    }

    /// Complete and Failed end a session instance
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }

    /// A stream is open or being opened
    pub fn is_live(self) -> bool {
        matches!(self, Phase::Connecting | Phase::Streaming)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Streaming => "streaming",
            Phase::AwaitingApproval => "awaiting-approval",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// UI-facing aggregate of one generation session
///
/// `pending_approval` is `Some` exactly when `phase` is `AwaitingApproval`.
/// `thread_id` is assigned once and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    pub thread_id: Option<String>,
    pub plan: Option<Value>,
    pub party: Option<Value>,
    pub narrative: Option<Value>,
    pub pending_approval: Option<ApprovalRequest>,
    pub status_message: String,
    pub error_message: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Fresh session for a new generation request
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            thread_id: None,
            plan: None,
            party: None,
            narrative: None,
            pending_approval: None,
            status_message: String::new(),
            error_message: None,
        }
    }

    /// Session rebuilt from a stored thread rather than a live stream
    pub fn from_snapshot(thread_id: &str, snapshot: ThreadSnapshot) -> Self {
        Self {
            thread_id: Some(thread_id.to_string()),
            plan: snapshot.plan,
            party: snapshot.party,
            narrative: snapshot.narrative,
            ..Self::new()
        }
    }

    /// Fold one event into the state
    ///
    /// Returns true if the state changed. Events that have no edge from the
    /// current phase are ignored.
    pub fn apply(&mut self, event: &DecodedEvent) -> bool {
        debug!(phase = %self.phase, event_type = event.event_type(), "apply: called");
        match self.phase {
            Phase::Idle | Phase::Complete | Phase::Failed => {
                debug!(phase = %self.phase, "apply: no live stream, ignoring event");
                return false;
            }
            Phase::AwaitingApproval => {
                if let DecodedEvent::GenerationFailed { message } = event {
                    self.fail(message.clone());
                    return true;
                }
                debug!("apply: paused for approval, ignoring event");
                return false;
            }
            Phase::Connecting => {
                // Any event proves the connection is live
                self.set_phase(Phase::Streaming);
            }
            Phase::Streaming => {}
        }

        match event {
            DecodedEvent::ThreadAssigned { thread_id } => match &self.thread_id {
                None => self.thread_id = Some(thread_id.clone()),
                Some(current) if current == thread_id => {}
                Some(current) => {
                    warn!(%current, received = %thread_id, "apply: thread id already assigned, ignoring");
                }
            },
            DecodedEvent::StatusUpdate { message } => self.status_message = message.clone(),
            DecodedEvent::PlanReady { plan } => self.plan = non_null(plan),
            DecodedEvent::PartyReady { party } => self.party = non_null(party),
            DecodedEvent::NarrativeReady { narrative } => self.narrative = non_null(narrative),
            DecodedEvent::ApprovalRequested(approval) => {
                self.pending_approval = Some(approval.clone());
                self.set_phase(Phase::AwaitingApproval);
            }
            DecodedEvent::GenerationFailed { message } => self.fail(message.clone()),
            DecodedEvent::GenerationDone => self.set_phase(Phase::Complete),
        }
        true
    }

    /// Mark the start of a new outbound stream
    ///
    /// Clears any pending approval. Returns false (and leaves the state
    /// untouched) if the current phase has no edge to `Connecting`.
    pub fn begin_connecting(&mut self) -> bool {
        if !self.phase.can_transition_to(Phase::Connecting) {
            return false;
        }
        self.pending_approval = None;
        self.error_message = None;
        self.set_phase(Phase::Connecting);
        true
    }

    /// Transport-level failure; ignored once the session has ended or paused cleanly
    pub fn fail_transport(&mut self, message: impl Into<String>) -> bool {
        if !self.phase.can_transition_to(Phase::Failed) {
            return false;
        }
        self.fail(message.into());
        true
    }

    fn fail(&mut self, message: String) {
        self.error_message = Some(message);
        self.set_phase(Phase::Failed);
    }

    fn set_phase(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        debug!(from = %self.phase, to = %next, "set_phase");
        if next != Phase::AwaitingApproval {
            self.pending_approval = None;
        }
        self.phase = next;
    }
}

/// Pure form of [`SessionState::apply`]
pub fn fold(mut state: SessionState, event: &DecodedEvent) -> SessionState {
    state.apply(event);
    state
}

fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::ApprovalOption;
    use proptest::prelude::*;
    use serde_json::{Map, json};

    fn connecting() -> SessionState {
        let mut state = SessionState::new();
        assert!(state.begin_connecting());
        state
    }

    fn approval(payload: &str) -> DecodedEvent {
        let mut raw = Map::new();
        raw.insert("action_1_label".to_string(), json!("Approve"));
        raw.insert("action_1_payload".to_string(), json!(payload));
        DecodedEvent::ApprovalRequested(ApprovalRequest::from_object(raw))
    }

    fn status(message: &str) -> DecodedEvent {
        DecodedEvent::StatusUpdate {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_first_event_moves_connecting_to_streaming() {
        let state = fold(connecting(), &status("Planning..."));
        assert_eq!(state.phase, Phase::Streaming);
        assert_eq!(state.status_message, "Planning...");
    }

    #[test]
    fn test_artifacts_leave_phase_unchanged() {
        let mut state = fold(connecting(), &status("x"));
        state.apply(&DecodedEvent::PlanReady { plan: json!({"acts": 3}) });
        state.apply(&DecodedEvent::PartyReady {
            party: json!({"party_size": 4}),
        });
        state.apply(&DecodedEvent::NarrativeReady {
            narrative: json!({"title": "Keep"}),
        });
        assert_eq!(state.phase, Phase::Streaming);
        assert_eq!(state.plan, Some(json!({"acts": 3})));
        assert_eq!(state.party, Some(json!({"party_size": 4})));
        assert_eq!(state.narrative, Some(json!({"title": "Keep"})));
    }

    #[test]
    fn test_thread_id_is_assigned_once() {
        let mut state = connecting();
        state.apply(&DecodedEvent::ThreadAssigned {
            thread_id: "abc".to_string(),
        });
        state.apply(&DecodedEvent::ThreadAssigned {
            thread_id: "other".to_string(),
        });
        assert_eq!(state.thread_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_approval_pauses_and_sets_pending() {
        let state = fold(fold(connecting(), &status("x")), &approval("approve"));
        assert_eq!(state.phase, Phase::AwaitingApproval);
        let pending = state.pending_approval.as_ref().unwrap();
        assert_eq!(
            pending.options,
            vec![ApprovalOption {
                label: "Approve".to_string(),
                payload: "approve".to_string()
            }]
        );
    }

    #[test]
    fn test_events_ignored_while_awaiting_approval_except_failure() {
        let mut state = fold(connecting(), &approval("approve"));
        assert!(!state.apply(&status("late")));
        assert!(!state.apply(&DecodedEvent::GenerationDone));
        assert_eq!(state.phase, Phase::AwaitingApproval);

        assert!(state.apply(&DecodedEvent::GenerationFailed {
            message: "boom".to_string()
        }));
        assert_eq!(state.phase, Phase::Failed);
        assert!(state.pending_approval.is_none());
    }

    #[test]
    fn test_begin_connecting_clears_pending_approval() {
        let mut state = fold(connecting(), &approval("approve"));
        state.plan = Some(json!({"acts": 1}));
        assert!(state.begin_connecting());
        assert_eq!(state.phase, Phase::Connecting);
        assert!(state.pending_approval.is_none());
        assert_eq!(state.plan, Some(json!({"acts": 1})));
    }

    #[test]
    fn test_done_is_terminal() {
        let mut state = fold(connecting(), &DecodedEvent::GenerationDone);
        assert_eq!(state.phase, Phase::Complete);
        assert!(!state.apply(&status("after")));
        assert!(!state.begin_connecting());
        assert!(!state.fail_transport("late"));
        assert_eq!(state.phase, Phase::Complete);
    }

    #[test]
    fn test_failure_keeps_prior_artifacts() {
        let mut state = fold(connecting(), &DecodedEvent::PlanReady { plan: json!({"acts": 2}) });
        state.apply(&DecodedEvent::GenerationFailed {
            message: "LLM quota exceeded".to_string(),
        });
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.error_message.as_deref(), Some("LLM quota exceeded"));
        assert_eq!(state.plan, Some(json!({"acts": 2})));
    }

    #[test]
    fn test_transport_failure_from_connecting() {
        let mut state = connecting();
        assert!(state.fail_transport("HTTP error 500: oops"));
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.error_message.as_deref(), Some("HTTP error 500: oops"));
    }

    #[test]
    fn test_idle_ignores_events() {
        let state = fold(SessionState::new(), &DecodedEvent::GenerationDone);
        assert_eq!(state, SessionState::new());
    }

    #[test]
    fn test_from_snapshot_is_idle_with_thread() {
        let snapshot = ThreadSnapshot {
            plan: Some(json!({"acts": 1})),
            ..Default::default()
        };
        let state = SessionState::from_snapshot("t9", snapshot);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.thread_id.as_deref(), Some("t9"));
        assert_eq!(state.plan, Some(json!({"acts": 1})));
    }

    #[test]
    fn test_phase_edges() {
        assert!(Phase::Idle.can_transition_to(Phase::Connecting));
        assert!(!Phase::Idle.can_transition_to(Phase::Streaming));
        assert!(!Phase::Complete.can_transition_to(Phase::Streaming));
        assert!(!Phase::Complete.can_transition_to(Phase::Connecting));
        assert!(!Phase::Failed.can_transition_to(Phase::Connecting));
        assert!(!Phase::AwaitingApproval.can_transition_to(Phase::Streaming));
        assert!(Phase::AwaitingApproval.can_transition_to(Phase::Connecting));
    }

    fn arb_event() -> impl Strategy<Value = DecodedEvent> {
        prop_oneof![
            "[a-z]{1,4}".prop_map(|thread_id| DecodedEvent::ThreadAssigned { thread_id }),
            "[a-z ]{0,8}".prop_map(|message| DecodedEvent::StatusUpdate { message }),
            Just(DecodedEvent::PlanReady { plan: json!({"acts": 1}) }),
            Just(DecodedEvent::PartyReady { party: json!(null) }),
            Just(DecodedEvent::NarrativeReady {
                narrative: json!({"title": "t"})
            }),
            Just(approval("approve")),
            Just(DecodedEvent::GenerationFailed {
                message: "boom".to_string()
            }),
            Just(DecodedEvent::GenerationDone),
        ]
    }

    /// Either a decoded event or a user resume between events
    #[derive(Debug, Clone)]
    enum Step {
        Event(DecodedEvent),
        Resume,
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            6 => arb_event().prop_map(Step::Event),
            1 => Just(Step::Resume),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Property: every fold step follows a state machine edge
        #[test]
        fn prop_transitions_are_legal(steps in proptest::collection::vec(arb_step(), 0..40)) {
            let mut state = connecting();
            let mut thread: Option<String> = None;
            for step in steps {
                let before = state.phase;
                match step {
                    Step::Event(event) => {
                        state.apply(&event);
                    }
                    Step::Resume => {
                        state.begin_connecting();
                    }
                }
                let after = state.phase;
                // Connecting -> Streaming -> X happens within one fold
                let via_streaming = before == Phase::Connecting
                    && Phase::Streaming.can_transition_to(after);
                prop_assert!(
                    before == after || before.can_transition_to(after) || via_streaming,
                    "illegal {} -> {}", before, after
                );
                prop_assert_eq!(state.pending_approval.is_some(), after == Phase::AwaitingApproval);
                if before.is_terminal() {
                    prop_assert_eq!(before, after);
                }
                if let Some(old) = &thread {
                    prop_assert_eq!(Some(old), state.thread_id.as_ref());
                } else {
                    thread = state.thread_id.clone();
                }
            }
        }
    }
}
