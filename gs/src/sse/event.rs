//! Typed events of the generation protocol
//!
//! Each wire event type maps to one [`DecodedEvent`] variant:
//!
//! | event type  | payload                                   |
//! |-------------|-------------------------------------------|
//! | `thread_id` | `{"thread_id": "..."}`                    |
//! | `status`    | `{"status": "..."}`                       |
//! | `plan`      | arbitrary JSON                            |
//! | `party`     | arbitrary JSON                            |
//! | `narrative` | arbitrary JSON                            |
//! | `hitl`      | object with `action_N_label/payload` keys |
//! | `error`     | `{"error": "..."}`                        |
//! | `done`      | ignored                                   |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::frame::Frame;

/// Keys checked, in order, for the human-readable approval prompt
const PROMPT_KEYS: [&str; 3] = ["approval_prompt", "prompt", "message"];

/// Event decoded from one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DecodedEvent {
    ThreadAssigned { thread_id: String },
    StatusUpdate { message: String },
    PlanReady { plan: Value },
    PartyReady { party: Value },
    NarrativeReady { narrative: Value },
    ApprovalRequested(ApprovalRequest),
    GenerationFailed { message: String },
    GenerationDone,
}

impl DecodedEvent {
    /// Wire name of the event type this variant came from
    pub fn event_type(&self) -> &'static str {
        match self {
            DecodedEvent::ThreadAssigned { .. } => "thread_id",
            DecodedEvent::StatusUpdate { .. } => "status",
            DecodedEvent::PlanReady { .. } => "plan",
            DecodedEvent::PartyReady { .. } => "party",
            DecodedEvent::NarrativeReady { .. } => "narrative",
            DecodedEvent::ApprovalRequested(_) => "hitl",
            DecodedEvent::GenerationFailed { .. } => "error",
            DecodedEvent::GenerationDone => "done",
        }
    }
}

/// One selectable answer offered at an approval pause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOption {
    pub label: String,
    pub payload: String,
}

/// Pause point asking the user to approve or revise the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub prompt: Option<String>,
    pub options: Vec<ApprovalOption>,
    /// Full payload as received
    pub raw: Map<String, Value>,
}

impl ApprovalRequest {
    /// Build from a `hitl` payload object
    ///
    /// Options are read from `action_1_label`/`action_1_payload`,
    /// `action_2_label`/... until the first index where both keys are absent.
    /// A missing label falls back to the payload and vice versa.
    pub fn from_object(raw: Map<String, Value>) -> Self {
        let mut options = Vec::new();
        for n in 1.. {
            let label = raw.get(&format!("action_{n}_label")).and_then(value_text);
            let payload = raw.get(&format!("action_{n}_payload")).and_then(value_text);
            match (label, payload) {
                (None, None) => break,
                (label, payload) => {
                    let label = label.or_else(|| payload.clone()).unwrap_or_default();
                    let payload = payload.unwrap_or_else(|| label.clone());
                    options.push(ApprovalOption { label, payload });
                }
            }
        }

        let prompt = PROMPT_KEYS
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str))
            .map(str::to_string);

        Self { prompt, options, raw }
    }

    /// Look up any raw payload field as a string
    pub fn field(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[derive(Deserialize)]
struct ThreadIdPayload {
    thread_id: String,
}

#[derive(Deserialize)]
struct StatusPayload {
    status: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: String,
}

/// Map a frame to its typed event
///
/// Returns `None` for unknown event types and for payloads that don't parse;
/// both are logged and never surface as errors. `done` is the exception: its
/// payload carries nothing and is not parsed at all.
pub fn decode(frame: &Frame) -> Option<DecodedEvent> {
    debug!(event_type = %frame.event_type, payload_len = frame.raw_payload.len(), "decode: called");
    let payload = frame.raw_payload.as_str();

    let result = match frame.event_type.as_str() {
        "thread_id" => {
            serde_json::from_str::<ThreadIdPayload>(payload).map(|p| DecodedEvent::ThreadAssigned { thread_id: p.thread_id })
        }
        "status" => serde_json::from_str::<StatusPayload>(payload).map(|p| DecodedEvent::StatusUpdate { message: p.status }),
        "plan" => serde_json::from_str::<Value>(payload).map(|plan| DecodedEvent::PlanReady { plan }),
        "party" => serde_json::from_str::<Value>(payload).map(|party| DecodedEvent::PartyReady { party }),
        "narrative" => serde_json::from_str::<Value>(payload).map(|narrative| DecodedEvent::NarrativeReady { narrative }),
        "hitl" => serde_json::from_str::<Map<String, Value>>(payload)
            .map(|raw| DecodedEvent::ApprovalRequested(ApprovalRequest::from_object(raw))),
        "error" => {
            serde_json::from_str::<ErrorPayload>(payload).map(|p| DecodedEvent::GenerationFailed { message: p.error })
        }
        "done" => return Some(DecodedEvent::GenerationDone),
        other => {
            debug!(event_type = %other, "decode: unknown event type, dropping frame");
            return None;
        }
    };

    match result {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(event_type = %frame.event_type, error = %e, "decode: malformed payload, dropping frame");
            None
        }
    }
}
