//! Request and response types for the generation server

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::ApiError;

/// Wire literal that approves a paused plan
pub const APPROVE: &str = "approve";

/// User input for a new generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInput {
    pub prompt: String,
    pub difficulty: String,
    pub terrain: String,
    pub requirements: String,
    pub party_name: Option<String>,
    pub party_size: Option<u32>,
}

impl Default for GenerationInput {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            difficulty: "Medium".to_string(),
            terrain: "Forest".to_string(),
            requirements: String::new(),
            party_name: None,
            party_size: None,
        }
    }
}

/// What to do with a paused plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeAction {
    Approve,
    /// Free text or a suggested option's payload describing a plan revision
    Revise(String),
}

impl ResumeAction {
    /// Value sent as `resume_action`
    pub fn as_wire(&self) -> &str {
        match self {
            ResumeAction::Approve => APPROVE,
            ResumeAction::Revise(text) => text,
        }
    }
}

impl From<&str> for ResumeAction {
    fn from(value: &str) -> Self {
        if value == APPROVE {
            ResumeAction::Approve
        } else {
            ResumeAction::Revise(value.to_string())
        }
    }
}

/// Body of `POST /generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub difficulty: String,
    pub terrain: String,
    pub requirements: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_size: Option<u32>,
}

impl GenerateRequest {
    /// Request for a brand new generation
    pub fn start(input: &GenerationInput) -> Self {
        Self {
            prompt: input.prompt.clone(),
            difficulty: input.difficulty.clone(),
            terrain: input.terrain.clone(),
            requirements: input.requirements.clone(),
            thread_id: None,
            resume_action: None,
            party_name: input.party_name.clone(),
            party_size: input.party_size,
        }
    }

    /// Request continuing `thread_id`, carrying the original input fields
    pub fn resume(input: &GenerationInput, thread_id: &str, action: &ResumeAction) -> Self {
        Self {
            thread_id: Some(thread_id.to_string()),
            resume_action: Some(action.as_wire().to_string()),
            ..Self::start(input)
        }
    }
}

/// One line of the campaign chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Response of `POST /threads/{id}/chat`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub chat_messages: Vec<ChatMessage>,
}

/// Entry of `GET /threads`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub is_archived: bool,
}

/// Response of `PATCH /threads/{id}/archive`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArchiveResponse {
    pub is_archived: bool,
}

/// Stored artifacts of one thread, as returned by `GET /threads/{id}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadSnapshot {
    pub plan: Option<Value>,
    pub party: Option<Value>,
    pub narrative: Option<Value>,
    pub chat_messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadHistory {
    #[serde(default)]
    messages: Vec<HistoryEntry>,
    #[serde(default)]
    chat_messages: Vec<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

impl ThreadSnapshot {
    /// Rebuild a snapshot from the thread history body
    ///
    /// Each history entry's `output` is a JSON-encoded object keyed by the
    /// artifact it holds: `campaign_plan`, `party_details`, or a narrative
    /// object carrying `title`. Entries that don't decode are skipped.
    pub fn from_history(body: Value) -> Result<Self, ApiError> {
        let history: ThreadHistory = serde_json::from_value(body)?;
        if let Some(error) = history.error {
            debug!(%error, "from_history: server reported error");
            return Err(ApiError::Server(error));
        }

        let mut snapshot = ThreadSnapshot {
            chat_messages: history.chat_messages,
            ..Default::default()
        };

        for output in history.messages.into_iter().filter_map(|m| m.output) {
            let object = match serde_json::from_str::<Map<String, Value>>(&output) {
                Ok(object) => object,
                Err(e) => {
                    warn!(error = %e, "from_history: undecodable history entry, skipping");
                    continue;
                }
            };

            if let Some(plan) = object.get("campaign_plan") {
                snapshot.plan = non_null(plan);
            } else if let Some(party) = object.get("party_details") {
                snapshot.party = non_null(party);
            } else if object.contains_key("title") {
                snapshot.narrative = Some(Value::Object(object));
            }
        }

        debug!(
            has_plan = snapshot.plan.is_some(),
            has_party = snapshot.party.is_some(),
            has_narrative = snapshot.narrative.is_some(),
            chat_len = snapshot.chat_messages.len(),
            "from_history: done"
        );
        Ok(snapshot)
    }
}

fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}
