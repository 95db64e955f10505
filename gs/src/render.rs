//! Terminal rendering of session snapshots
//!
//! The renderer remembers the last snapshot it saw and turns each new one
//! into the lines that describe what changed.

use colored::*;
use serde_json::Value;
use tracing::debug;

use crate::session::{Phase, SessionState};
use crate::sse::ApprovalRequest;

/// Diffing renderer for [`SessionState`] snapshots
#[derive(Debug, Default)]
pub struct Renderer {
    last: Option<SessionState>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines describing `state` relative to the previous snapshot
    pub fn render(&mut self, state: &SessionState) -> Vec<String> {
        debug!(phase = %state.phase, "render: called");
        let previous = self.last.take().unwrap_or_default();
        let mut lines = Vec::new();

        if state.thread_id != previous.thread_id
            && let Some(id) = &state.thread_id
        {
            lines.push(format!("{} {}", "Thread:".bold(), id.cyan()));
        }

        if state.phase != previous.phase && state.phase.is_live() {
            lines.push(format!("{} {}", "●".blue(), state.phase.to_string().dimmed()));
        }

        if state.status_message != previous.status_message && !state.status_message.is_empty() {
            lines.push(format!("{} {}", "…".dimmed(), state.status_message));
        }

        for (label, now, before) in [
            ("Campaign plan", &state.plan, &previous.plan),
            ("Party", &state.party, &previous.party),
            ("Narrative", &state.narrative, &previous.narrative),
        ] {
            if let Some(value) = now
                && now != before
            {
                lines.extend(artifact_lines(label, value));
            }
        }

        if state.pending_approval != previous.pending_approval
            && let Some(request) = &state.pending_approval
        {
            lines.extend(approval_lines(request));
        }

        if state.phase != previous.phase {
            match state.phase {
                Phase::Complete => lines.push(format!("{} Campaign packet complete", "✓".green())),
                Phase::Failed => lines.push(format!(
                    "{} {}",
                    "✗".red(),
                    state.error_message.as_deref().unwrap_or("Generation failed").red()
                )),
                _ => {}
            }
        }

        self.last = Some(state.clone());
        lines
    }
}

fn artifact_lines(label: &str, value: &Value) -> Vec<String> {
    let mut lines = vec![format!("{} {}", "▸".green(), label.bold())];
    let title = value.get("title").and_then(Value::as_str);
    if let Some(title) = title {
        lines.push(format!("  {}", title.yellow()));
    }
    let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    lines.extend(body.lines().map(|line| format!("  {line}")));
    lines
}

/// Approval prompt with numbered options
pub fn approval_lines(request: &ApprovalRequest) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}",
        "?".yellow().bold(),
        request.prompt.as_deref().unwrap_or("Review the campaign plan")
    )];
    for (i, option) in request.options.iter().enumerate() {
        lines.push(format!("  {}) {}", (i + 1).to_string().cyan(), option.label));
    }
    lines.push(format!(
        "  {}",
        "Enter to approve, a number to pick an option, text to request changes, q to stop".dimmed()
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::ApprovalOption;
    use serde_json::{Map, json};

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_render_only_reports_changes() {
        plain();
        let mut renderer = Renderer::new();
        let mut state = SessionState::new();
        state.begin_connecting();
        assert_eq!(renderer.render(&state), vec!["● connecting".to_string()]);

        state.thread_id = Some("abc123".to_string());
        state.phase = Phase::Streaming;
        state.status_message = "Planning...".to_string();
        let lines = renderer.render(&state);
        assert_eq!(
            lines,
            vec![
                "Thread: abc123".to_string(),
                "● streaming".to_string(),
                "… Planning...".to_string()
            ]
        );

        // Same snapshot again: nothing new
        assert!(renderer.render(&state).is_empty());
    }

    #[test]
    fn test_render_artifact_and_approval() {
        plain();
        let mut renderer = Renderer::new();
        let mut state = SessionState::new();
        state.phase = Phase::Streaming;
        renderer.render(&state);

        state.narrative = Some(json!({"title": "The Sunken Keep"}));
        let lines = renderer.render(&state);
        assert_eq!(lines[0], "▸ Narrative");
        assert_eq!(lines[1], "  The Sunken Keep");

        let mut raw = Map::new();
        raw.insert("action_1_label".to_string(), json!("Approve"));
        raw.insert("action_1_payload".to_string(), json!("approve"));
        state.pending_approval = Some(ApprovalRequest::from_object(raw));
        state.phase = Phase::AwaitingApproval;
        let lines = renderer.render(&state);
        assert_eq!(lines[0], "? Review the campaign plan");
        assert_eq!(lines[1], "  1) Approve");
    }

    #[test]
    fn test_render_hydrated_snapshot_shows_everything() {
        plain();
        let mut state = SessionState::new();
        state.thread_id = Some("t1".to_string());
        state.plan = Some(json!({"acts": 3}));
        let lines = Renderer::new().render(&state);
        assert_eq!(lines[0], "Thread: t1");
        assert_eq!(lines[1], "▸ Campaign plan");
        assert!(lines.iter().any(|l| l.contains("\"acts\": 3")));
    }

    #[test]
    fn test_render_failure() {
        plain();
        let mut renderer = Renderer::new();
        let mut state = SessionState::new();
        state.begin_connecting();
        renderer.render(&state);
        state.fail_transport("HTTP error 500: boom");
        assert_eq!(renderer.render(&state), vec!["✗ HTTP error 500: boom".to_string()]);
    }

    #[test]
    fn test_approval_lines_use_prompt() {
        plain();
        let request = ApprovalRequest {
            prompt: Some("Approve the plan?".to_string()),
            options: vec![ApprovalOption {
                label: "Yes".to_string(),
                payload: "approve".to_string(),
            }],
            raw: Map::new(),
        };
        let lines = approval_lines(&request);
        assert_eq!(lines[0], "? Approve the plan?");
        assert_eq!(lines[1], "  1) Yes");
    }
}
