use serde::{Deserialize, Serialize};

use crate::llm::types::{StopReason, TokenUsage};

use super::TurnFinish;

/// Maximum byte size for event payload strings (tool I/O).
pub(crate) const EVENT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Truncate a string for event payloads. Short strings (≤ `max_bytes`) pass
/// through unchanged. Long strings are cut at a UTF-8 char boundary with a
/// `[truncated: N bytes omitted]` suffix appended.
pub(crate) fn truncate_for_event(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let omitted = text.len() - cut;
    format!("{}[truncated: {omitted} bytes omitted]", &text[..cut])
}

/// Structured events emitted while a turn runs.
///
/// Emitted synchronously via the `OnEvent` callback; keep handlers fast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A model call is about to be issued.
    StepStarted { step: usize, max_steps: usize },

    /// A model call returned.
    ModelResponse {
        step: usize,
        stop_reason: StopReason,
        usage: TokenUsage,
        tool_call_count: usize,
    },

    /// Text the model produced in this step. Not truncated.
    AssistantText { step: usize, text: String },

    /// Tool execution started.
    ToolCallStarted {
        tool_name: String,
        tool_call_id: String,
        /// Truncated JSON string of tool input.
        input: String,
    },

    /// Tool execution completed.
    ToolCallCompleted {
        tool_name: String,
        tool_call_id: String,
        is_error: bool,
        duration_ms: u64,
        /// Truncated tool output content.
        output: String,
    },

    /// The turn ended normally (including budget exhaustion or cancellation).
    TurnCompleted {
        finish: TurnFinish,
        model_calls: usize,
        tool_calls_made: usize,
        usage: TokenUsage,
    },

    /// The turn was aborted by a transport error.
    TurnFailed { error: String },
}

/// Callback type for receiving turn events.
pub type OnEvent = dyn Fn(TurnEvent) + Send + Sync;
