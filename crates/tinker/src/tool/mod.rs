pub mod builtins;
pub mod registry;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::llm::types::ToolDefinition;

pub use registry::ToolRegistry;

/// Failure of a single tool call.
///
/// None of these abort a turn: the registry turns them into an error
/// `ToolResult` and the model sees the display string.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("path '{0}' escapes the working directory")]
    SandboxViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is a directory, not a file")]
    IsADirectory(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("old_str not found in {0}")]
    NoMatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait for tools the model can invoke.
///
/// Uses `Pin<Box<dyn Future>>` return type for dyn-compatibility,
/// allowing tools to be stored as `Arc<dyn Tool>`.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>>;
}

/// Validate tool input against the tool's declared JSON Schema.
///
/// Returns `Ok(())` if valid, `Err(error_message)` if the input
/// does not conform. The error message is suitable for sending back
/// to the model so it can self-correct.
pub fn validate_tool_input(
    schema: &serde_json::Value,
    input: &serde_json::Value,
) -> Result<(), String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "invalid tool schema, skipping validation");
            return Ok(());
        }
    };

    let errors: Vec<String> = validator
        .iter_errors(input)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Input validation failed: {}", errors.join("; ")))
    }
}

/// Pull a string field out of a tool input object.
pub(crate) fn str_arg<'a>(input: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArgument(format!("{key} is required")))
}
