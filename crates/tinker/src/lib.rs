pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod sandbox;
pub mod tool;

pub use agent::conversation::Conversation;
pub use agent::events::{OnEvent, TurnEvent};
pub use agent::{AgentRunner, AgentRunnerBuilder, TurnFinish, TurnOutput};
pub use config::{AgentConfig, ProviderConfig, TinkerConfig};
pub use error::Error;
pub use llm::LlmProvider;
pub use llm::anthropic::AnthropicProvider;
pub use llm::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason, TokenUsage,
    ToolCall, ToolDefinition, ToolResult,
};
pub use sandbox::Sandbox;
pub use tokio_util::sync::CancellationToken;
pub use tool::builtins::{EditFileTool, ListFilesTool, ReadFileTool, builtin_tools};
pub use tool::{Tool, ToolError, ToolOutput, ToolRegistry, validate_tool_input};
