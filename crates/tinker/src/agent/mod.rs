pub mod conversation;
pub mod events;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::TinkerConfig;
use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::{
    CompletionRequest, Message, StopReason, TokenUsage, ToolCall, ToolResult,
};
use crate::tool::{Tool, ToolRegistry};

use self::conversation::Conversation;
use self::events::{EVENT_MAX_PAYLOAD_BYTES, OnEvent, TurnEvent, truncate_for_event};

pub const DEFAULT_MAX_STEPS: usize = 5;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Why a turn stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnFinish {
    /// The model answered without requesting tools.
    Completed,
    /// The step budget ran out while the model was still calling tools.
    StepBudgetExhausted,
    /// The caller cancelled the turn before or during a model call.
    Cancelled,
}

/// Output of one user turn.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    /// Text of the last assistant message of the turn (may be empty).
    pub text: String,
    pub finish: TurnFinish,
    /// Completed tool-dispatch rounds.
    pub steps: usize,
    pub model_calls: usize,
    pub tool_calls_made: usize,
    pub tokens_used: TokenUsage,
    /// Stop reason of the last model response, if any call completed.
    pub stop_reason: Option<StopReason>,
}

/// Runs the tool loop for one user utterance at a time:
/// model call → tool dispatch → repeat, bounded by a step budget.
pub struct AgentRunner<P: LlmProvider> {
    provider: Arc<P>,
    system_prompt: String,
    registry: ToolRegistry,
    max_steps: usize,
    max_tokens: u32,
    on_event: Option<Arc<OnEvent>>,
}

impl<P: LlmProvider> std::fmt::Debug for AgentRunner<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("registry", &self.registry)
            .field("max_steps", &self.max_steps)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

struct TurnState {
    steps: usize,
    model_calls: usize,
    tool_calls_made: usize,
    usage: TokenUsage,
    stop_reason: Option<StopReason>,
    text: String,
}

impl TurnState {
    fn new() -> Self {
        Self {
            steps: 0,
            model_calls: 0,
            tool_calls_made: 0,
            usage: TokenUsage::default(),
            stop_reason: None,
            text: String::new(),
        }
    }

    fn finish(self, finish: TurnFinish) -> TurnOutput {
        TurnOutput {
            text: self.text,
            finish,
            steps: self.steps,
            model_calls: self.model_calls,
            tool_calls_made: self.tool_calls_made,
            tokens_used: self.usage,
            stop_reason: self.stop_reason,
        }
    }
}

impl<P: LlmProvider> AgentRunner<P> {
    pub fn builder(provider: Arc<P>) -> AgentRunnerBuilder<P> {
        AgentRunnerBuilder {
            provider,
            system_prompt: String::new(),
            tools: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: DEFAULT_MAX_TOKENS,
            on_event: None,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run one turn to completion.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
    ) -> Result<TurnOutput, Error> {
        self.run_turn_with_cancel(conversation, user_text, &CancellationToken::new())
            .await
    }

    /// Run one turn, stopping early once `cancel` fires.
    ///
    /// Cancellation is honored before each model call and while one is in
    /// flight; a dispatch round always runs to completion so every tool use
    /// in the log has its result. Errors from the model client abort the
    /// turn and are returned as-is; whatever was appended before stays.
    pub async fn run_turn_with_cancel(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutput, Error> {
        let span = info_span!("conversation.turn", conversation_id = %conversation.id());
        let result = self
            .turn_loop(conversation, user_text, cancel)
            .instrument(span)
            .await;

        match &result {
            Ok(output) => self.emit(TurnEvent::TurnCompleted {
                finish: output.finish,
                model_calls: output.model_calls,
                tool_calls_made: output.tool_calls_made,
                usage: output.tokens_used,
            }),
            Err(e) => {
                warn!(error = %e, "turn aborted");
                self.emit(TurnEvent::TurnFailed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn turn_loop(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutput, Error> {
        conversation.append(Message::user(user_text));
        let mut state = TurnState::new();

        loop {
            if cancel.is_cancelled() {
                info!(steps = state.steps, "turn cancelled");
                return Ok(state.finish(TurnFinish::Cancelled));
            }

            let step = state.steps + 1;
            self.emit(TurnEvent::StepStarted {
                step,
                max_steps: self.max_steps,
            });
            debug!(step, max_steps = self.max_steps, "calling model");

            let request = CompletionRequest {
                system: self.system_prompt.clone(),
                messages: conversation.snapshot(),
                tools: self.registry.definitions().to_vec(),
                max_tokens: self.max_tokens,
            };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(steps = state.steps, "turn cancelled during model call");
                    return Ok(state.finish(TurnFinish::Cancelled));
                }
                response = self.provider.complete(request) => response?,
            };

            state.model_calls += 1;
            state.usage += response.usage;
            state.stop_reason = Some(response.stop_reason);
            if response.stop_reason == StopReason::MaxTokens {
                warn!(step, "model output hit max_tokens");
            }

            let tool_calls = response.tool_calls();
            state.text = response.text();
            self.emit(TurnEvent::ModelResponse {
                step,
                stop_reason: response.stop_reason,
                usage: response.usage,
                tool_call_count: tool_calls.len(),
            });
            if !state.text.is_empty() {
                self.emit(TurnEvent::AssistantText {
                    step,
                    text: state.text.clone(),
                });
            }

            // Empty assistant messages are rejected by the API; keep them out of the log.
            if response.content.is_empty() {
                warn!(step, "model returned no usable content");
                return Ok(state.finish(TurnFinish::Completed));
            }
            conversation.append(Message::assistant(response.content));

            if tool_calls.is_empty() {
                info!(
                    model_calls = state.model_calls,
                    tool_calls = state.tool_calls_made,
                    "turn completed"
                );
                return Ok(state.finish(TurnFinish::Completed));
            }

            let results = self.dispatch_step(&tool_calls).await;
            state.tool_calls_made += tool_calls.len();
            conversation.append(Message::tool_results(results));
            state.steps += 1;

            if state.steps >= self.max_steps {
                info!(max_steps = self.max_steps, "step budget exhausted");
                return Ok(state.finish(TurnFinish::StepBudgetExhausted));
            }
        }
    }

    /// Dispatch every call of one step, in order, one at a time.
    async fn dispatch_step(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            self.emit(TurnEvent::ToolCallStarted {
                tool_name: call.name.clone(),
                tool_call_id: call.id.clone(),
                input: truncate_for_event(&call.input.to_string(), EVENT_MAX_PAYLOAD_BYTES),
            });

            let started = Instant::now();
            let result = self.registry.dispatch(call).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            debug!(
                tool = %call.name,
                is_error = result.is_error,
                duration_ms,
                "tool call finished"
            );

            self.emit(TurnEvent::ToolCallCompleted {
                tool_name: call.name.clone(),
                tool_call_id: call.id.clone(),
                is_error: result.is_error,
                duration_ms,
                output: truncate_for_event(&result.content, EVENT_MAX_PAYLOAD_BYTES),
            });
            results.push(result);
        }
        results
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }
}

pub struct AgentRunnerBuilder<P: LlmProvider> {
    provider: Arc<P>,
    system_prompt: String,
    tools: Vec<Arc<dyn Tool>>,
    max_steps: usize,
    max_tokens: u32,
    on_event: Option<Arc<OnEvent>>,
}

impl<P: LlmProvider> AgentRunnerBuilder<P> {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn on_event(mut self, callback: Arc<OnEvent>) -> Self {
        self.on_event = Some(callback);
        self
    }

    /// Apply the loop settings from a loaded config.
    pub fn config(mut self, config: &TinkerConfig) -> Self {
        self.max_steps = config.agent.max_steps;
        self.max_tokens = config.provider.max_tokens;
        if let Some(prompt) = &config.agent.system_prompt {
            self.system_prompt = prompt.clone();
        }
        self
    }

    pub fn build(self) -> Result<AgentRunner<P>, Error> {
        if self.max_steps == 0 {
            return Err(Error::Config("max_steps must be at least 1".into()));
        }
        if self.max_tokens == 0 {
            return Err(Error::Config("max_tokens must be at least 1".into()));
        }
        let registry = ToolRegistry::new(self.tools)?;

        Ok(AgentRunner {
            provider: self.provider,
            system_prompt: self.system_prompt,
            registry,
            max_steps: self.max_steps,
            max_tokens: self.max_tokens,
            on_event: self.on_event,
        })
    }
}
