use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::Error;
use crate::llm::types::{ToolCall, ToolDefinition, ToolResult};
use crate::tool::{Tool, ToolOutput, validate_tool_input};

/// Immutable name → tool mapping, and the only place tool faults are caught.
///
/// Built once from a list of tools; duplicate names are rejected at
/// construction. [`ToolRegistry::dispatch`] never fails: unknown names,
/// schema violations, tool errors and panics all come back as an error
/// [`ToolResult`] carrying the originating call id.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    defs: Vec<ToolDefinition>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self.defs.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self, Error> {
        let mut map = HashMap::with_capacity(tools.len());
        let mut defs = Vec::with_capacity(tools.len());
        for tool in tools {
            let def = tool.definition();
            if def.name.is_empty() {
                return Err(Error::Config("tool name must not be empty".into()));
            }
            if map.contains_key(&def.name) {
                return Err(Error::Config(format!(
                    "duplicate tool name '{}'",
                    def.name
                )));
            }
            map.insert(def.name.clone(), tool);
            defs.push(def);
        }
        Ok(Self { tools: map, defs })
    }

    /// Tool manifest in registration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.defs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Execute one tool call and turn whatever happens into a result.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "model called unknown tool");
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };

        let def = tool.definition();
        if let Err(msg) = validate_tool_input(&def.input_schema, &call.input) {
            debug!(tool = %call.name, error = %msg, "tool input rejected");
            return ToolResult::error(&call.id, msg);
        }

        let outcome = AssertUnwindSafe(tool.execute(call.input.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => tool_output_to_result(&call.id, output),
            Ok(Err(e)) => {
                debug!(tool = %call.name, error = %e, "tool call failed");
                ToolResult::error(&call.id, e.to_string())
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                tracing::error!(tool = %call.name, panic = %msg, "tool panicked");
                ToolResult::error(&call.id, format!("Tool {} panicked: {msg}", call.name))
            }
        }
    }

    /// Dispatch calls one after another, returning results in call order.
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch(call).await);
        }
        results
    }
}

fn tool_output_to_result(tool_use_id: &str, output: ToolOutput) -> ToolResult {
    if output.is_error {
        ToolResult::error(tool_use_id, output.content)
    } else {
        ToolResult::success(tool_use_id, output.content)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
