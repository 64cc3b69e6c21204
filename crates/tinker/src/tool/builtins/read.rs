use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::llm::types::ToolDefinition;
use crate::sandbox::Sandbox;
use crate::tool::{Tool, ToolError, ToolOutput, str_arg};

use super::display_path;

pub struct ReadFileTool {
    sandbox: Arc<Sandbox>,
}

impl ReadFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read the contents of a given relative file path. Use it to inspect \
                          a file. Do not pass directory names."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path of a file inside the current working directory"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let path = str_arg(&input, "path")?;
            let abs = self.sandbox.resolve(path)?;

            let metadata = match tokio::fs::metadata(&abs).await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ToolError::NotFound(path.to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            if metadata.is_dir() {
                return Err(ToolError::IsADirectory(display_path(&self.sandbox, &abs)));
            }

            let content = tokio::fs::read(&abs).await?;
            Ok(ToolOutput::success(String::from_utf8_lossy(&content)))
        })
    }
}
