use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::llm::types::ToolDefinition;
use crate::sandbox::Sandbox;
use crate::tool::{Tool, ToolError, ToolOutput, str_arg};

use super::display_path;

pub struct EditFileTool {
    sandbox: Arc<Sandbox>,
}

impl EditFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

impl Tool for EditFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "edit_file".into(),
            description: "Make edits to a text file. Replaces every occurrence of 'old_str' \
                          with 'new_str' in the given file. 'old_str' and 'new_str' must differ. \
                          If the file doesn't exist and old_str is empty, a new file is created \
                          with new_str as its content."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative file path."
                    },
                    "old_str": {
                        "type": "string",
                        "description": "Exact text to replace. Leave empty when creating a new file."
                    },
                    "new_str": {
                        "type": "string",
                        "description": "Replacement text. Must differ from old_str."
                    }
                },
                "required": ["path", "old_str", "new_str"]
            }),
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let path = str_arg(&input, "path")?;
            let old_str = str_arg(&input, "old_str")?;
            let new_str = str_arg(&input, "new_str")?;

            if path.is_empty() {
                return Err(ToolError::InvalidArgument("path must not be empty".into()));
            }
            if old_str == new_str {
                return Err(ToolError::InvalidArgument(
                    "old_str and new_str are identical".into(),
                ));
            }

            let abs = self.sandbox.resolve(path)?;
            let shown = display_path(&self.sandbox, &abs);

            let content = match tokio::fs::read(&abs).await {
                Ok(bytes) => String::from_utf8(bytes).map_err(|_| {
                    ToolError::InvalidArgument(format!("{shown} is not valid UTF-8 text"))
                })?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if !old_str.is_empty() {
                        return Err(ToolError::NotFound(format!(
                            "{shown} (to create a file, pass an empty old_str)"
                        )));
                    }
                    if let Some(parent) = abs.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    // create_new never follows a link that appeared after resolve.
                    let mut file = tokio::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(&abs)
                        .await?;
                    file.write_all(new_str.as_bytes()).await?;
                    file.flush().await?;
                    debug!(path = %shown, bytes = new_str.len(), "created file");
                    return Ok(ToolOutput::success(format!("Created {shown}")));
                }
                Err(e) if abs.is_dir() => {
                    debug!(error = %e, "edit target is a directory");
                    return Err(ToolError::IsADirectory(shown));
                }
                Err(e) => return Err(e.into()),
            };

            // An empty old_str only means something for files that don't exist.
            if old_str.is_empty() {
                return Ok(ToolOutput::success(format!(
                    "Updated {shown} (0 replacements)"
                )));
            }

            let count = content.matches(old_str).count();
            if count == 0 {
                return Err(ToolError::NoMatch(shown));
            }

            let replaced = content.replace(old_str, new_str);
            write_atomic(&abs, replaced.as_bytes()).await?;
            debug!(path = %shown, replacements = count, "updated file");

            Ok(ToolOutput::success(format!(
                "Updated {shown} ({count} replacement{})",
                if count == 1 { "" } else { "s" }
            )))
        })
    }
}

/// Replace `path` by writing a sibling temp file and renaming it over the
/// original, so a failed write never leaves a truncated file behind.
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    // Rename onto the real file, not onto an in-root link pointing at it.
    let target = tokio::fs::canonicalize(path).await?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{name}.tinker-tmp"));

    let result = async {
        tokio::fs::write(&tmp, contents).await?;
        let permissions = tokio::fs::metadata(&target).await?.permissions();
        tokio::fs::set_permissions(&tmp, permissions).await?;
        tokio::fs::rename(&tmp, &target).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}
