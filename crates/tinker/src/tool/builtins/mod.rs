mod edit;
mod list;
mod read;

use std::sync::Arc;

use crate::sandbox::Sandbox;
use crate::tool::Tool;

pub use edit::EditFileTool;
pub use list::ListFilesTool;
pub use read::ReadFileTool;

/// Create the file tools, all confined to `sandbox`.
///
/// Returns a `Vec<Arc<dyn Tool>>` ready to pass to `ToolRegistry::new()`.
pub fn builtin_tools(sandbox: Arc<Sandbox>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListFilesTool::new(sandbox.clone())),
        Arc::new(ReadFileTool::new(sandbox.clone())),
        Arc::new(EditFileTool::new(sandbox)),
    ]
}

/// Render an absolute in-sandbox path the way the model referred to it.
pub(crate) fn display_path(sandbox: &Sandbox, path: &std::path::Path) -> String {
    match path.strip_prefix(sandbox.root()) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".into(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
