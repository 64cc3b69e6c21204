use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde_json::json;
use tracing::{debug, warn};

use crate::llm::types::ToolDefinition;
use crate::sandbox::Sandbox;
use crate::tool::{Tool, ToolError, ToolOutput};

use super::display_path;

const IGNORE_FILE: &str = ".gitignore";
const MAX_ENTRIES: usize = 1000;
const MAX_DEPTH: usize = 20;

pub struct ListFilesTool {
    sandbox: Arc<Sandbox>,
}

impl ListFilesTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

impl Tool for ListFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_files".into(),
            description: "List files and directories at a given path, recursively. \
                          If no path is provided, lists files in the current directory. \
                          Directories end with '/'. Entries matched by the root .gitignore \
                          are skipped. Stops after 1000 entries."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Optional relative path to list files from. Defaults to current directory if not provided."
                    }
                }
            }),
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let path = input
                .get("path")
                .and_then(|v| v.as_str())
                .filter(|p| !p.is_empty())
                .unwrap_or(".");

            let dir = self.sandbox.resolve(path)?;
            if !dir.exists() {
                return Err(ToolError::NotFound(path.to_string()));
            }
            if !dir.is_dir() {
                return Err(ToolError::InvalidArgument(format!(
                    "{} is not a directory",
                    display_path(&self.sandbox, &dir)
                )));
            }

            let ignore = load_ignore(self.sandbox.root());
            let entries = tokio::task::spawn_blocking(move || {
                let mut listing = Listing::new(MAX_ENTRIES);
                walk(&dir, &dir, &ignore, &mut listing, 0);
                listing.finish()
            })
            .await
            .map_err(|e| std::io::Error::other(format!("list task failed: {e}")))?;

            debug!(path, entries = entries.len(), "listed files");
            let json = serde_json::to_string(&entries)
                .map_err(|e| std::io::Error::other(format!("cannot encode listing: {e}")))?;
            Ok(ToolOutput::success(json))
        })
    }
}

/// Load the root ignore file, best-effort.
///
/// A missing file means no filtering. Lines that fail to parse are dropped
/// and the rest still apply.
fn load_ignore(root: &Path) -> Gitignore {
    let file = root.join(IGNORE_FILE);
    if !file.is_file() {
        return Gitignore::empty();
    }

    let mut builder = GitignoreBuilder::new(root);
    if let Some(e) = builder.add(&file) {
        warn!(error = %e, "ignore file partially loaded");
    }
    match builder.build() {
        Ok(gi) => gi,
        Err(e) => {
            warn!(error = %e, "ignore file unusable, listing without it");
            Gitignore::empty()
        }
    }
}

/// Entries collected so far, capped at `max_entries`.
struct Listing {
    entries: Vec<String>,
    max_entries: usize,
    truncated: bool,
}

impl Listing {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            truncated: false,
        }
    }

    fn push(&mut self, entry: String) -> bool {
        if self.entries.len() >= self.max_entries {
            self.truncated = true;
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// The final array; a cut-off listing ends with a marker entry.
    fn finish(mut self) -> Vec<String> {
        if self.truncated {
            self.entries.push(format!(
                "... (listing truncated at {} entries)",
                self.max_entries
            ));
        }
        self.entries
    }
}

/// Depth-first walk in name order. Ignored directories are not entered,
/// nor anything deeper than `MAX_DEPTH`. Symlinks are reported as plain
/// entries and never followed.
fn walk(base: &Path, dir: &Path, ignore: &Gitignore, out: &mut Listing, depth: usize) {
    if out.truncated || depth >= MAX_DEPTH {
        return;
    }
    let mut entries: Vec<(PathBuf, bool)> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| {
                let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
                (e.path(), is_dir)
            })
            .collect(),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };
    entries.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

    for (path, is_dir) in entries {
        if ignore.matched(&path, is_dir).is_ignore() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(base) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if is_dir {
            if !out.push(format!("{rel}/")) {
                return;
            }
            walk(base, &path, ignore, out, depth + 1);
        } else if !out.push(rel) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, ListFilesTool) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::open(dir.path()).unwrap());
        (dir, ListFilesTool::new(sandbox))
    }

    async fn list(tool: &ListFilesTool, input: serde_json::Value) -> Vec<String> {
        let output = tool.execute(input).await.unwrap();
        assert!(!output.is_error);
        serde_json::from_str(&output.content).unwrap()
    }

    #[test]
    fn definition_has_correct_name() {
        let (_dir, tool) = setup();
        let def = tool.definition();
        assert_eq!(def.name, "list_files");
        assert!(def.input_schema.get("required").is_none());
    }

    #[tokio::test]
    async fn lists_recursively_with_dir_markers() {
        let (dir, tool) = setup();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("sub/c.rs"), "").unwrap();
        std::fs::write(dir.path().join("sub/deeper/d.md"), "").unwrap();

        let entries = list(&tool, json!({})).await;
        assert_eq!(
            entries,
            vec!["a.rs", "b.txt", "sub/", "sub/c.rs", "sub/deeper/", "sub/deeper/d.md"]
        );
    }

    #[tokio::test]
    async fn lists_subdirectory_relative_to_itself() {
        let (dir, tool) = setup();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.rs"), "").unwrap();
        std::fs::write(dir.path().join("top.rs"), "").unwrap();

        let entries = list(&tool, json!({"path": "sub"})).await;
        assert_eq!(entries, vec!["c.rs"]);
    }

    #[tokio::test]
    async fn honors_root_gitignore() {
        let (dir, tool) = setup();
        std::fs::write(dir.path().join(".gitignore"), "target/\n*.log\n").unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/out.bin"), "").unwrap();
        std::fs::write(dir.path().join("keep.rs"), "").unwrap();
        std::fs::write(dir.path().join("skip.log"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/trace.log"), "").unwrap();

        let entries = list(&tool, json!({})).await;
        assert_eq!(entries, vec![".gitignore", "keep.rs", "src/"]);
    }

    #[tokio::test]
    async fn gitignore_applies_when_listing_subdirectory() {
        let (dir, tool) = setup();
        std::fs::write(dir.path().join(".gitignore"), "/src/gen/\n").unwrap();
        std::fs::create_dir_all(dir.path().join("src/gen")).unwrap();
        std::fs::write(dir.path().join("src/gen/x.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();

        let entries = list(&tool, json!({"path": "src"})).await;
        assert_eq!(entries, vec!["lib.rs"]);
    }

    #[tokio::test]
    async fn missing_gitignore_lists_everything() {
        let (dir, tool) = setup();
        std::fs::write(dir.path().join("debug.log"), "").unwrap();
        let entries = list(&tool, json!({})).await;
        assert_eq!(entries, vec!["debug.log"]);
    }

    #[tokio::test]
    async fn malformed_gitignore_does_not_fail() {
        let (dir, tool) = setup();
        std::fs::write(dir.path().join(".gitignore"), "[unclosed\n*.tmp\n").unwrap();
        std::fs::write(dir.path().join("a.tmp"), "").unwrap();
        std::fs::write(dir.path().join("b.rs"), "").unwrap();

        let entries = list(&tool, json!({})).await;
        assert!(entries.contains(&"b.rs".to_string()));
        assert!(!entries.contains(&"a.tmp".to_string()));
    }

    #[tokio::test]
    async fn empty_directory_is_empty_array() {
        let (_dir, tool) = setup();
        let output = tool.execute(json!({"path": "."})).await.unwrap();
        assert_eq!(output.content, "[]");
    }

    #[tokio::test]
    async fn rejects_escape() {
        let (_dir, tool) = setup();
        let err = tool
            .execute(json!({"path": "../../etc"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation(_)));
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let (_dir, tool) = setup();
        let err = tool.execute(json!({"path": "nope"})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn file_is_not_a_directory() {
        let (dir, tool) = setup();
        std::fs::write(dir.path().join("file.txt"), "content").unwrap();
        let err = tool
            .execute(json!({"path": "file.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"), "got: {err}");
    }

    #[test]
    fn walk_stops_at_entry_cap_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let mut listing = Listing::new(3);
        walk(dir.path(), dir.path(), &Gitignore::empty(), &mut listing, 0);

        assert_eq!(
            listing.finish(),
            vec!["a", "b", "c", "... (listing truncated at 3 entries)"]
        );
    }

    #[test]
    fn walk_under_cap_has_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "").unwrap();
        let mut listing = Listing::new(1);
        walk(dir.path(), dir.path(), &Gitignore::empty(), &mut listing, 0);
        assert_eq!(listing.finish(), vec!["a"]);
    }

    #[test]
    fn walk_does_not_descend_past_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        let mut deep = dir.path().to_path_buf();
        for _ in 0..MAX_DEPTH + 2 {
            deep.push("d");
        }
        std::fs::create_dir_all(&deep).unwrap();

        let mut listing = Listing::new(MAX_ENTRIES);
        walk(dir.path(), dir.path(), &Gitignore::empty(), &mut listing, 0);
        let entries = listing.finish();
        assert_eq!(entries.len(), MAX_DEPTH);
        assert_eq!(entries.last().unwrap(), &format!("{}/", vec!["d"; MAX_DEPTH].join("/")));
    }
}
