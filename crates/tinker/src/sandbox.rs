use std::path::{Component, Path, PathBuf};

use crate::Error;
use crate::tool::ToolError;

/// The directory subtree the file tools are confined to.
///
/// The root is canonicalized once at construction and never changes. Every
/// path handed to a tool goes through [`Sandbox::resolve`] before any
/// filesystem access happens.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Open a sandbox rooted at an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        let root = root.canonicalize().map_err(|e| {
            Error::Config(format!(
                "failed to canonicalize sandbox root {}: {e}",
                root.display()
            ))
        })?;
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "sandbox root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Open a sandbox rooted at the process working directory.
    pub fn current_dir() -> Result<Self, Error> {
        Self::open(std::env::current_dir()?)
    }

    /// The absolute path to the sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool path argument to an absolute path inside the root.
    ///
    /// Relative paths are joined onto the root; `.` and `..` are folded
    /// lexically so the target does not need to exist. Absolute paths are
    /// accepted only when they already point inside the root. Every existing
    /// component that is a symlink must canonicalize to a path inside the
    /// root; dangling links are rejected since writing through them would
    /// create their target.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let p = Path::new(path);
        let candidate = if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        };
        let normalized = normalize_path(&candidate);

        if !normalized.starts_with(&self.root) {
            return Err(ToolError::SandboxViolation(path.to_string()));
        }

        if links_outside(&self.root, &normalized) {
            return Err(ToolError::SandboxViolation(path.to_string()));
        }

        Ok(normalized)
    }
}

/// Walk `path` down from `root` and report whether any existing symlink on
/// the way is dangling or resolves outside `root`.
fn links_outside(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return true;
    };

    let mut current = root.to_path_buf();
    for component in rel.components() {
        current.push(component);
        let Ok(meta) = std::fs::symlink_metadata(&current) else {
            // Nothing below a missing component exists either.
            return false;
        };
        if meta.file_type().is_symlink() {
            match current.canonicalize() {
                Ok(real) if real.starts_with(root) => {}
                _ => return true,
            }
        }
    }
    false
}

/// Normalize a path by folding `.` and `..` components without touching
/// the filesystem. `canonicalize()` needs the path to exist, and edits may
/// target files that don't exist yet.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // At the filesystem root `..` stays put.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}
