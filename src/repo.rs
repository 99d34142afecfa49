use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::CONFIG_FILENAME;

/// Find the repository root by walking up from `start`.
/// A directory counts as the root when it holds `.git` or a hookstage config.
/// Falls back to asking git, then to `None`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(".git").exists() || current.join(CONFIG_FILENAME).is_file() {
            return Some(current);
        }

        if !current.pop() {
            break;
        }
    }

    get_git_root(start)
}

/// Resolve where hooks really live for a configured `.git/...` hooks dir.
/// In a linked worktree `.git` is a file pointing elsewhere, so git itself is
/// asked for the hooks path; any other configuration is returned unchanged.
pub fn resolve_hooks_dir(root: &Path, configured: &Path) -> PathBuf {
    if !configured.starts_with(".git") || !root.join(".git").is_file() {
        return configured.to_path_buf();
    }

    match get_git_path(root, "hooks") {
        Some(path) => {
            tracing::debug!(hooks_dir = %path.display(), "worktree hooks directory");
            path
        }
        None => configured.to_path_buf(),
    }
}

/// `git rev-parse --git-path <name>`, made absolute against `cwd`
fn get_git_path(cwd: &Path, name: &str) -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--git-path", name])
        .current_dir(cwd)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout);
    let path = path.trim();
    if path.is_empty() {
        None
    } else {
        Some(cwd.join(path))
    }
}

/// Get the git repository root directory.
fn get_git_root(cwd: &Path) -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(cwd)
        .output()
        .ok()?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let path = path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    } else {
        None
    }
}
