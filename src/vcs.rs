//! Version-control collaborator for goal inference.
//!
//! The builder asks this interface for staged/working file lists and
//! diffs when the caller supplies no goal. Paths coming back from git
//! are validated: anything containing a newline or NUL byte is
//! rejected rather than passed on.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::VcsError;

/// Source of change information for goal inference.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Paths staged for commit.
    async fn staged_files(&self) -> Result<Vec<String>, VcsError>;

    /// Paths modified in the working tree.
    async fn working_files(&self) -> Result<Vec<String>, VcsError>;

    /// Diff of staged changes.
    async fn staged_diff(&self) -> Result<String, VcsError>;

    /// Diff of working-tree changes.
    async fn working_diff(&self) -> Result<String, VcsError>;
}

/// Git-backed change source. Invokes `git` directly with a fixed
/// argv; no shell interpolation anywhere.
#[derive(Debug, Clone)]
pub struct GitChanges {
    root: PathBuf,
}

impl GitChanges {
    /// Creates a change source rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, VcsError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| VcsError::Command {
                subcommand: args.first().unwrap_or(&"").to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(VcsError::Command {
                subcommand: args.first().unwrap_or(&"").to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Splits NUL-delimited path output, validating each entry.
    fn parse_paths(raw: &[u8]) -> Result<Vec<String>, VcsError> {
        raw.split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| validate_path(&String::from_utf8_lossy(s)))
            .collect()
    }
}

/// Rejects paths containing newline or NUL bytes.
fn validate_path(path: &str) -> Result<String, VcsError> {
    if path.contains('\n') || path.contains('\0') {
        return Err(VcsError::UnsafePath {
            path: path.escape_default().to_string(),
        });
    }
    Ok(path.to_string())
}

#[async_trait]
impl ChangeSource for GitChanges {
    async fn staged_files(&self) -> Result<Vec<String>, VcsError> {
        let raw = self
            .run(&["diff", "--cached", "--name-only", "-z"])
            .await?;
        Self::parse_paths(&raw)
    }

    async fn working_files(&self) -> Result<Vec<String>, VcsError> {
        let raw = self.run(&["diff", "--name-only", "-z"]).await?;
        Self::parse_paths(&raw)
    }

    async fn staged_diff(&self) -> Result<String, VcsError> {
        let raw = self.run(&["diff", "--cached"]).await?;
        Ok(String::from_utf8_lossy(&raw).to_string())
    }

    async fn working_diff(&self) -> Result<String, VcsError> {
        let raw = self.run(&["diff"]).await?;
        Ok(String::from_utf8_lossy(&raw).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_accepts_normal() {
        assert!(validate_path("src/app.ts").is_ok());
        assert!(validate_path("dir with space/file.py").is_ok());
    }

    #[test]
    fn test_validate_path_rejects_newline_and_nul() {
        assert!(matches!(
            validate_path("evil\npath"),
            Err(VcsError::UnsafePath { .. })
        ));
        assert!(matches!(
            validate_path("evil\0path"),
            Err(VcsError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_parse_paths_splits_on_nul() {
        let raw = b"a.ts\0b/c.ts\0";
        let paths = GitChanges::parse_paths(raw).unwrap_or_default();
        assert_eq!(paths, vec!["a.ts", "b/c.ts"]);
    }

    #[tokio::test]
    async fn test_non_repo_reports_command_error() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => return,
        };
        let git = GitChanges::new(dir.path().to_path_buf());
        // Either git is absent or the directory is not a repository;
        // both must surface as a Command error, never a panic.
        let result = git.staged_files().await;
        assert!(matches!(result, Err(VcsError::Command { .. })));
    }
}
