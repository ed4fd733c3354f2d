//! Version-control collaborator for verified fixes.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use super::fix::Fix;
use crate::error::HealError;

/// Stages and commits a set of paths
pub trait Committer {
    /// Whether there is anywhere to commit to
    fn available(&self) -> bool {
        true
    }

    fn commit(&mut self, paths: &[PathBuf], message: &str) -> Result<(), HealError>;
}

/// Commit message for a verified fix
pub fn commit_message(fix: &Fix) -> String {
    format!(
        "fix(parser): {}\n\nAuto-generated by self-heal system",
        fix.description
    )
}

/// Runs `git add` and `git commit` in a repository directory
#[derive(Debug, Clone)]
pub struct GitCommitter {
    repo_dir: PathBuf,
}

impl GitCommitter {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    /// Commit from the directory holding `file`
    pub fn for_file(file: &Path) -> Self {
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(dir)
    }

    fn git(&self, args: &[&str]) -> Result<(), HealError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(args)
            .output()
            .map_err(|e| HealError::Commit(format!("failed to run git: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(HealError::Commit(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )))
        }
    }
}

impl Committer for GitCommitter {
    /// The directory must sit inside a git work tree
    fn available(&self) -> bool {
        Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(["rev-parse", "--is-inside-work-tree"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn commit(&mut self, paths: &[PathBuf], message: &str) -> Result<(), HealError> {
        if paths.is_empty() {
            debug!("Nothing to commit");
            return Ok(());
        }

        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut add = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        self.git(&add)?;
        self.git(&["commit", "-m", message])?;

        info!("Committed {} file(s) in {:?}", paths.len(), self.repo_dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heal::fix::Patch;
    use crate::config::{TunableKey, TunableValue};

    #[test]
    fn test_commit_message() {
        let fix = Fix::new(
            "increment_timeout",
            "Increase capture timeout from 20s to 25s",
            vec![Patch::Set {
                key: TunableKey::CaptureTimeoutSecs,
                from: TunableValue::Integer(20),
                to: TunableValue::Integer(25),
            }],
        );
        assert_eq!(
            commit_message(&fix),
            "fix(parser): Increase capture timeout from 20s to 25s\n\nAuto-generated by self-heal system"
        );
    }

    #[test]
    fn test_for_file_uses_parent() {
        let c = GitCommitter::for_file(Path::new("/var/state/tunables.toml"));
        assert_eq!(c.repo_dir, PathBuf::from("/var/state"));
        let c = GitCommitter::for_file(Path::new("tunables.toml"));
        assert_eq!(c.repo_dir, PathBuf::from("."));
    }

    #[test]
    fn test_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tunables.toml");
        std::fs::write(&file, "").unwrap();
        let mut c = GitCommitter::new(dir.path());
        assert!(!c.available());
        // Fails whether or not git is installed
        assert!(matches!(
            c.commit(&[file], "msg"),
            Err(HealError::Commit(_))
        ));
    }
}
