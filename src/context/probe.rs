use crate::context::OperationContext;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Fills unspecified context attributes from the working directory's git repository
#[derive(Debug)]
pub struct ContextProbe {
    repo_root: Option<PathBuf>,
    work_dir: PathBuf,
}

impl ContextProbe {
    /// Probe starting from the current working directory
    pub fn discover() -> std::io::Result<Self> {
        let current_dir = env::current_dir()?;
        Ok(Self::discover_from(current_dir))
    }

    /// Probe starting from a specific directory, walking up to find `.git`
    pub fn discover_from<P: AsRef<Path>>(start_path: P) -> Self {
        let work_dir = start_path.as_ref().to_path_buf();
        let mut current = work_dir.clone();

        let repo_root = loop {
            if current.join(".git").exists() {
                break Some(current);
            }
            if !current.pop() {
                break None;
            }
        };

        Self { repo_root, work_dir }
    }

    /// Root of the enclosing git repository, if any
    pub fn repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }

    /// Name shown on the approval page: the repository directory, else the working directory
    pub fn project_name(&self) -> String {
        self.repo_root
            .as_deref()
            .unwrap_or(&self.work_dir)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Detect branch, upstream remote and user. Failures leave attributes empty.
    pub fn detect(&self) -> OperationContext {
        let branch = self.current_branch().unwrap_or_default();
        let remote = if branch.is_empty() {
            String::new()
        } else {
            self.upstream_remote(&branch).unwrap_or_default()
        };
        let user = env::var("USER").unwrap_or_default();

        tracing::debug!(%branch, %remote, %user, "detected operation context");
        OperationContext { branch, remote, user }
    }

    fn current_branch(&self) -> Option<String> {
        // Detached HEAD prints nothing
        self.git(&["branch", "--show-current"])
    }

    fn upstream_remote(&self, branch: &str) -> Option<String> {
        let key = format!("branch.{}.remote", branch);
        self.git(&["config", "--get", &key])
    }

    fn git(&self, args: &[&str]) -> Option<String> {
        let repo = self.repo_root.as_ref()?;
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() { None } else { Some(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path().join("shop");
        std::fs::create_dir_all(&repo_path).unwrap();

        Command::new("git")
            .args(["init", "-b", "main"])
            .current_dir(&repo_path)
            .output()
            .unwrap();

        Command::new("git")
            .args(["config", "branch.main.remote", "origin"])
            .current_dir(&repo_path)
            .output()
            .unwrap();

        (temp_dir, repo_path)
    }

    #[test]
    fn test_discover_from_nested_dir() {
        let (_temp, repo_path) = create_test_repo();
        let nested = repo_path.join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let probe = ContextProbe::discover_from(&nested);
        assert_eq!(probe.repo_root(), Some(repo_path.as_path()));
        assert_eq!(probe.project_name(), "shop");
    }

    #[test]
    fn test_outside_repo_uses_work_dir_name() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("notes");
        std::fs::create_dir_all(&plain).unwrap();

        let probe = ContextProbe::discover_from(&plain);
        assert!(probe.repo_root().is_none());
        assert_eq!(probe.project_name(), "notes");

        let ctx = probe.detect();
        assert!(ctx.branch.is_empty());
        assert!(ctx.remote.is_empty());
    }

    #[test]
    fn test_detect_branch_and_remote() {
        let (_temp, repo_path) = create_test_repo();

        // Skip quietly when git is unavailable or too old for `init -b`
        let probe = ContextProbe::discover_from(&repo_path);
        let ctx = probe.detect();
        if ctx.branch.is_empty() {
            return;
        }

        assert_eq!(ctx.branch, "main");
        assert_eq!(ctx.remote, "origin");
    }
}
