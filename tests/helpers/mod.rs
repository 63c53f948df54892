#![allow(dead_code)]

use async_trait::async_trait;
use guardian::approval::{ApprovalServer, ApprovalSession, MethodRegistry};
use guardian::exec::{CommandRunner, ExecError};
use guardian::{Guard, GrantStore, GuardianHome, Policy, PolicyStore, Reporter, RuntimeFlags};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create an isolated guardian home
pub fn create_test_home() -> (TempDir, GuardianHome) {
    let temp_dir = TempDir::new().unwrap();
    let home = GuardianHome::at(temp_dir.path());
    (temp_dir, home)
}

/// Helper to write a policy file into `home`
pub fn write_policies(home: &GuardianHome, contents: &str) -> PathBuf {
    let path = home.policy_path();
    fs::create_dir_all(home.root()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

/// Helper to create a test git repository on branch `main`
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    Command::new("git")
        .args(["init", "-b", "main"])
        .current_dir(&repo_path)
        .output()
        .expect("Failed to init git repo");

    (temp_dir, repo_path)
}

/// Policy store used by most scenarios
pub fn protect_main() -> PolicyStore {
    PolicyStore::from_toml_str(
        r#"
[[policies."git.push"]]
name = "protect-main"
expires = "10m"

[policies."git.push".conditions]
branch = "main"
remote = "origin"
"#,
    )
    .unwrap()
}

/// Session for driving an approval server directly
pub fn session(expires: Duration) -> ApprovalSession {
    let policy = Arc::new(Policy::new("git", "push").with_name("protect-main").with_expires(expires));
    let args = vec!["git".to_string(), "push".to_string(), "origin".to_string(), "main".to_string()];
    ApprovalSession::new("git", "push", policy, "ship release 1.4", "storefront", &args)
}

/// Command runner substitute that records every invocation
pub struct RecordingRunner {
    pub exit_code: i32,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
    pub fn new(exit_code: i32) -> Arc<Self> {
        Arc::new(Self {
            exit_code,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, argv: &[String]) -> Result<i32, ExecError> {
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        self.calls.lock().unwrap().push(argv.to_vec());
        Ok(self.exit_code)
    }
}

/// Reporter that keeps every notice and pending URL
#[derive(Default)]
pub struct CapturingReporter {
    pub notices: Mutex<Vec<String>>,
    pub urls: Mutex<Vec<Option<String>>>,
    /// (policy name, reason) of every session shown to the user
    pub sessions: Mutex<Vec<(String, String)>>,
}

impl CapturingReporter {
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl Reporter for CapturingReporter {
    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    fn approval_pending(&self, server: &ApprovalServer) {
        let session = server.session();
        self.sessions
            .lock()
            .unwrap()
            .push((session.policy.name.clone(), session.reason.clone()));
        self.urls
            .lock()
            .unwrap()
            .push(server.approval_url().map(str::to_string));
    }
}

/// Guard over `policies` with grants kept in `home`
pub fn guard(
    home: &GuardianHome,
    policies: PolicyStore,
    runner: Arc<RecordingRunner>,
    flags: RuntimeFlags,
) -> Guard {
    Guard::new(
        policies,
        GrantStore::new(home.grants_dir()),
        MethodRegistry::with_defaults(flags),
        runner,
    )
    .with_flags(flags)
}

pub fn auto_deny() -> RuntimeFlags {
    RuntimeFlags {
        test_mode: true,
        auto_deny: true,
    }
}
