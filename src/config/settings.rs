use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the guardian home directory
pub const HOME_ENV: &str = "GUARDIAN_HOME";
/// Environment variable enabling test mode (annotated approval reasons)
pub const TEST_MODE_ENV: &str = "GUARDIAN_TEST_MODE";
/// Environment variable resolving every approval as denied
pub const AUTO_DENY_ENV: &str = "GUARDIAN_AUTO_DENY";

const POLICY_FILE: &str = "policies.toml";
const GRANTS_DIR: &str = "grants";
const AUDIT_LOG: &str = "audit.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config directory not found (set HOME or GUARDIAN_HOME)")]
    DirectoryNotFound,

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Per-user directory holding the policy file, grant store and audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianHome {
    root: PathBuf,
}

impl GuardianHome {
    /// Resolve from `GUARDIAN_HOME`, falling back to `~/.config/guardian`
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(dir) = std::env::var(HOME_ENV) {
            if !dir.trim().is_empty() {
                return Ok(Self::at(dir));
            }
        }

        let home = std::env::var("HOME").map_err(|_| ConfigError::DirectoryNotFound)?;
        Ok(Self::at(PathBuf::from(home).join(".config").join("guardian")))
    }

    /// Use an explicit directory
    pub fn at<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy_path(&self) -> PathBuf {
        self.root.join(POLICY_FILE)
    }

    pub fn grants_dir(&self) -> PathBuf {
        self.root.join(GRANTS_DIR)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join(AUDIT_LOG)
    }
}

/// Environment-driven switches, read once per process and passed explicitly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeFlags {
    pub test_mode: bool,
    pub auto_deny: bool,
}

impl RuntimeFlags {
    pub fn from_env() -> Self {
        Self {
            test_mode: env_flag(TEST_MODE_ENV),
            auto_deny: env_flag(AUTO_DENY_ENV),
        }
    }

    /// Reason text as shown on the approval page
    pub fn annotate_reason(&self, reason: &str) -> String {
        if self.test_mode {
            format!("[test-mode] {}", reason)
        } else {
            reason.to_string()
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
