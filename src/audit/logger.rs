use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Size past which `audit.log` is moved aside to `audit.log.1`
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent<'a> {
    /// How an authorization question was answered: `allowed`, `granted`,
    /// `approved`, `denied`, `expired`, `cancelled` or `error`
    Decision { outcome: &'a str, detail: &'a str },
    /// A wrapped command finished (or failed to start, exit code -1)
    Execution {
        command: &'a str,
        exit_code: i32,
        grant_id: Option<&'a str>,
    },
}

impl fmt::Display for AuditEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::Decision { outcome, detail } => write!(f, "[{}] {}", outcome, detail),
            AuditEvent::Execution {
                command,
                exit_code,
                grant_id: Some(id),
            } => write!(f, "[exit:{}] grant={} command={:?}", exit_code, id, command),
            AuditEvent::Execution {
                command, exit_code, ..
            } => write!(f, "[exit:{}] command={:?}", exit_code, command),
        }
    }
}

/// Append-only record of approval outcomes and wrapped-command runs
#[derive(Debug, Clone)]
pub struct AuditLogger {
    path: PathBuf,
    user: String,
}

impl AuditLogger {
    /// Log to `path`, creating its parent directory
    pub fn with_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        Ok(Self { path, user })
    }

    pub fn log_decision(&self, key: &str, outcome: &str, detail: &str) -> io::Result<()> {
        self.record(key, &AuditEvent::Decision { outcome, detail })
    }

    pub fn log_execution(
        &self,
        key: &str,
        command: &str,
        exit_code: i32,
        grant_id: Option<&str>,
    ) -> io::Result<()> {
        self.record(
            key,
            &AuditEvent::Execution {
                command,
                exit_code,
                grant_id,
            },
        )
    }

    /// Append `[timestamp] [user] [scope.operation] <event>`
    pub fn record(&self, key: &str, event: &AuditEvent<'_>) -> io::Result<()> {
        self.record_at(Utc::now(), key, event)
    }

    fn record_at(&self, at: DateTime<Utc>, key: &str, event: &AuditEvent<'_>) -> io::Result<()> {
        self.rotate()?;

        let line = format!("[{}] [{}] [{}] {}\n", at.to_rfc3339(), self.user, key, event);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    fn rotate(&self) -> io::Result<()> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if size > ROTATE_AT_BYTES {
            let mut rotated = self.path.clone().into_os_string();
            rotated.push(".1");
            fs::rename(&self.path, PathBuf::from(rotated))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
