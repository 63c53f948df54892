use super::settings::{ConfigError, GuardianHome};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Policy file written by `guardian setup` when none exists
pub const DEFAULT_POLICY_FILE: &str = r#"# Guardian policies.
#
# Each key under [policies] is "<scope>.<operation>" and holds one or more
# policy tables. A policy applies when every condition matches the operation
# context; an empty condition value matches anything. When several policies
# match, the one with the most concrete conditions wins, then the first one
# declared.
#
# Durations: 30s, 15m, 1h, 1d (a bare number means seconds).

[defaults]
method = "browser"
expires = "15m"

[[policies."git.push"]]
name = "protect-main"
expires = "15m"

[policies."git.push".conditions]
branch = "main"
remote = "origin"
"#;

/// Create the default policy file if it is missing and return its path.
///
/// An existing file is left byte-for-byte untouched. The contents are written
/// to a temp file first and linked into place only when complete, so readers
/// never see a partial file and exactly one concurrent caller wins.
pub fn ensure_config(home: &GuardianHome) -> Result<PathBuf, ConfigError> {
    let path = home.policy_path();
    if path.exists() {
        return Ok(path);
    }

    fs::create_dir_all(home.root())?;

    // Temp files are created owner read/write only
    let mut temp = NamedTempFile::new_in(home.root())?;
    temp.write_all(DEFAULT_POLICY_FILE.as_bytes())?;
    temp.as_file().sync_all()?;

    match temp.persist_noclobber(&path) {
        Ok(_) => {}
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => return Ok(path),
        Err(e) => return Err(ConfigError::ReadError(e.error)),
    }

    tracing::info!(path = %path.display(), "created default policy file");
    Ok(path)
}
