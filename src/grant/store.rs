use crate::context::OperationContext;
use crate::policy::{DEFAULT_EXPIRES, Policy, deadline};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("Failed to issue grant: {0}")]
    Issue(#[source] std::io::Error),

    #[error("Failed to revoke grant {id}: {source}")]
    Revoke {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read grant store: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to encode grant: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid grant id: {0}")]
    InvalidId(String),
}

/// Short-lived authorization standing in for a fresh approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: String,
    pub scope: String,
    pub operation: String,
    /// Name of the policy that was satisfied
    pub policy: String,
    pub context: OperationContext,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Grant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether this grant covers the given operation, policy and context
    pub fn covers(
        &self,
        scope: &str,
        operation: &str,
        policy: &Policy,
        context: &OperationContext,
    ) -> bool {
        self.scope == scope
            && self.operation == operation
            && self.policy == policy.name
            && &self.context == context
    }
}

/// Grant records stored one JSON file per grant.
///
/// Each write goes to a temp file in the same directory and is renamed into
/// place, so concurrent processes never observe a partial record. Separate
/// files mean issue and revoke on different ids never contend.
#[derive(Debug, Clone)]
pub struct GrantStore {
    dir: PathBuf,
}

impl GrantStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a new grant whose lifetime comes from the policy
    pub fn issue(
        &self,
        scope: &str,
        operation: &str,
        policy: &Policy,
        context: &OperationContext,
    ) -> Result<Grant, GrantError> {
        let ttl = if policy.expires.is_zero() {
            DEFAULT_EXPIRES
        } else {
            policy.expires
        };
        let issued_at = Utc::now();
        let expires_at = deadline(issued_at, ttl);

        let grant = Grant {
            id: Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            operation: operation.to_string(),
            policy: policy.name.clone(),
            context: context.clone(),
            issued_at,
            expires_at,
        };

        self.write(&grant)?;
        tracing::info!(
            grant_id = %grant.id,
            scope,
            operation,
            policy = %grant.policy,
            expires_at = %grant.expires_at.to_rfc3339(),
            "issued grant"
        );
        Ok(grant)
    }

    /// Remove a grant. Unknown or already revoked ids are not an error.
    pub fn revoke(&self, id: &str) -> Result<(), GrantError> {
        let path = self.grant_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(grant_id = id, "revoked grant");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(GrantError::Revoke {
                id: id.to_string(),
                source,
            }),
        }
    }

    /// Fetch a live grant by id. Expired grants read as absent and are removed.
    pub fn get(&self, id: &str) -> Result<Option<Grant>, GrantError> {
        let path = self.grant_path(id)?;
        let Some(grant) = read_grant(&path)? else {
            return Ok(None);
        };

        if grant.is_expired() {
            remove_record(&path)?;
            return Ok(None);
        }
        Ok(Some(grant))
    }

    /// First live grant covering this operation, policy and context
    pub fn find_active(
        &self,
        scope: &str,
        operation: &str,
        policy: &Policy,
        context: &OperationContext,
    ) -> Result<Option<Grant>, GrantError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|grant| grant.covers(scope, operation, policy, context)))
    }

    /// All live grants, oldest first. Expired records are cleaned up on the way.
    pub fn list(&self) -> Result<Vec<Grant>, GrantError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GrantError::Read(e)),
        };

        let now = Utc::now();
        let mut grants = Vec::new();
        for entry in entries {
            let path = entry.map_err(GrantError::Read)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let Some(grant) = read_grant(&path)? else {
                continue;
            };
            if grant.is_expired_at(now) {
                remove_record(&path)?;
                continue;
            }
            grants.push(grant);
        }

        grants.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        Ok(grants)
    }

    /// Delete every expired grant, returning how many were removed
    pub fn prune_expired(&self) -> Result<usize, GrantError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(GrantError::Read(e)),
        };

        let now = Utc::now();
        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(GrantError::Read)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(grant) = read_grant(&path)? {
                if grant.is_expired_at(now) && remove_record(&path)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn write(&self, grant: &Grant) -> Result<(), GrantError> {
        fs::create_dir_all(&self.dir).map_err(GrantError::Issue)?;
        let target = self.grant_path(&grant.id)?;
        let json = serde_json::to_vec_pretty(grant)?;

        // Atomic write: temp file in the same directory, then rename over the target
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(GrantError::Issue)?;
        temp.write_all(&json).map_err(GrantError::Issue)?;
        temp.as_file().sync_all().map_err(GrantError::Issue)?;
        temp.persist(&target)
            .map_err(|e| GrantError::Issue(e.error))?;
        Ok(())
    }

    fn grant_path(&self, id: &str) -> Result<PathBuf, GrantError> {
        // Ids become file names; keep them to what `issue` generates
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(GrantError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

/// Delete an expired record by its file path; the id inside it is not trusted.
/// Returns whether this call removed the file.
fn remove_record(path: &Path) -> Result<bool, GrantError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed expired grant");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(GrantError::Revoke {
            id: path.display().to_string(),
            source: e,
        }),
    }
}

/// Read one record. Missing files and unparsable contents read as absent.
fn read_grant(path: &Path) -> Result<Option<Grant>, GrantError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GrantError::Read(e)),
    };

    match serde_json::from_slice(&bytes) {
        Ok(grant) => Ok(Some(grant)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable grant record");
            Ok(None)
        }
    }
}
