use crate::approval::{ApprovalServer, MethodRegistry};
use crate::audit::AuditLogger;
use crate::config::{GuardianHome, RuntimeFlags, ensure_config};
use crate::context::{ContextProbe, OperationContext};
use crate::error::GuardianResult;
use crate::exec::{Authorization, Guard, ProcessRunner, Reporter, Request};
use crate::grant::GrantStore;
use crate::policy::PolicyStore;
use chrono::Utc;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Target operation and context flags shared by `check` and `approve`
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Namespace of the operation, e.g. `git`
    pub scope: String,

    /// Operation within the scope, e.g. `push`
    pub operation: String,

    /// Branch the operation acts on
    #[arg(long)]
    pub branch: Option<String>,

    /// Remote the operation talks to
    #[arg(long)]
    pub remote: Option<String>,

    /// User performing the operation
    #[arg(long)]
    pub user: Option<String>,

    /// Why the operation is needed, shown on the approval page
    #[arg(long)]
    pub reason: Option<String>,

    /// Do not fill missing branch/remote/user from the git repository
    #[arg(long)]
    pub no_detect: bool,
}

impl TargetArgs {
    /// Build the per-invocation request, detecting unspecified context
    pub fn into_request(self, command: Vec<String>) -> Request {
        let explicit = OperationContext::new(
            self.branch.unwrap_or_default(),
            self.remote.unwrap_or_default(),
            self.user.unwrap_or_default(),
        );

        let probe = match ContextProbe::discover() {
            Ok(probe) => Some(probe),
            Err(e) => {
                tracing::debug!(error = %e, "cannot read working directory");
                None
            }
        };

        let context = match (&probe, self.no_detect) {
            (Some(probe), false) => explicit.or_else(probe.detect()),
            _ => explicit,
        };
        let project_name = probe
            .as_ref()
            .map(ContextProbe::project_name)
            .unwrap_or_else(|| "unknown".to_string());

        let mut request = Request::new(self.scope, self.operation)
            .with_context(context)
            .with_command(command)
            .with_project(project_name);
        request.reason = self.reason;
        request
    }
}

/// Prints guardian messages to stderr, keeping stdout for the wrapped command
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn notice(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn approval_pending(&self, server: &ApprovalServer) {
        match server.approval_url() {
            Some(url) => {
                let session = server.session();
                eprintln!(
                    "Policy {} requires approval for: {}",
                    session.policy.name, session.full_command
                );
                let remaining = (server.expires_at() - Utc::now()).num_seconds().max(0);
                eprintln!("\nOpen this URL in your browser to approve or deny:\n\n  {}\n", url);
                eprintln!(
                    "Waiting for a decision (expires in {}m {}s, Ctrl-C to cancel)...",
                    remaining / 60,
                    remaining % 60
                );
            }
            None => eprintln!("Approval resolved without a prompt."),
        }
    }
}

/// Assemble a guard from the files under `home`, creating the policy file if needed
pub fn build_guard(home: &GuardianHome, flags: RuntimeFlags) -> GuardianResult<Guard> {
    let policy_path = ensure_config(home)?;
    let policies = PolicyStore::load(&policy_path)?;

    let guard = Guard::new(
        policies,
        GrantStore::new(home.grants_dir()),
        MethodRegistry::with_defaults(flags),
        Arc::new(ProcessRunner::new()),
    )
    .with_flags(flags);

    match AuditLogger::with_path(home.audit_log_path()) {
        Ok(audit) => Ok(guard.with_audit(audit)),
        Err(e) => {
            tracing::warn!(error = %e, "audit log unavailable");
            Ok(guard)
        }
    }
}

/// `guardian check`: authorize without running anything
pub async fn check(
    guard: &Guard,
    request: &Request,
    cancel: CancellationToken,
    reporter: &dyn Reporter,
) -> GuardianResult<i32> {
    match guard.authorize(request, cancel, reporter).await? {
        Authorization::Unprotected => {}
        Authorization::Granted(_) => reporter.notice("Authorized by an existing grant."),
        Authorization::Approved(grant) => reporter.notice(&format!(
            "Approved. Grant {} valid until {}.",
            grant.id,
            grant.expires_at.to_rfc3339()
        )),
    }
    Ok(0)
}

/// `guardian approve`: authorize, then run the wrapped command
pub async fn approve(
    guard: &Guard,
    request: &Request,
    cancel: CancellationToken,
    reporter: &dyn Reporter,
) -> GuardianResult<i32> {
    guard.approve_and_run(request, cancel, reporter).await
}

/// `guardian setup`: make sure the policy file exists
pub fn setup(home: &GuardianHome) -> GuardianResult<PathBuf> {
    Ok(ensure_config(home)?)
}

/// `guardian status`: summary of configuration and live grants
pub fn status(home: &GuardianHome, policy_name: Option<&str>) -> GuardianResult<String> {
    let path = home.policy_path();
    if !path.exists() {
        return Ok(format!(
            "No policy file at {} (run `guardian setup`)",
            path.display()
        ));
    }

    let policies = PolicyStore::load(&path)?;
    if let Some(name) = policy_name {
        return Ok(policies.get(name)?.to_string());
    }

    let grants = GrantStore::new(home.grants_dir()).list()?;
    let mut out = format!(
        "Policy file: {}\nPolicies: {}\n",
        path.display(),
        policies.len()
    );
    for policy in policies.iter() {
        out.push_str(&format!("  {}\n", policy));
    }
    out.push_str(&format!("Active grants: {}\n", grants.len()));
    for grant in &grants {
        out.push_str(&format!(
            "  {} {}.{} [{}] until {}\n",
            grant.id,
            grant.scope,
            grant.operation,
            grant.context,
            grant.expires_at.to_rfc3339()
        ));
    }
    Ok(out)
}

/// `guardian grant list`
pub fn grant_list(home: &GuardianHome) -> GuardianResult<String> {
    let grants = GrantStore::new(home.grants_dir()).list()?;
    if grants.is_empty() {
        return Ok("No active grants.\n".to_string());
    }

    let mut out = String::new();
    for grant in grants {
        out.push_str(&format!(
            "{}  {}.{}  policy={}  {}  expires={}\n",
            grant.id,
            grant.scope,
            grant.operation,
            grant.policy,
            grant.context,
            grant.expires_at.to_rfc3339()
        ));
    }
    Ok(out)
}

/// `guardian grant revoke <id>`; revoking an unknown id succeeds
pub fn grant_revoke(home: &GuardianHome, id: &str) -> GuardianResult<()> {
    GrantStore::new(home.grants_dir()).revoke(id)?;
    Ok(())
}

/// `guardian grant prune`
pub fn grant_prune(home: &GuardianHome) -> GuardianResult<usize> {
    Ok(GrantStore::new(home.grants_dir()).prune_expired()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_POLICY_FILE;
    use tempfile::TempDir;

    #[test]
    fn test_setup_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let home = GuardianHome::at(temp_dir.path());

        let first = setup(&home).unwrap();
        let before = std::fs::read(&first).unwrap();
        let second = setup(&home).unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), before);
        assert_eq!(before, DEFAULT_POLICY_FILE.as_bytes());
    }

    #[test]
    fn test_status_without_config() {
        let temp_dir = TempDir::new().unwrap();
        let home = GuardianHome::at(temp_dir.path());
        assert!(status(&home, None).unwrap().contains("guardian setup"));
    }

    #[test]
    fn test_status_lists_policies_and_grants() {
        let temp_dir = TempDir::new().unwrap();
        let home = GuardianHome::at(temp_dir.path());
        setup(&home).unwrap();

        let out = status(&home, None).unwrap();
        assert!(out.contains("Policies: 1"));
        assert!(out.contains("protect-main"));
        assert!(out.contains("Active grants: 0"));

        let one = status(&home, Some("protect-main")).unwrap();
        assert!(one.contains("branch=main"));

        assert!(matches!(
            status(&home, Some("missing")),
            Err(crate::error::GuardianError::Policy(_))
        ));
    }

    #[test]
    fn test_grant_commands() {
        let temp_dir = TempDir::new().unwrap();
        let home = GuardianHome::at(temp_dir.path());
        assert_eq!(grant_list(&home).unwrap(), "No active grants.\n");

        let policy = crate::policy::Policy::new("git", "push");
        let grant = GrantStore::new(home.grants_dir())
            .issue("git", "push", &policy, &OperationContext::default())
            .unwrap();

        assert!(grant_list(&home).unwrap().contains(&grant.id));
        grant_revoke(&home, &grant.id).unwrap();
        grant_revoke(&home, &grant.id).unwrap();
        assert_eq!(grant_list(&home).unwrap(), "No active grants.\n");
        assert_eq!(grant_prune(&home).unwrap(), 0);
    }

    #[test]
    fn test_no_detect_keeps_only_explicit_context() {
        let args = TargetArgs {
            scope: "git".to_string(),
            operation: "push".to_string(),
            branch: Some("main".to_string()),
            remote: None,
            user: None,
            reason: Some("release".to_string()),
            no_detect: true,
        };

        let request = args.into_request(vec!["git".to_string(), "push".to_string()]);
        assert_eq!(request.context, OperationContext::new("main", "", ""));
        assert_eq!(request.reason.as_deref(), Some("release"));
        assert_eq!(request.command, vec!["git", "push"]);
    }
}
