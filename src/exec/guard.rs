//! Authorization gate in front of the wrapped command.
//!
//! ```text
//! Request ──► PolicyStore::check ──► Allowed ─────────────────────────┐
//!                    │                                                 │
//!                    └─► RequiresApproval ─► live grant? ─► yes ───────┤
//!                                                 │                    │
//!                                                 └─► no ─► approval ──┤
//!                                                           wait()     │
//!                                                           issue grant│
//!                                                                      ▼
//!                                                          CommandRunner::run
//!                                                          (revoke grant on failure)
//! ```
//!
//! The wrapped command is only reachable through an [`Authorization`], and
//! the only constructors of an `Authorization` are the three arms above.

use crate::approval::{ApprovalError, ApprovalServer, ApprovalSession, MethodRegistry};
use crate::audit::AuditLogger;
use crate::config::RuntimeFlags;
use crate::context::OperationContext;
use crate::error::{GuardianError, GuardianResult};
use crate::exec::runner::{CommandRunner, ExecError};
use crate::grant::{Grant, GrantStore};
use crate::policy::{Decision, Explained, PolicyStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one invocation asks for, built once and passed down
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub scope: String,
    pub operation: String,
    pub context: OperationContext,
    pub reason: Option<String>,
    pub command: Vec<String>,
    pub project_name: String,
}

impl Request {
    pub fn new(scope: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_project(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = project_name.into();
        self
    }

    pub fn key(&self) -> String {
        format!("{}.{}", self.scope, self.operation)
    }

    fn reason_or_default(&self) -> String {
        match self.reason.as_deref() {
            Some(reason) if !reason.trim().is_empty() => reason.to_string(),
            _ => format!("{} requested from the command line", self.key()),
        }
    }
}

/// Proof that a request may proceed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// No policy applies to the request
    Unprotected,
    /// A grant issued earlier covers the request
    Granted(Grant),
    /// A human approved just now; the grant was issued for this invocation
    Approved(Grant),
}

impl Authorization {
    pub fn grant(&self) -> Option<&Grant> {
        match self {
            Authorization::Unprotected => None,
            Authorization::Granted(grant) | Authorization::Approved(grant) => Some(grant),
        }
    }
}

/// Receives user-facing messages while a request is processed
pub trait Reporter: Send + Sync {
    /// A line of status text for the user
    fn notice(&self, message: &str);

    /// An approval is pending; the server's URL should be shown
    fn approval_pending(&self, server: &ApprovalServer);
}

pub struct Guard {
    policies: PolicyStore,
    grants: GrantStore,
    methods: MethodRegistry,
    runner: Arc<dyn CommandRunner>,
    audit: Option<AuditLogger>,
    flags: RuntimeFlags,
}

impl Guard {
    pub fn new(
        policies: PolicyStore,
        grants: GrantStore,
        methods: MethodRegistry,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            policies,
            grants,
            methods,
            runner,
            audit: None,
            flags: RuntimeFlags::default(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_flags(mut self, flags: RuntimeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    pub fn grants(&self) -> &GrantStore {
        &self.grants
    }

    /// Policy decision for the request plus its explanation
    pub fn evaluate(&self, request: &Request) -> Explained {
        self.policies
            .check_and_explain(&request.scope, &request.operation, &request.context)
    }

    /// Decide, and if needed obtain approval, without running anything.
    ///
    /// A fresh approval issues a grant. If the grant cannot be persisted the
    /// whole authorization fails; it never degrades to "allowed".
    pub async fn authorize(
        &self,
        request: &Request,
        cancel: CancellationToken,
        reporter: &dyn Reporter,
    ) -> GuardianResult<Authorization> {
        let key = request.key();
        let explained = self.evaluate(request);
        reporter.notice(&explained.message);

        let policy = match explained.decision {
            Decision::Allowed => {
                self.audit_decision(&key, "allowed", &request.context.to_string());
                return Ok(Authorization::Unprotected);
            }
            Decision::RequiresApproval(policy) => policy,
        };

        if let Some(grant) = self.grants.find_active(
            &request.scope,
            &request.operation,
            &policy,
            &request.context,
        )? {
            reporter.notice(&format!(
                "Using guardian grant {} (expires {})",
                grant.id,
                grant.expires_at.to_rfc3339()
            ));
            self.audit_decision(&key, "granted", &format!("grant={}", grant.id));
            return Ok(Authorization::Granted(grant));
        }

        let reason = self.flags.annotate_reason(&request.reason_or_default());
        let session = ApprovalSession::new(
            request.scope.clone(),
            request.operation.clone(),
            Arc::clone(&policy),
            reason,
            request.project_name.clone(),
            &request.command,
        );

        let server = self.methods.start(cancel, session).await?;
        reporter.approval_pending(&server);

        if let Err(e) = server.wait().await {
            let outcome = match &e {
                ApprovalError::Denied => "denied",
                ApprovalError::Expired => "expired",
                ApprovalError::Cancelled => "cancelled",
                _ => "error",
            };
            self.audit_decision(&key, outcome, &format!("policy={}", policy.name));
            return Err(e.into());
        }

        let grant = self.grants.issue(
            &request.scope,
            &request.operation,
            &policy,
            &request.context,
        )?;
        self.audit_decision(
            &key,
            "approved",
            &format!("policy={} grant={}", policy.name, grant.id),
        );
        Ok(Authorization::Approved(grant))
    }

    /// Run the wrapped command under an authorization and return its exit code.
    ///
    /// Any non-zero exit, or failure to start, revokes the grant that
    /// authorized this run. A successful run leaves the grant to expire.
    pub async fn execute(
        &self,
        request: &Request,
        authorization: &Authorization,
    ) -> GuardianResult<i32> {
        let key = request.key();
        let grant_id = authorization.grant().map(|grant| grant.id.as_str());

        let result = self.runner.run(&request.command).await;
        let code = match &result {
            Ok(code) => *code,
            Err(_) => -1,
        };

        if code != 0 {
            if let Some(id) = grant_id {
                self.grants.revoke(id)?;
            }
        }

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_execution(&key, &request.command.join(" "), code, grant_id) {
                tracing::warn!(error = %e, "failed to write audit log");
            }
        }

        Ok(result?)
    }

    /// Authorize, then run the wrapped command
    pub async fn approve_and_run(
        &self,
        request: &Request,
        cancel: CancellationToken,
        reporter: &dyn Reporter,
    ) -> GuardianResult<i32> {
        if request.command.is_empty() {
            return Err(GuardianError::Exec(ExecError::EmptyCommand));
        }

        let authorization = self.authorize(request, cancel, reporter).await?;
        self.execute(request, &authorization).await
    }

    fn audit_decision(&self, key: &str, outcome: &str, detail: &str) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_decision(key, outcome, detail) {
                tracing::warn!(error = %e, "failed to write audit log");
            }
        }
    }
}
