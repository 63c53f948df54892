use thiserror::Error;

// Import module-level errors for GuardianError
use crate::approval::ApprovalError;
use crate::config::ConfigError;
use crate::exec::ExecError;
use crate::grant::GrantError;
use crate::policy::PolicyError;

/// Top-level error that wraps all module-specific errors
///
/// Every module error converts into `GuardianError` via `From`, so
/// orchestration code can use `?` freely while callers can still match on
/// the precise cause (denied vs. expired vs. cancelled, spawn failure vs.
/// store failure).
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("Grant store error: {0}")]
    Grant(#[from] GrantError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl GuardianError {
    /// Process exit status used by the CLI for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GuardianError::Approval(ApprovalError::Cancelled) => 130,
            GuardianError::Approval(_) => 1,
            GuardianError::Exec(ExecError::Spawn { .. }) => 127,
            GuardianError::Exec(ExecError::EmptyCommand) => 2,
            GuardianError::Config(_) => 78,
            _ => 1,
        }
    }

    /// True for outcomes where a human (or the clock) said no
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            GuardianError::Approval(
                ApprovalError::Denied | ApprovalError::Expired | ApprovalError::Cancelled
            )
        )
    }
}

/// Result type for guardian operations
pub type GuardianResult<T> = std::result::Result<T, GuardianError>;
