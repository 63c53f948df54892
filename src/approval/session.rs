use crate::policy::{Policy, deadline};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One pending human-in-the-loop request
#[derive(Debug, Clone)]
pub struct ApprovalSession {
    pub scope: String,
    pub operation: String,
    pub policy: Arc<Policy>,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
    pub project_name: String,
    pub full_command: String,
}

impl ApprovalSession {
    pub fn new(
        scope: impl Into<String>,
        operation: impl Into<String>,
        policy: Arc<Policy>,
        reason: impl Into<String>,
        project_name: impl Into<String>,
        args: &[String],
    ) -> Self {
        let scope = scope.into();
        let operation = operation.into();
        let full_command = display_command(&scope, &operation, args);

        Self {
            scope,
            operation,
            policy,
            reason: reason.into(),
            requested_at: Utc::now(),
            project_name: project_name.into(),
            full_command,
        }
    }

    /// `requested_at + policy.expires`, fixed for the life of the session
    pub fn expires_at(&self) -> DateTime<Utc> {
        deadline(self.requested_at, self.policy.expires)
    }
}

/// Command line shown on the approval page.
///
/// When the wrapped command already starts with the scope (`git push ...`)
/// it is shown as is; otherwise it is prefixed with `scope operation`.
pub fn display_command(scope: &str, operation: &str, args: &[String]) -> String {
    let mut words: Vec<String> = Vec::with_capacity(args.len() + 2);
    if args.first().map(String::as_str) != Some(scope) {
        words.push(scope.to_string());
        words.push(operation.to_string());
    }
    words.extend(args.iter().map(|arg| quote(arg)));
    words.join(" ")
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
