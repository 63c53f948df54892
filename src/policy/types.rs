use crate::context::{Attribute, OperationContext};
use crate::policy::duration::format_duration;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Method used when a policy does not name one
pub const DEFAULT_METHOD: &str = "browser";
/// Approval window used when neither the policy nor `[defaults]` set one
pub const DEFAULT_EXPIRES: Duration = Duration::from_secs(15 * 60);

/// One attribute predicate. `expected == None` is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub attribute: Attribute,
    pub expected: Option<String>,
}

impl Condition {
    pub fn new(attribute: Attribute, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self {
            attribute,
            expected: if expected.trim().is_empty() {
                None
            } else {
                Some(expected)
            },
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.expected.is_none()
    }

    fn matches(&self, context: &OperationContext, ignore_case: bool) -> bool {
        let Some(expected) = &self.expected else {
            return true;
        };
        let actual = context.get(self.attribute);
        if ignore_case {
            actual.eq_ignore_ascii_case(expected)
        } else {
            actual == expected
        }
    }
}

/// A named rule stating when `scope.operation` needs approval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub scope: String,
    pub operation: String,
    pub method: String,
    pub expires: Duration,
    pub conditions: Vec<Condition>,
    pub ignore_case: bool,
}

impl Policy {
    /// Policy with default method and expiry and no conditions
    pub fn new(scope: impl Into<String>, operation: impl Into<String>) -> Self {
        let scope = scope.into();
        let operation = operation.into();
        Self {
            name: format!("{}.{}", scope, operation),
            scope,
            operation,
            method: DEFAULT_METHOD.to_string(),
            expires: DEFAULT_EXPIRES,
            conditions: Vec::new(),
            ignore_case: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_expires(mut self, expires: Duration) -> Self {
        self.expires = expires;
        self
    }

    pub fn with_condition(mut self, attribute: Attribute, expected: impl Into<String>) -> Self {
        self.conditions.push(Condition::new(attribute, expected));
        self
    }

    pub fn key(&self) -> String {
        format!("{}.{}", self.scope, self.operation)
    }

    /// True when every condition holds. No conditions means always.
    pub fn matches(&self, context: &OperationContext) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.matches(context, self.ignore_case))
    }

    /// Number of non-wildcard conditions, used to rank overlapping policies
    pub fn specificity(&self) -> usize {
        self.conditions.iter().filter(|c| !c.is_wildcard()).count()
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] method={} expires={}",
            self.name,
            self.key(),
            self.method,
            format_duration(self.expires)
        )?;
        for condition in &self.conditions {
            match &condition.expected {
                Some(value) => write!(f, " {}={}", condition.attribute, value)?,
                None => write!(f, " {}=*", condition.attribute)?,
            }
        }
        Ok(())
    }
}

/// Outcome of a policy check.
///
/// Configuration failures never reach this type; they surface as the `Err`
/// side of loading the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No policy applies; the operation proceeds without approval
    Allowed,
    /// The carried policy matched and demands approval
    RequiresApproval(Arc<Policy>),
}

impl Decision {
    pub fn requires_approval(&self) -> bool {
        matches!(self, Decision::RequiresApproval(_))
    }

    pub fn policy(&self) -> Option<&Arc<Policy>> {
        match self {
            Decision::Allowed => None,
            Decision::RequiresApproval(policy) => Some(policy),
        }
    }
}

/// A decision paired with the sentence shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explained {
    pub decision: Decision,
    pub message: String,
}

/// Human-readable wording for a decision on `scope.operation`
pub fn explain(decision: &Decision, scope: &str, operation: &str) -> String {
    match decision {
        Decision::Allowed => format!(
            "No guardian policy requires approval for `{}.{}`",
            scope, operation
        ),
        Decision::RequiresApproval(policy) => format!(
            "guardian approval required for {}.{} (method={}, expires={})",
            scope,
            operation,
            policy.method,
            format_duration(policy.expires)
        ),
    }
}
