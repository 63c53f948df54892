pub mod probe;

pub use probe::ContextProbe;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A context attribute that policy conditions can be matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Branch,
    Remote,
    User,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Branch, Attribute::Remote, Attribute::User];

    /// Parse an attribute name as written in the policy file
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "branch" => Some(Attribute::Branch),
            "remote" => Some(Attribute::Remote),
            "user" => Some(Attribute::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Branch => "branch",
            Attribute::Remote => "remote",
            Attribute::User => "user",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes describing the caller's situation.
///
/// Empty strings mean "unspecified". Built once per invocation and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub remote: String,
    #[serde(default)]
    pub user: String,
}

impl OperationContext {
    pub fn new(
        branch: impl Into<String>,
        remote: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            remote: remote.into(),
            user: user.into(),
        }
    }

    pub fn get(&self, attribute: Attribute) -> &str {
        match attribute {
            Attribute::Branch => &self.branch,
            Attribute::Remote => &self.remote,
            Attribute::User => &self.user,
        }
    }

    /// Fill unspecified attributes from `fallback`, keeping explicit values
    pub fn or_else(self, fallback: OperationContext) -> Self {
        fn pick(value: String, fallback: String) -> String {
            if value.is_empty() { fallback } else { value }
        }

        Self {
            branch: pick(self.branch, fallback.branch),
            remote: pick(self.remote, fallback.remote),
            user: pick(self.user, fallback.user),
        }
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for attribute in Attribute::ALL {
            let value = self.get(attribute);
            if value.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", attribute, value)?;
            first = false;
        }
        if first {
            f.write_str("(unspecified)")?;
        }
        Ok(())
    }
}
