use crate::config::ConfigError;
use crate::context::{Attribute, OperationContext};
use crate::policy::duration::parse_duration;
use crate::policy::types::{
    Condition, DEFAULT_EXPIRES, DEFAULT_METHOD, Decision, Explained, Policy, explain,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    #[serde(default)]
    defaults: DefaultsSection,
    #[serde(default)]
    policies: BTreeMap<String, Vec<PolicyEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefaultsSection {
    method: Option<String>,
    expires: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyEntry {
    name: Option<String>,
    method: Option<String>,
    expires: Option<String>,
    #[serde(default)]
    ignore_case: bool,
    #[serde(default)]
    conditions: BTreeMap<String, String>,
}

/// Read-only set of policies keyed by `scope.operation`
#[derive(Debug, Default)]
pub struct PolicyStore {
    path: Option<PathBuf>,
    policies: BTreeMap<String, Vec<Arc<Policy>>>,
}

impl PolicyStore {
    /// Load and validate the policy file at `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut store = Self::from_toml_str(&contents)?;
        store.path = Some(path.to_path_buf());

        tracing::info!(path = %path.display(), policies = store.len(), "loaded guardian policies");
        Ok(store)
    }

    /// Parse policies from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: PolicyFile = toml::from_str(contents)?;

        let default_method = file
            .defaults
            .method
            .unwrap_or_else(|| DEFAULT_METHOD.to_string());
        let default_expires = match file.defaults.expires.as_deref() {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_EXPIRES,
        };

        let mut policies = Vec::new();
        for (key, entries) in file.policies {
            let (scope, operation) = split_key(&key)?;

            for (index, entry) in entries.into_iter().enumerate() {
                let name = match entry.name {
                    Some(name) if !name.trim().is_empty() => name,
                    _ if index == 0 => key.clone(),
                    _ => format!("{}#{}", key, index + 1),
                };

                let expires = match entry.expires.as_deref() {
                    Some(raw) => parse_duration(raw)?,
                    None => default_expires,
                };

                let mut conditions = Vec::with_capacity(entry.conditions.len());
                for (attribute, expected) in entry.conditions {
                    let attribute = Attribute::parse(&attribute).ok_or_else(|| {
                        ConfigError::InvalidValue(format!(
                            "Unknown condition {:?} in policy {} (expected branch, remote or user)",
                            attribute, name
                        ))
                    })?;
                    conditions.push(Condition::new(attribute, expected));
                }

                policies.push(Policy {
                    name,
                    scope: scope.to_string(),
                    operation: operation.to_string(),
                    method: entry.method.unwrap_or_else(|| default_method.clone()),
                    expires,
                    conditions,
                    ignore_case: entry.ignore_case,
                });
            }
        }

        Self::from_policies(policies)
    }

    /// Build a store from already-constructed policies, in declaration order
    pub fn from_policies<I>(policies: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Policy>,
    {
        let mut names = HashSet::new();
        let mut by_key: BTreeMap<String, Vec<Arc<Policy>>> = BTreeMap::new();

        for policy in policies {
            if policy.scope.is_empty() || policy.operation.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "Policy {} needs a scope and an operation",
                    policy.name
                )));
            }
            if !names.insert(policy.name.clone()) {
                return Err(ConfigError::InvalidValue(format!(
                    "Duplicate policy name: {}",
                    policy.name
                )));
            }
            by_key.entry(policy.key()).or_default().push(Arc::new(policy));
        }

        Ok(Self {
            path: None,
            policies: by_key,
        })
    }

    /// Decide whether `scope.operation` in `context` needs approval.
    ///
    /// Among matching policies the most specific one wins; ties go to the
    /// policy declared first.
    pub fn check(&self, scope: &str, operation: &str, context: &OperationContext) -> Decision {
        let key = format!("{}.{}", scope, operation);
        let Some(candidates) = self.policies.get(&key) else {
            tracing::debug!(%key, "no policy registered");
            return Decision::Allowed;
        };

        let mut best: Option<&Arc<Policy>> = None;
        for policy in candidates.iter().filter(|p| p.matches(context)) {
            match best {
                Some(current) if current.specificity() >= policy.specificity() => {}
                _ => best = Some(policy),
            }
        }

        match best {
            Some(policy) => {
                tracing::info!(%key, policy = %policy.name, "policy requires approval");
                Decision::RequiresApproval(Arc::clone(policy))
            }
            None => {
                tracing::debug!(%key, %context, "no policy conditions matched");
                Decision::Allowed
            }
        }
    }

    /// Same as [`check`](Self::check), plus the sentence to show the user
    pub fn check_and_explain(
        &self,
        scope: &str,
        operation: &str,
        context: &OperationContext,
    ) -> Explained {
        let decision = self.check(scope, operation, context);
        let message = explain(&decision, scope, operation);
        Explained { decision, message }
    }

    /// Look up a policy by name
    pub fn get(&self, name: &str) -> Result<&Arc<Policy>, PolicyError> {
        self.iter()
            .find(|policy| policy.name == name)
            .ok_or_else(|| PolicyError::NotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Policy>> {
        self.policies.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.policies.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// File the store was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn split_key(key: &str) -> Result<(&str, &str), ConfigError> {
    match key.split_once('.') {
        Some((scope, operation))
            if !scope.trim().is_empty() && !operation.trim().is_empty() =>
        {
            Ok((scope.trim(), operation.trim()))
        }
        _ => Err(ConfigError::InvalidValue(format!(
            "Policy key must look like <scope>.<operation>: {:?}",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TWO_POLICIES: &str = r#"
[defaults]
expires = "10m"

[[policies."git.push"]]
name = "any-push"

[[policies."git.push"]]
name = "main-push"
expires = "1h"
[policies."git.push".conditions]
branch = "main"

[[policies."system.reboot"]]
method = "sms"
"#;

    #[test]
    fn test_parse_defaults_and_names() {
        let store = PolicyStore::from_toml_str(TWO_POLICIES).unwrap();
        assert_eq!(store.len(), 3);

        let any = store.get("any-push").unwrap();
        assert_eq!(any.expires, Duration::from_secs(600));
        assert_eq!(any.method, "browser");

        let main = store.get("main-push").unwrap();
        assert_eq!(main.expires, Duration::from_secs(3600));

        // Unnamed entries take the key as name
        let reboot = store.get("system.reboot").unwrap();
        assert_eq!(reboot.method, "sms");
    }

    #[test]
    fn test_most_specific_policy_wins() {
        let store = PolicyStore::from_toml_str(TWO_POLICIES).unwrap();

        let on_main = OperationContext::new("main", "", "");
        let decision = store.check("git", "push", &on_main);
        assert_eq!(decision.policy().unwrap().name, "main-push");

        let on_feature = OperationContext::new("feature/x", "", "");
        let decision = store.check("git", "push", &on_feature);
        assert_eq!(decision.policy().unwrap().name, "any-push");
    }

    #[test]
    fn test_equal_specificity_prefers_first_declared() {
        let store = PolicyStore::from_policies([
            Policy::new("git", "push")
                .with_name("first")
                .with_condition(Attribute::Branch, "main"),
            Policy::new("git", "push")
                .with_name("second")
                .with_condition(Attribute::Remote, "origin"),
        ])
        .unwrap();

        let ctx = OperationContext::new("main", "origin", "");
        for _ in 0..10 {
            let decision = store.check("git", "push", &ctx);
            assert_eq!(decision.policy().unwrap().name, "first");
        }
    }

    #[test]
    fn test_unregistered_operation_is_allowed() {
        let store = PolicyStore::from_toml_str(TWO_POLICIES).unwrap();
        let ctx = OperationContext::new("main", "origin", "root");
        assert_eq!(store.check("git", "fetch", &ctx), Decision::Allowed);
        assert_eq!(store.check("npm", "push", &ctx), Decision::Allowed);
    }

    #[test]
    fn test_unnamed_duplicates_get_numbered() {
        let store = PolicyStore::from_toml_str(
            r#"
[[policies."git.push"]]
[[policies."git.push"]]
conditions = { user = "ci" }
"#,
        )
        .unwrap();

        assert!(store.get("git.push").is_ok());
        assert!(store.get("git.push#2").is_ok());
    }

    #[test]
    fn test_rejects_bad_files() {
        let unknown_attribute = r#"
[[policies."git.push"]]
conditions = { tag = "v1" }
"#;
        assert!(matches!(
            PolicyStore::from_toml_str(unknown_attribute),
            Err(ConfigError::InvalidValue(_))
        ));

        let bad_key = r#"
[[policies.push]]
"#;
        assert!(matches!(
            PolicyStore::from_toml_str(bad_key),
            Err(ConfigError::InvalidValue(_))
        ));

        let bad_duration = r#"
[[policies."git.push"]]
expires = "soon"
"#;
        assert!(PolicyStore::from_toml_str(bad_duration).is_err());

        let duplicate = r#"
[[policies."git.push"]]
name = "same"
[[policies."git.tag"]]
name = "same"
"#;
        assert!(PolicyStore::from_toml_str(duplicate).is_err());

        assert!(matches!(
            PolicyStore::from_toml_str("policies = ["),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_get_unknown_policy() {
        let store = PolicyStore::default();
        assert!(matches!(store.get("nope"), Err(PolicyError::NotFound(_))));
        assert!(store.is_empty());
    }
}
