use super::ApprovalError;
use super::resolver::Outcome;
use super::server::{ApprovalServer, start_browser_approval};
use super::session::ApprovalSession;
use crate::config::RuntimeFlags;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A channel through which a human confirms an operation.
///
/// Implementations start whatever trigger source they need and hand back an
/// [`ApprovalServer`] whose resolution cell that source writes into.
#[async_trait]
pub trait ApprovalMethod: Send + Sync {
    /// Value of `policy.method` this implementation serves
    fn name(&self) -> &str;

    async fn start(
        &self,
        cancel: CancellationToken,
        session: ApprovalSession,
    ) -> Result<ApprovalServer, ApprovalError>;
}

/// Out-of-band approval through a local web page
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserMethod;

#[async_trait]
impl ApprovalMethod for BrowserMethod {
    fn name(&self) -> &str {
        "browser"
    }

    async fn start(
        &self,
        cancel: CancellationToken,
        session: ApprovalSession,
    ) -> Result<ApprovalServer, ApprovalError> {
        start_browser_approval(cancel, session).await
    }
}

/// Approval methods keyed by name
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Arc<dyn ApprovalMethod>>,
    auto_deny: bool,
}

impl MethodRegistry {
    /// Empty registry; every method is unsupported until registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the browser method, honoring the auto-deny flag
    pub fn with_defaults(flags: RuntimeFlags) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BrowserMethod));
        registry.auto_deny = flags.auto_deny;
        registry
    }

    /// Add or replace a method under its own name
    pub fn register(&mut self, method: Arc<dyn ApprovalMethod>) {
        self.methods.insert(method.name().to_string(), method);
    }

    pub fn set_auto_deny(&mut self, auto_deny: bool) {
        self.auto_deny = auto_deny;
    }

    pub fn supported(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ApprovalMethod>, ApprovalError> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| ApprovalError::UnsupportedMethod {
                method: name.to_string(),
                supported: self.supported().join(", "),
            })
    }

    /// Start an approval for `session` using its policy's method.
    ///
    /// Unsupported methods fail before anything starts. With auto-deny set the
    /// session resolves as denied without binding a listener.
    pub async fn start(
        &self,
        cancel: CancellationToken,
        session: ApprovalSession,
    ) -> Result<ApprovalServer, ApprovalError> {
        let method = self.get(&session.policy.method)?;

        if self.auto_deny {
            tracing::info!(policy = %session.policy.name, "auto-deny set, skipping approval server");
            return Ok(ApprovalServer::resolved(session, Outcome::Denied));
        }

        method.start(cancel, session).await
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.supported())
            .field("auto_deny", &self.auto_deny)
            .finish()
    }
}
