pub mod approval;
pub mod audit;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod grant;
pub mod policy;

// Re-export commonly used types for convenience
pub use approval::{ApprovalError, ApprovalServer, ApprovalSession, MethodRegistry, Outcome};
pub use config::{GuardianHome, RuntimeFlags, ensure_config};
pub use context::{Attribute, OperationContext};
pub use error::{GuardianError, GuardianResult};
pub use exec::{Authorization, Guard, Reporter, Request};
pub use grant::{Grant, GrantStore};
pub use policy::{Decision, Policy, PolicyStore};
