pub mod method;
pub mod page;
pub mod resolver;
pub mod server;
pub mod session;

pub use method::{ApprovalMethod, BrowserMethod, MethodRegistry};
pub use resolver::{Outcome, Resolver};
pub use server::{ApprovalServer, start_browser_approval};
pub use session::ApprovalSession;

use thiserror::Error;

/// Why an approval did not end in an affirmative answer
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval denied: the request was rejected in the browser")]
    Denied,

    #[error("Approval expired: nobody responded before the deadline")]
    Expired,

    #[error("Approval cancelled before a decision was made")]
    Cancelled,

    #[error("Unsupported approval method '{method}' (supported: {supported})")]
    UnsupportedMethod { method: String, supported: String },

    #[error("Failed to start approval server: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Approval server error: {0}")]
    Server(String),
}
