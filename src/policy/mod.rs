pub mod duration;
pub mod store;
pub mod types;

pub use duration::{MAX_DURATION, deadline, format_duration, parse_duration};
pub use store::{PolicyError, PolicyStore};
pub use types::{Condition, DEFAULT_EXPIRES, DEFAULT_METHOD, Decision, Explained, Policy, explain};
