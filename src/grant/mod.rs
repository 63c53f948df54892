pub mod store;

pub use store::{Grant, GrantError, GrantStore};
