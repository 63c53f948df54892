pub mod guard;
pub mod runner;

pub use guard::{Authorization, Guard, Reporter, Request};
pub use runner::{CommandRunner, ExecError, ProcessRunner};
