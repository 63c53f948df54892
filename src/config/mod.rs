pub mod settings;
pub mod setup;

pub use settings::{ConfigError, GuardianHome, RuntimeFlags};
pub use setup::{DEFAULT_POLICY_FILE, ensure_config};
