//! Configuration module

mod storage;
mod types;

pub use storage::{config_dir, config_file, ConfigError, ConfigStorage};
pub use types::{default_diagnostic_commands, DeviceEntry, DiagConfig, DEFAULT_TIMESTAMP_FORMAT};
