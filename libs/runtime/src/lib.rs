//! Process-level plumbing shared by the server binary: layered configuration,
//! logging, home directory resolution and shutdown signals.

pub mod config;
pub mod home_dir;
pub mod logging;
pub mod shutdown;

pub use config::{AppConfig, CliArgs, DatabaseConfig, LoggingConfig, Section, ServerConfig};
pub use logging::init_logging_from_config;
pub use shutdown::wait_for_shutdown;
