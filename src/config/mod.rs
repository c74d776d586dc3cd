/// Configuration module for the web terminal backend
mod config;
mod config_loader;
mod error;
mod logging;

pub use self::config::*;
pub use config_loader::ConfigLoader;
pub use error::ConfigError;
pub use logging::init_logging;
