/// Configuration file loader
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{ConfigError, TerminalConfig};

/// Prefix of environment variables that override file values
pub const ENV_PREFIX: &str = "RS_TERMINAL";

/// Values that may be overridden through `RS_TERMINAL_*` variables
#[derive(Debug, Default, Deserialize)]
pub struct EnvOverrides {
    pub http_port: Option<u16>,
    pub webtransport_port: Option<u16>,
    pub default_shell_type: Option<String>,
    pub session_timeout: Option<u64>,
    pub pty_backend: Option<String>,
    pub log_level: Option<String>,
}

/// Configuration loader responsible for loading and parsing configuration files
#[derive(Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file (or built-in defaults), then apply
    /// environment overrides and validate the result
    pub fn load_config(&self, config_path: Option<&Path>) -> Result<TerminalConfig, ConfigError> {
        let mut config = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.display().to_string()));
                }
                self.load_config_from_file(path)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    info!("Using default configuration file path: {:?}", path);
                    self.load_config_from_file(&path)?
                }
                _ => {
                    info!("No configuration file found, using built-in defaults");
                    TerminalConfig::default()
                }
            },
        };

        let overrides = self.env_overrides()?;
        apply_overrides(&mut config, overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    fn load_config_from_file(&self, path: &Path) -> Result<TerminalConfig, ConfigError> {
        info!("Loading configuration from file: {:?}", path);
        let contents = fs::read_to_string(path)?;
        self.parse_config(&contents)
    }

    /// Parse configuration from string content
    pub fn parse_config(&self, content: &str) -> Result<TerminalConfig, ConfigError> {
        let config = toml::from_str::<TerminalConfig>(content)?;
        info!("Configuration parsed successfully");
        Ok(config)
    }

    /// Collect `RS_TERMINAL_*` variables from the process environment
    fn env_overrides(&self) -> Result<EnvOverrides, ConfigError> {
        let source = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(source.try_deserialize::<EnvOverrides>()?)
    }
}

/// Apply environment overrides on top of file values
pub fn apply_overrides(config: &mut TerminalConfig, overrides: EnvOverrides) -> Result<(), ConfigError> {
    if let Some(port) = overrides.http_port {
        debug!("Overriding http_port from environment: {}", port);
        config.http_port = port;
    }
    if let Some(port) = overrides.webtransport_port {
        debug!("Overriding webtransport_port from environment: {}", port);
        config.webtransport_port = port;
    }
    if let Some(shell_type) = overrides.default_shell_type {
        config.default_shell_type = shell_type;
    }
    if let Some(timeout) = overrides.session_timeout {
        config.session_timeout = timeout;
    }
    if let Some(backend) = overrides.pty_backend {
        config.pty_backend = backend.parse()?;
    }
    if let Some(level) = overrides.log_level {
        config.logging.level = level;
    }
    Ok(())
}

/// Default configuration path
pub fn default_config_path() -> Option<PathBuf> {
    // 使用当前工作目录作为默认配置文件目录
    std::env::current_dir().ok().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PtyBackend, TerminalSize};
    use std::io::Write;

    const SAMPLE: &str = r#"
        default_shell_type = "zsh"
        default_working_directory = "/srv"
        session_timeout = 60000
        pty_backend = "memory"

        [default_size]
        columns = 100
        rows = 30

        [shells.zsh]
        command = ["zsh", "-l"]
        working_directory = "/home/x"

        [shells.zsh.environment]
        TERM = "xterm-256color"
        EDITOR = "vim"

        [shells.zsh.size]
        columns = 132
        rows = 43
    "#;

    #[test]
    fn parses_full_document() {
        let config = ConfigLoader::new().parse_config(SAMPLE).unwrap();
        assert_eq!(config.default_shell_type, "zsh");
        assert_eq!(config.default_working_directory, "/srv");
        assert_eq!(config.session_timeout, 60_000);
        assert_eq!(config.pty_backend, PtyBackend::Memory);
        assert_eq!(config.default_size, TerminalSize::new(100, 30).unwrap());
        // Unspecified fields keep their defaults
        assert_eq!(config.http_port, 8080);

        let zsh = config.shell_config("zsh").unwrap();
        assert_eq!(zsh.command, vec!["zsh", "-l"]);
        assert_eq!(zsh.working_directory.as_deref(), Some("/home/x"));
        assert_eq!(zsh.environment.get("EDITOR").map(String::as_str), Some("vim"));
        assert_eq!(zsh.size, Some(TerminalSize::new(132, 43).unwrap()));
    }

    #[test]
    fn rejects_zero_sized_shell() {
        let doc = r#"
            [shells.bad]
            command = ["sh"]
            size = { columns = 0, rows = 10 }
        "#;
        assert!(ConfigLoader::new().parse_config(doc).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = ConfigLoader::new().load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ConfigLoader::new().load_config(Some(&path)).unwrap();
        assert!(config.shell_config("zsh").is_some());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = TerminalConfig::default();
        let overrides = EnvOverrides {
            http_port: Some(9000),
            session_timeout: Some(5_000),
            pty_backend: Some("process".to_string()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        apply_overrides(&mut config, overrides).unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.session_timeout, 5_000);
        assert_eq!(config.pty_backend, PtyBackend::Process);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.webtransport_port, 8082);
    }

    #[test]
    fn unknown_backend_override_is_rejected() {
        let mut config = TerminalConfig::default();
        let overrides = EnvOverrides {
            pty_backend: Some("telnet".to_string()),
            ..Default::default()
        };
        assert!(apply_overrides(&mut config, overrides).is_err());
    }
}
