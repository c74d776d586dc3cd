/// Configuration data structures
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::ConfigError;

/// Terminal dimensions. Both values are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTerminalSize")]
pub struct TerminalSize {
    /// Number of columns
    columns: u16,

    /// Number of rows
    rows: u16,
}

#[derive(Deserialize)]
struct RawTerminalSize {
    columns: i64,
    rows: i64,
}

impl TryFrom<RawTerminalSize> for TerminalSize {
    type Error = ConfigError;

    fn try_from(raw: RawTerminalSize) -> Result<Self, Self::Error> {
        TerminalSize::from_dimensions(raw.columns, raw.rows)
    }
}

impl TerminalSize {
    /// Create a terminal size, rejecting zero dimensions
    pub fn new(columns: u16, rows: u16) -> Result<Self, ConfigError> {
        if columns == 0 || rows == 0 {
            return Err(ConfigError::InvalidTerminalSize {
                columns: columns.into(),
                rows: rows.into(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Create a terminal size from untrusted signed input (REST bodies, config files)
    pub fn from_dimensions(columns: i64, rows: i64) -> Result<Self, ConfigError> {
        match (u16::try_from(columns), u16::try_from(rows)) {
            (Ok(c), Ok(r)) => Self::new(c, r),
            _ => Err(ConfigError::InvalidTerminalSize { columns, rows }),
        }
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            columns: 80,
            rows: 24,
        }
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

/// Which PTY implementation backs new processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyBackend {
    /// Native pseudo-terminal through portable-pty
    #[default]
    Portable,
    /// Plain child process with piped stdio
    Process,
    /// In-memory echo terminal
    Memory,
}

impl std::str::FromStr for PtyBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portable" => Ok(PtyBackend::Portable),
            "process" => Ok(PtyBackend::Process),
            "memory" => Ok(PtyBackend::Memory),
            other => Err(ConfigError::InvalidStructure(format!(
                "unknown pty backend: {}",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when RUST_LOG is not set
    pub level: String,

    /// Emit JSON lines on the console instead of plain text
    pub json: bool,

    /// Directory for daily rolling log files
    pub directory: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "web_terminal=info".to_string(),
            json: false,
            directory: None,
        }
    }
}

/// Terminal configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TerminalConfig {
    /// HTTP / WebSocket port
    pub http_port: u16,

    /// WebTransport (QUIC) port
    pub webtransport_port: u16,

    /// Default shell type
    pub default_shell_type: String,

    /// Default terminal dimensions
    pub default_size: TerminalSize,

    /// Default working directory
    pub default_working_directory: String,

    /// Session timeout in milliseconds (default: 30 minutes)
    pub session_timeout: u64,

    /// How often expired sessions are swept, in milliseconds
    pub expiry_check_interval: u64,

    /// PTY implementation used for new processes
    pub pty_backend: PtyBackend,

    /// Shell configurations keyed by shell type
    pub shells: HashMap<String, ShellConfig>,

    /// Logging
    pub logging: LogConfig,
}

/// Shell configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ShellConfig {
    /// Command to execute, program first
    pub command: Vec<String>,

    /// Working directory (optional)
    #[serde(default)]
    pub working_directory: Option<String>,

    /// Environment variables layered over the host environment
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Terminal size (optional)
    #[serde(default)]
    pub size: Option<TerminalSize>,
}

impl ShellConfig {
    fn with_command(command: &[&str]) -> Self {
        let mut environment = HashMap::new();
        environment.insert("TERM".to_string(), "xterm-256color".to_string());
        Self {
            command: command.iter().map(|s| s.to_string()).collect(),
            working_directory: None,
            environment,
            size: None,
        }
    }
}

impl TerminalConfig {
    /// Look up the shell table entry for a shell type
    pub fn shell_config(&self, shell_type: &str) -> Option<&ShellConfig> {
        self.shells.get(shell_type)
    }

    /// Check invariants the deserializer cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_timeout == 0 {
            return Err(ConfigError::InvalidStructure(
                "session_timeout must be greater than zero".to_string(),
            ));
        }
        if self.default_shell_type.trim().is_empty() {
            return Err(ConfigError::InvalidStructure(
                "default_shell_type must not be blank".to_string(),
            ));
        }
        for (name, shell) in &self.shells {
            if shell.command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(ConfigError::InvalidStructure(format!(
                    "shell '{}' has an empty command",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Default configuration values
impl Default for TerminalConfig {
    fn default() -> Self {
        // 根据平台选择默认shell类型
        let default_shell_type = if cfg!(windows) { "cmd" } else { "bash" };

        let mut shells = HashMap::new();
        shells.insert("bash".to_string(), ShellConfig::with_command(&["bash", "-l"]));
        shells.insert("sh".to_string(), ShellConfig::with_command(&["sh"]));
        shells.insert("cmd".to_string(), ShellConfig::with_command(&["cmd.exe"]));
        shells.insert(
            "powershell".to_string(),
            ShellConfig::with_command(&["powershell.exe", "-NoLogo"]),
        );

        Self {
            http_port: 8080,
            webtransport_port: 8082,
            default_shell_type: default_shell_type.to_string(),
            default_size: TerminalSize::default(),
            default_working_directory: ".".to_string(),
            session_timeout: 1_800_000,
            expiry_check_interval: 60_000,
            pty_backend: PtyBackend::default(),
            shells,
            logging: LogConfig::default(),
        }
    }
}
