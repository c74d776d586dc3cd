/// Starts PTY processes for sessions
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::{TerminalConfig, TerminalSize};
use crate::pty::{AsyncPty, PtyConfig, PtyError, PtyFactory};
use crate::service::resolve::resolve_shell;

pub struct ProcessFactory {
    config: Arc<TerminalConfig>,
    pty_factory: Arc<dyn PtyFactory>,
}

impl ProcessFactory {
    pub fn new(config: Arc<TerminalConfig>, pty_factory: Arc<dyn PtyFactory>) -> Self {
        Self { config, pty_factory }
    }

    /// Build the launch parameters for a session.
    ///
    /// Only shell types present in the shell table can be started.
    pub fn pty_config(
        &self,
        working_directory: Option<&str>,
        shell_type: Option<&str>,
        size: Option<TerminalSize>,
    ) -> Result<PtyConfig, PtyError> {
        let resolved = resolve_shell(&self.config, shell_type, working_directory, size);
        let shell = resolved
            .shell_config
            .ok_or_else(|| PtyError::ShellNotConfigured(resolved.shell_type.clone()))?;
        let (program, args) = shell
            .command
            .split_first()
            .ok_or_else(|| PtyError::ShellNotConfigured(resolved.shell_type.clone()))?;

        Ok(PtyConfig {
            command: program.clone(),
            args: args.to_vec(),
            size: resolved.size,
            env: merge_environment(std::env::vars_os(), &shell.environment),
            cwd: Some(PathBuf::from(resolved.working_directory)),
        })
    }

    /// Start a process for `session_id`
    pub async fn create_process(
        &self,
        session_id: &str,
        working_directory: Option<&str>,
        shell_type: Option<&str>,
        size: Option<TerminalSize>,
    ) -> Result<Box<dyn AsyncPty>, PtyError> {
        let config = self.pty_config(working_directory, shell_type, size)?;
        info!(
            "Starting {} process for session {} ({} {:?} in {:?}, {})",
            self.pty_factory.name(),
            session_id,
            config.command,
            config.args,
            config.cwd,
            config.size
        );

        self.pty_factory
            .create(session_id, &config)
            .await
            .inspect_err(|e| error!("Failed to start process for session {}: {}", session_id, e))
    }
}

/// 宿主环境变量 + shell 配置覆盖
///
/// Host variables are kept as raw OS strings, so values that are not valid
/// UTF-8 pass through untouched.
fn merge_environment(
    host: impl IntoIterator<Item = (OsString, OsString)>,
    overrides: &HashMap<String, String>,
) -> Vec<(OsString, OsString)> {
    let mut env: HashMap<OsString, OsString> = host.into_iter().collect();
    env.extend(
        overrides
            .iter()
            .map(|(key, value)| (OsString::from(key), OsString::from(value))),
    );
    env.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use crate::config::ShellConfig;
    use crate::pty::MemoryPtyFactory;

    fn factory() -> ProcessFactory {
        let mut config = TerminalConfig::default();
        config.default_shell_type = "bash".to_string();
        config.default_working_directory = "/srv".to_string();
        let mut environment = HashMap::new();
        environment.insert("PATH".to_string(), "/opt/shell/bin".to_string());
        environment.insert("TERM".to_string(), "xterm-256color".to_string());
        config.shells.insert(
            "bash".to_string(),
            ShellConfig {
                command: vec!["bash".to_string(), "-l".to_string()],
                working_directory: Some("/home/x".to_string()),
                environment,
                size: None,
            },
        );
        ProcessFactory::new(Arc::new(config), Arc::new(MemoryPtyFactory))
    }

    #[test]
    fn splits_command_and_merges_environment() {
        let config = factory().pty_config(None, None, None).unwrap();
        assert_eq!(config.command, "bash");
        assert_eq!(config.args, vec!["-l"]);
        assert_eq!(config.cwd, Some(PathBuf::from("/home/x")));
        assert_eq!(config.size, TerminalSize::default());

        let env: HashMap<OsString, OsString> = config.env.into_iter().collect();
        assert_eq!(env.get(OsStr::new("PATH")), Some(&OsString::from("/opt/shell/bin")));
        assert_eq!(env.get(OsStr::new("TERM")), Some(&OsString::from("xterm-256color")));
        // host variables survive unless overridden
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(env.get(OsStr::new("HOME")), Some(&home));
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_host_variables_pass_through() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(vec![0xff, 0xfe]);
        let host = vec![
            (OsString::from("RAW_BYTES"), raw.clone()),
            (OsString::from("TERM"), OsString::from("dumb")),
        ];
        let mut overrides = HashMap::new();
        overrides.insert("TERM".to_string(), "xterm-256color".to_string());

        let env: HashMap<OsString, OsString> = merge_environment(host, &overrides).into_iter().collect();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get(OsStr::new("RAW_BYTES")), Some(&raw));
        assert_eq!(env.get(OsStr::new("TERM")), Some(&OsString::from("xterm-256color")));
    }

    #[test]
    fn request_overrides_directory_and_size() {
        let size = TerminalSize::new(100, 30).unwrap();
        let config = factory().pty_config(Some("/tmp"), Some("bash"), Some(size)).unwrap();
        assert_eq!(config.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(config.size, size);
    }

    #[tokio::test]
    async fn unknown_shell_type_is_rejected() {
        let result = factory().create_process("s1", None, Some("fish"), None).await;
        assert!(matches!(result, Err(PtyError::ShellNotConfigured(shell)) if shell == "fish"));
    }

    #[tokio::test]
    async fn creates_live_process() {
        let process = factory().create_process("s1", None, None, None).await.unwrap();
        assert_eq!(process.session_id(), "s1");
        assert!(process.is_alive());
    }
}
