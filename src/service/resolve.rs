/// Request > shell config > global default resolution shared by both factories
use crate::config::{ShellConfig, TerminalConfig, TerminalSize};

#[derive(Debug)]
pub(crate) struct ResolvedShell<'a> {
    pub shell_type: String,
    pub shell_config: Option<&'a ShellConfig>,
    pub working_directory: String,
    pub size: TerminalSize,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn resolve_shell<'a>(
    config: &'a TerminalConfig,
    shell_type: Option<&str>,
    working_directory: Option<&str>,
    size: Option<TerminalSize>,
) -> ResolvedShell<'a> {
    let shell_type = non_blank(shell_type)
        .unwrap_or(&config.default_shell_type)
        .to_string();
    let shell_config = config.shell_config(&shell_type);

    let working_directory = non_blank(working_directory)
        .or_else(|| non_blank(shell_config.and_then(|shell| shell.working_directory.as_deref())))
        .unwrap_or(&config.default_working_directory)
        .to_string();

    let size = size
        .or_else(|| shell_config.and_then(|shell| shell.size))
        .unwrap_or(config.default_size);

    ResolvedShell {
        shell_type,
        shell_config,
        working_directory,
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TerminalConfig {
        let mut config = TerminalConfig::default();
        config.default_shell_type = "bash".to_string();
        config.default_working_directory = "/srv".to_string();
        config.shells.insert(
            "bash".to_string(),
            ShellConfig {
                command: vec!["bash".to_string()],
                working_directory: Some("/home/x".to_string()),
                environment: Default::default(),
                size: Some(TerminalSize::new(120, 40).unwrap()),
            },
        );
        config
    }

    #[test]
    fn request_values_win() {
        let config = config();
        let size = TerminalSize::new(100, 30).unwrap();
        let resolved = resolve_shell(&config, Some("bash"), Some("/tmp"), Some(size));
        assert_eq!(resolved.shell_type, "bash");
        assert_eq!(resolved.working_directory, "/tmp");
        assert_eq!(resolved.size, size);
    }

    #[test]
    fn shell_config_then_defaults() {
        let config = config();
        let resolved = resolve_shell(&config, None, Some("  "), None);
        assert_eq!(resolved.working_directory, "/home/x");
        assert_eq!(resolved.size, TerminalSize::new(120, 40).unwrap());

        let resolved = resolve_shell(&config, Some("fish"), None, None);
        assert!(resolved.shell_config.is_none());
        assert_eq!(resolved.working_directory, "/srv");
        assert_eq!(resolved.size, config.default_size);
    }
}
