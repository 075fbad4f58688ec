//! Shell command rendering.

use std::borrow::Cow;
use std::path::Path;

/// Dialect of the shell commands are typed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Posix,
    Cmd,
}

impl ShellKind {
    pub fn current() -> Self {
        if cfg!(windows) {
            ShellKind::Cmd
        } else {
            ShellKind::Posix
        }
    }
}

/// Builds the lines sent to a terminal.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    cli: String,
    shell: ShellKind,
}

impl CommandBuilder {
    pub fn new(cli: impl Into<String>) -> Self {
        Self {
            cli: cli.into(),
            shell: ShellKind::current(),
        }
    }

    pub fn with_shell(mut self, shell: ShellKind) -> Self {
        self.shell = shell;
        self
    }

    pub fn cli(&self) -> &str {
        &self.cli
    }

    pub fn escape(&self, value: &str) -> String {
        match self.shell {
            ShellKind::Posix => shell_escape::unix::escape(Cow::Borrowed(value)).into_owned(),
            ShellKind::Cmd => shell_escape::windows::escape(Cow::Borrowed(value)).into_owned(),
        }
    }

    pub fn escape_path(&self, path: &Path) -> String {
        self.escape(&path.to_string_lossy())
    }

    /// `export KEY=value` (or `set "KEY=value"` under cmd).
    pub fn export_env(&self, key: &str, value: &str) -> String {
        match self.shell {
            ShellKind::Posix => format!("export {key}={}", self.escape(value)),
            ShellKind::Cmd => format!("set \"{key}={value}\""),
        }
    }

    /// `<cli> [--scope=<id>] <file> [args...]`
    pub fn driving_command(&self, scope_id: Option<&str>, file: &Path, extra_args: &[String]) -> String {
        let mut parts = vec![self.escape(&self.cli)];
        if let Some(id) = scope_id {
            parts.push(format!("--scope={}", self.escape(id)));
        }
        parts.push(self.escape_path(file));
        parts.extend(extra_args.iter().map(|arg| self.escape(arg)));
        parts.join(" ")
    }
}
