use std::{fmt, process::Stdio, time::Duration};

use tokio::process::Command;

use crate::ExecError;

/// How the command line is handed to the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A single string interpreted by `/bin/sh -c`.
    Shell(String),
    /// An argument vector; the first element is the executable.
    Argv(Vec<String>),
}

/// What happens to the child's standard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    /// Sent to the null device.
    #[default]
    Discard,
    /// Shares the daemon's own stderr.
    Inherit,
}

/// Specification of one robust command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub line: CommandLine,
    /// Tolerated failures before giving up. Must be at least 1.
    pub max_attempts: u32,
    /// Per-attempt wall-clock limit before the child is killed.
    pub timeout: Duration,
    pub stderr: StderrMode,
}

impl CommandSpec {
    /// Shell command with the historical defaults: 5 attempts, 45 s timeout,
    /// stderr discarded.
    pub fn shell<S: Into<String>>(line: S) -> Self {
        Self {
            line: CommandLine::Shell(line.into()),
            max_attempts: 5,
            timeout: Duration::from_secs(45),
            stderr: StderrMode::Discard,
        }
    }

    /// Argv command with the same defaults as [`shell`](Self::shell).
    pub fn argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            line: CommandLine::Argv(argv.into_iter().map(Into::into).collect()),
            max_attempts: 5,
            timeout: Duration::from_secs(45),
            stderr: StderrMode::Discard,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stderr(mut self, stderr: StderrMode) -> Self {
        self.stderr = stderr;
        self
    }

    /// Validate the spec before the first spawn.
    ///
    /// Rules:
    /// - the command line is not empty or whitespace-only;
    /// - `max_attempts >= 1`;
    /// - `timeout > 0`.
    pub fn validate(&self) -> Result<(), ExecError> {
        match &self.line {
            CommandLine::Shell(line) if line.trim().is_empty() => {
                return Err(ExecError::InvalidSpec("shell command is empty".into()));
            }
            CommandLine::Argv(argv) if argv.is_empty() || argv[0].trim().is_empty() => {
                return Err(ExecError::InvalidSpec("argv command is empty".into()));
            }
            _ => {}
        }
        if self.max_attempts == 0 {
            return Err(ExecError::InvalidSpec("max_attempts must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(ExecError::InvalidSpec("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Build the `tokio` command for one attempt: stdout piped for capture,
    /// stderr per [`StderrMode`].
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = match &self.line {
            CommandLine::Shell(line) => {
                let mut c = Command::new("/bin/sh");
                c.arg("-c").arg(line);
                c
            }
            CommandLine::Argv(argv) => {
                let mut c = Command::new(&argv[0]);
                c.args(&argv[1..]);
                c
            }
        };
        cmd.stdout(Stdio::piped());
        cmd.stderr(match self.stderr {
            StderrMode::Discard => Stdio::null(),
            StderrMode::Inherit => Stdio::inherit(),
        });
        cmd.kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.line {
            CommandLine::Shell(line) => write!(f, "sh -c {line:?}"),
            CommandLine::Argv(argv) => write!(f, "{}", argv.join(" ")),
        }
    }
}
