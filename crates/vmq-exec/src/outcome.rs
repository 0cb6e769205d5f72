use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Final status of a command that ran at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// 0 = success, >0 = process exit status, <0 = terminated by signal
    /// `-exit_code`.
    pub exit_code: i32,
    /// Captured stdout, present only on success.
    pub output: Option<String>,
}

impl CommandResult {
    pub fn success(output: String) -> Self {
        Self {
            exit_code: 0,
            output: Some(output),
        }
    }

    pub fn failure(exit_code: i32) -> Self {
        Self {
            exit_code,
            output: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Settled outcome of [`crate::RobustExecutor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// At least one attempt ran to completion; holds the final result.
    Completed(CommandResult),
    /// Every spawn failed: the command never ran at all.
    NeverRan,
    /// Shutdown was requested before or between attempts.
    Cancelled,
}

impl RunOutcome {
    /// Captured stdout when the command succeeded.
    pub fn output(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed(res) if res.is_success() => res.output.as_deref(),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed(res) if res.is_success())
    }
}

/// Map an OS exit status onto the signed convention above.
pub fn exit_code_of(status: &ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        // No exit code on Unix means the child was terminated by a signal.
        None => -status.signal().unwrap_or(1),
    }
}
