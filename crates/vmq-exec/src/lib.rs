//! Robust external-command execution.
//!
//! [`RobustExecutor::run`] spawns a command with bounded retries, linear
//! backoff, a timeout watcher that kills the process, and cooperative
//! cancellation through a [`tokio_util::sync::CancellationToken`]. It never
//! surfaces a failure as an error: every call settles into a [`RunOutcome`].
mod error;
pub use error::ExecError;

mod command;
pub use command::{CommandLine, CommandSpec, StderrMode};

mod outcome;
pub use outcome::{CommandResult, RunOutcome, exit_code_of};

mod robust;
pub use robust::RobustExecutor;
