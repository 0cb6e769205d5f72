use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    command::CommandSpec,
    outcome::{CommandResult, RunOutcome, exit_code_of},
};

/// Executes external commands with retries, timeouts and cooperative
/// cancellation.
///
/// Attempts are strictly serialized: at any instant at most one child
/// process and one timeout watcher are live. A shutdown request stops
/// backoff sleeps and prevents new attempts but never kills an already
/// spawned child; only its own timeout watcher does that.
#[derive(Debug, Clone, Copy, Default)]
pub struct RobustExecutor;

impl RobustExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `spec`, retrying up to `spec.max_attempts` times.
    ///
    /// Attempt `n > 1` is preceded by an `n`-second backoff sleep that is
    /// raced against `cancel`. The attempt itself races the child against a
    /// `spec.timeout` watcher; when the watcher fires first the child is
    /// killed and the attempt counts as failed. A zero exit short-circuits
    /// with captured stdout.
    pub async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> RunOutcome {
        if let Err(e) = spec.validate() {
            error!(command = %spec, error = %e, "refusing to run invalid command spec");
            return RunOutcome::NeverRan;
        }

        let mut last_exit: Option<i32> = None;

        for attempt in 1..=spec.max_attempts {
            if cancel.is_cancelled() {
                debug!(command = %spec, "not retrying command upon shutdown request");
                return RunOutcome::Cancelled;
            }

            if attempt > 1 {
                let backoff = Duration::from_secs(u64::from(attempt));
                info!(attempt, backoff_s = attempt, "waiting before retrying");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => {
                        debug!(command = %spec, "backoff interrupted by shutdown request");
                        return RunOutcome::Cancelled;
                    }
                }
            }

            let mut child = match spec.to_command().spawn() {
                Ok(child) => child,
                Err(e) => {
                    error!(command = %spec, attempt, error = %e, "command cannot be executed");
                    continue;
                }
            };

            // Drain stdout concurrently so a chatty child cannot block on a
            // full pipe while we wait on it.
            let reader = spawn_stdout_reader(&mut child);

            let waited: Option<std::process::ExitStatus> = tokio::select! {
                res = child.wait() => match res {
                    Ok(status) => Some(status),
                    Err(e) => {
                        error!(command = %spec, attempt, error = %e, "wait on child failed");
                        None
                    }
                },
                _ = tokio::time::sleep(spec.timeout) => {
                    error!(
                        command = %spec,
                        attempt,
                        timeout_s = spec.timeout.as_secs(),
                        "command timeout reached: terminating",
                    );
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "kill after timeout failed");
                    }
                    match child.wait().await {
                        Ok(status) => Some(status),
                        Err(e) => {
                            error!(command = %spec, attempt, error = %e, "wait after kill failed");
                            None
                        }
                    }
                }
            };

            let Some(status) = waited else {
                reader.abort();
                continue;
            };

            let code = exit_code_of(&status);
            last_exit = Some(code);

            // A zero status is a success even when the watcher fired first:
            // the child may have exited cleanly right at the deadline, and a
            // kill aimed at an already-exited process changes nothing.
            if code == 0 {
                let stdout = reader.await.unwrap_or_default();
                info!(command = %spec, attempt, "process exited OK");
                return RunOutcome::Completed(CommandResult::success(
                    String::from_utf8_lossy(&stdout).into_owned(),
                ));
            }

            reader.abort();
            if code > 0 {
                debug!(command = %spec, attempt, code, "command failed");
            } else {
                debug!(command = %spec, attempt, signal = -code, "command terminated by signal");
            }
        }

        match last_exit {
            Some(code) => {
                error!(
                    command = %spec,
                    attempts = spec.max_attempts,
                    code,
                    "giving up: last exit code recorded",
                );
                RunOutcome::Completed(CommandResult::failure(code))
            }
            None => {
                error!(command = %spec, attempts = spec.max_attempts, "giving up: command never ran");
                RunOutcome::NeverRan
            }
        }
    }
}

fn spawn_stdout_reader(child: &mut Child) -> JoinHandle<Vec<u8>> {
    let stdout = child.stdout.take();
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            let _ = out.read_to_end(&mut buf).await;
        }
        buf
    })
}
