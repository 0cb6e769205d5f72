use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vmq_exec::{CommandSpec, RobustExecutor, RunOutcome};
use vmq_model::{InstanceId, InstanceInfo, InstanceState, ResolvedConfig, config::sections};

use crate::{
    error::{CoreError, CoreResult},
    plugin::{BatchPlugin, CloudProvider},
};

const BATCH_PLUGIN_NAME: &str = "batch-command";
const CLOUD_PLUGIN_NAME: &str = "cloud-command";

/// Run one configured shell command through the robust executor and return
/// its captured stdout.
async fn run_capture(
    plugin: &'static str,
    executor: &RobustExecutor,
    cancel: &CancellationToken,
    template: &str,
) -> CoreResult<String> {
    if template.trim().is_empty() {
        return Err(CoreError::plugin(plugin, "command not configured"));
    }

    match executor.run(&CommandSpec::shell(template), cancel).await {
        RunOutcome::Completed(res) if res.is_success() => Ok(res.output.unwrap_or_default()),
        RunOutcome::Completed(res) => Err(CoreError::plugin(
            plugin,
            format!("command exited with code {}", res.exit_code),
        )),
        RunOutcome::NeverRan => Err(CoreError::plugin(plugin, "command could not be executed")),
        RunOutcome::Cancelled => Err(CoreError::Cancelled),
    }
}

/// Batch plugin backed by a configured shell command.
///
/// The command template may contain `{seconds}`, replaced with the waiting
/// threshold; it must print the matching job count on stdout.
pub struct CommandBatchPlugin {
    executor: RobustExecutor,
    cancel: CancellationToken,
    waiting_jobs_cmd: String,
}

impl CommandBatchPlugin {
    pub fn new<S: Into<String>>(waiting_jobs_cmd: S, cancel: CancellationToken) -> Self {
        Self {
            executor: RobustExecutor::new(),
            cancel,
            waiting_jobs_cmd: waiting_jobs_cmd.into(),
        }
    }

    pub fn from_config(cfg: &ResolvedConfig, cancel: CancellationToken) -> Self {
        Self::new(
            cfg.get_str(sections::BATCH, "waiting_jobs_cmd").unwrap_or(""),
            cancel,
        )
    }
}

#[async_trait]
impl BatchPlugin for CommandBatchPlugin {
    fn name(&self) -> &'static str {
        BATCH_PLUGIN_NAME
    }

    async fn count_waiting_jobs(&self, older_than: Duration) -> CoreResult<u64> {
        let cmd = self
            .waiting_jobs_cmd
            .replace("{seconds}", &older_than.as_secs().to_string());
        let stdout = run_capture(BATCH_PLUGIN_NAME, &self.executor, &self.cancel, &cmd).await?;

        stdout.trim().parse::<u64>().map_err(|_| {
            CoreError::plugin(
                BATCH_PLUGIN_NAME,
                format!("expected a job count on stdout, got {:?}", stdout.trim()),
            )
        })
    }
}

/// Cloud provider backed by configured shell commands.
///
/// - `list_cmd` prints one `<id> <state> <age_seconds>` triple per line;
/// - `boot_cmd` may contain `{count}` and prints one new id per line;
/// - `terminate_cmd` may contain `{id}`.
pub struct CommandCloudProvider {
    executor: RobustExecutor,
    cancel: CancellationToken,
    list_cmd: String,
    boot_cmd: String,
    terminate_cmd: String,
}

impl CommandCloudProvider {
    pub fn new<S: Into<String>>(
        list_cmd: S,
        boot_cmd: S,
        terminate_cmd: S,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor: RobustExecutor::new(),
            cancel,
            list_cmd: list_cmd.into(),
            boot_cmd: boot_cmd.into(),
            terminate_cmd: terminate_cmd.into(),
        }
    }

    pub fn from_config(cfg: &ResolvedConfig, cancel: CancellationToken) -> Self {
        Self::new(
            cfg.get_str(sections::CLOUD, "list_cmd").unwrap_or(""),
            cfg.get_str(sections::CLOUD, "boot_cmd").unwrap_or(""),
            cfg.get_str(sections::CLOUD, "terminate_cmd").unwrap_or(""),
            cancel,
        )
    }
}

#[async_trait]
impl CloudProvider for CommandCloudProvider {
    fn name(&self) -> &'static str {
        CLOUD_PLUGIN_NAME
    }

    async fn list_instances(&self) -> CoreResult<Vec<InstanceInfo>> {
        let stdout =
            run_capture(CLOUD_PLUGIN_NAME, &self.executor, &self.cancel, &self.list_cmd).await?;

        let mut instances = Vec::new();
        for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match parse_instance_line(line) {
                Some(info) => instances.push(info),
                None => warn!(line, "ignoring malformed instance listing line"),
            }
        }
        debug!(count = instances.len(), "instance listing parsed");
        Ok(instances)
    }

    async fn boot_instances(&self, count: u64) -> CoreResult<Vec<InstanceId>> {
        let cmd = self.boot_cmd.replace("{count}", &count.to_string());
        let stdout = run_capture(CLOUD_PLUGIN_NAME, &self.executor, &self.cancel, &cmd).await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(InstanceId::from)
            .collect())
    }

    async fn terminate_instance(&self, id: &InstanceId) -> CoreResult<()> {
        let cmd = self.terminate_cmd.replace("{id}", id.as_str());
        run_capture(CLOUD_PLUGIN_NAME, &self.executor, &self.cancel, &cmd).await?;
        Ok(())
    }
}

fn parse_instance_line(line: &str) -> Option<InstanceInfo> {
    let mut fields = line.split_whitespace();
    let id = fields.next()?;
    let state: InstanceState = fields.next()?.parse().ok()?;
    let age_s: u64 = fields.next()?.parse().ok()?;
    Some(InstanceInfo::new(id, state, Duration::from_secs(age_s)))
}
