//! Capability seams for the external collaborators.
//!
//! The control loop only talks to the batch system and the cloud through
//! these traits; the command-backed implementations below shell out via
//! [`vmq_exec::RobustExecutor`] so that nothing in the loop binds to one
//! batch wire format or cloud API.
use std::time::Duration;

use async_trait::async_trait;

use vmq_model::{InstanceId, InstanceInfo};

use crate::error::CoreResult;

mod command;
pub use command::{CommandBatchPlugin, CommandCloudProvider};

/// Reports queue pressure from the batch system.
#[async_trait]
pub trait BatchPlugin: Send + Sync {
    /// Plugin name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Number of jobs that have been waiting for longer than `older_than`.
    async fn count_waiting_jobs(&self, older_than: Duration) -> CoreResult<u64>;
}

/// Boots and terminates compute instances.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// All instances visible with the current credentials.
    async fn list_instances(&self) -> CoreResult<Vec<InstanceInfo>>;

    /// Request `count` new instances; returns the ids actually granted.
    async fn boot_instances(&self, count: u64) -> CoreResult<Vec<InstanceId>>;

    /// Request termination of one instance.
    async fn terminate_instance(&self, id: &InstanceId) -> CoreResult<()>;
}
