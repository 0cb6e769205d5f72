use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Opaque identifier of a cloud compute instance.
///
/// The daemon never interprets the contents; it is whatever the cloud
/// provider hands out (`i-0abc...`, a UUID, a hostname).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of an instance as reported by the cloud provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceState {
    /// Requested but not yet joined the pool.
    Booting,
    /// Up and executing jobs.
    Running,
    /// Up with no jobs assigned.
    Idle,
    /// Reported broken by the provider.
    Error,
}

impl FromStr for InstanceState {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "booting" | "pending" => Ok(InstanceState::Booting),
            "running" => Ok(InstanceState::Running),
            "idle" => Ok(InstanceState::Idle),
            "error" | "errored" => Ok(InstanceState::Error),
            other => Err(ModelError::UnknownInstanceState(other.to_string())),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Booting => "booting",
            InstanceState::Running => "running",
            InstanceState::Idle => "idle",
            InstanceState::Error => "error",
        };
        f.write_str(s)
    }
}

/// One entry of a cloud provider instance listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub state: InstanceState,
    /// Time spent in the current state.
    pub age: Duration,
}

impl InstanceInfo {
    pub fn new<I: Into<InstanceId>>(id: I, state: InstanceState, age: Duration) -> Self {
        Self {
            id: id.into(),
            state,
            age,
        }
    }
}
