use std::time::Duration;

use vmq_model::{
    ResolvedConfig,
    config::{
        DEFAULT_CHECK_QUEUE_EVERY_S, DEFAULT_CHECK_VMS_EVERY_S, DEFAULT_CHECK_VMS_IN_ERROR_EVERY_S,
        DEFAULT_ESTIMATED_VM_DEPLOY_TIME_S, DEFAULT_IDLE_FOR_TIME_S, DEFAULT_MAX_VMS,
        DEFAULT_MIN_VMS, DEFAULT_N_JOBS_PER_VM, DEFAULT_SLEEP_S, DEFAULT_WAITING_JOBS_THRESHOLD,
        DEFAULT_WAITING_JOBS_TIME_S, sections,
    },
};

/// Control-loop cadences and scale thresholds, extracted once at startup.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Base tick interval.
    pub sleep: Duration,
    pub check_queue_every: Duration,
    pub check_vms_every: Duration,
    pub check_vms_in_error_every: Duration,
    /// Grace period a booting instance is given before it counts as stale.
    pub estimated_vm_deploy_time: Duration,
    /// Strictly-above threshold on the waiting-job count.
    pub waiting_jobs_threshold: u64,
    /// Only jobs waiting longer than this are counted.
    pub waiting_jobs_time: Duration,
    pub n_jobs_per_vm: u64,
    /// Idle time after which an instance becomes a termination candidate.
    pub idle_for_time: Duration,
    pub min_vms: u64,
    /// `0` disables the upper quota.
    pub max_vms: u64,
    pub dry_run_boot: bool,
    pub dry_run_shutdown: bool,
}

impl LoopSettings {
    /// Read every setting from the resolved configuration, falling back to
    /// the documented default when a value was overridden with a
    /// non-numeric string.
    pub fn from_config(cfg: &ResolvedConfig) -> Self {
        let main = sections::MAIN;
        let secs = |key: &str, default: u64| {
            Duration::from_secs(cfg.get_u64(main, key).unwrap_or(default))
        };

        Self {
            sleep: secs("sleep_s", DEFAULT_SLEEP_S),
            check_queue_every: secs("check_queue_every_s", DEFAULT_CHECK_QUEUE_EVERY_S),
            check_vms_every: secs("check_vms_every_s", DEFAULT_CHECK_VMS_EVERY_S),
            check_vms_in_error_every: secs(
                "check_vms_in_error_every_s",
                DEFAULT_CHECK_VMS_IN_ERROR_EVERY_S,
            ),
            estimated_vm_deploy_time: secs(
                "estimated_vm_deploy_time_s",
                DEFAULT_ESTIMATED_VM_DEPLOY_TIME_S,
            ),
            waiting_jobs_threshold: cfg
                .get_u64(main, "waiting_jobs_threshold")
                .unwrap_or(DEFAULT_WAITING_JOBS_THRESHOLD),
            waiting_jobs_time: secs("waiting_jobs_time_s", DEFAULT_WAITING_JOBS_TIME_S),
            n_jobs_per_vm: cfg
                .get_u64(main, "n_jobs_per_vm")
                .unwrap_or(DEFAULT_N_JOBS_PER_VM),
            idle_for_time: secs("idle_for_time_s", DEFAULT_IDLE_FOR_TIME_S),
            min_vms: cfg
                .get_u64(sections::QUOTA, "min_vms")
                .unwrap_or(DEFAULT_MIN_VMS),
            max_vms: cfg
                .get_u64(sections::QUOTA, "max_vms")
                .unwrap_or(DEFAULT_MAX_VMS),
            dry_run_boot: cfg
                .get_u64(sections::DEBUG, "dry_run_boot_vms")
                .unwrap_or(0)
                != 0,
            dry_run_shutdown: cfg
                .get_u64(sections::DEBUG, "dry_run_shutdown_vms")
                .unwrap_or(0)
                != 0,
        }
    }
}
