use std::collections::BTreeMap;

use super::value::ConfigValue;

/// Well-known section names.
pub mod sections {
    /// Control loop cadences and scale thresholds.
    pub const MAIN: &str = "vmq";
    /// Min/max bounds on the owned pool.
    pub const QUOTA: &str = "quota";
    /// Dry-run switches.
    pub const DEBUG: &str = "debug";
    /// Batch system plugin commands.
    pub const BATCH: &str = "batch";
    /// Cloud provider plugin commands.
    pub const CLOUD: &str = "cloud";
}

pub const DEFAULT_SLEEP_S: u64 = 5;
pub const DEFAULT_CHECK_QUEUE_EVERY_S: u64 = 15;
pub const DEFAULT_CHECK_VMS_EVERY_S: u64 = 45;
pub const DEFAULT_CHECK_VMS_IN_ERROR_EVERY_S: u64 = 20;
pub const DEFAULT_ESTIMATED_VM_DEPLOY_TIME_S: u64 = 600;
pub const DEFAULT_WAITING_JOBS_THRESHOLD: u64 = 0;
pub const DEFAULT_WAITING_JOBS_TIME_S: u64 = 40;
pub const DEFAULT_N_JOBS_PER_VM: u64 = 4;
pub const DEFAULT_IDLE_FOR_TIME_S: u64 = 3600;
pub const DEFAULT_MIN_VMS: u64 = 0;
pub const DEFAULT_MAX_VMS: u64 = 3;

/// The typed defaults table consulted during resolution.
///
/// Invariant: every key the control loop reads appears here, so resolution
/// never fails due to a missing entry.
#[derive(Debug, Clone)]
pub struct Defaults(BTreeMap<&'static str, BTreeMap<&'static str, ConfigValue>>);

impl Defaults {
    pub fn get(&self, section: &str, key: &str) -> Option<&ConfigValue> {
        self.0.get(section)?.get(key)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&'static str, &BTreeMap<&'static str, ConfigValue>)> {
        self.0.iter().map(|(s, t)| (*s, t))
    }
}

/// Build the documented defaults table.
pub fn defaults() -> Defaults {
    let mut table: BTreeMap<&'static str, BTreeMap<&'static str, ConfigValue>> = BTreeMap::new();

    table.insert(
        sections::MAIN,
        BTreeMap::from([
            // Main loop
            ("sleep_s", ConfigValue::from(DEFAULT_SLEEP_S)),
            ("check_queue_every_s", ConfigValue::from(DEFAULT_CHECK_QUEUE_EVERY_S)),
            ("check_vms_every_s", ConfigValue::from(DEFAULT_CHECK_VMS_EVERY_S)),
            (
                "check_vms_in_error_every_s",
                ConfigValue::from(DEFAULT_CHECK_VMS_IN_ERROR_EVERY_S),
            ),
            (
                "estimated_vm_deploy_time_s",
                ConfigValue::from(DEFAULT_ESTIMATED_VM_DEPLOY_TIME_S),
            ),
            // Conditions to start new instances
            ("waiting_jobs_threshold", ConfigValue::from(DEFAULT_WAITING_JOBS_THRESHOLD)),
            ("waiting_jobs_time_s", ConfigValue::from(DEFAULT_WAITING_JOBS_TIME_S)),
            ("n_jobs_per_vm", ConfigValue::from(DEFAULT_N_JOBS_PER_VM)),
            // Conditions to stop idle instances
            ("idle_for_time_s", ConfigValue::from(DEFAULT_IDLE_FOR_TIME_S)),
        ]),
    );

    table.insert(
        sections::QUOTA,
        BTreeMap::from([
            ("min_vms", ConfigValue::from(DEFAULT_MIN_VMS)),
            ("max_vms", ConfigValue::from(DEFAULT_MAX_VMS)),
        ]),
    );

    table.insert(
        sections::DEBUG,
        BTreeMap::from([
            ("dry_run_shutdown_vms", ConfigValue::from(0u64)),
            ("dry_run_boot_vms", ConfigValue::from(0u64)),
        ]),
    );

    table.insert(
        sections::BATCH,
        BTreeMap::from([
            // Shell command printing the number of jobs waiting longer than
            // `{seconds}` on stdout. Empty means not configured.
            ("waiting_jobs_cmd", ConfigValue::from("")),
        ]),
    );

    table.insert(
        sections::CLOUD,
        BTreeMap::from([
            // Shell command printing `<id> <state> <age_s>` per line.
            ("list_cmd", ConfigValue::from("")),
            // Shell command booting `{count}` instances, printing new ids.
            ("boot_cmd", ConfigValue::from("")),
            // Shell command terminating instance `{id}`.
            ("terminate_cmd", ConfigValue::from("")),
        ]),
    );

    Defaults(table)
}
