//! Two-level typed configuration.
//!
//! Every setting the daemon reads lives in a defaults table as
//! `(section, key) -> value`. A configuration file can override entries;
//! values are coerced to numbers when possible and kept as strings
//! otherwise. Resolution never fails: a missing or unparsable file just
//! produces a fully-defaulted configuration flagged as not fully loaded.
mod value;
pub use value::ConfigValue;

mod defaults;
pub use defaults::{Defaults, defaults, sections};
pub use defaults::{
    DEFAULT_CHECK_QUEUE_EVERY_S, DEFAULT_CHECK_VMS_EVERY_S, DEFAULT_CHECK_VMS_IN_ERROR_EVERY_S,
    DEFAULT_ESTIMATED_VM_DEPLOY_TIME_S, DEFAULT_IDLE_FOR_TIME_S, DEFAULT_MAX_VMS, DEFAULT_MIN_VMS,
    DEFAULT_N_JOBS_PER_VM, DEFAULT_SLEEP_S, DEFAULT_WAITING_JOBS_THRESHOLD,
    DEFAULT_WAITING_JOBS_TIME_S,
};

mod resolved;
pub use resolved::ResolvedConfig;
