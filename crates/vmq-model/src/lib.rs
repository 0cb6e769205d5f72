mod error;
pub use error::{ModelError, ModelResult};

mod instance;
pub use instance::{InstanceId, InstanceInfo, InstanceState};

pub mod config;
pub use config::{ConfigValue, Defaults, ResolvedConfig, defaults};
