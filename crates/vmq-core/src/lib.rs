pub mod control;
pub mod error;
pub mod plugin;
pub mod shutdown;
pub mod state;

pub mod prelude {
    pub use crate::control::{ControlLoop, LoopSettings};
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::plugin::{BatchPlugin, CloudProvider, CommandBatchPlugin, CommandCloudProvider};
    pub use crate::shutdown::ShutdownCoordinator;
    pub use crate::state::InstanceStateStore;
}
