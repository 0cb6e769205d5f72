use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("state store error: {0}")]
    State(#[from] std::io::Error),

    #[error("plugin '{plugin}' failed: {reason}")]
    Plugin {
        plugin: &'static str,
        reason: String,
    },

    #[error("operation cancelled by shutdown request")]
    Cancelled,
}

impl CoreError {
    pub fn plugin(plugin: &'static str, reason: impl Into<String>) -> Self {
        Self::Plugin {
            plugin,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
