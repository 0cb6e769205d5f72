use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown instance state: {0}")]
    UnknownInstanceState(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
