use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid command spec: {0}")]
    InvalidSpec(String),
}
