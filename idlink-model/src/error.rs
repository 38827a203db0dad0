use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("unknown content kind: {0}")]
    UnknownContentKind(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
