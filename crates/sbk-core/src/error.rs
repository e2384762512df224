use thiserror::Error;

pub type SbkResult<T> = Result<T, SbkError>;

#[derive(Debug, Error)]
pub enum SbkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
