use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to spawn dealiaser: {0}")]
    Spawn(String),

    #[error("Dealiaser exited abnormally: {0}")]
    ExecutionFailed(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Plot error: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
