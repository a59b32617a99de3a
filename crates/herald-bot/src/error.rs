use herald_db::StorageError;
use herald_gateway::SendError;
use thiserror::Error;

/// A handler failure. Reported to the owner and logged; never fatal to
/// the process.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("telegram: {0}")]
    Send(#[from] SendError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
