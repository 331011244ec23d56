use thiserror::Error;

use crate::task::TaskId;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{0}")]
    Validation(String),

    #[error("Maximum {limit} immediate tasks allowed")]
    ImmediateSlotsFull { limit: u32 },

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task worker has stopped")]
    WorkerStopped,
}

impl TrackerError {
    /// Rejections the user can act on, as opposed to storage faults.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::ImmediateSlotsFull { .. } | Self::NotFound(_)
        )
    }
}
