use engine_core::error::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("run aborted before any batch was processed: shutdown requested")]
    ShutdownRequested,

    #[error(transparent)]
    Service(#[from] ServiceError),
}
