use thiserror::Error;

/// Failures raised by the external collaborators behind the service traits.
/// Transport retries and backoff happen inside the collaborator; an error
/// surfacing here means the operation is exhausted.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("bulk upsert for entity '{entity}' failed: {source}")]
    Upsert {
        entity: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("snapshot refresh failed: {source}")]
    Snapshot {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("history sink rejected run results: {source}")]
    History {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("notification dispatch failed: {source}")]
    Notification {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
