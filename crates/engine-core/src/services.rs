use crate::cache::{EmploymentRow, PositionRow};
use crate::error::ServiceError;
use crate::summary::RunReport;
use async_trait::async_trait;
use model::entity::Entity;
use model::outcome::UpsertOutcome;
use model::payload::EntityPayload;
use std::collections::BTreeMap;

/// Upper bound on records per upsert request, imposed by the target API.
/// Implementations chunk transparently; callers never need to.
pub const MAX_UPSERT_CHUNK: usize = 800;

/// Bulk write access to the target system's entity endpoints.
///
/// Implementations own transport concerns: chunking, retries with backoff,
/// and authentication. A returned `Err` means the request is exhausted; a
/// returned map carries one outcome per submitted user.
#[async_trait]
pub trait BulkUpsertService: Send + Sync {
    /// Upserts the payloads of many users against one entity endpoint.
    async fn upsert_for_users(
        &self,
        entity: Entity,
        payloads: &BTreeMap<String, Vec<EntityPayload>>,
    ) -> Result<BTreeMap<String, UpsertOutcome>, ServiceError>;

    /// Upserts a single payload, for out-of-band writes such as creating the
    /// migration placeholder position.
    async fn upsert_one(
        &self,
        entity: Entity,
        payload: &EntityPayload,
    ) -> Result<UpsertOutcome, ServiceError>;
}

/// Fresh copies of the snapshots that go stale while a run writes: positions
/// and employment state.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRefresh {
    pub positions: Vec<PositionRow>,
    pub employees: Vec<EmploymentRow>,
}

/// Re-reads target-side snapshots between creation batches, so later batches
/// see the records earlier batches created.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn refresh(&self) -> Result<SnapshotRefresh, ServiceError>;
}

/// Durable record of run results, one row per processed user.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record_run(&self, report: &RunReport) -> Result<(), ServiceError>;
}

/// Operator-facing run notification (mail, chat, ticket - the engine does
/// not care which).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, report: &RunReport) -> Result<(), ServiceError>;
}
