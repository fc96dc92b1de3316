use async_trait::async_trait;
use engine_core::error::ServiceError;
use engine_core::services::{BulkUpsertService, NotificationSink};
use engine_core::summary::{RunReport, UserRunStatus};
use model::entity::Entity;
use model::outcome::UpsertOutcome;
use model::payload::EntityPayload;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Stand-in for the target system: logs every wire body and answers SUCCESS,
/// fabricating position keys so downstream stages behave as in a real run.
pub struct DryRunUpsertService {
    next_position_code: AtomicU64,
}

impl DryRunUpsertService {
    pub fn new() -> DryRunUpsertService {
        DryRunUpsertService {
            next_position_code: AtomicU64::new(9_000_000),
        }
    }

    fn outcome_for(&self, entity: Entity) -> UpsertOutcome {
        match entity {
            Entity::Position => {
                let code = self.next_position_code.fetch_add(1, Ordering::Relaxed) + 1;
                UpsertOutcome::success(Some(format!(
                    "Position/code={code},Position/effectiveStartDate=1900-01-01"
                )))
            }
            _ => UpsertOutcome::success(None),
        }
    }

    fn log_payload(&self, entity: Entity, userid: &str, payload: &EntityPayload) {
        match payload.to_wire() {
            Ok(body) => debug!("[dry-run] {} {}: {}", entity, userid, body),
            Err(err) => warn!("[dry-run] {} {}: unserializable payload: {}", entity, userid, err),
        }
    }
}

#[async_trait]
impl BulkUpsertService for DryRunUpsertService {
    async fn upsert_for_users(
        &self,
        entity: Entity,
        payloads: &BTreeMap<String, Vec<EntityPayload>>,
    ) -> Result<BTreeMap<String, UpsertOutcome>, ServiceError> {
        let mut outcomes = BTreeMap::new();
        for (userid, user_payloads) in payloads {
            for payload in user_payloads {
                self.log_payload(entity, userid, payload);
            }
            outcomes.insert(userid.clone(), self.outcome_for(entity));
        }
        Ok(outcomes)
    }

    async fn upsert_one(
        &self,
        entity: Entity,
        payload: &EntityPayload,
    ) -> Result<UpsertOutcome, ServiceError> {
        self.log_payload(entity, "-", payload);
        Ok(self.outcome_for(entity))
    }
}

/// Writes the run summary to the log, one warning line per failed user.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, report: &RunReport) -> Result<(), ServiceError> {
        info!(
            "Run {} ({}): {} success, {} warning, {} failed",
            report.run_id,
            report.mode,
            report.success_count,
            report.warning_count,
            report.failed_count
        );
        for user in &report.users {
            if user.status == UserRunStatus::Failed {
                warn!(
                    "User {} failed: {}",
                    user.userid,
                    user.error_message.as_deref().unwrap_or("no details")
                );
            }
        }
        Ok(())
    }
}
