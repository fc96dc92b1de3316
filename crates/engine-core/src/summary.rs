use crate::context::ExecutionContext;
use model::entity::{Entity, EntityStatus};
use planner::profile::RunMode;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Overall outcome of one user within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserRunStatus {
    Success,
    Warning,
    Failed,
}

/// History row for one processed user.
#[derive(Debug, Clone, Serialize)]
pub struct UserResult {
    pub userid: String,
    pub ec_user_id: String,
    pub status: UserRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_message: Option<String>,
    pub success_entities: Vec<Entity>,
    /// Entities that neither succeeded nor were skipped.
    pub failed_entities: Vec<Entity>,
    pub skipped_entities: Vec<Entity>,
    pub is_scm: bool,
    pub is_im: bool,
    pub payloads: serde_json::Value,
}

/// Aggregated result of one engine run, handed to the history and
/// notification sinks.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub success_count: usize,
    pub warning_count: usize,
    pub failed_count: usize,
    pub users: Vec<UserResult>,
}

fn numbered(label: &str, messages: &[String]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let lines: Vec<String> = messages
        .iter()
        .enumerate()
        .map(|(idx, msg)| format!("{}. {}", idx + 1, msg))
        .collect();
    Some(format!("{} ({}):\n{}", label, messages.len(), lines.join("\n")))
}

impl UserResult {
    pub fn from_context(ctx: &ExecutionContext) -> UserResult {
        let status = if ctx.has_errors() {
            UserRunStatus::Failed
        } else if ctx.has_warnings() {
            UserRunStatus::Warning
        } else {
            UserRunStatus::Success
        };

        let mut success_entities = Vec::new();
        let mut failed_entities = Vec::new();
        let mut skipped_entities = Vec::new();
        for (entity, entity_status) in ctx.statuses() {
            match entity_status {
                EntityStatus::Success => success_entities.push(entity),
                EntityStatus::Skipped => skipped_entities.push(entity),
                EntityStatus::Failed | EntityStatus::Pending => failed_entities.push(entity),
            }
        }

        UserResult {
            userid: ctx.userid.clone(),
            ec_user_id: ctx.ec_user_id.clone(),
            status,
            error_message: numbered("ERRORS", ctx.errors()),
            warning_message: numbered("WARNINGS", ctx.warnings()),
            success_entities,
            failed_entities,
            skipped_entities,
            is_scm: ctx.is_scm,
            is_im: ctx.is_im,
            payloads: serde_json::to_value(ctx.all_payloads()).unwrap_or_default(),
        }
    }
}

impl RunReport {
    pub fn from_results(
        run_id: Uuid,
        mode: RunMode,
        results: &BTreeMap<String, ExecutionContext>,
    ) -> RunReport {
        let users: Vec<UserResult> = results.values().map(UserResult::from_context).collect();
        let success_count = users
            .iter()
            .filter(|u| u.status == UserRunStatus::Success)
            .count();
        let warning_count = users
            .iter()
            .filter(|u| u.status == UserRunStatus::Warning)
            .count();
        let failed_count = users
            .iter()
            .filter(|u| u.status == UserRunStatus::Failed)
            .count();
        RunReport {
            run_id,
            mode,
            success_count,
            warning_count,
            failed_count,
            users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::record::EmployeeRecord;

    fn context(userid: &str) -> ExecutionContext {
        let record = EmployeeRecord {
            userid: userid.into(),
            ..Default::default()
        };
        ExecutionContext::creation(record, userid.into(), &[Entity::Position, Entity::PerPerson])
    }

    #[test]
    fn errors_outrank_warnings_in_user_status() {
        let mut ctx = context("u100");
        ctx.warn("minor");
        ctx.fail("broken");
        let result = UserResult::from_context(&ctx);
        assert_eq!(result.status, UserRunStatus::Failed);
        let message = result.error_message.unwrap();
        assert!(message.starts_with("ERRORS (1):"));
        assert!(message.contains("1. broken"));
    }

    #[test]
    fn pending_entities_count_as_failed_in_history() {
        let mut ctx = context("u100");
        ctx.set_status(Entity::Position, EntityStatus::Success);
        let result = UserResult::from_context(&ctx);
        assert_eq!(result.success_entities, vec![Entity::Position]);
        assert_eq!(result.failed_entities, vec![Entity::PerPerson]);
    }

    #[test]
    fn report_counts_split_by_user_status() {
        let mut results = BTreeMap::new();
        results.insert("a".to_string(), context("a"));
        let mut warned = context("b");
        warned.warn("heads up");
        results.insert("b".to_string(), warned);
        let mut failed = context("c");
        failed.fail("no");
        results.insert("c".to_string(), failed);

        let report = RunReport::from_results(Uuid::new_v4(), RunMode::Standard, &results);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.users.len(), 3);
    }
}
