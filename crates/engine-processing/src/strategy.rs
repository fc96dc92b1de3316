use crate::builders::employment::{EmploymentBuilder, NO_MANAGER};
use crate::builders::position::build_placeholder;
use crate::builders::user::termination_payload;
use crate::error::ProcessError;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use engine_core::cache::{PositionRow, ReferenceCaches};
use engine_core::context::ExecutionContext;
use engine_core::services::BulkUpsertService;
use model::entity::Entity;
use model::outcome::position_code_from_key;
use model::payload::{
    DEFAULT_STANDARD_HOURS, EntityPayload, EventReason, POSITION_EPOCH,
};
use model::record::EmployeeRecord;
use planner::profile::RunMode;
use serde::{Deserialize, Serialize};
use tracing::info;

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Organizational coordinates used for the migration placeholder position
/// when the job-code mapping has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnitDefaults {
    pub division: String,
    pub geographical_scope: String,
    pub sub_unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Job code of the placeholder position each migrated employee is staged
    /// through before landing on the real position.
    pub placeholder_jobcode: String,
    #[serde(default)]
    pub fallback_org: Option<OrgUnitDefaults>,
}

/// The mode-specific part of the creation pipeline. Everything else
/// (position, person, role, relationships, submission) is shared.
#[async_trait]
pub trait RunStrategy: Send + Sync {
    fn mode(&self) -> RunMode;

    /// Runs before payload building for one user. Migration uses this to
    /// create or find the placeholder position.
    async fn prepare(
        &self,
        _ctx: &mut ExecutionContext,
        _record: &EmployeeRecord,
        _caches: &mut ReferenceCaches,
        _upsert: &dyn BulkUpsertService,
    ) {
    }

    fn build_employment(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        caches: &ReferenceCaches,
    );

    /// Re-entered after the position round when employment building was
    /// deferred waiting for the new position code.
    fn resume_employment(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        caches: &ReferenceCaches,
    ) {
        self.build_employment(ctx, record, caches);
    }

    fn build_termination(&self, _ctx: &mut ExecutionContext, _record: &EmployeeRecord) {}

    /// Relationship stages are postponed entirely for users whose HR manager
    /// is created in the same run.
    fn skip_relationship_stages(&self, _ctx: &ExecutionContext) -> bool {
        false
    }
}

pub(crate) fn resolve_manager(
    record: &EmployeeRecord,
    caches: &ReferenceCaches,
) -> (String, Option<NaiveDate>) {
    match record.manager() {
        Some(manager) => {
            let manager_ec = caches.ec_user_id(manager);
            let manager_start = caches
                .employment_of(&manager_ec)
                .and_then(|row| row.start_date);
            (manager_ec, manager_start)
        }
        None => (NO_MANAGER.to_string(), None),
    }
}

pub(crate) fn employment_dates(
    ctx: &mut ExecutionContext,
    record: &EmployeeRecord,
) -> Option<(NaiveDate, NaiveDate)> {
    let Some(start) = record.employment_start() else {
        ctx.fail(
            ProcessError::UnresolvedEmploymentStart {
                userid: ctx.userid.clone(),
            }
            .to_string(),
        );
        return None;
    };
    Some((start, record.hire_date.unwrap_or(start)))
}

pub(crate) fn warn_on_swap(ctx: &mut ExecutionContext, builder: &EmploymentBuilder) {
    if builder.dates_swapped() {
        ctx.warn(format!(
            "Hire date after start of employment for user '{}', dates swapped",
            ctx.userid
        ));
    }
}

/// Day-to-day reconciliation: one job event per user, continuing the
/// existing sequence when the employee already has employment history.
pub struct StandardStrategy;

#[async_trait]
impl RunStrategy for StandardStrategy {
    fn mode(&self) -> RunMode {
        RunMode::Standard
    }

    fn build_employment(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        caches: &ReferenceCaches,
    ) {
        let Some((start, hire)) = employment_dates(ctx, record) else {
            return;
        };
        let existing = caches.employment_of(&ctx.ec_user_id).cloned();
        let (seq_number, last_job_start, existing_position) = match &existing {
            Some(row) => {
                ctx.has_existing_empjob = true;
                (
                    row.seq_number.unwrap_or(0).max(0) + 1,
                    row.start_date,
                    clean(&row.position),
                )
            }
            None => (1, None, None),
        };
        let event_reason = if seq_number == 1 {
            EventReason::InitLoad
        } else {
            EventReason::DataChange
        };

        let position = match existing_position.or_else(|| ctx.position_code.clone()) {
            Some(position) => position,
            None if ctx.position_being_created => {
                ctx.needs_position_lookup = true;
                return;
            }
            None => {
                ctx.fail(
                    ProcessError::UnresolvedPosition {
                        userid: ctx.userid.clone(),
                    }
                    .to_string(),
                );
                return;
            }
        };

        let (manager_id, manager_position_start) = resolve_manager(record, caches);
        let builder = EmploymentBuilder {
            ec_user_id: ctx.ec_user_id.clone(),
            person_id_external: record.userid.clone(),
            hire_date: hire,
            start_of_employment: start,
            seq_number,
            event_reason,
            position,
            manager_id,
            company: clean(&record.company),
            cost_center: clean(&record.cost_center),
            role_code: clean(&record.role_code),
            last_job_start,
            manager_position_start,
        };
        warn_on_swap(ctx, &builder);
        ctx.clear_payloads(Entity::EmpEmployment);
        ctx.clear_payloads(Entity::EmpJob);
        ctx.push_payload(EntityPayload::EmpEmployment(builder.build_employment()));
        let (job, calculated) = builder.build_job(Utc::now().date_naive());
        ctx.push_payload(EntityPayload::EmpJob(job));
        ctx.empjob_start_date = Some(calculated);
    }
}

/// Initial load: every employee is staged through a per-company placeholder
/// position (INITLOAD, sequence 1) and immediately moved to the real
/// position (DATACHG, sequence 2). Managers are not wired on the job rows;
/// relationships carry them once all users exist.
pub struct MigrationStrategy {
    config: MigrationConfig,
    inactive: bool,
}

impl MigrationStrategy {
    pub fn new(config: MigrationConfig) -> Self {
        MigrationStrategy {
            config,
            inactive: false,
        }
    }

    /// Variant for populations that are already terminated: migrate, then
    /// write the termination row.
    pub fn inactive(config: MigrationConfig) -> Self {
        MigrationStrategy {
            config,
            inactive: true,
        }
    }

    fn build_actual_job(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        position: String,
    ) {
        let Some((start, hire)) = employment_dates(ctx, record) else {
            return;
        };
        let builder = EmploymentBuilder {
            ec_user_id: ctx.ec_user_id.clone(),
            person_id_external: record.userid.clone(),
            hire_date: hire,
            start_of_employment: start,
            seq_number: 2,
            event_reason: EventReason::DataChange,
            position,
            manager_id: NO_MANAGER.to_string(),
            company: clean(&record.company),
            cost_center: clean(&record.cost_center),
            role_code: clean(&record.role_code),
            last_job_start: None,
            manager_position_start: None,
        };
        ctx.clear_payloads(Entity::EmpJob);
        let (job, calculated) = builder.build_job(Utc::now().date_naive());
        ctx.push_payload(EntityPayload::EmpJob(job));
        ctx.empjob_start_date = Some(calculated);
    }
}

#[async_trait]
impl RunStrategy for MigrationStrategy {
    fn mode(&self) -> RunMode {
        if self.inactive {
            RunMode::MigrationInactive
        } else {
            RunMode::Migration
        }
    }

    async fn prepare(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        caches: &mut ReferenceCaches,
        upsert: &dyn BulkUpsertService,
    ) {
        let Some(company) = clean(&record.company) else {
            ctx.fail(format!(
                "Missing company for user '{}', cannot stage placeholder position",
                ctx.userid
            ));
            return;
        };
        let jobcode = self.config.placeholder_jobcode.as_str();

        if let Some(row) = caches.placeholder_position(&company, jobcode) {
            ctx.dummy_position = Some(row.code.clone());
        } else {
            let mapping = caches.job_mapping(jobcode);
            let (division, geographical_scope, sub_unit) = match mapping {
                Some(m) if clean(&m.division).is_some() => (
                    clean(&m.division),
                    clean(&m.geographical_scope),
                    clean(&m.sub_unit),
                ),
                _ => match &self.config.fallback_org {
                    Some(org) => (
                        Some(org.division.clone()),
                        Some(org.geographical_scope.clone()),
                        Some(org.sub_unit.clone()),
                    ),
                    None => {
                        ctx.fail(
                            ProcessError::MissingPlaceholderDefaults {
                                company: company.clone(),
                            }
                            .to_string(),
                        );
                        return;
                    }
                },
            };
            let payload = build_placeholder(
                &company,
                jobcode,
                division,
                geographical_scope,
                sub_unit,
                clean(&record.country_iso3),
            );
            match upsert
                .upsert_one(Entity::Position, &EntityPayload::Position(payload))
                .await
            {
                Ok(outcome) if !outcome.is_failed() => {
                    let code = outcome
                        .key
                        .as_deref()
                        .and_then(position_code_from_key)
                        .map(str::to_string);
                    match code {
                        Some(code) => {
                            info!(
                                "Created placeholder position {} for company {}",
                                code, company
                            );
                            caches.push_position(PositionRow {
                                code: code.clone(),
                                company: Some(company.clone()),
                                jobcode: Some(jobcode.to_string()),
                                location: None,
                                cost_center: None,
                                effective_start_date: Some(POSITION_EPOCH),
                                standard_hours: Some(DEFAULT_STANDARD_HOURS.to_string()),
                                criticality: None,
                            });
                            ctx.dummy_position = Some(code);
                        }
                        None => ctx.fail(
                            ProcessError::PlaceholderCreationFailed {
                                company: company.clone(),
                            }
                            .to_string(),
                        ),
                    }
                }
                Ok(outcome) => ctx.fail(format!(
                    "Placeholder position upsert failed - Message: {}, HTTP Code: {}",
                    outcome.message.as_deref().unwrap_or("none"),
                    outcome
                        .http_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                )),
                Err(err) => ctx.fail(err.to_string()),
            }
        }

        // An employee already sitting on a non-placeholder position has been
        // migrated before.
        if let Some(code) = caches.position_code_of(&ctx.ec_user_id) {
            if ctx.dummy_position.as_deref() != Some(code) {
                ctx.has_existing_empjob = true;
            }
        }
    }

    fn build_employment(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        _caches: &ReferenceCaches,
    ) {
        if ctx.has_existing_empjob {
            for entity in [Entity::EmpEmployment, Entity::EmpInitLoadJob, Entity::EmpJob] {
                ctx.satisfy_dependency(entity);
            }
            return;
        }
        let Some(dummy) = ctx.dummy_position.clone() else {
            ctx.fail(format!(
                "No placeholder position available for user '{}'",
                ctx.userid
            ));
            return;
        };
        let Some((start, hire)) = employment_dates(ctx, record) else {
            return;
        };
        let dummy_builder = EmploymentBuilder {
            ec_user_id: ctx.ec_user_id.clone(),
            person_id_external: record.userid.clone(),
            hire_date: hire,
            start_of_employment: start,
            seq_number: 1,
            event_reason: EventReason::InitLoad,
            position: dummy,
            manager_id: NO_MANAGER.to_string(),
            company: clean(&record.company),
            cost_center: clean(&record.cost_center),
            role_code: clean(&record.role_code),
            last_job_start: None,
            manager_position_start: None,
        };
        warn_on_swap(ctx, &dummy_builder);
        ctx.clear_payloads(Entity::EmpEmployment);
        ctx.clear_payloads(Entity::EmpInitLoadJob);
        ctx.clear_payloads(Entity::EmpJob);
        ctx.push_payload(EntityPayload::EmpEmployment(dummy_builder.build_employment()));
        let (init_job, _) = dummy_builder.build_job(Utc::now().date_naive());
        ctx.push_payload(EntityPayload::EmpInitLoadJob(init_job));

        match ctx.position_code.clone() {
            Some(position) => self.build_actual_job(ctx, record, position),
            None if ctx.position_being_created => {
                ctx.needs_position_lookup = true;
            }
            None => ctx.fail(
                ProcessError::UnresolvedPosition {
                    userid: ctx.userid.clone(),
                }
                .to_string(),
            ),
        }
    }

    fn resume_employment(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        _caches: &ReferenceCaches,
    ) {
        // The placeholder rows were already built before the deferral; only
        // the real job row is missing.
        if let Some(position) = ctx.position_code.clone() {
            self.build_actual_job(ctx, record, position);
        }
    }

    fn build_termination(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        if !self.inactive {
            return;
        }
        let Some(end_date) = record.leaving_date else {
            ctx.fail(format!(
                "Missing leaving date for user '{}', cannot terminate",
                ctx.userid
            ));
            return;
        };
        ctx.push_payload(EntityPayload::EmpEmploymentTermination(termination_payload(
            &ctx.ec_user_id,
            &record.userid,
            end_date,
        )));
    }

    fn skip_relationship_stages(&self, ctx: &ExecutionContext) -> bool {
        ctx.needs_hr_retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::cache::EmploymentRow;
    use model::entity::EntityStatus;

    fn record(userid: &str) -> EmployeeRecord {
        EmployeeRecord {
            userid: userid.into(),
            company: Some("1710".into()),
            cost_center: Some("CC1".into()),
            hire_date: NaiveDate::from_ymd_opt(2020, 1, 1),
            start_of_employment: NaiveDate::from_ymd_opt(2021, 6, 1),
            ..Default::default()
        }
    }

    fn creation_ctx(userid: &str) -> ExecutionContext {
        ExecutionContext::creation(
            record(userid),
            userid.into(),
            planner::profile::ExecutionProfile::for_mode(RunMode::Standard).plan(),
        )
    }

    #[test]
    fn standard_first_employment_is_init_load() {
        let caches = ReferenceCaches::default();
        let mut ctx = creation_ctx("u100");
        ctx.position_code = Some("P1".into());
        StandardStrategy.build_employment(&mut ctx, &record("u100"), &caches);
        let jobs = ctx.payloads_for(Entity::EmpJob);
        assert_eq!(jobs.len(), 1);
        match &jobs[0] {
            EntityPayload::EmpJob(job) => {
                assert_eq!(job.event_reason, EventReason::InitLoad);
                assert_eq!(job.seq_number, 1);
                assert_eq!(job.position, "P1");
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(ctx.empjob_start_date.is_some());
    }

    #[test]
    fn standard_existing_employment_continues_the_sequence() {
        let mut caches = ReferenceCaches::default();
        caches.employees.push(EmploymentRow {
            userid: "u100".into(),
            position: Some("P9".into()),
            seq_number: Some(4),
            start_date: NaiveDate::from_ymd_opt(2019, 1, 1),
        });
        let mut ctx = creation_ctx("u100");
        StandardStrategy.build_employment(&mut ctx, &record("u100"), &caches);
        match &ctx.payloads_for(Entity::EmpJob)[0] {
            EntityPayload::EmpJob(job) => {
                assert_eq!(job.seq_number, 5);
                assert_eq!(job.event_reason, EventReason::DataChange);
                assert_eq!(job.position, "P9");
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(ctx.has_existing_empjob);
    }

    #[test]
    fn standard_defers_when_position_is_still_being_created() {
        let caches = ReferenceCaches::default();
        let mut ctx = creation_ctx("u100");
        ctx.position_being_created = true;
        StandardStrategy.build_employment(&mut ctx, &record("u100"), &caches);
        assert!(ctx.needs_position_lookup);
        assert!(ctx.payloads_for(Entity::EmpJob).is_empty());
        assert!(!ctx.has_errors());
    }

    #[test]
    fn standard_fails_without_any_position_source() {
        let caches = ReferenceCaches::default();
        let mut ctx = creation_ctx("u100");
        StandardStrategy.build_employment(&mut ctx, &record("u100"), &caches);
        assert!(ctx.has_errors());
    }

    #[test]
    fn migration_builds_placeholder_rows_and_real_job() {
        let caches = ReferenceCaches::default();
        let strategy = MigrationStrategy::new(MigrationConfig {
            placeholder_jobcode: "MIG".into(),
            fallback_org: None,
        });
        let mut ctx = ExecutionContext::creation(
            record("u100"),
            "u100".into(),
            planner::profile::ExecutionProfile::for_mode(RunMode::Migration).plan(),
        );
        ctx.dummy_position = Some("P_DUMMY".into());
        ctx.position_code = Some("P_REAL".into());
        strategy.build_employment(&mut ctx, &record("u100"), &caches);

        match &ctx.payloads_for(Entity::EmpInitLoadJob)[0] {
            EntityPayload::EmpInitLoadJob(job) => {
                assert_eq!(job.position, "P_DUMMY");
                assert_eq!(job.seq_number, 1);
                assert_eq!(job.event_reason, EventReason::InitLoad);
                assert_eq!(job.manager_id, NO_MANAGER);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        match &ctx.payloads_for(Entity::EmpJob)[0] {
            EntityPayload::EmpJob(job) => {
                assert_eq!(job.position, "P_REAL");
                assert_eq!(job.seq_number, 2);
                assert_eq!(job.event_reason, EventReason::DataChange);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn migration_skips_already_migrated_users() {
        let caches = ReferenceCaches::default();
        let strategy = MigrationStrategy::new(MigrationConfig {
            placeholder_jobcode: "MIG".into(),
            fallback_org: None,
        });
        let mut ctx = ExecutionContext::creation(
            record("u100"),
            "u100".into(),
            planner::profile::ExecutionProfile::for_mode(RunMode::Migration).plan(),
        );
        ctx.has_existing_empjob = true;
        strategy.build_employment(&mut ctx, &record("u100"), &caches);
        assert!(ctx.payloads_for(Entity::EmpJob).is_empty());
        assert_eq!(ctx.status_of(Entity::EmpJob), Some(EntityStatus::Success));
        assert_eq!(
            ctx.status_of(Entity::EmpInitLoadJob),
            Some(EntityStatus::Success)
        );
    }

    #[test]
    fn inactive_migration_requires_leaving_date() {
        let config = MigrationConfig {
            placeholder_jobcode: "MIG".into(),
            fallback_org: None,
        };
        let strategy = MigrationStrategy::inactive(config);
        let mut ctx = ExecutionContext::creation(
            record("u100"),
            "u100".into(),
            planner::profile::ExecutionProfile::for_mode(RunMode::MigrationInactive).plan(),
        );
        strategy.build_termination(&mut ctx, &record("u100"));
        assert!(ctx.has_errors());

        let mut rec = record("u200");
        rec.leaving_date = NaiveDate::from_ymd_opt(2024, 12, 31);
        let mut ctx = ExecutionContext::creation(
            rec.clone(),
            "u200".into(),
            planner::profile::ExecutionProfile::for_mode(RunMode::MigrationInactive).plan(),
        );
        strategy.build_termination(&mut ctx, &rec);
        assert_eq!(ctx.payloads_for(Entity::EmpEmploymentTermination).len(), 1);
    }
}
