use crate::builders::employment::{EmploymentBuilder, relationship_create, relationship_delimit};
use crate::builders::person::PersonBuilder;
use crate::builders::position::{PositionBuilder, build_matrix_relationship, build_sync};
use crate::builders::user::{inactive_payload, termination_payload};
use crate::email::{self, EmailActionItem, ExistingEmail};
use crate::error::ProcessError;
use crate::policy::EmailPolicy;
use crate::strategy::{RunStrategy, employment_dates, resolve_manager, warn_on_swap};
use crate::validate;
use chrono::{Days, NaiveDate, Utc};
use engine_core::cache::ReferenceCaches;
use engine_core::context::ExecutionContext;
use engine_core::services::{BulkUpsertService, SnapshotRefresh};
use model::contact::{EMAIL_ACTION_ORDER, EmailAction, EmailType};
use model::entity::{Entity, EntityStatus};
use model::outcome::{UpsertOutcome, UpsertStatus, position_code_from_key};
use model::payload::{DEFAULT_ROLE_CODE, EntityPayload, EventReason, RelationKind};
use model::record::{ChangedField, EmployeeRecord, FieldChange};
use planner::profile::{ExecutionProfile, entities_for_dirty_field};
use planner::resolver::OrderedBatch;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// One leaver to deactivate: terminate the employment, then switch the
/// login to inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisableRequest {
    pub userid: String,
    pub end_date: NaiveDate,
}

/// Drives all pipelines over one population: builds payloads per user,
/// submits them entity by entity in plan order, and keeps the per-user
/// contexts as the run result.
///
/// Within a run the processor is the single writer; batches are handed in
/// one at a time by the runtime, which refreshes snapshots in between.
pub struct Processor {
    profile: ExecutionProfile,
    strategy: Box<dyn RunStrategy>,
    email_policy: EmailPolicy,
    caches: ReferenceCaches,
    upsert: Arc<dyn BulkUpsertService>,
    results: BTreeMap<String, ExecutionContext>,
}

impl Processor {
    pub fn new(
        profile: ExecutionProfile,
        strategy: Box<dyn RunStrategy>,
        email_policy: EmailPolicy,
        caches: ReferenceCaches,
        upsert: Arc<dyn BulkUpsertService>,
    ) -> Processor {
        Processor {
            profile,
            strategy,
            email_policy,
            caches,
            upsert,
            results: BTreeMap::new(),
        }
    }

    pub fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    pub fn caches(&self) -> &ReferenceCaches {
        &self.caches
    }

    pub fn apply_refresh(&mut self, refresh: SnapshotRefresh) {
        self.caches.positions = refresh.positions;
        self.caches.employees = refresh.employees;
    }

    pub fn results(&self) -> &BTreeMap<String, ExecutionContext> {
        &self.results
    }

    pub fn into_results(self) -> BTreeMap<String, ExecutionContext> {
        self.results
    }

    /// Runs the creation pipeline for one resolver batch and submits it.
    pub async fn process_batch(&mut self, batch: &OrderedBatch) {
        let mut batch_users = Vec::new();
        let total = batch.records.len();
        for (idx, record) in batch.records.iter().enumerate() {
            let mut record = record.clone();
            record.userid = record.userid.trim().to_lowercase();
            let userid = record.userid.clone();
            if self.results.contains_key(&userid) {
                continue;
            }
            info!("Processing user {}/{}: {}", idx + 1, total, userid);
            let ec_user_id = self.caches.ec_user_id(&userid);
            let mut ctx = ExecutionContext::creation(record.clone(), ec_user_id, self.profile.plan());
            ctx.needs_hr_retry = batch.hr_retry.contains(&userid);
            self.strategy
                .prepare(&mut ctx, &record, &mut self.caches, self.upsert.as_ref())
                .await;
            if !ctx.has_errors() {
                self.build_creation(&mut ctx, &record);
            }
            self.results.insert(userid.clone(), ctx);
            batch_users.push(userid);
        }
        self.submit_batch(&batch_users).await;
    }

    /// Runs the update pipeline over a change feed and submits it as one
    /// batch.
    pub async fn process_updates(&mut self, changes: &[FieldChange]) {
        let mut by_user: BTreeMap<String, Vec<&FieldChange>> = BTreeMap::new();
        for change in changes {
            by_user
                .entry(change.userid.trim().to_lowercase())
                .or_default()
                .push(change);
        }

        let total = by_user.len();
        let mut batch_users = Vec::new();
        for (idx, (userid, user_changes)) in by_user.into_iter().enumerate() {
            info!("Processing update {}/{}: {}", idx + 1, total, userid);
            let ec_user_id = self.caches.ec_user_id(&userid);
            let Some(record) = self.caches.source_record(&userid).cloned() else {
                let placeholder = EmployeeRecord {
                    userid: userid.clone(),
                    ..Default::default()
                };
                let mut ctx = ExecutionContext::update(placeholder, ec_user_id);
                for change in &user_changes {
                    ctx.is_scm |= change.is_scm;
                    ctx.is_im |= change.is_im;
                }
                ctx.fail(format!("No source record for user '{userid}'"));
                self.results.insert(userid.clone(), ctx);
                batch_users.push(userid);
                continue;
            };

            let mut ctx = ExecutionContext::update(record.clone(), ec_user_id);
            for change in user_changes {
                ctx.is_scm |= change.is_scm;
                ctx.is_im |= change.is_im;
                match change.interpret() {
                    ChangedField::Email(action) => {
                        ctx.mark_dirty(Entity::PerEmail);
                        ctx.email_actions.push(action);
                    }
                    ChangedField::Plain(field) => match entities_for_dirty_field(field) {
                        Some(entities) => {
                            for entity in entities {
                                if self.profile.includes(*entity) {
                                    ctx.mark_dirty(*entity);
                                }
                            }
                        }
                        None => ctx.warn(format!("No entity mapping for changed field '{field}'")),
                    },
                }
            }

            // Dependencies of dirty entities are already in place in the
            // target system; mark them satisfied so submission can proceed.
            for entity in ctx.dirty_entities.clone() {
                for dep in self.profile.dependencies_of(entity).to_vec() {
                    if !ctx.dirty_entities.contains(&dep) {
                        ctx.satisfy_dependency(dep);
                    }
                }
            }

            ctx.position_code = self.caches.position_code_of(&ctx.ec_user_id).map(str::to_string);
            ctx.empjob_start_date = self
                .caches
                .employment_of(&ctx.ec_user_id)
                .and_then(|row| row.start_date);
            self.build_updates(&mut ctx, &record);
            self.results.insert(userid.clone(), ctx);
            batch_users.push(userid);
        }
        self.submit_batch(&batch_users).await;
    }

    /// Deactivates leavers: termination row first, then the login flip.
    pub async fn process_disable(&mut self, requests: &[DisableRequest]) {
        let mut batch_users = Vec::new();
        for request in requests {
            let userid = request.userid.trim().to_lowercase();
            if self.results.contains_key(&userid) {
                continue;
            }
            let ec_user_id = self.caches.ec_user_id(&userid);
            let record = EmployeeRecord {
                userid: userid.clone(),
                ..Default::default()
            };
            let mut ctx = ExecutionContext::creation(record, ec_user_id, self.profile.plan());
            let termination = termination_payload(&ctx.ec_user_id, &userid, request.end_date);
            ctx.push_payload(EntityPayload::EmpEmploymentTermination(termination));
            let inactive = inactive_payload(&ctx.ec_user_id);
            ctx.push_payload(EntityPayload::UserStatus(inactive));
            self.results.insert(userid.clone(), ctx);
            batch_users.push(userid);
        }
        self.submit_batch(&batch_users).await;
    }

    fn build_creation(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        self.handle_position(ctx, record);
        if ctx.has_errors() {
            return;
        }
        self.handle_person(ctx, record);
        if ctx.has_errors() {
            return;
        }
        self.strategy.build_employment(ctx, record, &self.caches);
        if ctx.has_errors() {
            return;
        }
        if self.profile.includes(Entity::UserRole) {
            self.handle_user_role(ctx, record);
            if ctx.has_errors() {
                return;
            }
        }
        if !self.strategy.skip_relationship_stages(ctx) {
            if self.profile.includes(Entity::PositionMatrixRelationships) {
                self.handle_position_matrix(ctx, record);
                if ctx.has_errors() {
                    return;
                }
            }
            if !ctx.needs_position_lookup && self.profile.includes(Entity::EmpJobRelationships) {
                self.handle_job_relationships(ctx, record);
                if ctx.has_errors() {
                    return;
                }
            }
        }
        self.strategy.build_termination(ctx, record);
    }

    /// Position codes resolved so far in this run, by user id. Doubles as
    /// the claim set that keeps two users out of the same vacant position.
    fn run_positions(&self) -> BTreeMap<String, String> {
        self.results
            .iter()
            .filter_map(|(userid, ctx)| {
                ctx.position_code
                    .clone()
                    .map(|code| (userid.clone(), code))
            })
            .collect()
    }

    fn handle_position(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        let missing = validate::missing_position_fields(record);
        if !missing.is_empty() {
            ctx.fail(
                ProcessError::MissingFields {
                    entity: "Position",
                    fields: missing.join(", "),
                }
                .to_string(),
            );
            return;
        }
        if let Some(code) = self.caches.position_code_of(&ctx.ec_user_id).map(str::to_string) {
            ctx.position_code = Some(code);
            ctx.satisfy_dependency(Entity::Position);
            return;
        }
        let run_positions = self.run_positions();
        let taken: BTreeSet<String> = run_positions.values().cloned().collect();
        if let Some(row) = self.caches.find_matching_position(record, &taken) {
            ctx.position_code = Some(row.code.clone());
            ctx.satisfy_dependency(Entity::Position);
            return;
        }
        let jobcode = record
            .jobcode
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        let Some(mapping) = self.caches.job_mapping(&jobcode) else {
            ctx.fail(ProcessError::UnknownJobCode { jobcode }.to_string());
            return;
        };
        let payload =
            PositionBuilder::new(record, mapping, &self.caches, &run_positions).build_create();
        ctx.push_payload(EntityPayload::Position(payload));
        ctx.position_being_created = true;
    }

    fn handle_person(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        let missing = validate::missing_person_fields(record);
        if !missing.is_empty() {
            ctx.fail(
                ProcessError::MissingFields {
                    entity: "PerPerson",
                    fields: missing.join(", "),
                }
                .to_string(),
            );
            return;
        }
        if self.caches.person(&record.userid).is_some() {
            ctx.warn(format!(
                "personIdExternal '{}' already exists",
                record.userid
            ));
            if self.caches.person_matches(record) {
                ctx.satisfy_dependency(Entity::PerPerson);
                return;
            }
        }
        let builder = PersonBuilder::new(record);
        ctx.push_payload(EntityPayload::PerPerson(builder.build_per_person()));
        match builder.build_per_personal() {
            Ok(payload) => ctx.push_payload(EntityPayload::PerPersonal(payload)),
            Err(err) => {
                ctx.fail(err.to_string());
                return;
            }
        }
        self.build_reconciled_emails(ctx, record, &builder);
        if let Some(phone) = builder.build_phone() {
            ctx.push_payload(EntityPayload::PerPhone(phone));
        }
    }

    fn build_reconciled_emails(
        &self,
        ctx: &mut ExecutionContext,
        record: &EmployeeRecord,
        builder: &PersonBuilder<'_>,
    ) {
        let desired = self.email_policy.resolve(record, &self.caches);
        let existing: Vec<ExistingEmail> = self
            .caches
            .emails_of(&record.userid)
            .into_iter()
            .map(|row| ExistingEmail {
                email: row.email_address.clone(),
                email_type: row.email_type,
                is_primary: row.is_primary,
            })
            .collect();
        for item in email::reconcile(&desired, &existing) {
            ctx.push_payload(EntityPayload::PerEmail(builder.build_email(&item)));
        }
    }

    fn handle_user_role(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        let source_role = record
            .role_code
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        let target_role = self.caches.role_of(&ctx.ec_user_id);
        let payload = match (source_role, target_role) {
            (Some(source), Some(target)) if source.eq_ignore_ascii_case(target) => None,
            (Some(source), _) => Some(crate::builders::user::role_payload(&ctx.ec_user_id, source)),
            (None, Some(_)) => Some(crate::builders::user::role_payload(
                &ctx.ec_user_id,
                DEFAULT_ROLE_CODE,
            )),
            (None, None) => None,
        };
        if let Some(payload) = payload {
            ctx.push_payload(EntityPayload::UserRole(payload));
        }
    }

    fn handle_position_matrix(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        let Some(user_position) = ctx.position_code.clone() else {
            // Deferred until the position round delivers the code.
            return;
        };
        ctx.clear_payloads(Entity::PositionMatrixRelationships);
        let run_positions = self.run_positions();
        for (kind, value) in [
            (RelationKind::MatrixManager, record.matrix_manager()),
            (RelationKind::HrManager, record.hr()),
        ] {
            let Some(related) = value else {
                continue;
            };
            match build_matrix_relationship(&user_position, kind, related, &self.caches, &run_positions)
            {
                Ok(payload) => {
                    ctx.push_payload(EntityPayload::PositionMatrixRelationship(payload));
                }
                Err(err) => ctx.warn(err.to_string()),
            }
        }
    }

    fn handle_job_relationships(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        ctx.clear_payloads(Entity::EmpJobRelationships);
        for (kind, name, value) in [
            (RelationKind::HrManager, "hr manager", record.hr()),
            (
                RelationKind::MatrixManager,
                "matrix manager",
                record.matrix_manager(),
            ),
        ] {
            let Some(related) = value else {
                continue;
            };
            let related_ec = self.caches.ec_user_id(related);
            let existing = self.caches.job_relationship(&ctx.ec_user_id, kind).cloned();
            if let Some(row) = &existing {
                if row.rel_userid.eq_ignore_ascii_case(&related_ec) {
                    continue;
                }
            }
            let Some(mut start) = self.resolve_relationship_start(record, related, &related_ec)
            else {
                ctx.fail(
                    ProcessError::UnresolvedRelationshipStart {
                        relationship: name,
                        userid: ctx.userid.clone(),
                    }
                    .to_string(),
                );
                continue;
            };
            if let Some(row) = &existing {
                let delimit_date = row.start_date.unwrap_or(start);
                if let Some(existing_start) = row.start_date {
                    if start <= existing_start {
                        // The replacement must start after the row it closes.
                        start = existing_start + Days::new(1);
                    }
                }
                ctx.push_payload(EntityPayload::EmpJobRelationship(relationship_delimit(
                    &ctx.ec_user_id,
                    kind,
                    &row.rel_userid,
                    delimit_date,
                )));
            }
            ctx.push_payload(EntityPayload::EmpJobRelationship(relationship_create(
                &ctx.ec_user_id,
                kind,
                &related_ec,
                start,
            )));
        }
    }

    /// The relationship start date: the related user's position date when
    /// they are part of this run, then their cached job start, then the
    /// employee's own start of employment.
    fn resolve_relationship_start(
        &self,
        record: &EmployeeRecord,
        related: &str,
        related_ec: &str,
    ) -> Option<NaiveDate> {
        self.results
            .get(&related.trim().to_lowercase())
            .and_then(|other| other.record.as_ref())
            .and_then(|r| r.date_of_position)
            .or_else(|| {
                self.caches
                    .employment_of(related_ec)
                    .and_then(|row| row.start_date)
            })
            .or(record.start_of_employment)
    }

    fn build_updates(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        if ctx.dirty_entities.contains(&Entity::Position) {
            self.build_position_update(ctx, record);
        }
        let builder = PersonBuilder::new(record);
        if ctx.dirty_entities.contains(&Entity::PerPerson) {
            ctx.push_payload(EntityPayload::PerPerson(builder.build_per_person()));
        }
        if ctx.dirty_entities.contains(&Entity::PerPersonal) {
            match builder.build_per_personal() {
                Ok(payload) => ctx.push_payload(EntityPayload::PerPersonal(payload)),
                Err(err) => ctx.warn(err.to_string()),
            }
        }
        if ctx.dirty_entities.contains(&Entity::PerPhone) {
            match builder.build_phone() {
                Some(payload) => ctx.push_payload(EntityPayload::PerPhone(payload)),
                None => ctx.warn(format!(
                    "Cannot read phone number '{}' for user '{}'",
                    record.phone.as_deref().unwrap_or_default(),
                    ctx.userid
                )),
            }
        }
        if ctx.dirty_entities.contains(&Entity::PerEmail) {
            if ctx.email_actions.is_empty() {
                self.build_reconciled_emails(ctx, record, &builder);
            } else {
                self.build_requested_emails(ctx, &builder);
            }
        }
        if ctx.dirty_entities.contains(&Entity::EmpEmployment)
            || ctx.dirty_entities.contains(&Entity::EmpJob)
        {
            self.build_employment_update(ctx, record);
        }
        if ctx.dirty_entities.contains(&Entity::PositionMatrixRelationships) {
            self.handle_position_matrix(ctx, record);
        }
        if ctx.dirty_entities.contains(&Entity::EmpJobRelationships) {
            self.handle_job_relationships(ctx, record);
        }
        if ctx.dirty_entities.contains(&Entity::UserRole) {
            self.handle_user_role(ctx, record);
        }
    }

    fn build_position_update(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        let Some(code) = ctx.position_code.clone() else {
            // The employee has no position yet, fall back to the creation
            // path, which may reuse a vacant one.
            self.handle_position(ctx, record);
            return;
        };
        if ctx.dirty_entities.contains(&Entity::EmpJob) {
            // The job change already moves the position date through the
            // sync; writing the position here too would shift it twice.
            return;
        }
        let jobcode = record
            .jobcode
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        let Some(mapping) = self.caches.job_mapping(&jobcode) else {
            ctx.fail(ProcessError::UnknownJobCode { jobcode }.to_string());
            return;
        };
        let run_positions = self.run_positions();
        let payload =
            PositionBuilder::new(record, mapping, &self.caches, &run_positions).build_update(&code);
        ctx.push_payload(EntityPayload::Position(payload));
    }

    fn build_requested_emails(&self, ctx: &mut ExecutionContext, builder: &PersonBuilder<'_>) {
        let mut items = Vec::new();
        for request in ctx.email_actions.clone() {
            let Some(email) = request.email.clone() else {
                ctx.warn(format!(
                    "Email action {} without address for user '{}'",
                    request.action, ctx.userid
                ));
                continue;
            };
            let is_primary = match request.action {
                EmailAction::Promote => true,
                EmailAction::Insert => request.email_type == EmailType::Business,
                _ => false,
            };
            items.push(EmailActionItem {
                action: request.action,
                email,
                email_type: request.email_type,
                is_primary,
            });
        }
        let promote: Option<(String, EmailType)> = items
            .iter()
            .find(|item| item.action == EmailAction::Promote)
            .map(|item| (item.email.to_lowercase(), item.email_type));
        if let Some((promote_email, promote_type)) = &promote {
            items.retain(|item| {
                !(item.action == EmailAction::Insert
                    && item.email.to_lowercase() == *promote_email
                    && item.email_type == *promote_type)
            });
        }
        for item in email::finalize(items) {
            ctx.push_payload(EntityPayload::PerEmail(builder.build_email(&item)));
        }
    }

    fn build_employment_update(&self, ctx: &mut ExecutionContext, record: &EmployeeRecord) {
        let Some(position) = ctx.position_code.clone() else {
            ctx.fail(
                ProcessError::UnresolvedPosition {
                    userid: ctx.userid.clone(),
                }
                .to_string(),
            );
            return;
        };
        let Some((start, hire)) = employment_dates(ctx, record) else {
            return;
        };
        let existing = self.caches.employment_of(&ctx.ec_user_id).cloned();
        let seq_number = existing
            .as_ref()
            .and_then(|row| row.seq_number)
            .filter(|seq| *seq > 0)
            .map(|seq| seq + 1)
            .unwrap_or(1);
        let (manager_id, manager_position_start) = resolve_manager(record, &self.caches);
        let builder = EmploymentBuilder {
            ec_user_id: ctx.ec_user_id.clone(),
            person_id_external: record.userid.clone(),
            hire_date: hire,
            start_of_employment: start,
            seq_number,
            event_reason: EventReason::DataChange,
            position,
            manager_id,
            company: record.company.clone(),
            cost_center: record.cost_center.clone(),
            role_code: record.role_code.clone(),
            last_job_start: existing.as_ref().and_then(|row| row.start_date),
            manager_position_start,
        };
        warn_on_swap(ctx, &builder);
        if ctx.dirty_entities.contains(&Entity::EmpEmployment) {
            ctx.push_payload(EntityPayload::EmpEmployment(builder.build_employment()));
        }
        if ctx.dirty_entities.contains(&Entity::EmpJob) {
            let (job, calculated) = builder.build_job(Utc::now().date_naive());
            ctx.push_payload(EntityPayload::EmpJob(job));
            ctx.empjob_start_date = Some(calculated);
        }
    }

    /// Submits the batch entity by entity in plan order. Creation-mode users
    /// are skipped once they carry errors or once a dependency did not reach
    /// SUCCESS; update-mode users bypass both gates.
    async fn submit_batch(&mut self, batch_users: &[String]) {
        let plan: Vec<Entity> = self.profile.plan().to_vec();
        for entity in plan {
            let deps: Vec<Entity> = self.profile.dependencies_of(entity).to_vec();
            let mut submissions: BTreeMap<String, Vec<EntityPayload>> = BTreeMap::new();
            for userid in batch_users {
                let Some(ctx) = self.results.get_mut(userid) else {
                    continue;
                };
                if !ctx.is_update && (ctx.has_errors() || !ctx.dependencies_satisfied(&deps)) {
                    ctx.skip_if_pending(entity);
                    continue;
                }
                let payloads = ctx.payloads_for(entity);
                if payloads.is_empty() {
                    continue;
                }
                submissions.insert(userid.clone(), payloads.to_vec());
            }

            if !submissions.is_empty() {
                info!(
                    "Submitting {} user(s) for entity {}",
                    submissions.len(),
                    entity
                );
                if entity == Entity::PerEmail {
                    self.submit_email_round(submissions).await;
                } else {
                    match self.upsert.upsert_for_users(entity, &submissions).await {
                        Ok(outcomes) => self.apply_outcomes(entity, &submissions, &outcomes),
                        Err(err) => {
                            warn!("Entity {} upsert failed as a whole: {}", entity, err);
                            for userid in submissions.keys() {
                                if let Some(ctx) = self.results.get_mut(userid) {
                                    ctx.set_status(entity, EntityStatus::Failed);
                                    ctx.fail(format!("{entity} failed - {err}"));
                                }
                            }
                        }
                    }
                }
            }

            if entity == Entity::Position {
                self.resume_deferred_users(batch_users);
            }
            if entity == Entity::EmpJob {
                self.sync_position_dates(batch_users).await;
            }
            for userid in batch_users {
                if let Some(ctx) = self.results.get_mut(userid) {
                    ctx.skip_if_pending(entity);
                }
            }
        }
    }

    /// Email payloads go out in action chunks: demote, delete, type move,
    /// promote, insert. An earlier failure for a user is never overwritten
    /// by a later chunk's success.
    async fn submit_email_round(&mut self, submissions: BTreeMap<String, Vec<EntityPayload>>) {
        let mut merged: BTreeMap<String, UpsertOutcome> = BTreeMap::new();
        for action in EMAIL_ACTION_ORDER {
            let mut chunk: BTreeMap<String, Vec<EntityPayload>> = BTreeMap::new();
            for (userid, payloads) in &submissions {
                let matching: Vec<EntityPayload> = payloads
                    .iter()
                    .filter(|payload| {
                        matches!(payload, EntityPayload::PerEmail(write) if write.action == action)
                    })
                    .cloned()
                    .collect();
                if !matching.is_empty() {
                    chunk.insert(userid.clone(), matching);
                }
            }
            if chunk.is_empty() {
                continue;
            }
            match self.upsert.upsert_for_users(Entity::PerEmail, &chunk).await {
                Ok(outcomes) => {
                    for (userid, outcome) in outcomes {
                        let keep_earlier_failure =
                            merged.get(&userid).is_some_and(UpsertOutcome::is_failed);
                        if !keep_earlier_failure {
                            merged.insert(userid, outcome);
                        }
                    }
                }
                Err(err) => {
                    warn!("PerEmail {} chunk failed as a whole: {}", action, err);
                    for userid in chunk.keys() {
                        let failure = UpsertOutcome {
                            status: UpsertStatus::Failed,
                            message: Some(err.to_string()),
                            key: None,
                            http_code: None,
                            error_kind: None,
                        };
                        merged.insert(userid.clone(), failure);
                    }
                }
            }
        }
        for (userid, outcome) in merged {
            if let Some(ctx) = self.results.get_mut(&userid) {
                apply_outcome(ctx, Entity::PerEmail, &outcome);
            }
        }
    }

    fn apply_outcomes(
        &mut self,
        entity: Entity,
        submissions: &BTreeMap<String, Vec<EntityPayload>>,
        outcomes: &BTreeMap<String, UpsertOutcome>,
    ) {
        for userid in submissions.keys() {
            let Some(ctx) = self.results.get_mut(userid) else {
                continue;
            };
            match outcomes.get(userid) {
                Some(outcome) => apply_outcome(ctx, entity, outcome),
                None => {
                    ctx.set_status(entity, EntityStatus::Failed);
                    let message = format!("{entity} returned no result for user '{userid}'");
                    if entity.is_relationship() {
                        ctx.warn(message);
                    } else {
                        ctx.fail(message);
                    }
                }
            }
        }
    }

    /// Users whose employment was deferred until their new position got a
    /// code rebuild the dependent payloads right after the position round.
    fn resume_deferred_users(&mut self, batch_users: &[String]) {
        for userid in batch_users {
            let eligible = self.results.get(userid).is_some_and(|ctx| {
                ctx.needs_position_lookup && !ctx.has_errors() && ctx.position_code.is_some()
            });
            if !eligible {
                continue;
            }
            let Some(mut ctx) = self.results.remove(userid) else {
                continue;
            };
            ctx.needs_position_lookup = false;
            if let Some(record) = ctx.record.clone() {
                if !self.strategy.skip_relationship_stages(&ctx) {
                    if self.profile.includes(Entity::PositionMatrixRelationships) {
                        self.handle_position_matrix(&mut ctx, &record);
                    }
                }
                self.strategy.resume_employment(&mut ctx, &record, &self.caches);
                if !self.strategy.skip_relationship_stages(&ctx)
                    && self.profile.includes(Entity::EmpJobRelationships)
                {
                    self.handle_job_relationships(&mut ctx, &record);
                }
            }
            self.results.insert(userid.clone(), ctx);
        }
    }

    /// After the job round the position's effective start is aligned with
    /// the submitted job start. Failures only warn; the job itself stands.
    async fn sync_position_dates(&mut self, batch_users: &[String]) {
        for userid in batch_users {
            let sync_input = self.results.get(userid).and_then(|ctx| {
                let eligible = ctx.status_of(Entity::EmpJob) == Some(EntityStatus::Success)
                    && !ctx.has_errors();
                match (eligible, &ctx.position_code, ctx.empjob_start_date) {
                    (true, Some(code), Some(start)) => Some((code.clone(), start)),
                    _ => None,
                }
            });
            let Some((code, start)) = sync_input else {
                continue;
            };
            let payload = EntityPayload::Position(build_sync(&code, start, &self.caches));
            let outcome = self.upsert.upsert_one(Entity::Position, &payload).await;
            let Some(ctx) = self.results.get_mut(userid) else {
                continue;
            };
            match outcome {
                Ok(result) => {
                    if result.is_failed() {
                        ctx.warn(format!(
                            "Position date sync failed for '{}': {}",
                            code,
                            result.message.as_deref().unwrap_or("no message")
                        ));
                    }
                    ctx.sync_outcome = Some(result);
                }
                Err(err) => ctx.warn(format!("Position date sync failed for '{code}': {err}")),
            }
        }
    }
}

fn apply_outcome(ctx: &mut ExecutionContext, entity: Entity, outcome: &UpsertOutcome) {
    match outcome.status {
        UpsertStatus::Success | UpsertStatus::Warning => {
            if outcome.status == UpsertStatus::Warning {
                ctx.warn(format!(
                    "{} warning: {}",
                    entity,
                    outcome.message.as_deref().unwrap_or("no message")
                ));
            }
            ctx.set_status(entity, EntityStatus::Success);
            if entity == Entity::Position {
                let code = outcome
                    .key
                    .as_deref()
                    .and_then(position_code_from_key)
                    .map(str::to_string);
                if let Some(code) = code {
                    ctx.position_code = Some(code);
                }
            }
        }
        UpsertStatus::Failed => {
            ctx.set_status(entity, EntityStatus::Failed);
            let message = format!(
                "{} failed - Message: {}, HTTP Code: {}, Key: {}",
                entity,
                outcome.message.as_deref().unwrap_or("none"),
                outcome
                    .http_code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                outcome.key.as_deref().unwrap_or("none")
            );
            if entity.is_relationship() {
                ctx.warn(message);
            } else {
                ctx.fail(message);
            }
        }
    }
}
