use chrono::NaiveDate;
use model::contact::RequestedEmailAction;
use model::entity::{Entity, EntityStatus};
use model::outcome::UpsertOutcome;
use model::payload::EntityPayload;
use model::record::EmployeeRecord;
use std::collections::{BTreeMap, BTreeSet};

/// Mutable per-employee state threaded through one run: payloads built so
/// far, per-entity status, and everything later stages need from earlier
/// ones. One context per user, kept across batches.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub userid: String,
    /// Target-side login, resolved through the cross-reference table.
    pub ec_user_id: String,
    pub record: Option<EmployeeRecord>,
    pub is_update: bool,
    pub is_scm: bool,
    pub is_im: bool,
    /// The HR manager is created in the same run; relationship stages are
    /// replayed once it exists.
    pub needs_hr_retry: bool,
    /// Employment building was deferred because the position code only
    /// becomes known after the position round.
    pub needs_position_lookup: bool,
    /// A position creation payload was built for this user in this run.
    pub position_being_created: bool,
    pub has_existing_empjob: bool,
    pub position_code: Option<String>,
    pub dummy_position: Option<String>,
    /// Calculated start date of the submitted EmpJob row, reused by the
    /// position-to-job date sync.
    pub empjob_start_date: Option<NaiveDate>,
    pub dirty_entities: BTreeSet<Entity>,
    pub email_actions: Vec<RequestedEmailAction>,
    /// Outcome of the position-to-job date sync, tracked separately from the
    /// regular position round.
    pub sync_outcome: Option<UpsertOutcome>,
    errors: Vec<String>,
    warnings: Vec<String>,
    status: BTreeMap<Entity, EntityStatus>,
    payloads: BTreeMap<Entity, Vec<EntityPayload>>,
}

impl ExecutionContext {
    /// Context for a creation pipeline; every planned entity starts pending.
    pub fn creation(record: EmployeeRecord, ec_user_id: String, plan: &[Entity]) -> Self {
        let status = plan.iter().map(|e| (*e, EntityStatus::Pending)).collect();
        ExecutionContext {
            userid: record.userid.clone(),
            ec_user_id,
            is_scm: record.is_scm,
            is_im: record.is_im,
            record: Some(record),
            is_update: false,
            needs_hr_retry: false,
            needs_position_lookup: false,
            position_being_created: false,
            has_existing_empjob: false,
            position_code: None,
            dummy_position: None,
            empjob_start_date: None,
            dirty_entities: BTreeSet::new(),
            email_actions: Vec::new(),
            sync_outcome: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            status,
            payloads: BTreeMap::new(),
        }
    }

    /// Context for an update pipeline; only entities marked dirty get a
    /// status entry.
    pub fn update(record: EmployeeRecord, ec_user_id: String) -> Self {
        let mut ctx = ExecutionContext::creation(record, ec_user_id, &[]);
        ctx.is_update = true;
        ctx
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("User {}: {}", self.userid, message);
        self.errors.push(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("User {}: {}", self.userid, message);
        self.warnings.push(message);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Marks an entity dirty for the update pipeline and registers it as
    /// pending.
    pub fn mark_dirty(&mut self, entity: Entity) {
        self.dirty_entities.insert(entity);
        self.status.entry(entity).or_insert(EntityStatus::Pending);
    }

    /// Records a submission result. Terminal statuses stick: once an entity
    /// is SUCCESS, FAILED or SKIPPED for this user it never changes again.
    pub fn set_status(&mut self, entity: Entity, status: EntityStatus) {
        let current = self.status.entry(entity).or_insert(EntityStatus::Pending);
        if !current.is_terminal() {
            *current = status;
        }
    }

    /// Marks a dependency as satisfied without submitting it, e.g. when the
    /// record already exists in the target system.
    pub fn satisfy_dependency(&mut self, entity: Entity) {
        self.set_status(entity, EntityStatus::Success);
    }

    pub fn status_of(&self, entity: Entity) -> Option<EntityStatus> {
        self.status.get(&entity).copied()
    }

    pub fn statuses(&self) -> impl Iterator<Item = (Entity, EntityStatus)> + '_ {
        self.status.iter().map(|(e, s)| (*e, *s))
    }

    /// True when every dependency reached SUCCESS for this user.
    pub fn dependencies_satisfied(&self, dependencies: &[Entity]) -> bool {
        dependencies
            .iter()
            .all(|dep| self.status_of(*dep) == Some(EntityStatus::Success))
    }

    /// Skips the entity if it is still pending after its submission round.
    pub fn skip_if_pending(&mut self, entity: Entity) {
        if self.status_of(entity) == Some(EntityStatus::Pending) {
            self.set_status(entity, EntityStatus::Skipped);
        }
    }

    pub fn set_payloads(&mut self, entity: Entity, payloads: Vec<EntityPayload>) {
        if payloads.is_empty() {
            self.payloads.remove(&entity);
        } else {
            self.payloads.insert(entity, payloads);
        }
    }

    pub fn push_payload(&mut self, payload: EntityPayload) {
        self.payloads.entry(payload.entity()).or_default().push(payload);
    }

    pub fn payloads_for(&self, entity: Entity) -> &[EntityPayload] {
        self.payloads.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear_payloads(&mut self, entity: Entity) {
        self.payloads.remove(&entity);
    }

    pub fn all_payloads(&self) -> &BTreeMap<Entity, Vec<EntityPayload>> {
        &self.payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        let record = EmployeeRecord {
            userid: "u100".into(),
            ..Default::default()
        };
        ExecutionContext::creation(
            record,
            "u100".into(),
            &[Entity::Position, Entity::PerPerson, Entity::EmpJob],
        )
    }

    #[test]
    fn planned_entities_start_pending() {
        let ctx = ctx();
        assert_eq!(ctx.status_of(Entity::Position), Some(EntityStatus::Pending));
        assert_eq!(ctx.status_of(Entity::PerEmail), None);
    }

    #[test]
    fn terminal_status_never_transitions_again() {
        let mut ctx = ctx();
        ctx.set_status(Entity::Position, EntityStatus::Failed);
        ctx.set_status(Entity::Position, EntityStatus::Success);
        assert_eq!(ctx.status_of(Entity::Position), Some(EntityStatus::Failed));
    }

    #[test]
    fn skip_if_pending_leaves_terminal_statuses_alone() {
        let mut ctx = ctx();
        ctx.set_status(Entity::Position, EntityStatus::Success);
        ctx.skip_if_pending(Entity::Position);
        ctx.skip_if_pending(Entity::EmpJob);
        assert_eq!(ctx.status_of(Entity::Position), Some(EntityStatus::Success));
        assert_eq!(ctx.status_of(Entity::EmpJob), Some(EntityStatus::Skipped));
    }

    #[test]
    fn dependencies_require_success_on_all() {
        let mut ctx = ctx();
        ctx.set_status(Entity::Position, EntityStatus::Success);
        assert!(!ctx.dependencies_satisfied(&[Entity::Position, Entity::PerPerson]));
        ctx.satisfy_dependency(Entity::PerPerson);
        assert!(ctx.dependencies_satisfied(&[Entity::Position, Entity::PerPerson]));
    }

    #[test]
    fn errors_and_warnings_accumulate_separately() {
        let mut ctx = ctx();
        ctx.warn("minor");
        assert!(ctx.has_warnings() && !ctx.has_errors());
        ctx.fail("major");
        assert!(ctx.has_errors());
        assert_eq!(ctx.errors().len(), 1);
    }
}
