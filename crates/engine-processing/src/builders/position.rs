use crate::error::ProcessError;
use chrono::NaiveDate;
use engine_core::cache::{JobMapping, ReferenceCaches};
use model::payload::{
    POSITION_EPOCH, PositionMatrixRelationshipPayload, PositionPayload, RelationKind,
};
use model::record::EmployeeRecord;
use std::collections::BTreeMap;

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Builds position payloads from the source record plus the job-code
/// organizational mapping. `run_positions` maps user ids to position codes
/// already resolved earlier in the current run, so managers created in the
/// same run can be linked.
pub struct PositionBuilder<'a> {
    record: &'a EmployeeRecord,
    mapping: &'a JobMapping,
    caches: &'a ReferenceCaches,
    run_positions: &'a BTreeMap<String, String>,
}

impl<'a> PositionBuilder<'a> {
    pub fn new(
        record: &'a EmployeeRecord,
        mapping: &'a JobMapping,
        caches: &'a ReferenceCaches,
        run_positions: &'a BTreeMap<String, String>,
    ) -> Self {
        PositionBuilder {
            record,
            mapping,
            caches,
            run_positions,
        }
    }

    pub fn build_create(&self) -> PositionPayload {
        self.organizational_payload()
    }

    /// Update payload for an existing position; effective start and standard
    /// hours are taken from the cached row so the update does not move the
    /// effective-dated history.
    pub fn build_update(&self, code: &str) -> PositionPayload {
        let mut payload = self.organizational_payload();
        payload.code = Some(code.to_string());
        if let Some(row) = self.caches.position_row(code) {
            payload.effective_start_date = row.effective_start_date.unwrap_or(POSITION_EPOCH);
            if let Some(hours) = clean(&row.standard_hours) {
                payload.standard_hours = hours;
            }
        }
        payload
    }

    fn organizational_payload(&self) -> PositionPayload {
        let mut payload = PositionPayload::template();
        payload.company = clean(&self.record.company);
        payload.cost_center = clean(&self.record.cost_center);
        payload.country_of_registration = clean(&self.record.country_iso3);
        payload.job_code = clean(&self.record.jobcode);
        payload.location = clean(&self.record.address_code);
        payload.division = clean(&self.mapping.division);
        payload.geographical_scope = clean(&self.mapping.geographical_scope);
        payload.sub_unit = clean(&self.mapping.sub_unit);
        if self.record.is_scm {
            payload.position_criticality = Some("1".to_string());
        }
        self.apply_manager(&mut payload);
        payload
    }

    /// The manager link is a parent-position reference when the manager's
    /// position is known, otherwise a supervisor fallback by login.
    fn apply_manager(&self, payload: &mut PositionPayload) {
        let Some(manager) = self.record.manager() else {
            return;
        };
        let manager_ec = self.caches.ec_user_id(manager);
        let manager_position = self
            .caches
            .position_code_of(&manager_ec)
            .map(str::to_string)
            .or_else(|| self.run_positions.get(&manager.to_lowercase()).cloned());
        match manager_position {
            Some(code) => payload.parent_position = Some(code),
            None => payload.supervisor = Some(manager_ec),
        }
    }
}

/// Minimal payload for the position-to-job date sync: only the effective
/// start moves, everything else stays as cached.
pub fn build_sync(code: &str, start_date: NaiveDate, caches: &ReferenceCaches) -> PositionPayload {
    let mut payload = PositionPayload::template();
    payload.code = Some(code.to_string());
    payload.effective_start_date = start_date;
    if let Some(hours) = caches.position_row(code).and_then(|row| clean(&row.standard_hours)) {
        payload.standard_hours = hours;
    }
    payload
}

/// Placeholder position a migration run stages employees through. Only
/// non-empty organizational fields are written.
pub fn build_placeholder(
    company: &str,
    jobcode: &str,
    division: Option<String>,
    geographical_scope: Option<String>,
    sub_unit: Option<String>,
    country_iso3: Option<String>,
) -> PositionPayload {
    let mut payload = PositionPayload::template();
    payload.company = Some(company.to_string());
    payload.job_code = Some(jobcode.to_string());
    payload.division = division.filter(|v| !v.trim().is_empty());
    payload.geographical_scope = geographical_scope.filter(|v| !v.trim().is_empty());
    payload.sub_unit = sub_unit.filter(|v| !v.trim().is_empty());
    payload.country_of_registration = country_iso3.filter(|v| !v.trim().is_empty());
    payload
}

/// Position-to-position matrix link. Fails when the related user has no
/// position yet; callers downgrade that to a warning.
pub fn build_matrix_relationship(
    user_position: &str,
    kind: RelationKind,
    related_userid: &str,
    caches: &ReferenceCaches,
    run_positions: &BTreeMap<String, String>,
) -> Result<PositionMatrixRelationshipPayload, ProcessError> {
    let related_ec = caches.ec_user_id(related_userid);
    let related_position = caches
        .position_code_of(&related_ec)
        .map(str::to_string)
        .or_else(|| run_positions.get(&related_userid.to_lowercase()).cloned())
        .ok_or_else(|| ProcessError::UnresolvedRelatedPosition {
            userid: related_userid.to_string(),
        })?;
    let start = caches
        .position_row(user_position)
        .and_then(|row| row.effective_start_date)
        .unwrap_or(POSITION_EPOCH);
    Ok(PositionMatrixRelationshipPayload {
        position_code: user_position.to_string(),
        position_effective_start_date: start,
        relationship: kind.matrix_label().to_string(),
        related_position,
    })
}
