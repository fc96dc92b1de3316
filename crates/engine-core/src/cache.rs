use chrono::NaiveDate;
use model::contact::EmailType;
use model::payload::RelationKind;
use model::record::EmployeeRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn norm(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn eq_ci(a: Option<&str>, b: Option<&str>) -> bool {
    norm(a) == norm(b)
}

/// One position from the target-side position snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRow {
    pub code: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub jobcode: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub cost_center: Option<String>,
    #[serde(default)]
    pub effective_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub standard_hours: Option<String>,
    /// "1" marks a critical position that must never be reused.
    #[serde(default)]
    pub criticality: Option<String>,
}

impl PositionRow {
    pub fn is_critical(&self) -> bool {
        self.criticality.as_deref().map(str::trim) == Some("1")
    }
}

/// One row of the target-side employment snapshot: the current job state of
/// an already-existing employee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmploymentRow {
    pub userid: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub seq_number: Option<i64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

/// One row of the target-side person snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRow {
    pub person_id_external: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub date_of_position: Option<NaiveDate>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub private_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// One mailbox row currently present in the target system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRow {
    pub person_id_external: String,
    pub email_address: String,
    pub email_type: EmailType,
    #[serde(default)]
    pub is_primary: bool,
}

/// One user-to-user job relationship currently present in the target system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRelationshipRow {
    pub userid: String,
    pub relationship: RelationKind,
    pub rel_userid: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

/// Organizational attributes keyed by job code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMapping {
    pub jobcode: String,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub geographical_scope: Option<String>,
    #[serde(default)]
    pub sub_unit: Option<String>,
}

/// Current role assignment of a target-side login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRow {
    pub userid: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// All target-side reference data one run works against. Loaded up front and
/// injected; the processor only mutates it when a run itself creates
/// reference rows (e.g. the migration placeholder position) or when the
/// runtime refreshes snapshots between batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceCaches {
    pub positions: Vec<PositionRow>,
    pub employees: Vec<EmploymentRow>,
    pub persons: Vec<PersonRow>,
    pub emails: Vec<EmailRow>,
    pub job_relationships: Vec<JobRelationshipRow>,
    pub job_mappings: Vec<JobMapping>,
    pub roles: Vec<RoleRow>,
    /// Source user id -> target login, where they differ.
    pub cross_reference: BTreeMap<String, String>,
    /// Full source-system master data, keyed lookups by user id.
    pub source_records: Vec<EmployeeRecord>,
    /// Users allowed to keep their real email addresses.
    pub hr_global_users: BTreeSet<String>,
    pub anonymization_exempt: BTreeSet<String>,
}

impl ReferenceCaches {
    /// Resolves the target-side login for a source user id.
    pub fn ec_user_id(&self, userid: &str) -> String {
        let key = userid.trim().to_lowercase();
        self.cross_reference
            .iter()
            .find(|(source, _)| source.trim().to_lowercase() == key)
            .map(|(_, target)| target.trim().to_lowercase())
            .unwrap_or(key)
    }

    pub fn source_record(&self, userid: &str) -> Option<&EmployeeRecord> {
        self.source_records
            .iter()
            .find(|r| eq_ci(Some(&r.userid), Some(userid)))
    }

    pub fn employment_of(&self, ec_user_id: &str) -> Option<&EmploymentRow> {
        self.employees
            .iter()
            .find(|row| eq_ci(Some(&row.userid), Some(ec_user_id)))
    }

    /// The position currently assigned to an existing employee, if any.
    pub fn position_code_of(&self, ec_user_id: &str) -> Option<&str> {
        self.employment_of(ec_user_id)?
            .position
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn position_row(&self, code: &str) -> Option<&PositionRow> {
        self.positions
            .iter()
            .find(|row| eq_ci(Some(&row.code), Some(code)))
    }

    /// Finds a reusable vacant position matching the record's organizational
    /// coordinates. Critical positions and positions already claimed by
    /// another user of the current run (`taken`) are never reused.
    pub fn find_matching_position(
        &self,
        record: &EmployeeRecord,
        taken: &BTreeSet<String>,
    ) -> Option<&PositionRow> {
        self.positions.iter().find(|row| {
            !row.is_critical()
                && !taken.contains(row.code.trim())
                && eq_ci(row.jobcode.as_deref(), record.jobcode.as_deref())
                && eq_ci(row.location.as_deref(), record.address_code.as_deref())
                && eq_ci(row.cost_center.as_deref(), record.cost_center.as_deref())
                && eq_ci(row.company.as_deref(), record.company.as_deref())
        })
    }

    /// Finds the placeholder position a migration run stages employees
    /// through, by company and placeholder job code.
    pub fn placeholder_position(&self, company: &str, jobcode: &str) -> Option<&PositionRow> {
        self.positions.iter().find(|row| {
            eq_ci(row.company.as_deref(), Some(company))
                && eq_ci(row.jobcode.as_deref(), Some(jobcode))
        })
    }

    pub fn push_position(&mut self, row: PositionRow) {
        self.positions.push(row);
    }

    pub fn person(&self, person_id_external: &str) -> Option<&PersonRow> {
        self.persons
            .iter()
            .find(|row| eq_ci(Some(&row.person_id_external), Some(person_id_external)))
    }

    /// True when the target-side person row matches the source record on all
    /// change-detected fields, meaning person payloads can be skipped.
    pub fn person_matches(&self, record: &EmployeeRecord) -> bool {
        let Some(person) = self.person(&record.userid) else {
            return false;
        };
        eq_ci(person.firstname.as_deref(), record.firstname.as_deref())
            && eq_ci(person.lastname.as_deref(), record.lastname.as_deref())
            && eq_ci(person.gender.as_deref(), record.gender.as_deref())
            && person.date_of_birth == record.date_of_birth
            && person.date_of_position == record.date_of_position
            && eq_ci(person.email.as_deref(), record.email.as_deref())
            && eq_ci(person.private_email.as_deref(), record.private_email.as_deref())
            && eq_ci(person.phone.as_deref(), record.phone.as_deref())
    }

    pub fn emails_of(&self, person_id_external: &str) -> Vec<&EmailRow> {
        self.emails
            .iter()
            .filter(|row| eq_ci(Some(&row.person_id_external), Some(person_id_external)))
            .collect()
    }

    pub fn job_relationship(
        &self,
        ec_user_id: &str,
        kind: RelationKind,
    ) -> Option<&JobRelationshipRow> {
        self.job_relationships
            .iter()
            .find(|row| row.relationship == kind && eq_ci(Some(&row.userid), Some(ec_user_id)))
    }

    pub fn job_mapping(&self, jobcode: &str) -> Option<&JobMapping> {
        self.job_mappings
            .iter()
            .find(|row| eq_ci(Some(&row.jobcode), Some(jobcode)))
    }

    pub fn role_of(&self, ec_user_id: &str) -> Option<&str> {
        self.roles
            .iter()
            .find(|row| eq_ci(Some(&row.userid), Some(ec_user_id)))?
            .role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}
