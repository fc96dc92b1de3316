use crate::contact::{EmailAction, EmailType};
use crate::entity::Entity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Effective start date used for positions whose real start is unknown.
/// The target system treats it as "since forever".
pub const POSITION_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1900, 1, 1) {
    Some(date) => date,
    None => unreachable!(),
};

pub const DEFAULT_STANDARD_HOURS: &str = "40";
pub const DEFAULT_ROLE_CODE: &str = "19677";
pub const PHONE_TYPE_BUSINESS: &str = "18258";
pub const TERMINATION_EVENT_REASON: &str = "TERRTMNT";

/// Event reason attached to an employment job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventReason {
    #[serde(rename = "INITLOAD")]
    InitLoad,
    #[serde(rename = "DATACHG")]
    DataChange,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::InitLoad => "INITLOAD",
            EventReason::DataChange => "DATACHG",
        }
    }
}

/// Non-default write operations understood by the target upsert endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOperation {
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "DELIMIT")]
    Delimit,
}

/// Secondary reporting lines carried both as position-to-position links and
/// as user-to-user job relationships, each with its own picklist values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationKind {
    MatrixManager,
    HrManager,
}

impl RelationKind {
    /// Picklist value for the position-to-position matrix link.
    pub fn matrix_label(&self) -> &'static str {
        match self {
            RelationKind::MatrixManager => "matrix manager",
            RelationKind::HrManager => "hr manager",
        }
    }

    /// Picklist id for the user-to-user job relationship.
    pub fn job_relationship_code(&self) -> &'static str {
        match self {
            RelationKind::MatrixManager => "18385",
            RelationKind::HrManager => "18387",
        }
    }
}

mod email_type_code {
    use super::EmailType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &EmailType, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(value.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<EmailType, D::Error> {
        let token = String::deserialize(de)?;
        Ok(EmailType::from_token(&token))
    }
}

mod relation_code {
    use super::RelationKind;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::de::Error;

    pub fn serialize<S: Serializer>(value: &RelationKind, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(value.job_relationship_code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<RelationKind, D::Error> {
        match String::deserialize(de)?.as_str() {
            "18385" => Ok(RelationKind::MatrixManager),
            "18387" => Ok(RelationKind::HrManager),
            other => Err(D::Error::custom(format!("unknown relationship code '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub effective_start_date: NaiveDate,
    pub effective_status: String,
    pub change_reason: String,
    pub technical_parameters: String,
    pub standard_hours: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,
    #[serde(rename = "cust_Country_Of_Registration", skip_serializing_if = "Option::is_none")]
    pub country_of_registration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "cust_geographicalScope", skip_serializing_if = "Option::is_none")]
    pub geographical_scope: Option<String>,
    #[serde(rename = "cust_subUnit", skip_serializing_if = "Option::is_none")]
    pub sub_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_criticality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_position: Option<String>,
    #[serde(rename = "cust_Supervisor", skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<String>,
    #[serde(rename = "cust_Email_Address_Required")]
    pub email_address_required: bool,
}

impl PositionPayload {
    /// Baseline payload with target-side constants filled in. Builders set
    /// the organizational fields on top of this.
    pub fn template() -> PositionPayload {
        PositionPayload {
            code: None,
            effective_start_date: POSITION_EPOCH,
            effective_status: "A".to_string(),
            change_reason: "import".to_string(),
            technical_parameters: "SYNC".to_string(),
            standard_hours: DEFAULT_STANDARD_HOURS.to_string(),
            company: None,
            cost_center: None,
            country_of_registration: None,
            division: None,
            job_code: None,
            location: None,
            geographical_scope: None,
            sub_unit: None,
            position_criticality: None,
            parent_position: None,
            supervisor: None,
            email_address_required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMatrixRelationshipPayload {
    #[serde(rename = "Position_code")]
    pub position_code: String,
    #[serde(rename = "Position_effectiveStartDate")]
    pub position_effective_start_date: NaiveDate,
    #[serde(rename = "matrixRelationshipType")]
    pub relationship: String,
    #[serde(rename = "relatedPosition")]
    pub related_position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerPersonPayload {
    pub person_id_external: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerPersonalPayload {
    pub person_id_external: String,
    pub start_date: NaiveDate,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_name: Option<String>,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerEmailPayload {
    pub person_id_external: String,
    pub email_address: String,
    #[serde(with = "email_type_code")]
    pub email_type: EmailType,
    pub is_primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<WriteOperation>,
}

/// An email payload tagged with the action that produced it. The tag routes
/// the payload into the right submission chunk and is never sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailWrite {
    pub action: EmailAction,
    pub payload: PerEmailPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerPhonePayload {
    pub person_id_external: String,
    pub phone_type: String,
    pub phone_number: String,
    #[serde(rename = "customString1", skip_serializing_if = "Option::is_none")]
    pub country_iso: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmpEmploymentPayload {
    pub user_id: String,
    pub person_id_external: String,
    pub start_date: NaiveDate,
    pub original_start_date: NaiveDate,
    pub service_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_string8: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmpJobPayload {
    pub user_id: String,
    pub position: String,
    pub start_date: NaiveDate,
    pub event_reason: EventReason,
    pub seq_number: i64,
    pub manager_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmpJobRelationshipPayload {
    pub user_id: String,
    pub start_date: NaiveDate,
    #[serde(rename = "relationshipType", with = "relation_code")]
    pub relationship: RelationKind,
    pub rel_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<WriteOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmpEmploymentTerminationPayload {
    pub user_id: String,
    pub person_id_external: String,
    pub end_date: NaiveDate,
    pub event_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRolePayload {
    pub user_id: String,
    pub custom08: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub user_id: String,
    pub status: String,
}

/// A payload bound to the entity endpoint it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "data")]
pub enum EntityPayload {
    Position(PositionPayload),
    PositionMatrixRelationship(PositionMatrixRelationshipPayload),
    PerPerson(PerPersonPayload),
    PerPersonal(PerPersonalPayload),
    PerEmail(EmailWrite),
    PerPhone(PerPhonePayload),
    EmpEmployment(EmpEmploymentPayload),
    EmpInitLoadJob(EmpJobPayload),
    EmpJob(EmpJobPayload),
    EmpJobRelationship(EmpJobRelationshipPayload),
    EmpEmploymentTermination(EmpEmploymentTerminationPayload),
    UserRole(UserRolePayload),
    UserStatus(UserStatusPayload),
}

impl EntityPayload {
    pub fn entity(&self) -> Entity {
        match self {
            EntityPayload::Position(_) => Entity::Position,
            EntityPayload::PositionMatrixRelationship(_) => Entity::PositionMatrixRelationships,
            EntityPayload::PerPerson(_) => Entity::PerPerson,
            EntityPayload::PerPersonal(_) => Entity::PerPersonal,
            EntityPayload::PerEmail(_) => Entity::PerEmail,
            EntityPayload::PerPhone(_) => Entity::PerPhone,
            EntityPayload::EmpEmployment(_) => Entity::EmpEmployment,
            EntityPayload::EmpInitLoadJob(_) => Entity::EmpInitLoadJob,
            EntityPayload::EmpJob(_) => Entity::EmpJob,
            EntityPayload::EmpJobRelationship(_) => Entity::EmpJobRelationships,
            EntityPayload::EmpEmploymentTermination(_) => Entity::EmpEmploymentTermination,
            EntityPayload::UserRole(_) => Entity::UserRole,
            EntityPayload::UserStatus(_) => Entity::User,
        }
    }

    /// Serializes the wire body only. The email action tag is routing
    /// metadata and is stripped here.
    pub fn to_wire(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            EntityPayload::Position(p) => serde_json::to_value(p),
            EntityPayload::PositionMatrixRelationship(p) => serde_json::to_value(p),
            EntityPayload::PerPerson(p) => serde_json::to_value(p),
            EntityPayload::PerPersonal(p) => serde_json::to_value(p),
            EntityPayload::PerEmail(write) => serde_json::to_value(&write.payload),
            EntityPayload::PerPhone(p) => serde_json::to_value(p),
            EntityPayload::EmpEmployment(p) => serde_json::to_value(p),
            EntityPayload::EmpInitLoadJob(p) => serde_json::to_value(p),
            EntityPayload::EmpJob(p) => serde_json::to_value(p),
            EntityPayload::EmpJobRelationship(p) => serde_json::to_value(p),
            EntityPayload::EmpEmploymentTermination(p) => serde_json::to_value(p),
            EntityPayload::UserRole(p) => serde_json::to_value(p),
            EntityPayload::UserStatus(p) => serde_json::to_value(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_template_carries_target_constants() {
        let payload = PositionPayload::template();
        assert_eq!(payload.effective_status, "A");
        assert_eq!(payload.change_reason, "import");
        assert_eq!(payload.technical_parameters, "SYNC");
        assert_eq!(payload.standard_hours, "40");
        assert_eq!(payload.effective_start_date, POSITION_EPOCH);
    }

    #[test]
    fn email_wire_body_uses_picklist_code_and_drops_action_tag() {
        let write = EmailWrite {
            action: EmailAction::Promote,
            payload: PerEmailPayload {
                person_id_external: "p100".into(),
                email_address: "jane@example.com".into(),
                email_type: EmailType::Business,
                is_primary: true,
                operation: None,
            },
        };
        let wire = EntityPayload::PerEmail(write).to_wire().unwrap();
        assert_eq!(wire["emailType"], "18242");
        assert_eq!(wire["isPrimary"], true);
        assert!(wire.get("action").is_none());
        assert!(wire.get("operation").is_none());
    }

    #[test]
    fn relationship_payload_serializes_picklist_code() {
        let payload = EmpJobRelationshipPayload {
            user_id: "u100".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            relationship: RelationKind::HrManager,
            rel_user_id: "u200".into(),
            operation: Some(WriteOperation::Delimit),
        };
        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["relationshipType"], "18387");
        assert_eq!(wire["operation"], "DELIMIT");
    }

    #[test]
    fn empty_organizational_fields_are_omitted() {
        let mut payload = PositionPayload::template();
        payload.company = Some("1710".into());
        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["company"], "1710");
        assert!(wire.get("division").is_none());
        assert!(wire.get("cust_Supervisor").is_none());
    }
}
