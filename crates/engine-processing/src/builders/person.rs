use crate::email::EmailActionItem;
use crate::error::ProcessError;
use model::contact::EmailAction;
use model::payload::{
    EmailWrite, PHONE_TYPE_BUSINESS, PerEmailPayload, PerPersonPayload, PerPersonalPayload,
    PerPhonePayload, WriteOperation,
};
use model::record::EmployeeRecord;

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Builds the person-side payloads for one employee. The source user id
/// doubles as the target-side person key.
pub struct PersonBuilder<'a> {
    record: &'a EmployeeRecord,
}

impl<'a> PersonBuilder<'a> {
    pub fn new(record: &'a EmployeeRecord) -> Self {
        PersonBuilder { record }
    }

    pub fn build_per_person(&self) -> PerPersonPayload {
        PerPersonPayload {
            person_id_external: self.record.userid.clone(),
            date_of_birth: self.record.date_of_birth,
        }
    }

    pub fn build_per_personal(&self) -> Result<PerPersonalPayload, ProcessError> {
        let mut missing = Vec::new();
        let first_name = clean(&self.record.firstname).unwrap_or_else(|| {
            missing.push("firstname");
            String::new()
        });
        let last_name = clean(&self.record.lastname).unwrap_or_else(|| {
            missing.push("lastname");
            String::new()
        });
        if !missing.is_empty() {
            return Err(ProcessError::MissingFields {
                entity: "PerPersonal",
                fields: missing.join(", "),
            });
        }
        let start_date = self.record.employment_start().ok_or_else(|| {
            ProcessError::UnresolvedEmploymentStart {
                userid: self.record.userid.clone(),
            }
        })?;
        Ok(PerPersonalPayload {
            person_id_external: self.record.userid.clone(),
            start_date,
            first_name,
            last_name,
            middle_name: clean(&self.record.middle_name),
            preferred_name: clean(&self.record.preferred_name),
            gender: clean(&self.record.gender).unwrap_or_else(|| "M".to_string()),
        })
    }

    /// Builds the business phone payload, or nothing when the number cannot
    /// be read as an international number.
    pub fn build_phone(&self) -> Option<PerPhonePayload> {
        let raw = clean(&self.record.phone)?;
        let compact: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '/'))
            .collect();
        let digits = compact.strip_prefix('+')?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !(7..=15).contains(&digits.len()) {
            return None;
        }
        Some(PerPhonePayload {
            person_id_external: self.record.userid.clone(),
            phone_type: PHONE_TYPE_BUSINESS.to_string(),
            phone_number: compact,
            country_iso: clean(&self.record.country_iso3),
            is_primary: true,
        })
    }

    pub fn build_email(&self, item: &EmailActionItem) -> EmailWrite {
        EmailWrite {
            action: item.action,
            payload: PerEmailPayload {
                person_id_external: self.record.userid.clone(),
                email_address: item.email.clone(),
                email_type: item.email_type,
                is_primary: item.is_primary,
                operation: match item.action {
                    EmailAction::Delete => Some(WriteOperation::Delete),
                    _ => None,
                },
            },
        }
    }
}
