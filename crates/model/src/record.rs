use crate::contact::{EmailAction, EmailType, RequestedEmailAction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder tokens the source system writes into reference fields when no
/// real target exists. Compared case-insensitively.
const REFERENCE_SENTINELS: [&str; 6] = ["", "none", "nan", "n/a", "no_manager", "no_hr"];

fn filter_sentinel(value: Option<&str>) -> Option<&str> {
    let trimmed = value?.trim();
    let lowered = trimmed.to_lowercase();
    if REFERENCE_SENTINELS.contains(&lowered.as_str()) {
        None
    } else {
        Some(trimmed)
    }
}

/// One employee row from the source system, normalized upstream: dates are
/// parsed, user ids are lowercase and the ISO-3166 numeric country code is
/// already resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub userid: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub preferred_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_of_employment: Option<NaiveDate>,
    #[serde(default)]
    pub date_of_position: Option<NaiveDate>,
    #[serde(default)]
    pub leaving_date: Option<NaiveDate>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub cost_center: Option<String>,
    #[serde(default)]
    pub jobcode: Option<String>,
    #[serde(default)]
    pub address_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country_iso3: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub matrix_manager: Option<String>,
    #[serde(default)]
    pub hr: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub private_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role_code: Option<String>,
    #[serde(default)]
    pub is_scm: bool,
    #[serde(default)]
    pub is_im: bool,
}

impl EmployeeRecord {
    /// Line-manager reference, with placeholder tokens filtered out.
    pub fn manager(&self) -> Option<&str> {
        filter_sentinel(self.manager.as_deref())
    }

    /// Matrix-manager reference, with placeholder tokens filtered out.
    pub fn matrix_manager(&self) -> Option<&str> {
        filter_sentinel(self.matrix_manager.as_deref())
    }

    /// HR-manager reference, with placeholder tokens filtered out.
    pub fn hr(&self) -> Option<&str> {
        filter_sentinel(self.hr.as_deref())
    }

    /// Effective first day of employment: explicit start, falling back to the
    /// hire date and finally to the position assignment date.
    pub fn employment_start(&self) -> Option<NaiveDate> {
        self.start_of_employment
            .or(self.hire_date)
            .or(self.date_of_position)
    }

    /// True when the value is absent or a placeholder token.
    pub fn is_reference_sentinel(value: &str) -> bool {
        filter_sentinel(Some(value)).is_none()
    }
}

/// One changed field for one employee, as delivered by the comparison feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub userid: String,
    pub field_name: String,
    #[serde(default)]
    pub source_value: Option<String>,
    #[serde(default)]
    pub target_value: Option<String>,
    #[serde(default)]
    pub is_scm: bool,
    #[serde(default)]
    pub is_im: bool,
}

/// Interpreted form of [`FieldChange::field_name`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangedField<'a> {
    /// A plain dirty field, routed through the per-mode dirty-field table.
    Plain(&'a str),
    /// A structured email instruction of the form `email::<action>::<type>`.
    Email(RequestedEmailAction),
}

impl FieldChange {
    pub fn interpret(&self) -> ChangedField<'_> {
        let mut parts = self.field_name.splitn(3, "::");
        let head = parts.next().unwrap_or_default();
        if head == "email" {
            if let (Some(action), Some(type_token)) = (parts.next(), parts.next()) {
                if let Ok(action) = action.parse::<EmailAction>() {
                    let email = self
                        .source_value
                        .clone()
                        .filter(|v| !v.trim().is_empty())
                        .or_else(|| self.target_value.clone())
                        .map(|v| v.trim().to_lowercase());
                    return ChangedField::Email(RequestedEmailAction {
                        action,
                        email_type: EmailType::from_token(type_token),
                        email,
                    });
                }
            }
        }
        ChangedField::Plain(&self.field_name)
    }
}
