use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Email classification in the target system. The numeric codes are the
/// target-side picklist ids and double as the wire value of `emailType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EmailType {
    Business,
    Private,
}

impl EmailType {
    pub fn code(&self) -> &'static str {
        match self {
            EmailType::Business => "18242",
            EmailType::Private => "18240",
        }
    }

    /// Resolves a raw change-feed type token. Numeric picklist ids are taken
    /// verbatim; free-text tokens containing "business" map to the business
    /// type, anything else to private.
    pub fn from_token(token: &str) -> EmailType {
        match token.trim() {
            "18242" => EmailType::Business,
            "18240" => EmailType::Private,
            other if other.to_lowercase().contains("business") => EmailType::Business,
            _ => EmailType::Private,
        }
    }
}

impl fmt::Display for EmailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single email mutation against the target mailbox set. Submission order
/// matters: primaries must be demoted before a new primary is promoted, and
/// type moves must happen before inserts reusing the freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EmailAction {
    Demote,
    Delete,
    UpdateType,
    Promote,
    Insert,
}

/// Fixed submission order for email actions within one batch.
pub const EMAIL_ACTION_ORDER: [EmailAction; 5] = [
    EmailAction::Demote,
    EmailAction::Delete,
    EmailAction::UpdateType,
    EmailAction::Promote,
    EmailAction::Insert,
];

impl EmailAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailAction::Demote => "DEMOTE",
            EmailAction::Delete => "DELETE",
            EmailAction::UpdateType => "UPDATE_TYPE",
            EmailAction::Promote => "PROMOTE",
            EmailAction::Insert => "INSERT",
        }
    }

    /// Rank within the fixed submission order, lowest first.
    pub fn submission_rank(&self) -> usize {
        match self {
            EmailAction::Demote => 0,
            EmailAction::Delete => 1,
            EmailAction::UpdateType => 2,
            EmailAction::Promote => 3,
            EmailAction::Insert => 4,
        }
    }
}

impl fmt::Display for EmailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown email action '{0}'")]
pub struct ParseEmailActionError(String);

impl std::str::FromStr for EmailAction {
    type Err = ParseEmailActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEMOTE" => Ok(EmailAction::Demote),
            "DELETE" => Ok(EmailAction::Delete),
            "UPDATE_TYPE" => Ok(EmailAction::UpdateType),
            "PROMOTE" => Ok(EmailAction::Promote),
            "INSERT" => Ok(EmailAction::Insert),
            other => Err(ParseEmailActionError(other.to_string())),
        }
    }
}

/// An email action requested by the change feed, before payload building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedEmailAction {
    pub action: EmailAction,
    pub email_type: EmailType,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_order_matches_ranks() {
        for (idx, action) in EMAIL_ACTION_ORDER.iter().enumerate() {
            assert_eq!(action.submission_rank(), idx);
        }
    }

    #[test]
    fn type_tokens_resolve_numeric_and_text() {
        assert_eq!(EmailType::from_token("18242"), EmailType::Business);
        assert_eq!(EmailType::from_token("18240"), EmailType::Private);
        assert_eq!(EmailType::from_token("Business Email"), EmailType::Business);
        assert_eq!(EmailType::from_token("home"), EmailType::Private);
    }

    #[test]
    fn action_parses_case_insensitively() {
        assert_eq!("update_type".parse::<EmailAction>().unwrap(), EmailAction::UpdateType);
        assert!("ARCHIVE".parse::<EmailAction>().is_err());
    }
}
