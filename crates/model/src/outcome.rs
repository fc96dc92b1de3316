use serde::{Deserialize, Serialize};

/// Per-record result status as reported by the target upsert endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertStatus {
    Success,
    Warning,
    Failed,
}

/// Coarse failure classification derived from the HTTP status code, used to
/// decide whether a retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertErrorKind {
    /// 4xx other than 429: the payload itself is bad, retrying is pointless.
    ClientError,
    /// 5xx: transient target-side failure.
    ServerError,
    /// 429: back off and retry later.
    RateLimited,
}

impl UpsertErrorKind {
    pub fn from_http_code(code: u16) -> Option<UpsertErrorKind> {
        match code {
            429 => Some(UpsertErrorKind::RateLimited),
            400..=499 => Some(UpsertErrorKind::ClientError),
            500..=599 => Some(UpsertErrorKind::ServerError),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, UpsertErrorKind::ClientError)
    }
}

/// Outcome of one record within a bulk upsert response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub status: UpsertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Target-side record key, e.g. `Position/code=1020001,Position/effectiveStartDate=...`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<UpsertErrorKind>,
}

impl UpsertOutcome {
    pub fn success(key: impl Into<Option<String>>) -> UpsertOutcome {
        UpsertOutcome {
            status: UpsertStatus::Success,
            message: None,
            key: key.into(),
            http_code: None,
            error_kind: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> UpsertOutcome {
        UpsertOutcome {
            status: UpsertStatus::Warning,
            message: Some(message.into()),
            key: None,
            http_code: None,
            error_kind: None,
        }
    }

    pub fn failed(message: impl Into<String>, http_code: u16) -> UpsertOutcome {
        UpsertOutcome {
            status: UpsertStatus::Failed,
            message: Some(message.into()),
            key: None,
            http_code: Some(http_code),
            error_kind: UpsertErrorKind::from_http_code(http_code),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == UpsertStatus::Failed
    }
}

/// Extracts the position code from a composite record key of the form
/// `Position/code=1020001,Position/effectiveStartDate=...`.
pub fn position_code_from_key(key: &str) -> Option<&str> {
    let (_, tail) = key.split_once("code=")?;
    let code = tail.split(',').next().unwrap_or(tail).trim();
    if code.is_empty() { None } else { Some(code) }
}
