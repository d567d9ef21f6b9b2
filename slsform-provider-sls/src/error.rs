//! Log service errors
//!
//! The service reports failures as a machine-readable error code plus a
//! human-readable message. Handlers classify errors by code only.

use serde::{Deserialize, Serialize};
use slsform_core::provider::{ErrorKind, ProviderError};

/// Error returned by the log service API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct SlsError {
    /// Error code (e.g., "MachineGroupNotExist")
    #[serde(rename = "errorCode")]
    pub code: String,
    #[serde(rename = "errorMessage")]
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub http_status: Option<u16>,
}

/// Classification of a [`SlsError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlsErrorKind {
    NotFound,
    AlreadyExists,
    Throttled,
    Timeout,
    ServerBusy,
    Conflict,
    QuotaExceeded,
    InvalidParameter,
    Other,
}

const NOT_FOUND_CODES: &[&str] = &[
    "ProjectNotExist",
    "LogStoreNotExist",
    "MachineGroupNotExist",
    "ConfigNotExist",
    "DashboardNotExist",
    "PolicyNotExist",
    "ResourceNotExist",
];

const ALREADY_EXISTS_CODES: &[&str] = &[
    "ProjectAlreadyExist",
    "LogStoreAlreadyExist",
    "MachineGroupAlreadyExist",
    "ConfigAlreadyExist",
    "DashboardAlreadyExist",
];

const THROTTLED_CODES: &[&str] = &[
    "Throttling",
    "ExceedQPSLimit",
    "WriteQuotaExceed",
    "ReadQuotaExceed",
];

const TIMEOUT_CODES: &[&str] = &["RequestTimeout", "RequestTimeExpired", "Timeout"];

const SERVER_BUSY_CODES: &[&str] = &["InternalServerError", "ServerBusy", "ServiceUnavailable"];

const CONFLICT_CODES: &[&str] = &["OperationConflict", "ConcurrentUpdate", "ResourceInUse"];

const QUOTA_CODES: &[&str] = &["QuotaExceed", "ProjectQuotaExceed", "ExceedQuota"];

const INVALID_PARAMETER_CODES: &[&str] = &[
    "ParameterInvalid",
    "InvalidParameter",
    "PostBodyInvalid",
    "MissingParameter",
];

impl SlsError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
            http_status: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn kind(&self) -> SlsErrorKind {
        let code = self.code.as_str();
        if NOT_FOUND_CODES.contains(&code) {
            SlsErrorKind::NotFound
        } else if ALREADY_EXISTS_CODES.contains(&code) {
            SlsErrorKind::AlreadyExists
        } else if THROTTLED_CODES.contains(&code) {
            SlsErrorKind::Throttled
        } else if TIMEOUT_CODES.contains(&code) {
            SlsErrorKind::Timeout
        } else if SERVER_BUSY_CODES.contains(&code) {
            SlsErrorKind::ServerBusy
        } else if CONFLICT_CODES.contains(&code) {
            SlsErrorKind::Conflict
        } else if QUOTA_CODES.contains(&code) {
            SlsErrorKind::QuotaExceeded
        } else if INVALID_PARAMETER_CODES.contains(&code) {
            SlsErrorKind::InvalidParameter
        } else {
            match self.http_status {
                Some(404) => SlsErrorKind::NotFound,
                Some(409) => SlsErrorKind::Conflict,
                Some(429) => SlsErrorKind::Throttled,
                Some(500 | 502 | 503) => SlsErrorKind::ServerBusy,
                Some(504) => SlsErrorKind::Timeout,
                _ => SlsErrorKind::Other,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == SlsErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == SlsErrorKind::AlreadyExists
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            SlsErrorKind::Throttled | SlsErrorKind::Timeout | SlsErrorKind::ServerBusy
        )
    }
}

impl From<SlsError> for ProviderError {
    fn from(err: SlsError) -> Self {
        let kind = match err.kind() {
            SlsErrorKind::NotFound => ErrorKind::NotFound,
            SlsErrorKind::Throttled | SlsErrorKind::Timeout | SlsErrorKind::ServerBusy => {
                ErrorKind::Transient
            }
            SlsErrorKind::InvalidParameter => ErrorKind::Validation,
            _ => ErrorKind::Remote,
        };
        let message = match &err.request_id {
            Some(request_id) => format!("{} (request id: {})", err, request_id),
            None => err.to_string(),
        };
        ProviderError::with_kind(kind, message).with_cause(err)
    }
}

pub type SlsResult<T> = Result<T, SlsError>;
