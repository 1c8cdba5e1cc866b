// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::backend::UserAccount;

// ============================================================================
// Domain Errors
// ============================================================================

/// Failure kinds of the lifecycle operations. Every kind maps onto a GENI
/// result code; none of them aborts the handling of other requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmError {
    #[error("Slice already exists: {0}")]
    SliceAlreadyExists(String),

    #[error("Request descriptor could not be processed: {0}")]
    RequestParseFailed(String),

    #[error("Unknown slice: {0}")]
    UnknownSlice(String),

    #[error("Bad arguments: {0}")]
    BadArgs(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Backend failure: {0}")]
    BackendFailure(String),
}

impl AmError {
    /// Numeric GENI AM API result code
    pub fn code(&self) -> u32 {
        match self {
            Self::BadArgs(_) => 1,
            Self::RequestParseFailed(_) => 2,
            Self::Authorization(_) => 3,
            Self::BackendFailure(_) => 5,
            Self::UnknownSlice(_) => 12,
            Self::Unsupported(_) => 13,
            Self::SliceAlreadyExists(_) => 17,
        }
    }

    /// Short label used as the metrics outcome
    pub fn label(&self) -> &'static str {
        match self {
            Self::BadArgs(_) => "bad_args",
            Self::RequestParseFailed(_) => "request_parse_failed",
            Self::Authorization(_) => "authorization_error",
            Self::BackendFailure(_) => "backend_failure",
            Self::UnknownSlice(_) => "unknown_slice",
            Self::Unsupported(_) => "unsupported",
            Self::SliceAlreadyExists(_) => "slice_already_exists",
        }
    }
}

pub const SUCCESS_CODE: u32 = 0;

// ============================================================================
// Result Shape
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCode {
    pub geni_code: u32,
}

/// Structured result returned by every lifecycle operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub code: ResultCode,
    pub value: Option<T>,
    pub output: String,
}

impl<T> OperationResult<T> {
    pub fn success(value: T) -> Self {
        Self {
            code: ResultCode {
                geni_code: SUCCESS_CODE,
            },
            value: Some(value),
            output: String::new(),
        }
    }

    pub fn failure(error: &AmError) -> Self {
        Self {
            code: ResultCode {
                geni_code: error.code(),
            },
            value: None,
            output: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.geni_code == SUCCESS_CODE
    }
}

impl<T> From<Result<T, AmError>> for OperationResult<T> {
    fn from(result: Result<T, AmError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(error) => Self::failure(&error),
        }
    }
}

// ============================================================================
// Options
// ============================================================================

/// Recognized request options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmOptions {
    #[serde(default)]
    pub geni_best_effort: bool,
    #[serde(default)]
    pub geni_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub geni_users: Vec<UserAccount>,
    #[serde(default)]
    pub geni_slice_urn: Option<String>,
    #[serde(default)]
    pub geni_compressed: bool,
}

impl AmOptions {
    pub fn best_effort() -> Self {
        Self {
            geni_best_effort: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_code_and_output() {
        let result: OperationResult<()> =
            Err(AmError::UnknownSlice("urn:publicid:IDN+gcf+slice+s1".into())).into();
        assert_eq!(result.code.geni_code, 12);
        assert!(result.value.is_none());
        assert!(result.output.contains("s1"));
        assert!(!result.is_success());
    }

    #[test]
    fn test_success_shape() {
        let result: OperationResult<u32> = Ok(7).into();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["code"]["geni_code"], 0);
        assert_eq!(json["value"], 7);
        assert_eq!(json["output"], "");
    }

    #[test]
    fn test_options_default_when_absent() {
        let options: AmOptions = serde_json::from_str(r#"{"geni_best_effort": true}"#).unwrap();
        assert!(options.geni_best_effort);
        assert!(options.geni_end_time.is_none());
        assert!(options.geni_users.is_empty());
    }
}
