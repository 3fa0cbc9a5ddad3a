//! HTTP error mapping and response envelopes.
//!
//! Single resources and collections are wrapped in `{"data": ...}`;
//! paginated collections add a `meta` object. Validation failures carry
//! field-level messages under `errors`, the shape the form UI consumes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use openlims_report::ReportError;
use openlims_storage::{Page, StorageError};

/// Field-level validation messages, accumulated across a whole payload so
/// the client sees every problem at once.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Finishes a validation pass: `Err(ApiError::Validation)` when anything
    /// was recorded.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }

    /// A one-field validation failure.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> ApiError {
        let mut errors = Self::new();
        errors.add(field, message);
        ApiError::Validation(errors)
    }
}

#[derive(Debug)]
pub enum ApiError {
    /// 422 with field-level messages.
    Validation(ValidationErrors),
    /// 422 with a single message (state machine, enum, referential rules).
    Unprocessable(String),
    /// 400: missing or malformed request input outside a validated payload.
    BadRequest(String),
    /// 404.
    NotFound(String),
    /// 409: uniqueness collision or guarded removal.
    Conflict {
        message: String,
        blocking_test_ids: Option<Vec<String>>,
    },
    /// 500; details go to the log, not the client.
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            blocking_test_ids: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound(err.to_string()),
            StorageError::AlreadyExists { .. } => Self::Conflict {
                message: err.to_string(),
                blocking_test_ids: None,
            },
            StorageError::Validation { message } => Self::Unprocessable(message),
            StorageError::WouldDiscardResults { ref test_ids, .. } => Self::Conflict {
                message: err.to_string(),
                blocking_test_ids: Some(test_ids.clone()),
            },
            StorageError::Internal { message } => Self::Internal(message),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::SampleNotFound(_) => Self::NotFound(err.to_string()),
            ReportError::Storage(inner) => inner.into(),
            ReportError::Render(message) => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "message": "The given data was invalid.",
                    "errors": errors.errors,
                }),
            ),
            Self::Unprocessable(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "message": message }))
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "message": message })),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "message": message })),
            Self::Conflict {
                message,
                blocking_test_ids,
            } => {
                let mut body = json!({ "message": message });
                if let Some(ids) = blocking_test_ids {
                    body["blocking_test_ids"] = json!(ids);
                }
                (StatusCode::CONFLICT, body)
            }
            Self::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Wraps a resource in the `{"data": ...}` envelope.
pub fn data<T: Serialize>(value: T) -> Json<Value> {
    Json(json!({ "data": value }))
}

/// Wraps a page of resources in the envelope plus pagination metadata.
pub fn paginated<T: Serialize>(page: &Page<T>) -> Json<Value> {
    Json(json!({
        "data": page.items,
        "meta": {
            "current_page": page.page,
            "per_page": page.per_page,
            "total": page.total,
            "last_page": page.last_page(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_accumulate() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());
        errors.add("name", "The name field is required.");
        errors.add("name", "The name may not be greater than 255 characters.");
        errors.add("age", "The age must be between 0 and 150.");

        assert!(!errors.is_empty());
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_empty_validation_passes() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: ApiError = StorageError::not_found("Sample", "ACC001").into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = StorageError::already_exists("Test", "CBC").into();
        assert!(matches!(err, ApiError::Conflict { .. }));

        let err: ApiError = StorageError::validation("bad transition").into();
        assert!(matches!(err, ApiError::Unprocessable(_)));

        let err: ApiError =
            StorageError::would_discard_results("s1", vec!["t1".into()]).into();
        match err {
            ApiError::Conflict {
                blocking_test_ids, ..
            } => assert_eq!(blocking_test_ids, Some(vec!["t1".to_string()])),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn test_paginated_meta_shape() {
        use openlims_storage::ListParams;

        let params = ListParams::new(2, 5);
        let page = Page::new(vec![1, 2, 3, 4, 5], 12, &params);
        let Json(body) = paginated(&page);

        assert_eq!(body["meta"]["current_page"], 2);
        assert_eq!(body["meta"]["per_page"], 5);
        assert_eq!(body["meta"]["total"], 12);
        assert_eq!(body["meta"]["last_page"], 3);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }
}
