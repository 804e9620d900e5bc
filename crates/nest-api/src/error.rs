use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Field name to the messages explaining why it was rejected.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    /// Records `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok` if nothing was recorded.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(ValidationErrors),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        ApiError::Validation(errors)
    }

    pub fn login_required() -> Self {
        ApiError::Unauthenticated("You must be logged in.".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Best guess at which field a deserializer complaint is about. Handles
/// `missing field `x`` and the `x: ...` / `x.y: ...` path prefix.
fn field_of(detail: &str) -> Option<&str> {
    if let Some(rest) = detail.strip_prefix("missing field `") {
        return rest.split('`').next();
    }
    let (path, _) = detail.split_once(": ")?;
    let field = path.split(['.', '[']).next()?;
    let is_ident = !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_ident.then_some(field)
}

/// Turns an extractor rejection into a validation error keyed by the field
/// at fault, or by `fallback` when no field can be named.
fn rejected(fallback: &str, source: Option<&dyn std::error::Error>, body_text: String) -> ApiError {
    let mut detail = source.map(ToString::to_string).unwrap_or(body_text);
    if let Some(at) = detail.find(" at line ") {
        detail.truncate(at);
    }
    let field = field_of(&detail).unwrap_or(fallback).to_string();
    ApiError::invalid(&field, detail)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        use std::error::Error as _;
        rejected("body", rejection.source(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        use std::error::Error as _;
        rejected("query", rejection.source(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        use std::error::Error as _;
        rejected("path", rejection.source(), rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a ValidationErrors>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!("Request failed: {:#}", e);
        }

        let body = ErrorBody {
            message: self.to_string(),
            errors: match &self {
                ApiError::Validation(errors) => Some(errors),
                _ => None,
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(ApiError::invalid("email", "bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::login_required().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("no".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("gone".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(anyhow::anyhow!("disk on fire")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_errors_group_by_field() {
        let mut errors = ValidationErrors::new();
        errors.check(false, "price_pence", "Price must be greater than 0.");
        errors.check(true, "deposit_pence", "unused");
        errors.add("price_pence", "second");

        assert!(errors.contains("price_pence"));
        assert!(!errors.contains("deposit_pence"));
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["price_pence"].as_array().unwrap().len(), 2);
        assert!(ValidationErrors::new().finish().is_ok());
    }

    #[test]
    fn deserializer_messages_name_their_field() {
        assert_eq!(field_of("missing field `name`"), Some("name"));
        assert_eq!(field_of("room_type: unknown variant `castle`, expected one of `single`"), Some("room_type"));
        assert_eq!(field_of("report_ids[0]: UUID parsing failed"), Some("report_ids"));
        assert_eq!(field_of("UUID parsing failed: invalid character"), None);
        assert_eq!(field_of("expected value"), None);
    }
}
