use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{country::CountryLookupError, repository::RepositoryError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    CountryNotFound,
    CountryServiceUnavailable,
    /// The record vanished between lookup and write
    InternalInconsistency,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::NotFound | Self::CountryNotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::CountryServiceUnavailable | Self::InternalInconsistency | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::CountryNotFound => "CountryNotFound",
            Self::CountryServiceUnavailable => "CountryServiceUnavailable",
            Self::InternalInconsistency => "InternalInconsistency",
            Self::Validation => "Validation",
            Self::Internal => "InternalServerError",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn inconsistency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalInconsistency, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<CountryLookupError> for ServiceError {
    fn from(err: CountryLookupError) -> Self {
        match err {
            CountryLookupError::NotFound(code) => {
                Self::new(ErrorKind::CountryNotFound, format!("Country not found: {code}"))
            }
            other => Self::new(
                ErrorKind::CountryServiceUnavailable,
                format!("Country service unavailable: {other}"),
            ),
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UniqueViolation(detail) => {
                Self::conflict(format!("Email already registered ({detail})"))
            }
            other => Self::internal(format!("storage failure: {other}")),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if self.kind.status_code().is_server_error() {
            tracing::error!(kind = self.kind.as_str(), "request failed: {}", self.message);
        }
        let body = ErrorBody { error: self.kind.as_str().to_string(), message: self.message };
        (self.kind.status_code(), Json(body)).into_response()
    }
}
