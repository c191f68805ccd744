//! Typed errors and HTTP mapping.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Fatal errors raised while preparing a schema or building the application.
/// These never surface at request time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown id type '{0}'")]
    UnknownIdType(String),
    #[error("primary key fields {fields:?} not a subset of table fields {available:?}")]
    PrimaryKeyNotSubset {
        fields: Vec<String>,
        available: Vec<String>,
    },
    #[error("composite primary key {0:?} not supported for id type biz_key")]
    CompositeKey(Vec<String>),
    #[error("id type biz_key requires an integer key field when create is exposed (field '{field}' is {ty})")]
    NonNumericKey { field: String, ty: String },
    #[error("id field name '{0}' conflicts with an existing field name")]
    IdFieldCollision(String),
    #[error("field names {sources:?} all normalize to '{normalized}'")]
    NameCollision {
        normalized: String,
        sources: Vec<String>,
    },
    #[error("unknown field '{field}' in {context}")]
    UnknownField { field: String, context: String },
    #[error("unsupported schema specification: {0}")]
    UnsupportedSchemaSpec(String),
    #[error("unsupported data file: {0}")]
    UnsupportedDataFile(String),
    #[error("found existing {0}, skipping init")]
    AlreadyInitialized(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Load(e.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Load(e.to_string())
    }
}

impl From<csv::Error> for ConfigError {
    fn from(e: csv::Error) -> Self {
        ConfigError::Load(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    /// Carries the challenge scheme only; the message never says which credential part failed.
    #[error("invalid credentials")]
    Unauthorized { scheme: &'static str },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Db(e) => match e {
                sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, "not_found"),
                sqlx::Error::Database(db) if db.is_unique_violation() => (StatusCode::CONFLICT, "conflict"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        match self {
            AppError::Unauthorized { scheme } => {
                (status, [(header::WWW_AUTHENTICATE, scheme)], Json(body)).into_response()
            }
            _ => (status, Json(body)).into_response(),
        }
    }
}
