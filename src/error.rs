use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::error;

impl From<serde_json::Error> for ReportsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Database(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for ReportsError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict(format!("Duplicate record: {}", db_err.message()))
            }
            _ => Self::Database(format!("Database error: {}", err)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ReportsError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("Migration error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum ReportsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, ReportsError>;

impl ReportsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ReportsError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReportsError::Forbidden(_) => StatusCode::FORBIDDEN,
            ReportsError::NotFound(_) => StatusCode::NOT_FOUND,
            ReportsError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ReportsError::Conflict(_) => StatusCode::CONFLICT,
            ReportsError::Config(_)
            | ReportsError::Database(_)
            | ReportsError::Notification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReportsError::Config(_) => "config",
            ReportsError::Database(_) => "database",
            ReportsError::Validation(_) => "validation",
            ReportsError::Forbidden(_) => "forbidden",
            ReportsError::NotFound(_) => "not_found",
            ReportsError::Unauthorized(_) => "unauthorized",
            ReportsError::Conflict(_) => "conflict",
            ReportsError::Notification(_) => "notification",
        }
    }
}

impl IntoResponse for ReportsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = match &self {
            ReportsError::Validation(messages) => serde_json::json!({
                "error": self.kind(),
                "message": "Validation failed",
                "details": messages,
            }),
            // Internal details stay in the log.
            ReportsError::Database(_) | ReportsError::Config(_) | ReportsError::Notification(_) => {
                serde_json::json!({
                    "error": self.kind(),
                    "message": "Internal server error",
                })
            }
            other => serde_json::json!({
                "error": other.kind(),
                "message": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ReportsError::forbidden("nope").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ReportsError::not_found("submission 1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ReportsError::validation("bad").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ReportsError::Conflict("dup".to_string()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_message_joins_details() {
        let err = ReportsError::Validation(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "Validation failed: first; second");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ReportsError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ReportsError::NotFound(_)));
    }
}
