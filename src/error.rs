use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

/// Typed failure returned by every attendance and leave operation.
///
/// `kind()` is the stable machine-readable tag sent to clients, the
/// `Display` text is the human-readable message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("evidence upload failed: {0}")]
    Upload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        AppError::PreconditionFailed(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::PreconditionFailed(_) => "precondition_failed",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Upload(_) => "upload_error",
            AppError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PreconditionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upload(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal failure");
                "Internal Server Error".to_string()
            }
            AppError::Upload(_) => "Evidence upload failed, please retry".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "kind": self.kind(),
            "message": message
        }))
    }
}

/// Failure surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate key")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be mapped back into a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AppError::conflict("Record already exists"),
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AppError::validation("x").kind(), "validation_error");
        assert_eq!(AppError::precondition("x").kind(), "precondition_failed");
        assert_eq!(AppError::conflict("x").kind(), "conflict");
        assert_eq!(AppError::not_found("x").kind(), "not_found");
        assert_eq!(AppError::Upload("x".into()).kind(), "upload_error");
        assert_eq!(AppError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn duplicate_maps_to_conflict() {
        let err: AppError = StoreError::Duplicate.into();
        assert!(matches!(err, AppError::Conflict(_)));

        let err: AppError = StoreError::Database(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[actix_web::test]
    async fn internal_detail_is_not_exposed() {
        let err = AppError::Internal("connection refused to 10.0.0.3".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["kind"], "internal");
        assert_eq!(value["message"], "Internal Server Error");
    }

    #[actix_web::test]
    async fn conflict_body_carries_message() {
        let err = AppError::conflict("Already checked in today");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["kind"], "conflict");
        assert_eq!(value["message"], "Already checked in today");
    }
}
