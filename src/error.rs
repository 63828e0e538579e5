use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use log::error;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the road state API, rendered as `{"detail": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(e) = self {
            error!("Request failed: {:#}", e);
        }
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Unprocessable("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(anyhow!("db down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
