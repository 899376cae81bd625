//! HTTP-facing error type. Every handler failure ends up here and is
//! rendered as `{"error": "<message>"}` with a matching status code.

use thiserror::Error;
use tracing::warn;

use crate::ai::AiError;
use crate::backend::BackendError;
use crate::catalog::CatalogError;
use crate::crm::{RepositoryError, UploadError};
use crate::http::{Response, StatusCode};
use crate::llm::LlmError;
use crate::llm::decode::DecodeError;
use crate::recommender::UnknownTask;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    /// An upstream provider or the backend failed.
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BadRequest,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::Conflict(_) => StatusCode::Conflict,
            Self::PayloadTooLarge(_) => StatusCode::PayloadTooLarge,
            Self::UnsupportedMediaType(_) => StatusCode::UnsupportedMediaType,
            Self::BadGateway(_) => StatusCode::BadGateway,
            Self::ServiceUnavailable(_) => StatusCode::ServiceUnavailable,
            Self::Internal(_) => StatusCode::InternalServerError,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status();
        if status.as_u16() >= 500 {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        Response::json(status, &serde_json::json!({ "error": self.to_string() }))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(format!("Invalid JSON body: {e}"))
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotConfigured => Self::ServiceUnavailable(e.to_string()),
            BackendError::Http(_) | BackendError::Api { .. } => Self::BadGateway(e.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => Self::NotFound(e.to_string()),
            RepositoryError::Conflict(_) => Self::Conflict(e.to_string()),
            RepositoryError::InvalidPatch(_) => Self::BadRequest(e.to_string()),
            RepositoryError::Backend(e) => e.into(),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::UnsupportedType => Self::UnsupportedMediaType(e.to_string()),
            UploadError::TooLarge { .. } => Self::PayloadTooLarge(e.to_string()),
            UploadError::UnknownCustomer(_) => Self::NotFound(e.to_string()),
            UploadError::Storage(_) => Self::BadGateway(e.to_string()),
            UploadError::Repository(e) => e.into(),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::NotConfigured(_) | LlmError::UnknownProvider(_) => Self::BadRequest(e.to_string()),
            LlmError::Http(_) | LlmError::Api { .. } | LlmError::EmptyResponse(_) => Self::BadGateway(e.to_string()),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::UnknownModel(_) => Self::BadRequest(e.to_string()),
            CatalogError::Backend(e) => e.into(),
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(e: DecodeError) -> Self {
        Self::BadGateway(e.to_string())
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::InvalidRequest(message) => Self::BadRequest(message),
            AiError::Llm(e) => e.into(),
            AiError::Decode(e) => e.into(),
            AiError::Catalog(e) => e.into(),
        }
    }
}

impl From<UnknownTask> for ApiError {
    fn from(e: UnknownTask) -> Self {
        Self::BadRequest(e.to_string())
    }
}
