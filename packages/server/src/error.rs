use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::CatalogError;

/// Failures of the core video operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("persistence error: {0}")]
    Persistence(#[from] CatalogError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("no active storage account has at least {min_free_gb} GB free")]
    NoCapacityAvailable { min_free_gb: f64 },

    #[error(
        "file needs {file_gb:.3} GB but account '{account}' only has {available_gb:.3} GB free"
    )]
    InsufficientStorage {
        account: String,
        file_gb: f64,
        available_gb: f64,
    },

    #[error("file of {file_gb:.3} GB exceeds the per-file cap of {max_gb:.3} GB on account '{account}'")]
    FileTooLarge {
        account: String,
        file_gb: f64,
        max_gb: f64,
    },

    #[error("upload failed: {0}")]
    UploadFailed(#[source] StorageError),

    #[error("link resolution failed: {0}")]
    LinkResolutionFailed(#[source] StorageError),

    #[error("video already liked")]
    AlreadyLiked,

    #[error("video not liked")]
    NotLiked,

    #[error("{0}")]
    Validation(String),
}

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `PERMISSION_DENIED`, `NOT_FOUND`, `CONFLICT`,
    /// `NO_CAPACITY`, `INSUFFICIENT_STORAGE`, `FILE_TOO_LARGE`,
    /// `UPSTREAM_ERROR`, `INTERNAL_ERROR`.
    #[schema(example = "FILE_TOO_LARGE")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "file of 60.000 GB exceeds the per-file cap of 50.000 GB on account 'pcloud-1'")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    TokenMissing,
    TokenInvalid,
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    NoCapacity(String),
    InsufficientStorage(String),
    FileTooLarge(String),
    /// The storage provider failed. Detail is logged, not returned.
    Upstream(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Insufficient permissions".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::NoCapacity(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "NO_CAPACITY",
                    message: msg,
                },
            ),
            AppError::InsufficientStorage(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "INSUFFICIENT_STORAGE",
                    message: msg,
                },
            ),
            AppError::FileTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: "FILE_TOO_LARGE",
                    message: msg,
                },
            ),
            AppError::Upstream(detail) => {
                tracing::error!("Storage provider error: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody {
                        code: "UPSTREAM_ERROR",
                        message: "The storage provider could not complete the request".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Persistence(e) => AppError::Internal(e.to_string()),
            ServiceError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            ServiceError::NoCapacityAvailable { .. } => AppError::NoCapacity(message),
            ServiceError::InsufficientStorage { .. } => AppError::InsufficientStorage(message),
            ServiceError::FileTooLarge { .. } => AppError::FileTooLarge(message),
            ServiceError::UploadFailed(_) | ServiceError::LinkResolutionFailed(_) => {
                AppError::Upstream(message)
            }
            ServiceError::AlreadyLiked | ServiceError::NotLiked => AppError::Conflict(message),
            ServiceError::Validation(msg) => AppError::Validation(msg),
        }
    }
}
