use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

use crate::storage::UploadError;

/// Typed outcome of every workflow operation. The presentation layer decides
/// how each kind is rendered; the workflows never signal through redirects or
/// panics.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("authentication required")]
    Unauthorized,
    // "missing" and "not permitted" are deliberately indistinguishable so
    // existence of other users' records does not leak.
    #[error("not found")]
    NotFoundOrForbidden,
    #[error("an application for this role is already pending")]
    DuplicateApplication,
    #[error("this role is assigned by reviewers and cannot be applied for")]
    RestrictedRole,
    #[error("the role already has an active holder")]
    RoleAlreadyFilled,
    #[error("the role does not belong to this club")]
    InvalidRole,
    #[error("a role with this name already exists in the club")]
    DuplicateRole,
    #[error("the role is still held by active members")]
    RoleInUse,
    #[error("this role is protected and cannot be deleted")]
    ProtectedRole,
    #[error("the request has already been processed")]
    NotPending,
    #[error("enrollment is closed for this event")]
    EnrollmentClosed,
    #[error("the event has already taken place")]
    EventInPast,
    #[error("you are already enrolled in this event")]
    AlreadyEnrolled,
    #[error("the event has reached its participant limit")]
    CapacityReached,
    #[error("a reason is required when rejecting")]
    MissingReason,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("stored record is in an unknown state")]
    InvalidState,
    #[error("storage failure")]
    Storage(#[from] diesel::result::Error),
    #[error("failed to persist uploaded file")]
    Blob(#[from] std::io::Error),
}

pub enum AppError {
    InternalServerError(anyhow::Error),
    ResponseStatusError(StatusCode, Cow<'static, str>),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct AppErrorResponse {
            status: u16,
            message: Cow<'static, str>,
        }

        match self {
            AppError::InternalServerError(err) => {
                tracing::error!(error = %err, "internal server error");
                AppError::from(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .into_response()
            }
            AppError::ResponseStatusError(code, s) => (
                code,
                Json(AppErrorResponse {
                    status: code.as_u16(),
                    message: s,
                }),
            )
                .into_response(),
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> AppError {
        AppError::InternalServerError(e.into())
    }
}

impl AppError {
    pub fn from(code: StatusCode, s: impl Into<Cow<'static, str>>) -> AppError {
        AppError::ResponseStatusError(code, s.into())
    }

    /// Maps each workflow error kind onto an HTTP status and its short
    /// user-facing message. Storage failures stay opaque.
    pub fn workflow(e: WorkflowError) -> AppError {
        use WorkflowError::*;

        let code = match &e {
            Unauthorized => StatusCode::UNAUTHORIZED,
            NotFoundOrForbidden => StatusCode::NOT_FOUND,
            DuplicateApplication | DuplicateRole | AlreadyEnrolled | RoleAlreadyFilled
            | NotPending => StatusCode::CONFLICT,
            RestrictedRole | RoleInUse | ProtectedRole => StatusCode::FORBIDDEN,
            InvalidRole | EnrollmentClosed | EventInPast | CapacityReached | MissingReason => {
                StatusCode::BAD_REQUEST
            }
            Upload(UploadError::TooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            Upload(UploadError::DisallowedType) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            InvalidState => return AppError::InternalServerError(e.into()),
            Storage(_) | Blob(_) => return AppError::InternalServerError(e.into()),
        };
        AppError::ResponseStatusError(code, e.to_string().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: WorkflowError) -> Option<StatusCode> {
        match AppError::workflow(e) {
            AppError::ResponseStatusError(code, _) => Some(code),
            AppError::InternalServerError(_) => None,
        }
    }

    #[test]
    fn workflow_errors_map_to_expected_statuses() {
        assert_eq!(
            status_of(WorkflowError::Unauthorized),
            Some(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            status_of(WorkflowError::NotFoundOrForbidden),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            status_of(WorkflowError::RoleAlreadyFilled),
            Some(StatusCode::CONFLICT)
        );
        assert_eq!(
            status_of(WorkflowError::MissingReason),
            Some(StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn storage_failures_stay_opaque() {
        assert_eq!(
            status_of(WorkflowError::Storage(diesel::result::Error::NotFound)),
            None
        );
    }
}
