use common::storage::StorageError;
use mq::MqError;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors returned by the grading services.
///
/// Every variant names the entity it concerns so callers can map it onto
/// their own transport without parsing messages.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("user {user_id} lacks permission in workspace {workspace_id}")]
    PermissionDenied { user_id: i32, workspace_id: i32 },

    #[error("assignment {assignment_id} has no testcase")]
    NoTestcase { assignment_id: i32 },

    #[error("blob store failure at {path}: {source}")]
    FileSystem {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to dispatch submission {submission_id}: {source}")]
    Dispatch {
        submission_id: i32,
        #[source]
        source: MqError,
    },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] DbErr),
}

impl AppError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::PermissionDenied { .. } => "PERMISSION_DENIED",
            AppError::NoTestcase { .. } => "NO_TESTCASE",
            AppError::FileSystem { .. } => "FILE_SYSTEM_ERROR",
            AppError::Dispatch { .. } => "DISPATCH_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: i32) -> Self {
        AppError::NotFound { entity, id }
    }
}

pub type AppResult<T> = Result<T, AppError>;
