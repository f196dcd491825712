//! Service-level error bridging storage failures into [`AppError`]

use axum::response::{IntoResponse, Response};
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Db(e) => {
                tracing::error!("Database error: {e}");
                AppError::new(ErrorCode::DatabaseError)
            }
            ServiceError::App(e) => e,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
