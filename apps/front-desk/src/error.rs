//! Erros da API e sua tradução para respostas HTTP

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clinic_queue::QueueError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Não autenticado: {0}")]
    Unauthorized(String),

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Requisição inválida: {0}")]
    Validation(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Queue(err) => match err {
                QueueError::NotFound(_) => StatusCode::NOT_FOUND,
                QueueError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                err if err.is_blocked_action() => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Falha interna");
            "Erro interno".to_string()
        } else {
            warn!(status = status.as_u16(), error = %self, "Requisição recusada");
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
