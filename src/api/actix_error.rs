//! Actix Web error adapters for manager errors.
//!
//! Every error leaves the API as a JSON body
//! `{"error": ..., "code": ..., "kind": ...}` with a status derived from the
//! error variant. `kind` is [`Error::kind`], or `invalid_request` for
//! malformed requests, and lets clients tell apart errors sharing a status.

use crate::error::Error;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

fn error_body(status_code: StatusCode, kind: &str, message: String) -> HttpResponse {
    HttpResponse::build(status_code)
        .content_type("application/json")
        .json(json!({
            "error": message,
            "code": status_code.as_u16(),
            "kind": kind
        }))
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.kind(), self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::ServerNotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) | Error::Precondition(_) | Error::NotRunning(_) => {
                StatusCode::CONFLICT
            }
            Error::Launch(_) | Error::ConfigInvalid(_) | Error::ConfigParse(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Download(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors raised by the HTTP layer itself
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Manager(#[from] Error),
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let kind = match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Manager(e) => e.kind(),
        };
        error_body(self.status_code(), kind, self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Manager(e) => e.status_code(),
        }
    }
}
