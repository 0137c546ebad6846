//! Response envelopes.
//!
//! Success: `{"data": {...}, "meta": {"timestamp": "<RFC 3339>"}}`.
//! Failure: `{"errors": [{"code": "...", "message": "..."}]}`.

use crate::Error;
use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    pub meta: Meta,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Meta {
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorItem {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorItem>,
}

/// An error ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new<M: Into<String>>(status: StatusCode, code: &'static str, message: M) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::AuthRequired(_) => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED"),
            Error::AuthDenied(_) => (StatusCode::FORBIDDEN, "AUTH_DENIED"),
            Error::Decryption(_) => (StatusCode::BAD_REQUEST, "MALFORMED_CREDENTIAL"),
            Error::InvalidUid(_) => (StatusCode::BAD_REQUEST, "INVALID_UID"),
            Error::InvalidOperation(_) => (StatusCode::BAD_REQUEST, "INVALID_OPERATION"),
            _ => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => format!("Something went wrong: {err}"),
            _ => err.to_string(),
        };
        Self::new(status, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            errors: vec![ErrorItem {
                code: self.code.to_string(),
                message: self.message,
            }],
        };
        (self.status, Json(body)).into_response()
    }
}

/// A JSON request body whose rejections use the error envelope.
pub struct JsonBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::new(
                rejection.status(),
                "INVALID_JSON",
                rejection.body_text(),
            )),
        }
    }
}
