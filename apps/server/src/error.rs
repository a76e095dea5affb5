use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, OriginalUri},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use rosterhub_core::{Error as CoreError, ErrorKind};

/// How a failed request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    NotFound,
    UpstreamUnavailable,
    BadRequest,
    RoutineDisconnect,
    Unexpected,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::BadRequest => "BAD_REQUEST",
            Self::RoutineDisconnect => "ROUTINE_DISCONNECT",
            Self::Unexpected => "UNEXPECTED_FAULT",
        }
    }
}

impl From<ErrorKind> for ApiErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::UpstreamUnavailable => Self::UpstreamUnavailable,
            ErrorKind::RoutineDisconnect => Self::RoutineDisconnect,
            ErrorKind::UnexpectedFault => Self::Unexpected,
        }
    }
}

/// Marks a route as long-lived streaming. Installed with
/// `axum::Extension(StreamingRoute)` on the route itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingRoute;

/// Where a request came from, captured for error reporting.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub path: String,
    pub streaming: bool,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map(|uri| uri.path().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        Ok(Self {
            path,
            streaming: parts.extensions.get::<StreamingRoute>().is_some(),
        })
    }
}

impl RequestContext {
    /// Attach this request's context to an error.
    pub fn fail(&self, err: impl Into<ApiError>) -> ApiError {
        let mut err = err.into();
        err.path = self.path.clone();
        err.streaming = self.streaming;
        err
    }

    /// Unwraps a JSON body, turning rejections into `BadRequest`.
    pub fn json<T>(&self, body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
        body.map(|Json(value)| value)
            .map_err(|rejection| self.fail(ApiError::bad_request(rejection.body_text())))
    }
}

#[derive(Error, Debug)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub path: String,
    pub streaming: bool,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: String::new(),
            streaming: false,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::BadRequest, message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::new(err.kind().into(), err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(ApiErrorKind::Unexpected, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    timestamp: DateTime<Utc>,
    error: &'static str,
    message: String,
    path: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.streaming || self.kind == ApiErrorKind::RoutineDisconnect {
            tracing::info!(path = %self.path, "Streaming connection ended: {}", self.message);
            return StatusCode::NO_CONTENT.into_response();
        }

        let status = match self.kind {
            ApiErrorKind::NotFound => StatusCode::NOT_FOUND,
            ApiErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorKind::RoutineDisconnect => StatusCode::NO_CONTENT,
            ApiErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match self.kind {
            ApiErrorKind::Unexpected => {
                tracing::error!(path = %self.path, "Unexpected fault: {}", self.message)
            }
            _ => tracing::warn!(path = %self.path, "{}: {}", self.kind.as_str(), self.message),
        }

        let body = Json(ErrorBody {
            success: false,
            timestamp: Utc::now(),
            error: self.kind.as_str(),
            message: self.message,
            path: self.path,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn at(kind: ApiErrorKind, streaming: bool) -> ApiError {
        let ctx = RequestContext {
            path: "/api/v1/cache/resolve".to_string(),
            streaming,
        };
        ctx.fail(ApiError::new(kind, "boom"))
    }

    #[tokio::test]
    async fn test_dispatch_table() {
        let cases = [
            (ApiErrorKind::NotFound, StatusCode::NOT_FOUND),
            (ApiErrorKind::UpstreamUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ApiErrorKind::BadRequest, StatusCode::BAD_REQUEST),
            (ApiErrorKind::Unexpected, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, status) in cases {
            let response = at(kind, false).into_response();
            assert_eq!(response.status(), status);

            let body = body_json(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], kind.as_str());
            assert_eq!(body["message"], "boom");
            assert_eq!(body["path"], "/api/v1/cache/resolve");
            assert!(body["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn test_routine_disconnect_is_no_content() {
        let response = at(ApiErrorKind::RoutineDisconnect, false).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_streaming_faults_are_never_5xx() {
        for kind in [ApiErrorKind::Unexpected, ApiErrorKind::UpstreamUnavailable] {
            let response = at(kind, true).into_response();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }
    }

    #[test]
    fn test_core_error_kind_mapping() {
        let err = ApiError::from(CoreError::NotFound("character:characters/zed".into()));
        assert_eq!(err.kind, ApiErrorKind::NotFound);

        let err = ApiError::from(CoreError::RoutineDisconnect("c-1".into()));
        assert_eq!(err.kind, ApiErrorKind::RoutineDisconnect);

        let err = ApiError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.kind, ApiErrorKind::Unexpected);
        assert_eq!(err.message, "disk on fire");
    }
}
