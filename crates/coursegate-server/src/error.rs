//! Error type and axum `IntoResponse` implementation.
//!
//! Every error body has the shape `{"error": <reason code>, "message": ...}`
//! so clients can branch on the code.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error(transparent)]
  Core(#[from] coursegate_core::Error),
  #[error("internal error: {0}")]
  Internal(String),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    use coursegate_core::Error as Core;

    let message = self.to_string();
    match self {
      Error::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized", "message": message })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"coursegate\""),
        );
        res
      }
      Error::Core(Core::AccountNotFound(_) | Core::CheckoutNotFound(_)) => {
        body(StatusCode::NOT_FOUND, "not_found", message)
      }
      Error::BadRequest(_) => body(StatusCode::BAD_REQUEST, "bad_request", message),
      Error::Conflict(_) => body(StatusCode::CONFLICT, "conflict", message),
      Error::Core(Core::InvalidTransition { current, requested }) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
          "error":          "invalid_transition",
          "message":        message,
          "current_module": current,
          "requested":      requested,
        })),
      )
        .into_response(),
      Error::Core(Core::ModuleOutOfRange { module_count, requested, .. }) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
          "error":        "module_out_of_range",
          "message":      message,
          "module_count": module_count,
          "requested":    requested,
        })),
      )
        .into_response(),
      Error::Core(Core::Store(_)) | Error::Store(_) | Error::Internal(_) => {
        tracing::error!(error = %message, "request failed");
        body(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
      }
    }
  }
}

fn body(status: StatusCode, code: &str, message: String) -> Response {
  (status, Json(json!({ "error": code, "message": message }))).into_response()
}
