//! Identity: HTTP Basic credentials checked against account password hashes,
//! plus the shared token guarding the payment-provider endpoint.
//!
//! The username part of the Basic credentials is the account email.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use coursegate_core::{account::Account, store::CourseStore};
use rand_core::OsRng;

use crate::{AppState, ServerConfig, error::Error};

/// The authenticated account. Present in a handler means the request carried
/// valid credentials.
#[derive(Debug, Clone)]
pub struct Identity {
  pub account: Account,
}

/// Produce an argon2 PHC string for `password`. Runs on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, Error> {
  tokio::task::spawn_blocking(move || {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map(|hash| hash.to_string())
      .map_err(|e| Error::Internal(format!("argon2 error: {e}")))
  })
  .await
  .map_err(|e| Error::Internal(e.to_string()))?
}

async fn verify_password(password: String, phc: String) -> Result<(), Error> {
  tokio::task::spawn_blocking(move || {
    let parsed = PasswordHash::new(&phc).map_err(|_| Error::Unauthorized)?;
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .map_err(|_| Error::Unauthorized)
  })
  .await
  .map_err(|e| Error::Internal(e.to_string()))?
}

/// Split a `Basic` authorization header into `(email, password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), Error> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = String::from_utf8(decoded).map_err(|_| Error::Unauthorized)?;

  let (email, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;
  Ok((email.to_owned(), password.to_owned()))
}

/// Resolve the account behind the request's credentials.
pub async fn authenticate<S: CourseStore>(
  headers: &HeaderMap,
  store: &S,
) -> Result<Account, Error> {
  let (email, password) = basic_credentials(headers)?;

  let account = store
    .find_account_by_email(&email)
    .await
    .map_err(Error::store)?
    .ok_or(Error::Unauthorized)?;

  verify_password(password, account.password_hash.clone()).await?;
  Ok(account)
}

/// Require `Authorization: Bearer <provider_token>` when a token is
/// configured.
pub fn check_provider_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), Error> {
  let Some(expected) = config.provider_token.as_deref() else {
    return Ok(());
  };

  let presented = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .ok_or(Error::Unauthorized)?;

  if presented != expected {
    return Err(Error::Unauthorized);
  }
  Ok(())
}

impl<S: CourseStore> FromRequestParts<AppState<S>> for Identity {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let account = authenticate(&parts.headers, state.store.as_ref()).await?;
    Ok(Identity { account })
  }
}
