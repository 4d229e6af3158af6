//! Handlers for `/accounts` and `/session`.
//!
//! Both run the email sweep so that guest purchases made before the account
//! existed (or since the last sign-in) show up immediately.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use coursegate_core::{Error as CoreError, account::normalize_email, store::CourseStore};
use serde::Deserialize;
use tracing::info;

use crate::{
  AppState,
  auth::{Identity, hash_password},
  error::Error,
  handlers::LinkResponse,
};

const MIN_PASSWORD_LEN: usize = 8;

// ─── Sign-up ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignUpBody {
  pub email:               String,
  pub password:            String,
  /// Checkout the visitor just paid for; linked regardless of its email.
  pub checkout_session_id: Option<String>,
}

/// `POST /accounts`
pub async fn sign_up<S: CourseStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<SignUpBody>,
) -> Result<impl IntoResponse, Error> {
  let email = normalize_email(&body.email);
  if email.is_empty() || !email.contains('@') {
    return Err(Error::BadRequest("a valid email is required".into()));
  }
  if body.password.chars().count() < MIN_PASSWORD_LEN {
    return Err(Error::BadRequest(format!(
      "password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }

  // An unknown checkout declines the whole sign-up before anything is
  // written.
  if let Some(id) = body.checkout_session_id.as_deref() {
    state
      .store
      .get_checkout(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| CoreError::CheckoutNotFound(id.to_owned()))?;
  }

  let password_hash = hash_password(body.password).await?;
  let account = state
    .store
    .create_account(&email, password_hash, state.clock.now())
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::Conflict(format!("an account for {email} already exists")))?;

  info!(account_id = %account.account_id, "account created");

  // The checkout exists, so the claim can only be refused because another
  // account owns it. That is reported, not failed.
  let claim = match body.checkout_session_id.as_deref() {
    Some(id) => Some(
      state
        .reconciler
        .claim_checkout(id, account.account_id)
        .await?,
    ),
    None => None,
  };

  let report = state
    .reconciler
    .link_account(account.account_id, &account.email)
    .await?;

  let mut response = LinkResponse::new(report).with_account(account);
  if let Some(claim) = claim {
    response = response.with_claim(claim);
  }
  Ok((StatusCode::CREATED, Json(response)))
}

// ─── Sign-in ──────────────────────────────────────────────────────────────────

/// `POST /session`
pub async fn sign_in<S: CourseStore>(
  State(state): State<AppState<S>>,
  Identity { account }: Identity,
) -> Result<Json<LinkResponse>, Error> {
  let report = state
    .reconciler
    .link_account(account.account_id, &account.email)
    .await?;
  Ok(Json(LinkResponse::new(report).with_account(account)))
}
