//! Handlers for `/purchases` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/purchases` | The caller's purchases |
//! | `POST` | `/purchases/link` | Optional `?checkout_session_id=`; 404 if the id is unknown |

use axum::{
  Json,
  extract::{Query, State},
};
use coursegate_core::{checkout::PurchaseRecord, store::CourseStore};
use serde::Deserialize;

use crate::{AppState, auth::Identity, error::Error, handlers::LinkResponse};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /purchases`
pub async fn list<S: CourseStore>(
  State(state): State<AppState<S>>,
  Identity { account }: Identity,
) -> Result<Json<Vec<PurchaseRecord>>, Error> {
  let purchases = state
    .store
    .list_purchases(account.account_id)
    .await
    .map_err(Error::store)?;
  Ok(Json(purchases))
}

// ─── Claim ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LinkParams {
  pub checkout_session_id: Option<String>,
}

/// `POST /purchases/link[?checkout_session_id=<id>]`
pub async fn link<S: CourseStore>(
  State(state): State<AppState<S>>,
  Identity { account }: Identity,
  Query(params): Query<LinkParams>,
) -> Result<Json<LinkResponse>, Error> {
  let claim = match params.checkout_session_id.as_deref() {
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

  let mut response = LinkResponse::new(report);
  if let Some(claim) = claim {
    response = response.with_claim(claim);
  }
  Ok(Json(response))
}
