//! Payment initiation. Called by the payment provider (or the storefront
//! acting for it) when a guest starts paying.

use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use coursegate_core::{checkout::NewCheckout, store::CourseStore};
use serde::Deserialize;
use tracing::info;

use crate::{AppState, auth::check_provider_token, error::Error};

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub email:               String,
  pub product_key:         String,
  pub amount_cents:        i64,
  pub currency:            Option<String>,
  pub description:         Option<String>,
  /// Provider-issued id. Generated when absent.
  pub checkout_session_id: Option<String>,
}

/// `POST /checkouts`
pub async fn create<S: CourseStore>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, Error> {
  check_provider_token(&headers, &state.config)?;

  let product = state
    .catalog
    .get(&body.product_key)
    .ok_or_else(|| Error::BadRequest(format!("unknown product {}", body.product_key)))?;
  if body.email.trim().is_empty() {
    return Err(Error::BadRequest("email is required".into()));
  }
  if body.amount_cents < 0 {
    return Err(Error::BadRequest("amount_cents must not be negative".into()));
  }

  let description = body
    .description
    .or_else(|| product.description.clone())
    .or_else(|| Some(product.title.clone()));

  let checkout = state
    .store
    .create_checkout(
      NewCheckout {
        checkout_session_id: body.checkout_session_id,
        email: body.email,
        product_key: body.product_key,
        amount_cents: body.amount_cents,
        currency: body.currency,
        description,
      },
      state.clock.now(),
    )
    .await
    .map_err(Error::store)?;

  info!(
    checkout = %checkout.checkout_session_id,
    product_key = %checkout.product_key,
    "checkout recorded"
  );
  Ok((StatusCode::CREATED, Json(checkout)))
}
