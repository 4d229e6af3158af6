//! `GET /products`: the configured catalog, keyed by product.

use axum::{Json, extract::State};
use coursegate_core::{catalog::Product, store::CourseStore};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProductView {
  pub product_key: String,
  #[serde(flatten)]
  pub product:     Product,
}

/// `GET /products`
pub async fn list<S: CourseStore>(State(state): State<AppState<S>>) -> Json<Vec<ProductView>> {
  let products = state
    .catalog
    .iter()
    .map(|(key, product)| ProductView {
      product_key: key.to_owned(),
      product:     product.clone(),
    })
    .collect();
  Json(products)
}
