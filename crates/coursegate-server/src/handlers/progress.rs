//! Handlers for `/progress` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/progress` | Every product the caller has started |
//! | `GET`  | `/progress/{product_key}` | Starts the product at module 1 on first access |
//! | `POST` | `/progress/{product_key}/advance` | Body: `{"target_module":2}`; 429 while the cooldown runs |

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use coursegate_core::{
  catalog::Catalog,
  progress::{AdvanceOutcome, ProgressRecord, WaitTime},
  store::CourseStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, auth::Identity, error::Error};

/// A progress record decorated with the product's module count, when the
/// catalog knows it.
#[derive(Debug, Serialize)]
pub struct ProgressView {
  #[serde(flatten)]
  pub record:       ProgressRecord,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub module_count: Option<u32>,
}

impl ProgressView {
  fn new(record: ProgressRecord, catalog: &Catalog) -> Self {
    let module_count = catalog.module_count(&record.product_key);
    Self { record, module_count }
  }
}

// ─── Read ─────────────────────────────────────────────────────────────────────

/// `GET /progress`
pub async fn list<S: CourseStore>(
  State(state): State<AppState<S>>,
  Identity { account }: Identity,
) -> Result<Json<Vec<ProgressView>>, Error> {
  let records = state.progression.list_progress(account.account_id).await?;
  Ok(Json(
    records
      .into_iter()
      .map(|r| ProgressView::new(r, &state.catalog))
      .collect(),
  ))
}

/// `GET /progress/{product_key}`
pub async fn get_one<S: CourseStore>(
  State(state): State<AppState<S>>,
  Identity { account }: Identity,
  Path(product_key): Path<String>,
) -> Result<Json<ProgressView>, Error> {
  let record = state
    .progression
    .get_progress(account.account_id, &product_key)
    .await?;
  Ok(Json(ProgressView::new(record, &state.catalog)))
}

// ─── Advance ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AdvanceBody {
  pub target_module: u32,
}

/// `POST /progress/{product_key}/advance` with body `{"target_module":2}`
pub async fn advance<S: CourseStore>(
  State(state): State<AppState<S>>,
  Identity { account }: Identity,
  Path(product_key): Path<String>,
  Json(body): Json<AdvanceBody>,
) -> Result<Response, Error> {
  let outcome = state
    .progression
    .request_advance(account.account_id, &product_key, body.target_module)
    .await?;

  Ok(match outcome {
    AdvanceOutcome::Advanced(record) => {
      Json(ProgressView::new(record, &state.catalog)).into_response()
    }
    AdvanceOutcome::WaitRequired(wait) => wait_response(wait),
  })
}

fn wait_response(wait: WaitTime) -> Response {
  let mut res = (
    StatusCode::TOO_MANY_REQUESTS,
    Json(json!({
      "error":           "wait_not_elapsed",
      "message":         format!(
        "next module can be completed in {}h {}m",
        wait.hours_remaining, wait.minutes_remaining
      ),
      "hours":           wait.hours_remaining,
      "minutes":         wait.minutes_remaining,
      "total_minutes":   wait.total_minutes_remaining,
      "can_complete_at": wait.can_complete_at,
    })),
  )
    .into_response();

  let retry_after = (wait.total_minutes_remaining * 60).max(1);
  if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
    res.headers_mut().insert(header::RETRY_AFTER, value);
  }
  res
}
