//! HTTP surface for Coursegate.
//!
//! Exposes an axum [`Router`] backed by any [`CourseStore`]: sign-up and
//! sign-in, the payment-provider checkout hook, purchase claiming, and module
//! progression.

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use chrono::Duration;
use coursegate_core::{
  catalog::Catalog,
  clock::Clock,
  progression::{DEFAULT_WAIT_HOURS, ProgressionEngine},
  reconcile::Reconciler,
  store::CourseStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{accounts, checkouts, products, progress, purchases};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:           String,
  pub port:           u16,
  pub store_path:     PathBuf,
  pub progression:    ProgressionConfig,
  /// When set, `POST /checkouts` requires `Authorization: Bearer <token>`.
  pub provider_token: Option<String>,
  pub products:       Catalog,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:           "127.0.0.1".to_string(),
      port:           8080,
      store_path:     PathBuf::from("coursegate.db"),
      progression:    ProgressionConfig::default(),
      provider_token: None,
      products:       Catalog::default(),
    }
  }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProgressionConfig {
  /// Minimum time between two module completions.
  pub wait_hours: u32,
}

impl Default for ProgressionConfig {
  fn default() -> Self {
    Self { wait_hours: DEFAULT_WAIT_HOURS as u32 }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: CourseStore> {
  pub store:       Arc<S>,
  pub progression: Arc<ProgressionEngine<S>>,
  pub reconciler:  Arc<Reconciler<S>>,
  pub catalog:     Arc<Catalog>,
  pub config:      Arc<ServerConfig>,
  pub clock:       Arc<dyn Clock>,
}

impl<S: CourseStore> AppState<S> {
  /// Wire both engines to `store` and `clock`.
  pub fn new(store: Arc<S>, config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
    let catalog = Arc::new(config.products.clone());
    let wait_time = Duration::hours(i64::from(config.progression.wait_hours));

    let progression = ProgressionEngine::new(store.clone(), clock.clone(), catalog.clone())
      .with_wait_time(wait_time);
    let reconciler = Reconciler::new(store.clone(), clock.clone());

    Self {
      store,
      progression: Arc::new(progression),
      reconciler: Arc::new(reconciler),
      catalog,
      config: Arc::new(config),
      clock,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router<S: CourseStore>(state: AppState<S>) -> Router {
  Router::new()
    // Accounts
    .route("/accounts", post(accounts::sign_up::<S>))
    .route("/session", post(accounts::sign_in::<S>))
    // Catalog & payments
    .route("/products", get(products::list::<S>))
    .route("/checkouts", post(checkouts::create::<S>))
    // Purchases
    .route("/purchases", get(purchases::list::<S>))
    .route("/purchases/link", post(purchases::link::<S>))
    // Progression
    .route("/progress", get(progress::list::<S>))
    .route("/progress/{product_key}", get(progress::get_one::<S>))
    .route("/progress/{product_key}/advance", post(progress::advance::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
