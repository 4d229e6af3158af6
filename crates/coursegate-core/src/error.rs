//! Error types for `coursegate-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// The requested module is not the one directly after the current one.
  #[error("cannot move from module {current} to module {requested}")]
  InvalidTransition { current: u32, requested: u32 },

  /// The requested module lies past the product's completion sentinel.
  #[error("module {requested} is out of range for {product_key:?} ({module_count} modules)")]
  ModuleOutOfRange {
    product_key:  String,
    requested:    u32,
    module_count: u32,
  },

  #[error("account not found: {0}")]
  AccountNotFound(Uuid),

  #[error("checkout not found: {0}")]
  CheckoutNotFound(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error. Usable directly as a `map_err` argument.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
