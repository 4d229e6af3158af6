//! Axum handlers, one module per resource.
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | `POST` | `/accounts` | none |
//! | `POST` | `/session` | Basic |
//! | `GET`  | `/products` | none |
//! | `POST` | `/checkouts` | Bearer provider token, if configured |
//! | `GET`  | `/purchases` | Basic |
//! | `POST` | `/purchases/link` | Basic |
//! | `GET`  | `/progress` | Basic |
//! | `GET`  | `/progress/{product_key}` | Basic |
//! | `POST` | `/progress/{product_key}/advance` | Basic |

pub mod accounts;
pub mod checkouts;
pub mod products;
pub mod progress;
pub mod purchases;

use coursegate_core::{
  account::Account,
  checkout::{ClaimOutcome, LinkReport},
};
use serde::Serialize;

/// Response of every endpoint that runs reconciliation.
#[derive(Debug, Serialize)]
pub struct LinkResponse {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub account:         Option<Account>,
  pub linked_count:    usize,
  pub repaired_count:  usize,
  /// Only present when a specific checkout was named.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub checkout_linked: Option<bool>,
}

impl LinkResponse {
  pub fn new(report: LinkReport) -> Self {
    Self {
      account:         None,
      linked_count:    report.linked_count,
      repaired_count:  report.repaired_count,
      checkout_linked: None,
    }
  }

  pub fn with_account(mut self, account: Account) -> Self {
    self.account = Some(account);
    self
  }

  /// Fold in the claim of a named checkout. A checkout this call linked
  /// counts towards `linked_count`.
  pub fn with_claim(mut self, claim: ClaimOutcome) -> Self {
    if claim.is_new_link() {
      self.linked_count += 1;
    }
    self.checkout_linked = Some(claim.is_owned());
    self
  }
}
