//! Checkouts and purchases.
//!
//! A checkout records a single payment event. It starts out unattached to any
//! account (guest checkout) and is linked to exactly one account exactly once.
//! Linking materialises a purchase: the durable entitlement record, one per
//! checkout.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::normalize_email;

/// Currency recorded when a payment event does not name one.
pub const DEFAULT_CURRENCY: &str = "usd";

// ─── Checkout ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRecord {
  /// Opaque id, issued by the payment provider or by [`new_session_id`].
  pub checkout_session_id: String,
  /// Buyer email, normalised.
  pub email:               String,
  pub product_key:         String,
  pub amount_cents:        i64,
  pub currency:            String,
  pub description:         Option<String>,
  /// Set once by reconciliation; never cleared or reassigned.
  pub account_id:          Option<Uuid>,
  pub created_at:          DateTime<Utc>,
}

impl CheckoutRecord {
  pub fn is_linked(&self) -> bool { self.account_id.is_some() }
}

/// Input to [`crate::store::CheckoutStore::create_checkout`].
#[derive(Debug, Clone)]
pub struct NewCheckout {
  /// Provider-issued id; a fresh one is generated when `None`.
  pub checkout_session_id: Option<String>,
  pub email:               String,
  pub product_key:         String,
  pub amount_cents:        i64,
  pub currency:            Option<String>,
  pub description:         Option<String>,
}

impl NewCheckout {
  /// Resolve defaults and normalise the email.
  pub fn into_record(self, created_at: DateTime<Utc>) -> CheckoutRecord {
    CheckoutRecord {
      checkout_session_id: self.checkout_session_id.unwrap_or_else(new_session_id),
      email: normalize_email(&self.email),
      product_key: self.product_key,
      amount_cents: self.amount_cents,
      currency: self
        .currency
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()),
      description: self.description,
      account_id: None,
      created_at,
    }
  }
}

/// A self-issued checkout id: `cs_` followed by 128 random bits in hex.
pub fn new_session_id() -> String {
  let mut bytes = [0u8; 16];
  OsRng.fill_bytes(&mut bytes);
  format!("cs_{}", hex::encode(bytes))
}

/// Result of a conditional "link if unlinked" write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAttempt {
  /// This call set the account; the record reflects the new state.
  Linked(CheckoutRecord),
  /// The checkout was already linked, possibly to another account.
  AlreadyLinked(CheckoutRecord),
  NotFound,
}

// ─── Purchase ────────────────────────────────────────────────────────────────

/// Entitlement created once a checkout is linked. One per checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
  pub purchase_id:         Uuid,
  pub account_id:          Uuid,
  pub checkout_session_id: String,
  pub product_key:         String,
  pub amount_cents:        i64,
  pub currency:            String,
  pub description:         Option<String>,
  /// The checkout's creation time, not the time this row was written.
  pub purchased_at:        DateTime<Utc>,
  pub recorded_at:         DateTime<Utc>,
}

impl PurchaseRecord {
  /// Denormalise a checkout into the purchase owned by `account_id`.
  pub fn from_checkout(
    checkout: &CheckoutRecord,
    account_id: Uuid,
    recorded_at: DateTime<Utc>,
  ) -> Self {
    Self {
      purchase_id: Uuid::new_v4(),
      account_id,
      checkout_session_id: checkout.checkout_session_id.clone(),
      product_key: checkout.product_key.clone(),
      amount_cents: checkout.amount_cents,
      currency: checkout.currency.clone(),
      description: checkout.description.clone(),
      purchased_at: checkout.created_at,
      recorded_at,
    }
  }
}

/// Result of claiming one named checkout for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
  /// This call linked it.
  Linked,
  /// It was already linked to the same account.
  AlreadyOwned,
  /// Another account owns it; nothing changed.
  OwnedElsewhere,
}

impl ClaimOutcome {
  pub fn is_owned(self) -> bool { !matches!(self, Self::OwnedElsewhere) }

  pub fn is_new_link(self) -> bool { matches!(self, Self::Linked) }
}

/// Aggregate result of an email sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
  /// Checkouts this call linked.
  pub linked_count:   usize,
  /// Checkouts that were already linked to the account but had no purchase.
  pub repaired_count: usize,
}
