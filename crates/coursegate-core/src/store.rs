//! Store traits for progress, checkouts, purchases and accounts.
//!
//! Implemented by storage backends (e.g. `coursegate-store-sqlite`). The
//! engines in this crate and the HTTP layer depend on these traits, not on a
//! concrete backend.
//!
//! Every write that can race is expressed as a single conditional operation:
//! the backend must apply it atomically and report whether it took effect.
//! Callers never implement check-then-act on top of plain reads.
//!
//! All methods return `Send` futures so the traits can be used from a
//! multi-threaded runtime.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  account::Account,
  checkout::{CheckoutRecord, LinkAttempt, NewCheckout, PurchaseRecord},
  progress::ProgressRecord,
};

// ─── Progress ────────────────────────────────────────────────────────────────

pub trait ProgressStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return the record for the pair, inserting one at module 1 with
  /// `created_at = last_completed_at = now` if none exists. Concurrent callers
  /// all observe the same row.
  fn ensure_progress<'a>(
    &'a self,
    account_id: Uuid,
    product_key: &'a str,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<ProgressRecord, Self::Error>> + Send + 'a;

  /// Plain read; never creates.
  fn get_progress<'a>(
    &'a self,
    account_id: Uuid,
    product_key: &'a str,
  ) -> impl Future<Output = Result<Option<ProgressRecord>, Self::Error>> + Send + 'a;

  /// Move `expected_module → expected_module + 1` and stamp `completed_at`,
  /// only if the stored module still equals `expected_module`.
  ///
  /// Returns the updated record, or `None` if the condition did not hold.
  fn compare_and_advance<'a>(
    &'a self,
    account_id: Uuid,
    product_key: &'a str,
    expected_module: u32,
    completed_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<ProgressRecord>, Self::Error>> + Send + 'a;

  /// Every product the account has started.
  fn list_progress(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ProgressRecord>, Self::Error>> + Send + '_;
}

// ─── Checkouts ───────────────────────────────────────────────────────────────

pub trait CheckoutStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new, unlinked checkout. Re-delivering a provider-issued id
  /// returns the stored checkout unchanged.
  fn create_checkout(
    &self,
    input: NewCheckout,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<CheckoutRecord, Self::Error>> + Send + '_;

  fn get_checkout<'a>(
    &'a self,
    checkout_session_id: &'a str,
  ) -> impl Future<Output = Result<Option<CheckoutRecord>, Self::Error>> + Send + 'a;

  /// Unlinked checkouts whose (normalised) email equals `email`.
  fn unlinked_checkouts_for_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Vec<CheckoutRecord>, Self::Error>> + Send + 'a;

  /// Set the checkout's account only if it has none. First writer wins.
  fn link_checkout<'a>(
    &'a self,
    checkout_session_id: &'a str,
    account_id: Uuid,
  ) -> impl Future<Output = Result<LinkAttempt, Self::Error>> + Send + 'a;

  /// Checkouts linked to the account that have no purchase yet. Only
  /// non-empty after an interrupted reconciliation.
  fn linked_checkouts_without_purchase(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CheckoutRecord>, Self::Error>> + Send + '_;
}

// ─── Purchases ───────────────────────────────────────────────────────────────

pub trait PurchaseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert the purchase unless one already exists for its checkout.
  ///
  /// The insert only takes effect if the checkout is linked to
  /// `purchase.account_id`. Returns `true` if a row was written.
  fn insert_purchase_if_absent(
    &self,
    purchase: PurchaseRecord,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn purchase_for_checkout<'a>(
    &'a self,
    checkout_session_id: &'a str,
  ) -> impl Future<Output = Result<Option<PurchaseRecord>, Self::Error>> + Send + 'a;

  fn list_purchases(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PurchaseRecord>, Self::Error>> + Send + '_;
}

// ─── Accounts ────────────────────────────────────────────────────────────────

pub trait AccountStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create an account. Returns `None` if the (normalised) email is taken.
  fn create_account<'a>(
    &'a self,
    email: &'a str,
    password_hash: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  fn get_account(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  fn find_account_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// A backend that provides every store. Blanket-implemented.
pub trait CourseStore:
  ProgressStore + CheckoutStore + PurchaseStore + AccountStore + Clone + 'static
{
}

impl<T> CourseStore for T where
  T: ProgressStore + CheckoutStore + PurchaseStore + AccountStore + Clone + 'static
{
}
