//! The reconciliation engine: attaches guest checkouts to accounts and
//! materialises their purchases.
//!
//! Both entry points may run concurrently for the same checkout (sign-in,
//! sign-up and an explicit claim can all fire at once). Correctness rests on
//! two conditional writes provided by the store:
//!
//! - "link if unlinked" on the checkout, so exactly one account wins;
//! - "insert purchase if absent", keyed on the checkout, so at most one
//!   purchase ever exists.
//!
//! A crash between the two leaves a linked checkout without a purchase.
//! Re-running either entry point repairs it.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  account::{Account, normalize_email},
  checkout::{CheckoutRecord, ClaimOutcome, LinkAttempt, LinkReport, PurchaseRecord},
  clock::Clock,
  store::{AccountStore, CheckoutStore, PurchaseStore},
};

pub struct Reconciler<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S> Reconciler<S>
where
  S: AccountStore + CheckoutStore + PurchaseStore,
{
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self { Self { store, clock } }

  /// Link every unlinked checkout bought with `account_email` to the account.
  ///
  /// Checkouts claimed concurrently by another caller are skipped and not
  /// counted. Also creates missing purchases for checkouts already linked to
  /// this account.
  pub async fn link_account(
    &self,
    account_id: Uuid,
    account_email: &str,
  ) -> Result<LinkReport> {
    self.require_account(account_id).await?;

    let email = normalize_email(account_email);
    let candidates = self
      .store
      .unlinked_checkouts_for_email(&email)
      .await
      .map_err(Error::store)?;

    let mut report = LinkReport::default();

    for candidate in candidates {
      match self
        .store
        .link_checkout(&candidate.checkout_session_id, account_id)
        .await
        .map_err(Error::store)?
      {
        LinkAttempt::Linked(checkout) => {
          self.ensure_purchase(&checkout, account_id).await?;
          report.linked_count += 1;
        }
        LinkAttempt::AlreadyLinked(_) | LinkAttempt::NotFound => {
          debug!(
            checkout = %candidate.checkout_session_id,
            "checkout claimed concurrently; skipping"
          );
        }
      }
    }

    let orphans = self
      .store
      .linked_checkouts_without_purchase(account_id)
      .await
      .map_err(Error::store)?;
    for checkout in orphans {
      if self.ensure_purchase(&checkout, account_id).await? {
        report.repaired_count += 1;
      }
    }

    if report.linked_count > 0 || report.repaired_count > 0 {
      info!(
        %account_id,
        linked = report.linked_count,
        repaired = report.repaired_count,
        "linked checkouts to account"
      );
    }

    Ok(report)
  }

  /// Link one named checkout to the account, regardless of its email.
  ///
  /// Returns `true` if the checkout now belongs to the account (including
  /// when it already did), `false` if another account owns it.
  pub async fn link_specific_checkout(
    &self,
    checkout_session_id: &str,
    account_id: Uuid,
  ) -> Result<bool> {
    self
      .claim_checkout(checkout_session_id, account_id)
      .await
      .map(ClaimOutcome::is_owned)
  }

  /// As [`Self::link_specific_checkout`], but tells a fresh link apart from a
  /// checkout the account already owned.
  pub async fn claim_checkout(
    &self,
    checkout_session_id: &str,
    account_id: Uuid,
  ) -> Result<ClaimOutcome> {
    self.require_account(account_id).await?;

    let attempt = self
      .store
      .link_checkout(checkout_session_id, account_id)
      .await
      .map_err(Error::store)?;

    match attempt {
      LinkAttempt::NotFound => {
        Err(Error::CheckoutNotFound(checkout_session_id.to_owned()))
      }
      LinkAttempt::Linked(checkout) => {
        self.ensure_purchase(&checkout, account_id).await?;
        info!(%account_id, checkout = checkout_session_id, "linked checkout");
        Ok(ClaimOutcome::Linked)
      }
      LinkAttempt::AlreadyLinked(checkout) if checkout.account_id == Some(account_id) => {
        self.ensure_purchase(&checkout, account_id).await?;
        Ok(ClaimOutcome::AlreadyOwned)
      }
      LinkAttempt::AlreadyLinked(checkout) => {
        warn!(
          %account_id,
          owner = ?checkout.account_id,
          checkout = checkout_session_id,
          "reconciliation conflict: checkout belongs to another account"
        );
        Ok(ClaimOutcome::OwnedElsewhere)
      }
    }
  }

  /// Create the checkout's purchase unless it exists. Returns `true` if this
  /// call wrote it.
  async fn ensure_purchase(
    &self,
    checkout: &CheckoutRecord,
    account_id: Uuid,
  ) -> Result<bool> {
    let purchase = PurchaseRecord::from_checkout(checkout, account_id, self.clock.now());
    self
      .store
      .insert_purchase_if_absent(purchase)
      .await
      .map_err(Error::store)
  }

  async fn require_account(&self, account_id: Uuid) -> Result<Account> {
    self
      .store
      .get_account(account_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::AccountNotFound(account_id))
  }
}
