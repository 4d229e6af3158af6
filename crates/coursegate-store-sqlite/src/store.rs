//! [`SqliteStore`]: the SQLite implementation of every Coursegate store
//! trait.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use coursegate_core::{
  account::{Account, normalize_email},
  checkout::{CheckoutRecord, LinkAttempt, NewCheckout, PurchaseRecord},
  progress::ProgressRecord,
  store::{AccountStore, CheckoutStore, ProgressStore, PurchaseStore},
};

use crate::{
  Result,
  encode::{
    ACCOUNT_COLUMNS, CHECKOUT_COLUMNS, PROGRESS_COLUMNS, PURCHASE_COLUMNS,
    RawAccount, RawCheckout, RawProgress, RawPurchase, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Coursegate state backed by a single SQLite file.
///
/// Cloning shares the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store. Used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_checkouts(
    &self,
    sql: String,
    param: String,
  ) -> Result<Vec<CheckoutRecord>> {
    let raws: Vec<RawCheckout> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![param], RawCheckout::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCheckout::into_record).collect()
  }
}

// ─── ProgressStore impl ──────────────────────────────────────────────────────

impl ProgressStore for SqliteStore {
  type Error = crate::Error;

  async fn ensure_progress(
    &self,
    account_id:  Uuid,
    product_key: &str,
    now:         DateTime<Utc>,
  ) -> Result<ProgressRecord> {
    let account_str = encode_uuid(account_id);
    let product     = product_key.to_owned();
    let now_str     = encode_dt(now);

    let raw: RawProgress = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO progress
             (account_id, product_key, current_module, last_completed_at, created_at)
           VALUES (?1, ?2, 1, ?3, ?3)
           ON CONFLICT (account_id, product_key) DO NOTHING",
          rusqlite::params![account_str, product, now_str],
        )?;
        Ok(conn.query_row(
          &format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress
             WHERE account_id = ?1 AND product_key = ?2"
          ),
          rusqlite::params![account_str, product],
          RawProgress::from_row,
        )?)
      })
      .await?;

    raw.into_record()
  }

  async fn get_progress(
    &self,
    account_id:  Uuid,
    product_key: &str,
  ) -> Result<Option<ProgressRecord>> {
    let account_str = encode_uuid(account_id);
    let product     = product_key.to_owned();

    let raw: Option<RawProgress> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PROGRESS_COLUMNS} FROM progress
                 WHERE account_id = ?1 AND product_key = ?2"
              ),
              rusqlite::params![account_str, product],
              RawProgress::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProgress::into_record).transpose()
  }

  async fn compare_and_advance(
    &self,
    account_id:      Uuid,
    product_key:     &str,
    expected_module: u32,
    completed_at:    DateTime<Utc>,
  ) -> Result<Option<ProgressRecord>> {
    let account_str = encode_uuid(account_id);
    let product     = product_key.to_owned();
    let at_str      = encode_dt(completed_at);

    let raw: Option<RawProgress> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE progress
           SET current_module = current_module + 1, last_completed_at = ?4
           WHERE account_id = ?1 AND product_key = ?2 AND current_module = ?3",
          rusqlite::params![account_str, product, expected_module, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(Some(conn.query_row(
          &format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress
             WHERE account_id = ?1 AND product_key = ?2"
          ),
          rusqlite::params![account_str, product],
          RawProgress::from_row,
        )?))
      })
      .await?;

    raw.map(RawProgress::into_record).transpose()
  }

  async fn list_progress(&self, account_id: Uuid) -> Result<Vec<ProgressRecord>> {
    let account_str = encode_uuid(account_id);

    let raws: Vec<RawProgress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROGRESS_COLUMNS} FROM progress
           WHERE account_id = ?1 ORDER BY product_key"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![account_str], RawProgress::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProgress::into_record).collect()
  }
}

// ─── CheckoutStore impl ──────────────────────────────────────────────────────

impl CheckoutStore for SqliteStore {
  type Error = crate::Error;

  async fn create_checkout(
    &self,
    input: NewCheckout,
    now:   DateTime<Utc>,
  ) -> Result<CheckoutRecord> {
    let record = input.into_record(now);

    let id_str      = record.checkout_session_id.clone();
    let email       = record.email.clone();
    let product     = record.product_key.clone();
    let amount      = record.amount_cents;
    let currency    = record.currency.clone();
    let description = record.description.clone();
    let at_str      = encode_dt(record.created_at);

    let raw: RawCheckout = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO checkouts (
             checkout_session_id, email, product_key, amount_cents,
             currency, description, account_id, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)
           ON CONFLICT (checkout_session_id) DO NOTHING",
          rusqlite::params![id_str, email, product, amount, currency, description, at_str],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE checkout_session_id = ?1"),
          rusqlite::params![id_str],
          RawCheckout::from_row,
        )?)
      })
      .await?;

    raw.into_record()
  }

  async fn get_checkout(&self, checkout_session_id: &str) -> Result<Option<CheckoutRecord>> {
    let id_str = checkout_session_id.to_owned();

    let raw: Option<RawCheckout> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE checkout_session_id = ?1"
              ),
              rusqlite::params![id_str],
              RawCheckout::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCheckout::into_record).transpose()
  }

  async fn unlinked_checkouts_for_email(&self, email: &str) -> Result<Vec<CheckoutRecord>> {
    self
      .query_checkouts(
        format!(
          "SELECT {CHECKOUT_COLUMNS} FROM checkouts
           WHERE email = ?1 AND account_id IS NULL
           ORDER BY created_at"
        ),
        normalize_email(email),
      )
      .await
  }

  async fn link_checkout(
    &self,
    checkout_session_id: &str,
    account_id:          Uuid,
  ) -> Result<LinkAttempt> {
    let id_str      = checkout_session_id.to_owned();
    let account_str = encode_uuid(account_id);

    let (changed, raw): (usize, Option<RawCheckout>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE checkouts SET account_id = ?2
           WHERE checkout_session_id = ?1 AND account_id IS NULL",
          rusqlite::params![id_str, account_str],
        )?;
        let raw = tx
          .query_row(
            &format!(
              "SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE checkout_session_id = ?1"
            ),
            rusqlite::params![id_str],
            RawCheckout::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok((changed, raw))
      })
      .await?;

    let Some(raw) = raw else {
      return Ok(LinkAttempt::NotFound);
    };
    let record = raw.into_record()?;

    Ok(if changed == 1 {
      LinkAttempt::Linked(record)
    } else {
      LinkAttempt::AlreadyLinked(record)
    })
  }

  async fn linked_checkouts_without_purchase(
    &self,
    account_id: Uuid,
  ) -> Result<Vec<CheckoutRecord>> {
    self
      .query_checkouts(
        format!(
          "SELECT {CHECKOUT_COLUMNS} FROM checkouts c
           WHERE c.account_id = ?1
             AND NOT EXISTS (
               SELECT 1 FROM purchases p
               WHERE p.checkout_session_id = c.checkout_session_id
             )
           ORDER BY c.created_at"
        ),
        encode_uuid(account_id),
      )
      .await
  }
}

// ─── PurchaseStore impl ──────────────────────────────────────────────────────

impl PurchaseStore for SqliteStore {
  type Error = crate::Error;

  async fn insert_purchase_if_absent(&self, purchase: PurchaseRecord) -> Result<bool> {
    let purchase_str = encode_uuid(purchase.purchase_id);
    let account_str  = encode_uuid(purchase.account_id);
    let checkout     = purchase.checkout_session_id;
    let product      = purchase.product_key;
    let amount       = purchase.amount_cents;
    let currency     = purchase.currency;
    let description  = purchase.description;
    let purchased    = encode_dt(purchase.purchased_at);
    let recorded     = encode_dt(purchase.recorded_at);

    let changed: usize = self
      .conn
      .call(move |conn| {
        // Inserts nothing unless the checkout is linked to this account, and
        // nothing if a purchase for the checkout already exists.
        Ok(conn.execute(
          "INSERT INTO purchases (
             purchase_id, account_id, checkout_session_id, product_key,
             amount_cents, currency, description, purchased_at, recorded_at
           )
           SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
           WHERE EXISTS (
             SELECT 1 FROM checkouts
             WHERE checkout_session_id = ?3 AND account_id = ?2
           )
           ON CONFLICT DO NOTHING",
          rusqlite::params![
            purchase_str,
            account_str,
            checkout,
            product,
            amount,
            currency,
            description,
            purchased,
            recorded,
          ],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn purchase_for_checkout(
    &self,
    checkout_session_id: &str,
  ) -> Result<Option<PurchaseRecord>> {
    let id_str = checkout_session_id.to_owned();

    let raw: Option<RawPurchase> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE checkout_session_id = ?1"
              ),
              rusqlite::params![id_str],
              RawPurchase::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPurchase::into_record).transpose()
  }

  async fn list_purchases(&self, account_id: Uuid) -> Result<Vec<PurchaseRecord>> {
    let account_str = encode_uuid(account_id);

    let raws: Vec<RawPurchase> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PURCHASE_COLUMNS} FROM purchases
           WHERE account_id = ?1 ORDER BY purchased_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![account_str], RawPurchase::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPurchase::into_record).collect()
  }
}

// ─── AccountStore impl ───────────────────────────────────────────────────────

impl AccountStore for SqliteStore {
  type Error = crate::Error;

  async fn create_account(
    &self,
    email:         &str,
    password_hash: String,
    now:           DateTime<Utc>,
  ) -> Result<Option<Account>> {
    let account = Account {
      account_id: Uuid::new_v4(),
      email: normalize_email(email),
      password_hash,
      created_at: now,
    };

    let id_str = encode_uuid(account.account_id);
    let email  = account.email.clone();
    let hash   = account.password_hash.clone();
    let at_str = encode_dt(account.created_at);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO accounts (account_id, email, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![id_str, email, hash, at_str],
        )?)
      })
      .await?;

    Ok((changed == 1).then_some(account))
  }

  async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>> {
    let id_str = encode_uuid(account_id);

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = ?1"),
              rusqlite::params![id_str],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
    let email = normalize_email(email);

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
              rusqlite::params![email],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }
}
