//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with full sub-second precision, so values
//! read back compare equal to the values written. UUIDs are hyphenated
//! lowercase strings.

use chrono::{DateTime, Utc};
use coursegate_core::{
  account::Account,
  checkout::{CheckoutRecord, PurchaseRecord},
  progress::ProgressRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_module(value: i64) -> Result<u32> {
  u32::try_from(value)
    .ok()
    .filter(|m| *m >= 1)
    .ok_or(Error::InvalidColumn { column: "current_module", value })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawProgress::from_row`].
pub const PROGRESS_COLUMNS: &str =
  "account_id, product_key, current_module, last_completed_at, created_at";

/// Raw values read directly from a `progress` row.
pub struct RawProgress {
  pub account_id:        String,
  pub product_key:       String,
  pub current_module:    i64,
  pub last_completed_at: Option<String>,
  pub created_at:        String,
}

impl RawProgress {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id:        row.get(0)?,
      product_key:       row.get(1)?,
      current_module:    row.get(2)?,
      last_completed_at: row.get(3)?,
      created_at:        row.get(4)?,
    })
  }

  pub fn into_record(self) -> Result<ProgressRecord> {
    Ok(ProgressRecord {
      account_id:        decode_uuid(&self.account_id)?,
      product_key:       self.product_key,
      current_module:    decode_module(self.current_module)?,
      last_completed_at: self.last_completed_at.as_deref().map(decode_dt).transpose()?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

/// Column list matching [`RawCheckout::from_row`].
pub const CHECKOUT_COLUMNS: &str = "checkout_session_id, email, product_key, \
   amount_cents, currency, description, account_id, created_at";

/// Raw values read directly from a `checkouts` row.
pub struct RawCheckout {
  pub checkout_session_id: String,
  pub email:               String,
  pub product_key:         String,
  pub amount_cents:        i64,
  pub currency:            String,
  pub description:         Option<String>,
  pub account_id:          Option<String>,
  pub created_at:          String,
}

impl RawCheckout {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      checkout_session_id: row.get(0)?,
      email:               row.get(1)?,
      product_key:         row.get(2)?,
      amount_cents:        row.get(3)?,
      currency:            row.get(4)?,
      description:         row.get(5)?,
      account_id:          row.get(6)?,
      created_at:          row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<CheckoutRecord> {
    Ok(CheckoutRecord {
      checkout_session_id: self.checkout_session_id,
      email:               self.email,
      product_key:         self.product_key,
      amount_cents:        self.amount_cents,
      currency:            self.currency,
      description:         self.description,
      account_id:          self.account_id.as_deref().map(decode_uuid).transpose()?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

/// Column list matching [`RawPurchase::from_row`].
pub const PURCHASE_COLUMNS: &str = "purchase_id, account_id, checkout_session_id, \
   product_key, amount_cents, currency, description, purchased_at, recorded_at";

/// Raw values read directly from a `purchases` row.
pub struct RawPurchase {
  pub purchase_id:         String,
  pub account_id:          String,
  pub checkout_session_id: String,
  pub product_key:         String,
  pub amount_cents:        i64,
  pub currency:            String,
  pub description:         Option<String>,
  pub purchased_at:        String,
  pub recorded_at:         String,
}

impl RawPurchase {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      purchase_id:         row.get(0)?,
      account_id:          row.get(1)?,
      checkout_session_id: row.get(2)?,
      product_key:         row.get(3)?,
      amount_cents:        row.get(4)?,
      currency:            row.get(5)?,
      description:         row.get(6)?,
      purchased_at:        row.get(7)?,
      recorded_at:         row.get(8)?,
    })
  }

  pub fn into_record(self) -> Result<PurchaseRecord> {
    Ok(PurchaseRecord {
      purchase_id:         decode_uuid(&self.purchase_id)?,
      account_id:          decode_uuid(&self.account_id)?,
      checkout_session_id: self.checkout_session_id,
      product_key:         self.product_key,
      amount_cents:        self.amount_cents,
      currency:            self.currency,
      description:         self.description,
      purchased_at:        decode_dt(&self.purchased_at)?,
      recorded_at:         decode_dt(&self.recorded_at)?,
    })
  }
}

/// Column list matching [`RawAccount::from_row`].
pub const ACCOUNT_COLUMNS: &str = "account_id, email, password_hash, created_at";

/// Raw values read directly from an `accounts` row.
pub struct RawAccount {
  pub account_id:    String,
  pub email:         String,
  pub password_hash: String,
  pub created_at:    String,
}

impl RawAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id:    row.get(0)?,
      email:         row.get(1)?,
      password_hash: row.get(2)?,
      created_at:    row.get(3)?,
    })
  }

  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      account_id:    decode_uuid(&self.account_id)?,
      email:         self.email,
      password_hash: self.password_hash,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}
