//! Accounts: the identities that checkouts and progress belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
  pub account_id:    Uuid,
  /// Always stored normalised; see [`normalize_email`].
  pub email:         String,
  /// argon2 PHC string. Never leaves the server.
  #[serde(skip_serializing, default)]
  pub password_hash: String,
  pub created_at:    DateTime<Utc>,
}

/// Canonical form used for every email comparison: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }
