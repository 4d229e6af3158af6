//! Per-(account, product) progress through a course's modules.
//!
//! Modules are 1-indexed and unlocked strictly in order. A record's
//! `current_module` is the highest module the learner may open; every module
//! below it is completed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
  pub account_id:        Uuid,
  pub product_key:       String,
  /// Always ≥ 1.
  pub current_module:    u32,
  /// Stamped at creation and on every advance.
  pub last_completed_at: Option<DateTime<Utc>>,
  pub created_at:        DateTime<Utc>,
}

impl ProgressRecord {
  pub fn is_unlocked(&self, module: u32) -> bool {
    module >= 1 && module <= self.current_module
  }

  pub fn is_completed(&self, module: u32) -> bool {
    module >= 1 && module < self.current_module
  }

  /// The only module a valid advance may target.
  pub fn next_module(&self) -> u32 { self.current_module + 1 }
}

// ─── Cooldown ────────────────────────────────────────────────────────────────

/// How long a learner still has to wait before the next advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitTime {
  /// Whole hours remaining.
  pub hours_remaining:         i64,
  /// Whole minutes remaining beyond `hours_remaining`.
  pub minutes_remaining:       i64,
  /// Remaining time in minutes, rounded up.
  pub total_minutes_remaining: i64,
  pub can_complete_at:         DateTime<Utc>,
}

impl WaitTime {
  /// Remaining wait after a completion at `last_completed_at`, or `None` once
  /// `wait_time` has fully elapsed at `now`.
  pub fn until_next(
    last_completed_at: DateTime<Utc>,
    wait_time: Duration,
    now: DateTime<Utc>,
  ) -> Option<Self> {
    // Saturate at the latest representable instant for absurd wait times.
    let can_complete_at = last_completed_at
      .checked_add_signed(wait_time)
      .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if now >= can_complete_at {
      return None;
    }

    let remaining = can_complete_at - now;
    let hours = remaining.num_hours();
    let whole_minutes = remaining.num_minutes();
    let total_minutes = if remaining > Duration::minutes(whole_minutes) {
      whole_minutes + 1
    } else {
      whole_minutes
    };

    Some(Self {
      hours_remaining: hours,
      minutes_remaining: whole_minutes - hours * 60,
      total_minutes_remaining: total_minutes,
      can_complete_at,
    })
  }
}

/// Result of [`crate::progression::ProgressionEngine::request_advance`] when
/// the requested transition is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
  Advanced(ProgressRecord),
  /// The cooldown has not elapsed; nothing was written.
  WaitRequired(WaitTime),
}
