//! SQL schema for the Coursegate SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    account_id    TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,   -- normalised
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

-- One row per (account, product). Only ever moves forward.
CREATE TABLE IF NOT EXISTS progress (
    account_id        TEXT    NOT NULL,
    product_key       TEXT    NOT NULL,
    current_module    INTEGER NOT NULL CHECK (current_module >= 1),
    last_completed_at TEXT,
    created_at        TEXT    NOT NULL,
    PRIMARY KEY (account_id, product_key)
);

CREATE TABLE IF NOT EXISTS checkouts (
    checkout_session_id TEXT PRIMARY KEY,
    email               TEXT    NOT NULL,   -- normalised
    product_key         TEXT    NOT NULL,
    amount_cents        INTEGER NOT NULL,
    currency            TEXT    NOT NULL,
    description         TEXT,
    account_id          TEXT REFERENCES accounts(account_id),
    created_at          TEXT    NOT NULL
);

-- A linked checkout keeps its account forever.
CREATE TRIGGER IF NOT EXISTS checkouts_link_once
BEFORE UPDATE OF account_id ON checkouts
WHEN OLD.account_id IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'checkout is already linked');
END;

-- UNIQUE(checkout_session_id) also makes (account_id, checkout_session_id)
-- unique.
CREATE TABLE IF NOT EXISTS purchases (
    purchase_id         TEXT PRIMARY KEY,
    account_id          TEXT    NOT NULL REFERENCES accounts(account_id),
    checkout_session_id TEXT    NOT NULL UNIQUE
                                REFERENCES checkouts(checkout_session_id),
    product_key         TEXT    NOT NULL,
    amount_cents        INTEGER NOT NULL,
    currency            TEXT    NOT NULL,
    description         TEXT,
    purchased_at        TEXT    NOT NULL,   -- checkout creation time
    recorded_at         TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS checkouts_unlinked_email_idx
    ON checkouts(email) WHERE account_id IS NULL;
CREATE INDEX IF NOT EXISTS checkouts_account_idx  ON checkouts(account_id);
CREATE INDEX IF NOT EXISTS purchases_account_idx  ON purchases(account_id);

PRAGMA user_version = 1;
";
