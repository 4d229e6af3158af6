//! Core types, store traits and engines for the Coursegate storefront.
//!
//! This crate has no HTTP or database dependencies. The
//! storage backend (`coursegate-store-sqlite`) and the HTTP surface
//! (`coursegate-server`) both depend on it.

// Store traits declare `impl Future + Send` returns; backends implement them
// with native `async fn`.
#![allow(async_fn_in_trait)]

pub mod account;
pub mod catalog;
pub mod checkout;
pub mod clock;
pub mod error;
pub mod progress;
pub mod progression;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};
