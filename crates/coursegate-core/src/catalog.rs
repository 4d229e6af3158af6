//! The product catalog: which products exist and how many modules each has.
//!
//! Module content lives elsewhere; the engines only need the module count.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub title:        String,
  /// Number of content modules, addressed `1..=module_count`.
  pub module_count: u32,
  #[serde(default)]
  pub description:  Option<String>,
}

/// Products keyed by their product key. Deserialises from a plain table, e.g.
/// the `[products]` section of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
  products: BTreeMap<String, Product>,
}

impl Catalog {
  pub fn new() -> Self { Self::default() }

  /// Builder-style insert.
  pub fn with_product(mut self, key: impl Into<String>, product: Product) -> Self {
    self.products.insert(key.into(), product);
    self
  }

  pub fn get(&self, product_key: &str) -> Option<&Product> {
    self.products.get(product_key)
  }

  pub fn module_count(&self, product_key: &str) -> Option<u32> {
    self.get(product_key).map(|p| p.module_count)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Product)> {
    self.products.iter().map(|(k, p)| (k.as_str(), p))
  }
}
