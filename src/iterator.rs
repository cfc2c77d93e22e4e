use std::sync::Arc;

use crate::{
  bank::DataBank,
  data::value::{DataType, Value},
  errors::{Errors, Result},
  index::key_match,
  vault::DataVault,
};

/// Cursor over the keys of one vault matching a glob pattern.
///
/// Each step resumes after the last returned key, so keys inserted or
/// deleted between steps are seen or skipped by their sort position.
pub struct FindContext {
  vault: Arc<DataVault>,
  pattern: String,
  last_key: Option<String>,
}

impl DataBank {
  /// Starts a search and returns the first matching key with its context.
  pub fn find_first(&self, namespace: Option<&str>, pattern: &str) -> Result<(FindContext, String)> {
    let name = self.resolve_namespace(namespace);
    let vault = self.get_vault(&name).ok_or(Errors::NotFound)?;
    let mut context = FindContext::new(vault, pattern);
    let key = context.find_next()?;
    Ok((context, key))
  }
}

impl FindContext {
  pub fn new(vault: Arc<DataVault>, pattern: &str) -> Self {
    Self {
      vault,
      pattern: pattern.to_string(),
      last_key: None,
    }
  }

  pub fn pattern(&self) -> &str {
    &self.pattern
  }

  /// The next matching key. Fails with `NotFound` when nothing matches at
  /// all and with `IterationDone` once earlier matches are exhausted.
  pub fn find_next(&mut self) -> Result<String> {
    let state = self.vault.read_state();
    let start = match &self.last_key {
      Some(last) => state.cache.upper_bound(last),
      None => 0,
    };
    let done = if self.last_key.is_some() {
      Errors::IterationDone
    } else {
      Errors::NotFound
    };
    let entry = state.cache.entries()[start..]
      .iter()
      .find(|e| key_match(&e.key, &self.pattern))
      .ok_or(done)?;
    self.last_key = Some(entry.key.clone());
    Ok(entry.key.clone())
  }

  /// The next matching key together with its value.
  pub fn find_next_value(&mut self) -> Result<(String, Value)> {
    let key = self.find_next()?;
    let value = self.vault.get_value(&key, DataType::Auto)?;
    Ok((key, value))
  }

  /// Restarts the search from the first key.
  pub fn rewind(&mut self) {
    self.last_key = None;
  }

  pub fn close(self) {}
}

impl Iterator for FindContext {
  type Item = String;

  fn next(&mut self) -> Option<Self::Item> {
    self.find_next().ok()
  }
}
