use std::cmp::Ordering;

use bytes::Bytes;

use crate::{
  data::{flags::ItemFlags, value::DataType},
  errors::{Errors, Result},
};

use super::cmp_ignore_case;

/// Where the bytes of a cached value live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
  InMemory(Bytes),

  /// Byte range in the vault's primary stream, stored scrambled if the
  /// entry is flagged `SCRAMBLE`.
  OnDisk { offset: u64, len: u32 },
}

impl CacheValue {
  pub fn len(&self) -> usize {
    match self {
      CacheValue::InMemory(b) => b.len(),
      CacheValue::OnDisk { len, .. } => *len as usize,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_on_disk(&self) -> bool {
    matches!(self, CacheValue::OnDisk { .. })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub key: String,
  pub flags: ItemFlags,
  pub ty: DataType,
  pub value: CacheValue,
}

/// Key/value entries kept sorted case-insensitively by key.
///
/// Every mutator keeps the order; lookups rely on it and never re-check.
/// Inserting an existing key adds a second entry in front of the first.
#[derive(Debug, Default, Clone)]
pub struct DataCache {
  entries: Vec<CacheEntry>,
}

impl DataCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(&self) -> &[CacheEntry] {
    &self.entries
  }

  pub fn entry_at(&self, index: usize) -> Option<&CacheEntry> {
    self.entries.get(index)
  }

  pub fn entry_at_mut(&mut self, index: usize) -> Option<&mut CacheEntry> {
    self.entries.get_mut(index)
  }

  /// Index of the entry with exactly `key`, ignoring case.
  pub fn search(&self, key: &str) -> Option<usize> {
    let pos = self.find_insertion_point(key);
    match self.entries.get(pos) {
      Some(e) if cmp_ignore_case(&e.key, key) == Ordering::Equal => Some(pos),
      _ => None,
    }
  }

  /// Index at which `key` belongs: before any entry that sorts equal or higher.
  pub fn find_insertion_point(&self, key: &str) -> usize {
    self
      .entries
      .partition_point(|e| cmp_ignore_case(&e.key, key) == Ordering::Less)
  }

  /// Index of the first entry sorting strictly after `key`.
  pub fn upper_bound(&self, key: &str) -> usize {
    self
      .entries
      .partition_point(|e| cmp_ignore_case(&e.key, key) != Ordering::Greater)
  }

  pub fn get(&self, key: &str) -> Option<&CacheEntry> {
    self.search(key).map(|i| &self.entries[i])
  }

  pub fn get_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
    self.search(key).map(move |i| &mut self.entries[i])
  }

  /// Always inserts, even when `key` is already present. The cache is left
  /// unchanged when the slot cannot be allocated.
  pub fn insert_value(
    &mut self,
    key: &str,
    ty: DataType,
    value: CacheValue,
    flags: ItemFlags,
  ) -> Result<usize> {
    let node = self.find_insertion_point(key);
    self
      .entries
      .try_reserve_exact(1)
      .map_err(|_| Errors::NoMemory)?;
    self.entries.insert(
      node,
      CacheEntry {
        key: key.to_string(),
        flags,
        ty,
        value,
      },
    );
    Ok(node)
  }

  pub fn delete_value(&mut self, key: &str) -> Result<CacheEntry> {
    let node = self.search(key).ok_or(Errors::NotFound)?;
    let removed = self.entries.remove(node);
    if self.entries.is_empty() {
      self.entries = Vec::new();
    } else {
      self.entries.shrink_to_fit();
    }
    Ok(removed)
  }

  /// Deletes every entry `pred` selects, returning the removed entries.
  pub fn delete_where<F>(&mut self, mut pred: F) -> Vec<CacheEntry>
  where
    F: FnMut(&CacheEntry) -> bool,
  {
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(self.entries.len());
    for e in self.entries.drain(..) {
      if pred(&e) {
        removed.push(e);
      } else {
        kept.push(e);
      }
    }
    self.entries = kept;
    removed
  }

  pub fn clear(&mut self) {
    self.entries = Vec::new();
  }

  /// Snapshot of the `NOCACHE` entries, for restoring their file offsets if
  /// a flush fails.
  pub fn clone_offsets(&self) -> DataCache {
    DataCache {
      entries: self
        .entries
        .iter()
        .filter(|e| e.flags.contains(ItemFlags::NOCACHE))
        .cloned()
        .collect(),
    }
  }

  /// Puts the snapshot's values back into entries that are still `NOCACHE`.
  pub fn restore_offsets(&mut self, clone: DataCache) {
    for saved in clone.entries {
      if let Some(entry) = self.get_mut(&saved.key) {
        if entry.flags.contains(ItemFlags::NOCACHE) {
          entry.value = saved.value;
        }
      }
    }
  }

  pub fn is_sorted(&self) -> bool {
    self
      .entries
      .windows(2)
      .all(|w| cmp_ignore_case(&w[0].key, &w[1].key) != Ordering::Greater)
  }
}

#[cfg(test)]
mod tests {
  use rand::Rng;

  use super::*;

  fn mem(v: &str) -> CacheValue {
    CacheValue::InMemory(Bytes::copy_from_slice(v.as_bytes()))
  }

  fn keys(cache: &DataCache) -> Vec<&str> {
    cache.entries().iter().map(|e| e.key.as_str()).collect()
  }

  #[test]
  fn test_insert_keeps_order() {
    let mut cache = DataCache::new();
    for k in ["delta", "Alpha", "charlie", "bravo"] {
      cache
        .insert_value(k, DataType::String, mem(k), ItemFlags::empty())
        .unwrap();
    }
    assert_eq!(keys(&cache), vec!["Alpha", "bravo", "charlie", "delta"]);
    assert_eq!(cache.search("ALPHA"), Some(0));
    assert_eq!(cache.search("echo"), None);
    assert_eq!(cache.find_insertion_point("c"), 2);
    assert_eq!(cache.upper_bound("bravo"), 2);
  }

  #[test]
  fn test_insert_allows_duplicates() {
    let mut cache = DataCache::new();
    cache
      .insert_value("k", DataType::String, mem("one"), ItemFlags::empty())
      .unwrap();
    cache
      .insert_value("K", DataType::String, mem("two"), ItemFlags::empty())
      .unwrap();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("k").unwrap().value, mem("two"));
    cache.delete_value("k").unwrap();
    assert_eq!(cache.get("k").unwrap().value, mem("one"));
  }

  #[test]
  fn test_delete() {
    let mut cache = DataCache::new();
    cache
      .insert_value("a", DataType::String, mem("a"), ItemFlags::empty())
      .unwrap();
    assert_eq!(cache.delete_value("missing").unwrap_err(), Errors::NotFound);
    let removed = cache.delete_value("A").unwrap();
    assert_eq!(removed.key, "a");
    assert!(cache.is_empty());
  }

  #[test]
  fn test_sorted_under_random_ops() {
    let mut rng = rand::rng();
    let mut cache = DataCache::new();
    for _ in 0..2000 {
      let key = format!("Key_{}", rng.random_range(0..200));
      let key = if rng.random_bool(0.5) {
        key.to_uppercase()
      } else {
        key
      };
      if rng.random_bool(0.6) {
        cache
          .insert_value(&key, DataType::UInt32, mem("v"), ItemFlags::empty())
          .unwrap();
      } else {
        let _ = cache.delete_value(&key);
      }
      assert!(cache.is_sorted());
    }
  }

  #[test]
  fn test_clone_and_restore_offsets() {
    let mut cache = DataCache::new();
    cache
      .insert_value(
        "big",
        DataType::Binary,
        CacheValue::OnDisk { offset: 100, len: 8 },
        ItemFlags::NOCACHE | ItemFlags::PERSIST,
      )
      .unwrap();
    cache
      .insert_value("small", DataType::String, mem("s"), ItemFlags::PERSIST)
      .unwrap();

    let snapshot = cache.clone_offsets();
    assert_eq!(snapshot.len(), 1);

    cache.get_mut("big").unwrap().value = CacheValue::OnDisk { offset: 999, len: 8 };
    cache.restore_offsets(snapshot);
    assert_eq!(
      cache.get("big").unwrap().value,
      CacheValue::OnDisk { offset: 100, len: 8 }
    );
  }

  #[test]
  fn test_delete_where() {
    let mut cache = DataCache::new();
    for k in ["app_1", "app_2", "other"] {
      cache
        .insert_value(k, DataType::String, mem(k), ItemFlags::empty())
        .unwrap();
    }
    let removed = cache.delete_where(|e| super::super::key_match(&e.key, "app_*"));
    assert_eq!(removed.len(), 2);
    assert_eq!(keys(&cache), vec!["other"]);
  }
}
