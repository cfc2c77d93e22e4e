use std::{
  io::Write,
  path::{Path, PathBuf},
  sync::Arc,
};

use bytes::Bytes;
use log::{debug, warn};
use parking_lot::{RwLock, RwLockReadGuard};
use time::{macros::format_description, OffsetDateTime};

use crate::{
  crypto::{self, PayloadHash},
  data::{
    flags::ItemFlags,
    header::{PayloadClass, Version},
    value::{DataType, Value},
  },
  errors::{Errors, Result},
  fio::{stream::IoStream, FileSystem, OpenMode},
  index::{
    cache::{CacheEntry, CacheValue, DataCache},
    has_wildcard, key_match,
  },
  util::file::{vault_file_path, LOG_EXT},
};

/// Prefix of a SET value naming a file whose contents become the value.
const FILE_VALUE_PREFIX: &[u8] = b"<<";
/// Like `<<`, with a type/length record in front of the file contents.
const TAGGED_FILE_VALUE_PREFIX: &[u8] = b"<<<";

/// A named, lockable key/value store.
pub struct DataVault {
  name: String,
  dir_path: PathBuf,
  pub(crate) fs: Arc<dyn FileSystem>,
  transaction_log: bool,
  pub(crate) state: RwLock<VaultState>,
}

/// Everything guarded by the vault lock.
#[derive(Debug, Default)]
pub(crate) struct VaultState {
  pub segment_id: String,
  pub comment: String,
  pub version: Version,
  pub flags: ItemFlags,
  pub cache: DataCache,
  /// Where persisted keys are flushed to.
  pub stream: Option<IoStream>,
  pub data_class: PayloadClass,
  pub hash: Option<PayloadHash>,
}

impl VaultState {
  pub fn has_file_primary(&self) -> bool {
    self.stream.as_ref().map(|s| s.is_file()).unwrap_or(false)
  }

  pub fn is_read_only(&self) -> bool {
    self
      .flags
      .intersects(ItemFlags::STATIC | ItemFlags::READONLY)
  }
}

impl DataVault {
  pub(crate) fn new(
    name: &str,
    dir_path: &Path,
    fs: Arc<dyn FileSystem>,
    transaction_log: bool,
  ) -> Self {
    Self {
      name: name.to_string(),
      dir_path: dir_path.to_path_buf(),
      fs,
      transaction_log,
      state: RwLock::new(VaultState::default()),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn dir_path(&self) -> &Path {
    &self.dir_path
  }

  pub fn comment(&self) -> String {
    self.state.read().comment.clone()
  }

  pub fn set_comment(&self, comment: &str) {
    self.state.write().comment = comment.to_string();
  }

  pub fn segment_id(&self) -> String {
    self.state.read().segment_id.clone()
  }

  pub fn version(&self) -> Version {
    self.state.read().version
  }

  pub fn flags(&self) -> ItemFlags {
    self.state.read().flags
  }

  pub fn data_class(&self) -> PayloadClass {
    self.state.read().data_class
  }

  pub fn payload_hash(&self) -> Option<PayloadHash> {
    self.state.read().hash
  }

  pub fn is_read_only(&self) -> bool {
    self.state.read().is_read_only()
  }

  pub fn primary_path(&self) -> Option<PathBuf> {
    let state = self.state.read();
    state
      .stream
      .as_ref()
      .and_then(|s| s.path())
      .map(Path::to_path_buf)
  }

  pub fn len(&self) -> usize {
    self.state.read().cache.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state.read().cache.is_empty()
  }

  /// All keys in cache order.
  pub fn keys(&self) -> Vec<String> {
    let state = self.state.read();
    state.cache.entries().iter().map(|e| e.key.clone()).collect()
  }

  pub fn key_exists(&self, key: &str) -> bool {
    self.state.read().cache.search(key).is_some()
  }

  /// Flags stored with `key`.
  pub fn key_flags(&self, key: &str) -> Option<ItemFlags> {
    self.state.read().cache.get(key).map(|e| e.flags)
  }

  pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, VaultState> {
    self.state.read()
  }

  /// Looks up `key`. A key containing `*` or `?` returns the `|`-joined
  /// names of every matching key instead.
  pub fn get_value(&self, key: &str, ty: DataType) -> Result<Value> {
    let state = self.state.read();
    if ty == DataType::Auto {
      self.write_log("AUTO", key, ItemFlags::empty(), None);
    }
    let value = self.get_value_locked(&state, key, ty);
    if let Ok(v) = &value {
      self.write_log("GET", key, ItemFlags::empty(), Some(v));
    }
    value
  }

  /// Copies the value into `buf`, returning its type and length.
  pub fn get_value_into(&self, key: &str, ty: DataType, buf: &mut [u8]) -> Result<(DataType, usize)> {
    let value = self.get_value(key, ty)?;
    if buf.len() < value.len() {
      return Err(Errors::NeedLargerBuffer {
        required: value.len(),
      });
    }
    buf[..value.len()].copy_from_slice(value.data());
    Ok((value.data_type(), value.len()))
  }

  pub(crate) fn get_value_locked(&self, state: &VaultState, key: &str, ty: DataType) -> Result<Value> {
    if has_wildcard(key) {
      let matches: Vec<&str> = state
        .cache
        .entries()
        .iter()
        .filter(|e| key_match(&e.key, key))
        .map(|e| e.key.as_str())
        .collect();
      if matches.is_empty() {
        return Err(Errors::NotFound);
      }
      return Ok(Value::string(&matches.join("|")));
    }

    let entry = state.cache.get(key).ok_or(Errors::NotFound)?;
    if ty != DataType::Auto && ty != entry.ty {
      return Err(Errors::UnsupportedType);
    }

    let data = self.entry_bytes(state, entry)?;
    if !entry.flags.contains(ItemFlags::FILELINK) {
      return Ok(Value::new(entry.ty, data));
    }

    let path = String::from_utf8_lossy(&data);
    let path = path.trim_end_matches('\0');
    match self.fs.load(Path::new(path)) {
      Ok(contents) => Ok(Value::new(entry.ty, with_terminator(entry.ty, contents))),
      Err(e) => {
        debug!("linked file {} for {}:{} unavailable: {}", path, self.name, key, e);
        Ok(Value::empty(entry.ty))
      }
    }
  }

  /// The stored bytes of an entry, read from the primary stream and
  /// unscrambled when they are not memory resident.
  pub(crate) fn entry_bytes(&self, state: &VaultState, entry: &CacheEntry) -> Result<Bytes> {
    match &entry.value {
      CacheValue::InMemory(b) => Ok(b.clone()),
      CacheValue::OnDisk { offset, len } => {
        let stream = state.stream.as_ref().ok_or(Errors::NotFound)?;
        let raw = stream.read_at(*offset, *len as usize).map_err(|e| {
          warn!("failed to read {}:{} at offset {}: {}", self.name, entry.key, offset, e);
          Errors::NotFound
        })?;
        if entry.flags.contains(ItemFlags::SCRAMBLE) {
          let mut plain = raw.to_vec();
          crypto::scramble(&mut plain);
          Ok(Bytes::from(plain))
        } else {
          Ok(raw)
        }
      }
    }
  }

  /// Sets `key`, or deletes it when `flags` has `DELETE`. Wildcard keys are
  /// only accepted for deletes. Persisted changes are flushed before
  /// returning; a failed flush restores the on-disk offsets.
  pub fn set_value(&self, key: &str, value: Value, flags: ItemFlags) -> Result<()> {
    let value = if flags.contains(ItemFlags::DELETE) {
      None
    } else {
      Some(value)
    };
    self.set_values(vec![(key.to_string(), value)], flags)
  }

  pub fn delete_value(&self, key: &str, flags: ItemFlags) -> Result<()> {
    self.set_values(vec![(key.to_string(), None)], flags | ItemFlags::DELETE)
  }

  /// Applies several sets under one lock with at most one flush.
  pub fn set_values(&self, items: Vec<(String, Option<Value>)>, flags: ItemFlags) -> Result<()> {
    let mut state = self.state.write();
    if state.is_read_only() {
      return Err(Errors::ReadOnly);
    }
    // payload vaults are only rewritten through set_payload
    if state.data_class != PayloadClass::Keys {
      return Err(Errors::NotSupported);
    }

    let snapshot = state.cache.clone_offsets();
    let mut flush = false;
    for (key, value) in items {
      match self.set_value_locked(&mut state, &key, value, flags) {
        Ok(needs_flush) => flush |= needs_flush,
        Err(e) => {
          if flush {
            self.flush_or_restore(&mut state, snapshot)?;
          }
          return Err(e);
        }
      }
    }

    if flush {
      self.flush_or_restore(&mut state, snapshot)?;
    }
    Ok(())
  }

  fn flush_or_restore(&self, state: &mut VaultState, snapshot: DataCache) -> Result<()> {
    if let Err(e) = self.repo_flush(state, None, false) {
      state.cache.restore_offsets(snapshot);
      return Err(e);
    }
    Ok(())
  }

  /// Returns whether the change needs a flush.
  fn set_value_locked(
    &self,
    state: &mut VaultState,
    key: &str,
    value: Option<Value>,
    flags: ItemFlags,
  ) -> Result<bool> {
    let deleting = flags.contains(ItemFlags::DELETE);
    let value = if deleting { None } else { value };
    let item_flags = flags - ItemFlags::DELETE - ItemFlags::STATIC;

    if let Some(v) = &value {
      if v.data_type() == DataType::Auto {
        return Err(Errors::UnsupportedType);
      }
      let required = v.data_type().fixed_size();
      if required > 0 && v.len() < required {
        return Err(Errors::NeedLargerBuffer { required });
      }
    }

    self.write_log(
      if deleting { "DELETE" } else { "SET" },
      key,
      flags,
      value.as_ref(),
    );

    let mut persist = flags.contains(ItemFlags::PERSIST);

    if has_wildcard(key) {
      if !deleting {
        return Err(Errors::NotSupported);
      }
      let removed = if key == "*" {
        let removed = state.cache.entries().to_vec();
        state.cache.clear();
        removed
      } else {
        state.cache.delete_where(|e| key_match(&e.key, key))
      };
      persist |= removed.iter().any(|e| e.flags.contains(ItemFlags::PERSIST));
      debug!("deleted {} keys matching {} from {}", removed.len(), key, self.name);
      return Ok(persist);
    }

    let value = match value {
      Some(v) => Some(self.resolve_file_value(v)?),
      None => None,
    };

    match state.cache.search(key) {
      Some(index) => {
        let existing = state.cache.entry_at(index).map(|e| e.flags).unwrap_or_default();
        if existing.contains(ItemFlags::READONLY) {
          return Err(Errors::ReadOnly);
        }
        persist |= existing.contains(ItemFlags::PERSIST);
        if deleting {
          state.cache.delete_value(key)?;
        } else if let Some(v) = value {
          if let Some(entry) = state.cache.entry_at_mut(index) {
            entry.flags = item_flags;
            entry.ty = v.data_type();
            // an on-disk value becomes memory resident until the next flush
            entry.value = CacheValue::InMemory(v.into_data());
          }
        }
      }
      None => match value {
        Some(v) => {
          let ty = v.data_type();
          state
            .cache
            .insert_value(key, ty, CacheValue::InMemory(v.into_data()), item_flags)?;
        }
        None => return Ok(false),
      },
    }
    Ok(persist)
  }

  /// Replaces `<<path` and `<<<path` values with the named file's contents.
  fn resolve_file_value(&self, value: Value) -> Result<Value> {
    let data = value.data();
    if !data.starts_with(FILE_VALUE_PREFIX) {
      return Ok(value);
    }
    let tagged = data.starts_with(TAGGED_FILE_VALUE_PREFIX);
    let skip = if tagged {
      TAGGED_FILE_VALUE_PREFIX.len()
    } else {
      FILE_VALUE_PREFIX.len()
    };
    let path = String::from_utf8_lossy(&data[skip..]);
    let path = path.trim_end_matches('\0').trim();
    let contents = self.fs.load(Path::new(path)).map_err(|e| {
      warn!("failed to load value file {}: {}", path, e);
      Errors::NotFound
    })?;

    let ty = value.data_type();
    if !tagged {
      return Ok(Value::new(ty, with_terminator(ty, contents)));
    }
    let mut buf = Vec::with_capacity(8 + contents.len());
    buf.extend_from_slice(&(u8::from(ty) as u32).to_le_bytes());
    buf.extend_from_slice(&(contents.len() as u32).to_le_bytes());
    buf.extend_from_slice(&contents);
    Ok(Value::new(DataType::Blob, buf))
  }

  /// Replaces the vault contents with an opaque repository payload.
  pub fn set_payload(&self, class: PayloadClass, payload: &mut IoStream, compress: bool) -> Result<()> {
    let mut state = self.state.write();
    if state.is_read_only() {
      return Err(Errors::ReadOnly);
    }
    if !state.cache.is_empty() && state.data_class == PayloadClass::Keys {
      return Err(Errors::NotSupported);
    }
    self.repo_flush(&mut state, Some((class, payload)), compress)
  }

  fn write_log(&self, action: &str, key: &str, flags: ItemFlags, value: Option<&Value>) {
    if !self.transaction_log {
      return;
    }
    let now = OffsetDateTime::now_utc()
      .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
      .unwrap_or_default();
    let mut line = format!("{now}: {action:<6} {key} flags=0x{:08X}", flags.bits());
    if let Some(v) = value {
      let hex: String = v.data().iter().map(|b| format!("{b:02X}")).collect();
      line.push_str(&format!(" type={:?} len={} data={}", v.data_type(), v.len(), hex));
    }
    line.push_str("\r\n");

    let path = vault_file_path(&self.dir_path, &self.name, LOG_EXT);
    let written = self
      .fs
      .open(&path, OpenMode::parse("ab"))
      .and_then(|mut f| f.write_all(line.as_bytes()));
    if let Err(e) = written {
      debug!("failed to append {}: {}", path.display(), e);
    }
  }
}

impl std::fmt::Debug for DataVault {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DataVault").field("name", &self.name).finish()
  }
}

/// String values loaded from files get a NUL terminator appended.
fn with_terminator(ty: DataType, contents: Bytes) -> Bytes {
  if !ty.is_string() {
    return contents;
  }
  let mut buf = Vec::with_capacity(contents.len() + 1);
  buf.extend_from_slice(&contents);
  buf.push(0);
  Bytes::from(buf)
}
