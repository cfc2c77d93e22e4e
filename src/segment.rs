use std::io::SeekFrom;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::{
  compress,
  crypto::{self, PayloadDigest, PayloadHash},
  data::{
    flags::ItemFlags,
    header::{PayloadClass, RepoHeader},
    item::{read_item, ItemRecord},
  },
  errors::{Errors, Result},
  fio::stream::{IoStream, StoreType},
  index::cache::CacheValue,
  option::ImportMode,
  vault::{DataVault, VaultState},
};

const HASH_CHUNK: usize = 64 * 1024;

/// Moves the stream to the end of the payload that follows `header`.
pub(crate) fn skip_payload(stream: &mut IoStream, header: &RepoHeader) -> Result<()> {
  if header.is_v1() {
    stream.seek(SeekFrom::End(0))?;
  } else {
    stream.seek(SeekFrom::Current(header.payload_size as i64))?;
  }
  Ok(())
}

fn check_hash(header: &RepoHeader, hash: &PayloadHash) -> Result<()> {
  let sha256_ok = match header.payload_sha256 {
    Some(expected) => expected == hash.sha256,
    None => true,
  };
  if hash.sha1 != header.payload_hash || !sha256_ok || hash.len != header.payload_size as u64 {
    warn!(
      "payload hash mismatch for segment {:?}: got sha1 {}",
      header.segment_id,
      hash.sha1_hex()
    );
    return Err(Errors::HashMismatch);
  }
  Ok(())
}

/// Hashes the payload in place and rewinds to its first byte.
fn validate_payload(stream: &mut IoStream, header: &RepoHeader) -> Result<()> {
  let start = stream.tell();
  let mut digest = PayloadDigest::new();
  let mut remaining = header.payload_size as usize;
  let mut chunk = vec![0u8; HASH_CHUNK.min(remaining.max(1))];
  while remaining > 0 {
    let want = remaining.min(chunk.len());
    let n = stream.read(&mut chunk[..want]);
    if n == 0 {
      break;
    }
    digest.update(&chunk[..n]);
    remaining -= n;
  }
  check_hash(header, &digest.finish())?;
  stream.seek(SeekFrom::Start(start))?;
  Ok(())
}

/// Reads a whole v2 payload into memory, verified and decompressed.
pub(crate) fn read_payload_bytes(stream: &mut IoStream, header: &RepoHeader) -> Result<Vec<u8>> {
  if header.is_v1() {
    return Err(Errors::NotSupported);
  }
  let mut data = vec![0u8; header.payload_size as usize];
  stream.read_exact(&mut data)?;
  let mut digest = PayloadDigest::new();
  digest.update(&data);
  check_hash(header, &digest.finish())?;
  if header.flags.contains(ItemFlags::COMPRESSED) {
    data = compress::decompress(&data)?;
  }
  Ok(data)
}

impl DataVault {
  /// Loads one KEYS segment into the cache.
  ///
  /// The payload hash is checked before anything is parsed, and parsed
  /// items are only applied once the whole payload reads cleanly.
  /// `keep_offsets` lets `NOCACHE` values stay on disk; it must only be set
  /// when `stream` becomes this vault's primary stream.
  pub(crate) fn read_segment(
    &self,
    state: &mut VaultState,
    header: &RepoHeader,
    stream: &mut IoStream,
    mode: ImportMode,
    keep_offsets: bool,
  ) -> Result<()> {
    if header.payload_class != PayloadClass::Keys {
      return Err(Errors::NotSupported);
    }

    let items = if header.flags.contains(ItemFlags::COMPRESSED) {
      let data = read_payload_bytes(stream, header)?;
      let mut unpacked = IoStream::memory(StoreType::ReadOnly, Bytes::from(data));
      let len = unpacked.shared_buffer().map(|b| b.len()).unwrap_or(0);
      self.read_items(state, &mut unpacked, false, Some(len as u64), false)?
    } else if header.is_v1() {
      self.read_items(state, stream, true, None, keep_offsets)?
    } else {
      validate_payload(stream, header)?;
      self.read_items(
        state,
        stream,
        false,
        Some(header.payload_size as u64),
        keep_offsets,
      )?
    };

    let mut added = 0;
    for (record, value) in items {
      match mode {
        ImportMode::Copy => match state.cache.get_mut(&record.key) {
          Some(entry) => {
            entry.flags = record.flags;
            entry.ty = record.ty;
            entry.value = value;
          }
          None => {
            state
              .cache
              .insert_value(&record.key, record.ty, value, record.flags)?;
            added += 1;
          }
        },
        ImportMode::Merge => {
          if state.cache.search(&record.key).is_some() {
            continue;
          }
          state.cache.insert_value(
            &record.key,
            record.ty,
            value,
            record.flags - ItemFlags::PERSIST,
          )?;
          added += 1;
        }
      }
    }

    if mode == ImportMode::Copy {
      state.version = header.version;
      state.segment_id = header.segment_id.clone();
      state.comment = header.comment.clone();
      state.data_class = PayloadClass::Keys;
      if !header.is_v1() {
        state.hash = Some(PayloadHash {
          sha1: header.payload_hash,
          sha256: header.payload_sha256.unwrap_or_default(),
          len: header.payload_size as u64,
        });
      }
    } else if state.version.0 == 0 {
      state.version = header.version;
    }
    debug!(
      "{:?} segment {:?} v{} into {}: {} new keys",
      mode,
      header.segment_id,
      header.version,
      self.name(),
      added
    );
    Ok(())
  }

  /// Parses item records until the end of the payload.
  fn read_items(
    &self,
    state: &VaultState,
    stream: &mut IoStream,
    v1: bool,
    payload_size: Option<u64>,
    keep_offsets: bool,
  ) -> Result<Vec<(ItemRecord, CacheValue)>> {
    let start = stream.tell();
    let end = payload_size.map(|size| start + size);
    let is_static = state.flags.contains(ItemFlags::STATIC);
    let shared = stream.shared_buffer();
    let mut items = Vec::new();

    loop {
      let remaining = end.map(|e| e.saturating_sub(stream.tell()));
      let Some(mut record) = read_item(stream, v1, remaining)? else {
        break;
      };
      let offset = stream.tell();
      let len = record.value_len as usize;
      if is_static {
        record.flags -= ItemFlags::NOCACHE;
      }

      let value = if record.flags.contains(ItemFlags::NOCACHE) && keep_offsets {
        stream.seek(SeekFrom::Current(len as i64))?;
        CacheValue::OnDisk {
          offset,
          len: record.value_len,
        }
      } else {
        let raw = match &shared {
          Some(buf) if !record.flags.contains(ItemFlags::SCRAMBLE) => {
            let start = offset as usize;
            if start + len > buf.len() {
              return Err(Errors::IoError);
            }
            stream.seek(SeekFrom::Current(len as i64))?;
            buf.slice(start..start + len)
          }
          _ => {
            let mut data = vec![0u8; len];
            stream.read_exact(&mut data)?;
            if record.flags.contains(ItemFlags::SCRAMBLE) {
              crypto::scramble(&mut data);
            }
            Bytes::from(data)
          }
        };
        CacheValue::InMemory(raw)
      };
      items.push((record, value));
    }

    if let Some(end) = end {
      if stream.tell() != end {
        stream.seek(SeekFrom::Start(end))?;
      }
    }
    Ok(items)
  }

  /// Reloads the vault from `stream`, or from its own primary stream when
  /// `stream` is `None`, replacing keys that already exist.
  pub fn import_stream(&self, stream: Option<IoStream>) -> Result<()> {
    let mut state = self.state.write();
    let own = stream.is_none();
    let mut source = match stream {
      Some(s) => s,
      None => state.stream.take().ok_or(Errors::NotFound)?,
    };
    let keep_offsets = own && source.is_file();

    let result = self.import_locked(&mut state, &mut source, keep_offsets);
    source.close();
    if let Ok(true) = result {
      if own {
        info!("{} holds more than one segment, keeping it read-only", self.name());
        source.set_store(StoreType::ReadOnly);
      }
    }
    if own {
      state.stream = Some(source);
    }
    result.map(|_| ())
  }

  /// Returns whether further segments follow the first.
  fn import_locked(&self, state: &mut VaultState, source: &mut IoStream, keep_offsets: bool) -> Result<bool> {
    source.open()?;
    let header = match RepoHeader::read(source) {
      Ok(h) => h,
      Err(Errors::IterationDone) => return Err(Errors::NotFound),
      Err(e) => return Err(e),
    };
    self.read_segment(state, &header, source, ImportMode::Copy, keep_offsets)?;
    if header.is_v1() {
      return Ok(false);
    }
    Ok(RepoHeader::read(source).is_ok())
  }
}
