use std::io::SeekFrom;

use bytes::Bytes;
use log::{error, info, warn};

use crate::{
  compress,
  crypto::{self, PayloadDigest, PayloadHash},
  data::{
    flags::ItemFlags,
    header::{PayloadClass, RepoHeader, LATEST_VERSION, SEGMENT_ID_LEN},
    item::encode_item_header,
  },
  errors::{Errors, Result},
  fio::stream::{IoStream, StoreType},
  index::cache::CacheValue,
  util::file::{vault_file_path, with_suffix, DV_EXT, REPO_EXT, ROLLBACK_EXT, TEMP_EXT},
  vault::{DataVault, VaultState},
};

const COPY_CHUNK: usize = 64 * 1024;

/// Result of writing the temporary file, applied only once it is committed.
struct FlushOutcome {
  hash: PayloadHash,
  class: PayloadClass,
  /// New values for entries whose bytes now live at a different place.
  relocations: Vec<(usize, CacheValue)>,
}

impl DataVault {
  /// Writes every persisted key, or the given opaque payload, to the
  /// vault's primary file.
  ///
  /// The new image goes to `<file>.tmp` first. The current file is moved
  /// to `<file>.temp`, the new one takes its name, and the old one is
  /// removed. If the second rename fails the old file is moved back. The
  /// in-memory state only changes after the new file is in place.
  pub(crate) fn repo_flush(
    &self,
    state: &mut VaultState,
    payload: Option<(PayloadClass, &mut IoStream)>,
    compress: bool,
  ) -> Result<()> {
    if state.is_read_only() {
      return Err(Errors::ReadOnly);
    }
    if let Some(stream) = &state.stream {
      if stream.store() != StoreType::ReadWrite {
        return Err(Errors::ReadOnly);
      }
    }

    if !state.has_file_primary() {
      let ext = if payload.is_some() { REPO_EXT } else { DV_EXT };
      let path = vault_file_path(self.dir_path(), self.name(), ext);
      state.stream = Some(IoStream::file(
        self.fs.clone(),
        StoreType::ReadWrite,
        path,
        "rb",
      ));
    }
    let primary_path = match state.stream.as_ref().and_then(|s| s.path()) {
      Some(p) => p.to_path_buf(),
      None => return Err(Errors::IoOpenFailed),
    };
    let temp_path = with_suffix(&primary_path, TEMP_EXT);
    let rollback_path = with_suffix(&primary_path, ROLLBACK_EXT);

    let outcome = match self.write_image(state, &temp_path, payload, compress) {
      Ok(outcome) => outcome,
      Err(e) => {
        error!("failed to write {}: {}", temp_path.display(), e);
        let _ = self.fs.remove(&temp_path);
        return Err(e);
      }
    };

    if self.fs.exists(&rollback_path) {
      let _ = self.fs.remove(&rollback_path);
    }
    let had_primary = self.fs.exists(&primary_path);
    if had_primary {
      if let Err(e) = self.fs.rename(&primary_path, &rollback_path) {
        error!("failed to move {} aside: {}", primary_path.display(), e);
        let _ = self.fs.remove(&temp_path);
        return Err(Errors::IoError);
      }
    }
    if let Err(e) = self.fs.rename(&temp_path, &primary_path) {
      error!("failed to commit {}: {}", primary_path.display(), e);
      if had_primary {
        if let Err(e) = self.fs.rename(&rollback_path, &primary_path) {
          error!("failed to restore {}: {}", primary_path.display(), e);
        }
      }
      let _ = self.fs.remove(&temp_path);
      return Err(Errors::IoError);
    }
    if had_primary {
      if let Err(e) = self.fs.remove(&rollback_path) {
        warn!("failed to delete {}: {}", rollback_path.display(), e);
      }
    }

    for (index, value) in outcome.relocations {
      if let Some(entry) = state.cache.entry_at_mut(index) {
        entry.value = value;
      }
    }
    state.hash = Some(outcome.hash);
    state.data_class = outcome.class;
    state.version = LATEST_VERSION;
    info!(
      "flushed {} ({} payload bytes, sha1 {})",
      primary_path.display(),
      outcome.hash.len,
      outcome.hash.sha1_hex()
    );
    Ok(())
  }

  fn write_image(
    &self,
    state: &VaultState,
    temp_path: &std::path::Path,
    payload: Option<(PayloadClass, &mut IoStream)>,
    compress: bool,
  ) -> Result<FlushOutcome> {
    let mut out = IoStream::file(self.fs.clone(), StoreType::ReadWrite, temp_path, "wb");
    out.open().map_err(|e| match e {
      Errors::NotFound => Errors::IoOpenFailed,
      e => e,
    })?;

    let class = payload
      .as_ref()
      .map(|(class, _)| *class)
      .unwrap_or(PayloadClass::Keys);
    let header_flags = if compress && payload.is_some() {
      ItemFlags::COMPRESSED
    } else {
      ItemFlags::empty()
    };
    // a name that does not fit is recovered from the file name on load
    let segment_id = match state.segment_id.as_str() {
      "" if self.name().len() <= SEGMENT_ID_LEN => self.name(),
      id => id,
    };
    let mut header = RepoHeader::new(segment_id, &state.comment, header_flags, class);
    let header_len = header.encode().len() as u64;
    out.write_all(&header.encode())?;

    let mut digest = PayloadDigest::new();
    let mut relocations = Vec::new();

    match payload {
      Some((_, source)) => {
        let data = read_all(source)?;
        let data = if compress {
          compress::compress(&data)
        } else {
          data
        };
        digest.update(&data);
        out.write_all(&data)?;
      }
      None => {
        let mut pos = header_len;
        for (index, entry) in state.cache.entries().iter().enumerate() {
          if !entry.flags.contains(ItemFlags::PERSIST) {
            // offsets into the old file die with it
            if entry.value.is_on_disk() {
              let data = self.entry_bytes(state, entry)?;
              relocations.push((index, CacheValue::InMemory(data)));
            }
            continue;
          }

          let stored: Bytes = match &entry.value {
            CacheValue::InMemory(b) if entry.flags.contains(ItemFlags::SCRAMBLE) => {
              let mut buf = b.to_vec();
              crypto::scramble(&mut buf);
              Bytes::from(buf)
            }
            CacheValue::InMemory(b) => b.clone(),
            // already stored scrambled
            CacheValue::OnDisk { offset, len } => {
              let stream = state.stream.as_ref().ok_or(Errors::NotFound)?;
              stream.read_at(*offset, *len as usize)?
            }
          };
          let len = u32::try_from(stored.len()).map_err(|_| Errors::ParameterOutOfBounds)?;

          let item = encode_item_header(entry.flags, &entry.key, entry.ty, len);
          digest.update(&item);
          out.write_all(&item)?;
          pos += item.len() as u64;

          if entry.flags.contains(ItemFlags::NOCACHE) {
            relocations.push((index, CacheValue::OnDisk { offset: pos, len }));
          }
          digest.update(&stored);
          out.write_all(&stored)?;
          pos += stored.len() as u64;
        }
      }
    }

    let hash = digest.finish();
    header.payload_hash = hash.sha1;
    header.payload_sha256 = Some(hash.sha256);
    header.payload_size = u32::try_from(hash.len).map_err(|_| Errors::ParameterOutOfBounds)?;
    out.seek(SeekFrom::Start(0))?;
    out.write_all(&header.encode())?;
    out.sync()?;
    out.close();

    Ok(FlushOutcome {
      hash,
      class,
      relocations,
    })
  }
}

fn read_all(source: &mut IoStream) -> Result<Vec<u8>> {
  source.open()?;
  let mut data = Vec::new();
  let mut chunk = vec![0u8; COPY_CHUNK];
  loop {
    let n = source.read(&mut chunk);
    if n == 0 {
      break;
    }
    data.extend_from_slice(&chunk[..n]);
  }
  source.close();
  Ok(data)
}
