use std::{path::Path, sync::Arc};

use bytes::Bytes;
use log::{debug, error, info, warn};

use crate::{
  bank::DataBank,
  data::{
    flags::ItemFlags,
    header::{PayloadClass, RepoHeader},
  },
  errors::{Errors, Result},
  fio::{
    stream::{IoStream, StoreType},
    FileSystem,
  },
  option::ImportMode,
  segment::{read_payload_bytes, skip_payload},
  util::file::{extension, file_stem, is_valid_name, DV_EXT},
  vault::DataVault,
};

/// A stream of one or more segments, each destined for a vault.
pub struct DataRepo {
  name: String,
  stream: IoStream,
  /// Whether a segment named like the repo may claim it as primary storage.
  primary_candidate: bool,
}

impl DataRepo {
  pub fn from_file(fs: Arc<dyn FileSystem>, path: &Path) -> Result<Self> {
    let name = file_stem(path).ok_or(Errors::InvalidName)?.to_string();
    let primary_candidate = match extension(path) {
      None => true,
      Some(ext) => ext == DV_EXT,
    };
    Ok(Self {
      name,
      stream: IoStream::file(fs, StoreType::ReadWrite, path, "rb"),
      primary_candidate,
    })
  }

  /// A repository image in memory. `Static` images become the read-only
  /// source of the vault they are named after.
  pub fn from_memory(name: &str, data: Bytes, store: StoreType) -> Self {
    Self {
      name: name.to_string(),
      stream: IoStream::memory(store, data),
      primary_candidate: store == StoreType::Static,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn read_header(&mut self) -> Result<RepoHeader> {
    RepoHeader::read(&mut self.stream)
  }

  fn is_static(&self) -> bool {
    self.stream.store() == StoreType::Static
  }

  fn claims(&self, vault: &DataVault, header: &RepoHeader, vault_has_primary: bool) -> bool {
    self.primary_candidate
      && !vault_has_primary
      && vault.name().eq_ignore_ascii_case(&self.name)
      && (header.segment_id.is_empty() || header.segment_id.eq_ignore_ascii_case(&self.name))
  }

  /// Loads every segment into the vault it names, opening vaults as needed.
  ///
  /// The segment named after the repo is loaded in `Copy` mode and the repo
  /// becomes that vault's primary stream; all others are merged. Segments of
  /// an unknown class are skipped, a bad segment is skipped when its size is
  /// known, and the first such failure is returned after the walk finishes.
  pub fn load_segments(mut self, bank: &DataBank) -> Result<usize> {
    self.stream.open()?;
    let is_static = self.is_static();
    let is_file = self.stream.is_file();
    let mut primary: Option<Arc<DataVault>> = None;
    let mut segments = 0;
    let mut first_error = None;

    loop {
      let header = match self.read_header() {
        Ok(h) => h,
        Err(Errors::IterationDone) => break,
        Err(e) => {
          error!("failed to read segment header in {}: {}", self.name, e);
          self.stream.close();
          return Err(e);
        }
      };
      segments += 1;

      let name = if header.segment_id.is_empty() {
        self.name.clone()
      } else {
        header.segment_id.clone()
      };
      if !is_valid_name(&name) {
        warn!("skipping segment with invalid name {:?}", name);
        skip_payload(&mut self.stream, &header)?;
        continue;
      }

      match header.payload_class {
        PayloadClass::Keys => {
          if let Err(e) = self.load_keys(bank, &name, &header, &mut primary) {
            first_error.get_or_insert(e);
            if header.is_v1() {
              break;
            }
          }
        }
        PayloadClass::Repo => {
          self.claim_repo_class(bank, &name, &header, &mut primary)?;
          match read_payload_bytes(&mut self.stream, &header) {
            Ok(data) => {
              let nested = DataRepo::from_memory(&name, Bytes::from(data), StoreType::ReadOnly);
              if let Err(e) = nested.load_segments(bank) {
                first_error.get_or_insert(e);
              }
            }
            Err(e) => {
              error!("failed to read nested repo {}: {}", name, e);
              first_error.get_or_insert(e);
            }
          }
        }
        PayloadClass::Unknown(_) => {
          info!(
            "skipping {} segment {} in {}",
            header.payload_class, name, self.name
          );
          skip_payload(&mut self.stream, &header)?;
        }
      }
      if header.is_v1() {
        break;
      }
    }

    self.stream.close();
    if let Some(vault) = primary {
      if is_file && segments > 1 {
        info!("{} holds {} segments, keeping it read-only", self.name, segments);
        self.stream.set_store(StoreType::ReadOnly);
      }
      let mut state = vault.state.write();
      if is_static {
        state.flags |= ItemFlags::STATIC | ItemFlags::READONLY;
      }
      state.stream = Some(self.stream);
    }

    debug!("loaded {} segments from {}", segments, self.name);
    match first_error {
      Some(e) => Err(e),
      None => Ok(segments),
    }
  }

  fn load_keys(
    &mut self,
    bank: &DataBank,
    name: &str,
    header: &RepoHeader,
    primary: &mut Option<Arc<DataVault>>,
  ) -> Result<()> {
    let existed = bank.get_vault(name).is_some();
    let vault = bank.open_vault(name)?;
    let payload_start = self.stream.tell();

    let result = {
      let mut state = vault.state.write();
      let is_static = self.is_static();
      if state.flags.contains(ItemFlags::STATIC) && !is_static {
        debug!("{} is static, ignoring segment from {}", name, self.name);
        drop(state);
        return skip_payload(&mut self.stream, header);
      }

      let has_primary = primary.is_some() || state.has_file_primary() || state.stream.is_some();
      let claim = self.claims(&vault, header, has_primary);
      if claim && is_static {
        state.flags |= ItemFlags::STATIC;
      }
      let mode = if claim { ImportMode::Copy } else { ImportMode::Merge };
      let keep_offsets = claim && self.stream.is_file();
      let result = vault.read_segment(&mut state, header, &mut self.stream, mode, keep_offsets);
      if result.is_ok() && claim {
        *primary = Some(vault.clone());
      }
      if result.is_err() && claim && is_static {
        state.flags -= ItemFlags::STATIC;
      }
      result
    };

    if let Err(e) = result {
      error!("failed to load segment {} from {}: {}", name, self.name, e);
      if !existed && vault.is_empty() {
        bank.close_vault(name);
      }
      if !header.is_v1() {
        let end = payload_start + header.payload_size as u64;
        self.stream.seek(std::io::SeekFrom::Start(end))?;
      }
      return Err(e);
    }
    Ok(())
  }

  /// A REPO segment named after its file keeps that file as the vault's
  /// primary, so a later `set_payload` rewrites it in place.
  fn claim_repo_class(
    &self,
    bank: &DataBank,
    name: &str,
    header: &RepoHeader,
    primary: &mut Option<Arc<DataVault>>,
  ) -> Result<()> {
    if !self.stream.is_file() || primary.is_some() || !name.eq_ignore_ascii_case(&self.name) {
      return Ok(());
    }
    let vault = bank.open_vault(name)?;
    let mut state = vault.state.write();
    if state.stream.is_some() || state.is_read_only() {
      return Ok(());
    }
    state.data_class = PayloadClass::Repo;
    state.version = header.version;
    state.comment = header.comment.clone();
    drop(state);
    *primary = Some(vault);
    Ok(())
  }
}
