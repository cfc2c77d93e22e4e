use std::{
  cmp::Ordering,
  fs::{File, OpenOptions},
  path::{Path, PathBuf},
  sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc,
  },
};

use fs2::FileExt;
use log::{error, info, warn};
use parking_lot::RwLock;

use crate::{
  errors::{Errors, Result},
  fio::{default_file_system, stream::StoreType, FileSystem},
  index::cmp_ignore_case,
  option::Options,
  repo::DataRepo,
  util::file::{extension, is_valid_name, DV_EXT, REPO_EXT, ROLLBACK_EXT, TEMP_EXT},
  vault::DataVault,
};

const LOCK_FILE_NAME: &str = "databank.lock";

/// The vault list grows and shrinks in steps of this many slots.
const GROW_CHUNK: usize = 5;

/// Registry of open vaults, sorted case-insensitively by name.
pub struct DataBank {
  pub(crate) options: Options,
  pub(crate) fs: Arc<dyn FileSystem>,
  elements: RwLock<Vec<Arc<DataVault>>>,
  default_namespace: RwLock<String>,
  static_loaded: AtomicBool,
  #[allow(dead_code)]
  lock_file: Option<File>,
}

impl DataBank {
  /// Opens the bank on the local file system and loads every vault found.
  pub fn open(options: Options) -> Result<Self> {
    Self::open_with_fs(options, default_file_system())
  }

  pub fn open_with_fs(options: Options, fs: Arc<dyn FileSystem>) -> Result<Self> {
    if !is_valid_name(&options.default_namespace) {
      return Err(Errors::InvalidName);
    }
    let dir_path = options.dir_path.clone();
    if !fs.exists(&dir_path) {
      if let Err(e) = fs.create_dir_all(&dir_path) {
        error!("failed to create {}: {}", dir_path.display(), e);
        return Err(Errors::FailedToCreateDirectory);
      }
    }

    let lock_file = if options.lock_directory {
      Some(lock_directory(&dir_path)?)
    } else {
      None
    };

    let bank = Self {
      default_namespace: RwLock::new(options.default_namespace.clone()),
      options,
      fs,
      elements: RwLock::new(Vec::with_capacity(GROW_CHUNK)),
      static_loaded: AtomicBool::new(false),
      lock_file,
    };
    bank.load_data_vaults();
    info!(
      "databank opened at {} with {} vaults",
      dir_path.display(),
      bank.len()
    );
    Ok(bank)
  }

  /// Closes every vault and releases the directory lock.
  pub fn close(self) {
    drop(self)
  }

  pub fn dir_path(&self) -> &Path {
    &self.options.dir_path
  }

  pub fn default_namespace(&self) -> String {
    self.default_namespace.read().clone()
  }

  pub fn set_default_namespace(&self, name: &str) -> Result<()> {
    if !is_valid_name(name) {
      return Err(Errors::InvalidName);
    }
    *self.default_namespace.write() = name.to_string();
    Ok(())
  }

  pub(crate) fn resolve_namespace(&self, namespace: Option<&str>) -> String {
    match namespace {
      Some(ns) if !ns.is_empty() => ns.to_string(),
      _ => self.default_namespace(),
    }
  }

  pub fn len(&self) -> usize {
    self.elements.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.elements.read().is_empty()
  }

  pub fn vault_names(&self) -> Vec<String> {
    self
      .elements
      .read()
      .iter()
      .map(|v| v.name().to_string())
      .collect()
  }

  pub fn static_loaded(&self) -> bool {
    self.static_loaded.load(AtomicOrdering::Acquire)
  }

  fn position(elements: &[Arc<DataVault>], name: &str) -> std::result::Result<usize, usize> {
    elements.binary_search_by(|v| cmp_ignore_case(v.name(), name))
  }

  pub fn get_vault(&self, name: &str) -> Option<Arc<DataVault>> {
    let elements = self.elements.read();
    Self::position(&elements, name)
      .ok()
      .map(|i| elements[i].clone())
  }

  /// Returns the named vault, creating an empty one if needed.
  pub fn open_vault(&self, name: &str) -> Result<Arc<DataVault>> {
    if !is_valid_name(name) {
      return Err(Errors::InvalidName);
    }
    let mut elements = self.elements.write();
    let index = match Self::position(&elements, name) {
      Ok(i) => return Ok(elements[i].clone()),
      Err(i) => i,
    };

    if elements.len() == elements.capacity() {
      elements
        .try_reserve_exact(GROW_CHUNK)
        .map_err(|_| Errors::NoMemory)?;
    }
    let vault = Arc::new(DataVault::new(
      name,
      &self.options.dir_path,
      self.fs.clone(),
      self.options.transaction_log,
    ));
    elements.insert(index, vault.clone());
    Ok(vault)
  }

  /// Removes the vault from the bank. Handles already given out stay usable.
  pub fn close_vault(&self, name: &str) -> bool {
    let mut elements = self.elements.write();
    let Ok(index) = Self::position(&elements, name) else {
      return false;
    };
    elements.remove(index);
    let wanted = elements.len().div_ceil(GROW_CHUNK).max(1) * GROW_CHUNK;
    if elements.capacity() > wanted {
      elements.shrink_to(wanted);
    }
    true
  }

  /// Loads a repository file, merging its segments into their vaults.
  pub fn load_repo<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
    DataRepo::from_file(self.fs.clone(), path.as_ref())?.load_segments(self)
  }

  fn load_data_vaults(&self) {
    self.rollback_pass();
    self.static_pass();
    self.specified_pass();
    self.file_pass();
  }

  /// Restores primaries whose flush was interrupted and deletes leftovers.
  fn rollback_pass(&self) {
    let dir = &self.options.dir_path;
    let entries = match self.fs.list(dir) {
      Ok(entries) => entries,
      Err(e) => {
        warn!("failed to list {}: {}", dir.display(), e);
        return;
      }
    };

    for path in entries {
      let ext = extension(&path);
      let is_rollback = ext.as_deref() == Some(ROLLBACK_EXT);
      if !is_rollback && ext.as_deref() != Some(TEMP_EXT) {
        continue;
      }
      let target = path.with_extension("");
      if is_rollback && !self.fs.exists(&target) {
        match self.fs.rename(&path, &target) {
          Ok(()) => info!("recovered {} from {}", target.display(), path.display()),
          Err(e) => error!("failed to recover {}: {}", target.display(), e),
        }
        continue;
      }
      if let Err(e) = self.fs.remove(&path) {
        warn!("failed to delete {}: {}", path.display(), e);
      }
    }
  }

  fn static_pass(&self) {
    for image in &self.options.static_vaults {
      let repo = DataRepo::from_memory(&image.name, image.data.clone(), StoreType::Static);
      if let Err(e) = repo.load_segments(self) {
        error!("failed to load static vault {}: {}", image.name, e);
      }
    }
    self.static_loaded.store(true, AtomicOrdering::Release);
  }

  fn specified_pass(&self) {
    for path in &self.options.repos {
      if let Err(e) = self.load_repo(path) {
        error!("failed to load repo {}: {}", path.display(), e);
      }
    }
  }

  /// Loads `*.dv` files, then `*.dvx` files, each in name order.
  fn file_pass(&self) {
    let dir = &self.options.dir_path;
    let entries = match self.fs.list(dir) {
      Ok(entries) => entries,
      Err(e) => {
        warn!("failed to list {}: {}", dir.display(), e);
        return;
      }
    };

    for ext in [DV_EXT, REPO_EXT] {
      let mut files: Vec<&PathBuf> = entries
        .iter()
        .filter(|p| extension(p).as_deref() == Some(ext))
        .collect();
      files.sort_by(|a, b| file_name_order(a, b));
      for path in files {
        if let Err(e) = self.load_repo(path) {
          error!("failed to load {}: {}", path.display(), e);
        }
      }
    }
  }
}

impl Drop for DataBank {
  fn drop(&mut self) {
    let mut elements = self.elements.write();
    let count = elements.len();
    elements.clear();
    info!("databank closed, released {} vaults", count);
  }
}

fn file_name_order(a: &Path, b: &Path) -> Ordering {
  let a = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
  let b = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
  cmp_ignore_case(&a, &b)
}

// fs2 locks need a real std File, so this bypasses the bank's FileSystem
fn lock_directory(dir_path: &Path) -> Result<File> {
  let file = OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(dir_path.join(LOCK_FILE_NAME))
    .map_err(|e| {
      error!("failed to open lock file in {}: {}", dir_path.display(), e);
      Errors::IoOpenFailed
    })?;
  file
    .try_lock_exclusive()
    .map_err(|_| Errors::DirectoryInUse)?;
  Ok(file)
}
