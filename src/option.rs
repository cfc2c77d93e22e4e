use bytes::Bytes;
use lazy_static::lazy_static;
use std::path::PathBuf;

lazy_static! {
  pub static ref DEFAULT_DIR_PATH: PathBuf = std::env::temp_dir().join("databank");
}

pub const DEFAULT_NAMESPACE: &str = "dptf";

#[derive(Debug, Clone)]
pub struct Options {
  /// Directory holding `*.dv` and `*.dvx` files.
  pub dir_path: PathBuf,

  pub default_namespace: String,

  /// Repositories compiled into the host, loaded read-only.
  pub static_vaults: Vec<StaticVault>,

  /// Extra repository files loaded after the static pass.
  pub repos: Vec<PathBuf>,

  pub compress_payloads: bool,

  /// Append a text line per SET/DELETE to `<dir_path>/<name>.log`.
  pub transaction_log: bool,

  pub lock_directory: bool,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      dir_path: DEFAULT_DIR_PATH.clone(),
      default_namespace: DEFAULT_NAMESPACE.to_string(),
      static_vaults: Vec::new(),
      repos: Vec::new(),
      compress_payloads: true,
      transaction_log: false,
      lock_directory: true,
    }
  }
}

/// A repository image that lives in memory for the life of the process.
#[derive(Debug, Clone)]
pub struct StaticVault {
  pub name: String,
  pub data: Bytes,
}

impl StaticVault {
  pub fn new(name: impl Into<String>, data: Bytes) -> Self {
    Self {
      name: name.into(),
      data,
    }
  }

  pub fn from_static(name: impl Into<String>, data: &'static [u8]) -> Self {
    Self::new(name, Bytes::from_static(data))
  }
}

/// Import semantics used when a segment is loaded into an existing vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
  /// Never replace existing keys; imported keys are not persisted.
  Merge,

  /// Always replace existing keys; the stream becomes the persisted source.
  Copy,
}
