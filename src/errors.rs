use std::result;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Errors {
  #[error("key or namespace not found")]
  NotFound,

  #[error("buffer too small, {required} bytes required")]
  NeedLargerBuffer { required: usize },

  #[error("vault or key is read-only")]
  ReadOnly,

  #[error("out of memory")]
  NoMemory,

  #[error("failed to read or write stream")]
  IoError,

  #[error("failed to open stream")]
  IoOpenFailed,

  #[error("failed to delete file")]
  IoDeleteFailed,

  #[error("payload hash does not match header")]
  HashMismatch,

  #[error("operation, format version or payload class not supported")]
  NotSupported,

  #[error("stored data type does not match requested type")]
  UnsupportedType,

  #[error("length field exceeds allowed bounds")]
  ParameterOutOfBounds,

  #[error("iteration done")]
  IterationDone,

  #[error("invalid namespace name")]
  InvalidName,

  #[error("vault directory is in use by another process")]
  DirectoryInUse,

  #[error("failed to create vault directory")]
  FailedToCreateDirectory,
}

pub type Result<T> = result::Result<T, Errors>;
