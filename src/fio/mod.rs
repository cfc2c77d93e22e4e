pub mod file_io;
pub mod stream;

use std::{
  fs::File,
  io::{self, Read, Seek, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use bytes::Bytes;

use self::file_io::StdFileSystem;

/// An open file as seen by the storage engine.
pub trait FileHandle: Read + Write + Seek + Send + Sync {
  fn sync(&mut self) -> io::Result<()>;
}

impl FileHandle for File {
  fn sync(&mut self) -> io::Result<()> {
    self.sync_all()
  }
}

/// Abstract file system the vaults persist through.
pub trait FileSystem: Sync + Send {
  fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>>;

  fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

  fn remove(&self, path: &Path) -> io::Result<()>;

  fn exists(&self, path: &Path) -> bool;

  /// Lists the regular files directly under `dir`.
  fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

  fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

  /// Reads a whole file into memory.
  fn load(&self, path: &Path) -> io::Result<Bytes> {
    let mut file = self.open(path, OpenMode::parse("rb"))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
  }
}

pub fn default_file_system() -> Arc<dyn FileSystem> {
  Arc::new(StdFileSystem)
}

/// `fopen`-style open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
  pub read: bool,
  pub write: bool,
  pub append: bool,
  pub truncate: bool,
  pub create: bool,
}

impl OpenMode {
  /// Parses `r`, `w`, `a` with optional `+` and `b`; anything else reads.
  pub fn parse(mode: &str) -> Self {
    let plus = mode.contains('+');
    match mode.chars().next() {
      Some('w') => OpenMode {
        read: plus,
        write: true,
        truncate: true,
        create: true,
        ..Default::default()
      },
      Some('a') => OpenMode {
        read: plus,
        write: true,
        append: true,
        create: true,
        ..Default::default()
      },
      _ => OpenMode {
        read: true,
        write: plus,
        ..Default::default()
      },
    }
  }

  pub fn is_write(&self) -> bool {
    self.write || self.append
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_open_mode_parse() {
    let rb = OpenMode::parse("rb");
    assert!(rb.read && !rb.is_write());

    let wb = OpenMode::parse("wb");
    assert!(wb.write && wb.truncate && wb.create && !wb.read);

    let ab = OpenMode::parse("ab");
    assert!(ab.append && ab.is_write());

    let rp = OpenMode::parse("r+b");
    assert!(rp.read && rp.write && !rp.truncate);
  }
}
