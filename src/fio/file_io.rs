use std::{
  fs::{self, OpenOptions},
  io,
  path::{Path, PathBuf},
};

use bytes::Bytes;
use memmap2::Mmap;

use super::{FileHandle, FileSystem, OpenMode};

/// Operating system backed file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
  fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>> {
    let file = OpenOptions::new()
      .read(mode.read)
      .write(mode.write && !mode.append)
      .append(mode.append)
      .truncate(mode.truncate)
      .create(mode.create)
      .open(path)?;
    Ok(Box::new(file))
  }

  fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
  }

  fn remove(&self, path: &Path) -> io::Result<()> {
    fs::remove_file(path)
  }

  fn exists(&self, path: &Path) -> bool {
    path.is_file()
  }

  fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
      if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
        files.push(entry.path());
      }
    }
    Ok(files)
  }

  fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
  }

  fn load(&self, path: &Path) -> io::Result<Bytes> {
    let file = OpenOptions::new().read(true).open(path)?;
    if file.metadata()?.len() == 0 {
      return Ok(Bytes::new());
    }
    // the mapping is dropped before anyone else can rewrite the file through this engine
    let map = unsafe { Mmap::map(&file)? };
    Ok(Bytes::copy_from_slice(&map))
  }
}
