use std::{
  io::{self, Read, Seek, SeekFrom, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use bytes::Bytes;
use log::error;

use crate::errors::{Errors, Result};

use super::{FileHandle, FileSystem, OpenMode};

/// Memory streams grow in multiples of this many bytes.
pub const BLOCK_SIZE: usize = 512;

/// Ownership of the bytes behind a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StoreType {
  /// Borrowed memory that is never freed or written.
  #[display("static")]
  Static,

  #[display("read-only")]
  ReadOnly,

  /// Owned and growable.
  #[display("read-write")]
  ReadWrite,
}

enum MemBuffer {
  Borrowed(Bytes),
  Owned(Vec<u8>),
}

impl MemBuffer {
  fn as_slice(&self) -> &[u8] {
    match self {
      MemBuffer::Borrowed(b) => b,
      MemBuffer::Owned(v) => v,
    }
  }
}

enum StreamKind {
  Null,
  File {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    mode: OpenMode,
    handle: Option<Box<dyn FileHandle>>,
  },
  Memory {
    buffer: MemBuffer,
    data_len: usize,
    offset: usize,
  },
}

/// Byte stream over a file or an in-memory buffer.
pub struct IoStream {
  store: StoreType,
  kind: StreamKind,
}

impl Default for IoStream {
  fn default() -> Self {
    Self::new()
  }
}

fn round_up_block(len: usize) -> usize {
  len.div_ceil(BLOCK_SIZE).max(1) * BLOCK_SIZE
}

impl IoStream {
  pub fn new() -> Self {
    Self {
      store: StoreType::ReadOnly,
      kind: StreamKind::Null,
    }
  }

  pub fn file<P: AsRef<Path>>(
    fs: Arc<dyn FileSystem>,
    store: StoreType,
    path: P,
    mode: &str,
  ) -> Self {
    let mut stream = Self::new();
    stream.set_file(fs, store, path, mode);
    stream
  }

  pub fn memory(store: StoreType, buffer: Bytes) -> Self {
    let mut stream = Self::new();
    stream.set_memory(store, buffer);
    stream
  }

  pub fn set_file<P: AsRef<Path>>(
    &mut self,
    fs: Arc<dyn FileSystem>,
    store: StoreType,
    path: P,
    mode: &str,
  ) {
    self.close();
    self.store = store;
    self.kind = StreamKind::File {
      fs,
      path: path.as_ref().to_path_buf(),
      mode: OpenMode::parse(mode),
      handle: None,
    };
  }

  /// Read-write memory gets its own block-rounded copy of `buffer`,
  /// every other store type shares it.
  pub fn set_memory(&mut self, store: StoreType, buffer: Bytes) {
    self.close();
    self.store = store;
    let data_len = buffer.len();
    let buffer = match store {
      StoreType::ReadWrite => {
        let mut owned = Vec::with_capacity(round_up_block(data_len));
        owned.extend_from_slice(&buffer);
        MemBuffer::Owned(owned)
      }
      _ => MemBuffer::Borrowed(buffer),
    };
    self.kind = StreamKind::Memory {
      buffer,
      data_len,
      offset: 0,
    };
  }

  pub fn store(&self) -> StoreType {
    self.store
  }

  pub fn set_store(&mut self, store: StoreType) {
    self.store = store;
  }

  pub fn is_file(&self) -> bool {
    matches!(self.kind, StreamKind::File { .. })
  }

  pub fn is_memory(&self) -> bool {
    matches!(self.kind, StreamKind::Memory { .. })
  }

  pub fn path(&self) -> Option<&Path> {
    match &self.kind {
      StreamKind::File { path, .. } => Some(path),
      _ => None,
    }
  }

  /// Shared handle on the bytes of a static or read-only memory stream.
  pub fn shared_buffer(&self) -> Option<Bytes> {
    match &self.kind {
      StreamKind::Memory {
        buffer: MemBuffer::Borrowed(b),
        data_len,
        ..
      } => Some(b.slice(..*data_len)),
      _ => None,
    }
  }

  /// Copies out the valid bytes of a memory stream.
  pub fn to_bytes(&self) -> Option<Bytes> {
    match &self.kind {
      StreamKind::Memory {
        buffer: MemBuffer::Borrowed(b),
        data_len,
        ..
      } => Some(b.slice(..*data_len)),
      StreamKind::Memory {
        buffer, data_len, ..
      } => Some(Bytes::copy_from_slice(&buffer.as_slice()[..*data_len])),
      _ => None,
    }
  }

  pub fn open(&mut self) -> Result<()> {
    let store = self.store;
    match &mut self.kind {
      StreamKind::Null => Err(Errors::IoOpenFailed),
      StreamKind::File {
        fs,
        path,
        mode,
        handle,
      } => {
        if mode.is_write() && store != StoreType::ReadWrite {
          return Err(Errors::ReadOnly);
        }
        *handle = None;
        match fs.open(path, *mode) {
          Ok(file) => {
            *handle = Some(file);
            Ok(())
          }
          Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Errors::NotFound),
          Err(e) => {
            error!("failed to open {}: {}", path.display(), e);
            Err(Errors::IoOpenFailed)
          }
        }
      }
      StreamKind::Memory { offset, .. } => {
        *offset = 0;
        Ok(())
      }
    }
  }

  pub fn close(&mut self) {
    if let StreamKind::File { handle, .. } = &mut self.kind {
      *handle = None;
    }
  }

  /// Returns the number of bytes read; short at end of stream.
  pub fn read(&mut self, buf: &mut [u8]) -> usize {
    match &mut self.kind {
      StreamKind::Null => 0,
      StreamKind::File { handle, path, .. } => {
        let Some(file) = handle.as_mut() else {
          return 0;
        };
        let mut total = 0;
        while total < buf.len() {
          match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
              error!("failed to read {}: {}", path.display(), e);
              break;
            }
          }
        }
        total
      }
      StreamKind::Memory {
        buffer,
        data_len,
        offset,
      } => {
        if *offset >= *data_len {
          return 0;
        }
        let n = buf.len().min(*data_len - *offset);
        buf[..n].copy_from_slice(&buffer.as_slice()[*offset..*offset + n]);
        *offset += n;
        n
      }
    }
  }

  /// Returns the number of bytes written; always 0 unless the store is read-write.
  pub fn write(&mut self, buf: &[u8]) -> usize {
    if self.store != StoreType::ReadWrite {
      return 0;
    }
    match &mut self.kind {
      StreamKind::Null => 0,
      StreamKind::File { handle, path, .. } => {
        let Some(file) = handle.as_mut() else {
          return 0;
        };
        match file.write_all(buf) {
          Ok(()) => buf.len(),
          Err(e) => {
            error!("failed to write {}: {}", path.display(), e);
            0
          }
        }
      }
      StreamKind::Memory {
        buffer,
        data_len,
        offset,
      } => {
        let MemBuffer::Owned(owned) = buffer else {
          return 0;
        };
        let end = *offset + buf.len();
        if end > owned.capacity() {
          let wanted = round_up_block(end);
          if owned.try_reserve_exact(wanted - owned.len()).is_err() {
            return 0;
          }
        }
        if owned.len() < end {
          owned.resize(end, 0);
        }
        owned[*offset..end].copy_from_slice(buf);
        *offset = end;
        *data_len = (*data_len).max(end);
        buf.len()
      }
    }
  }

  pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
    if self.read(buf) != buf.len() {
      return Err(Errors::IoError);
    }
    Ok(())
  }

  pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
    if self.write(buf) != buf.len() {
      return Err(Errors::IoError);
    }
    Ok(())
  }

  /// Memory streams may be positioned past their data, file streams are
  /// limited to the signed 64-bit range.
  pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
    match &mut self.kind {
      StreamKind::Null => Err(Errors::IoError),
      StreamKind::File { handle, path, .. } => {
        if let SeekFrom::Start(off) = pos {
          if off > i64::MAX as u64 {
            return Err(Errors::ParameterOutOfBounds);
          }
        }
        let Some(file) = handle.as_mut() else {
          return Err(Errors::IoError);
        };
        file.seek(pos).map_err(|e| {
          error!("failed to seek {}: {}", path.display(), e);
          Errors::IoError
        })
      }
      StreamKind::Memory {
        data_len, offset, ..
      } => {
        let target: i128 = match pos {
          SeekFrom::Start(off) => off as i128,
          SeekFrom::Current(delta) => *offset as i128 + delta as i128,
          SeekFrom::End(delta) => *data_len as i128 + delta as i128,
        };
        if target < 0 || target > usize::MAX as i128 {
          return Err(Errors::ParameterOutOfBounds);
        }
        *offset = target as usize;
        Ok(*offset as u64)
      }
    }
  }

  pub fn tell(&mut self) -> u64 {
    match &mut self.kind {
      StreamKind::Null => 0,
      StreamKind::File { handle, .. } => handle
        .as_mut()
        .and_then(|f| f.stream_position().ok())
        .unwrap_or(0),
      StreamKind::Memory { offset, .. } => *offset as u64,
    }
  }

  pub fn sync(&mut self) -> Result<()> {
    if let StreamKind::File {
      handle: Some(file),
      path,
      ..
    } = &mut self.kind
    {
      file.sync().map_err(|e| {
        error!("failed to sync {}: {}", path.display(), e);
        Errors::IoError
      })?;
    }
    Ok(())
  }

  /// Reads `len` bytes at `offset` without disturbing the stream position.
  /// File streams are read through a fresh handle.
  pub fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
    match &self.kind {
      StreamKind::Null => Err(Errors::NotFound),
      StreamKind::File { fs, path, .. } => {
        let mut file = fs.open(path, OpenMode::parse("rb")).map_err(|e| {
          if e.kind() == io::ErrorKind::NotFound {
            Errors::NotFound
          } else {
            error!("failed to open {}: {}", path.display(), e);
            Errors::IoOpenFailed
          }
        })?;
        let mut buf = vec![0u8; len];
        file
          .seek(SeekFrom::Start(offset))
          .and_then(|_| file.read_exact(&mut buf))
          .map_err(|e| {
            error!("failed to read block at {} of {}: {}", offset, path.display(), e);
            Errors::IoError
          })?;
        Ok(Bytes::from(buf))
      }
      StreamKind::Memory {
        buffer, data_len, ..
      } => {
        let start = usize::try_from(offset).map_err(|_| Errors::ParameterOutOfBounds)?;
        let end = start.checked_add(len).ok_or(Errors::ParameterOutOfBounds)?;
        if end > *data_len {
          return Err(Errors::IoError);
        }
        match buffer {
          MemBuffer::Borrowed(b) => Ok(b.slice(start..end)),
          MemBuffer::Owned(v) => Ok(Bytes::copy_from_slice(&v[start..end])),
        }
      }
    }
  }
}

impl std::fmt::Debug for IoStream {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.kind {
      StreamKind::Null => write!(f, "IoStream::Null"),
      StreamKind::File { path, .. } => {
        write!(f, "IoStream::File({}, {})", path.display(), self.store)
      }
      StreamKind::Memory { data_len, .. } => {
        write!(f, "IoStream::Memory({} bytes, {})", data_len, self.store)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fio::default_file_system;

  #[test]
  fn test_memory_read_write_seek() {
    let mut stream = IoStream::memory(StoreType::ReadWrite, Bytes::from_static(b"abc"));
    stream.open().unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(stream.read(&mut buf), 3);
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(stream.read(&mut buf), 0);

    assert_eq!(stream.write(b"def"), 3);
    assert_eq!(stream.tell(), 6);
    assert_eq!(stream.to_bytes().unwrap(), Bytes::from_static(b"abcdef"));

    // seeking past the end is legal and writes zero-fill the gap
    assert_eq!(stream.seek(SeekFrom::Start(600)).unwrap(), 600);
    assert_eq!(stream.write(b"z"), 1);
    let data = stream.to_bytes().unwrap();
    assert_eq!(data.len(), 601);
    assert_eq!(data[6], 0);
    assert_eq!(data[600], b'z');
  }

  #[test]
  fn test_memory_static_rejects_writes() {
    let mut stream = IoStream::memory(StoreType::Static, Bytes::from_static(b"static"));
    stream.open().unwrap();
    assert_eq!(stream.write(b"x"), 0);
    assert!(stream.write_all(b"x").is_err());
    assert_eq!(stream.shared_buffer().unwrap(), Bytes::from_static(b"static"));
  }

  #[test]
  fn test_memory_read_at() {
    let stream = IoStream::memory(StoreType::ReadOnly, Bytes::from_static(b"0123456789"));
    assert_eq!(stream.read_at(2, 3).unwrap(), Bytes::from_static(b"234"));
    assert_eq!(stream.read_at(8, 5).unwrap_err(), Errors::IoError);
  }

  #[test]
  fn test_null_stream_fails_open() {
    let mut stream = IoStream::new();
    assert_eq!(stream.open().unwrap_err(), Errors::IoOpenFailed);
    assert_eq!(stream.read(&mut [0u8; 4]), 0);
  }

  #[test]
  fn test_file_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.bin");
    let fs = default_file_system();

    let mut ro = IoStream::file(fs.clone(), StoreType::ReadOnly, &path, "wb");
    assert_eq!(ro.open().unwrap_err(), Errors::ReadOnly);

    let mut missing = IoStream::file(fs.clone(), StoreType::ReadOnly, &path, "rb");
    assert_eq!(missing.open().unwrap_err(), Errors::NotFound);

    let mut w = IoStream::file(fs.clone(), StoreType::ReadWrite, &path, "wb");
    w.open().unwrap();
    w.write_all(b"hello world").unwrap();
    w.sync().unwrap();
    w.close();

    let mut r = IoStream::file(fs.clone(), StoreType::ReadOnly, &path, "rb");
    r.open().unwrap();
    assert_eq!(r.write(b"nope"), 0);
    r.seek(SeekFrom::Start(6)).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(r.read(&mut buf), 5);
    assert_eq!(&buf[..5], b"world");
    assert_eq!(r.read_at(0, 5).unwrap(), Bytes::from_static(b"hello"));
  }
}
