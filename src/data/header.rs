use std::{fmt, io::SeekFrom};

use bytes::{Buf, BufMut, BytesMut};
use log::warn;

use crate::{
  data::flags::ItemFlags,
  errors::{Errors, Result},
  fio::stream::IoStream,
};

pub const SIGNATURE: u16 = 0xE51F;

pub const SEGMENT_ID_LEN: usize = 32;
pub const COMMENT_LEN: usize = 64;
pub const SHA1_LEN: usize = 20;
pub const SHA256_LEN: usize = 32;

/// signature + headersize + version
const PREFIX_SIZE: usize = 8;
pub const V1_HEADER_SIZE: usize = 12;
pub const V2_HEADER_SIZE: usize =
  V1_HEADER_SIZE + SEGMENT_ID_LEN + COMMENT_LEN + SHA1_LEN + 4 + 4;
/// Version 2.1 appends a SHA256 of the payload.
pub const V2_1_HEADER_SIZE: usize = V2_HEADER_SIZE + SHA256_LEN;
pub const MAX_HEADER_SIZE: usize = 4096;

pub const LATEST_VERSION: Version = Version::new(2, 1, 0);

/// Packed `major.minor.revision` file format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version(pub u32);

impl Version {
  pub const fn new(major: u8, minor: u8, revision: u16) -> Self {
    Version(((major as u32) << 24) | ((minor as u32) << 16) | revision as u32)
  }

  pub fn major(&self) -> u8 {
    (self.0 >> 24) as u8
  }

  pub fn minor(&self) -> u8 {
    (self.0 >> 16) as u8
  }

  pub fn revision(&self) -> u16 {
    self.0 as u16
  }

  pub fn is_supported(&self) -> bool {
    matches!(self.major(), 1 | 2)
  }

  /// Number of header bytes this reader understands for the version.
  fn known_header_size(&self) -> usize {
    match (self.major(), self.minor()) {
      (1, _) => V1_HEADER_SIZE,
      (2, 0) => V2_HEADER_SIZE,
      _ => V2_1_HEADER_SIZE,
    }
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major(), self.minor(), self.revision())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum PayloadClass {
  /// Flat list of key/value items.
  #[default]
  #[display("KEYS")]
  Keys,

  /// Nested repository of further segments.
  #[display("REPO")]
  Repo,

  #[display("{:08X}", _0)]
  Unknown(u32),
}

impl PayloadClass {
  pub fn code(&self) -> u32 {
    match self {
      PayloadClass::Keys => u32::from_le_bytes(*b"KEYS"),
      PayloadClass::Repo => u32::from_le_bytes(*b"REPO"),
      PayloadClass::Unknown(c) => *c,
    }
  }

  pub fn from_code(code: u32) -> Self {
    match &code.to_le_bytes() {
      b"KEYS" => PayloadClass::Keys,
      b"REPO" => PayloadClass::Repo,
      _ => PayloadClass::Unknown(code),
    }
  }
}

/// One segment header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepoHeader {
  pub header_size: u16,
  pub version: Version,
  pub flags: ItemFlags,
  pub segment_id: String,
  pub comment: String,
  pub payload_hash: [u8; SHA1_LEN],
  pub payload_sha256: Option<[u8; SHA256_LEN]>,
  pub payload_size: u32,
  pub payload_class: PayloadClass,
}

fn put_padded(buf: &mut BytesMut, s: &str, len: usize, pad: u8) {
  let mut n = s.len().min(len);
  while !s.is_char_boundary(n) {
    n -= 1;
  }
  buf.put_slice(&s.as_bytes()[..n]);
  buf.put_bytes(pad, len - n);
}

fn get_padded(buf: &mut &[u8], len: usize) -> String {
  let raw = &buf[..len];
  buf.advance(len);
  let end = raw.iter().position(|b| *b == 0).unwrap_or(len);
  String::from_utf8_lossy(&raw[..end])
    .trim_end_matches(' ')
    .to_string()
}

impl RepoHeader {
  /// A fresh header at the latest version with a zeroed hash and size.
  pub fn new(segment_id: &str, comment: &str, flags: ItemFlags, class: PayloadClass) -> Self {
    Self {
      header_size: V2_1_HEADER_SIZE as u16,
      version: LATEST_VERSION,
      flags,
      segment_id: segment_id.to_string(),
      comment: comment.to_string(),
      payload_hash: [0; SHA1_LEN],
      payload_sha256: Some([0; SHA256_LEN]),
      payload_size: 0,
      payload_class: class,
    }
  }

  pub fn is_v1(&self) -> bool {
    self.version.major() == 1
  }

  /// Encodes the header for its own version; fields the version lacks are dropped.
  pub fn encode(&self) -> BytesMut {
    let size = self.version.known_header_size();
    let mut buf = BytesMut::with_capacity(size);
    buf.put_u16_le(SIGNATURE);
    buf.put_u16_le(size as u16);
    buf.put_u32_le(self.version.0);
    buf.put_u32_le(self.flags.bits());
    if self.is_v1() {
      return buf;
    }
    put_padded(&mut buf, &self.segment_id, SEGMENT_ID_LEN, b' ');
    put_padded(&mut buf, &self.comment, COMMENT_LEN, 0);
    buf.put_slice(&self.payload_hash);
    buf.put_u32_le(self.payload_size);
    buf.put_u32_le(self.payload_class.code());
    if size >= V2_1_HEADER_SIZE {
      buf.put_slice(&self.payload_sha256.unwrap_or([0; SHA256_LEN]));
    }
    buf
  }

  /// Reads a header at the stream's position. A clean end of stream before
  /// the first byte yields `IterationDone`.
  pub fn read(stream: &mut IoStream) -> Result<RepoHeader> {
    let mut prefix = [0u8; PREFIX_SIZE];
    let n = stream.read(&mut prefix);
    if n == 0 {
      return Err(Errors::IterationDone);
    }
    if n != PREFIX_SIZE {
      return Err(Errors::IoError);
    }

    let mut p = &prefix[..];
    let signature = p.get_u16_le();
    let header_size = p.get_u16_le();
    let version = Version(p.get_u32_le());

    if signature != SIGNATURE {
      warn!("bad segment signature {signature:04X}");
      return Err(Errors::NotSupported);
    }
    if !version.is_supported() {
      warn!("unsupported segment version {version}");
      return Err(Errors::NotSupported);
    }
    let known = version.known_header_size();
    let minimum = if version.major() == 1 {
      V1_HEADER_SIZE
    } else {
      V2_HEADER_SIZE
    };
    let header_size_usize = header_size as usize;
    if header_size_usize < minimum || header_size_usize > MAX_HEADER_SIZE {
      return Err(Errors::ParameterOutOfBounds);
    }

    // read as much of the rest as this reader understands
    let to_read = header_size_usize.min(known) - PREFIX_SIZE;
    let mut rest = vec![0u8; to_read];
    stream.read_exact(&mut rest)?;
    let mut r = &rest[..];

    let mut header = RepoHeader {
      header_size,
      version,
      flags: ItemFlags::from_bits_retain(r.get_u32_le()),
      ..Default::default()
    };

    if version.major() >= 2 {
      header.segment_id = get_padded(&mut r, SEGMENT_ID_LEN);
      header.comment = get_padded(&mut r, COMMENT_LEN);
      r.copy_to_slice(&mut header.payload_hash);
      header.payload_size = r.get_u32_le();
      header.payload_class = PayloadClass::from_code(r.get_u32_le());
      if r.remaining() >= SHA256_LEN {
        let mut sha = [0u8; SHA256_LEN];
        r.copy_to_slice(&mut sha);
        header.payload_sha256 = Some(sha);
      }
    }

    // skip trailing bytes from newer minor revisions
    if header_size_usize > known {
      stream.seek(SeekFrom::Current((header_size_usize - known) as i64))?;
    }
    Ok(header)
  }
}
