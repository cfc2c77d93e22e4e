//! Payload digests, value scrambling and base64 rendering.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::data::header::{SHA1_LEN, SHA256_LEN};

/// Streaming SHA1 + SHA256 over a segment payload.
#[derive(Clone, Default)]
pub struct PayloadDigest {
  sha1: Sha1,
  sha256: Sha256,
  len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHash {
  pub sha1: [u8; SHA1_LEN],
  pub sha256: [u8; SHA256_LEN],
  pub len: u64,
}

impl PayloadDigest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn update(&mut self, data: &[u8]) {
    self.sha1.update(data);
    self.sha256.update(data);
    self.len += data.len() as u64;
  }

  pub fn finish(self) -> PayloadHash {
    let mut hash = PayloadHash {
      sha1: [0; SHA1_LEN],
      sha256: [0; SHA256_LEN],
      len: self.len,
    };
    hash.sha1.copy_from_slice(&self.sha1.finalize());
    hash.sha256.copy_from_slice(&self.sha256.finalize());
    hash
  }
}

impl PayloadHash {
  pub fn sha1_hex(&self) -> String {
    self.sha1.iter().map(|b| format!("{b:02x}")).collect()
  }
}

/// Bitwise complement in place; applying it twice restores the input.
pub fn scramble(buf: &mut [u8]) {
  for b in buf.iter_mut() {
    *b = !*b;
  }
}

pub fn to_base64(data: &[u8]) -> String {
  STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_digest_known_vectors() {
    let mut d = PayloadDigest::new();
    d.update(b"ab");
    d.update(b"c");
    let h = d.finish();
    assert_eq!(h.len, 3);
    assert_eq!(h.sha1_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    assert_eq!(h.sha256[..4], [0xba, 0x78, 0x16, 0xbf]);
  }

  #[test]
  fn test_scramble_is_involution() {
    let orig = b"secret value".to_vec();
    let mut buf = orig.clone();
    scramble(&mut buf);
    assert_ne!(buf, orig);
    scramble(&mut buf);
    assert_eq!(buf, orig);
  }

  #[test]
  fn test_base64() {
    assert_eq!(to_base64(b"hello"), "aGVsbG8=");
    assert_eq!(to_base64(&[0xff, 0x00]), "/wA=");
  }
}
