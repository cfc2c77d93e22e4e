use bitflags::bitflags;

bitflags! {
  /// Item and vault level option bits, stored as `u32` on disk.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct ItemFlags: u32 {
    const PERSIST    = 0x0000_0001;
    /// Bitwise-complement obfuscation of the stored value.
    const SCRAMBLE   = 0x0000_0002;
    const READONLY   = 0x0000_0004;
    /// Value stays on disk and is read on demand.
    const NOCACHE    = 0x0000_0008;
    /// Value is the path of an external file.
    const FILELINK   = 0x0000_0010;
    /// Set-path only, never written.
    const DELETE     = 0x0001_0000;
    const COMPRESSED = 0x4000_0000;
    /// Vault level: loaded from compiled-in memory.
    const STATIC     = 0x8000_0000;
  }
}

const OPTION_NAMES: &[(&str, ItemFlags)] = &[
  ("PERSIST", ItemFlags::PERSIST),
  ("SCRAMBLE", ItemFlags::SCRAMBLE),
  ("ENCRYPT", ItemFlags::SCRAMBLE),
  ("READONLY", ItemFlags::READONLY),
  ("NOCACHE", ItemFlags::NOCACHE),
  ("FILELINK", ItemFlags::FILELINK),
  ("DELETE", ItemFlags::DELETE),
  ("STATIC", ItemFlags::STATIC),
  ("~NOPERSIST", ItemFlags::PERSIST),
];

impl ItemFlags {
  /// Applies a named option to `self`. `NAME` sets the bit, and the
  /// `~NAME` entries unset it when given without the tilde. Unknown names
  /// leave the flags unchanged and return `None`.
  pub fn apply_option(self, name: &str) -> Option<ItemFlags> {
    for (opt, bits) in OPTION_NAMES {
      if opt.eq_ignore_ascii_case(name) {
        return Some(self | *bits);
      }
      if let Some(unset) = opt.strip_prefix('~') {
        if unset.eq_ignore_ascii_case(name) {
          return Some(self - *bits);
        }
      }
    }
    None
  }

  /// Flags that may be written with an item record.
  pub fn persistable(self) -> ItemFlags {
    self - ItemFlags::DELETE - ItemFlags::STATIC
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_apply_option() {
    let f = ItemFlags::empty();
    let f = f.apply_option("persist").unwrap();
    assert_eq!(f, ItemFlags::PERSIST);
    let f = f.apply_option("Encrypt").unwrap();
    assert_eq!(f, ItemFlags::PERSIST | ItemFlags::SCRAMBLE);
    let f = f.apply_option("NOPERSIST").unwrap();
    assert_eq!(f, ItemFlags::SCRAMBLE);
    assert!(f.apply_option("bogus").is_none());
  }

  #[test]
  fn test_wire_values() {
    assert_eq!(ItemFlags::PERSIST.bits(), 1);
    assert_eq!(ItemFlags::NOCACHE.bits(), 8);
    assert_eq!(ItemFlags::DELETE.bits(), 0x10000);
    assert_eq!(ItemFlags::STATIC.bits(), 0x8000_0000);
    assert_eq!(
      (ItemFlags::PERSIST | ItemFlags::DELETE).persistable(),
      ItemFlags::PERSIST
    );
  }
}
