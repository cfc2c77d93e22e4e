use std::path::{Path, PathBuf};

/// Single-segment primary store.
pub const DV_EXT: &str = "dv";
/// Repository, one or more segments.
pub const REPO_EXT: &str = "dvx";
/// In-progress flush output.
pub const TEMP_EXT: &str = "tmp";
/// Previous primary file kept aside while a flush commits.
pub const ROLLBACK_EXT: &str = "temp";
pub const LOG_EXT: &str = "log";

pub fn vault_file_path<P: AsRef<Path>>(dir: P, name: &str, ext: &str) -> PathBuf {
  dir.as_ref().join(format!("{name}.{ext}"))
}

/// `a/b.dv` + `tmp` -> `a/b.dv.tmp`
pub fn with_suffix<P: AsRef<Path>>(path: P, suffix: &str) -> PathBuf {
  let mut s = path.as_ref().as_os_str().to_os_string();
  s.push(".");
  s.push(suffix);
  PathBuf::from(s)
}

pub fn extension(path: &Path) -> Option<String> {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase())
}

pub fn file_stem(path: &Path) -> Option<&str> {
  path.file_stem().and_then(|s| s.to_str())
}

/// Namespace names become file names, so path separators and control
/// characters are refused.
pub fn is_valid_name(name: &str) -> bool {
  !name.is_empty()
    && name != "."
    && name != ".."
    && !name
      .chars()
      .any(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_paths() {
    let p = vault_file_path("/var/dv", "dptf", DV_EXT);
    assert_eq!(p, PathBuf::from("/var/dv/dptf.dv"));
    assert_eq!(with_suffix(&p, TEMP_EXT), PathBuf::from("/var/dv/dptf.dv.tmp"));
    assert_eq!(extension(&p).as_deref(), Some("dv"));
    assert_eq!(extension(Path::new("/x/Y.DVX")).as_deref(), Some("dvx"));
    assert_eq!(file_stem(&p), Some("dptf"));
  }

  #[test]
  fn test_valid_names() {
    assert!(is_valid_name("dptf"));
    assert!(is_valid_name("override.v2"));
    assert!(!is_valid_name(""));
    assert!(!is_valid_name("../etc"));
    assert!(!is_valid_name("a*"));
  }
}
