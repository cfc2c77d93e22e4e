pub mod cache;

use std::cmp::Ordering;

/// Case-insensitive ASCII ordering used for keys and namespace names.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
  let a = a.bytes().map(|c| c.to_ascii_lowercase());
  let b = b.bytes().map(|c| c.to_ascii_lowercase());
  a.cmp(b)
}

pub fn has_wildcard(key: &str) -> bool {
  key.contains(|c: char| c == '*' || c == '?')
}

/// Case-insensitive glob match where `*` matches any run and `?` any one character.
pub fn key_match(key: &str, pattern: &str) -> bool {
  let key = key.as_bytes();
  let pat = pattern.as_bytes();
  let (mut k, mut p) = (0, 0);
  let mut star: Option<(usize, usize)> = None;

  while k < key.len() {
    if p < pat.len() && (pat[p] == b'?' || pat[p].eq_ignore_ascii_case(&key[k])) {
      k += 1;
      p += 1;
    } else if p < pat.len() && pat[p] == b'*' {
      star = Some((p, k));
      p += 1;
    } else if let Some((sp, sk)) = star {
      p = sp + 1;
      k = sk + 1;
      star = Some((sp, sk + 1));
    } else {
      return false;
    }
  }
  while p < pat.len() && pat[p] == b'*' {
    p += 1;
  }
  p == pat.len()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cmp_ignore_case() {
    assert_eq!(cmp_ignore_case("ABC", "abc"), Ordering::Equal);
    assert_eq!(cmp_ignore_case("a", "B"), Ordering::Less);
    assert_eq!(cmp_ignore_case("app_10", "APP_1"), Ordering::Greater);
  }

  #[test]
  fn test_key_match() {
    assert!(key_match("app_1", "app_*"));
    assert!(key_match("APP_2", "app_?"));
    assert!(!key_match("other", "app_*"));
    assert!(key_match("anything", "*"));
    assert!(key_match("/a/b/c", "/a/*/c"));
    assert!(!key_match("/a/b/d", "/a/*/c"));
    assert!(key_match("abc", "a*b*c*"));
    assert!(!key_match("ab", "a?c"));
    assert!(key_match("", "*"));
    assert!(!key_match("", "?"));
  }

  #[test]
  fn test_has_wildcard() {
    assert!(has_wildcard("a*"));
    assert!(has_wildcard("a?b"));
    assert!(!has_wildcard("/plain/key"));
  }
}
