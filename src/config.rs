use log::debug;

use crate::{
  bank::DataBank,
  data::{
    flags::ItemFlags,
    header::PayloadClass,
    value::{DataType, Value},
  },
  errors::{Errors, Result},
  fio::stream::IoStream,
  index::{has_wildcard, key_match},
};

/// Include and `!`-prefixed exclude patterns of a tab-separated keyspec list.
struct KeySpecs<'a> {
  include: Vec<&'a str>,
  exclude: Vec<&'a str>,
}

impl<'a> KeySpecs<'a> {
  fn parse(list: &'a str) -> Self {
    let mut specs = KeySpecs {
      include: Vec::new(),
      exclude: Vec::new(),
    };
    for spec in list.split('\t').map(str::trim).filter(|s| !s.is_empty()) {
      match spec.strip_prefix('!') {
        Some(pattern) => specs.exclude.push(pattern),
        None => specs.include.push(spec),
      }
    }
    specs
  }

  fn matches(&self, key: &str) -> bool {
    self.include.iter().any(|p| key_match(key, p)) && !self.exclude.iter().any(|p| key_match(key, p))
  }
}

/// Key access by namespace name. `None` selects the default namespace.
impl DataBank {
  pub fn get(&self, namespace: Option<&str>, key: &str, ty: DataType) -> Result<Value> {
    let name = self.resolve_namespace(namespace);
    let vault = self.get_vault(&name).ok_or(Errors::NotFound)?;
    vault.get_value(key, ty)
  }

  /// Sets a key, creating the namespace when it does not exist yet.
  pub fn set(&self, namespace: Option<&str>, key: &str, value: Value, flags: ItemFlags) -> Result<()> {
    let name = self.resolve_namespace(namespace);
    if flags.contains(ItemFlags::DELETE) {
      let vault = self.get_vault(&name).ok_or(Errors::NotFound)?;
      return vault.set_value(key, value, flags);
    }
    self.open_vault(&name)?.set_value(key, value, flags)
  }

  pub fn delete(&self, namespace: Option<&str>, key: &str, flags: ItemFlags) -> Result<()> {
    let name = self.resolve_namespace(namespace);
    let vault = self.get_vault(&name).ok_or(Errors::NotFound)?;
    vault.delete_value(key, flags)
  }

  /// Replaces a namespace's contents with an opaque payload, compressed
  /// as configured by `Options::compress_payloads`.
  pub fn set_payload(
    &self,
    namespace: Option<&str>,
    class: PayloadClass,
    payload: &mut IoStream,
  ) -> Result<()> {
    let name = self.resolve_namespace(namespace);
    self
      .open_vault(&name)?
      .set_payload(class, payload, self.options.compress_payloads)
  }

  pub fn key_exists(&self, namespace: Option<&str>, key: &str) -> bool {
    let name = self.resolve_namespace(namespace);
    match self.get_vault(&name) {
      Some(vault) if has_wildcard(key) => vault.get_value(key, DataType::Auto).is_ok(),
      Some(vault) => vault.key_exists(key),
      None => false,
    }
  }

  /// Copies keys selected by `keyspecs` from one namespace to another.
  ///
  /// With `replace` false, keys already present in the target are left as
  /// they are. Returns the number of keys written.
  pub fn copy_or_merge_keys(
    &self,
    from: &str,
    to: &str,
    keyspecs: &str,
    flags: ItemFlags,
    replace: bool,
  ) -> Result<usize> {
    let source = self.get_vault(from).ok_or(Errors::NotFound)?;
    let target = self.open_vault(to)?;
    let specs = KeySpecs::parse(keyspecs);

    let mut batch = Vec::new();
    for key in source.keys() {
      if !specs.matches(&key) {
        continue;
      }
      if !replace && target.key_exists(&key) {
        continue;
      }
      let value = source.get_value(&key, DataType::Auto)?;
      batch.push((key, Some(value)));
    }

    let copied = batch.len();
    if copied > 0 {
      target.set_values(batch, flags - ItemFlags::DELETE)?;
    }
    debug!(
      "{} {} keys from {} to {}",
      if replace { "copied" } else { "merged" },
      copied,
      from,
      to
    );
    Ok(copied)
  }
}
