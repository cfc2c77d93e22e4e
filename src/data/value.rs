use std::fmt;

use bytes::{Buf, Bytes};

use crate::{
  crypto,
  errors::{Errors, Result},
};

/// Type tag of a stored value. The discriminant is the on-disk code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
  UInt8 = 1,
  UInt16 = 2,
  UInt32 = 3,
  UInt64 = 4,
  Guid = 5,
  Temperature = 6,
  Binary = 7,
  String = 8,
  Unicode = 9,
  Int8 = 11,
  Int16 = 12,
  Int32 = 13,
  Int64 = 14,
  Void = 24,
  Power = 26,
  Percent = 29,
  Time = 31,
  Structure = 32,
  Blob = 34,
  Table = 35,
  /// Request-only: accept whatever type is stored.
  Auto = 36,
  Xml = 38,
}

impl DataType {
  /// Minimum size of a fixed-width type, 0 for variable length types.
  pub fn fixed_size(self) -> usize {
    match self {
      DataType::UInt8 | DataType::Int8 => 1,
      DataType::UInt16 | DataType::Int16 => 2,
      DataType::UInt32
      | DataType::Int32
      | DataType::Temperature
      | DataType::Power
      | DataType::Percent
      | DataType::Time => 4,
      DataType::UInt64 | DataType::Int64 => 8,
      DataType::Guid => 16,
      _ => 0,
    }
  }

  pub fn is_string(self) -> bool {
    matches!(self, DataType::String | DataType::Xml)
  }
}

impl TryFrom<u32> for DataType {
  type Error = Errors;

  fn try_from(code: u32) -> Result<Self> {
    let ty = match code {
      1 => DataType::UInt8,
      2 => DataType::UInt16,
      3 => DataType::UInt32,
      4 => DataType::UInt64,
      5 => DataType::Guid,
      6 => DataType::Temperature,
      7 => DataType::Binary,
      8 => DataType::String,
      9 => DataType::Unicode,
      11 => DataType::Int8,
      12 => DataType::Int16,
      13 => DataType::Int32,
      14 => DataType::Int64,
      24 => DataType::Void,
      26 => DataType::Power,
      29 => DataType::Percent,
      31 => DataType::Time,
      32 => DataType::Structure,
      34 => DataType::Blob,
      35 => DataType::Table,
      36 => DataType::Auto,
      38 => DataType::Xml,
      _ => return Err(Errors::UnsupportedType),
    };
    Ok(ty)
  }
}

impl From<DataType> for u8 {
  fn from(ty: DataType) -> Self {
    ty as u8
  }
}

/// A typed value. String payloads carry their NUL terminator like the
/// files they are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
  ty: DataType,
  data: Bytes,
}

impl Value {
  pub fn new(ty: DataType, data: impl Into<Bytes>) -> Self {
    Self {
      ty,
      data: data.into(),
    }
  }

  pub fn empty(ty: DataType) -> Self {
    Self::new(ty, Bytes::new())
  }

  pub fn string(s: &str) -> Self {
    let mut buf = Vec::with_capacity(s.len() + 1);
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Self::new(DataType::String, buf)
  }

  pub fn binary(data: impl Into<Bytes>) -> Self {
    Self::new(DataType::Binary, data)
  }

  pub fn u8(v: u8) -> Self {
    Self::new(DataType::UInt8, vec![v])
  }

  pub fn u16(v: u16) -> Self {
    Self::new(DataType::UInt16, v.to_le_bytes().to_vec())
  }

  pub fn u32(v: u32) -> Self {
    Self::new(DataType::UInt32, v.to_le_bytes().to_vec())
  }

  pub fn u64(v: u64) -> Self {
    Self::new(DataType::UInt64, v.to_le_bytes().to_vec())
  }

  pub fn i32(v: i32) -> Self {
    Self::new(DataType::Int32, v.to_le_bytes().to_vec())
  }

  pub fn i64(v: i64) -> Self {
    Self::new(DataType::Int64, v.to_le_bytes().to_vec())
  }

  pub fn data_type(&self) -> DataType {
    self.ty
  }

  pub fn data(&self) -> &Bytes {
    &self.data
  }

  pub fn into_data(self) -> Bytes {
    self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_u32(&self) -> Option<u32> {
    match self.ty {
      DataType::UInt8 | DataType::Int8 if !self.data.is_empty() => Some(self.data[0] as u32),
      DataType::UInt16 | DataType::Int16 if self.data.len() >= 2 => {
        Some((&self.data[..]).get_u16_le() as u32)
      }
      _ if self.ty.fixed_size() == 4 && self.data.len() >= 4 => {
        Some((&self.data[..]).get_u32_le())
      }
      _ => None,
    }
  }

  pub fn as_u64(&self) -> Option<u64> {
    match self.ty {
      DataType::UInt64 | DataType::Int64 if self.data.len() >= 8 => {
        Some((&self.data[..]).get_u64_le())
      }
      _ => self.as_u32().map(u64::from),
    }
  }

  /// The string contents without the trailing NUL.
  pub fn as_str(&self) -> Option<&str> {
    if !self.ty.is_string() {
      return None;
    }
    let end = self
      .data
      .iter()
      .position(|b| *b == 0)
      .unwrap_or(self.data.len());
    std::str::from_utf8(&self.data[..end]).ok()
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(s) = self.as_str() {
      return f.write_str(s);
    }
    match self.ty {
      DataType::Int8 if self.data.len() == 1 => write!(f, "{}", self.data[0] as i8),
      DataType::Int16 if self.data.len() >= 2 => write!(f, "{}", (&self.data[..]).get_i16_le()),
      DataType::Int32 if self.data.len() >= 4 => write!(f, "{}", (&self.data[..]).get_i32_le()),
      DataType::Int64 if self.data.len() >= 8 => write!(f, "{}", (&self.data[..]).get_i64_le()),
      _ => match self.as_u64() {
        Some(v) => write!(f, "{v}"),
        None => f.write_str(&crypto::to_base64(&self.data)),
      },
    }
  }
}
