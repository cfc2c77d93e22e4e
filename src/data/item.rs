use bytes::{Buf, BufMut, BytesMut};

use crate::{
  data::{flags::ItemFlags, value::DataType},
  errors::{Errors, Result},
  fio::stream::IoStream,
};

/// Leads every v2 item record.
pub const ITEM_SIGNATURE: u16 = 0xA55A;

/// Upper bound for key and value lengths.
pub const MAX_DATA_LEN: u32 = 0x7fff_ffff;

/// Key and value metadata of one item record; the value bytes follow it
/// in the stream and are consumed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
  pub flags: ItemFlags,
  pub key: String,
  pub ty: DataType,
  pub value_len: u32,
}

/// Encodes everything of a v2 item up to, not including, the value bytes.
pub fn encode_item_header(flags: ItemFlags, key: &str, ty: DataType, value_len: u32) -> BytesMut {
  let key_len = key.len() + 1;
  let mut buf = BytesMut::with_capacity(2 + 4 + 4 + key_len + 1 + 4);
  buf.put_u16_le(ITEM_SIGNATURE);
  buf.put_u32_le(flags.persistable().bits());
  buf.put_u32_le(key_len as u32);
  buf.put_slice(key.as_bytes());
  buf.put_u8(0);
  buf.put_u8(ty.into());
  buf.put_u32_le(value_len);
  buf
}

fn read_u32(stream: &mut IoStream) -> Result<u32> {
  let mut b = [0u8; 4];
  stream.read_exact(&mut b)?;
  Ok((&b[..]).get_u32_le())
}

fn check_len(len: u32, remaining: Option<u64>) -> Result<()> {
  if len > MAX_DATA_LEN {
    return Err(Errors::ParameterOutOfBounds);
  }
  if let Some(rem) = remaining {
    if len as u64 > rem {
      return Err(Errors::ParameterOutOfBounds);
    }
  }
  Ok(())
}

/// Reads the next item record header. `remaining` bounds the record to the
/// rest of the payload when the payload size is known. Returns `None` at a
/// clean end of the payload.
pub fn read_item(
  stream: &mut IoStream,
  v1: bool,
  remaining: Option<u64>,
) -> Result<Option<ItemRecord>> {
  if remaining == Some(0) {
    return Ok(None);
  }
  let start = stream.tell();

  let flags = if v1 {
    let mut b = [0u8; 4];
    match stream.read(&mut b) {
      0 => return Ok(None),
      4 => (&b[..]).get_u32_le(),
      _ => return Err(Errors::IoError),
    }
  } else {
    let mut sig = [0u8; 2];
    match stream.read(&mut sig) {
      0 if remaining.is_none() => return Ok(None),
      2 => {}
      _ => return Err(Errors::IoError),
    }
    if (&sig[..]).get_u16_le() != ITEM_SIGNATURE {
      return Err(Errors::NotSupported);
    }
    read_u32(stream)?
  };

  let used = |stream: &mut IoStream| remaining.map(|r| r.saturating_sub(stream.tell() - start));

  let key_len = read_u32(stream)?;
  check_len(key_len, used(stream))?;
  let mut key = vec![0u8; key_len as usize];
  stream.read_exact(&mut key)?;
  if let Some(nul) = key.iter().position(|b| *b == 0) {
    key.truncate(nul);
  }
  let key = String::from_utf8(key).map_err(|_| Errors::NotSupported)?;

  let ty = if v1 {
    read_u32(stream)?
  } else {
    let mut b = [0u8; 1];
    stream.read_exact(&mut b)?;
    b[0] as u32
  };
  let ty = DataType::try_from(ty)?;

  let value_len = read_u32(stream)?;
  check_len(value_len, used(stream))?;

  Ok(Some(ItemRecord {
    flags: ItemFlags::from_bits_retain(flags),
    key,
    ty,
    value_len,
  }))
}

/// Encodes a complete v1 item; only used to build legacy fixtures.
#[cfg(test)]
pub fn encode_v1_item(flags: ItemFlags, key: &str, ty: DataType, value: &[u8]) -> BytesMut {
  let mut buf = BytesMut::new();
  buf.put_u32_le(flags.bits());
  buf.put_u32_le(key.len() as u32 + 1);
  buf.put_slice(key.as_bytes());
  buf.put_u8(0);
  buf.put_u32_le(u8::from(ty) as u32);
  buf.put_u32_le(value.len() as u32);
  buf.put_slice(value);
  buf
}
