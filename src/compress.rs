use log::error;

use crate::errors::{Errors, Result};

pub fn compress(data: &[u8]) -> Vec<u8> {
  lz4_flex::compress_prepend_size(data)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
  lz4_flex::decompress_size_prepended(data).map_err(|e| {
    error!("failed to decompress payload: {e}");
    Errors::IoError
  })
}
