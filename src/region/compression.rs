//! Compression support for region slots

use crate::error::{Error, Result};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Default deflate level for new slot writes
pub const DEFAULT_LEVEL: u32 = 6;

/// Compression method, stored as the byte after each slot's length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    Gzip,
    Zlib,
    None,
}

impl Default for CompressionMethod {
    fn default() -> Self {
        CompressionMethod::Zlib
    }
}

impl CompressionMethod {
    pub fn id(self) -> u8 {
        match self {
            CompressionMethod::Gzip => 1,
            CompressionMethod::Zlib => 2,
            CompressionMethod::None => 3,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(CompressionMethod::Gzip),
            2 => Ok(CompressionMethod::Zlib),
            3 => Ok(CompressionMethod::None),
            _ => Err(Error::Format(format!("Unknown compression method: {}", id))),
        }
    }
}

/// Compress data using the specified method
pub fn compress(data: &[u8], method: CompressionMethod, level: u32) -> Result<Vec<u8>> {
    let level = Compression::new(level.min(9));
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        CompressionMethod::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Largest payload a slot may inflate to
pub const MAX_INFLATED_LEN: usize = 64 * 1024 * 1024;

/// Decompress data; any decoder failure is a format error
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    decompress_limited(data, method, MAX_INFLATED_LEN)
}

/// Decompress at most `limit` bytes, rejecting larger payloads as malformed
pub fn decompress_limited(data: &[u8], method: CompressionMethod, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let cap = limit as u64 + 1;
    let res = match method {
        CompressionMethod::None => (&data[..]).take(cap).read_to_end(&mut out),
        CompressionMethod::Zlib => ZlibDecoder::new(data).take(cap).read_to_end(&mut out),
        CompressionMethod::Gzip => GzDecoder::new(data).take(cap).read_to_end(&mut out),
    };
    res.map_err(|e| Error::Format(format!("Failed to decompress {:?} data: {}", method, e)))?;
    if out.len() > limit {
        return Err(Error::Format(format!(
            "{:?} data inflates past {} bytes",
            method, limit
        )));
    }
    Ok(out)
}
