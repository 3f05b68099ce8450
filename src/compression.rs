//! Compression Module
//!
//! Provides LZ4 compression and decompression for oversized cache payloads.
//! Compressed payloads are written in the LZ4 frame format, so readers can
//! recognize them by the frame magic number and decompress transparently.

use crate::{Result, ServiceError};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::io::{Read, Write};
use tracing::debug;

/// LZ4 frame format magic number (little-endian 0x184D2204)
const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

/// Check whether a payload starts with the LZ4 frame magic number
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= LZ4_FRAME_MAGIC.len() && data[..LZ4_FRAME_MAGIC.len()] == LZ4_FRAME_MAGIC
}

/// Compress a payload using the LZ4 frame format
pub fn compress_payload(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = FrameEncoder::new(Vec::with_capacity(data.len() / 2));
    encoder
        .write_all(data)
        .map_err(|e| ServiceError::CompressionError(format!("LZ4 write failed: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ServiceError::CompressionError(format!("LZ4 finish failed: {}", e)))?;

    debug!(
        "Compressed payload: {} bytes -> {} bytes",
        data.len(),
        compressed.len()
    );

    Ok(compressed)
}

/// Decompress a payload if it carries the LZ4 frame magic, otherwise return it as-is
pub fn decompress_payload(data: &[u8]) -> Result<Vec<u8>> {
    if !is_compressed(data) {
        return Ok(data.to_vec());
    }

    let mut decoder = FrameDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| ServiceError::CompressionError(format!("LZ4 decompression failed: {}", e)))?;

    Ok(decompressed)
}
