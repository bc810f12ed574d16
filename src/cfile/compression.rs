//! Block compression wrapper.
//!
//! Every stored block (data, dictionary, bloom, index) goes through the same
//! codec, chosen once per file:
//!
//! ```text
//! [uncompressed_len: u32][codec payload][crc32: u32]
//! ```
//!
//! The CRC covers the length and the payload, so any flipped byte is caught
//! before decompression is attempted.

use crate::config::CompressionType;
use crate::error::{Error, Result};
use bytes::Bytes;

/// Size of the fixed fields around the codec payload.
pub const BLOCK_OVERHEAD: usize = 8;

/// Stateless per-block codec for one file.
#[derive(Debug, Clone, Copy)]
pub struct BlockCompressor {
    compression: CompressionType,
}

impl BlockCompressor {
    /// Create a compressor for `compression`, failing if the codec is not compiled in.
    pub fn new(compression: CompressionType) -> Result<Self> {
        if !compression.is_available() {
            return Err(Error::UnsupportedCompression(format!(
                "{:?} support not compiled in",
                compression
            )));
        }
        Ok(Self { compression })
    }

    /// The codec in use
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Compress a raw block into its stored form.
    pub fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let raw_len = u32::try_from(raw.len()).map_err(|_| {
            Error::invalid_argument(format!("block of {} bytes exceeds the 4 GiB block limit", raw.len()))
        })?;
        let payload = self.encode_payload(raw)?;

        let mut stored = Vec::with_capacity(payload.len() + BLOCK_OVERHEAD);
        stored.extend_from_slice(&raw_len.to_le_bytes());
        stored.extend_from_slice(&payload);
        let checksum = crc32fast::hash(&stored);
        stored.extend_from_slice(&checksum.to_le_bytes());
        Ok(stored)
    }

    /// Verify and decompress a stored block.
    pub fn decompress(&self, stored: &[u8]) -> Result<Bytes> {
        if stored.len() < BLOCK_OVERHEAD {
            return Err(Error::corruption("Block size too small"));
        }

        let (checked, crc) = stored.split_at(stored.len() - 4);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(crc);
        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32fast::hash(checked);
        if expected != actual {
            return Err(Error::corruption(format!(
                "block checksum mismatch: expected {:#x}, got {:#x}",
                expected, actual
            )));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&checked[0..4]);
        let uncompressed_len = u32::from_le_bytes(len_bytes) as usize;
        let payload = &checked[4..];

        let raw = self.decode_payload(payload, uncompressed_len)?;
        if raw.len() != uncompressed_len {
            return Err(Error::corruption(format!(
                "decompressed size mismatch: expected {}, got {}",
                uncompressed_len,
                raw.len()
            )));
        }
        Ok(Bytes::from(raw))
    }

    /// Compress several blocks on up to `threads` workers, preserving order.
    pub fn compress_all(&self, raws: &[Bytes], threads: usize) -> Result<Vec<Vec<u8>>> {
        if threads <= 1 || raws.len() <= 1 {
            return raws.iter().map(|raw| self.compress(raw)).collect();
        }

        let chunk = raws.len().div_ceil(threads);
        let results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = raws
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move |_| {
                        part.iter().map(|raw| self.compress(raw)).collect::<Result<Vec<_>>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .map_err(|_| Error::internal("compression worker panicked"))
                        .and_then(|r| r)
                })
                .collect::<Result<Vec<_>>>()
        })
        .map_err(|_| Error::internal("compression scope panicked"))??;

        Ok(results.into_iter().flatten().collect())
    }

    fn encode_payload(&self, raw: &[u8]) -> Result<Vec<u8>> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        match self.compression {
            CompressionType::None => Ok(raw.to_vec()),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::Encoder::new()
                .compress_vec(raw)
                .map_err(|e| Error::internal(format!("Compression failed: {}", e))),
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => lz4::block::compress(raw, None, false)
                .map_err(|e| Error::internal(format!("Compression failed: {}", e))),
            #[cfg(feature = "zstd-compression")]
            CompressionType::Zstd => zstd::bulk::compress(raw, 3)
                .map_err(|e| Error::internal(format!("Compression failed: {}", e))),
            #[allow(unreachable_patterns)]
            other => Err(Error::UnsupportedCompression(format!(
                "{:?} support not compiled in",
                other
            ))),
        }
    }

    fn decode_payload(&self, payload: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        if uncompressed_len == 0 {
            if !payload.is_empty() {
                return Err(Error::corruption("payload present for empty block"));
            }
            return Ok(Vec::new());
        }
        match self.compression {
            CompressionType::None => Ok(payload.to_vec()),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::Decoder::new()
                .decompress_vec(payload)
                .map_err(|e| Error::corruption(format!("Decompression failed: {}", e))),
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => {
                let size = i32::try_from(uncompressed_len)
                    .map_err(|_| Error::corruption("uncompressed length overflows lz4 block"))?;
                lz4::block::decompress(payload, Some(size))
                    .map_err(|e| Error::corruption(format!("Decompression failed: {}", e)))
            }
            #[cfg(feature = "zstd-compression")]
            CompressionType::Zstd => zstd::bulk::decompress(payload, uncompressed_len)
                .map_err(|e| Error::corruption(format!("Decompression failed: {}", e))),
            #[allow(unreachable_patterns)]
            other => Err(Error::UnsupportedCompression(format!(
                "{:?} support not compiled in",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_codecs() -> Vec<CompressionType> {
        [
            CompressionType::None,
            CompressionType::Snappy,
            CompressionType::Lz4,
            CompressionType::Zstd,
        ]
        .into_iter()
        .filter(|c| c.is_available())
        .collect()
    }

    fn sample() -> Vec<u8> {
        (0..4096u32).flat_map(|i| (i % 17).to_le_bytes()).collect()
    }

    #[test]
    fn test_round_trip_all_codecs() {
        let raw = sample();
        for codec in all_codecs() {
            let c = BlockCompressor::new(codec).unwrap();
            let stored = c.compress(&raw).unwrap();
            assert_eq!(c.decompress(&stored).unwrap().as_ref(), raw.as_slice(), "{:?}", codec);
        }
    }

    #[test]
    fn test_empty_block() {
        for codec in all_codecs() {
            let c = BlockCompressor::new(codec).unwrap();
            let stored = c.compress(&[]).unwrap();
            assert!(c.decompress(&stored).unwrap().is_empty());
        }
    }

    #[test]
    fn test_flipped_byte_is_corruption() {
        for codec in all_codecs() {
            let c = BlockCompressor::new(codec).unwrap();
            let mut stored = c.compress(&sample()).unwrap();
            let mid = stored.len() / 2;
            stored[mid] ^= 0x40;
            assert!(matches!(c.decompress(&stored), Err(Error::Corruption(_))));
        }
    }

    #[test]
    fn test_truncated_block() {
        let c = BlockCompressor::new(CompressionType::None).unwrap();
        assert!(matches!(c.decompress(&[1, 2, 3]), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_compress_all_preserves_order() {
        let c = BlockCompressor::new(CompressionType::None).unwrap();
        let raws: Vec<Bytes> = (0..9u8).map(|i| Bytes::from(vec![i; 64])).collect();
        let stored = c.compress_all(&raws, 4).unwrap();
        assert_eq!(stored.len(), raws.len());
        for (raw, block) in raws.iter().zip(&stored) {
            assert_eq!(c.decompress(block).unwrap(), *raw);
        }
    }
}
