//! Bloom filter blocks.
//!
//! Block body format:
//! ```text
//! [BloomBlockHeader: num_hash_functions u32][num_bits: u64][bits]
//! ```
//!
//! Probe positions come from double hashing two seeded FNV-1a passes over the
//! key: `h_i = h1 + i * h2 (mod num_bits)`.

use crate::error::{Error, Result};
use crate::filter::Filter;

/// Leading record of a bloom filter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomBlockHeader {
    /// Number of probe positions per key; always >= 1
    pub num_hash_functions: u32,
}

impl BloomBlockHeader {
    /// Encoded size of the header
    pub const ENCODED_LEN: usize = 4;
}

const MIN_BITS: usize = 64;
const MAX_HASHES: u32 = 30;
const SEED_1: u64 = 0xbc9f1d34;
const SEED_2: u64 = 0xd0e89c7b;

/// One data block's bloom filter.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    header: BloomBlockHeader,
    num_bits: usize,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Size a filter for `expected_keys` keys at `false_positive_rate`.
    ///
    /// m = -n * ln(p) / ln(2)^2 bits, k = (m / n) * ln(2) hash functions.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        if expected_keys == 0 {
            return Self::with_bits_and_hashes(MIN_BITS, 1);
        }

        let n = expected_keys as f64;
        let p = false_positive_rate.clamp(0.0001, 0.9999);
        let ln2 = std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln() / (ln2 * ln2)).ceil() as usize).max(MIN_BITS);
        let num_hashes = ((num_bits as f64 / n) * ln2).ceil() as u32;

        Self::with_bits_and_hashes(num_bits, num_hashes.clamp(1, MAX_HASHES))
    }

    fn with_bits_and_hashes(num_bits: usize, num_hash_functions: u32) -> Self {
        Self {
            header: BloomBlockHeader { num_hash_functions },
            num_bits,
            bits: vec![0u8; num_bits.div_ceil(8)],
        }
    }

    /// The block header
    pub fn header(&self) -> BloomBlockHeader {
        self.header
    }

    /// Number of hash functions
    pub fn num_hashes(&self) -> u32 {
        self.header.num_hash_functions
    }

    /// Number of bits in the filter
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Size of the bit array in bytes
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    /// Theoretical false positive rate after `num_keys` insertions:
    /// p = (1 - e^(-kn/m))^k
    pub fn estimated_false_positive_rate(&self, num_keys: usize) -> f64 {
        if num_keys == 0 {
            return 0.0;
        }
        let k = self.num_hashes() as f64;
        let exp = (-k * num_keys as f64 / self.num_bits as f64).exp();
        (1.0 - exp).powf(k)
    }

    fn probes(&self, key: &[u8]) -> impl Iterator<Item = usize> {
        let h1 = fnv1a(key, SEED_1);
        let h2 = fnv1a(key, SEED_2) | 1;
        let m = self.num_bits as u64;
        (0..self.header.num_hash_functions as u64)
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }
}

fn fnv1a(key: &[u8], seed: u64) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut state = OFFSET_BASIS ^ seed;
    for &byte in key {
        state ^= byte as u64;
        state = state.wrapping_mul(PRIME);
    }
    // final avalanche so short keys spread across the bit array
    state ^= state >> 33;
    state = state.wrapping_mul(0xff51afd7ed558ccd);
    state ^ (state >> 33)
}

impl Filter for BloomFilter {
    fn may_contain(&self, key: &[u8]) -> bool {
        self.probes(key).all(|pos| self.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }

    fn add(&mut self, key: &[u8]) {
        let positions: Vec<usize> = self.probes(key).collect();
        for pos in positions {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(BloomBlockHeader::ENCODED_LEN + 8 + self.bits.len());
        encoded.extend_from_slice(&self.header.num_hash_functions.to_le_bytes());
        encoded.extend_from_slice(&(self.num_bits as u64).to_le_bytes());
        encoded.extend_from_slice(&self.bits);
        encoded
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::corruption("Bloom filter block too short"));
        }

        let mut word = [0u8; 4];
        word.copy_from_slice(&data[0..4]);
        let num_hash_functions = u32::from_le_bytes(word);
        if num_hash_functions == 0 || num_hash_functions > MAX_HASHES {
            return Err(Error::corruption(format!(
                "invalid bloom hash function count {}",
                num_hash_functions
            )));
        }

        let mut dword = [0u8; 8];
        dword.copy_from_slice(&data[4..12]);
        let num_bits = usize::try_from(u64::from_le_bytes(dword))
            .map_err(|_| Error::corruption("bloom bit count overflows usize"))?;
        if num_bits == 0 || data.len() - 12 != num_bits.div_ceil(8) {
            return Err(Error::corruption("Bloom filter size mismatch"));
        }

        Ok(Self {
            header: BloomBlockHeader { num_hash_functions },
            num_bits,
            bits: data[12..].to_vec(),
        })
    }
}
