use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::candidate::PixelSource;

/// Side length of the grayscale grid an average hash is computed from.
pub const HASH_GRID: usize = 8;

/// 64-bit average-hash fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    pub fn distance(self, other: PerceptualHash) -> u32 {
        hamming_distance(self.0, other.0)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// Hex keeps the full 64 bits intact for JSON consumers that parse numbers as doubles.
impl Serialize for PerceptualHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PerceptualHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        u64::from_str_radix(&text, 16)
            .map(PerceptualHash)
            .map_err(de::Error::custom)
    }
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Average hash of a row-major 8×8 luma grid: bit `i` is set when cell `i` is
/// brighter than the grid mean.
pub fn average_hash(grid: &[u8; HASH_GRID * HASH_GRID]) -> PerceptualHash {
    let total: u32 = grid.iter().map(|&v| u32::from(v)).sum();
    let mean = total as f64 / grid.len() as f64;
    let bits = grid
        .iter()
        .enumerate()
        .filter(|&(_, &v)| f64::from(v) > mean)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
    PerceptualHash(bits)
}

/// Produces fingerprints from pixel data. Implemented by the engine's image
/// probe; pure code only sees this seam.
pub trait PixelHasher: Send + Sync {
    fn fingerprint(&self, pixels: &PixelSource) -> Option<PerceptualHash>;
}

/// Hasher for contexts with no pixel access: every candidate stays a singleton.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPixels;

impl PixelHasher for NoPixels {
    fn fingerprint(&self, _pixels: &PixelSource) -> Option<PerceptualHash> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_grid_hashes_to_zero() {
        assert_eq!(average_hash(&[128; 64]), PerceptualHash(0));
    }

    #[test]
    fn bright_half_sets_matching_bits() {
        let mut grid = [0u8; 64];
        for cell in grid.iter_mut().skip(32) {
            *cell = 255;
        }
        assert_eq!(average_hash(&grid), PerceptualHash(0xFFFF_FFFF_0000_0000));
    }

    #[test]
    fn hamming_counts_differing_bits() {
        assert_eq!(hamming_distance(0b1011, 0b0001), 2);
        assert_eq!(PerceptualHash(u64::MAX).distance(PerceptualHash(0)), 64);
    }

    #[test]
    fn hex_form_is_fixed_width() {
        assert_eq!(PerceptualHash(0xab).to_string(), "00000000000000ab");
    }
}
