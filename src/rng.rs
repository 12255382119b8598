//! Deterministic pseudo-random stream used for chart generation and pickups.
//!
//! The generator is mulberry32 and string seeds go through a 32-bit FNV-1a
//! over UTF-16 code units, so a song id always maps to the same chart no matter
//! which build (browser or native) produced it.

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Hash a string identifier into a 32-bit seed (FNV-1a, order sensitive).
pub fn hash_str_to_seed(s: &str) -> u32 {
    s.encode_utf16().fold(FNV_OFFSET_BASIS, |h, unit| {
        (h ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// Seed source accepted by the chart generator.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Seed {
    Numeric(u32),
    Text(String),
}

impl Seed {
    pub fn to_u32(&self) -> u32 {
        match self {
            Seed::Numeric(n) => *n,
            Seed::Text(s) => hash_str_to_seed(s),
        }
    }
}

impl From<u32> for Seed {
    fn from(n: u32) -> Self {
        Seed::Numeric(n)
    }
}

impl From<&str> for Seed {
    fn from(s: &str) -> Self {
        Seed::Text(s.to_owned())
    }
}

impl From<String> for Seed {
    fn from(s: String) -> Self {
        Seed::Text(s)
    }
}

/// mulberry32 stream. Two instances built from the same seed yield identical
/// sequences.
#[derive(Clone, Debug)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn from_seed(seed: &Seed) -> Self {
        Self::new(seed.to_u32())
    }

    /// Next raw 32-bit output.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let a = self.state;
        let mut t = (a ^ (a >> 15)).wrapping_mul(1 | a);
        t = t.wrapping_add((t ^ (t >> 7)).wrapping_mul(61 | t)) ^ t;
        t ^ (t >> 14)
    }

    /// Uniform value in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }

    /// Uniform index in `0..len`; 0 when `len` is 0.
    pub fn next_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        ((self.next_f64() * len as f64) as usize).min(len - 1)
    }

    /// Uniform integer in `lo..=hi` (bounds swapped if reversed).
    pub fn range_inclusive(&mut self, lo: u32, hi: u32) -> u32 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let span = u64::from(hi - lo) + 1;
        lo + (self.next_f64() * span as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv_known_values() {
        // Empty string hashes to the offset basis.
        assert_eq!(hash_str_to_seed(""), FNV_OFFSET_BASIS);
        // FNV-1a 32 reference value for "a".
        assert_eq!(hash_str_to_seed("a"), 0xE40C_292C);
    }

    #[test]
    fn test_fnv_is_order_sensitive() {
        assert_ne!(hash_str_to_seed("ab"), hash_str_to_seed("ba"));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_mulberry32_reference_output() {
        // mulberry32(1) first output, as produced by the browser build.
        let mut r = SeededRng::new(1);
        let v = r.next_f64();
        assert!((v - 0.627_073_940_588_161_3).abs() < 1e-12, "got {v}");
    }

    #[test]
    fn test_values_in_unit_interval() {
        let mut r = SeededRng::from_seed(&Seed::from("song-id"));
        for _ in 0..1000 {
            let v = r.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_range_inclusive_bounds() {
        let mut r = SeededRng::new(7);
        for _ in 0..500 {
            let v = r.range_inclusive(8000, 15000);
            assert!((8000..=15000).contains(&v));
        }
        assert_eq!(r.range_inclusive(3, 3), 3);
    }

    #[test]
    fn test_next_index_empty() {
        let mut r = SeededRng::new(0);
        assert_eq!(r.next_index(0), 0);
    }
}
