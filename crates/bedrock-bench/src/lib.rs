//! Benchmark workloads for the Bedrock runtime.
//!
//! - [`push_sizes`]: a deterministic mix of allocation sizes and
//!   alignments, skewed toward small requests
//! - [`payload`]: deterministic message bytes for ring benchmarks
//! - [`frame_arena_config`]: the arena shape used by the benches

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use bedrock_arena::ArenaConfig;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `count` `(size, align)` pairs from a seeded generator.
///
/// Roughly 80% of sizes are below 256 bytes, the rest up to 16 KiB.
/// Alignments are powers of two from 1 to 64.
pub fn push_sizes(count: usize, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let roll = rng.next_u32();
            let size = if roll % 5 == 0 {
                (rng.next_u32() as usize % (16 * 1024)) + 1
            } else {
                (rng.next_u32() as usize % 256) + 1
            };
            let align = 1usize << (rng.next_u32() % 7);
            (size, align)
        })
        .collect()
}

/// `len` deterministic bytes.
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    ChaCha8Rng::seed_from_u64(seed).fill_bytes(&mut bytes);
    bytes
}

/// 256 MiB reservation committed in 64 KiB steps.
pub fn frame_arena_config() -> ArenaConfig {
    ArenaConfig {
        commit_step: 64 * 1024,
        ..ArenaConfig::new(256 << 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_sizes_are_deterministic_and_valid() {
        let a = push_sizes(500, 7);
        assert_eq!(a, push_sizes(500, 7));
        assert_ne!(a, push_sizes(500, 8));
        for (size, align) in a {
            assert!((1..=16 * 1024).contains(&size));
            assert!(align.is_power_of_two() && align <= 64);
        }
    }

    #[test]
    fn payload_is_deterministic() {
        assert_eq!(payload(64, 1), payload(64, 1));
        assert_eq!(payload(0, 1).len(), 0);
    }

    #[test]
    fn frame_config_validates() {
        assert!(frame_arena_config().validate().is_ok());
    }
}
