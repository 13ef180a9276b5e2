// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use parking_lot::RwLock;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use super::{MarkSet, MarkSetEnv};
use crate::Result;

/// Bits per expected entry. Together with three probes this keeps the false
/// positive rate below 2% at the sizing estimate, and the estimate itself
/// carries 25% headroom.
const BITS_PER_ENTRY: u64 = 10;
/// Number of hash probes per key.
const PROBES: u64 = 3;
/// Filter floor; tiny hints would otherwise degenerate.
const MIN_BITS: u64 = 1 << 16;

/// Environment producing in-memory bloom filter mark sets.
pub struct BloomMarkSetEnv;

impl MarkSetEnv for BloomMarkSetEnv {
    fn create(&self, _name: &str, size_hint: i64) -> Result<Box<dyn MarkSet>> {
        Ok(Box::new(BloomMarkSet::new(size_hint.max(0) as u64)))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A fixed-size bloom filter over CID multihash digests. False positives
/// keep an unreachable block hot for one more compaction cycle; there are
/// no false negatives, so reachable blocks are never purged.
struct BloomMarkSet {
    bits: RwLock<Box<[u8]>>,
    mask: u64,
}

impl BloomMarkSet {
    fn new(size_hint: u64) -> Self {
        let nbits = (size_hint.saturating_mul(BITS_PER_ENTRY))
            .next_power_of_two()
            .max(MIN_BITS);
        Self {
            bits: RwLock::new(vec![0u8; (nbits / 8) as usize].into_boxed_slice()),
            mask: nbits - 1,
        }
    }

    fn positions(&self, cid: &Cid) -> [u64; PROBES as usize] {
        let digest = cid.hash().digest();
        let mut positions = [0u64; PROBES as usize];
        for (probe, position) in positions.iter_mut().enumerate() {
            *position = xxh3_64_with_seed(digest, probe as u64) & self.mask;
        }
        positions
    }
}

impl MarkSet for BloomMarkSet {
    fn mark(&self, cid: &Cid) -> Result<()> {
        let mut bits = self.bits.write();
        for position in self.positions(cid) {
            bits[(position / 8) as usize] |= 1 << (position % 8);
        }
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        let bits = self.bits.read();
        Ok(self
            .positions(cid)
            .iter()
            .all(|position| bits[(position / 8) as usize] & (1 << (position % 8)) != 0))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
