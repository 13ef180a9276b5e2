// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use ahash::{HashSet, HashSetExt};
use cid::Cid;
use parking_lot::RwLock;

use super::{MarkSet, MarkSetEnv};
use crate::Result;

/// Environment producing exact in-memory mark sets. Used for the
/// transactional protection set, which must never report false positives:
/// a false positive there would leave a purge candidate in the hotstore
/// forever without a tracking entry.
#[derive(Debug, Default)]
pub struct MapMarkSetEnv;

impl MarkSetEnv for MapMarkSetEnv {
    fn create(&self, _name: &str, size_hint: i64) -> Result<Box<dyn MarkSet>> {
        Ok(Box::new(MapMarkSet {
            set: RwLock::new(HashSet::with_capacity(size_hint.max(0) as usize)),
        }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MapMarkSet {
    set: RwLock<HashSet<Cid>>,
}

impl MarkSet for MapMarkSet {
    fn mark(&self, cid: &Cid) -> Result<()> {
        self.set.write().insert(*cid);
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.set.read().contains(cid))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
