// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod bloom;
mod map;
mod sled;

use std::path::Path;

use cid::Cid;

use crate::{MarkSetType, Result};

pub use self::bloom::BloomMarkSetEnv;
pub use self::map::MapMarkSetEnv;
pub use self::sled::SledMarkSetEnv;

/// A set of CIDs recording reachability results. Possibly probabilistic:
/// implementations may report false positives but never false negatives.
pub trait MarkSet: Send + Sync {
    fn mark(&self, cid: &Cid) -> Result<()>;

    fn has(&self, cid: &Cid) -> Result<bool>;

    /// Releases the set's resources; durable backends discard their data.
    fn close(&self) -> Result<()>;
}

/// Factory for mark sets; one environment outlives the per-compaction sets
/// it creates.
pub trait MarkSetEnv: Send + Sync {
    fn create(&self, name: &str, size_hint: i64) -> Result<Box<dyn MarkSet>>;

    fn close(&self) -> Result<()>;
}

/// Opens the mark set environment selected by the configuration.
pub fn open_mark_set_env(path: &Path, kind: MarkSetType) -> Result<Box<dyn MarkSetEnv>> {
    match kind {
        MarkSetType::Bloom => Ok(Box::new(BloomMarkSetEnv)),
        MarkSetType::Sled => Ok(Box::new(SledMarkSetEnv::open(path.join("markset"))?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::multihash::{Code, MultihashDigest};
    use fvm_ipld_encoding::DAG_CBOR;

    fn make_cid(data: &[u8]) -> Cid {
        Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(data))
    }

    fn subtest_mark_set(env: &dyn MarkSetEnv) {
        let set = env.create("live", 128).unwrap();
        let a = make_cid(b"marked");
        let b = make_cid(b"unmarked");

        assert!(!set.has(&a).unwrap());
        set.mark(&a).unwrap();
        assert!(set.has(&a).unwrap());
        assert!(!set.has(&b).unwrap());
        set.close().unwrap();
    }

    #[test]
    fn bloom_mark_set() {
        subtest_mark_set(&BloomMarkSetEnv);
    }

    #[test]
    fn map_mark_set() {
        subtest_mark_set(&MapMarkSetEnv);
    }

    #[test]
    fn sled_mark_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let env = SledMarkSetEnv::open(dir.path().join("markset")).unwrap();
        subtest_mark_set(&env);
        env.close().unwrap();
    }

    #[test]
    fn sled_mark_set_discards_on_close() {
        let dir = tempfile::TempDir::new().unwrap();
        let env = SledMarkSetEnv::open(dir.path().join("markset")).unwrap();
        let cid = make_cid(b"ephemeral");

        let set = env.create("live", 16).unwrap();
        set.mark(&cid).unwrap();
        set.close().unwrap();

        // a freshly created set with the same name starts out empty
        let set = env.create("live", 16).unwrap();
        assert!(!set.has(&cid).unwrap());
        set.close().unwrap();
        env.close().unwrap();
    }

    #[test]
    fn bloom_mark_set_dense() {
        let env = BloomMarkSetEnv;
        let set = env.create("live", 4096).unwrap();
        let cids: Vec<Cid> = (0u32..4096)
            .map(|i| make_cid(&i.to_be_bytes()))
            .collect();
        for cid in &cids {
            set.mark(cid).unwrap();
        }
        // no false negatives
        for cid in &cids {
            assert!(set.has(cid).unwrap());
        }
        set.close().unwrap();
    }
}
