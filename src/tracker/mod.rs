// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod mem;
mod sled;

use std::path::Path;

use cid::Cid;

use crate::blocks::ChainEpoch;
use crate::{Result, TrackingStoreType};

pub use self::mem::MemTrackingStore;
pub use self::sled::SledTrackingStore;

/// Durable mapping from CID to the epoch at which the block became hot.
pub trait TrackingStore: Send + Sync {
    fn put(&self, cid: &Cid, epoch: ChainEpoch) -> Result<()>;

    /// Idempotent batch insert; last writer wins on the epoch.
    fn put_batch(&self, cids: &[Cid], epoch: ChainEpoch) -> Result<()>;

    fn get(&self, cid: &Cid) -> Result<Option<ChainEpoch>>;

    fn delete(&self, cid: &Cid) -> Result<()>;

    fn delete_batch(&self, cids: &[Cid]) -> Result<()>;

    /// Invokes the callback for every active record exactly once, in no
    /// particular order.
    fn for_each(&self, f: &mut dyn FnMut(Cid, ChainEpoch) -> Result<()>) -> Result<()>;

    fn sync(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Opens the tracking store backend selected by the configuration.
pub fn open_tracking_store(
    path: &Path,
    kind: TrackingStoreType,
) -> Result<Box<dyn TrackingStore>> {
    match kind {
        TrackingStoreType::Sled => Ok(Box::new(SledTrackingStore::open(path.join("tracker"))?)),
        TrackingStoreType::Mem => Ok(Box::new(MemTrackingStore::default())),
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

    fn subtest_tracking_store(tracker: &dyn TrackingStore) {
        let a = make_cid(b"a");
        let b = make_cid(b"b");
        let c = make_cid(b"c");

        tracker.put(&a, 1).unwrap();
        tracker.put_batch(&[b, c], 2).unwrap();
        assert_eq!(tracker.get(&a).unwrap(), Some(1));
        assert_eq!(tracker.get(&b).unwrap(), Some(2));

        // last writer wins
        tracker.put(&a, 7).unwrap();
        assert_eq!(tracker.get(&a).unwrap(), Some(7));

        let mut seen = Vec::new();
        tracker
            .for_each(&mut |cid, epoch| {
                seen.push((cid, epoch));
                Ok(())
            })
            .unwrap();
        seen.sort();
        let mut expected = vec![(a, 7), (b, 2), (c, 2)];
        expected.sort();
        assert_eq!(seen, expected);

        tracker.delete(&a).unwrap();
        assert_eq!(tracker.get(&a).unwrap(), None);
        tracker.delete_batch(&[b, c]).unwrap();
        assert_eq!(tracker.get(&b).unwrap(), None);

        tracker.sync().unwrap();
    }

    #[test]
    fn mem_tracking_store() {
        let tracker = MemTrackingStore::default();
        subtest_tracking_store(&tracker);
        tracker.close().unwrap();
    }

    #[test]
    fn sled_tracking_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let tracker = SledTrackingStore::open(dir.path().join("tracker")).unwrap();
        subtest_tracking_store(&tracker);
        tracker.close().unwrap();
    }

    #[test]
    fn sled_tracking_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tracker");
        let cid = make_cid(b"persisted");
        {
            let tracker = SledTrackingStore::open(&path).unwrap();
            tracker.put(&cid, 42).unwrap();
            tracker.close().unwrap();
        }
        let tracker = SledTrackingStore::open(&path).unwrap();
        assert_eq!(tracker.get(&cid).unwrap(), Some(42));
    }
}
