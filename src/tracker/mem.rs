// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use ahash::HashMap;
use cid::Cid;
use parking_lot::RwLock;

use super::TrackingStore;
use crate::blocks::ChainEpoch;
use crate::Result;

/// In-memory tracking store, for tests and read-only access.
#[derive(Debug, Default)]
pub struct MemTrackingStore {
    records: RwLock<HashMap<Cid, ChainEpoch>>,
}

impl TrackingStore for MemTrackingStore {
    fn put(&self, cid: &Cid, epoch: ChainEpoch) -> Result<()> {
        self.records.write().insert(*cid, epoch);
        Ok(())
    }

    fn put_batch(&self, cids: &[Cid], epoch: ChainEpoch) -> Result<()> {
        let mut records = self.records.write();
        for cid in cids {
            records.insert(*cid, epoch);
        }
        Ok(())
    }

    fn get(&self, cid: &Cid) -> Result<Option<ChainEpoch>> {
        Ok(self.records.read().get(cid).copied())
    }

    fn delete(&self, cid: &Cid) -> Result<()> {
        self.records.write().remove(cid);
        Ok(())
    }

    fn delete_batch(&self, cids: &[Cid]) -> Result<()> {
        let mut records = self.records.write();
        for cid in cids {
            records.remove(cid);
        }
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(Cid, ChainEpoch) -> Result<()>) -> Result<()> {
        // snapshot so the callback is free to mutate the store
        let records: Vec<(Cid, ChainEpoch)> = self
            .records
            .read()
            .iter()
            .map(|(cid, epoch)| (*cid, *epoch))
            .collect();
        for (cid, epoch) in records {
            f(cid, epoch)?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
