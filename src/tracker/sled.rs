// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use cid::Cid;
use sled::{Config, Db, Mode};

use super::TrackingStore;
use crate::blocks::ChainEpoch;
use crate::{codec, Result};

/// Sled-backed tracking store. Keys are CID bytes, values varint epochs.
/// Single puts are batched by the caller; sled syncs are deferred to
/// [`TrackingStore::sync`].
#[derive(Debug)]
pub struct SledTrackingStore {
    db: Db,
}

impl SledTrackingStore {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let db = Config::default()
            .path(path)
            .mode(Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }
}

impl TrackingStore for SledTrackingStore {
    fn put(&self, cid: &Cid, epoch: ChainEpoch) -> Result<()> {
        self.db
            .insert(cid.to_bytes(), codec::epoch_to_bytes(epoch))?;
        Ok(())
    }

    fn put_batch(&self, cids: &[Cid], epoch: ChainEpoch) -> Result<()> {
        let value = codec::epoch_to_bytes(epoch);
        let mut batch = sled::Batch::default();
        for cid in cids {
            batch.insert(cid.to_bytes(), value.as_slice());
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn get(&self, cid: &Cid) -> Result<Option<ChainEpoch>> {
        match self.db.get(cid.to_bytes())? {
            Some(value) => Ok(Some(codec::bytes_to_epoch(value.as_ref())?)),
            None => Ok(None),
        }
    }

    fn delete(&self, cid: &Cid) -> Result<()> {
        self.db.remove(cid.to_bytes())?;
        Ok(())
    }

    fn delete_batch(&self, cids: &[Cid]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for cid in cids {
            batch.remove(cid.to_bytes());
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(Cid, ChainEpoch) -> Result<()>) -> Result<()> {
        for item in self.db.iter() {
            let (key, value) = item?;
            let cid = Cid::try_from(key.as_ref()).map_err(anyhow::Error::from)?;
            f(cid, codec::bytes_to_epoch(value.as_ref())?)?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
