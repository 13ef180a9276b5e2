// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use cid::Cid;
use sled::{Config, Db, Mode, Tree};

use super::{Blockstore, SettingsStore};
use crate::Error;

const BLOCKS_TREE: &str = "blocks";
const SETTINGS_TREE: &str = "settings";

/// Sled-backed blockstore. Blocks are keyed by their CID bytes; settings
/// live in a dedicated tree.
#[derive(Debug)]
pub struct SledBlockstore {
    db: Db,
    blocks: Tree,
    settings: Tree,
}

impl SledBlockstore {
    pub fn open<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let db = Config::default()
            .path(path)
            .mode(Mode::HighThroughput)
            .open()?;
        Self::wrap(db)
    }

    /// Initialize an in-memory database. This will not persist data.
    pub fn temporary() -> Result<Self, Error> {
        Self::wrap(Config::default().temporary(true).open()?)
    }

    fn wrap(db: Db) -> Result<Self, Error> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let settings = db.open_tree(SETTINGS_TREE)?;
        Ok(Self {
            db,
            blocks,
            settings,
        })
    }

    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

impl Blockstore for SledBlockstore {
    fn has(&self, k: &Cid) -> anyhow::Result<bool> {
        Ok(self.blocks.contains_key(k.to_bytes())?)
    }

    fn get(&self, k: &Cid) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blocks.get(k.to_bytes())?.map(|v| v.as_ref().to_vec()))
    }

    fn get_size(&self, k: &Cid) -> anyhow::Result<Option<usize>> {
        Ok(self.blocks.get(k.to_bytes())?.map(|v| v.len()))
    }

    fn put_keyed(&self, k: &Cid, block: &[u8]) -> anyhow::Result<()> {
        self.blocks.insert(k.to_bytes(), block)?;
        Ok(())
    }

    fn put_many_keyed(&self, blocks: &[(Cid, Vec<u8>)]) -> anyhow::Result<()> {
        let mut batch = sled::Batch::default();
        for (k, block) in blocks {
            batch.insert(k.to_bytes(), block.as_slice());
        }
        self.blocks.apply_batch(batch)?;
        Ok(())
    }

    fn delete_many(&self, keys: &[Cid]) -> anyhow::Result<()> {
        let mut batch = sled::Batch::default();
        for k in keys {
            batch.remove(k.to_bytes());
        }
        self.blocks.apply_batch(batch)?;
        Ok(())
    }

    fn view<F, R>(&self, k: &Cid, f: F) -> anyhow::Result<Option<R>>
    where
        F: FnOnce(&[u8]) -> R,
    {
        Ok(self.blocks.get(k.to_bytes())?.map(|v| f(v.as_ref())))
    }

    fn all_keys(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Cid>> + Send + '_>> {
        Ok(Box::new(self.blocks.iter().keys().map(|key| {
            let key = key?;
            Cid::try_from(key.as_ref()).map_err(anyhow::Error::from)
        })))
    }
}

impl SettingsStore for SledBlockstore {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.settings.get(key)?.map(|v| v.as_ref().to_vec()))
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.settings.insert(key, value)?;
        Ok(())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.settings.contains_key(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::multihash::{Code, MultihashDigest};
    use fvm_ipld_encoding::DAG_CBOR;

    fn block(data: &[u8]) -> (Cid, Vec<u8>) {
        (
            Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(data)),
            data.to_vec(),
        )
    }

    #[test]
    fn put_get_delete() {
        let db = SledBlockstore::temporary().unwrap();
        let (cid, data) = block(b"cold block");
        db.put_keyed(&cid, &data).unwrap();
        assert!(db.has(&cid).unwrap());
        assert_eq!(db.get(&cid).unwrap(), Some(data.clone()));
        assert_eq!(db.get_size(&cid).unwrap(), Some(data.len()));
        assert_eq!(db.view(&cid, |b| b.to_vec()).unwrap(), Some(data));

        db.delete_many(&[cid]).unwrap();
        assert!(!db.has(&cid).unwrap());
    }

    #[test]
    fn batched_puts_and_key_stream() {
        let db = SledBlockstore::temporary().unwrap();
        let blocks: Vec<_> = (0u8..10).map(|i| block(&[i])).collect();
        db.put_many_keyed(&blocks).unwrap();

        let mut keys: Vec<Cid> = db.all_keys().unwrap().map(Result::unwrap).collect();
        keys.sort();
        let mut expected: Vec<Cid> = blocks.iter().map(|(cid, _)| *cid).collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn settings_are_separate_from_blocks() {
        let db = SledBlockstore::temporary().unwrap();
        db.write_bin("/splitstore/baseEpoch", &[1, 2, 3]).unwrap();
        assert!(SettingsStore::exists(&db, "/splitstore/baseEpoch").unwrap());
        assert_eq!(
            db.read_bin("/splitstore/baseEpoch").unwrap(),
            Some(vec![1, 2, 3])
        );
        assert_eq!(db.all_keys().unwrap().count(), 0);
    }
}
