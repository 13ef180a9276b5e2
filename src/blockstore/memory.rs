// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use ahash::HashMap;
use cid::Cid;
use parking_lot::RwLock;

use super::{Blockstore, SettingsStore};

/// A thread-safe in-memory blockstore, with a settings map alongside so it
/// can double as a metadata datastore in tests.
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
    settings: RwLock<HashMap<String, Vec<u8>>>,
}

impl Blockstore for MemoryBlockstore {
    fn has(&self, k: &Cid) -> anyhow::Result<bool> {
        Ok(self.blocks.read().contains_key(k))
    }

    fn get(&self, k: &Cid) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().get(k).cloned())
    }

    fn put_keyed(&self, k: &Cid, block: &[u8]) -> anyhow::Result<()> {
        self.blocks.write().insert(*k, block.to_vec());
        Ok(())
    }

    fn put_many_keyed(&self, blocks: &[(Cid, Vec<u8>)]) -> anyhow::Result<()> {
        let mut db = self.blocks.write();
        for (k, block) in blocks {
            db.insert(*k, block.clone());
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[Cid]) -> anyhow::Result<()> {
        let mut db = self.blocks.write();
        for k in keys {
            db.remove(k);
        }
        Ok(())
    }

    fn all_keys(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Cid>> + Send + '_>> {
        let keys: Vec<Cid> = self.blocks.read().keys().copied().collect();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }
}

impl SettingsStore for MemoryBlockstore {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.settings.read().get(key).cloned())
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.settings.write().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.settings.read().contains_key(key))
    }
}
