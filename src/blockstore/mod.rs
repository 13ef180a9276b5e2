// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod memory;
mod sled;

use std::sync::Arc;

use cid::Cid;

pub use self::memory::MemoryBlockstore;
pub use self::sled::SledBlockstore;

/// Core blockstore capability set consumed by the splitstore. Absence is
/// signalled with `Ok(None)` on reads, never with an error.
pub trait Blockstore: Send + Sync {
    /// Returns `Ok(true)` if the store contains the block.
    fn has(&self, k: &Cid) -> anyhow::Result<bool>;

    /// Returns the block data, if present.
    fn get(&self, k: &Cid) -> anyhow::Result<Option<Vec<u8>>>;

    /// Returns the size of the block, if present.
    fn get_size(&self, k: &Cid) -> anyhow::Result<Option<usize>> {
        Ok(self.get(k)?.map(|block| block.len()))
    }

    /// Puts the block under its pre-computed CID.
    fn put_keyed(&self, k: &Cid, block: &[u8]) -> anyhow::Result<()>;

    /// Puts a batch of pre-keyed blocks.
    fn put_many_keyed(&self, blocks: &[(Cid, Vec<u8>)]) -> anyhow::Result<()> {
        for (k, block) in blocks {
            self.put_keyed(k, block)?;
        }
        Ok(())
    }

    /// Deletes a batch of blocks. Missing keys are ignored.
    fn delete_many(&self, keys: &[Cid]) -> anyhow::Result<()>;

    /// Runs `f` against the block's backing buffer without copying it out.
    /// Implementations must not invoke `f` when returning `Ok(None)`.
    fn view<F, R>(&self, k: &Cid, f: F) -> anyhow::Result<Option<R>>
    where
        F: FnOnce(&[u8]) -> R,
        Self: Sized,
    {
        Ok(self.get(k)?.map(|block| f(&block)))
    }

    /// Streams every key in the store. Dropping the iterator cancels the
    /// stream.
    fn all_keys(&self) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Cid>> + Send + '_>>;

    /// Toggles block validation against the CID on read.
    fn hash_on_read(&self, _enabled: bool) {}

    /// Returns the garbage collection extension, if the store supports it.
    fn gc(&self) -> Option<&dyn BlockstoreGc> {
        None
    }
}

/// Optional blockstore extension for stores that can reclaim space after a
/// bulk deletion. Probed through [`Blockstore::gc`] rather than per call.
pub trait BlockstoreGc {
    /// Compacts the store's on-disk representation.
    fn compact(&self) -> anyhow::Result<()>;

    /// Reclaims space released by deletions.
    fn collect_garbage(&self) -> anyhow::Result<()>;
}

/// Interface used to store and retrieve settings from the metadata
/// datastore. This should be used for non-IPLD data only; blocks go through
/// the [`Blockstore`] trait.
pub trait SettingsStore: Send + Sync {
    /// Reads a binary field from the settings store.
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Writes a binary field to the settings store.
    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Returns `Ok(true)` if the key exists in the store.
    fn exists(&self, key: &str) -> anyhow::Result<bool>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Arc<T> {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        SettingsStore::read_bin(self.as_ref(), key)
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        SettingsStore::write_bin(self.as_ref(), key, value)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        SettingsStore::exists(self.as_ref(), key)
    }
}
