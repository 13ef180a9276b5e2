// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use cid::multihash::{Code, MultihashDigest};
use cid::Cid;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use forest_splitstore::blocks::{BlockHeader, ChainEpoch, Tipset};
use forest_splitstore::blockstore::{Blockstore, MemoryBlockstore, SettingsStore};
use forest_splitstore::{
    codec, ChainAccessor, Config, Error, HeadChange, SplitStore, TrackingStoreType,
    BASE_EPOCH_KEY, WARMUP_EPOCH_KEY,
};

const IPLD_RAW: u64 = 0x55;

fn raw_block(data: &[u8]) -> (Cid, Vec<u8>) {
    (
        Cid::new_v1(IPLD_RAW, Code::Blake2b256.digest(data)),
        data.to_vec(),
    )
}

fn mem_config() -> Config {
    Config {
        tracking_store_type: TrackingStoreType::Mem,
        ..Default::default()
    }
}

struct MockChain {
    genesis: BlockHeader,
    heaviest: RwLock<Arc<Tipset>>,
    publisher: broadcast::Sender<HeadChange>,
}

impl MockChain {
    fn with_head(genesis: BlockHeader, head: Arc<Tipset>) -> Self {
        let (publisher, _) = broadcast::channel(16);
        Self {
            genesis,
            heaviest: RwLock::new(head),
            publisher,
        }
    }
}

impl ChainAccessor for MockChain {
    fn genesis(&self) -> anyhow::Result<BlockHeader> {
        Ok(self.genesis.clone())
    }

    fn tipset_by_height(
        &self,
        _epoch: ChainEpoch,
        _anchor: Option<Arc<Tipset>>,
        _prev: bool,
    ) -> anyhow::Result<Arc<Tipset>> {
        Ok(self.heaviest.read().clone())
    }

    fn heaviest_tipset(&self) -> Option<Arc<Tipset>> {
        Some(self.heaviest.read().clone())
    }

    fn subscribe_head_changes(&self) -> broadcast::Receiver<HeadChange> {
        self.publisher.subscribe()
    }
}

fn header_at(epoch: ChainEpoch) -> BlockHeader {
    BlockHeader {
        epoch,
        timestamp: unix_now(),
        ..Default::default()
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[test]
fn reads_route_hot_then_cold() {
    let dir = tempfile::TempDir::new().unwrap();
    let hot = Arc::new(MemoryBlockstore::default());
    let cold = Arc::new(MemoryBlockstore::default());
    let ds = Arc::new(MemoryBlockstore::default());
    let ss = SplitStore::open(
        dir.path(),
        ds as Arc<dyn SettingsStore>,
        hot.clone(),
        cold.clone(),
        mem_config(),
    )
    .unwrap();

    let (in_hot, hot_data) = raw_block(b"lives in hot");
    let (in_cold, cold_data) = raw_block(b"lives in cold");
    let (absent, _) = raw_block(b"nowhere");

    ss.put(&in_hot, &hot_data).unwrap();
    cold.put_keyed(&in_cold, &cold_data).unwrap();

    assert!(ss.has(&in_hot).unwrap());
    assert!(ss.has(&in_cold).unwrap());
    assert!(!ss.has(&absent).unwrap());

    assert_eq!(ss.get(&in_hot).unwrap(), Some(hot_data.clone()));
    assert_eq!(ss.get(&in_cold).unwrap(), Some(cold_data.clone()));
    assert_eq!(ss.get(&absent).unwrap(), None);

    assert_eq!(ss.get_size(&in_hot).unwrap(), Some(hot_data.len()));
    assert_eq!(ss.view(&in_hot, |b| b.len()).unwrap(), Some(hot_data.len()));
    assert_eq!(ss.view(&absent, |b| b.len()).unwrap(), None);

    // a coldstore hit is promoted into the hotstore
    assert!(hot.has(&in_cold).unwrap());
}

#[test]
fn put_many_and_all_keys() {
    let dir = tempfile::TempDir::new().unwrap();
    let hot = Arc::new(MemoryBlockstore::default());
    let cold = Arc::new(MemoryBlockstore::default());
    let ds = Arc::new(MemoryBlockstore::default());
    let ss = SplitStore::open(
        dir.path(),
        ds as Arc<dyn SettingsStore>,
        hot,
        cold.clone(),
        mem_config(),
    )
    .unwrap();

    let blocks: Vec<(Cid, Vec<u8>)> = (0u8..5).map(|i| raw_block(&[i])).collect();
    ss.put_many(&blocks).unwrap();

    let (archived, archived_data) = raw_block(b"archived");
    cold.put_keyed(&archived, &archived_data).unwrap();

    let mut keys: Vec<Cid> = ss.all_keys().unwrap().map(Result::unwrap).collect();
    keys.sort();
    let mut expected: Vec<Cid> = blocks.iter().map(|(cid, _)| *cid).collect();
    expected.push(archived);
    expected.sort();
    assert_eq!(keys, expected);
}

#[test]
fn deletes_are_refused() {
    let dir = tempfile::TempDir::new().unwrap();
    let hot = Arc::new(MemoryBlockstore::default());
    let cold = Arc::new(MemoryBlockstore::default());
    let ds = Arc::new(MemoryBlockstore::default());
    let ss = SplitStore::open(
        dir.path(),
        ds as Arc<dyn SettingsStore>,
        hot,
        cold,
        mem_config(),
    )
    .unwrap();

    let (cid, data) = raw_block(b"keep me");
    ss.put(&cid, &data).unwrap();

    assert!(matches!(ss.delete(&cid), Err(Error::DeleteUnsupported)));
    assert!(matches!(
        ss.delete_many(&[cid]),
        Err(Error::DeleteUnsupported)
    ));
    assert!(ss.has(&cid).unwrap());
    ss.hash_on_read(true);
}

#[tokio::test(flavor = "multi_thread")]
async fn base_epoch_survives_restarts_and_never_regresses() {
    let dir = tempfile::TempDir::new().unwrap();
    let ds = Arc::new(MemoryBlockstore::default());

    // pretend a warmup already happened so start() doesn't need chain data
    ds.write_bin(WARMUP_EPOCH_KEY, &codec::epoch_to_bytes(0))
        .unwrap();

    {
        let hot = Arc::new(MemoryBlockstore::default());
        let cold = Arc::new(MemoryBlockstore::default());
        let ss = SplitStore::open(
            dir.path(),
            ds.clone() as Arc<dyn SettingsStore>,
            hot,
            cold,
            mem_config(),
        )
        .unwrap();

        let genesis = header_at(0);
        let head = Arc::new(Tipset::from(&header_at(123)));
        let chain = Arc::new(MockChain::with_head(genesis, head));
        ss.start(chain).unwrap();
        ss.close().await.unwrap();
    }

    let persisted =
        codec::bytes_to_epoch(&ds.read_bin(BASE_EPOCH_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(persisted, 123);

    // a restart that comes up on a lower head must not clobber the base
    {
        let hot = Arc::new(MemoryBlockstore::default());
        let cold = Arc::new(MemoryBlockstore::default());
        let ss = SplitStore::open(
            dir.path(),
            ds.clone() as Arc<dyn SettingsStore>,
            hot,
            cold,
            mem_config(),
        )
        .unwrap();

        let genesis = header_at(0);
        let head = Arc::new(Tipset::from(&header_at(50)));
        let chain = Arc::new(MockChain::with_head(genesis, head));
        ss.start(chain).unwrap();
        ss.close().await.unwrap();
    }

    let persisted =
        codec::bytes_to_epoch(&ds.read_bin(BASE_EPOCH_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(persisted, 123);
}
