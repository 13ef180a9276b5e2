// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod compact;
mod walk;


use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ahash::{HashSet, HashSetExt};
use chrono::Utc;
use cid::Cid;
use fvm_ipld_encoding::DAG_CBOR;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::blocks::{ChainEpoch, Tipset};
use crate::blockstore::{Blockstore, SettingsStore};
use crate::chain::{ChainAccessor, HeadChange};
use crate::config::{
    Config, COMPACTION_THRESHOLD, DEFAULT_COLD_PURGE_SIZE, EPOCH_DURATION_SECONDS, SYNC_GAP,
};
use crate::debug_log::DebugLog;
use crate::markset::{open_mark_set_env, MapMarkSetEnv, MarkSet, MarkSetEnv};
use crate::tracker::{open_tracking_store, TrackingStore};
use crate::{codec, metrics, Error, Result};

/// Epoch at which the last compaction established its cold frontier.
pub const BASE_EPOCH_KEY: &str = "/splitstore/baseEpoch";
/// Epoch at which the hotstore was initially populated; absence means the
/// warmup has not run yet.
pub const WARMUP_EPOCH_KEY: &str = "/splitstore/warmupEpoch";
/// Last observed size estimate for sizing mark sets.
pub const MARK_SET_SIZE_KEY: &str = "/splitstore/markSetSize";

/// Sentinel for "the hotstore has not been warmed up"; real epochs are
/// never negative, so a warmup at genesis height still registers.
const NO_WARMUP_EPOCH: ChainEpoch = -1;

/// A unified blockstore over a hot and a cold store.
///
/// Reads probe hot then cold; writes go to hot and are recorded in the
/// tracking store at the current write epoch. A background compaction
/// periodically moves objects that are neither recent nor reachable from
/// the hotstore to the coldstore. The splitstore owns its tracking store
/// and mark-set environments and borrows the hot and cold stores for its
/// lifetime; neither store is safe for external mutation while it runs.
///
/// [`SplitStore::open`] produces a store that serves reads and writes;
/// [`SplitStore::start`] attaches it to the chain and enables warmup and
/// compaction. Both `start` and `close` must run within a tokio runtime.
pub struct SplitStore<H, C>
where
    H: Blockstore + 'static,
    C: Blockstore + 'static,
{
    /// Compaction (or warmup) in progress. Transitions: 0 -> 1 on the
    /// trigger CAS, 1 -> 0 when the worker exits.
    compacting: AtomicBool,
    /// Compaction critical section: hot store and tracker are being
    /// mutated destructively. Set strictly inside `compacting == 1`.
    critsection: AtomicBool,
    /// The splitstore is closing; set once, never cleared.
    closing: AtomicBool,

    cfg: Config,

    base_epoch: AtomicI64,
    warmup_epoch: AtomicI64,
    mark_set_size: AtomicI64,
    cold_purge_size: AtomicUsize,

    ds: Arc<dyn SettingsStore>,
    pub(crate) hot: Arc<H>,
    pub(crate) cold: Arc<C>,
    pub(crate) tracker: Box<dyn TrackingStore>,
    env: Box<dyn MarkSetEnv>,
    pub(crate) txn_env: Box<dyn MarkSetEnv>,

    /// Protection for concurrent reads and writes during compaction. The
    /// lock doubles as the facade transaction lock: facade operations hold
    /// it shared, purge batches and protection-set swaps hold it exclusive.
    pub(crate) txn_protect: RwLock<Option<Box<dyn MarkSet>>>,

    pub(crate) state: Mutex<WriteState>,

    chain: OnceLock<Arc<dyn ChainAccessor>>,
    debug: Option<DebugLog>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Current tipset, write epoch and pending writes, guarded together by one
/// short-section mutex.
pub(crate) struct WriteState {
    pub(crate) cur_ts: Option<Arc<Tipset>>,
    pub(crate) write_epoch: ChainEpoch,
    pub(crate) pending_writes: HashSet<Cid>,
}

impl<H, C> SplitStore<H, C>
where
    H: Blockstore + 'static,
    C: Blockstore + 'static,
{
    /// Opens an existing splitstore, or creates a new one backed by the
    /// given hot and cold stores. The returned store must be attached to
    /// the chain with [`SplitStore::start`] to trigger warmup and
    /// compaction.
    pub fn open(
        path: &Path,
        ds: Arc<dyn SettingsStore>,
        hot: Arc<H>,
        cold: Arc<C>,
        cfg: Config,
    ) -> Result<Arc<Self>> {
        let tracker = open_tracking_store(path, cfg.tracking_store_type)?;

        let env = match open_mark_set_env(path, cfg.mark_set_type) {
            Ok(env) => env,
            Err(e) => {
                let _ = tracker.close();
                return Err(e);
            }
        };

        let debug = if cfg.enable_debug_log {
            match DebugLog::open(path) {
                Ok(debug) => Some(debug),
                Err(e) => {
                    let _ = tracker.close();
                    let _ = env.close();
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Self {
            compacting: AtomicBool::new(false),
            critsection: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            cfg,
            base_epoch: AtomicI64::new(0),
            warmup_epoch: AtomicI64::new(NO_WARMUP_EPOCH),
            mark_set_size: AtomicI64::new(0),
            cold_purge_size: AtomicUsize::new(DEFAULT_COLD_PURGE_SIZE),
            ds,
            hot,
            cold,
            tracker,
            env,
            txn_env: Box::new(MapMarkSetEnv),
            txn_protect: RwLock::new(None),
            state: Mutex::new(WriteState {
                cur_ts: None,
                write_epoch: 0,
                pending_writes: HashSet::new(),
            }),
            chain: OnceLock::new(),
            debug,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Returns `Ok(true)` if either store contains the block. A hotstore
    /// hit is treated as an implicit write so the block's write epoch is
    /// refreshed; this keeps objects the VM skips re-writing alive until
    /// the client API can signal the intent explicitly.
    pub fn has(&self, cid: &Cid) -> Result<bool> {
        let txn = self.txn_protect.read();

        if self.hot.has(cid)? {
            if !self.is_pending_write(cid) {
                self.track_write(cid);
                self.protect(&txn, cid);
            }
            return Ok(true);
        }

        Ok(self.cold.has(cid)?)
    }

    /// Returns the block data, probing hot then cold. A coldstore hit is
    /// promoted back into the hotstore so the block ages from the current
    /// write epoch.
    pub fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        let txn = self.txn_protect.read();

        if let Some(block) = self.hot.get(cid)? {
            self.protect(&txn, cid);
            return Ok(Some(block));
        }

        self.log_read_miss(cid);
        let Some(block) = self.cold.get(cid)? else {
            return Ok(None);
        };
        metrics::SPLITSTORE_MISS.inc();
        self.promote_cold(&txn, cid, &block);
        Ok(Some(block))
    }

    /// Returns the size of the block, probing hot then cold.
    pub fn get_size(&self, cid: &Cid) -> Result<Option<usize>> {
        let txn = self.txn_protect.read();

        if let Some(size) = self.hot.get_size(cid)? {
            self.protect(&txn, cid);
            return Ok(Some(size));
        }

        self.log_read_miss(cid);
        let size = self.cold.get_size(cid)?;
        if size.is_some() {
            metrics::SPLITSTORE_MISS.inc();
        }
        Ok(size)
    }

    /// Runs `f` against the block's backing buffer without copying it out
    /// of the store that holds it.
    pub fn view<F, R>(&self, cid: &Cid, f: F) -> Result<Option<R>>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let txn = self.txn_protect.read();

        let mut f = Some(f);
        if let Some(res) = self
            .hot
            .view(cid, |block| (f.take().expect("view callback run once"))(block))?
        {
            self.protect(&txn, cid);
            return Ok(Some(res));
        }

        self.log_read_miss(cid);
        let f = f.take().expect("view callback run once");
        let Some(block) = self.cold.get(cid)? else {
            return Ok(None);
        };
        metrics::SPLITSTORE_MISS.inc();
        self.promote_cold(&txn, cid, &block);
        Ok(Some(f(&block)))
    }

    /// Writes the block to the hotstore and records it as pending.
    pub fn put(&self, cid: &Cid, block: &[u8]) -> Result<()> {
        let txn = self.txn_protect.read();

        self.track_write(cid);

        if let Err(e) = self.hot.put_keyed(cid, block) {
            error!("error putting block {cid} in hotstore: {e}");
            return Err(e.into());
        }

        self.protect(&txn, cid);
        Ok(())
    }

    /// Writes a batch of blocks to the hotstore; pending-write accounting
    /// is atomic, protection marking is best effort.
    pub fn put_many(&self, blocks: &[(Cid, Vec<u8>)]) -> Result<()> {
        let cids: Vec<Cid> = blocks.iter().map(|(cid, _)| *cid).collect();

        let txn = self.txn_protect.read();

        self.track_write_many(&cids);

        if let Err(e) = self.hot.put_many_keyed(blocks) {
            error!("error putting batch in hotstore: {e}");
            return Err(e.into());
        }

        if let Some(protect) = txn.as_ref() {
            let mut failures = 0usize;
            let mut last = None;
            for cid in &cids {
                if let Err(e) = protect.mark(cid) {
                    failures += 1;
                    last = Some(e);
                }
            }
            if let Some(e) = last {
                error!("error protecting {failures} blocks in compaction transaction: {e}");
            }
        }

        Ok(())
    }

    /// Streams every key in the hotstore, then every key in the coldstore.
    /// Dropping the iterator cancels the stream.
    pub fn all_keys(
        &self,
    ) -> Result<Box<dyn Iterator<Item = anyhow::Result<Cid>> + Send + '_>> {
        let hot = self.hot.all_keys()?;
        let cold = self.cold.all_keys()?;
        Ok(Box::new(hot.chain(cold)))
    }

    /// Deletion is owned by compaction; this always fails.
    pub fn delete(&self, _cid: &Cid) -> Result<()> {
        Err(Error::DeleteUnsupported)
    }

    /// Deletion is owned by compaction; this always fails.
    pub fn delete_many(&self, _cids: &[Cid]) -> Result<()> {
        Err(Error::DeleteUnsupported)
    }

    /// Forwarded to both stores.
    pub fn hash_on_read(&self, enabled: bool) {
        self.hot.hash_on_read(enabled);
        self.cold.hash_on_read(enabled);
    }

    /// Attaches the store to the chain: restores persisted metadata, warms
    /// up the hotstore on first start, and spawns the write-epoch clock and
    /// the head-change subscriber.
    pub fn start(self: &Arc<Self>, chain: Arc<dyn ChainAccessor>) -> Result<()> {
        self.chain
            .set(chain.clone())
            .map_err(|_| anyhow::anyhow!("splitstore already started"))?;

        let cur_ts = chain.heaviest_tipset();
        self.state.lock().cur_ts = cur_ts.clone();

        // base epoch; fresh starts adopt the current height
        match self.ds.read_bin(BASE_EPOCH_KEY)? {
            Some(bytes) => {
                self.base_epoch
                    .store(codec::bytes_to_epoch(&bytes)?, Ordering::SeqCst);
            }
            None => {
                if let Some(ts) = &cur_ts {
                    self.set_base_epoch(ts.epoch())?;
                }
            }
        }

        // warmup epoch; absence means the hotstore must be populated
        match self.ds.read_bin(WARMUP_EPOCH_KEY)? {
            Some(bytes) => {
                self.warmup_epoch
                    .store(codec::bytes_to_epoch(&bytes)?, Ordering::SeqCst);
            }
            None => {
                if let Some(ts) = &cur_ts {
                    self.warmup(ts.clone())?;
                }
            }
        }

        if let Some(bytes) = self.ds.read_bin(MARK_SET_SIZE_KEY)? {
            self.mark_set_size
                .store(codec::bytes_to_i64(&bytes)?, Ordering::SeqCst);
        }

        self.update_write_epoch();

        info!(
            "starting splitstore: base epoch {}, warmup epoch {}, write epoch {}",
            self.base_epoch.load(Ordering::SeqCst),
            self.warmup_epoch.load(Ordering::SeqCst),
            self.state.lock().write_epoch
        );

        // write-epoch clock
        let this = self.clone();
        let clock = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if this.closing.load(Ordering::SeqCst) {
                    break;
                }
                this.update_write_epoch();
            }
        });

        // head-change subscription
        let this = self.clone();
        let mut subscriber = chain.subscribe_head_changes();
        let head = tokio::spawn(async move {
            loop {
                if this.closing.load(Ordering::SeqCst) {
                    break;
                }
                match subscriber.recv().await {
                    Ok(HeadChange::Apply(ts)) => {
                        if let Err(e) = this.head_change(&[ts]) {
                            warn!("error handling head change: {e}");
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("head change subscriber lagged: skipping {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.tasks.lock().extend([clock, head]);
        Ok(())
    }

    /// Shuts the store down: waits for a compaction critical section to
    /// drain, flushes pending writes, stops background tasks and closes
    /// owned resources, aggregating every failure.
    pub async fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);

        if self.critsection.load(Ordering::SeqCst) {
            warn!("ongoing compaction in critical section; waiting for it to finish");
            while self.critsection.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        self.flush_pending_writes();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let mut failures = Vec::new();
        if let Err(e) = self.tracker.close() {
            failures.push(format!("tracker: {e}"));
        }
        if let Err(e) = self.env.close() {
            failures.push(format!("mark set env: {e}"));
        }
        if let Err(e) = self.txn_env.close() {
            failures.push(format!("txn mark set env: {e}"));
        }
        if let Some(debug) = &self.debug {
            if let Err(e) = debug.close() {
                failures.push(format!("debug log: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("error closing splitstore: {}", failures.join("; ")).into())
        }
    }

    /// Handles applied tipsets: adopts the new head, advances the write
    /// epoch, and kicks off a compaction when the node is caught up and
    /// enough epochs have elapsed since the last one.
    pub fn head_change(self: &Arc<Self>, apply: &[Arc<Tipset>]) -> Result<()> {
        // revert only
        let Some(cur_ts) = apply.last() else {
            return Ok(());
        };

        let epoch = cur_ts.epoch();
        self.state.lock().cur_ts = Some(cur_ts.clone());
        self.update_write_epoch();

        let lag = Utc::now()
            .timestamp()
            .saturating_sub(cur_ts.min_timestamp() as i64);
        if lag > SYNC_GAP.as_secs() as i64 {
            // don't attempt compaction until we have caught up syncing
            return Ok(());
        }

        if self
            .compacting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // currently compacting; wait for the next head change
            return Ok(());
        }

        if epoch - self.base_epoch.load(Ordering::SeqCst) > COMPACTION_THRESHOLD {
            let this = self.clone();
            let ts = cur_ts.clone();
            tokio::task::spawn_blocking(move || {
                info!("compacting splitstore");
                let start = std::time::Instant::now();
                this.compact(&ts);
                info!("compaction done, took {:?}", start.elapsed());
                this.compacting.store(false, Ordering::SeqCst);
            });
        } else {
            // no compaction necessary
            self.compacting.store(false, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Recomputes the write epoch from the current tipset and wall clock,
    /// flushing pending writes at the old epoch before advancing. Never
    /// regresses.
    pub(crate) fn update_write_epoch(&self) {
        let mut state = self.state.lock();

        let Some(cur_ts) = state.cur_ts.clone() else {
            return;
        };

        let dt = Utc::now()
            .timestamp()
            .saturating_sub(cur_ts.min_timestamp() as i64);

        // a tipset from the future (clock skew) still advances us past it
        let write_epoch = if dt < 0 {
            cur_ts.epoch() + 1
        } else {
            cur_ts.epoch() + dt / EPOCH_DURATION_SECONDS + 1
        };

        if write_epoch > state.write_epoch {
            self.flush_pending_locked(&mut state);
            state.write_epoch = write_epoch;
        }
    }

    /// Flushes the pending-write set into the tracking store at the
    /// current write epoch.
    pub(crate) fn flush_pending_writes(&self) {
        let mut state = self.state.lock();
        self.flush_pending_locked(&mut state);
    }

    fn flush_pending_locked(&self, state: &mut WriteState) {
        if state.pending_writes.is_empty() {
            return;
        }

        let roots: Vec<Cid> = state.pending_writes.iter().copied().collect();
        let mut cids = roots.clone();

        // recursively walk dags to propagate dependent references that were
        // implicitly written through these payloads
        for root in &roots {
            if root.codec() != DAG_CBOR {
                continue;
            }

            let mut walked = HashSet::new();
            let pending = &state.pending_writes;
            let res = self.walk_links(*root, &mut walked, &mut |cid| {
                if !pending.contains(&cid) {
                    cids.push(cid);
                }
                Ok(())
            });
            if let Err(e) = res {
                error!("error tracking dependent writes for {root}: {e}");
            }
        }

        state.pending_writes.clear();

        let epoch = state.write_epoch;
        if let Err(e) = self.tracker.put_batch(&cids, epoch) {
            error!("error putting write batch to tracker: {e}");
        }

        if let Some(debug) = &self.debug {
            debug.log_write_many(state.cur_ts.as_deref(), &cids, epoch);
        }
    }

    fn track_write(&self, cid: &Cid) {
        self.state.lock().pending_writes.insert(*cid);
    }

    fn track_write_many(&self, cids: &[Cid]) {
        let mut state = self.state.lock();
        for cid in cids {
            state.pending_writes.insert(*cid);
        }
    }

    fn is_pending_write(&self, cid: &Cid) -> bool {
        self.state.lock().pending_writes.contains(cid)
    }

    /// Promotes a block served from the coldstore back into the hotstore
    /// so it ages from the current write epoch. Promotion is best effort;
    /// the read has already succeeded.
    fn promote_cold(&self, txn: &Option<Box<dyn MarkSet>>, cid: &Cid, block: &[u8]) {
        if let Err(e) = self.hot.put_keyed(cid, block) {
            warn!("error promoting block {cid} to hotstore: {e}");
            return;
        }
        self.track_write(cid);
        self.protect(txn, cid);
    }

    /// Marks the block in the transactional protection set if a compaction
    /// is active. Failures are logged and suppressed: the worst case is
    /// that the block is purged and later re-fetched from the coldstore.
    fn protect(&self, txn: &Option<Box<dyn MarkSet>>, cid: &Cid) {
        if let Some(protect) = txn.as_ref() {
            if let Err(e) = protect.mark(cid) {
                error!("error protecting {cid} in compaction transaction: {e}");
            }
        }
    }

    fn log_read_miss(&self, cid: &Cid) {
        if self.warmup_epoch.load(Ordering::SeqCst) == NO_WARMUP_EPOCH {
            return;
        }
        if let Some(debug) = &self.debug {
            let cur_ts = self.state.lock().cur_ts.clone();
            debug.log_read_miss(cur_ts.as_deref(), cid);
        }
    }

    pub(crate) fn chain_accessor(&self) -> Result<&Arc<dyn ChainAccessor>> {
        self.chain
            .get()
            .ok_or_else(|| anyhow::anyhow!("splitstore is not started").into())
    }

    pub(crate) fn set_base_epoch(&self, epoch: ChainEpoch) -> Result<()> {
        self.base_epoch.store(epoch, Ordering::SeqCst);
        self.ds
            .write_bin(BASE_EPOCH_KEY, &codec::epoch_to_bytes(epoch))?;
        Ok(())
    }

    pub(crate) fn base_epoch(&self) -> ChainEpoch {
        self.base_epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn warmup_epoch(&self) -> Option<ChainEpoch> {
        match self.warmup_epoch.load(Ordering::SeqCst) {
            NO_WARMUP_EPOCH => None,
            epoch => Some(epoch),
        }
    }

    pub(crate) fn set_warmup_epoch(&self, epoch: ChainEpoch) {
        self.warmup_epoch.store(epoch, Ordering::SeqCst);
    }

    pub(crate) fn mark_set_size(&self) -> i64 {
        self.mark_set_size.load(Ordering::SeqCst)
    }

    /// Bumps the mark-set size estimate to the observed count plus 25%
    /// headroom; a deliberate over-estimate that keeps bloom false-positive
    /// rates stable.
    pub(crate) fn update_mark_set_size(&self, count: i64) {
        if count > self.mark_set_size.load(Ordering::SeqCst) {
            self.mark_set_size
                .store(count + (count >> 2), Ordering::SeqCst);
        }
    }

    pub(crate) fn debug_log(&self) -> Option<&DebugLog> {
        self.debug.as_ref()
    }
}
