// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use ahash::{HashSet, HashSetExt};
use cid::Cid;
use fvm_ipld_encoding::{from_slice, DAG_CBOR};
use libipld_core::ipld::Ipld;
use tracing::{error, info, warn};

use crate::blocks::{ChainEpoch, Tipset};
use crate::blockstore::Blockstore;
use crate::config::{BATCH_SIZE, COMPACTION_BOUNDARY, COMPACTION_SLACK};
use crate::markset::MarkSet;
use crate::{codec, metrics, Error, Result};

use super::{SplitStore, MARK_SET_SIZE_KEY, WARMUP_EPOCH_KEY};

impl<H, C> SplitStore<H, C>
where
    H: Blockstore + 'static,
    C: Blockstore + 'static,
{
    /// Populates the hotstore from the coldstore on first start: seeds the
    /// genesis state in-line, then walks the current tipset on a blocking
    /// worker. Mutually exclusive with compaction through the `compacting`
    /// flag.
    pub(crate) fn warmup(self: &Arc<Self>, cur_ts: Arc<Tipset>) -> Result<()> {
        self.load_genesis_state()?;

        if self
            .compacting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(anyhow::anyhow!("failed to acquire compaction lock for warmup").into());
        }

        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            info!("warming up hotstore");
            let start = Instant::now();
            match this.do_warmup(&cur_ts) {
                Ok(()) => info!("warmup done, took {:?}", start.elapsed()),
                Err(e) => error!("error warming up hotstore: {e}"),
            }
            this.compacting.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Makes sure the genesis block and everything reachable from its state
    /// root is in the hotstore, copying from the coldstore as needed.
    /// Objects absent from the coldstore are tolerated.
    fn load_genesis_state(&self) -> Result<()> {
        let genesis = self.chain_accessor()?.genesis()?;
        let (genesis_cid, genesis_block) = genesis.storage_block();

        if !self.hot.has(&genesis_cid)? {
            self.hot.put_keyed(&genesis_cid, &genesis_block)?;
        }

        let mut walked = HashSet::new();
        self.load_genesis_links(genesis.state_root, &mut walked)
    }

    fn load_genesis_links(&self, cid: Cid, walked: &mut HashSet<Cid>) -> Result<()> {
        if !walked.insert(cid) {
            return Ok(());
        }

        let data = if let Some(data) = self.hot.get(&cid)? {
            data
        } else if let Some(data) = self.cold.get(&cid)? {
            self.hot.put_keyed(&cid, &data)?;
            data
        } else {
            return Ok(());
        };

        if cid.codec() != DAG_CBOR {
            return Ok(());
        }

        let ipld: Ipld = from_slice(&data).map_err(|source| Error::Encoding { cid, source })?;
        self.load_genesis_ipld(&ipld, walked)
    }

    fn load_genesis_ipld(&self, ipld: &Ipld, walked: &mut HashSet<Cid>) -> Result<()> {
        match ipld {
            Ipld::Map(map) => {
                for value in map.values() {
                    self.load_genesis_ipld(value, walked)?;
                }
            }
            Ipld::List(list) => {
                for value in list {
                    self.load_genesis_ipld(value, walked)?;
                }
            }
            Ipld::Link(cid) => self.load_genesis_links(*cid, walked)?,
            _ => (),
        }
        Ok(())
    }

    /// Walks the chain at the current height and copies everything visited
    /// that is missing from the hotstore out of the coldstore, recording
    /// each batch in the tracking store.
    pub(crate) fn do_warmup(&self, cur_ts: &Tipset) -> Result<()> {
        let epoch = cur_ts.epoch();

        let mut batch_hot: Vec<(Cid, Vec<u8>)> = Vec::with_capacity(BATCH_SIZE);
        let mut batch_track: Vec<Cid> = Vec::with_capacity(BATCH_SIZE);

        let mut count = 0i64;
        let mut xcount = 0i64;
        let mut missing = 0i64;

        self.walk_chain(cur_ts, epoch, false, self.cfg.hot_headers, &mut |cid| {
            count += 1;

            if self.hot.has(&cid)? {
                return Ok(());
            }

            let Some(block) = self.cold.get(&cid)? else {
                missing += 1;
                return Ok(());
            };
            xcount += 1;

            batch_track.push(cid);
            batch_hot.push((cid, block));

            if batch_hot.len() == BATCH_SIZE {
                self.tracker.put_batch(&batch_track, epoch)?;
                batch_track.clear();

                self.hot.put_many_keyed(&batch_hot)?;
                batch_hot.clear();
            }

            Ok(())
        })?;

        if !batch_hot.is_empty() {
            self.tracker.put_batch(&batch_track, epoch)?;
            self.hot.put_many_keyed(&batch_hot)?;
        }

        info!("warmup stats: visited {count}, warm {xcount}, missing {missing}");

        self.update_mark_set_size(count);
        if let Err(e) = self
            .ds
            .write_bin(MARK_SET_SIZE_KEY, &codec::i64_to_bytes(self.mark_set_size()))
        {
            warn!("error saving mark set size: {e}");
        }

        self.ds
            .write_bin(WARMUP_EPOCH_KEY, &codec::epoch_to_bytes(epoch))?;
        self.set_warmup_epoch(epoch);

        Ok(())
    }

    /// Compaction worker entry point. Errors are logged, not propagated;
    /// the next head change is free to retry.
    pub(crate) fn compact(&self, cur_ts: &Tipset) {
        if self.mark_set_size() == 0 {
            info!("estimating mark set size");
            let start = Instant::now();
            if let Err(e) = self.estimate_mark_set_size(cur_ts) {
                error!("error estimating mark set size: {e}; aborting compaction");
                return;
            }
            info!(
                "estimating mark set size done, took {:?}, size {}",
                start.elapsed(),
                self.mark_set_size()
            );
        } else {
            info!("current mark set size estimate: {}", self.mark_set_size());
        }

        let start = Instant::now();
        let result = self.do_compact(cur_ts);
        metrics::COMPACTION_SECONDS.observe(start.elapsed().as_secs_f64());

        if let Err(e) = result {
            error!("compaction error: {e}");
        }
    }

    /// Dry chain walk to size the mark set when no estimate has been
    /// persisted yet.
    fn estimate_mark_set_size(&self, cur_ts: &Tipset) -> Result<()> {
        let mut count = 0i64;
        self.walk_chain(cur_ts, cur_ts.epoch(), false, self.cfg.hot_headers, &mut |_| {
            count += 1;
            Ok(())
        })?;

        self.update_mark_set_size(count);
        Ok(())
    }

    pub(crate) fn do_compact(&self, cur_ts: &Tipset) -> Result<()> {
        let current_epoch = cur_ts.epoch();
        let boundary_epoch = current_epoch - COMPACTION_BOUNDARY;
        let cold_epoch = boundary_epoch - COMPACTION_SLACK;

        info!(
            "running compaction: current epoch {current_epoch}, base epoch {}, boundary epoch {boundary_epoch}, cold epoch {cold_epoch}",
            self.base_epoch()
        );

        let size_hint = self.mark_set_size();
        let mark_set = self.env.create("live", size_hint)?;

        // install the purge protection filter under the exclusive lock;
        // facade operations starting after this point mark into it
        let protect = match self.txn_env.create("protected", size_hint) {
            Ok(protect) => protect,
            Err(e) => {
                let _ = mark_set.close();
                return Err(e);
            }
        };
        *self.txn_protect.write() = Some(protect);

        let result = self.compact_protected(cur_ts, boundary_epoch, cold_epoch, mark_set.as_ref());

        if let Some(protect) = self.txn_protect.write().take() {
            if let Err(e) = protect.close() {
                warn!("error closing transactional mark set: {e}");
            }
        }
        if let Err(e) = mark_set.close() {
            warn!("error closing mark set: {e}");
        }
        self.critsection.store(false, Ordering::SeqCst);

        if let Some(debug) = self.debug_log() {
            debug.flush();
        }

        result
    }

    fn compact_protected(
        &self,
        cur_ts: &Tipset,
        boundary_epoch: ChainEpoch,
        cold_epoch: ChainEpoch,
        mark_set: &dyn MarkSet,
    ) -> Result<()> {
        // flush pending writes so the tracker reflects the current write set
        self.flush_pending_writes();

        // 1. mark reachable objects by walking the chain down to the boundary
        info!("marking reachable blocks down to epoch {boundary_epoch}");
        let start_mark = Instant::now();

        let mut count = 0i64;
        self.walk_chain(
            cur_ts,
            boundary_epoch,
            true,
            self.cfg.hot_headers,
            &mut |cid| {
                count += 1;
                mark_set.mark(&cid)
            },
        )?;

        self.update_mark_set_size(count);
        info!(
            "marking done, took {:?}, marked {count}",
            start_mark.elapsed()
        );

        // 2. iterate the tracking store and collect unreachable cold objects
        info!("collecting cold objects");
        let start_collect = Instant::now();

        let mut cold = Vec::with_capacity(self.cold_purge_size.load(Ordering::SeqCst));
        let mut hot_cnt = 0usize;
        let mut cold_cnt = 0usize;
        let mut live_cnt = 0usize;

        self.tracker.for_each(&mut |cid, write_epoch| {
            // recently written objects stay hot
            if write_epoch > cold_epoch {
                hot_cnt += 1;
                return Ok(());
            }

            // reachable within the cold boundary
            if mark_set.has(&cid)? {
                hot_cnt += 1;
                return Ok(());
            }

            // accessed concurrently with this compaction
            let protected = match self.txn_protect.read().as_ref() {
                Some(protect) => protect.has(&cid)?,
                None => false,
            };
            if protected {
                live_cnt += 1;
                return Ok(());
            }

            cold.push(cid);
            cold_cnt += 1;
            Ok(())
        })?;

        if cold_cnt > 0 {
            self.cold_purge_size
                .store(cold_cnt + (cold_cnt >> 2), Ordering::SeqCst);
        }

        info!("collection done, took {:?}", start_collect.elapsed());
        info!("compaction stats: hot {hot_cnt}, cold {cold_cnt}, live {live_cnt}");
        metrics::COMPACTION_HOT.set(hot_cnt as i64);
        metrics::COMPACTION_COLD.set(cold_cnt as i64);

        // enter critical section
        self.critsection.store(true, Ordering::SeqCst);

        if self.closing.load(Ordering::SeqCst) {
            info!("splitstore is closing; aborting compaction");
            return Err(Error::Closing);
        }

        // 3. copy the cold objects into the coldstore
        info!("moving cold blocks to the coldstore");
        let start_move = Instant::now();
        self.move_cold_blocks(&cold)?;
        info!("moving done, took {:?}", start_move.elapsed());

        // 4. purge the cold objects from the hotstore
        info!("purging cold objects from the hotstore");
        let start_purge = Instant::now();
        self.purge(cur_ts, &cold)?;
        info!("purging done, took {:?}", start_purge.elapsed());

        // we are done; do some housekeeping
        self.tracker.sync()?;
        self.gc_hotstore();

        self.set_base_epoch(cold_epoch)?;
        self.ds
            .write_bin(MARK_SET_SIZE_KEY, &codec::i64_to_bytes(self.mark_set_size()))?;

        Ok(())
    }

    fn move_cold_blocks(&self, cold: &[Cid]) -> Result<()> {
        let mut batch: Vec<(Cid, Vec<u8>)> = Vec::with_capacity(BATCH_SIZE);

        for cid in cold {
            let Some(block) = self.hot.get(cid)? else {
                // the node may have been killed after a previous run purged
                // the block but before it deleted the tracking entry; drop
                // the dangling entry
                self.tracker.delete(cid)?;
                continue;
            };

            batch.push((*cid, block));
            if batch.len() == BATCH_SIZE {
                self.cold.put_many_keyed(&batch)?;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            self.cold.put_many_keyed(&batch)?;
        }

        Ok(())
    }

    /// Deletes the moved blocks from the tracker and the hotstore in
    /// batches, re-checking the protection set under the exclusive
    /// transaction lock: a concurrent read during the move phase may have
    /// promoted a candidate back to live.
    pub(crate) fn purge(&self, cur_ts: &Tipset, cold: &[Cid]) -> Result<()> {
        let mut dead: Vec<Cid> = Vec::with_capacity(BATCH_SIZE);
        let mut purge_cnt = 0usize;
        let mut live_cnt = 0usize;

        for chunk in cold.chunks(BATCH_SIZE) {
            dead.clear();

            let txn = self.txn_protect.write();
            for cid in chunk {
                let live = match txn.as_ref() {
                    Some(protect) => protect.has(cid)?,
                    None => false,
                };
                if live {
                    live_cnt += 1;
                    continue;
                }

                dead.push(*cid);
                if let Some(debug) = self.debug_log() {
                    debug.log_move(Some(cur_ts), cid);
                }
            }

            self.tracker.delete_batch(&dead)?;
            self.hot.delete_many(&dead)?;
            purge_cnt += dead.len();
        }

        info!("purged {purge_cnt} objects, retained {live_cnt} live");
        Ok(())
    }

    /// Invokes the hotstore's optional space-reclamation hooks after a
    /// purge. Failures are logged; the compaction has already succeeded.
    fn gc_hotstore(&self) {
        let Some(gc) = self.hot.gc() else {
            return;
        };

        info!("compacting hotstore");
        let start = Instant::now();
        if let Err(e) = gc.compact() {
            warn!("error compacting hotstore: {e}");
            return;
        }
        info!("hotstore compaction done, took {:?}", start.elapsed());

        info!("garbage collecting hotstore");
        let start = Instant::now();
        if let Err(e) = gc.collect_garbage() {
            warn!("error garbage collecting hotstore: {e}");
            return;
        }
        info!("hotstore garbage collection done, took {:?}", start.elapsed());
    }
}
