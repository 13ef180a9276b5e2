// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//!
//! A two-tier, content-addressed blockstore for chain state.
//!
//! The splitstore presents a single [`SplitStore`] facade over two backing
//! blockstores: a *hotstore* holding the actively accessed portion of the
//! state, and a *coldstore* holding everything that has aged out of it.
//! Reads probe the hotstore first and fall through to the coldstore; writes
//! always land in the hotstore and are recorded in a tracking store together
//! with the epoch at which they happened.
//!
//! ## Compaction workflow
//! 1. Mark: walk the chain from the current tipset down to the compaction
//!    boundary, recording every reachable block in a mark set.
//! 2. Collect: iterate the tracking store and classify each record as
//!    recently written, reachable, concurrently accessed, or cold.
//! 3. Move: copy the cold blocks into the coldstore in batches.
//! 4. Purge: delete the moved blocks from the hotstore and the tracking
//!    store, re-checking the concurrent-access filter under the exclusive
//!    transaction lock.
//!
//! ## Correctness
//! While a compaction is running, every block read or written through the
//! facade is added to a transactional protection set. The purge step
//! re-checks that set for every candidate while holding the transaction
//! lock exclusively, so a block touched at any point during the compaction
//! survives in the hotstore. Blocks written after the mark phase carry a
//! write epoch above the cold boundary and are never candidates in the
//! first place.
//!
//! ## Crash recovery
//! The base epoch, warmup epoch and mark-set size estimate are persisted in
//! a metadata datastore and reloaded on [`SplitStore::start`]. A crash
//! between the purge and tracking-store deletions leaves dangling tracking
//! entries; the move step of the next compaction detects and drops them.

pub mod blocks;
pub mod blockstore;
pub mod codec;
pub mod markset;
pub mod tracker;

mod chain;
mod config;
mod debug_log;
mod error;
mod metrics;
mod splitstore;

pub use chain::{ChainAccessor, HeadChange};
pub use config::{
    Config, MarkSetType, TrackingStoreType, BATCH_SIZE, COMPACTION_BOUNDARY, COMPACTION_SLACK,
    COMPACTION_THRESHOLD, DEFAULT_COLD_PURGE_SIZE, EPOCH_DURATION_SECONDS, FINALITY, SYNC_GAP,
};
pub use error::{Error, Result};
pub use splitstore::{SplitStore, BASE_EPOCH_KEY, MARK_SET_SIZE_KEY, WARMUP_EPOCH_KEY};
