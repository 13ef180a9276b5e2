// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::str::FromStr;
use std::time::Duration;

use crate::blocks::ChainEpoch;
use crate::Error;

/// Number of epochs after which a block previously appended to the chain can
/// no longer be reverted.
pub const FINALITY: ChainEpoch = 900;

/// Average block production time, in seconds.
pub const EPOCH_DURATION_SECONDS: i64 = 30;

/// Number of epochs that need to have elapsed from the previously compacted
/// epoch to trigger a new compaction.
pub const COMPACTION_THRESHOLD: ChainEpoch = 7 * FINALITY;

/// Number of epochs from the current epoch at which the chain is walked for
/// live objects.
pub const COMPACTION_BOUNDARY: ChainEpoch = 4 * FINALITY;

/// Number of epochs from the compaction boundary to the beginning of the
/// cold epoch.
pub const COMPACTION_SLACK: ChainEpoch = 2 * FINALITY;

/// Time delay from a tipset's minimum timestamp before we decide the node is
/// still syncing and skip compaction.
pub const SYNC_GAP: Duration = Duration::from_secs(60);

/// Batch size for tracking store and hot/cold store bulk operations.
pub const BATCH_SIZE: usize = 16384;

/// Initial capacity hint for the cold-object buffer collected by a
/// compaction; refined from the observed count after every run.
pub const DEFAULT_COLD_PURGE_SIZE: usize = 7_000_000;

/// Tracking store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingStoreType {
    /// Durable sled-backed store.
    #[default]
    Sled,
    /// In-memory store, for tests and read-only access.
    Mem,
}

impl FromStr for TrackingStoreType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sled" => Ok(Self::Sled),
            "mem" => Ok(Self::Mem),
            other => Err(Error::UnknownBackend {
                kind: "tracking store",
                name: other.to_string(),
            }),
        }
    }
}

/// Mark set backend selection for the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkSetType {
    /// In-memory bloom filter; false positives only keep extra blocks hot.
    #[default]
    Bloom,
    /// Durable sled-backed exact set.
    Sled,
}

impl FromStr for MarkSetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bloom" => Ok(Self::Bloom),
            "sled" => Ok(Self::Sled),
            other => Err(Error::UnknownBackend {
                kind: "mark set",
                name: other.to_string(),
            }),
        }
    }
}

/// Splitstore configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tracking_store_type: TrackingStoreType,
    pub mark_set_type: MarkSetType,
    /// Keep chain block headers in the hotstore past the compaction
    /// boundary. Required when the coldstore is a no-op.
    pub hot_headers: bool,
    /// Record read-miss, write and move events in an append-only audit log.
    pub enable_debug_log: bool,
}
