// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::blocks::{BlockHeader, ChainEpoch, Tipset};

/// Head change event published by the chain store.
#[derive(Clone, Debug)]
pub enum HeadChange {
    Current(Arc<Tipset>),
    Apply(Arc<Tipset>),
    Revert(Arc<Tipset>),
}

/// Chain access required by the splitstore. At runtime this is implemented
/// by the chain store.
pub trait ChainAccessor: Send + Sync {
    /// Returns the genesis block header.
    fn genesis(&self) -> anyhow::Result<BlockHeader>;

    /// Returns the tipset at the given epoch on the chain of `anchor` (the
    /// heaviest tipset when `None`). With `prev` set, a null round resolves
    /// to the previous non-null tipset instead of the following one.
    fn tipset_by_height(
        &self,
        epoch: ChainEpoch,
        anchor: Option<Arc<Tipset>>,
        prev: bool,
    ) -> anyhow::Result<Arc<Tipset>>;

    /// Tipset at the head of the best-known chain, if any.
    fn heaviest_tipset(&self) -> Option<Arc<Tipset>>;

    /// Subscribe to head change events.
    fn subscribe_head_changes(&self) -> broadcast::Receiver<HeadChange>;
}
