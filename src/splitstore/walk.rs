// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::VecDeque;

use ahash::{HashSet, HashSetExt};
use cid::Cid;
use fvm_ipld_encoding::{from_slice, DAG_CBOR};
use libipld_core::ipld::Ipld;
use tracing::debug;

use crate::blocks::{BlockHeader, ChainEpoch, Tipset};
use crate::blockstore::Blockstore;
use crate::{Error, Result};

use super::SplitStore;

impl<H, C> SplitStore<H, C>
where
    H: Blockstore + 'static,
    C: Blockstore + 'static,
{
    /// Walks the chain of block headers from `tipset` towards genesis,
    /// invoking `f` for every visited CID.
    ///
    /// Headers below `boundary` end their branch unless `full_chain` keeps
    /// the header linkage going; headers at or above it have their state
    /// root walked, plus messages and receipts when `include_messages` is
    /// set. Header CIDs are deduplicated separately from link-walk CIDs so
    /// state DAGs of adjacent epochs can share their overlap.
    pub(crate) fn walk_chain(
        &self,
        tipset: &Tipset,
        boundary: ChainEpoch,
        include_messages: bool,
        full_chain: bool,
        f: &mut dyn FnMut(Cid) -> Result<()>,
    ) -> Result<()> {
        let mut visited = HashSet::new();
        let mut walked = HashSet::new();
        let mut to_walk: VecDeque<Cid> = tipset.cids().to_vec().into();
        let mut walk_cnt = 0usize;
        let mut scan_cnt = 0usize;

        while let Some(next) = to_walk.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            walk_cnt += 1;

            f(next)?;

            let data = self.walk_get(&next)?;
            let header: BlockHeader = from_slice(&data).map_err(|source| Error::Encoding {
                cid: next,
                source,
            })?;

            // don't walk under the boundary, unless we are walking the full chain
            if header.epoch < boundary && !full_chain {
                continue;
            }

            // we only scan the block if it is above the boundary
            if header.epoch >= boundary {
                scan_cnt += 1;
                if include_messages {
                    self.walk_links(header.messages, &mut walked, f)?;
                    self.walk_links(header.message_receipts, &mut walked, f)?;
                }
                self.walk_links(header.state_root, &mut walked, f)?;
            }

            if header.epoch > 0 {
                to_walk.extend(header.parents.cids().iter().copied());
            }
        }

        debug!("chain walk done: walked {walk_cnt}, scanned {scan_cnt}");
        Ok(())
    }

    /// Recursively walks the DAG rooted at `cid`, invoking `f` for every
    /// unvisited CID (including the root) and descending only into
    /// DAG-CBOR payloads.
    pub(crate) fn walk_links(
        &self,
        cid: Cid,
        walked: &mut HashSet<Cid>,
        f: &mut dyn FnMut(Cid) -> Result<()>,
    ) -> Result<()> {
        if !walked.insert(cid) {
            return Ok(());
        }

        f(cid)?;

        if cid.codec() != DAG_CBOR {
            return Ok(());
        }

        let data = self.walk_get(&cid)?;
        let ipld: Ipld =
            from_slice(&data).map_err(|source| Error::Encoding { cid, source })?;

        self.walk_ipld_links(&ipld, walked, f)
    }

    fn walk_ipld_links(
        &self,
        ipld: &Ipld,
        walked: &mut HashSet<Cid>,
        f: &mut dyn FnMut(Cid) -> Result<()>,
    ) -> Result<()> {
        match ipld {
            Ipld::Map(map) => {
                for value in map.values() {
                    self.walk_ipld_links(value, walked, f)?;
                }
            }
            Ipld::List(list) => {
                for value in list {
                    self.walk_ipld_links(value, walked, f)?;
                }
            }
            Ipld::Link(cid) => self.walk_links(*cid, walked, f)?,
            _ => (),
        }
        Ok(())
    }

    /// Internal getter used by walks: probes hot then cold without taking
    /// the facade transaction lock. Walks run under the compactor, which
    /// governs locking itself; going through the facade would self-deadlock
    /// on purge batches and generate spurious protection marks.
    pub(crate) fn walk_get(&self, cid: &Cid) -> Result<Vec<u8>> {
        if let Some(block) = self.hot.get(cid)? {
            return Ok(block);
        }
        self.cold.get(cid)?.ok_or(Error::BlockNotFound(*cid))
    }
}
