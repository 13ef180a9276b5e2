// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::multihash::{Code, MultihashDigest};
use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{to_vec, DAG_CBOR};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A chain height, or a time slot derived from one.
pub type ChainEpoch = i64;

/// A set of CIDs forming a unique key for a tipset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipsetKey {
    pub cids: Vec<Cid>,
}

impl TipsetKey {
    pub fn new(cids: Vec<Cid>) -> Self {
        Self { cids }
    }

    pub fn cids(&self) -> &[Cid] {
        &self.cids
    }
}

/// Header of a block.
///
/// This carries the subset of the protocol header the splitstore needs for
/// chain traversal: the parent linkage and the roots of the state, message
/// and receipt DAGs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct BlockHeader {
    /// The set of parents this block was based on. Typically one, but can
    /// be several in the case of multiple winners in an epoch.
    pub parents: TipsetKey,
    /// The period in which the block was generated.
    pub epoch: ChainEpoch,
    /// CID of the parent state root after calculating the parent tipset.
    pub state_root: Cid,
    /// CID of the root of an array of message receipts.
    pub message_receipts: Cid,
    /// CID of the Merkle links for the block's messages.
    pub messages: Cid,
    /// Block creation time, in seconds since the Unix epoch.
    pub timestamp: u64,
}

impl Default for BlockHeader {
    fn default() -> Self {
        let empty = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&[]));
        Self {
            parents: TipsetKey::default(),
            epoch: 0,
            state_root: empty,
            message_receipts: empty,
            messages: empty,
            timestamp: 0,
        }
    }
}

impl BlockHeader {
    /// Returns the serialized header together with its CID, ready to be put
    /// into a blockstore.
    pub fn storage_block(&self) -> (Cid, Vec<u8>) {
        let data = to_vec(self).expect("header serialization cannot fail");
        let cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&data));
        (cid, data)
    }

    pub fn cid(&self) -> Cid {
        self.storage_block().0
    }
}

/// An immutable set of blocks at the same height with the same parent set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tipset {
    headers: Vec<BlockHeader>,
    key: TipsetKey,
}

#[allow(clippy::len_without_is_empty)]
impl Tipset {
    /// Builds a new tipset from a non-empty collection of headers sharing
    /// the same epoch and parent set.
    pub fn new(headers: Vec<BlockHeader>) -> Result<Self> {
        let first = headers.first().ok_or(Error::NoBlocks)?;
        for header in &headers[1..] {
            if header.epoch != first.epoch {
                return Err(Error::InvalidTipset("epochs are not equal".to_string()));
            }
            if header.parents != first.parents {
                return Err(Error::InvalidTipset(
                    "parent cids are not equal".to_string(),
                ));
            }
        }
        let cids = headers.iter().map(BlockHeader::cid).collect();
        Ok(Self {
            headers,
            key: TipsetKey::new(cids),
        })
    }

    pub fn epoch(&self) -> ChainEpoch {
        self.headers[0].epoch
    }

    pub fn headers(&self) -> &[BlockHeader] {
        &self.headers
    }

    /// Returns the smallest timestamp of all blocks in the tipset.
    pub fn min_timestamp(&self) -> u64 {
        self.headers
            .iter()
            .map(|header| header.timestamp)
            .min()
            .expect("tipset is non-empty")
    }

    pub fn key(&self) -> &TipsetKey {
        &self.key
    }

    pub fn cids(&self) -> &[Cid] {
        self.key.cids()
    }

    pub fn parents(&self) -> &TipsetKey {
        &self.headers[0].parents
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }
}

impl From<&BlockHeader> for Tipset {
    fn from(header: &BlockHeader) -> Self {
        Tipset::new(vec![header.clone()]).expect("a single header is a valid tipset")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_ipld_encoding::from_slice;

    fn mock_header(epoch: ChainEpoch, parents: TipsetKey) -> BlockHeader {
        BlockHeader {
            parents,
            epoch,
            timestamp: 1_000_000 + epoch as u64,
            ..Default::default()
        }
    }

    #[test]
    fn symmetric_header_encoding() {
        let header = mock_header(42, TipsetKey::default());
        let (cid, data) = header.storage_block();
        let decoded: BlockHeader = from_slice(&data).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.cid(), cid);
    }

    #[test]
    fn header_cid_is_deterministic() {
        let a = mock_header(7, TipsetKey::default());
        let b = mock_header(7, TipsetKey::default());
        assert_eq!(a.cid(), b.cid());
        assert_ne!(a.cid(), mock_header(8, TipsetKey::default()).cid());
    }

    #[test]
    fn tipset_requires_blocks() {
        assert!(matches!(Tipset::new(vec![]), Err(Error::NoBlocks)));
    }

    #[test]
    fn tipset_validates_epochs() {
        let a = mock_header(1, TipsetKey::default());
        let b = mock_header(2, TipsetKey::default());
        assert!(matches!(
            Tipset::new(vec![a, b]),
            Err(Error::InvalidTipset(_))
        ));
    }

    #[test]
    fn tipset_validates_parents() {
        let parent = mock_header(0, TipsetKey::default());
        let a = mock_header(1, TipsetKey::new(vec![parent.cid()]));
        let b = mock_header(1, TipsetKey::default());
        assert!(matches!(
            Tipset::new(vec![a, b]),
            Err(Error::InvalidTipset(_))
        ));
    }

    #[test]
    fn min_timestamp() {
        let mut a = mock_header(3, TipsetKey::default());
        let mut b = mock_header(3, TipsetKey::default());
        a.timestamp = 100;
        b.timestamp = 50;
        let ts = Tipset::new(vec![a, b]).unwrap();
        assert_eq!(ts.min_timestamp(), 50);
        assert_eq!(ts.len(), 2);
    }
}
