// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Splitstore error
#[derive(Debug, Error)]
pub enum Error {
    /// Deletion is owned by compaction; the facade refuses it.
    #[error("deleting blocks is not supported by the splitstore")]
    DeleteUnsupported,
    /// A walk required a block that is in neither store.
    #[error("block {0} not found in either store")]
    BlockNotFound(Cid),
    /// Compaction reached its critical section while the store was closing.
    #[error("splitstore is closing")]
    Closing,
    /// A fetched block could not be decoded as a header or scanned for links.
    #[error("invalid block {cid}: {source}")]
    Encoding {
        cid: Cid,
        #[source]
        source: fvm_ipld_encoding::Error,
    },
    #[error("invalid metadata value: {0}")]
    Metadata(String),
    #[error("tipset has no blocks")]
    NoBlocks,
    #[error("invalid tipset: {0}")]
    InvalidTipset(String),
    #[error("unknown {kind} backend: {name}")]
    UnknownBackend { kind: &'static str, name: String },
    #[error(transparent)]
    Db(#[from] sled::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
