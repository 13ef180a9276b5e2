// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use cid::Cid;
use sled::{Config, Db, Mode, Tree};

use super::{MarkSet, MarkSetEnv};
use crate::Result;

/// Environment producing durable sled-backed mark sets. One tree per set;
/// the tree is dropped when the set closes, since a mark set only lives for
/// a single compaction.
#[derive(Debug)]
pub struct SledMarkSetEnv {
    db: Db,
}

impl SledMarkSetEnv {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let db = Config::default()
            .path(path)
            .mode(Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }
}

impl MarkSetEnv for SledMarkSetEnv {
    fn create(&self, name: &str, _size_hint: i64) -> Result<Box<dyn MarkSet>> {
        let tree = self.db.open_tree(name)?;
        // a leftover tree from an interrupted compaction must not leak marks
        tree.clear()?;
        Ok(Box::new(SledMarkSet {
            db: self.db.clone(),
            name: name.to_string(),
            tree,
        }))
    }

    fn close(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

struct SledMarkSet {
    db: Db,
    name: String,
    tree: Tree,
}

impl MarkSet for SledMarkSet {
    fn mark(&self, cid: &Cid) -> Result<()> {
        self.tree.insert(cid.to_bytes(), &[])?;
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.tree.contains_key(cid.to_bytes())?)
    }

    fn close(&self) -> Result<()> {
        self.tree.clear()?;
        self.db.drop_tree(&self.name)?;
        Ok(())
    }
}
