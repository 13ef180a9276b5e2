// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use cid::Cid;
use parking_lot::Mutex;
use tracing::warn;

use crate::blocks::{ChainEpoch, Tipset};
use crate::Result;

const LOG_FILE: &str = "splitstore.log";

/// Append-only audit log of read-miss, write and move events. Only active
/// when enabled in the configuration; callers keep it off the facade's
/// short mutex.
#[derive(Debug)]
pub struct DebugLog {
    writer: Mutex<BufWriter<File>>,
}

impl DebugLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.join(LOG_FILE))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn log_read_miss(&self, cur_ts: Option<&Tipset>, cid: &Cid) {
        self.write_line(format_args!(
            "{} miss {} {cid}",
            Utc::now().timestamp(),
            tipset_epoch(cur_ts)
        ));
    }

    pub fn log_write_many(&self, cur_ts: Option<&Tipset>, cids: &[Cid], write_epoch: ChainEpoch) {
        let now = Utc::now().timestamp();
        let epoch = tipset_epoch(cur_ts);
        let mut writer = self.writer.lock();
        for cid in cids {
            if let Err(e) = writeln!(writer, "{now} write {epoch} {cid} {write_epoch}") {
                warn!("error writing to debug log: {e}");
                return;
            }
        }
    }

    pub fn log_move(&self, cur_ts: Option<&Tipset>, cid: &Cid) {
        self.write_line(format_args!(
            "{} move {} {cid}",
            Utc::now().timestamp(),
            tipset_epoch(cur_ts)
        ));
    }

    pub fn flush(&self) {
        if let Err(e) = self.writer.lock().flush() {
            warn!("error flushing debug log: {e}");
        }
    }

    pub fn close(&self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }

    fn write_line(&self, line: std::fmt::Arguments<'_>) {
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{line}") {
            warn!("error writing to debug log: {e}");
        }
    }
}

fn tipset_epoch(cur_ts: Option<&Tipset>) -> ChainEpoch {
    cur_ts.map(Tipset::epoch).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::multihash::{Code, MultihashDigest};
    use fvm_ipld_encoding::DAG_CBOR;

    #[test]
    fn events_are_appended() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = DebugLog::open(dir.path()).unwrap();
        let cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(b"event"));

        log.log_read_miss(None, &cid);
        log.log_write_many(None, &[cid, cid], 4);
        log.log_move(None, &cid);
        log.flush();

        let contents = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("miss"));
        assert!(lines[1].contains("write"));
        assert!(lines[3].contains("move"));
        log.close().unwrap();
    }
}
