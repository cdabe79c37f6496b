//! Log attachment, restore, and clear.
//!
//! `log()` attaches an operation log and starts recording; `restore()`
//! stops recording, replays every record of the newest generation into the
//! in-memory tree in written order, then resumes recording. Replay applies
//! records through the same public operations as live writes, so the
//! last-writer-wins rule is enforced throughout and a replay aborted by
//! corruption still leaves the tree consistent.
//!
//! Restore detaches the log handle while it replays; run it before serving
//! traffic, concurrent mutations during the replay window are not
//! recorded.

use super::Tree;
use crate::clock::Clock;
use crate::config::LogConfig;
use crate::errors::StoreError;
use crate::metrics::{self, LatencyTimer};
use crate::nibble::nibbles_of;
use crate::node::{Node, BYTE};
use crate::oplog::{OpLog, Record};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

impl Tree {
    /// Attach an operation log rooted at `dir` and begin recording.
    pub fn log(&self, dir: impl AsRef<Path>) -> Result<(), StoreError> {
        self.log_with(dir, LogConfig::default())
    }

    pub fn log_with(&self, dir: impl AsRef<Path>, config: LogConfig) -> Result<(), StoreError> {
        let mut oplog = OpLog::open(dir, config)?;
        let started = oplog.record()?;
        {
            let mut inner = self.inner.write();
            inner.log = Some(oplog);
        }
        let _ = started.recv();
        Ok(())
    }

    /// Stop recording, replay the log into this tree, resume recording.
    /// Returns the number of records applied; a corruption mid-stream
    /// surfaces as [`StoreError::Corrupt`] with every record before it
    /// already applied.
    pub fn restore(&self) -> Result<usize, StoreError> {
        let _timer = LatencyTimer::new("restore");
        let Some(mut log) = self.inner.write().log.take() else {
            return Err(StoreError::NoLog);
        };
        if let Ok(stopped) = log.stop() {
            let _ = stopped.recv();
        }
        let clock = self.clock.clone();
        let outcome = log.play(|record| self.apply_record(record, &clock));
        let resumed = log.record();
        self.inner.write().log = Some(log);
        if let Ok(handle) = resumed {
            let _ = handle.recv();
        }
        outcome
    }

    fn apply_record(&self, record: Record, clock: &Arc<dyn Clock>) {
        // Delete records written by older logs may carry no timestamp;
        // fall back to the replay clock so the tombstone still dominates.
        let del_stamp = if record.timestamp != 0 {
            record.timestamp
        } else {
            clock.now()
        };
        match (record.put, record.sub_key.as_deref(), record.clear) {
            (true, None, _) => {
                if let Some(value) = record.value.as_deref() {
                    self.put(&record.key, value, record.timestamp);
                }
            }
            (true, Some(sub_key), _) => {
                if let Some(value) = record.value.as_deref() {
                    self.sub_put(&record.key, sub_key, value, record.timestamp);
                }
            }
            (false, None, true) => {
                // A cleared sub-tree was the application's intent to
                // forget: drop the outer slot physically.
                let path = nibbles_of(&record.key);
                let mut inner = self.inner.write();
                self.unhang(&mut inner, &path);
            }
            (false, None, false) => {
                self.fake_del(&record.key, del_stamp);
            }
            (false, Some(sub_key), false) => {
                self.sub_fake_del(&record.key, sub_key, del_stamp);
            }
            (false, Some(_), true) => {}
        }
    }

    /// Tombstone every live key at `timestamp`. With a log attached the
    /// log starts a fresh generation: the existing segments become
    /// historical and replay will no longer read them.
    pub fn clear(&self, timestamp: i64) -> usize {
        metrics::record_operation("clear");
        let mut inner = self.inner.write();
        let (root, removed) = Node::fake_clear(&inner.root, BYTE, timestamp);
        inner.root = root;
        if let Some(log) = inner.log.as_mut() {
            if let Err(e) = log.rotate() {
                warn!(error = %e, "failed to rotate operation log on clear");
            }
        }
        info!(removed, "tree cleared");
        removed
    }

    /// Block until every record queued so far is on disk.
    pub fn flush_log(&self) -> Result<(), StoreError> {
        let inner = self.inner.read();
        match &inner.log {
            Some(log) => log.flush(),
            None => Err(StoreError::NoLog),
        }
    }

    /// Detach and shut down the operation log.
    pub fn close_log(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.log.take() {
            Some(mut log) => log.close(),
            None => Err(StoreError::NoLog),
        }
    }
}
