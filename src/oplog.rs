// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only operation log.
//!
//! Every mutation the tree accepts while recording becomes one framed
//! record: a little-endian length prefix, a CRC32 of the payload, then the
//! bincode-encoded [`Record`]. Records accumulate in segment files named
//! `<generation>-<sequence>.log`; appends roll to the next sequence once a
//! segment exceeds the configured size, and [`Tree::clear`] bumps the
//! generation so that replay never resurrects cleared keys (older
//! generations stay on disk as history).
//!
//! Appending happens on a dedicated writer thread fed over a channel, so
//! the tree's write lock is held only for the channel send; channel order
//! equals apply order because every send happens under that lock.
//! [`OpLog::record`] and [`OpLog::stop`] return completion handles the tree
//! waits on where ordering matters.
//!
//! Replay is tolerant of a truncated trailing record (the crash case
//! recovery-safe appends leave behind) and strict about everything else: a
//! checksum or framing failure mid-stream aborts with
//! [`StoreError::Corrupt`].
//!
//! [`Tree::clear`]: crate::tree::Tree::clear

use crate::config::LogConfig;
use crate::errors::StoreError;
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle states: `Idle → Recording → Stopped → Replaying → Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Idle,
    Recording,
    Stopped,
    Replaying,
}

/// One logged mutation.
///
/// `put` distinguishes writes from deletes; `clear` marks a sub-tree clear
/// (key only). Delete records carry the tombstone's timestamp so replay
/// reproduces the original last-writer-wins outcome; a zero timestamp falls
/// back to the replay clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub sub_key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp: i64,
    pub put: bool,
    pub clear: bool,
}

impl Record {
    pub fn put(key: &[u8], value: &[u8], timestamp: i64) -> Record {
        Record {
            key: key.to_vec(),
            sub_key: None,
            value: Some(value.to_vec()),
            timestamp,
            put: true,
            clear: false,
        }
    }

    pub fn del(key: &[u8], timestamp: i64) -> Record {
        Record {
            key: key.to_vec(),
            sub_key: None,
            value: None,
            timestamp,
            put: false,
            clear: false,
        }
    }

    pub fn sub_put(key: &[u8], sub_key: &[u8], value: &[u8], timestamp: i64) -> Record {
        Record {
            key: key.to_vec(),
            sub_key: Some(sub_key.to_vec()),
            value: Some(value.to_vec()),
            timestamp,
            put: true,
            clear: false,
        }
    }

    pub fn sub_del(key: &[u8], sub_key: &[u8], timestamp: i64) -> Record {
        Record {
            key: key.to_vec(),
            sub_key: Some(sub_key.to_vec()),
            value: None,
            timestamp,
            put: false,
            clear: false,
        }
    }

    pub fn sub_clear(key: &[u8]) -> Record {
        Record {
            key: key.to_vec(),
            sub_key: None,
            value: None,
            timestamp: 0,
            put: false,
            clear: true,
        }
    }
}

enum Command {
    Append(Record),
    Barrier(Sender<()>),
    Flush(Sender<()>),
    Rotate { gen: u64, ack: Sender<()> },
    Close,
}

/// Handle to a log directory. Owned by the tree and driven under its lock.
pub struct OpLog {
    dir: PathBuf,
    state: LogState,
    gen: u64,
    tx: Option<Sender<Command>>,
    writer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for OpLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpLog")
            .field("dir", &self.dir)
            .field("state", &self.state)
            .field("gen", &self.gen)
            .finish()
    }
}

fn segment_name(gen: u64, seq: u64) -> String {
    format!("{gen:010}-{seq:010}.log")
}

fn parse_segment_name(name: &str) -> Option<(u64, u64)> {
    let stem = name.strip_suffix(".log")?;
    let (gen, seq) = stem.split_once('-')?;
    if gen.len() != 10 || seq.len() != 10 {
        return None;
    }
    Some((gen.parse().ok()?, seq.parse().ok()?))
}

fn scan_segments(dir: &Path) -> Result<Vec<(u64, u64, PathBuf)>, StoreError> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some((gen, seq)) = parse_segment_name(name) {
                segments.push((gen, seq, entry.path()));
            }
        }
    }
    segments.sort();
    Ok(segments)
}

impl OpLog {
    /// Open (creating if necessary) a log directory. The writer never
    /// appends into an existing file: it starts a fresh sequence number in
    /// the newest generation found on disk.
    pub fn open(dir: impl AsRef<Path>, config: LogConfig) -> Result<OpLog, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let segments = scan_segments(&dir)?;
        let gen = segments.last().map_or(0, |(g, _, _)| *g);
        let seq = segments
            .iter()
            .filter(|(g, _, _)| *g == gen)
            .map(|(_, s, _)| *s + 1)
            .max()
            .unwrap_or(0);
        info!(dir = %dir.display(), gen, seq, segments = segments.len(), "operation log opened");

        let (tx, rx) = mpsc::channel();
        let writer = Appender {
            dir: dir.clone(),
            config,
            gen,
            seq,
            file: None,
            written: 0,
        };
        let handle = std::thread::Builder::new()
            .name("radix-store-oplog".into())
            .spawn(move || writer.run(rx))?;

        Ok(OpLog {
            dir,
            state: LogState::Idle,
            gen,
            tx: Some(tx),
            writer: Some(handle),
        })
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    pub fn recording(&self) -> bool {
        self.state == LogState::Recording
    }

    fn send(&self, command: Command) -> Result<(), StoreError> {
        self.tx
            .as_ref()
            .ok_or(StoreError::LogClosed)?
            .send(command)
            .map_err(|_| StoreError::LogClosed)
    }

    fn barrier(&self) -> Result<Receiver<()>, StoreError> {
        let (ack, done) = mpsc::channel();
        self.send(Command::Barrier(ack))?;
        Ok(done)
    }

    /// Begin (or resume) recording. The returned handle completes once the
    /// writer has drained everything sent before the transition.
    pub fn record(&mut self) -> Result<Receiver<()>, StoreError> {
        match self.state {
            LogState::Replaying => return Err(StoreError::ReplayActive),
            _ => self.state = LogState::Recording,
        }
        self.barrier()
    }

    /// Stop recording. The returned handle completes once every append
    /// sent before the stop has reached the file.
    pub fn stop(&mut self) -> Result<Receiver<()>, StoreError> {
        match self.state {
            LogState::Replaying => return Err(StoreError::ReplayActive),
            _ => self.state = LogState::Stopped,
        }
        self.barrier()
    }

    /// Queue one record for appending. A no-op unless recording.
    pub fn append(&self, record: Record) -> Result<(), StoreError> {
        if self.state != LogState::Recording {
            return Ok(());
        }
        metrics::record_log_append();
        self.send(Command::Append(record))
    }

    /// Start a fresh generation. Existing segments become historical: they
    /// stay on disk but replay will no longer read them.
    pub fn rotate(&mut self) -> Result<Receiver<()>, StoreError> {
        self.gen += 1;
        debug!(gen = self.gen, "operation log rotated");
        let (ack, done) = mpsc::channel();
        self.send(Command::Rotate {
            gen: self.gen,
            ack,
        })?;
        Ok(done)
    }

    /// Block until everything queued so far is on disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let (ack, done) = mpsc::channel();
        self.send(Command::Flush(ack))?;
        done.recv().map_err(|_| StoreError::LogClosed)
    }

    /// Replay the newest generation's segments in filename order. Each
    /// record is handed to `apply` before the next one is read, so a
    /// mid-stream corruption leaves the caller with a consistent prefix.
    pub fn play<F>(&mut self, mut apply: F) -> Result<usize, StoreError>
    where
        F: FnMut(Record),
    {
        match self.state {
            LogState::Replaying => return Err(StoreError::ReplayActive),
            LogState::Recording => return Err(StoreError::StillRecording),
            LogState::Idle | LogState::Stopped => {}
        }
        self.state = LogState::Replaying;
        let result = self.play_inner(&mut apply);
        self.state = LogState::Stopped;
        result
    }

    fn play_inner<F>(&mut self, apply: &mut F) -> Result<usize, StoreError>
    where
        F: FnMut(Record),
    {
        let segments = scan_segments(&self.dir)?;
        let Some(&(newest_gen, _, _)) = segments.last() else {
            return Ok(0);
        };
        let files: Vec<&(u64, u64, PathBuf)> = segments
            .iter()
            .filter(|(g, _, _)| *g == newest_gen)
            .collect();
        let mut replayed = 0;
        for (position, (_, _, path)) in files.iter().enumerate() {
            let last_file = position + 1 == files.len();
            let data = fs::read(path)?;
            let mut offset = 0usize;
            while offset < data.len() {
                let segment = path.display().to_string();
                if data.len() - offset < 8 {
                    if last_file {
                        warn!(segment = %segment, offset, "discarding truncated trailing record");
                        metrics::record_truncation_discard();
                        break;
                    }
                    return Err(StoreError::Corrupt {
                        segment,
                        offset: offset as u64,
                        reason: "truncated frame header in non-final segment".into(),
                    });
                }
                let len = u32::from_le_bytes([
                    data[offset],
                    data[offset + 1],
                    data[offset + 2],
                    data[offset + 3],
                ]) as usize;
                let crc = u32::from_le_bytes([
                    data[offset + 4],
                    data[offset + 5],
                    data[offset + 6],
                    data[offset + 7],
                ]);
                if data.len() - offset - 8 < len {
                    if last_file {
                        warn!(segment = %segment, offset, "discarding truncated trailing record");
                        metrics::record_truncation_discard();
                        break;
                    }
                    return Err(StoreError::Corrupt {
                        segment,
                        offset: offset as u64,
                        reason: "truncated record payload in non-final segment".into(),
                    });
                }
                let payload = &data[offset + 8..offset + 8 + len];
                if crc32fast::hash(payload) != crc {
                    return Err(StoreError::Corrupt {
                        segment,
                        offset: offset as u64,
                        reason: "checksum mismatch".into(),
                    });
                }
                let record: Record = bincode::deserialize(payload).map_err(|e| {
                    StoreError::Corrupt {
                        segment: path.display().to_string(),
                        offset: offset as u64,
                        reason: format!("record decode failed: {e}"),
                    }
                })?;
                offset += 8 + len;
                apply(record);
                replayed += 1;
            }
        }
        metrics::record_replayed(replayed);
        info!(dir = %self.dir.display(), gen = newest_gen, replayed, "replay complete");
        Ok(replayed)
    }

    /// Shut the writer thread down, flushing what it holds.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Command::Close);
        }
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
        self.state = LogState::Idle;
        Ok(())
    }
}

impl Drop for OpLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// The writer thread: owns the current segment file.
struct Appender {
    dir: PathBuf,
    config: LogConfig,
    gen: u64,
    /// Next sequence number to open.
    seq: u64,
    file: Option<File>,
    written: u64,
}

impl Appender {
    fn run(mut self, rx: Receiver<Command>) {
        while let Ok(command) = rx.recv() {
            match command {
                Command::Append(record) => self.append(&record),
                Command::Barrier(ack) => {
                    let _ = ack.send(());
                }
                Command::Flush(ack) => {
                    self.sync();
                    let _ = ack.send(());
                }
                Command::Rotate { gen, ack } => {
                    self.sync();
                    self.file = None;
                    self.written = 0;
                    self.gen = gen;
                    self.seq = 0;
                    let _ = ack.send(());
                }
                Command::Close => break,
            }
        }
        self.sync();
    }

    fn sync(&mut self) {
        if let Some(file) = &self.file {
            if let Err(e) = file.sync_all() {
                error!(error = %e, "operation log fsync failed");
            }
        }
    }

    fn roll(&mut self) -> std::io::Result<()> {
        let path = self.dir.join(segment_name(self.gen, self.seq));
        debug!(segment = %path.display(), "opening log segment");
        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;
        self.file = Some(file);
        self.written = 0;
        self.seq += 1;
        Ok(())
    }

    fn append(&mut self, record: &Record) {
        let payload = match bincode::serialize(record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to encode log record");
                return;
            }
        };
        if self.file.is_none() || self.written >= self.config.segment_max_bytes {
            if let Err(e) = self.roll() {
                error!(error = %e, "failed to open log segment");
                return;
            }
        }
        let mut frame = Vec::with_capacity(payload.len() + 8);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = file.write_all(&frame) {
            error!(error = %e, "failed to append log record");
            return;
        }
        self.written += frame.len() as u64;
        if self.config.fsync_each_record {
            if let Err(e) = file.sync_data() {
                error!(error = %e, "operation log fsync failed");
            }
        }
    }
}
