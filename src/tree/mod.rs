// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Thread-safe tree façade over the node layer.
//!
//! A [`Tree`] owns a root node pointer and an optional operation log behind
//! one readers/writer lock. Every public operation holds the appropriate
//! lock for its whole duration, log emission included, so on-disk order
//! equals in-memory apply order. Reads see a consistent root snapshot for
//! their entire duration; iteration callbacks must not call back into
//! mutating operations on the same tree (the read lock is held and the
//! lock is not reentrant).
//!
//! Trees nest: a key can carry a sub-tree obeying the identical contract,
//! reached through the `sub_*` operations.

mod lifecycle;
mod sub_api;
mod sync_api;

use crate::clock::{Clock, WallClock};
use crate::metrics;
use crate::nibble::{bytes_of, nibbles_of, Nibble};
use crate::node::{iter, Node, Payload, WritePolicy, BOTH, BYTE};
use crate::oplog::{OpLog, Record};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inclusive/exclusive bound decisions as the signed comparison values the
/// node layer prunes with.
fn bound_cmps(min_inc: bool, max_inc: bool) -> (i8, i8) {
    (if min_inc { -1 } else { 0 }, if max_inc { 1 } else { 0 })
}

pub(crate) struct TreeInner {
    root: Arc<Node>,
    log: Option<OpLog>,
}

impl TreeInner {
    fn emit(&self, record: Record) {
        if let Some(log) = &self.log {
            if log.recording() {
                if let Err(e) = log.append(record) {
                    warn!(error = %e, "dropping operation log record");
                }
            }
        }
    }
}

/// Persistent, ordered, hash-augmented key/value map with nested sub-trees
/// and last-writer-wins timestamps.
pub struct Tree {
    clock: Arc<dyn Clock>,
    inner: RwLock<TreeInner>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree::with_clock(Arc::new(WallClock))
    }

    /// Build a tree around an injected clock; tests drive deterministic
    /// time through this.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Tree {
        Tree {
            clock,
            inner: RwLock::new(TreeInner {
                root: Node::empty(),
                log: None,
            }),
        }
    }

    /// Rolling hash of the whole tree. Equal hashes mean equal live
    /// content, independent of insertion order.
    pub fn hash(&self) -> [u8; 32] {
        self.inner.read().root.hash()
    }

    /// Entries carrying any slot, tombstones included.
    pub fn size(&self) -> usize {
        let inner = self.inner.read();
        inner.root.byte_size() + inner.root.tree_size()
    }

    /// Entries carrying a live byte value.
    pub fn real_size(&self) -> usize {
        self.inner.read().root.real_size()
    }

    /// Store `value` at `key`. The write wins only if its timestamp is
    /// strictly greater than the stored one; either way the displaced
    /// value and whether the key already held one are returned.
    pub fn put(&self, key: &[u8], value: &[u8], timestamp: i64) -> (Option<Vec<u8>>, bool) {
        metrics::record_operation("put");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let (root, displaced) = Node::insert(
            &inner.root,
            &path,
            Payload {
                mask: BYTE,
                bytes: Some(value.to_vec()),
                tree: None,
                stamp: timestamp,
            },
            WritePolicy::IfNewer,
        );
        inner.root = root;
        inner.emit(Record::put(key, value, timestamp));
        (displaced.bytes, displaced.live & BYTE != 0)
    }

    /// Live value and timestamp at `key`; tombstoned keys read as absent.
    pub fn get(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        metrics::record_operation("get");
        let path = nibbles_of(key);
        let inner = self.inner.read();
        let view = inner.root.get(&path)?;
        if view.live & BYTE != 0 {
            view.bytes.map(|value| (value.to_vec(), view.byte_stamp))
        } else {
            None
        }
    }

    /// Physically remove the byte slot at `key`, tombstone included.
    pub fn del(&self, key: &[u8]) -> (Option<Vec<u8>>, bool) {
        metrics::record_operation("del");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let (root, displaced) = Node::del(&inner.root, &path, BYTE);
        inner.root = Node::anchored(root);
        let existed = displaced.live & BYTE != 0;
        if existed {
            inner.emit(Record::del(key, self.clock.now()));
        }
        (displaced.bytes, existed)
    }

    /// Tombstone `key` at the given timestamp so the delete can propagate
    /// through anti-entropy. Works on absent keys too; loses to a stored
    /// timestamp that is greater or equal.
    pub fn fake_del(&self, key: &[u8], timestamp: i64) -> (Option<Vec<u8>>, bool) {
        metrics::record_operation("fake_del");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let (root, displaced) = Node::insert(
            &inner.root,
            &path,
            Payload {
                mask: BYTE,
                bytes: None,
                tree: None,
                stamp: timestamp,
            },
            WritePolicy::IfNewer,
        );
        inner.root = root;
        debug!(
            stamp = timestamp,
            prior_stamp = displaced.byte_stamp,
            existed = displaced.live & BYTE != 0,
            "tombstone write"
        );
        // Always logged: the tombstone exists even when the key was
        // absent, and replay must rebuild it.
        inner.emit(Record::del(key, timestamp));
        (displaced.bytes, displaced.live & BYTE != 0)
    }

    /// Visit every live entry in byte-lexicographic key order. Returning
    /// `false` stops the walk.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        let inner = self.inner.read();
        iter::each(&inner.root, &mut Vec::new(), BYTE, &mut |path, view| {
            match view.bytes {
                Some(value) => f(&bytes_of(path), value, view.byte_stamp),
                None => true,
            }
        });
    }

    pub fn reverse_each<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        let inner = self.inner.read();
        iter::reverse_each(&inner.root, &mut Vec::new(), BYTE, &mut |path, view| {
            match view.bytes {
                Some(value) => f(&bytes_of(path), value, view.byte_stamp),
                None => true,
            }
        });
    }

    /// Ordered walk over keys in `[min, max]`, with each bound optional
    /// and independently inclusive or exclusive.
    pub fn each_between<F>(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
        mut f: F,
    ) where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        let (min_cmp, max_cmp) = bound_cmps(min_inc, max_inc);
        let min = min.map(nibbles_of);
        let max = max.map(nibbles_of);
        let inner = self.inner.read();
        iter::each_between(
            &inner.root,
            &mut Vec::new(),
            min.as_deref(),
            max.as_deref(),
            min_cmp,
            max_cmp,
            BYTE,
            &mut |path, view| match view.bytes {
                Some(value) => f(&bytes_of(path), value, view.byte_stamp),
                None => true,
            },
        );
    }

    pub fn reverse_each_between<F>(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
        mut f: F,
    ) where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        let (min_cmp, max_cmp) = bound_cmps(min_inc, max_inc);
        let min = min.map(nibbles_of);
        let max = max.map(nibbles_of);
        let inner = self.inner.read();
        iter::reverse_each_between(
            &inner.root,
            &mut Vec::new(),
            min.as_deref(),
            max.as_deref(),
            min_cmp,
            max_cmp,
            BYTE,
            &mut |path, view| match view.bytes {
                Some(value) => f(&bytes_of(path), value, view.byte_stamp),
                None => true,
            },
        );
    }

    /// Number of live keys ordered strictly before `key`, and whether the
    /// key itself holds a live value.
    pub fn index_of(&self, key: &[u8]) -> (usize, bool) {
        let inner = self.inner.read();
        let (before, _present, live) = iter::rank(&inner.root, &nibbles_of(key), BYTE);
        (before, live & BYTE != 0)
    }

    /// Number of live keys ordered strictly after `key`.
    pub fn reverse_index_of(&self, key: &[u8]) -> (usize, bool) {
        let inner = self.inner.read();
        let (before, present, live) = iter::rank(&inner.root, &nibbles_of(key), BYTE);
        let total = inner.root.real_size();
        let after = total - before - iter::slot_contribution(present, live, BYTE);
        (after, live & BYTE != 0)
    }

    /// Ordered walk bounded by position instead of key; bounds are
    /// inclusive and optional.
    pub fn each_between_index<F>(&self, min: Option<usize>, max: Option<usize>, mut f: F)
    where
        F: FnMut(&[u8], &[u8], i64, usize) -> bool,
    {
        let inner = self.inner.read();
        iter::each_between_index(
            &inner.root,
            &mut Vec::new(),
            0,
            min,
            max,
            BYTE,
            &mut |path, view, index| match view.bytes {
                Some(value) => f(&bytes_of(path), value, view.byte_stamp, index),
                None => true,
            },
        );
    }

    /// Reverse-position walk: index 0 is the greatest live key.
    pub fn reverse_each_between_index<F>(&self, min: Option<usize>, max: Option<usize>, mut f: F)
    where
        F: FnMut(&[u8], &[u8], i64, usize) -> bool,
    {
        let inner = self.inner.read();
        iter::reverse_each_between_index(
            &inner.root,
            &mut Vec::new(),
            0,
            min,
            max,
            BYTE,
            &mut |path, view, index| match view.bytes {
                Some(value) => f(&bytes_of(path), value, view.byte_stamp, index),
                None => true,
            },
        );
    }

    /// Entries in the key range counted with both slots (tombstones
    /// included), answered from aggregates where subtrees fall wholly
    /// inside the range.
    pub fn size_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
    ) -> usize {
        self.size_between_mask(min, max, min_inc, max_inc, BOTH)
    }

    /// Live byte entries in the key range.
    pub fn real_size_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
    ) -> usize {
        self.size_between_mask(min, max, min_inc, max_inc, BYTE)
    }

    fn size_between_mask(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
        mask: u8,
    ) -> usize {
        let (min_cmp, max_cmp) = bound_cmps(min_inc, max_inc);
        let min = min.map(nibbles_of);
        let max = max.map(nibbles_of);
        let inner = self.inner.read();
        iter::size_between(
            &inner.root,
            &mut Vec::new(),
            min.as_deref(),
            max.as_deref(),
            min_cmp,
            max_cmp,
            mask,
        )
    }

    pub fn first(&self) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let mut found = None;
        self.each(|key, value, timestamp| {
            found = Some((key.to_vec(), value.to_vec(), timestamp));
            false
        });
        found
    }

    pub fn last(&self) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let mut found = None;
        self.reverse_each(|key, value, timestamp| {
            found = Some((key.to_vec(), value.to_vec(), timestamp));
            false
        });
        found
    }

    /// Greatest live key strictly below `key`.
    pub fn prev(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let mut found = None;
        self.reverse_each_between(None, Some(key), false, false, |k, v, t| {
            found = Some((k.to_vec(), v.to_vec(), t));
            false
        });
        found
    }

    /// Smallest live key strictly above `key`.
    pub fn next(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let mut found = None;
        self.each_between(Some(key), None, false, false, |k, v, t| {
            found = Some((k.to_vec(), v.to_vec(), t));
            false
        });
        found
    }

    /// Greatest marker (any entry, tombstones included) strictly below
    /// `key`.
    pub fn prev_marker(&self, key: &[u8]) -> Option<Vec<u8>> {
        let max = nibbles_of(key);
        let inner = self.inner.read();
        let mut found = None;
        iter::reverse_each_between(
            &inner.root,
            &mut Vec::new(),
            None,
            Some(&max),
            0,
            0,
            0,
            &mut |path: &[Nibble], _view| {
                found = Some(bytes_of(path));
                false
            },
        );
        found
    }

    /// Smallest marker strictly above `key`.
    pub fn next_marker(&self, key: &[u8]) -> Option<Vec<u8>> {
        let min = nibbles_of(key);
        let inner = self.inner.read();
        let mut found = None;
        iter::each_between(
            &inner.root,
            &mut Vec::new(),
            Some(&min),
            None,
            0,
            0,
            0,
            &mut |path: &[Nibble], _view| {
                found = Some(bytes_of(path));
                false
            },
        );
        found
    }

    /// Live entry at position `n` in key order.
    pub fn index(&self, n: usize) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let mut found = None;
        self.each_between_index(Some(n), Some(n), |k, v, t, _| {
            found = Some((k.to_vec(), v.to_vec(), t));
            false
        });
        found
    }

    /// Live entry at position `n` counting back from the greatest key.
    pub fn reverse_index(&self, n: usize) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let mut found = None;
        self.reverse_each_between_index(Some(n), Some(n), |k, v, t, _| {
            found = Some((k.to_vec(), v.to_vec(), t));
            false
        });
        found
    }

    /// First live entry at position `n` or later.
    pub fn next_index(&self, n: usize) -> Option<(Vec<u8>, Vec<u8>, i64, usize)> {
        let mut found = None;
        self.each_between_index(Some(n), None, |k, v, t, i| {
            found = Some((k.to_vec(), v.to_vec(), t, i));
            false
        });
        found
    }

    /// First live entry at reverse position `n` or later (walking toward
    /// smaller keys).
    pub fn prev_index(&self, n: usize) -> Option<(Vec<u8>, Vec<u8>, i64, usize)> {
        let mut found = None;
        self.reverse_each_between_index(Some(n), None, |k, v, t, i| {
            found = Some((k.to_vec(), v.to_vec(), t, i));
            false
        });
        found
    }

    /// Indented structural dump for debugging and the remote describe
    /// call.
    pub fn describe(&self) -> String {
        self.describe_indented(0)
    }

    pub(crate) fn describe_indented(&self, indent: usize) -> String {
        let inner = self.inner.read();
        let mut out = format!(
            "{}<radix-store size:{} hash:{}>\n",
            " ".repeat(indent),
            inner.root.byte_size() + inner.root.tree_size(),
            hex::encode(inner.root.hash()),
        );
        inner.root.describe(indent + 2, &mut out);
        out
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Tree")
            .field("size", &(inner.root.byte_size() + inner.root.tree_size()))
            .field("real_size", &inner.root.real_size())
            .field("hash", &hex::encode(inner.root.hash()))
            .finish()
    }
}
