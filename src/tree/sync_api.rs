// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Timestamp-conditional operations and Merkle fingers.
//!
//! These are the primitives anti-entropy uses to ship writes between
//! replicas without clobbering concurrent updates: each write names the
//! timestamp it expects the destination slot to hold and applies only on a
//! match. Expectations are slot-scoped (the byte slot for the flat forms,
//! the outer tree slot for the outer half of the sub forms) and an absent
//! slot compares as 0. A mismatch is a `false` return, never an error.

use super::Tree;
use crate::metrics;
use crate::nibble::nibbles_of;
use crate::node::{iter, Node, Payload, WritePolicy, BYTE};
use crate::oplog::Record;
use crate::print::Print;
use std::sync::Arc;

impl Tree {
    /// Byte-slot state at `key` for synchronization: the live value if
    /// any, the slot timestamp even when the slot is a tombstone, and
    /// whether a live value is present.
    pub fn get_timestamp(&self, key: &[u8]) -> (Option<Vec<u8>>, i64, bool) {
        let inner = self.inner.read();
        match inner.root.get(&nibbles_of(key)) {
            Some(view) if view.present & BYTE != 0 => (
                view.bytes.map(<[u8]>::to_vec),
                view.byte_stamp,
                view.live & BYTE != 0,
            ),
            _ => (None, 0, false),
        }
    }

    /// Write `value` (or a tombstone, when `None`) at `timestamp`,
    /// provided the byte slot currently holds `expected`. Once the check
    /// passes the write applies unconditionally: the sync layer owns
    /// ordering.
    pub fn put_timestamp(
        &self,
        key: &[u8],
        value: Option<&[u8]>,
        expected: i64,
        timestamp: i64,
    ) -> bool {
        metrics::record_operation("put_timestamp");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let current = match inner.root.get(&path) {
            Some(view) if view.present & BYTE != 0 => view.byte_stamp,
            _ => 0,
        };
        if current != expected {
            return false;
        }
        let (root, _) = Node::insert(
            &inner.root,
            &path,
            Payload {
                mask: BYTE,
                bytes: value.map(<[u8]>::to_vec),
                tree: None,
                stamp: timestamp,
            },
            WritePolicy::Always,
        );
        inner.root = root;
        match value {
            Some(value) => inner.emit(Record::put(key, value, timestamp)),
            None => inner.emit(Record::del(key, timestamp)),
        }
        true
    }

    /// Physically drop the byte slot at `key`, provided it currently
    /// holds `expected`.
    pub fn del_timestamp(&self, key: &[u8], expected: i64) -> bool {
        metrics::record_operation("del_timestamp");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let current = match inner.root.get(&path) {
            Some(view) if view.present & BYTE != 0 => view.byte_stamp,
            _ => 0,
        };
        if current != expected {
            return false;
        }
        let (root, displaced) = Node::del(&inner.root, &path, BYTE);
        inner.root = Node::anchored(root);
        if displaced.present & BYTE != 0 {
            inner.emit(Record::del(key, self.clock.now()));
        }
        true
    }

    pub fn sub_get_timestamp(&self, key: &[u8], sub_key: &[u8]) -> (Option<Vec<u8>>, i64, bool) {
        let inner = self.inner.read();
        match self.sub_tree(&inner, &nibbles_of(key)) {
            Some((sub, _)) => sub.get_timestamp(sub_key),
            None => (None, 0, false),
        }
    }

    /// Conditional write into the sub-tree at `key`. Creating the
    /// sub-tree counts as success regardless of `sub_expected`, matching
    /// the flat rule that an absent slot compares as 0.
    pub fn sub_put_timestamp(
        &self,
        key: &[u8],
        sub_key: &[u8],
        value: Option<&[u8]>,
        sub_expected: i64,
        sub_timestamp: i64,
    ) -> bool {
        metrics::record_operation("sub_put_timestamp");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let (sub, outer_stamp, fresh) = match self.sub_tree(&inner, &path) {
            Some((sub, stamp)) => (sub, stamp, false),
            None => (Arc::new(Tree::with_clock(self.clock.clone())), 0, true),
        };
        let applied = if fresh {
            sub.put_timestamp(sub_key, value, 0, sub_timestamp)
        } else {
            sub.put_timestamp(sub_key, value, sub_expected, sub_timestamp)
        };
        self.rehang(&mut inner, &path, sub, outer_stamp);
        if applied {
            match value {
                Some(value) => inner.emit(Record::sub_put(key, sub_key, value, sub_timestamp)),
                None => inner.emit(Record::sub_del(key, sub_key, sub_timestamp)),
            }
        }
        applied
    }

    /// Conditional physical delete inside the sub-tree at `key`; an
    /// emptied sub-tree leaves the outer tree.
    pub fn sub_del_timestamp(&self, key: &[u8], sub_key: &[u8], sub_expected: i64) -> bool {
        metrics::record_operation("sub_del_timestamp");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let mut applied = false;
        if let Some((sub, outer_stamp)) = self.sub_tree(&inner, &path) {
            applied = sub.del_timestamp(sub_key, sub_expected);
            if sub.size() == 0 {
                self.unhang(&mut inner, &path);
            } else {
                self.rehang(&mut inner, &path, sub, outer_stamp);
            }
        }
        if applied {
            inner.emit(Record::sub_del(key, sub_key, self.clock.now()));
        }
        applied
    }

    /// Witnesses along the descent toward `key`, for Merkle comparison
    /// with another replica.
    pub fn finger(&self, key: &[u8]) -> Print {
        let path = nibbles_of(key);
        let inner = self.inner.read();
        let mut print = Print::new(path.clone());
        iter::finger(&inner.root, &mut print, &path);
        print
    }

    /// Finger of the sub-tree at `key`; an empty print when there is no
    /// such sub-tree.
    pub fn sub_finger(&self, key: &[u8], sub_key: &[u8]) -> Print {
        let inner = self.inner.read();
        match self.sub_tree(&inner, &nibbles_of(key)) {
            Some((sub, _)) => sub.finger(sub_key),
            None => Print::new(nibbles_of(sub_key)),
        }
    }
}
