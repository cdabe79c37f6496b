// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Nested-tree operations.
//!
//! Every flat operation has a `sub_` sibling that first resolves a
//! sub-tree by outer key and then delegates. Sub-trees come into existence
//! on first write and leave the outer tree when their last real entry is
//! deleted. A sub-tree mutation re-inserts the reference under the outer
//! slot's pre-existing timestamp (0 for a freshly created sub-tree), so
//! nested writes never bump the outer clock; the re-insert exists to
//! refresh the outer hash spine.

use super::{Tree, TreeInner};
use crate::metrics;
use crate::nibble::{nibbles_of, Nibble};
use crate::node::{Node, Payload, WritePolicy, TREE};
use crate::oplog::Record;
use std::sync::Arc;
use tracing::debug;

impl Tree {
    /// Live sub-tree at `path` with its outer slot timestamp.
    pub(super) fn sub_tree(&self, inner: &TreeInner, path: &[Nibble]) -> Option<(Arc<Tree>, i64)> {
        let view = inner.root.get(path)?;
        if view.live & TREE != 0 {
            view.tree.map(|tree| (tree.clone(), view.tree_stamp))
        } else {
            None
        }
    }

    /// Re-hang a sub-tree reference under its pre-existing outer stamp,
    /// refreshing the hashes along the outer spine.
    pub(super) fn rehang(&self, inner: &mut TreeInner, path: &[Nibble], sub: Arc<Tree>, outer_stamp: i64) {
        let (root, _) = Node::insert(
            &inner.root,
            path,
            Payload {
                mask: TREE,
                bytes: None,
                tree: Some(sub),
                stamp: outer_stamp,
            },
            WritePolicy::Always,
        );
        inner.root = root;
    }

    /// Drop the outer tree slot at `path` entirely.
    pub(super) fn unhang(&self, inner: &mut TreeInner, path: &[Nibble]) {
        let (root, displaced) = Node::del(&inner.root, path, TREE);
        inner.root = Node::anchored(root);
        if let Some(sub) = displaced.tree {
            debug!(
                sub_size = sub.size(),
                outer_stamp = displaced.tree_stamp,
                "sub-tree detached"
            );
        }
    }

    /// Store `value` under `sub_key` inside the sub-tree at `key`,
    /// creating the sub-tree if this is its first write.
    pub fn sub_put(
        &self,
        key: &[u8],
        sub_key: &[u8],
        value: &[u8],
        timestamp: i64,
    ) -> (Option<Vec<u8>>, bool) {
        metrics::record_operation("sub_put");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let (sub, outer_stamp) = match self.sub_tree(&inner, &path) {
            Some(found) => found,
            None => (Arc::new(Tree::with_clock(self.clock.clone())), 0),
        };
        let (old, existed) = sub.put(sub_key, value, timestamp);
        self.rehang(&mut inner, &path, sub, outer_stamp);
        inner.emit(Record::sub_put(key, sub_key, value, timestamp));
        (old, existed)
    }

    pub fn sub_get(&self, key: &[u8], sub_key: &[u8]) -> Option<(Vec<u8>, i64)> {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .and_then(|(sub, _)| sub.get(sub_key))
    }

    /// Physically delete `sub_key`; when the sub-tree's last real entry
    /// goes, the sub-tree itself leaves the outer tree.
    pub fn sub_del(&self, key: &[u8], sub_key: &[u8]) -> (Option<Vec<u8>>, bool) {
        metrics::record_operation("sub_del");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let mut old = None;
        let mut existed = false;
        if let Some((sub, outer_stamp)) = self.sub_tree(&inner, &path) {
            let (displaced, was_live) = sub.del(sub_key);
            old = displaced;
            existed = was_live;
            if sub.real_size() == 0 {
                self.unhang(&mut inner, &path);
            } else {
                self.rehang(&mut inner, &path, sub, outer_stamp);
            }
        }
        if existed {
            inner.emit(Record::sub_del(key, sub_key, self.clock.now()));
        }
        (old, existed)
    }

    /// Tombstone `sub_key` inside the sub-tree at `key`. The sub-tree is
    /// kept even when emptied: anti-entropy still needs its tombstones.
    pub fn sub_fake_del(
        &self,
        key: &[u8],
        sub_key: &[u8],
        timestamp: i64,
    ) -> (Option<Vec<u8>>, bool) {
        metrics::record_operation("sub_fake_del");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let mut old = None;
        let mut existed = false;
        if let Some((sub, outer_stamp)) = self.sub_tree(&inner, &path) {
            let (displaced, was_live) = sub.fake_del(sub_key, timestamp);
            old = displaced;
            existed = was_live;
            self.rehang(&mut inner, &path, sub, outer_stamp);
            // Logged whenever the sub-tree was touched: the tombstone
            // exists even when the sub-key was absent.
            inner.emit(Record::sub_del(key, sub_key, timestamp));
        }
        (old, existed)
    }

    /// Tombstone every live entry of the sub-tree at `key`.
    pub fn sub_clear(&self, key: &[u8], timestamp: i64) -> usize {
        metrics::record_operation("sub_clear");
        let path = nibbles_of(key);
        let mut inner = self.inner.write();
        let mut removed = 0;
        if let Some((sub, outer_stamp)) = self.sub_tree(&inner, &path) {
            removed = sub.clear(timestamp);
            self.rehang(&mut inner, &path, sub, outer_stamp);
        }
        if removed > 0 {
            inner.emit(Record::sub_clear(key));
        }
        removed
    }

    pub fn sub_size(&self, key: &[u8]) -> usize {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .map_or(0, |(sub, _)| sub.size())
    }

    pub fn sub_real_size(&self, key: &[u8]) -> usize {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .map_or(0, |(sub, _)| sub.real_size())
    }

    pub fn sub_size_between(
        &self,
        key: &[u8],
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
    ) -> usize {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .map_or(0, |(sub, _)| sub.size_between(min, max, min_inc, max_inc))
    }

    pub fn sub_each_between<F>(
        &self,
        key: &[u8],
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
        f: F,
    ) where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        let inner = self.inner.read();
        if let Some((sub, _)) = self.sub_tree(&inner, &nibbles_of(key)) {
            sub.each_between(min, max, min_inc, max_inc, f);
        }
    }

    pub fn sub_reverse_each_between<F>(
        &self,
        key: &[u8],
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
        f: F,
    ) where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        let inner = self.inner.read();
        if let Some((sub, _)) = self.sub_tree(&inner, &nibbles_of(key)) {
            sub.reverse_each_between(min, max, min_inc, max_inc, f);
        }
    }

    pub fn sub_each_between_index<F>(
        &self,
        key: &[u8],
        min: Option<usize>,
        max: Option<usize>,
        f: F,
    ) where
        F: FnMut(&[u8], &[u8], i64, usize) -> bool,
    {
        let inner = self.inner.read();
        if let Some((sub, _)) = self.sub_tree(&inner, &nibbles_of(key)) {
            sub.each_between_index(min, max, f);
        }
    }

    pub fn sub_reverse_each_between_index<F>(
        &self,
        key: &[u8],
        min: Option<usize>,
        max: Option<usize>,
        f: F,
    ) where
        F: FnMut(&[u8], &[u8], i64, usize) -> bool,
    {
        let inner = self.inner.read();
        if let Some((sub, _)) = self.sub_tree(&inner, &nibbles_of(key)) {
            sub.reverse_each_between_index(min, max, f);
        }
    }

    pub fn sub_index_of(&self, key: &[u8], sub_key: &[u8]) -> (usize, bool) {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .map_or((0, false), |(sub, _)| sub.index_of(sub_key))
    }

    pub fn sub_reverse_index_of(&self, key: &[u8], sub_key: &[u8]) -> (usize, bool) {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .map_or((0, false), |(sub, _)| sub.reverse_index_of(sub_key))
    }

    pub fn sub_first(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .and_then(|(sub, _)| sub.first())
    }

    pub fn sub_last(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .and_then(|(sub, _)| sub.last())
    }

    pub fn sub_prev(&self, key: &[u8], sub_key: &[u8]) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .and_then(|(sub, _)| sub.prev(sub_key))
    }

    pub fn sub_next(&self, key: &[u8], sub_key: &[u8]) -> Option<(Vec<u8>, Vec<u8>, i64)> {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .and_then(|(sub, _)| sub.next(sub_key))
    }

    pub fn sub_next_index(&self, key: &[u8], n: usize) -> Option<(Vec<u8>, Vec<u8>, i64, usize)> {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .and_then(|(sub, _)| sub.next_index(n))
    }

    pub fn sub_prev_index(&self, key: &[u8], n: usize) -> Option<(Vec<u8>, Vec<u8>, i64, usize)> {
        let inner = self.inner.read();
        self.sub_tree(&inner, &nibbles_of(key))
            .and_then(|(sub, _)| sub.prev_index(n))
    }
}
