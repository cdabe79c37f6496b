// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Radix trie node layer.
//!
//! Nodes are immutable along the mutated spine: every mutator takes an
//! `Arc<Node>` and returns a possibly-new node, cloning only the path it
//! touches and sharing every untouched subtree. Aggregates (`byte_size`,
//! `tree_size`, `real_size`) and the rolling hash are recomputed on the
//! return walk, so invariants hold the moment a mutator returns.
//!
//! Each node carries two value slots, selected by a two-bit use mask: a
//! plain byte value and a nested sub-tree. A slot can be live, tombstoned
//! (present with a timestamp but no value), or absent. Tombstoned and
//! absent slots hash identically, which is what keeps log replay and
//! replica comparison stable across tombstone timestamps.

pub(crate) mod iter;

use crate::nibble::{common_prefix, Nibble, FANOUT};
use crate::print::Witness;
use crate::tree::Tree;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Use-mask bit for the byte-value slot.
pub(crate) const BYTE: u8 = 1;
/// Use-mask bit for the sub-tree slot.
pub(crate) const TREE: u8 = 2;
/// Both slots.
pub(crate) const BOTH: u8 = BYTE | TREE;

const SLOT_DEAD: u8 = 0x00;
const SLOT_BYTES: u8 = 0x01;
const SLOT_TREE: u8 = 0x02;

/// One write, aimed at the slots named by `mask`. A `None` value for a
/// masked slot writes a tombstone.
pub(crate) struct Payload {
    pub mask: u8,
    pub bytes: Option<Vec<u8>>,
    pub tree: Option<Arc<Tree>>,
    pub stamp: i64,
}

/// Whether a write obeys last-writer-wins or applies unconditionally (the
/// timestamp-conditional operations, which do their own expectation check).
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum WritePolicy {
    IfNewer,
    Always,
}

/// What a mutator displaced: the slot state found at the key before the
/// write, whether or not the write ended up applying.
#[derive(Debug, Default)]
pub(crate) struct Displaced {
    pub bytes: Option<Vec<u8>>,
    pub tree: Option<Arc<Tree>>,
    pub byte_stamp: i64,
    pub tree_stamp: i64,
    pub present: u8,
    pub live: u8,
}

/// Borrowed view of the slots stored at one key.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotView<'a> {
    pub bytes: Option<&'a [u8]>,
    pub tree: Option<&'a Arc<Tree>>,
    pub byte_stamp: i64,
    pub tree_stamp: i64,
    pub present: u8,
    pub live: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// Nibble prefix shared by every descendant, including the branch
    /// nibble that selected this node in its parent.
    segment: Vec<Nibble>,
    bytes: Option<Vec<u8>>,
    tree: Option<Arc<Tree>>,
    byte_stamp: i64,
    tree_stamp: i64,
    /// Slots that exist here, tombstones included.
    present: u8,
    /// Slots holding a value; always a subset of `present`.
    live: u8,
    hash: [u8; 32],
    entry_hash: [u8; 32],
    byte_size: usize,
    tree_size: usize,
    real_size: usize,
    children: [Option<Arc<Node>>; FANOUT],
}

impl Node {
    /// Structural node: a segment, no slots. Used for the root and for
    /// split parents.
    fn shell(segment: Vec<Nibble>) -> Node {
        let mut node = Node {
            segment,
            bytes: None,
            tree: None,
            byte_stamp: 0,
            tree_stamp: 0,
            present: 0,
            live: 0,
            hash: [0; 32],
            entry_hash: [0; 32],
            byte_size: 0,
            tree_size: 0,
            real_size: 0,
            children: std::array::from_fn(|_| None),
        };
        node.refresh();
        node
    }

    /// Empty root.
    pub(crate) fn empty() -> Arc<Node> {
        Arc::new(Node::shell(Vec::new()))
    }

    /// Restore the root anchor after a delete. The root always keeps an
    /// empty segment so that every history of the same content converges
    /// on one structure; a merge result carrying a segment is re-hung
    /// under a fresh shell.
    pub(crate) fn anchored(root: Option<Arc<Node>>) -> Arc<Node> {
        match root {
            None => Node::empty(),
            Some(node) if node.segment.is_empty() => node,
            Some(node) => {
                let mut shell = Node::shell(Vec::new());
                let idx = node.segment[0] as usize;
                shell.children[idx] = Some(node);
                shell.refresh();
                Arc::new(shell)
            }
        }
    }

    pub(crate) fn hash(&self) -> [u8; 32] {
        self.hash
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub(crate) fn tree_size(&self) -> usize {
        self.tree_size
    }

    pub(crate) fn real_size(&self) -> usize {
        self.real_size
    }

    fn view(&self) -> SlotView<'_> {
        SlotView {
            bytes: self.bytes.as_deref(),
            tree: self.tree.as_ref(),
            byte_stamp: self.byte_stamp,
            tree_stamp: self.tree_stamp,
            present: self.present,
            live: self.live,
        }
    }

    fn witness(&self) -> Witness {
        Witness {
            segment: self.segment.clone(),
            subtree_hash: self.hash,
            entry_hash: self.entry_hash,
            byte_stamp: self.byte_stamp,
            tree_stamp: self.tree_stamp,
            present: self.present,
        }
    }

    /// Entries in this subtree that count for `mask`, read off the
    /// aggregates.
    fn count(&self, mask: u8) -> usize {
        match mask {
            BYTE => self.real_size,
            TREE => self.tree_size,
            _ => self.byte_size + self.tree_size,
        }
    }

    /// This node's own contribution to `count`.
    fn entry_count(&self, mask: u8) -> usize {
        match mask {
            BYTE => usize::from(self.live & BYTE != 0),
            TREE => usize::from(self.present & TREE != 0),
            _ => {
                usize::from(self.present & BYTE != 0) + usize::from(self.present & TREE != 0)
            }
        }
    }

    /// Whether iteration under `mask` visits this node's entry. Mask 0 is
    /// the marker traversal: every entry, tombstones included.
    fn visits(&self, mask: u8) -> bool {
        if mask == 0 {
            self.present != 0
        } else {
            self.live & mask != 0
        }
    }

    /// Encoding of one slot for hashing. Dead (absent or tombstoned) slots
    /// collapse to a single reserved byte so tombstone timestamps never
    /// perturb replica comparison; live slots bind their timestamp and
    /// content.
    fn encode_slots(&self) -> Vec<u8> {
        let mut enc = Vec::with_capacity(64);
        if self.live & BYTE != 0 {
            enc.push(SLOT_BYTES);
            enc.extend_from_slice(&self.byte_stamp.to_le_bytes());
            let value = self.bytes.as_deref().unwrap_or_default();
            enc.extend_from_slice(&(value.len() as u32).to_le_bytes());
            enc.extend_from_slice(value);
        } else {
            enc.push(SLOT_DEAD);
        }
        if self.live & TREE != 0 {
            enc.push(SLOT_TREE);
            enc.extend_from_slice(&self.tree_stamp.to_le_bytes());
            let subtree = self.tree.as_ref().map(|t| t.hash()).unwrap_or([0; 32]);
            enc.extend_from_slice(&subtree);
        } else {
            enc.push(SLOT_DEAD);
        }
        enc
    }

    /// Recompute aggregates and hashes from the node's own slots and its
    /// current children. Called on every node rebuilt along a mutated
    /// spine.
    fn refresh(&mut self) {
        debug_assert!(self.live & !self.present == 0, "live slot without presence");
        let mut byte_size = usize::from(self.present & BYTE != 0);
        let mut tree_size = usize::from(self.present & TREE != 0);
        let mut real_size = usize::from(self.live & BYTE != 0);
        for child in self.children.iter().flatten() {
            byte_size += child.byte_size;
            tree_size += child.tree_size;
            real_size += child.real_size;
        }
        self.byte_size = byte_size;
        self.tree_size = tree_size;
        self.real_size = real_size;

        let slots = self.encode_slots();
        self.entry_hash = Sha256::digest(&slots).into();

        let mut hasher = Sha256::new();
        hasher.update((self.segment.len() as u32).to_le_bytes());
        hasher.update(&self.segment);
        hasher.update(&slots);
        for child in self.children.iter().flatten() {
            hasher.update(child.hash);
        }
        self.hash = hasher.finalize().into();
    }

    /// Write `payload` into this node's slots, honoring the policy. The
    /// returned [`Displaced`] reflects the pre-write state regardless of
    /// which slots the write actually won.
    fn apply(&mut self, payload: Payload, policy: WritePolicy) -> Displaced {
        let displaced = Displaced {
            bytes: self.bytes.clone(),
            tree: self.tree.clone(),
            byte_stamp: self.byte_stamp,
            tree_stamp: self.tree_stamp,
            present: self.present,
            live: self.live,
        };
        if payload.mask & BYTE != 0 {
            let wins = policy == WritePolicy::Always
                || self.present & BYTE == 0
                || payload.stamp > self.byte_stamp;
            if wins {
                self.present |= BYTE;
                self.byte_stamp = payload.stamp;
                match payload.bytes {
                    Some(value) => {
                        self.live |= BYTE;
                        self.bytes = Some(value);
                    }
                    None => {
                        self.live &= !BYTE;
                        self.bytes = None;
                    }
                }
            }
        }
        if payload.mask & TREE != 0 {
            let wins = policy == WritePolicy::Always
                || self.present & TREE == 0
                || payload.stamp > self.tree_stamp;
            if wins {
                self.present |= TREE;
                self.tree_stamp = payload.stamp;
                match payload.tree {
                    Some(subtree) => {
                        self.live |= TREE;
                        self.tree = Some(subtree);
                    }
                    None => {
                        self.live &= !TREE;
                        self.tree = None;
                    }
                }
            }
        }
        displaced
    }

    /// Drop the masked slots entirely (tombstones included), resetting
    /// their timestamps.
    fn clear_slots(&mut self, mask: u8) -> Displaced {
        let displaced = Displaced {
            bytes: self.bytes.clone(),
            tree: self.tree.clone(),
            byte_stamp: self.byte_stamp,
            tree_stamp: self.tree_stamp,
            present: self.present,
            live: self.live,
        };
        if mask & BYTE != 0 {
            self.present &= !BYTE;
            self.live &= !BYTE;
            self.bytes = None;
            self.byte_stamp = 0;
        }
        if mask & TREE != 0 {
            self.present &= !TREE;
            self.live &= !TREE;
            self.tree = None;
            self.tree_stamp = 0;
        }
        displaced
    }

    fn child_count(&self) -> usize {
        self.children.iter().flatten().count()
    }

    /// Place `payload` at `key` (nibbles relative to this node, segment
    /// included). Splits the node when the key diverges mid-segment. The
    /// touched spine is always rebuilt and rehashed, even when the write
    /// loses the timestamp race; losing affects slot content only.
    pub(crate) fn insert(
        node: &Arc<Node>,
        key: &[Nibble],
        payload: Payload,
        policy: WritePolicy,
    ) -> (Arc<Node>, Displaced) {
        let prefix = common_prefix(&node.segment, key);
        if prefix == node.segment.len() {
            if prefix == key.len() {
                // This node is the key.
                let mut next = (**node).clone();
                let displaced = next.apply(payload, policy);
                next.refresh();
                return (Arc::new(next), displaced);
            }
            // Key continues below.
            let branch = key[prefix] as usize;
            let rest = &key[prefix..];
            let (child, displaced) = match &node.children[branch] {
                Some(child) => Node::insert(child, rest, payload, policy),
                None => {
                    let mut leaf = Node::shell(rest.to_vec());
                    leaf.apply(payload, policy);
                    leaf.refresh();
                    (Arc::new(leaf), Displaced::default())
                }
            };
            let mut next = (**node).clone();
            next.children[branch] = Some(child);
            next.refresh();
            return (Arc::new(next), displaced);
        }

        // Key diverges inside this node's segment: split. The shared
        // prefix becomes a new parent; this node keeps the suffix.
        let mut shortened = (**node).clone();
        shortened.segment = node.segment[prefix..].to_vec();
        shortened.refresh();
        let mut parent = Node::shell(node.segment[..prefix].to_vec());
        parent.children[node.segment[prefix] as usize] = Some(Arc::new(shortened));
        let displaced = if prefix == key.len() {
            parent.apply(payload, policy)
        } else {
            let mut leaf = Node::shell(key[prefix..].to_vec());
            leaf.apply(payload, policy);
            leaf.refresh();
            parent.children[key[prefix] as usize] = Some(Arc::new(leaf));
            Displaced::default()
        };
        parent.refresh();
        (Arc::new(parent), displaced)
    }

    /// Descend along matching segments; the view is returned even when
    /// every slot at the key is a tombstone.
    pub(crate) fn get<'a>(&'a self, key: &[Nibble]) -> Option<SlotView<'a>> {
        if key.len() < self.segment.len() || key[..self.segment.len()] != self.segment[..] {
            return None;
        }
        if key.len() == self.segment.len() {
            if self.present == 0 {
                return None;
            }
            return Some(self.view());
        }
        let rest = &key[self.segment.len()..];
        self.children[rest[0] as usize]
            .as_ref()
            .and_then(|child| child.get(rest))
    }

    /// Physically remove the masked slots at `key`, collapsing redundant
    /// nodes on the way back up. Returns `None` when the subtree vanished
    /// entirely.
    pub(crate) fn del(
        node: &Arc<Node>,
        key: &[Nibble],
        mask: u8,
    ) -> (Option<Arc<Node>>, Displaced) {
        let seg_len = node.segment.len();
        if key.len() < seg_len || key[..seg_len] != node.segment[..] {
            return (Some(node.clone()), Displaced::default());
        }
        if key.len() == seg_len {
            if node.present & mask == 0 {
                return (Some(node.clone()), Displaced::default());
            }
            let mut next = (**node).clone();
            let displaced = next.clear_slots(mask);
            return (Node::normalize(next), displaced);
        }
        let rest = &key[seg_len..];
        let branch = rest[0] as usize;
        let Some(child) = &node.children[branch] else {
            return (Some(node.clone()), Displaced::default());
        };
        let (new_child, displaced) = Node::del(child, rest, mask);
        if displaced.present == 0 {
            if let Some(same) = &new_child {
                if Arc::ptr_eq(same, child) {
                    // Nothing was removed below; keep the shared spine.
                    return (Some(node.clone()), displaced);
                }
            }
        }
        let mut next = (**node).clone();
        next.children[branch] = new_child;
        (Node::normalize(next), displaced)
    }

    /// Apply the collapse rules: a node with no slots disappears when it
    /// has no children and merges into its child when it has exactly one,
    /// prepending its segment.
    fn normalize(mut node: Node) -> Option<Arc<Node>> {
        if node.present == 0 {
            match node.child_count() {
                0 => return None,
                1 => {
                    let child = node
                        .children
                        .iter_mut()
                        .find_map(|slot| slot.take())
                        .unwrap_or_else(|| unreachable!("child_count was 1"));
                    let mut merged = (*child).clone();
                    let mut segment = node.segment;
                    segment.extend_from_slice(&merged.segment);
                    merged.segment = segment;
                    merged.refresh();
                    return Some(Arc::new(merged));
                }
                _ => {}
            }
        }
        node.refresh();
        Some(Arc::new(node))
    }

    /// Indented structural dump: segment nibbles, slot masks, aggregates,
    /// hash prefix, nested sub-trees.
    pub(crate) fn describe(&self, indent: usize, out: &mut String) {
        use std::fmt::Write as _;
        let segment: String = self
            .segment
            .iter()
            .map(|n| char::from_digit(u32::from(*n), 16).unwrap_or('?'))
            .collect();
        let _ = writeln!(
            out,
            "{}[{}] present:{:02b} live:{:02b} sizes:{}/{}/{} hash:{}",
            " ".repeat(indent),
            segment,
            self.present,
            self.live,
            self.byte_size,
            self.real_size,
            self.tree_size,
            hex::encode(&self.hash[..4]),
        );
        if let Some(tree) = &self.tree {
            out.push_str(&tree.describe_indented(indent + 2));
        }
        for child in self.children.iter().flatten() {
            child.describe(indent + 2, out);
        }
    }

    /// Tombstone every live masked slot in the subtree whose stored
    /// timestamp the given one beats. Returns the untouched node when
    /// nothing matched.
    pub(crate) fn fake_clear(node: &Arc<Node>, mask: u8, stamp: i64) -> (Arc<Node>, usize) {
        let mut next = (**node).clone();
        let mut removed = 0;
        let mut changed = false;
        if mask & BYTE != 0 && next.live & BYTE != 0 && stamp > next.byte_stamp {
            next.live &= !BYTE;
            next.bytes = None;
            next.byte_stamp = stamp;
            removed += 1;
            changed = true;
        }
        if mask & TREE != 0 && next.live & TREE != 0 && stamp > next.tree_stamp {
            next.live &= !TREE;
            next.tree = None;
            next.tree_stamp = stamp;
            removed += 1;
            changed = true;
        }
        for slot in next.children.iter_mut() {
            if let Some(child) = slot {
                let (new_child, sub_removed) = Node::fake_clear(child, mask, stamp);
                if sub_removed > 0 {
                    removed += sub_removed;
                    changed = true;
                }
                *slot = Some(new_child);
            }
        }
        if !changed {
            return (node.clone(), 0);
        }
        next.refresh();
        (Arc::new(next), removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nibble::nibbles_of;

    fn put_payload(value: &[u8], stamp: i64) -> Payload {
        Payload {
            mask: BYTE,
            bytes: Some(value.to_vec()),
            tree: None,
            stamp,
        }
    }

    fn tombstone_payload(stamp: i64) -> Payload {
        Payload {
            mask: BYTE,
            bytes: None,
            tree: None,
            stamp,
        }
    }

    fn insert(node: &Arc<Node>, key: &[u8], value: &[u8], stamp: i64) -> (Arc<Node>, Displaced) {
        Node::insert(
            node,
            &nibbles_of(key),
            put_payload(value, stamp),
            WritePolicy::IfNewer,
        )
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (root, displaced) = insert(&Node::empty(), b"key", b"value", 7);
        assert_eq!(displaced.present, 0);
        let view = root.get(&nibbles_of(b"key")).unwrap();
        assert_eq!(view.bytes, Some(&b"value"[..]));
        assert_eq!(view.byte_stamp, 7);
        assert_eq!(root.real_size(), 1);
        assert_eq!(root.byte_size(), 1);
        assert!(root.get(&nibbles_of(b"other")).is_none());
        assert!(root.get(&nibbles_of(b"ke")).is_none());
    }

    #[test]
    fn split_produces_shared_prefix_parent() {
        let (root, _) = insert(&Node::empty(), b"ab", b"1", 1);
        let (root, _) = insert(&root, b"ad", b"2", 2);
        // Root collapses around the shared "a" prefix plus the first
        // nibble of the diverging byte (0x62 vs 0x64 share nibble 6).
        assert_eq!(root.real_size(), 2);
        assert!(root.get(&nibbles_of(b"ab")).is_some());
        assert!(root.get(&nibbles_of(b"ad")).is_some());
        assert!(root.get(&nibbles_of(b"a")).is_none());
    }

    #[test]
    fn newer_write_wins_older_loses() {
        let (root, _) = insert(&Node::empty(), b"k", b"v1", 5);
        let (root, displaced) = insert(&root, b"k", b"v2", 3);
        assert_eq!(displaced.live & BYTE, BYTE);
        let view = root.get(&nibbles_of(b"k")).unwrap();
        assert_eq!(view.bytes, Some(&b"v1"[..]));
        assert_eq!(view.byte_stamp, 5);

        let (root, _) = insert(&root, b"k", b"v3", 9);
        let view = root.get(&nibbles_of(b"k")).unwrap();
        assert_eq!(view.bytes, Some(&b"v3"[..]));
    }

    #[test]
    fn equal_timestamps_preserve_existing() {
        let (root, _) = insert(&Node::empty(), b"k", b"first", 5);
        let (root, _) = insert(&root, b"k", b"second", 5);
        let view = root.get(&nibbles_of(b"k")).unwrap();
        assert_eq!(view.bytes, Some(&b"first"[..]));
    }

    #[test]
    fn tombstone_counts_in_byte_size_not_real_size() {
        let (root, _) = insert(&Node::empty(), b"k", b"v", 5);
        let (root, displaced) = Node::insert(
            &root,
            &nibbles_of(b"k"),
            tombstone_payload(10),
            WritePolicy::IfNewer,
        );
        assert_eq!(displaced.live & BYTE, BYTE);
        assert_eq!(root.byte_size(), 1);
        assert_eq!(root.real_size(), 0);
        let view = root.get(&nibbles_of(b"k")).unwrap();
        assert_eq!(view.live & BYTE, 0);
        assert_eq!(view.present & BYTE, BYTE);
        assert_eq!(view.byte_stamp, 10);
    }

    #[test]
    fn tombstone_dominates_older_put() {
        let (root, _) = insert(&Node::empty(), b"k", b"v", 5);
        let (root, _) = Node::insert(
            &root,
            &nibbles_of(b"k"),
            tombstone_payload(10),
            WritePolicy::IfNewer,
        );
        let (root, _) = insert(&root, b"k", b"v2", 4);
        assert_eq!(root.real_size(), 0);
        let (root, _) = insert(&root, b"k", b"v3", 11);
        let view = root.get(&nibbles_of(b"k")).unwrap();
        assert_eq!(view.bytes, Some(&b"v3"[..]));
        assert_eq!(root.real_size(), 1);
    }

    #[test]
    fn tombstone_created_for_absent_key() {
        let (root, displaced) = Node::insert(
            &Node::empty(),
            &nibbles_of(b"ghost"),
            tombstone_payload(4),
            WritePolicy::IfNewer,
        );
        assert_eq!(displaced.present, 0);
        assert_eq!(root.byte_size(), 1);
        assert_eq!(root.real_size(), 0);
        // The older put now loses against the tombstone.
        let (root, _) = insert(&root, b"ghost", b"back", 3);
        assert_eq!(root.real_size(), 0);
    }

    #[test]
    fn del_removes_and_collapses() {
        let (root, _) = insert(&Node::empty(), b"a", b"1", 1);
        let (root, _) = insert(&root, b"ab", b"2", 2);
        let (root, _) = insert(&root, b"abc", b"3", 3);
        let (root, displaced) = Node::del(&root, &nibbles_of(b"ab"), BYTE);
        let root = root.unwrap();
        assert_eq!(displaced.bytes, Some(b"2".to_vec()));
        assert_eq!(root.real_size(), 2);
        assert!(root.get(&nibbles_of(b"ab")).is_none());
        assert!(root.get(&nibbles_of(b"a")).is_some());
        assert!(root.get(&nibbles_of(b"abc")).is_some());

        let (root, _) = Node::del(&root, &nibbles_of(b"a"), BYTE);
        let (root, _) = Node::del(&root.unwrap(), &nibbles_of(b"abc"), BYTE);
        assert!(root.is_none());
    }

    #[test]
    fn del_missing_key_is_a_no_op() {
        let (root, _) = insert(&Node::empty(), b"a", b"1", 1);
        let before = root.hash();
        let (root, displaced) = Node::del(&root, &nibbles_of(b"zzz"), BYTE);
        assert_eq!(displaced.present, 0);
        assert_eq!(root.unwrap().hash(), before);
    }

    #[test]
    fn hash_ignores_tombstone_timestamps() {
        let (a, _) = insert(&Node::empty(), b"k", b"v", 5);
        let (a, _) = Node::insert(&a, &nibbles_of(b"k"), tombstone_payload(10), WritePolicy::IfNewer);
        let (b, _) = insert(&Node::empty(), b"k", b"v", 5);
        let (b, _) = Node::insert(&b, &nibbles_of(b"k"), tombstone_payload(99), WritePolicy::IfNewer);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_binds_live_timestamps() {
        let (a, _) = insert(&Node::empty(), b"k", b"v", 5);
        let (b, _) = insert(&Node::empty(), b"k", b"v", 6);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_is_insertion_order_independent() {
        let keys: [(&[u8], &[u8], i64); 4] =
            [(b"a", b"1", 1), (b"ab", b"2", 2), (b"b", b"3", 3), (b"ba", b"4", 4)];
        let mut forward = Node::empty();
        for (k, v, t) in keys {
            forward = insert(&forward, k, v, t).0;
        }
        let mut backward = Node::empty();
        for &(k, v, t) in keys.iter().rev() {
            backward = insert(&backward, k, v, t).0;
        }
        assert_eq!(forward.hash(), backward.hash());
    }

    #[test]
    fn fake_clear_tombstones_everything_newer_loses() {
        let mut root = Node::empty();
        for (k, t) in [(&b"a"[..], 1i64), (b"b", 2), (b"c", 30)] {
            root = insert(&root, k, b"v", t).0;
        }
        let (root, removed) = Node::fake_clear(&root, BYTE, 10);
        // "c" was written at 30, after the clear stamp; it survives.
        assert_eq!(removed, 2);
        assert_eq!(root.real_size(), 1);
        assert_eq!(root.byte_size(), 3);
        let (same, removed_again) = Node::fake_clear(&root, BYTE, 10);
        assert_eq!(removed_again, 0);
        assert!(Arc::ptr_eq(&same, &root));
    }

    #[test]
    fn structural_sharing_keeps_untouched_subtrees() {
        let (root, _) = insert(&Node::empty(), b"left", b"1", 1);
        let (root, _) = insert(&root, b"right", b"2", 2);
        let (updated, _) = insert(&root, b"left", b"3", 3);
        // The "right" child pointer is shared between the two roots.
        let old_right = root.children[nibbles_of(b"right")[0] as usize].as_ref().unwrap();
        let new_right = updated.children[nibbles_of(b"right")[0] as usize]
            .as_ref()
            .unwrap();
        assert!(Arc::ptr_eq(old_right, new_right));
    }
}
