//! Traversal, range bounds, and order statistics over the node layer.
//!
//! Bounds carry the inclusive/exclusive decision as a signed integer in
//! {-1, 0, +1}: a key passes the lower bound when `cmp(key, min) > min_cmp`
//! and the upper bound when `cmp(key, max) < max_cmp`, so inclusive bounds
//! use -1 / +1 and exclusive bounds use 0 on either side. Pruning leans on
//! the aggregate invariant: a subtree whose whole prefix range falls
//! outside the bounds is skipped without descent.

use super::{Node, SlotView, BYTE, TREE};
use crate::nibble::{cmp_val, common_prefix, Nibble};
use crate::print::Print;

fn passes(
    key: &[Nibble],
    min: Option<&[Nibble]>,
    max: Option<&[Nibble]>,
    min_cmp: i8,
    max_cmp: i8,
) -> bool {
    let lo = min.map_or(true, |m| cmp_val(key, m) > min_cmp);
    let hi = max.map_or(true, |m| cmp_val(key, m) < max_cmp);
    lo && hi
}

/// Every key under `prefix` sorts below `min`.
fn all_below(prefix: &[Nibble], min: Option<&[Nibble]>) -> bool {
    min.map_or(false, |m| cmp_val(prefix, m) < 0 && !m.starts_with(prefix))
}

/// Every key under `prefix` sorts above `max`.
fn all_above(prefix: &[Nibble], max: Option<&[Nibble]>) -> bool {
    max.map_or(false, |m| cmp_val(prefix, m) > 0)
}

/// In-order traversal. The callback's `false` aborts the whole walk.
pub(crate) fn each<F>(node: &Node, path: &mut Vec<Nibble>, mask: u8, f: &mut F) -> bool
where
    F: FnMut(&[Nibble], SlotView<'_>) -> bool,
{
    let depth = path.len();
    path.extend_from_slice(&node.segment);
    let mut cont = true;
    if node.visits(mask) {
        cont = f(path, node.view());
    }
    if cont {
        for child in node.children.iter().flatten() {
            if !each(child, path, mask, f) {
                cont = false;
                break;
            }
        }
    }
    path.truncate(depth);
    cont
}

pub(crate) fn reverse_each<F>(node: &Node, path: &mut Vec<Nibble>, mask: u8, f: &mut F) -> bool
where
    F: FnMut(&[Nibble], SlotView<'_>) -> bool,
{
    let depth = path.len();
    path.extend_from_slice(&node.segment);
    let mut cont = true;
    for child in node.children.iter().rev().flatten() {
        if !reverse_each(child, path, mask, f) {
            cont = false;
            break;
        }
    }
    if cont && node.visits(mask) {
        cont = f(path, node.view());
    }
    path.truncate(depth);
    cont
}

pub(crate) fn each_between<F>(
    node: &Node,
    path: &mut Vec<Nibble>,
    min: Option<&[Nibble]>,
    max: Option<&[Nibble]>,
    min_cmp: i8,
    max_cmp: i8,
    mask: u8,
    f: &mut F,
) -> bool
where
    F: FnMut(&[Nibble], SlotView<'_>) -> bool,
{
    let depth = path.len();
    path.extend_from_slice(&node.segment);
    if all_below(path, min) {
        path.truncate(depth);
        return true;
    }
    if all_above(path, max) {
        // Nothing later in the order can qualify either.
        path.truncate(depth);
        return false;
    }
    let mut cont = true;
    if node.visits(mask) && passes(path, min, max, min_cmp, max_cmp) {
        cont = f(path, node.view());
    }
    if cont {
        for child in node.children.iter().flatten() {
            if !each_between(child, path, min, max, min_cmp, max_cmp, mask, f) {
                cont = false;
                break;
            }
        }
    }
    path.truncate(depth);
    cont
}

pub(crate) fn reverse_each_between<F>(
    node: &Node,
    path: &mut Vec<Nibble>,
    min: Option<&[Nibble]>,
    max: Option<&[Nibble]>,
    min_cmp: i8,
    max_cmp: i8,
    mask: u8,
    f: &mut F,
) -> bool
where
    F: FnMut(&[Nibble], SlotView<'_>) -> bool,
{
    let depth = path.len();
    path.extend_from_slice(&node.segment);
    if all_above(path, max) {
        path.truncate(depth);
        return true;
    }
    if all_below(path, min) {
        // Everything later in reverse order is smaller still.
        path.truncate(depth);
        return false;
    }
    let mut cont = true;
    for child in node.children.iter().rev().flatten() {
        if !reverse_each_between(child, path, min, max, min_cmp, max_cmp, mask, f) {
            cont = false;
            break;
        }
    }
    if cont && node.visits(mask) && passes(path, min, max, min_cmp, max_cmp) {
        cont = f(path, node.view());
    }
    path.truncate(depth);
    cont
}

/// Entries between the bounds, counted with the mask's aggregate. Subtrees
/// wholly inside the range are answered from their aggregates without
/// descent.
pub(crate) fn size_between(
    node: &Node,
    path: &mut Vec<Nibble>,
    min: Option<&[Nibble]>,
    max: Option<&[Nibble]>,
    min_cmp: i8,
    max_cmp: i8,
    mask: u8,
) -> usize {
    let depth = path.len();
    path.extend_from_slice(&node.segment);
    if all_below(path, min) || all_above(path, max) {
        path.truncate(depth);
        return 0;
    }
    let within_min = min.map_or(true, |m| cmp_val(path, m) > min_cmp);
    let within_max = max.map_or(true, |m| cmp_val(path, m) < 0 && !m.starts_with(path));
    if within_min && within_max {
        let total = node.count(mask);
        path.truncate(depth);
        return total;
    }
    let mut total = 0;
    if passes(path, min, max, min_cmp, max_cmp) {
        total += node.entry_count(mask);
    }
    for child in node.children.iter().flatten() {
        total += size_between(child, path, min, max, min_cmp, max_cmp, mask);
    }
    path.truncate(depth);
    total
}

/// Order-statistic descent: entries counting for `mask` that sort strictly
/// before `key`, plus the present/live masks found at the key itself.
pub(crate) fn rank(node: &Node, key: &[Nibble], mask: u8) -> (usize, u8, u8) {
    let prefix = common_prefix(&node.segment, key);
    if prefix < node.segment.len() {
        // Divergence inside the segment: the subtree lies entirely on one
        // side of the key.
        if prefix == key.len() || key[prefix] < node.segment[prefix] {
            return (0, 0, 0);
        }
        return (node.count(mask), 0, 0);
    }
    if prefix == key.len() {
        return (0, node.present, node.live);
    }
    let rest = &key[prefix..];
    let branch = rest[0] as usize;
    let mut before = node.entry_count(mask);
    for child in node.children[..branch].iter().flatten() {
        before += child.count(mask);
    }
    match &node.children[branch] {
        Some(child) => {
            let (below, present, live) = rank(child, rest, mask);
            (before + below, present, live)
        }
        None => (before, 0, 0),
    }
}

/// Contribution of one entry to a mask's count, from its slot masks.
pub(crate) fn slot_contribution(present: u8, live: u8, mask: u8) -> usize {
    match mask {
        BYTE => usize::from(live & BYTE != 0),
        TREE => usize::from(present & TREE != 0),
        _ => usize::from(present & BYTE != 0) + usize::from(present & TREE != 0),
    }
}

/// Position-bounded in-order traversal. `base` is the number of masked
/// entries ordered before this subtree; bounds are inclusive.
pub(crate) fn each_between_index<F>(
    node: &Node,
    path: &mut Vec<Nibble>,
    base: usize,
    min: Option<usize>,
    max: Option<usize>,
    mask: u8,
    f: &mut F,
) -> bool
where
    F: FnMut(&[Nibble], SlotView<'_>, usize) -> bool,
{
    if max.is_some_and(|m| base > m) {
        return false;
    }
    let count = node.count(mask);
    if min.is_some_and(|m| base + count <= m) {
        return true;
    }
    let depth = path.len();
    path.extend_from_slice(&node.segment);
    let mut cont = true;
    let mut cursor = base;
    if node.visits(mask) {
        if min.map_or(true, |m| cursor >= m) && max.map_or(true, |m| cursor <= m) {
            cont = f(path, node.view(), cursor);
        }
    }
    cursor += node.entry_count(mask);
    if cont {
        for child in node.children.iter().flatten() {
            if !each_between_index(child, path, cursor, min, max, mask, f) {
                cont = false;
                break;
            }
            cursor += child.count(mask);
        }
    }
    path.truncate(depth);
    cont
}

/// Reverse positions: index 0 is the greatest masked entry.
pub(crate) fn reverse_each_between_index<F>(
    node: &Node,
    path: &mut Vec<Nibble>,
    base: usize,
    min: Option<usize>,
    max: Option<usize>,
    mask: u8,
    f: &mut F,
) -> bool
where
    F: FnMut(&[Nibble], SlotView<'_>, usize) -> bool,
{
    if max.is_some_and(|m| base > m) {
        return false;
    }
    let count = node.count(mask);
    if min.is_some_and(|m| base + count <= m) {
        return true;
    }
    let depth = path.len();
    path.extend_from_slice(&node.segment);
    let mut cont = true;
    let mut cursor = base;
    for child in node.children.iter().rev().flatten() {
        if !reverse_each_between_index(child, path, cursor, min, max, mask, f) {
            cont = false;
            break;
        }
        cursor += child.count(mask);
    }
    if cont && node.visits(mask) {
        if min.map_or(true, |m| cursor >= m) && max.map_or(true, |m| cursor <= m) {
            cont = f(path, node.view(), cursor);
        }
    }
    path.truncate(depth);
    cont
}

/// Accumulate witnesses along the descent toward `key`, stopping at the
/// deepest node whose path still covers it.
pub(crate) fn finger(node: &Node, print: &mut Print, key: &[Nibble]) {
    let prefix = common_prefix(&node.segment, key);
    if prefix == node.segment.len() || prefix == key.len() {
        print.witnesses.push(node.witness());
    }
    if prefix == node.segment.len() && prefix < key.len() {
        let rest = &key[prefix..];
        if let Some(child) = &node.children[rest[0] as usize] {
            finger(child, print, rest);
        }
    }
}
