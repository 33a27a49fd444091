//! Order-Statistics Treap
//!
//! Every array-typed key is backed by a [`Treap`]: a randomized balanced binary
//! tree keyed purely by position. There is no comparison key; a node's index is
//! the size of everything to its left. Random priorities keep the expected depth
//! at O(log n), which makes positional access and splicing cheap at both ends
//! and in the middle.
//!
//! ## Primitives
//!
//! Everything is built from two operations:
//!
//! ```text
//! merge(A, B)  ->  A ++ B            (root = higher priority, recursively)
//! split(T, k)  ->  (T[..k], T[k..])  (saturates: k >= len gives (T, empty))
//! ```
//!
//! Subtrees are moved, never shared: a node belongs to exactly one tree at a
//! time, which is what `Option<Box<Node>>` expresses.
//!
//! ## Multiplicity
//!
//! The treap also tracks how many times each value occurs so that
//! [`Treap::push_back_if_absent`] (set insertion) is O(1) to decide. The count
//! map is updated by every structural change and is not consulted otherwise.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::value::Value;
use rand::Rng;
use std::collections::HashMap;

type Link = Option<Box<Node>>;

#[derive(Debug)]
struct Node {
    value: Value,
    priority: u64,
    size: usize,
    left: Link,
    right: Link,
}

impl Node {
    fn new(value: Value) -> Box<Self> {
        Box::new(Self {
            value,
            priority: rand::thread_rng().gen(),
            size: 1,
            left: None,
            right: None,
        })
    }

    /// Recomputes the cached subtree size from the children.
    #[inline]
    fn update(&mut self) {
        self.size = size(&self.left) + 1 + size(&self.right);
    }
}

#[inline]
fn size(link: &Link) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

fn merge(left: Link, right: Link) -> Link {
    match (left, right) {
        (None, right) => right,
        (left, None) => left,
        (Some(mut l), Some(mut r)) => {
            if l.priority > r.priority {
                l.right = merge(l.right.take(), Some(r));
                l.update();
                Some(l)
            } else {
                r.left = merge(Some(l), r.left.take());
                r.update();
                Some(r)
            }
        }
    }
}

fn split(link: Link, k: usize) -> (Link, Link) {
    let mut node = match link {
        Some(node) => node,
        None => return (None, None),
    };

    let left_size = size(&node.left);
    if left_size < k {
        let (a, b) = split(node.right.take(), k - left_size - 1);
        node.right = a;
        node.update();
        (Some(node), b)
    } else {
        let (a, b) = split(node.left.take(), k);
        node.left = b;
        node.update();
        (a, Some(node))
    }
}

/// Walks `link` in order, moving every value into `out`.
fn drain_in_order(link: Link, out: &mut Vec<Value>) {
    if let Some(node) = link {
        let Node {
            value, left, right, ..
        } = *node;
        drain_in_order(left, out);
        out.push(value);
        drain_in_order(right, out);
    }
}

fn collect_in_order<'a>(link: &'a Link, out: &mut Vec<&'a Value>) {
    if let Some(node) = link {
        collect_in_order(&node.left, out);
        out.push(&node.value);
        collect_in_order(&node.right, out);
    }
}

/// An ordered sequence of [`Value`]s addressable by zero-based position.
///
/// # Example
///
/// ```
/// use treapkv::storage::{Treap, Value};
///
/// let mut treap = Treap::new();
/// treap.push_back(Value::from(2));
/// treap.push_back(Value::from(3));
/// treap.push_front(Value::from(1));
///
/// assert_eq!(treap.len(), 3);
/// assert_eq!(treap.get(0), Ok(&Value::from(1)));
/// assert_eq!(treap.erase_range(1, 2), vec![Value::from(2), Value::from(3)]);
/// ```
#[derive(Debug, Default)]
pub struct Treap {
    root: Link,
    counts: HashMap<Value, usize>,
}

impl Treap {
    /// Creates an empty treap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements. O(1).
    #[inline]
    pub fn len(&self) -> usize {
        size(&self.root)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns `true` if at least one element equals `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.counts.contains_key(value)
    }

    fn count_added(&mut self, value: &Value) {
        *self.counts.entry(value.clone()).or_insert(0) += 1;
    }

    fn count_removed(&mut self, value: &Value) {
        if let Some(count) = self.counts.get_mut(value) {
            if *count > 1 {
                *count -= 1;
            } else {
                self.counts.remove(value);
            }
        }
    }

    /// Appends `value` at the end.
    pub fn push_back(&mut self, value: Value) {
        self.count_added(&value);
        self.root = merge(self.root.take(), Some(Node::new(value)));
    }

    /// Prepends `value` at the front.
    pub fn push_front(&mut self, value: Value) {
        self.count_added(&value);
        self.root = merge(Some(Node::new(value)), self.root.take());
    }

    /// Appends `value` only if no equal value is already present.
    ///
    /// Returns `true` if the value was appended.
    pub fn push_back_if_absent(&mut self, value: Value) -> bool {
        if self.contains(&value) {
            return false;
        }
        self.push_back(value);
        true
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> StorageResult<&Value> {
        let mut index = index;
        let mut link = &self.root;

        while let Some(node) = link {
            let left_size = size(&node.left);
            if index < left_size {
                link = &node.left;
            } else if index == left_size {
                return Ok(&node.value);
            } else {
                index -= left_size + 1;
                link = &node.right;
            }
        }

        Err(StorageError::IndexOutOfRange)
    }

    /// Replaces the element at `index`, returning the previous value.
    pub fn set(&mut self, index: usize, value: Value) -> StorageResult<Value> {
        if index >= self.len() {
            return Err(StorageError::IndexOutOfRange);
        }

        let (less, rest) = split(self.root.take(), index);
        let (mut target, greater) = split(rest, 1);

        // split(rest, 1) on a non-empty tree always yields a singleton
        let previous = match target.as_mut() {
            Some(node) => std::mem::replace(&mut node.value, value.clone()),
            None => {
                self.root = merge(less, greater);
                return Err(StorageError::IndexOutOfRange);
            }
        };

        self.count_removed(&previous);
        self.count_added(&value);
        self.root = merge(merge(less, target), greater);
        Ok(previous)
    }

    /// Removes and returns the first element.
    pub fn pop_front(&mut self) -> Option<Value> {
        let (first, rest) = split(self.root.take(), 1);
        self.root = rest;
        let value = first.map(|node| node.value)?;
        self.count_removed(&value);
        Some(value)
    }

    /// Removes and returns the last element.
    pub fn pop_back(&mut self) -> Option<Value> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let (rest, last) = split(self.root.take(), len - 1);
        self.root = rest;
        let value = last.map(|node| node.value)?;
        self.count_removed(&value);
        Some(value)
    }

    /// Removes positions `l..=r` and returns them in order.
    ///
    /// Bounds past the end saturate, so `erase_range(len - 1, len)` removes just
    /// the last element.
    pub fn erase_range(&mut self, l: usize, r: usize) -> Vec<Value> {
        if r < l {
            return Vec::new();
        }

        let (less, rest) = split(self.root.take(), l);
        let (middle, greater) = split(rest, r - l + 1);

        let mut removed = Vec::with_capacity(size(&middle));
        drain_in_order(middle, &mut removed);
        for value in &removed {
            self.count_removed(value);
        }

        self.root = merge(less, greater);
        removed
    }

    /// Returns clones of every element in order.
    pub fn to_vec(&self) -> Vec<Value> {
        let mut refs = Vec::with_capacity(self.len());
        collect_in_order(&self.root, &mut refs);
        refs.into_iter().cloned().collect()
    }
}

impl FromIterator<Value> for Treap {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut treap = Treap::new();
        for value in iter {
            treap.push_back(value);
        }
        treap
    }
}

/// Maps a caller-supplied index onto `0..len`.
///
/// Negative indices wrap Python-style (`-1` is the last element, `-len - 1`
/// wraps around again); indices past the end clamp to the last position.
pub fn normalize_index(index: i64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let n = len as i64;
    let index = if index < 0 { index.rem_euclid(n) } else { index };
    if index >= n {
        len - 1
    } else {
        index as usize
    }
}

/// Resolves LPOP/RPOP arguments into an inclusive erase range.
///
/// * `[a, b]` erases `normalize(a)..=normalize(b)`.
/// * `[count]` erases the first or last `count` elements (clamped).
/// * `[]` erases a single element at the chosen end.
///
/// Right-side ranges end at `len` rather than `len - 1`; the saturating split
/// in [`Treap::erase_range`] makes the extra position harmless.
pub fn resolve_pop_range(args: &[i64], len: usize, from_left: bool) -> StorageResult<(usize, usize)> {
    match *args {
        [start, stop] => {
            let start = normalize_index(start, len);
            let stop = normalize_index(stop, len);
            if start > stop {
                return Err(StorageError::IndexOutOfRange);
            }
            Ok((start, stop))
        }
        [count] => {
            if count <= 0 {
                return Err(StorageError::IndexOutOfRange);
            }
            let last = normalize_index(count - 1, len);
            if from_left {
                Ok((0, last))
            } else {
                Ok((len.saturating_sub(last + 1), len))
            }
        }
        [] => {
            if from_left {
                Ok((0, 0))
            } else {
                Ok((len.saturating_sub(1), len))
            }
        }
        _ => Err(StorageError::WrongArgs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&n| Value::from(n)).collect()
    }

    fn treap_of(values: &[i64]) -> Treap {
        ints(values).into_iter().collect()
    }

    /// Checks cached sizes and heap order for every node.
    fn check_invariants(link: &Link) -> usize {
        match link {
            None => 0,
            Some(node) => {
                for child in [&node.left, &node.right].into_iter().flatten() {
                    assert!(child.priority <= node.priority, "heap order violated");
                }
                let total = check_invariants(&node.left) + 1 + check_invariants(&node.right);
                assert_eq!(node.size, total, "stale subtree size");
                total
            }
        }
    }

    fn check_counts(treap: &Treap) {
        let mut expected: HashMap<Value, usize> = HashMap::new();
        for value in treap.to_vec() {
            *expected.entry(value).or_insert(0) += 1;
        }
        assert_eq!(treap.counts, expected);
    }

    #[test]
    fn test_push_back_and_front() {
        let mut treap = Treap::new();
        treap.push_back(Value::from(1));
        treap.push_back(Value::from(2));
        treap.push_front(Value::from(0));

        assert_eq!(treap.to_vec(), ints(&[0, 1, 2]));
        assert_eq!(treap.len(), 3);
        check_invariants(&treap.root);
        check_counts(&treap);
    }

    #[test]
    fn test_get_in_push_order() {
        let treap = treap_of(&(0..500).collect::<Vec<_>>());
        for i in 0..500usize {
            assert_eq!(treap.get(i), Ok(&Value::from(i as i64)));
        }
        assert_eq!(treap.get(500), Err(StorageError::IndexOutOfRange));
        check_invariants(&treap.root);
    }

    #[test]
    fn test_set_replaces_and_recounts() {
        let mut treap = treap_of(&[1, 2, 3]);
        assert_eq!(treap.set(1, Value::from("two")), Ok(Value::from(2)));
        assert_eq!(treap.get(1), Ok(&Value::from("two")));
        assert!(!treap.contains(&Value::from(2)));
        assert!(treap.contains(&Value::from("two")));
        assert_eq!(treap.set(3, Value::from(9)), Err(StorageError::IndexOutOfRange));
        check_counts(&treap);
    }

    #[test]
    fn test_pop_front_back() {
        let mut treap = treap_of(&[1, 2, 3]);
        assert_eq!(treap.pop_front(), Some(Value::from(1)));
        assert_eq!(treap.pop_back(), Some(Value::from(3)));
        assert_eq!(treap.pop_back(), Some(Value::from(2)));
        assert_eq!(treap.pop_back(), None);
        assert_eq!(treap.pop_front(), None);
        assert!(treap.is_empty());
        assert!(treap.counts.is_empty());
    }

    #[test]
    fn test_push_back_if_absent() {
        let mut treap = Treap::new();
        assert!(treap.push_back_if_absent(Value::from(1)));
        assert!(!treap.push_back_if_absent(Value::from(1)));
        assert!(treap.push_back_if_absent(Value::from("1")));
        assert_eq!(treap.len(), 2);

        // Removing the only copy makes the value insertable again
        treap.pop_front();
        assert!(treap.push_back_if_absent(Value::from(1)));
        assert_eq!(treap.to_vec(), vec![Value::from("1"), Value::from(1)]);
        check_counts(&treap);
    }

    #[test]
    fn test_erase_range_middle() {
        let mut treap = treap_of(&[0, 1, 2, 3, 4, 5]);
        assert_eq!(treap.erase_range(2, 4), ints(&[2, 3, 4]));
        assert_eq!(treap.to_vec(), ints(&[0, 1, 5]));
        check_invariants(&treap.root);
        check_counts(&treap);
    }

    #[test]
    fn test_erase_range_saturates() {
        let mut treap = treap_of(&[0, 1, 2]);
        assert_eq!(treap.erase_range(2, 3), ints(&[2]));
        assert_eq!(treap.erase_range(0, 100), ints(&[0, 1]));
        assert!(treap.erase_range(0, 0).is_empty());
    }

    #[test]
    fn test_split_saturates() {
        let (left, right) = split(treap_of(&[1, 2, 3]).root, 10);
        assert_eq!(size(&left), 3);
        assert!(right.is_none());

        let (left, right) = split(treap_of(&[1, 2, 3]).root, 0);
        assert!(left.is_none());
        assert_eq!(size(&right), 3);
    }

    #[test]
    fn test_duplicate_counts_survive_erase() {
        let mut treap = treap_of(&[7, 7, 7, 8]);
        treap.erase_range(0, 1);
        assert!(treap.contains(&Value::from(7)));
        assert_eq!(treap.counts.get(&Value::from(7)), Some(&1));
        check_counts(&treap);
    }

    #[test]
    fn test_large_interleaved_pushes() {
        let mut treap = Treap::new();
        let mut expected = std::collections::VecDeque::new();
        for i in 0..2000 {
            if i % 3 == 0 {
                treap.push_front(Value::from(i));
                expected.push_front(Value::from(i));
            } else {
                treap.push_back(Value::from(i));
                expected.push_back(Value::from(i));
            }
        }
        assert_eq!(treap.to_vec(), expected.into_iter().collect::<Vec<_>>());
        check_invariants(&treap.root);
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(-1, 5), 4);
        assert_eq!(normalize_index(-6, 5), 4);
        assert_eq!(normalize_index(10, 5), 4);
        assert_eq!(normalize_index(-5, 5), 0);
        assert_eq!(normalize_index(2, 5), 2);
        assert_eq!(normalize_index(3, 0), 0);
    }

    #[test]
    fn test_resolve_pop_range() {
        assert_eq!(resolve_pop_range(&[], 3, true), Ok((0, 0)));
        assert_eq!(resolve_pop_range(&[], 3, false), Ok((2, 3)));
        assert_eq!(resolve_pop_range(&[2], 5, true), Ok((0, 1)));
        assert_eq!(resolve_pop_range(&[2], 5, false), Ok((3, 5)));
        assert_eq!(resolve_pop_range(&[10], 5, false), Ok((0, 5)));
        assert_eq!(resolve_pop_range(&[1, -1], 5, true), Ok((1, 4)));
        assert_eq!(
            resolve_pop_range(&[3, 1], 5, true),
            Err(StorageError::IndexOutOfRange)
        );
        assert_eq!(
            resolve_pop_range(&[0], 5, true),
            Err(StorageError::IndexOutOfRange)
        );
        assert_eq!(
            resolve_pop_range(&[1, 2, 3], 5, true),
            Err(StorageError::WrongArgs)
        );
    }
}
