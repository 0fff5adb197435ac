//! Sorted associative array stored in one contiguous buffer.
//!
//! Every timed stream of a chart (notes, tempos, lyrics, phrases) lives in a `FlatMap`
//! keyed by tick. Events almost always arrive in ascending order, so the map is tuned for
//! appending at the back while still supporting binary-search lookup and ordered insertion.

use std::fmt::Debug;

/// Capacity used by the first allocation of an empty map.
pub const DEFAULT_CAPACITY: usize = 16;

/// Upper bound on the number of entries a map may hold.
pub const MAX_CAPACITY: usize = i32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlatMapNode<K, V> {
    pub key: K,
    pub value: V,
}

/// Ordered map backed by a `Vec` of nodes sorted ascending by key, without duplicates.
///
/// Iterators borrow the map, so structural mutation during iteration is rejected at
/// compile time. `version` still counts structural changes for callers that cache indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMap<K, V> {
    nodes: Vec<FlatMapNode<K, V>>,
    version: u32,
}

impl<K, V> Default for FlatMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FlatMap<K, V> {
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            version: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity <= MAX_CAPACITY, "capacity {capacity} exceeds maximum");
        Self {
            nodes: Vec::with_capacity(capacity),
            version: 0,
        }
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Number of structural changes applied since creation.
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Resizes the backing buffer to exactly `capacity` entries.
    ///
    /// Panics when `capacity` is smaller than the current entry count.
    pub fn set_capacity(&mut self, capacity: usize) {
        assert!(
            capacity >= self.nodes.len(),
            "capacity {capacity} is smaller than the entry count {}",
            self.nodes.len()
        );
        assert!(capacity <= MAX_CAPACITY, "capacity {capacity} exceeds maximum");
        let current = self.nodes.capacity();
        if capacity == current {
            return;
        }
        if capacity > current {
            self.nodes.reserve_exact(capacity - self.nodes.len());
        } else {
            // shrinking to zero releases the buffer
            self.nodes.shrink_to(capacity);
        }
        self.version = self.version.wrapping_add(1);
    }

    /// Removes every entry but keeps the allocated buffer.
    pub fn clear(&mut self) {
        if !self.nodes.is_empty() {
            self.nodes.clear();
            self.version = self.version.wrapping_add(1);
        }
    }

    fn grow_if_full(&mut self) {
        let capacity = self.nodes.capacity();
        if self.nodes.len() < capacity {
            return;
        }
        assert!(capacity < MAX_CAPACITY, "flat map is full");
        let new_capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            (capacity * 2).min(MAX_CAPACITY)
        };
        self.nodes.reserve_exact(new_capacity - self.nodes.len());
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlatMapNode<K, V>> {
        self.nodes.iter()
    }

    /// Iterates keys alongside mutable values; keys stay read-only to preserve ordering.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.nodes.iter_mut().map(|node| (&node.key, &mut node.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.nodes.iter().map(|node| &node.key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.nodes.iter().map(|node| &node.value)
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn as_slice(&self) -> &[FlatMapNode<K, V>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&FlatMapNode<K, V>> {
        self.nodes.get(index)
    }

    pub fn value_at_mut(&mut self, index: usize) -> Option<&mut V> {
        self.nodes.get_mut(index).map(|node| &mut node.value)
    }

    pub fn first(&self) -> Option<&FlatMapNode<K, V>> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&FlatMapNode<K, V>> {
        self.nodes.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut V> {
        self.nodes.last_mut().map(|node| &mut node.value)
    }

    pub fn last_key(&self) -> Option<&K> {
        self.nodes.last().map(|node| &node.key)
    }

    /// Removes the entry at `index`, shifting later entries left.
    ///
    /// Panics when `index` is out of range.
    pub fn remove_at(&mut self, index: usize) -> FlatMapNode<K, V> {
        assert!(
            index < self.nodes.len(),
            "index {index} out of range for flat map of length {}",
            self.nodes.len()
        );
        self.bump_version();
        self.nodes.remove(index)
    }

    pub fn pop_back(&mut self) -> Option<FlatMapNode<K, V>> {
        let node = self.nodes.pop()?;
        self.bump_version();
        Some(node)
    }
}

impl<K: Ord + Copy + Debug, V> FlatMap<K, V> {
    /// Appends without searching. The caller guarantees `key` sorts strictly after the last
    /// key: keys are unique, so an equal key must go through `get_or_insert_back` or
    /// `entry_mut` instead. Checked in debug builds only.
    pub fn push_back(&mut self, key: K, value: V) -> &mut V {
        debug_assert!(
            self.last_key().map_or(true, |last| *last < key),
            "push_back of {key:?} after {:?}",
            self.last_key()
        );
        self.grow_if_full();
        self.nodes.push(FlatMapNode { key, value });
        self.bump_version();
        let index = self.nodes.len() - 1;
        &mut self.nodes[index].value
    }

    /// Binary search over the whole map.
    pub fn binary_search(&self, key: &K) -> Result<usize, usize> {
        self.nodes.binary_search_by(|node| node.key.cmp(key))
    }

    /// Binary search over `[search_start, len)`, indices relative to the whole map.
    fn binary_search_from(&self, search_start: usize, key: &K) -> Result<usize, usize> {
        let start = search_start.min(self.nodes.len());
        match self.nodes[start..].binary_search_by(|node| node.key.cmp(key)) {
            Ok(index) => Ok(start + index),
            Err(index) => Err(start + index),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let index = self.binary_search(key).ok()?;
        Some(&self.nodes[index].value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.binary_search(key).ok()?;
        Some(&mut self.nodes[index].value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.binary_search(key).is_ok()
    }

    /// True when the map is not empty and its last key equals `key`.
    pub fn validate_last_key(&self, key: &K) -> bool {
        self.last_key() == Some(key)
    }

    /// Scans from the back while keys are greater than `key` and returns the first entry
    /// whose key is less than or equal to it.
    pub fn traverse_backward_until(&mut self, key: &K) -> Option<&mut V> {
        let index = self.nodes.iter().rposition(|node| node.key <= *key)?;
        Some(&mut self.nodes[index].value)
    }

    /// Inserts `value` at its sorted position, replacing any value stored under `key`.
    pub fn insert(&mut self, key: K, value: V) -> usize {
        if self.last_key().map_or(true, |last| *last < key) {
            self.push_back(key, value);
            return self.nodes.len() - 1;
        }
        match self.binary_search(&key) {
            Ok(index) => {
                self.nodes[index].value = value;
                index
            }
            Err(index) => {
                self.grow_if_full();
                self.nodes.insert(index, FlatMapNode { key, value });
                self.bump_version();
                index
            }
        }
    }
}

impl<K: Ord + Copy + Debug, V: Default> FlatMap<K, V> {
    /// Fast path for monotonic ingestion.
    ///
    /// Appends a default value when the map is empty or `key` is greater than the last key,
    /// otherwise hands back the last value untouched.
    pub fn get_or_insert_back(&mut self, key: K) -> &mut V {
        let append = self.last_key().map_or(true, |last| *last < key);
        if append {
            return self.push_back(key, V::default());
        }
        let index = self.nodes.len() - 1;
        &mut self.nodes[index].value
    }

    /// Finds `key` in `[search_start, len)` or inserts a default value at its sorted
    /// position, returning the entry index either way.
    pub fn find_or_insert(&mut self, search_start: usize, key: K) -> usize {
        match self.binary_search_from(search_start, &key) {
            Ok(index) => index,
            Err(index) => {
                self.grow_if_full();
                self.nodes.insert(
                    index,
                    FlatMapNode {
                        key,
                        value: V::default(),
                    },
                );
                self.bump_version();
                index
            }
        }
    }

    /// `find_or_insert` over the whole map, returning the value.
    pub fn entry_mut(&mut self, key: K) -> &mut V {
        let index = self.find_or_insert(0, key);
        &mut self.nodes[index].value
    }
}

impl<'a, K, V> IntoIterator for &'a FlatMap<K, V> {
    type Item = &'a FlatMapNode<K, V>;
    type IntoIter = std::slice::Iter<'a, FlatMapNode<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl<K, V> IntoIterator for FlatMap<K, V> {
    type Item = FlatMapNode<K, V>;
    type IntoIter = std::vec::IntoIter<FlatMapNode<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(keys: &[u64]) -> FlatMap<u64, u64> {
        let mut map = FlatMap::new();
        for &key in keys {
            map.push_back(key, key * 10);
        }
        map
    }

    #[test]
    fn test_push_back_iterates_in_order() {
        let keys: Vec<u64> = (0..100).map(|i| i * 3 + 1).collect();
        let map = map_of(&keys);
        assert_eq!(map.len(), keys.len());
        let collected: Vec<u64> = map.keys().copied().collect();
        assert_eq!(collected, keys);
        for node in &map {
            assert_eq!(node.value, node.key * 10);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "push_back of 10")]
    fn test_push_back_rejects_equal_key() {
        let mut map = FlatMap::new();
        map.push_back(10u64, 'a');
        map.push_back(10u64, 'b');
    }

    #[test]
    fn test_grows_from_default_capacity() {
        let mut map: FlatMap<u32, u8> = FlatMap::new();
        assert_eq!(map.capacity(), 0);
        map.push_back(1, 1);
        assert_eq!(map.capacity(), DEFAULT_CAPACITY);
        for key in 2..=17 {
            map.push_back(key, 0);
        }
        assert_eq!(map.capacity(), DEFAULT_CAPACITY * 2);
    }

    #[test]
    fn test_get_or_insert_back() {
        let mut map: FlatMap<u64, u32> = FlatMap::new();
        *map.get_or_insert_back(10) += 1;
        *map.get_or_insert_back(10) += 1;
        *map.get_or_insert_back(20) += 5;
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&10), Some(&2));
        // lower key hands back the last entry
        *map.get_or_insert_back(15) += 1;
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&20), Some(&6));
        assert!(!map.contains_key(&15));
    }

    #[test]
    fn test_find_or_insert_keeps_order() {
        let mut map: FlatMap<u64, u32> = FlatMap::new();
        for key in [50, 10, 30, 20, 40, 10, 30] {
            let index = map.find_or_insert(0, key);
            if let Some(value) = map.value_at_mut(index) {
                *value += 1;
            }
        }
        let keys: Vec<u64> = map.keys().copied().collect();
        assert_eq!(keys, vec![10, 20, 30, 40, 50]);
        assert_eq!(map.get(&10), Some(&2));
        assert_eq!(map.get(&30), Some(&2));
        assert_eq!(map.get(&50), Some(&1));
    }

    #[test]
    fn test_find_or_insert_with_search_start() {
        let mut map = map_of(&[10, 20, 30]);
        let index = map.find_or_insert(1, 25);
        assert_eq!(index, 2);
        assert_eq!(map.node(index).map(|n| n.key), Some(25));
        let index = map.find_or_insert(2, 30);
        assert_eq!(index, 3);
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_insert_last_write_wins() {
        let mut map: FlatMap<u64, &str> = FlatMap::new();
        map.insert(20, "b");
        map.insert(10, "a");
        map.insert(20, "c");
        assert_eq!(map.get(&20), Some(&"c"));
        assert_eq!(map.get(&10), Some(&"a"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_traverse_backward_until() {
        let mut map = map_of(&[10, 20, 30]);
        assert_eq!(map.traverse_backward_until(&25).copied(), Some(200));
        assert_eq!(map.traverse_backward_until(&30).copied(), Some(300));
        assert_eq!(map.traverse_backward_until(&1000).copied(), Some(300));
        assert!(map.traverse_backward_until(&5).is_none());

        let mut empty: FlatMap<u64, u64> = FlatMap::new();
        assert!(empty.traverse_backward_until(&5).is_none());
    }

    #[test]
    fn test_validate_last_key() {
        let map = map_of(&[10, 20]);
        assert!(map.validate_last_key(&20));
        assert!(!map.validate_last_key(&10));
        assert!(!FlatMap::<u64, u64>::new().validate_last_key(&0));
    }

    #[test]
    fn test_remove_and_pop() {
        let mut map = map_of(&[10, 20, 30, 40]);
        let removed = map.remove_at(1);
        assert_eq!(removed.key, 20);
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![10, 30, 40]);
        assert_eq!(map.pop_back().map(|n| n.key), Some(40));
        assert_eq!(map.len(), 2);
        map.clear();
        assert!(map.pop_back().is_none());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_remove_out_of_range() {
        let mut map = map_of(&[10]);
        map.remove_at(1);
    }

    #[test]
    fn test_set_capacity_same_is_noop() {
        let mut map = map_of(&[1, 2, 3]);
        let capacity = map.capacity();
        let version = map.version();
        map.set_capacity(capacity);
        assert_eq!(map.version(), version);
        assert_eq!(map.capacity(), capacity);

        map.set_capacity(64);
        assert_eq!(map.capacity(), 64);
        assert_ne!(map.version(), version);
    }

    #[test]
    fn test_set_capacity_zero_releases() {
        let mut map = map_of(&[1, 2, 3]);
        map.clear();
        map.set_capacity(0);
        assert_eq!(map.capacity(), 0);
    }

    #[test]
    #[should_panic(expected = "smaller than the entry count")]
    fn test_set_capacity_below_count() {
        let mut map = map_of(&[1, 2, 3]);
        map.set_capacity(2);
    }

    #[test]
    fn test_version_tracks_structural_changes() {
        let mut map: FlatMap<u64, u64> = FlatMap::new();
        let v0 = map.version();
        map.push_back(1, 1);
        let v1 = map.version();
        assert_ne!(v0, v1);
        // value update is not structural
        *map.get_mut(&1).unwrap() = 5;
        assert_eq!(map.version(), v1);
        // appending only on a new key
        map.get_or_insert_back(1);
        assert_eq!(map.version(), v1);
        map.get_or_insert_back(2);
        assert_ne!(map.version(), v1);
    }

    #[test]
    fn test_non_copy_values() {
        let mut map: FlatMap<u64, Vec<String>> = FlatMap::new();
        map.get_or_insert_back(5).push("intro".to_string());
        map.get_or_insert_back(5).push("verse".to_string());
        map.entry_mut(1).push("count in".to_string());
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&5).map(Vec::len), Some(2));
        assert_eq!(map.first().map(|n| n.key), Some(1));
    }
}
