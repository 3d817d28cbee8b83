use std::collections::HashMap;

use ahash::RandomState;
use generational_arena::{Arena, Index};

#[derive(Debug)]
pub(crate) struct Node<V> {
  pub(crate) key: String,
  pub(crate) value: V,
  pub(crate) cost: u64,
  next: Option<Index>,
  prev: Option<Index>,
}

/// A doubly linked recency list over an arena of nodes, with a key → index
/// map for O(1) lookup.
///
/// Head is the most recently written entry, tail the least. Entries are
/// moved to the head on write, not on read, so the eviction order is
/// least-recently-written. The list caches its total cost and entry count;
/// both always agree with the arena contents.
#[derive(Debug)]
pub(crate) struct LruList<V> {
  nodes: Arena<Node<V>>,
  lookup: HashMap<String, Index, RandomState>,
  head: Option<Index>,
  tail: Option<Index>,
  total_cost: u64,
  total_count: usize,
}

impl<V> LruList<V> {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      lookup: HashMap::default(),
      head: None,
      tail: None,
      total_cost: 0,
      total_count: 0,
    }
  }

  pub(crate) fn total_cost(&self) -> u64 {
    self.total_cost
  }

  pub(crate) fn total_count(&self) -> usize {
    self.total_count
  }

  pub(crate) fn contains(&self, key: &str) -> bool {
    self.lookup.contains_key(key)
  }

  pub(crate) fn get(&self, key: &str) -> Option<&Node<V>> {
    let index = *self.lookup.get(key)?;
    self.nodes.get(index)
  }

  /// Detaches a node from the chain without touching the arena or map.
  fn unlink(&mut self, index: Index) {
    let node = &self.nodes[index];
    let prev_idx = node.prev;
    let next_idx = node.next;

    if let Some(prev) = prev_idx {
      self.nodes[prev].next = next_idx;
    } else {
      self.head = next_idx;
    }

    if let Some(next) = next_idx {
      self.nodes[next].prev = prev_idx;
    } else {
      self.tail = prev_idx;
    }
  }

  /// Links an already-stored node in as the new head.
  fn link_front(&mut self, index: Index) {
    let old_head = self.head;
    self.nodes[index].next = old_head;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old) = old_head {
      self.nodes[old].prev = Some(index);
    }
    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  /// Inserts `key` at the head, or overwrites the existing node's value and
  /// cost and moves it to the head.
  pub(crate) fn push_front(&mut self, key: &str, value: V, cost: u64) {
    if let Some(&index) = self.lookup.get(key) {
      let node = &mut self.nodes[index];
      let old_cost = node.cost;
      node.value = value;
      node.cost = cost;
      self.total_cost = self.total_cost.saturating_sub(old_cost) + cost;
      self.move_to_front(index);
    } else {
      let node = Node {
        key: key.to_owned(),
        value,
        cost,
        next: None,
        prev: None,
      };
      let index = self.nodes.insert(node);
      self.lookup.insert(key.to_owned(), index);
      self.total_cost += cost;
      self.total_count += 1;
      self.link_front(index);
    }
  }

  /// Idempotent when the node is already the head.
  fn move_to_front(&mut self, index: Index) {
    if self.head != Some(index) {
      self.unlink(index);
      self.link_front(index);
    }
  }

  /// Removes the least-recently-written entry, returning its key, value,
  /// and cost. Returns `None` on an empty list.
  pub(crate) fn pop_back(&mut self) -> Option<(String, V, u64)> {
    let tail = self.tail?;
    let key = self.nodes[tail].key.clone();
    let (value, cost) = self.remove(&key)?;
    Some((key, value, cost))
  }

  pub(crate) fn remove(&mut self, key: &str) -> Option<(V, u64)> {
    let index = self.lookup.remove(key)?;
    self.unlink(index);
    let node = self.nodes.remove(index)?;
    self.total_cost = self.total_cost.saturating_sub(node.cost);
    self.total_count -= 1;
    Some((node.value, node.cost))
  }

  pub(crate) fn clear(&mut self) {
    self.nodes.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
    self.total_cost = 0;
    self.total_count = 0;
  }

  // Head-to-tail key order, for tests.
  #[cfg(test)]
  pub(crate) fn keys_as_vec(&self) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = self.head;
    while let Some(index) = current {
      keys.push(self.nodes[index].key.clone());
      current = self.nodes[index].next;
    }
    keys
  }
}
