// src/socket/patterns/trie.rs

use parking_lot::RwLock;
use std::collections::HashMap;

/// A node in the subscription trie.
#[derive(Default)]
struct TrieNode {
  children: HashMap<u8, TrieNode>,
  /// Count of subscriptions ending exactly at this node.
  count: usize,
}

impl TrieNode {
  #[cfg(test)]
  fn is_empty(&self) -> bool {
    self.count == 0 && self.children.is_empty()
  }

  /// Removes one subscription for `topic` below this node, pruning the branch that
  /// becomes empty. Returns `None` if the topic was not subscribed, otherwise the
  /// remaining count.
  fn remove(&mut self, topic: &[u8]) -> Option<usize> {
    // Depth of the deepest node on the path that outlives the removal.
    let mut keep_depth = 0;
    let mut node = &*self;
    for (depth, byte) in topic.iter().enumerate() {
      if node.count > 0 || node.children.len() > 1 {
        keep_depth = depth;
      }
      node = node.children.get(byte)?;
    }
    if node.count == 0 {
      return None;
    }
    let remaining = node.count - 1;
    let prune = remaining == 0 && node.children.is_empty() && !topic.is_empty();

    let mut node = self;
    if prune {
      for byte in &topic[..keep_depth] {
        node = node.children.get_mut(byte)?;
      }
      node.children.remove(&topic[keep_depth]);
    } else {
      for byte in topic {
        node = node.children.get_mut(byte)?;
      }
      node.count = remaining;
    }
    Some(remaining)
  }
}

// Topics can be arbitrarily long; neither dropping nor printing may recurse per byte.
impl Drop for TrieNode {
  fn drop(&mut self) {
    let mut pending: Vec<TrieNode> = self.children.drain().map(|(_, child)| child).collect();
    while let Some(mut node) = pending.pop() {
      pending.extend(node.children.drain().map(|(_, child)| child));
    }
  }
}

impl std::fmt::Debug for TrieNode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TrieNode")
      .field("count", &self.count)
      .field("children", &self.children.len())
      .finish()
  }
}

/// Manages topic subscriptions using a prefix trie.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTrie {
  root: RwLock<TrieNode>,
}

impl SubscriptionTrie {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a subscription prefix. Subscribing twice needs two unsubscribes.
  pub fn subscribe(&self, topic: &[u8]) {
    let mut root = self.root.write();
    let mut node = &mut *root;
    for &byte in topic {
      node = node.children.entry(byte).or_default();
    }
    node.count += 1;
    tracing::debug!(topic = ?String::from_utf8_lossy(topic), count = node.count, "Subscribed");
  }

  /// Removes a subscription prefix. Returns false if it was not subscribed.
  pub fn unsubscribe(&self, topic: &[u8]) -> bool {
    match self.root.write().remove(topic) {
      Some(remaining) => {
        tracing::debug!(topic = ?String::from_utf8_lossy(topic), remaining, "Unsubscribed");
        true
      }
      None => {
        tracing::debug!(topic = ?String::from_utf8_lossy(topic), "Unsubscribe failed: topic not subscribed");
        false
      }
    }
  }

  /// Checks if a message body starts with *any* active subscription prefix.
  pub fn matches(&self, body: &[u8]) -> bool {
    let root = self.root.read();
    let mut node = &*root;
    if node.count > 0 {
      return true; // empty subscription matches everything
    }
    for byte in body {
      match node.children.get(byte) {
        Some(next) => {
          node = next;
          if node.count > 0 {
            return true;
          }
        }
        None => return false,
      }
    }
    false
  }
}
