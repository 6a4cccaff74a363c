//! Height-keyed priority queue used by the top-down matcher.

use crate::tree::Tree;
use indextree::NodeId;
use core::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry: height first, then `(kind, label)` lexicographically
/// ascending, then arena id — a total order, so pop sequences are
/// deterministic across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    height: usize,
    kind: String,
    label: Option<String>,
    id: NodeId,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum: tallest node first, and among equal
        // heights the lexicographically smallest (kind, label) first.
        self.height
            .cmp(&other.height)
            .then_with(|| (&other.kind, &other.label).cmp(&(&self.kind, &self.label)))
            .then_with(|| usize::from(other.id).cmp(&usize::from(self.id)))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A max-heap of nodes keyed by subtree height.
///
/// Nodes below `min_height` are silently dropped on push, which is how the
/// top-down matcher leaves small subtrees for the bottom-up phase.
#[derive(Debug, Default)]
pub struct NodePriorityQueue {
    min_height: usize,
    heap: BinaryHeap<Entry>,
}

impl NodePriorityQueue {
    /// Create an empty queue with the default `min_height` of 1.
    pub fn new() -> Self {
        Self::with_min_height(1)
    }

    /// Create an empty queue that drops nodes shorter than `min_height`.
    pub fn with_min_height(min_height: usize) -> Self {
        Self {
            min_height,
            heap: BinaryHeap::new(),
        }
    }

    /// Whether the queue holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove all queued nodes.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// The height of the current maximum, if any.
    pub fn max_height(&self) -> Option<usize> {
        self.heap.peek().map(|entry| entry.height)
    }

    /// Queue a node, unless its height is below `min_height`.
    pub fn push<R>(&mut self, tree: &Tree<R>, node: NodeId) {
        let height = tree.height(node);
        if height < self.min_height {
            return;
        }
        self.heap.push(Entry {
            height,
            kind: tree.kind(node).to_string(),
            label: tree.label(node).map(str::to_owned),
            id: node,
        });
    }

    /// Queue every child of `node`.
    pub fn push_children<R>(&mut self, tree: &Tree<R>, node: NodeId) {
        let children: Vec<_> = tree.children(node).collect();
        for child in children {
            self.push(tree, child);
        }
    }

    /// Pop every node currently at the maximum height.
    pub fn pop_equal_priority(&mut self) -> Vec<NodeId> {
        let Some(height) = self.max_height() else {
            return Vec::new();
        };
        let mut batch = Vec::new();
        while self.max_height() == Some(height) {
            if let Some(entry) = self.heap.pop() {
                batch.push(entry.id);
            }
        }
        batch
    }

    /// Walk the taller queue down until both queues expose the same maximum
    /// height: the queue with the larger top pops its equal-priority batch
    /// and pushes those nodes' children back onto itself.
    ///
    /// Returns `false` — clearing both queues — as soon as either empties.
    pub fn synchronize_and_push_children<R>(
        &mut self,
        tree: &Tree<R>,
        other: &mut NodePriorityQueue,
        other_tree: &Tree<R>,
    ) -> bool {
        while !(self.is_empty() || other.is_empty()) && self.max_height() != other.max_height() {
            if self.max_height() > other.max_height() {
                for node in self.pop_equal_priority() {
                    self.push_children(tree, node);
                }
            } else {
                for node in other.pop_equal_priority() {
                    other.push_children(other_tree, node);
                }
            }
        }

        if self.is_empty() || other.is_empty() {
            self.clear();
            other.clear();
            return false;
        }
        true
    }
}
