//! Bidirectional node correspondence between a source and a destination tree.

use crate::tree::Tree;
use indextree::NodeId;

/// A one-to-one correspondence between source and destination nodes.
///
/// Both directions are `Vec<Option<NodeId>>` indexed by the arena id, giving
/// O(1) lookups without hashing; an insertion-ordered pair list backs
/// iteration, since ids cannot be enumerated back out of the index vectors.
///
/// Invariant: the two directions are mutual inverses at all times —
/// `src_to_dst[s] == Some(d)` iff `dst_to_src[d] == Some(s)`.
#[derive(Debug, Default)]
pub struct MappingStore {
    src_to_dst: Vec<Option<NodeId>>,
    dst_to_src: Vec<Option<NodeId>>,
    pairs: Vec<(NodeId, NodeId)>,
}

impl MappingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mapped pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pairs are mapped.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Map `src` to `dst`.
    ///
    /// Re-putting an existing identical pair is a no-op. If either endpoint
    /// is currently mapped elsewhere, the stale pair is unlinked first so
    /// the two directions stay mutual inverses.
    pub fn put(&mut self, src: NodeId, dst: NodeId) {
        if self.get_dst(src) == Some(dst) {
            return;
        }
        self.unlink_src(src);
        self.unlink_dst(dst);

        let src_idx = usize::from(src);
        let dst_idx = usize::from(dst);
        if src_idx >= self.src_to_dst.len() {
            self.src_to_dst.resize(src_idx + 1, None);
        }
        if dst_idx >= self.dst_to_src.len() {
            self.dst_to_src.resize(dst_idx + 1, None);
        }
        self.src_to_dst[src_idx] = Some(dst);
        self.dst_to_src[dst_idx] = Some(src);
        self.pairs.push((src, dst));
    }

    /// Map `src` to `dst` and, recursively, each child of `src` to the
    /// same-position child of `dst`.
    ///
    /// Callers guarantee the two subtrees are isomorphic (same shape at
    /// every level); this is only invoked on equal-subtree-hash pairs.
    pub fn put_recursively<R>(
        &mut self,
        src_tree: &Tree<R>,
        src: NodeId,
        dst_tree: &Tree<R>,
        dst: NodeId,
    ) {
        self.put(src, dst);
        let children: Vec<_> = src_tree
            .children(src)
            .zip(dst_tree.children(dst))
            .collect();
        for (src_child, dst_child) in children {
            self.put_recursively(src_tree, src_child, dst_tree, dst_child);
        }
    }

    /// Remove the pair `(src, dst)` if it is currently mapped.
    pub fn pop(&mut self, src: NodeId, dst: NodeId) {
        if self.has(src, dst) {
            self.src_to_dst[usize::from(src)] = None;
            self.dst_to_src[usize::from(dst)] = None;
            self.pairs.retain(|&pair| pair != (src, dst));
        }
    }

    /// Whether exactly the pair `(src, dst)` is mapped.
    pub fn has(&self, src: NodeId, dst: NodeId) -> bool {
        self.get_dst(src) == Some(dst)
    }

    /// Whether `src` is mapped to anything.
    pub fn contains_src(&self, src: NodeId) -> bool {
        self.get_dst(src).is_some()
    }

    /// Whether `dst` is mapped to anything.
    pub fn contains_dst(&self, dst: NodeId) -> bool {
        self.get_src(dst).is_some()
    }

    /// The destination partner of `src`, if mapped.
    pub fn get_dst(&self, src: NodeId) -> Option<NodeId> {
        self.src_to_dst.get(usize::from(src)).copied().flatten()
    }

    /// The source partner of `dst`, if mapped.
    pub fn get_src(&self, dst: NodeId) -> Option<NodeId> {
        self.dst_to_src.get(usize::from(dst)).copied().flatten()
    }

    /// All mapped pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.pairs.iter().copied()
    }

    /// Whether mapping `src` to `dst` would be legal: same kind, and
    /// neither endpoint already mapped.
    pub fn is_mapping_allowed<R>(
        &self,
        src_tree: &Tree<R>,
        src: NodeId,
        dst_tree: &Tree<R>,
        dst: NodeId,
    ) -> bool {
        src_tree.kind(src) == dst_tree.kind(dst)
            && !self.contains_src(src)
            && !self.contains_dst(dst)
    }

    fn unlink_src(&mut self, src: NodeId) {
        if let Some(dst) = self.get_dst(src) {
            self.src_to_dst[usize::from(src)] = None;
            self.dst_to_src[usize::from(dst)] = None;
            self.pairs.retain(|&pair| pair != (src, dst));
        }
    }

    fn unlink_dst(&mut self, dst: NodeId) {
        if let Some(src) = self.get_src(dst) {
            self.src_to_dst[usize::from(src)] = None;
            self.dst_to_src[usize::from(dst)] = None;
            self.pairs.retain(|&pair| pair != (src, dst));
        }
    }
}
