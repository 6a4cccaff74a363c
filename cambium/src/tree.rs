//! Tree representation for diffing.
//!
//! Uses `indextree` as the arena backend: node identity is the arena
//! [`NodeId`], parent links are the arena's own (non-owning) edges, and the
//! per-node statistics the matchers rely on (size, height, SHA-256 subtree
//! hashes) are cached lazily and invalidated along the ancestor chain on
//! every structural mutation.

use core::cell::Cell;
use core::fmt;
use indextree::{Arena, NodeId};
use sha2::{Digest as _, Sha256};

/// A 256-bit structural hash of a node or subtree.
///
/// Two nodes with equal subtree hashes are treated as isomorphic; at 256
/// bits the collision probability on realistic syntax trees is negligible,
/// so no shape check backs the comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeHash(pub [u8; 32]);

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({self})")
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Cached per-node statistics, recomputed lazily after invalidation.
#[derive(Debug, Clone, Copy)]
struct Stats {
    /// Total number of nodes in this subtree, including the node itself.
    size: usize,
    /// Edges to the furthest leaf; 0 for leaves.
    height: usize,
    /// Digest of `(is_leaf, kind, label)` — the node in isolation.
    hash: NodeHash,
    /// [`Stats::hash`] extended with the children's subtree hashes, in order.
    subtree_hash: NodeHash,
    /// Like [`Stats::subtree_hash`] but ignoring labels everywhere.
    subtree_kind_hash: NodeHash,
}

/// Data stored in each tree node.
///
/// `R` is the caller's original node handle (a parser AST node, an index
/// into some other structure, ...). The diff core never interprets it; it
/// is carried so that consumers of an edit script can recover the node the
/// action refers to.
pub struct NodeData<R> {
    kind: String,
    label: Option<String>,
    orig: Option<R>,
    cache: Cell<Option<Stats>>,
}

impl<R: fmt::Debug> fmt::Debug for NodeData<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeData")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("orig", &self.orig)
            .finish()
    }
}

impl<R: Clone> Clone for NodeData<R> {
    fn clone(&self) -> Self {
        // The cache is intentionally not carried over: a clone is about to
        // live in a different structural context.
        Self {
            kind: self.kind.clone(),
            label: self.label.clone(),
            orig: self.orig.clone(),
            cache: Cell::new(None),
        }
    }
}

impl<R> NodeData<R> {
    /// Create a new unlabeled node of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: None,
            orig: None,
            cache: Cell::new(None),
        }
    }

    /// Create a new labeled node (typically a leaf carrying its value).
    pub fn leaf(kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: Some(label.into()),
            orig: None,
            cache: Cell::new(None),
        }
    }

    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach the caller's original node handle.
    pub fn with_orig(mut self, orig: R) -> Self {
        self.orig = Some(orig);
        self
    }

    /// The node's kind (grammatical category in a syntax-tree setting).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The node's label (its value), if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The caller's original node handle, if any.
    pub fn orig(&self) -> Option<&R> {
        self.orig.as_ref()
    }
}

/// An ordered labeled tree with cached subtree statistics.
///
/// Wraps an [`indextree::Arena`] with a designated root. All structural
/// mutations go through methods on this type so that cached statistics are
/// invalidated for the mutated node and its ancestor chain.
pub struct Tree<R> {
    arena: Arena<NodeData<R>>,
    root: NodeId,
}

impl<R> fmt::Debug for Tree<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("node_count", &self.arena.count())
            .finish()
    }
}

impl<R> Tree<R> {
    /// Create a new tree with a single root node.
    pub fn new(root_data: NodeData<R>) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(root_data);
        Self { arena, root }
    }

    /// The root node ID.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever allocated in the backing arena.
    pub fn node_count(&self) -> usize {
        self.arena.count()
    }

    /// Allocate a new node and append it as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, data: NodeData<R>) -> NodeId {
        let child = self.arena.new_node(data);
        parent.append(child, &mut self.arena);
        self.invalidate(child);
        child
    }

    /// Allocate a new node with no parent.
    pub fn new_orphan(&mut self, data: NodeData<R>) -> NodeId {
        self.arena.new_node(data)
    }

    /// Re-attach an existing node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let old_parent = self.parent(child);
        parent.append(child, &mut self.arena);
        self.invalidate(child);
        if let Some(old_parent) = old_parent {
            self.invalidate(old_parent);
        }
    }

    /// Re-attach an existing node as the child of `parent` at `index`.
    ///
    /// Positions past the current child count append at the end.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        let old_parent = self.parent(child);
        child.detach(&mut self.arena);
        match parent.children(&self.arena).nth(index) {
            Some(at) => at.insert_before(child, &mut self.arena),
            None => parent.append(child, &mut self.arena),
        }
        self.invalidate(child);
        if let Some(old_parent) = old_parent {
            self.invalidate(old_parent);
        }
    }

    /// Detach `child` from `parent`, leaving `child`'s own subtree intact.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert_eq!(self.parent(child), Some(parent));
        child.detach(&mut self.arena);
        self.invalidate(parent);
        self.invalidate(child);
    }

    /// Re-parent `child` under `parent`, or detach it entirely with `None`.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) {
        match parent {
            Some(parent) => self.append_child(parent, child),
            None => {
                let old_parent = self.parent(child);
                child.detach(&mut self.arena);
                self.invalidate(child);
                if let Some(old_parent) = old_parent {
                    self.invalidate(old_parent);
                }
            }
        }
    }

    /// Replace the node's label, invalidating the hashes that cover it.
    pub fn set_label(&mut self, id: NodeId, label: Option<String>) {
        self.arena
            .get_mut(id)
            .expect("invalid node id")
            .get_mut()
            .label = label;
        self.invalidate(id);
    }

    /// Get the data for a node.
    pub fn get(&self, id: NodeId) -> &NodeData<R> {
        self.arena.get(id).expect("invalid node id").get()
    }

    /// The node's kind.
    pub fn kind(&self, id: NodeId) -> &str {
        self.get(id).kind()
    }

    /// The node's label, if any.
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.get(id).label()
    }

    /// The caller's original node handle, if any.
    pub fn orig(&self, id: NodeId) -> Option<&R> {
        self.get(id).orig()
    }

    /// Get the parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|n| n.parent())
    }

    /// Get the children of a node, in order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Get the number of children of a node.
    pub fn child_count(&self, id: NodeId) -> usize {
        id.children(&self.arena).count()
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        id.children(&self.arena).next().is_none()
    }

    /// The position of a node among its siblings, or `None` for a root.
    pub fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        parent.children(&self.arena).position(|c| c == id)
    }

    /// Total number of nodes in the subtree rooted at `id`.
    pub fn size(&self, id: NodeId) -> usize {
        self.stats(id).size
    }

    /// Edges from `id` to its furthest leaf; 0 for leaves.
    pub fn height(&self, id: NodeId) -> usize {
        self.stats(id).height
    }

    /// Digest of the node in isolation: `(is_leaf, kind, label)`.
    pub fn hash(&self, id: NodeId) -> NodeHash {
        self.stats(id).hash
    }

    /// Digest of the whole subtree. Equal hashes mean isomorphic subtrees.
    pub fn subtree_hash(&self, id: NodeId) -> NodeHash {
        self.stats(id).subtree_hash
    }

    /// Like [`Tree::subtree_hash`] but ignoring labels everywhere.
    pub fn subtree_kind_hash(&self, id: NodeId) -> NodeHash {
        self.stats(id).subtree_kind_hash
    }

    /// Iterate the subtree of `id` in pre-order (node first, left-to-right).
    pub fn pre_order(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena)
    }

    /// Iterate the subtree of `id` in pre-order, right-to-left.
    pub fn pre_order_rtl(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        PreOrderRtl {
            arena: &self.arena,
            stack: vec![id],
        }
    }

    /// Iterate the subtree of `id` in post-order (children before parents).
    pub fn post_order(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        PostOrder {
            arena: &self.arena,
            stack: vec![(id, false)],
        }
    }

    /// Iterate the subtree of `id` in breadth-first order.
    pub fn bfs(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        Bfs {
            arena: &self.arena,
            queue: [id].into(),
        }
    }

    /// Copy the whole tree: identical shape, kinds, labels and original
    /// handles, fresh node identities, no cached statistics.
    pub fn deep_copy(&self) -> Tree<R>
    where
        R: Clone,
    {
        let mut arena = Arena::new();
        let root = self.copy_into(&mut arena, self.root);
        Tree { arena, root }
    }

    fn copy_into(&self, arena: &mut Arena<NodeData<R>>, id: NodeId) -> NodeId
    where
        R: Clone,
    {
        let copy = arena.new_node(self.get(id).clone());
        for child in id.children(&self.arena) {
            let child_copy = self.copy_into(arena, child);
            copy.append(child_copy, arena);
        }
        copy
    }

    /// Clear cached statistics for `id` and every ancestor.
    fn invalidate(&self, id: NodeId) {
        for node in id.ancestors(&self.arena) {
            self.get(node).cache.set(None);
        }
    }

    fn stats(&self, id: NodeId) -> Stats {
        if let Some(stats) = self.get(id).cache.get() {
            return stats;
        }
        // Fill the caches bottom-up with an explicit stack; recursion depth
        // would otherwise track tree height.
        let mut stack = vec![(id, false)];
        while let Some((node, children_done)) = stack.pop() {
            if self.get(node).cache.get().is_some() {
                continue;
            }
            if children_done {
                let stats = self.compute_stats(node);
                self.get(node).cache.set(Some(stats));
            } else {
                stack.push((node, true));
                for child in node.children(&self.arena) {
                    if self.get(child).cache.get().is_none() {
                        stack.push((child, false));
                    }
                }
            }
        }
        self.get(id).cache.get().expect("statistics computed above")
    }

    /// One SHA-256 walk produces every statistic; children must be cached.
    fn compute_stats(&self, id: NodeId) -> Stats {
        let data = self.get(id);
        let is_internal = !self.is_leaf(id);

        let mut hasher = Sha256::new();
        hasher.update([u8::from(is_internal)]);
        hasher.update(data.kind.as_bytes());
        // Separator so (kind, label) boundaries cannot alias.
        hasher.update([0xff]);
        hasher.update(data.label.as_deref().unwrap_or("").as_bytes());
        let hash = NodeHash(hasher.clone().finalize().into());

        let mut kind_hasher = Sha256::new();
        kind_hasher.update([u8::from(is_internal)]);
        kind_hasher.update(data.kind.as_bytes());

        let mut size = 1;
        let mut height = 0;
        for child in id.children(&self.arena) {
            let child_stats = self
                .get(child)
                .cache
                .get()
                .expect("child statistics are computed before their parent");
            size += child_stats.size;
            height = height.max(child_stats.height + 1);
            hasher.update(child_stats.subtree_hash.0);
            kind_hasher.update(child_stats.subtree_kind_hash.0);
        }

        Stats {
            size,
            height,
            hash,
            subtree_hash: NodeHash(hasher.finalize().into()),
            subtree_kind_hash: NodeHash(kind_hasher.finalize().into()),
        }
    }
}

impl<R> fmt::Display for Tree<R> {
    /// Indented dump: one node per line with kind, optional label, and a
    /// truncated subtree hash.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            write!(f, "{:indent$}{}", "", self.kind(id), indent = depth * 2)?;
            if let Some(label) = self.label(id) {
                write!(f, ": {label}")?;
            }
            writeln!(f, " #{:.12}", self.subtree_hash(id))?;
            let children: Vec<_> = self.children(id).collect();
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        Ok(())
    }
}

/// Right-to-left pre-order iterator.
struct PreOrderRtl<'a, R> {
    arena: &'a Arena<NodeData<R>>,
    stack: Vec<NodeId>,
}

impl<R> Iterator for PreOrderRtl<'_, R> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        // Children pushed left-to-right pop rightmost-first.
        self.stack.extend(id.children(self.arena));
        Some(id)
    }
}

/// Post-order iterator over tree nodes.
struct PostOrder<'a, R> {
    arena: &'a Arena<NodeData<R>>,
    stack: Vec<(NodeId, bool)>, // (node_id, children_visited)
}

impl<R> Iterator for PostOrder<'_, R> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, children_visited)) = self.stack.pop() {
            if children_visited {
                return Some(id);
            }
            self.stack.push((id, true));
            let children: Vec<_> = id.children(self.arena).collect();
            for child in children.into_iter().rev() {
                self.stack.push((child, false));
            }
        }
        None
    }
}

/// Breadth-first iterator over tree nodes.
struct Bfs<'a, R> {
    arena: &'a Arena<NodeData<R>>,
    queue: std::collections::VecDeque<NodeId>,
}

impl<R> Iterator for Bfs<'_, R> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        self.queue.extend(id.children(self.arena));
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree<()>, NodeId, NodeId, NodeId, NodeId) {
        // root
        //   mid
        //     leaf: a
        //     leaf: b
        //   leaf: c
        let mut tree: Tree<()> = Tree::new(NodeData::new("root"));
        let mid = tree.add_child(tree.root(), NodeData::new("mid"));
        let a = tree.add_child(mid, NodeData::leaf("leaf", "a"));
        let b = tree.add_child(mid, NodeData::leaf("leaf", "b"));
        let c = tree.add_child(tree.root(), NodeData::leaf("leaf", "c"));
        (tree, mid, a, b, c)
    }

    #[test]
    fn basics() {
        let (tree, mid, a, b, c) = sample();
        assert_eq!(tree.child_count(tree.root()), 2);
        assert_eq!(tree.position_in_parent(a), Some(0));
        assert_eq!(tree.position_in_parent(b), Some(1));
        assert_eq!(tree.position_in_parent(tree.root()), None);
        assert_eq!(tree.parent(a), Some(mid));
        assert_eq!(tree.size(tree.root()), 5);
        assert_eq!(tree.height(tree.root()), 2);
        assert_eq!(tree.height(c), 0);
        assert!(tree.is_leaf(c));
        assert!(!tree.is_leaf(mid));
    }

    #[test]
    fn traversal_orders() {
        let (tree, mid, a, b, c) = sample();
        let root = tree.root();

        let pre: Vec<_> = tree.pre_order(root).collect();
        assert_eq!(pre, vec![root, mid, a, b, c]);

        let pre_rtl: Vec<_> = tree.pre_order_rtl(root).collect();
        assert_eq!(pre_rtl, vec![root, c, mid, b, a]);

        let post: Vec<_> = tree.post_order(root).collect();
        assert_eq!(post, vec![a, b, mid, c, root]);

        let bfs: Vec<_> = tree.bfs(root).collect();
        assert_eq!(bfs, vec![root, mid, c, a, b]);
    }

    #[test]
    fn isomorphic_subtrees_hash_equal() {
        let (tree_a, ..) = sample();
        let (tree_b, ..) = sample();
        assert_eq!(
            tree_a.subtree_hash(tree_a.root()),
            tree_b.subtree_hash(tree_b.root())
        );
        assert_eq!(tree_a.hash(tree_a.root()), tree_b.hash(tree_b.root()));
    }

    #[test]
    fn label_affects_subtree_hash_but_not_kind_hash() {
        let (tree_a, ..) = sample();
        let (mut tree_b, _, a, ..) = sample();
        tree_b.set_label(a, Some("changed".to_string()));
        assert_ne!(
            tree_a.subtree_hash(tree_a.root()),
            tree_b.subtree_hash(tree_b.root())
        );
        assert_eq!(
            tree_a.subtree_kind_hash(tree_a.root()),
            tree_b.subtree_kind_hash(tree_b.root())
        );
    }

    #[test]
    fn mutation_invalidates_ancestor_chain() {
        let (mut tree, mid, _a, b, c) = sample();
        let root = tree.root();
        let before_root = tree.subtree_hash(root);
        let before_mid = tree.subtree_hash(mid);

        // Move b from mid to the end of root's children.
        tree.set_parent(b, Some(root));

        assert_eq!(tree.size(root), 5);
        assert_eq!(tree.size(mid), 2);
        assert_eq!(tree.height(root), 2);
        assert_ne!(tree.subtree_hash(root), before_root);
        assert_ne!(tree.subtree_hash(mid), before_mid);

        let order: Vec<_> = tree.children(root).collect();
        assert_eq!(order, vec![mid, c, b]);
    }

    #[test]
    fn insert_child_positions() {
        let mut tree: Tree<()> = Tree::new(NodeData::new("root"));
        let root = tree.root();
        let a = tree.add_child(root, NodeData::leaf("leaf", "a"));
        let b = tree.add_child(root, NodeData::leaf("leaf", "b"));
        let c = tree.new_orphan(NodeData::leaf("leaf", "c"));

        tree.insert_child(root, 1, c);
        let order: Vec<_> = tree.children(root).collect();
        assert_eq!(order, vec![a, c, b]);

        // Past-the-end appends.
        let d = tree.new_orphan(NodeData::leaf("leaf", "d"));
        tree.insert_child(root, 10, d);
        let order: Vec<_> = tree.children(root).collect();
        assert_eq!(order, vec![a, c, b, d]);
    }

    #[test]
    fn remove_child_detaches_subtree() {
        let (mut tree, mid, a, b, _c) = sample();
        let root = tree.root();
        tree.remove_child(root, mid);
        assert_eq!(tree.parent(mid), None);
        // The detached subtree stays intact.
        assert_eq!(tree.size(mid), 3);
        assert_eq!(tree.parent(a), Some(mid));
        assert_eq!(tree.parent(b), Some(mid));
        assert_eq!(tree.size(root), 2);
    }

    #[test]
    fn deep_copy_is_isomorphic_with_fresh_identities() {
        let (tree, ..) = sample();
        let copy = tree.deep_copy();
        assert_eq!(
            tree.subtree_hash(tree.root()),
            copy.subtree_hash(copy.root())
        );
        assert_eq!(tree.size(tree.root()), copy.size(copy.root()));
        assert_eq!(copy.parent(copy.root()), None);

        let kinds: Vec<_> = copy
            .pre_order(copy.root())
            .map(|id| copy.kind(id).to_string())
            .collect();
        assert_eq!(kinds, vec!["root", "mid", "leaf", "leaf", "leaf"]);
    }

    #[test]
    fn orig_handles_survive_copies() {
        let mut tree: Tree<u32> = Tree::new(NodeData::new("root").with_orig(7));
        let child = tree.add_child(tree.root(), NodeData::leaf("leaf", "x").with_orig(8));
        assert_eq!(tree.orig(child), Some(&8));

        let copy = tree.deep_copy();
        let copied_child = copy.children(copy.root()).next().unwrap();
        assert_eq!(copy.orig(copy.root()), Some(&7));
        assert_eq!(copy.orig(copied_child), Some(&8));
    }

    #[test]
    fn stats_match_recomputation_from_scratch() {
        fn check<R>(tree: &Tree<R>, id: NodeId) -> (usize, usize) {
            let mut size = 1;
            let mut height = 0;
            for child in tree.children(id) {
                let (child_size, child_height) = check(tree, child);
                size += child_size;
                height = height.max(child_height + 1);
            }
            assert_eq!(tree.size(id), size);
            assert_eq!(tree.height(id), height);
            (size, height)
        }

        let (mut tree, mid, _a, b, c) = sample();
        check(&tree, tree.root());
        tree.set_parent(c, Some(mid));
        tree.set_parent(b, None);
        check(&tree, tree.root());
    }
}
