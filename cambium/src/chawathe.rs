//! Chawathe edit-script generation.
//!
//! Converts a node mapping into a sequence of insert/update/move/delete
//! actions, following "Change Detection in Hierarchically Structured
//! Information" (Chawathe et al., 1996): the source tree is deep-copied,
//! the destination is walked breadth-first, and every emitted action is
//! immediately applied to the working copy so later positions are computed
//! against the partially-transformed tree. Children of each visited pair
//! are aligned with a longest-common-subsequence pass.

use crate::debug;
use crate::error::Error;
use crate::mapping::MappingStore;
use crate::tree::{NodeData, Tree};
use core::fmt;
use indextree::NodeId;
use rapidhash::{RapidHashMap, RapidHashSet};

/// Kind of the sentinel nodes anchoring roots and standing in for inserted
/// nodes inside the working copy. Sentinels never reach the edit script.
const FAKE_KIND: &str = "fake-type";
const FAKE_LABEL: &str = "fake-label";

/// A node reference in an edit script, tagged with the tree it lives in.
///
/// Most actions point at source-tree nodes; inserts point at the
/// destination node being added, and an action's *parent* is a destination
/// node whenever the parent itself was inserted by an earlier action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// A node of the source tree.
    Src(NodeId),
    /// A node of the destination tree.
    Dst(NodeId),
}

impl NodeRef {
    /// The underlying arena id, without the tree tag.
    pub fn id(self) -> NodeId {
        match self {
            NodeRef::Src(id) | NodeRef::Dst(id) => id,
        }
    }

    /// Read through to the referenced node's original handle.
    pub fn orig_ref<'t, R>(self, src: &'t Tree<R>, dst: &'t Tree<R>) -> Option<&'t R> {
        match self {
            NodeRef::Src(id) => src.orig(id),
            NodeRef::Dst(id) => dst.orig(id),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Src(id) => write!(f, "a:{}", usize::from(*id)),
            NodeRef::Dst(id) => write!(f, "b:{}", usize::from(*id)),
        }
    }
}

/// An edit operation transforming the source tree towards the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Insert a new node (a destination node with no counterpart).
    Insert {
        /// The destination node being added.
        node: NodeRef,
        /// The parent to insert under.
        parent: NodeRef,
        /// Position among the parent's children.
        pos: usize,
        /// Whether this insert stands for the node's entire subtree.
        whole_subtree: bool,
    },
    /// Replace a node's label.
    Update {
        /// The source node whose label changes.
        node: NodeRef,
        /// The label before the change.
        old_label: Option<String>,
        /// The label after the change.
        new_label: Option<String>,
    },
    /// Move a subtree to a new parent or position.
    Move {
        /// The source node being moved.
        node: NodeRef,
        /// The parent to move under.
        parent: NodeRef,
        /// Position among the parent's children.
        pos: usize,
    },
    /// Delete a source node.
    Delete {
        /// The source node being removed.
        node: NodeRef,
    },
}

impl Action {
    /// The action's primary node.
    pub fn node(&self) -> NodeRef {
        match self {
            Action::Insert { node, .. }
            | Action::Update { node, .. }
            | Action::Move { node, .. }
            | Action::Delete { node } => *node,
        }
    }

    /// Read through to the primary node's original handle, so downstream
    /// tools can recover the parser object the action refers to.
    pub fn orig_ref<'t, R>(&self, src: &'t Tree<R>, dst: &'t Tree<R>) -> Option<&'t R> {
        self.node().orig_ref(src, dst)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Insert {
                node,
                parent,
                pos,
                whole_subtree,
            } => {
                write!(f, "Insert({node} @{pos} under {parent}")?;
                if *whole_subtree {
                    write!(f, ", subtree")?;
                }
                write!(f, ")")
            }
            Action::Update {
                node,
                old_label,
                new_label,
            } => write!(
                f,
                "Update({node} {:?} -> {:?})",
                old_label.as_deref().unwrap_or(""),
                new_label.as_deref().unwrap_or("")
            ),
            Action::Move { node, parent, pos } => {
                write!(f, "Move({node} @{pos} under {parent})")
            }
            Action::Delete { node } => write!(f, "Delete({node})"),
        }
    }
}

/// Wrapper for collecting actions with automatic tracing.
struct Ops {
    inner: Vec<Action>,
}

impl Ops {
    fn new() -> Self {
        Self { inner: Vec::new() }
    }

    fn push(&mut self, op: Action) {
        debug!(%op, "emit");
        self.inner.push(op);
    }

    fn into_inner(self) -> Vec<Action> {
        self.inner
    }
}

/// Longest common subsequence of `x` and `y` under a custom equality.
///
/// Returns the matched pairs rather than one side: with a caller-defined
/// equality the two elements of a pair are distinct values.
fn lcs<T: Copy, F: Fn(T, T) -> bool>(x: &[T], y: &[T], equal: F) -> Vec<(T, T)> {
    let m = x.len();
    let n = y.len();
    let mut opt = vec![vec![0usize; n + 1]; m + 1];

    for i in (0..m).rev() {
        for j in (0..n).rev() {
            opt[i][j] = if equal(x[i], y[j]) {
                opt[i + 1][j + 1] + 1
            } else {
                opt[i + 1][j].max(opt[i][j + 1])
            };
        }
    }

    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if equal(x[i], y[j]) {
            result.push((x[i], y[j]));
            i += 1;
            j += 1;
        } else if opt[i + 1][j] >= opt[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    result
}

/// Position at which the partner of destination node `x` should be
/// (re)inserted in the working copy.
///
/// 0 when `x` is the leftmost in-order child of its parent, or has no
/// in-order sibling to its left; otherwise one past the working-copy
/// position of the rightmost such sibling's partner. A parentless `x`
/// (the root under its notional sentinel) is position 0.
fn find_pos<R>(
    dst: &Tree<R>,
    cpy: &Tree<R>,
    x: NodeId,
    dst_in_order: &RapidHashSet<NodeId>,
    cpy_mappings: &MappingStore,
) -> Result<usize, Error> {
    let Some(parent) = dst.parent(x) else {
        return Ok(0);
    };
    let siblings: Vec<NodeId> = dst.children(parent).collect();

    for &sibling in &siblings {
        if dst_in_order.contains(&sibling) {
            if sibling == x {
                return Ok(0);
            }
            break;
        }
    }

    let pos = dst
        .position_in_parent(x)
        .ok_or(Error::InvariantViolation("node missing from its parent's children"))?;
    let mut rightmost = None;
    for &sibling in &siblings[..pos] {
        if dst_in_order.contains(&sibling) {
            rightmost = Some(sibling);
        }
    }
    let Some(in_order_sibling) = rightmost else {
        return Ok(0);
    };

    let partner = cpy_mappings
        .get_src(in_order_sibling)
        .ok_or(Error::InvariantViolation("in-order sibling has no partner"))?;
    let partner_pos = cpy
        .position_in_parent(partner)
        .ok_or(Error::InvariantViolation("in-order partner has no parent"))?;
    Ok(partner_pos + 1)
}

/// Align the children of a matched pair `(w, x)`: mark the LCS of the
/// mutually-matched children in order, then move every remaining matched
/// child into place, mutating the working copy as the moves are emitted.
#[expect(clippy::too_many_arguments)]
fn align_children<R>(
    cpy: &mut Tree<R>,
    dst: &Tree<R>,
    w: NodeId,
    x: NodeId,
    src_in_order: &mut RapidHashSet<NodeId>,
    dst_in_order: &mut RapidHashSet<NodeId>,
    cpy_mappings: &MappingStore,
    cpy_to_src: &RapidHashMap<NodeId, NodeRef>,
    ops: &mut Ops,
) -> Result<(), Error> {
    for child in cpy.children(w) {
        src_in_order.remove(&child);
    }
    for child in dst.children(x) {
        dst_in_order.remove(&child);
    }

    // Children of w whose partners are children of x, and vice versa.
    let matched_w: Vec<NodeId> = cpy
        .children(w)
        .filter(|&c| cpy_mappings.get_dst(c).is_some_and(|d| dst.parent(d) == Some(x)))
        .collect();
    let matched_x: Vec<NodeId> = dst
        .children(x)
        .filter(|&c| cpy_mappings.get_src(c).is_some_and(|s| cpy.parent(s) == Some(w)))
        .collect();

    let lcs_pairs = lcs(&matched_w, &matched_x, |a, b| {
        cpy_mappings.get_src(b) == Some(a)
    });
    for &(a, b) in &lcs_pairs {
        src_in_order.insert(a);
        dst_in_order.insert(b);
    }

    // Destination-outer, source-inner keeps insertions left-to-right.
    for &b in &matched_x {
        for &a in &matched_w {
            if !cpy_mappings.has(a, b) || lcs_pairs.contains(&(a, b)) {
                continue;
            }

            let parent = cpy
                .parent(a)
                .ok_or(Error::InvariantViolation("aligned child has no parent"))?;
            cpy.remove_child(parent, a);
            let pos = find_pos(dst, cpy, b, dst_in_order, cpy_mappings)?;
            let node = *cpy_to_src
                .get(&a)
                .ok_or(Error::InvariantViolation("moved node has no origin"))?;
            let target = *cpy_to_src
                .get(&w)
                .ok_or(Error::InvariantViolation("move target has no origin"))?;
            ops.push(Action::Move {
                node,
                parent: target,
                pos,
            });
            cpy.insert_child(w, pos, a);

            src_in_order.insert(a);
            dst_in_order.insert(b);
        }
    }
    Ok(())
}

/// Generate an edit script from a mapping between two trees.
///
/// The mapping is expected to come from [`crate::generate_mappings`]; at
/// minimum the two roots must be mapped, or the first parentless insert
/// surfaces an invariant violation.
pub fn generate_edit_script<R: Clone>(
    src: &Tree<R>,
    dst: &Tree<R>,
    mappings: &MappingStore,
) -> Result<Vec<Action>, Error> {
    debug!(mapped_pairs = mappings.len(), "generate_edit_script start");

    let mut cpy = src.deep_copy();
    let cpy_root = cpy.root();

    // Bijections between the source and its working copy, by zipped
    // pre-orders. Copy-side sentinels created below map to destination
    // nodes instead, hence the NodeRef values.
    let src_nodes: Vec<NodeId> = src.pre_order(src.root()).collect();
    let cpy_nodes: Vec<NodeId> = cpy.pre_order(cpy_root).collect();
    let mut src_to_cpy: RapidHashMap<NodeId, NodeId> = RapidHashMap::default();
    let mut cpy_to_src: RapidHashMap<NodeId, NodeRef> = RapidHashMap::default();
    for (&s, &c) in src_nodes.iter().zip(cpy_nodes.iter()) {
        src_to_cpy.insert(s, c);
        cpy_to_src.insert(c, NodeRef::Src(s));
    }

    // Re-key the mapping onto the working copy.
    let mut cpy_mappings = MappingStore::new();
    for (s, d) in mappings.iter() {
        let c = *src_to_cpy
            .get(&s)
            .ok_or(Error::InvariantViolation("mapped source node is not in the source tree"))?;
        cpy_mappings.put(c, d);
    }

    // Sentinel root over the copy. The destination's sentinel parent stays
    // virtual: a parentless destination node resolves its partner to this
    // node, and find_pos already returns 0 for it.
    let fake_root = cpy.new_orphan(NodeData::new(FAKE_KIND).with_label(FAKE_LABEL));
    cpy.append_child(fake_root, cpy_root);

    let mut ops = Ops::new();
    let mut src_in_order: RapidHashSet<NodeId> = RapidHashSet::default();
    let mut dst_in_order: RapidHashSet<NodeId> = RapidHashSet::default();

    let bfs: Vec<NodeId> = dst.bfs(dst.root()).collect();
    for x in bfs {
        // The parent's partner exists by BFS order.
        let z = match dst.parent(x) {
            Some(y) => cpy_mappings
                .get_src(y)
                .ok_or(Error::InvariantViolation("parent visited by BFS has no partner"))?,
            None => fake_root,
        };

        let w = if let Some(w) = cpy_mappings.get_src(x) {
            if x != dst.root() {
                let v = cpy
                    .parent(w)
                    .ok_or(Error::InvariantViolation("partner node has no parent"))?;

                if cpy.label(w) != dst.label(x) {
                    let node = *cpy_to_src
                        .get(&w)
                        .ok_or(Error::InvariantViolation("updated node has no origin"))?;
                    ops.push(Action::Update {
                        node,
                        old_label: cpy.label(w).map(str::to_owned),
                        new_label: dst.label(x).map(str::to_owned),
                    });
                    cpy.set_label(w, dst.label(x).map(str::to_owned));
                }

                // Cheap proxy for "different parent subtree".
                if cpy.subtree_hash(z) != cpy.subtree_hash(v) {
                    let pos = find_pos(dst, &cpy, x, &dst_in_order, &cpy_mappings)?;
                    let node = *cpy_to_src
                        .get(&w)
                        .ok_or(Error::InvariantViolation("moved node has no origin"))?;
                    let parent = *cpy_to_src
                        .get(&z)
                        .ok_or(Error::InvariantViolation("move target has no origin"))?;
                    ops.push(Action::Move { node, parent, pos });
                    cpy.remove_child(v, w);
                    cpy.insert_child(z, pos, w);
                }
            }
            w
        } else {
            let pos = find_pos(dst, &cpy, x, &dst_in_order, &cpy_mappings)?;
            let parent = *cpy_to_src.get(&z).ok_or(Error::InvariantViolation(
                "insert parent resolves to a sentinel; were the roots mapped?",
            ))?;
            ops.push(Action::Insert {
                node: NodeRef::Dst(x),
                parent,
                pos,
                whole_subtree: dst.is_leaf(x),
            });

            let w = cpy.new_orphan(NodeData::new(FAKE_KIND).with_label(FAKE_LABEL));
            cpy_to_src.insert(w, NodeRef::Dst(x));
            cpy_mappings.put(w, x);
            cpy.insert_child(z, pos, w);
            w
        };

        src_in_order.insert(w);
        dst_in_order.insert(x);

        align_children(
            &mut cpy,
            dst,
            w,
            x,
            &mut src_in_order,
            &mut dst_in_order,
            &cpy_mappings,
            &cpy_to_src,
            &mut ops,
        )?;
    }

    // Anything left unmapped in the copy was deleted; sentinels are
    // working-copy artifacts and never reach the script.
    let remaining: Vec<NodeId> = cpy.post_order(cpy_root).collect();
    for node in remaining {
        if cpy.kind(node) == FAKE_KIND || cpy_mappings.contains_src(node) {
            continue;
        }
        let origin = *cpy_to_src
            .get(&node)
            .ok_or(Error::InvariantViolation("deleted node has no origin"))?;
        ops.push(Action::Delete { node: origin });
    }

    debug!(total_ops = ops.inner.len(), "generate_edit_script done");
    Ok(ops.into_inner())
}
