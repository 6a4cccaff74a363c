//! Optimal tree-edit-distance matching, used as the last-chance fallback.
//!
//! Classical Zhang dynamic program over post-order positions: `forest_dist`
//! and `tree_dist` matrices keyed by leftmost-leaf descendants, with
//! key-roots driving the outer loops. Insert and delete cost 1; an update
//! costs the normalized trigram distance of the labels, and is forbidden
//! (infinite) across node kinds, so the extracted correspondence is always
//! kind-respecting.

use crate::error::Error;
use crate::mapping::MappingStore;
use crate::similarity::normalized_trigram_distance;
use crate::tree::Tree;
use indextree::NodeId;
use rapidhash::RapidHashMap;

const COST_DELETE: f64 = 1.0;
const COST_INSERT: f64 = 1.0;

/// A subtree flattened into 1-based post-order positions.
struct PostOrderView {
    node_count: usize,
    /// Leftmost-leaf descendant per position, stored 0-based.
    lld: Vec<usize>,
    /// Node at each position.
    nodes: Vec<NodeId>,
    /// Positions whose leftmost leaf is seen for the first time walking
    /// from the root downwards; index 0 is unused.
    key_roots: Vec<usize>,
}

impl PostOrderView {
    fn new<R>(tree: &Tree<R>, root: NodeId) -> Self {
        let node_count = tree.size(root);
        let mut lld = vec![0usize; node_count];
        let mut nodes = Vec::with_capacity(node_count);
        let mut leaf_count = 0usize;
        let mut post_index: RapidHashMap<NodeId, usize> = RapidHashMap::default();

        for (offset, node) in tree.post_order(root).enumerate() {
            let idx = offset + 1;
            post_index.insert(node, idx);
            nodes.push(node);

            let mut leaf = node;
            while let Some(first_child) = tree.children(leaf).next() {
                leaf = first_child;
            }
            lld[idx - 1] = post_index[&leaf] - 1;

            if tree.is_leaf(node) {
                leaf_count += 1;
            }
        }

        let mut key_roots = vec![0usize; leaf_count + 1];
        let mut visited = vec![false; node_count + 1];
        let mut k = key_roots.len() - 1;
        let mut i = node_count;
        while i >= 1 {
            let leftmost = lld[i - 1] + 1;
            if !visited[leftmost] {
                key_roots[k] = i;
                visited[leftmost] = true;
                k -= 1;
            }
            i -= 1;
        }

        Self {
            node_count,
            lld,
            nodes,
            key_roots,
        }
    }

    /// Leftmost-leaf descendant of position `i`, 1-based.
    fn lld(&self, i: usize) -> usize {
        self.lld[i - 1] + 1
    }

    /// Node at 1-based position `i`.
    fn node(&self, i: usize) -> NodeId {
        self.nodes[i - 1]
    }
}

/// The Zhang dynamic program over one pair of subtrees.
struct EditDistance<'a, R> {
    src_tree: &'a Tree<R>,
    dst_tree: &'a Tree<R>,
    src: PostOrderView,
    dst: PostOrderView,
    tree_dist: Vec<Vec<f64>>,
    forest_dist: Vec<Vec<f64>>,
}

impl<R> EditDistance<'_, R> {
    fn update_cost(&self, src: NodeId, dst: NodeId) -> f64 {
        if self.src_tree.kind(src) != self.dst_tree.kind(dst) {
            return f64::MAX;
        }
        normalized_trigram_distance(self.src_tree.label(src), self.dst_tree.label(dst))
    }

    fn compute_forest_dist(&mut self, i: usize, j: usize) {
        let first_row = self.src.lld(i) - 1;
        let first_col = self.dst.lld(j) - 1;
        self.forest_dist[first_row][first_col] = 0.0;

        for di in self.src.lld(i)..=i {
            self.forest_dist[di][first_col] = self.forest_dist[di - 1][first_col] + COST_DELETE;
        }
        for dj in self.dst.lld(j)..=j {
            self.forest_dist[first_row][dj] = self.forest_dist[first_row][dj - 1] + COST_INSERT;
        }

        for di in self.src.lld(i)..=i {
            for dj in self.dst.lld(j)..=j {
                let base = (self.forest_dist[di - 1][dj] + COST_DELETE)
                    .min(self.forest_dist[di][dj - 1] + COST_INSERT);
                if self.src.lld(di) == self.src.lld(i) && self.dst.lld(dj) == self.dst.lld(j) {
                    let cost_update = self.update_cost(self.src.node(di), self.dst.node(dj));
                    self.forest_dist[di][dj] =
                        base.min(self.forest_dist[di - 1][dj - 1] + cost_update);
                    self.tree_dist[di][dj] = self.forest_dist[di][dj];
                } else {
                    self.forest_dist[di][dj] = base.min(
                        self.forest_dist[self.src.lld(di) - 1][self.dst.lld(dj) - 1]
                            + self.tree_dist[di][dj],
                    );
                }
            }
        }
    }

    /// Backtrack through the matrices, transferring every matched pair into
    /// `store`. A forced pairing of mismatched kinds means the matrices are
    /// inconsistent and is surfaced as an invariant violation.
    fn extract_mappings(&mut self, store: &mut MappingStore) -> Result<(), Error> {
        let mut root_node_pair = true;
        let mut tree_pairs: Vec<(usize, usize)> =
            vec![(self.src.node_count, self.dst.node_count)];

        while let Some((last_row, last_col)) = tree_pairs.pop() {
            if !root_node_pair {
                self.compute_forest_dist(last_row, last_col);
            }
            root_node_pair = false;

            let first_row = self.src.lld(last_row) - 1;
            let first_col = self.dst.lld(last_col) - 1;
            let mut row = last_row;
            let mut col = last_col;

            while row > first_row && col > first_col {
                if self.forest_dist[row - 1][col] + COST_DELETE == self.forest_dist[row][col] {
                    row -= 1;
                } else if self.forest_dist[row][col - 1] + COST_INSERT
                    == self.forest_dist[row][col]
                {
                    col -= 1;
                } else if self.src.lld(row) == self.src.lld(last_row)
                    && self.dst.lld(col) == self.dst.lld(last_col)
                {
                    let src_node = self.src.node(row);
                    let dst_node = self.dst.node(col);
                    if self.src_tree.kind(src_node) != self.dst_tree.kind(dst_node) {
                        return Err(Error::InvariantViolation(
                            "tree-edit backtrack forced a pair of mismatched kinds",
                        ));
                    }
                    store.put(src_node, dst_node);
                    row -= 1;
                    col -= 1;
                } else {
                    // Subforest restart: finish this subtree pair later.
                    tree_pairs.push((row, col));
                    row = self.src.lld(row) - 1;
                    col = self.dst.lld(col) - 1;
                }
            }
        }
        Ok(())
    }
}

/// Run the tree-edit-distance matcher on the subtrees rooted at `src_node`
/// and `dst_node`, adding every extracted pair to `store`.
pub fn match_rted_at<R>(
    store: &mut MappingStore,
    src_tree: &Tree<R>,
    src_node: NodeId,
    dst_tree: &Tree<R>,
    dst_node: NodeId,
) -> Result<(), Error> {
    let src = PostOrderView::new(src_tree, src_node);
    let dst = PostOrderView::new(dst_tree, dst_node);
    let rows = src.node_count + 1;
    let cols = dst.node_count + 1;

    let mut solver = EditDistance {
        src_tree,
        dst_tree,
        src,
        dst,
        tree_dist: vec![vec![0.0; cols]; rows],
        forest_dist: vec![vec![0.0; cols]; rows],
    };

    for i in 1..solver.src.key_roots.len() {
        for j in 1..solver.dst.key_roots.len() {
            let key_i = solver.src.key_roots[i];
            let key_j = solver.dst.key_roots[j];
            solver.compute_forest_dist(key_i, key_j);
        }
    }

    solver.extract_mappings(store)
}

/// Matcher over whole trees; usable directly in a matcher pipeline.
pub fn match_rted<R>(
    store: &mut MappingStore,
    src: &Tree<R>,
    dst: &Tree<R>,
) -> Result<(), Error> {
    match_rted_at(store, src, src.root(), dst, dst.root())
}
