//! GumTree node matching.
//!
//! Two-phase matching:
//! 1. Top-down: greedily match isomorphic subtrees of maximal height,
//!    working down two height-synchronized priority queues.
//! 2. Bottom-up: propagate mappings to container nodes by Dice similarity
//!    over mapped descendants, with an optimal tree-edit-distance pass as
//!    the last chance for small unmatched subtrees.
//!
//! The matcher list is parameterizable; both phases share one
//! [`MappingStore`] and only ever add kind-compatible, one-to-one pairs.

use crate::error::Error;
use crate::{debug, trace};
use crate::mapping::MappingStore;
use crate::queue::NodePriorityQueue;
use crate::rted::match_rted_at;
use crate::tree::{NodeHash, Tree};
use indextree::NodeId;
use rapidhash::{RapidHashMap, RapidHashSet};

/// Minimum Dice similarity for a bottom-up container match.
const SIM_THRESHOLD: f64 = 0.5;

/// The last-chance tree-edit pass runs only when both subtrees are smaller
/// than this; it bounds the O(|a|·|b|) distance matrices.
const SIZE_THRESHOLD: usize = 1000;

/// A matching strategy: adds pairs to the shared store, never removes.
pub type MatcherFn<R> = fn(&mut MappingStore, &Tree<R>, &Tree<R>) -> Result<(), Error>;

/// Number of mapped pairs `(u, v)` with `u` a proper descendant of `src`
/// and `v` a proper descendant of `dst`.
pub fn number_of_mapped_descendants<R>(
    store: &MappingStore,
    src_tree: &Tree<R>,
    src: NodeId,
    dst_tree: &Tree<R>,
    dst: NodeId,
) -> usize {
    let dst_descendants: RapidHashSet<NodeId> = dst_tree.pre_order(dst).skip(1).collect();
    src_tree
        .pre_order(src)
        .skip(1)
        .filter_map(|node| store.get_dst(node))
        .filter(|partner| dst_descendants.contains(partner))
        .count()
}

/// Dice coefficient over mapped descendants:
/// `2·common / (size(src) + size(dst))`.
pub fn dice_similarity<R>(
    store: &MappingStore,
    src_tree: &Tree<R>,
    src: NodeId,
    dst_tree: &Tree<R>,
    dst: NodeId,
) -> f64 {
    let common = number_of_mapped_descendants(store, src_tree, src, dst_tree, dst);
    2.0 * common as f64 / (src_tree.size(src) + dst_tree.size(dst)) as f64
}

/// Map the isomorphic subtrees of `src` and `dst` with the greatest height
/// possible.
///
/// Ambiguous hash buckets (several candidates on both sides) are deferred
/// and resolved after the main loop, in insertion order, mapping any pair
/// whose endpoints are both still free. This is order-stable rather than
/// globally optimal; sorting the deferred pairs by Dice similarity is a
/// possible refinement.
pub fn match_greedy_top_down<R>(
    store: &mut MappingStore,
    src: &Tree<R>,
    dst: &Tree<R>,
) -> Result<(), Error> {
    let mut ambiguous: Vec<(Vec<NodeId>, Vec<NodeId>)> = Vec::new();

    let mut pq_src = NodePriorityQueue::new();
    let mut pq_dst = NodePriorityQueue::new();
    pq_src.push(src, src.root());
    pq_dst.push(dst, dst.root());

    while pq_src.synchronize_and_push_children(src, &mut pq_dst, dst) {
        let src_batch = pq_src.pop_equal_priority();
        let dst_batch = pq_dst.pop_equal_priority();
        trace!(
            src = src_batch.len(),
            dst = dst_batch.len(),
            "equal-height batches"
        );

        // Bucket both batches by subtree hash, preserving first-seen order
        // so the deferred list below is deterministic.
        let mut order: Vec<NodeHash> = Vec::new();
        let mut buckets: RapidHashMap<NodeHash, (Vec<NodeId>, Vec<NodeId>)> =
            RapidHashMap::default();
        for node in src_batch {
            let hash = src.subtree_hash(node);
            buckets
                .entry(hash)
                .or_insert_with(|| {
                    order.push(hash);
                    Default::default()
                })
                .0
                .push(node);
        }
        for node in dst_batch {
            let hash = dst.subtree_hash(node);
            buckets
                .entry(hash)
                .or_insert_with(|| {
                    order.push(hash);
                    Default::default()
                })
                .1
                .push(node);
        }

        for hash in order {
            let (src_bucket, dst_bucket) = &buckets[&hash];
            if src_bucket.is_empty() || dst_bucket.is_empty() {
                // No isomorphic partner at this height: descend.
                for &node in src_bucket {
                    pq_src.push_children(src, node);
                }
                for &node in dst_bucket {
                    pq_dst.push_children(dst, node);
                }
            } else if src_bucket.len() == 1 && dst_bucket.len() == 1 {
                store.put_recursively(src, src_bucket[0], dst, dst_bucket[0]);
            } else {
                ambiguous.push((src_bucket.clone(), dst_bucket.clone()));
            }
        }
    }

    for (src_bucket, dst_bucket) in ambiguous {
        for &a in &src_bucket {
            for &b in &dst_bucket {
                if !store.contains_src(a) && !store.contains_dst(b) {
                    store.put_recursively(src, a, dst, b);
                }
            }
        }
    }

    debug!(matched = store.len(), "top-down phase done");
    Ok(())
}

/// Destination candidates for an unmapped source container: walk up from
/// each mapped descendant's partner, stopping per chain at the first
/// already-visited ancestor. A candidate must share the source node's kind,
/// must not be the destination root, and must still be unmapped.
fn get_dst_candidates<R>(
    store: &MappingStore,
    src_tree: &Tree<R>,
    src: NodeId,
    dst_tree: &Tree<R>,
) -> Vec<NodeId> {
    let mut seeds: Vec<NodeId> = Vec::new();
    for node in src_tree.pre_order(src).skip(1) {
        if let Some(partner) = store.get_dst(node) {
            seeds.push(partner);
        }
    }

    let mut candidates = Vec::new();
    let mut visited: RapidHashSet<NodeId> = RapidHashSet::default();
    for seed in seeds {
        let mut current = seed;
        while let Some(parent) = dst_tree.parent(current) {
            if !visited.insert(parent) {
                break;
            }
            if dst_tree.kind(parent) == src_tree.kind(src)
                && !store.contains_dst(parent)
                && dst_tree.parent(parent).is_some()
            {
                candidates.push(parent);
            }
            current = parent;
        }
    }
    candidates
}

/// Recover small local rearrangements the greedy phases missed: run the
/// optimal matcher on the pair's subtrees into a scratch store and transfer
/// every pair that is still allowed.
fn match_last_chance<R>(
    store: &mut MappingStore,
    src_tree: &Tree<R>,
    src: NodeId,
    dst_tree: &Tree<R>,
    dst: NodeId,
) -> Result<(), Error> {
    if src_tree.size(src) >= SIZE_THRESHOLD || dst_tree.size(dst) >= SIZE_THRESHOLD {
        return Ok(());
    }

    let mut scratch = MappingStore::new();
    match_rted_at(&mut scratch, src_tree, src, dst_tree, dst)?;

    for (src_candidate, dst_candidate) in scratch.iter() {
        if store.is_mapping_allowed(src_tree, src_candidate, dst_tree, dst_candidate) {
            store.put(src_candidate, dst_candidate);
        }
    }
    Ok(())
}

/// Propagate mappings upward: walk the source in post-order and map each
/// unmapped container to its best Dice-scoring destination candidate.
pub fn match_greedy_bottom_up<R>(
    store: &mut MappingStore,
    src: &Tree<R>,
    dst: &Tree<R>,
) -> Result<(), Error> {
    let nodes: Vec<NodeId> = src.post_order(src.root()).collect();
    for node in nodes {
        if src.parent(node).is_none() {
            store.put(node, dst.root());
            match_last_chance(store, src, node, dst, dst.root())?;
            break;
        }

        if src.is_leaf(node) || store.contains_src(node) {
            continue;
        }

        let mut best: Option<NodeId> = None;
        let mut best_score = -1.0_f64;
        for candidate in get_dst_candidates(store, src, node, dst) {
            let score = dice_similarity(store, src, node, dst, candidate);
            // Strict comparison: the earliest-discovered candidate wins ties.
            if score > best_score && score >= SIM_THRESHOLD {
                best_score = score;
                best = Some(candidate);
            }
        }

        if let Some(best) = best {
            store.put(node, best);
            match_last_chance(store, src, node, dst, best)?;
        }
    }

    debug!(matched = store.len(), "bottom-up phase done");
    Ok(())
}

/// Establish mappings between similar nodes of the two trees.
///
/// Runs each matcher in order over one shared store; `None` selects the
/// default pipeline of [`match_greedy_top_down`] then
/// [`match_greedy_bottom_up`]. Every resulting pair is one-to-one and
/// kind-compatible.
pub fn generate_mappings<R>(
    src: &Tree<R>,
    dst: &Tree<R>,
    matchers: Option<&[MatcherFn<R>]>,
) -> Result<MappingStore, Error> {
    let default: [MatcherFn<R>; 2] = [match_greedy_top_down, match_greedy_bottom_up];
    let matchers = matchers.unwrap_or(&default);

    let mut store = MappingStore::new();
    for matcher in matchers {
        matcher(&mut store, src, dst)?;
    }
    Ok(store)
}
