//! Edit-script simplification.
//!
//! Collapses operations over entirely-new or entirely-gone subtrees: a
//! chain of inserts under a fully-inserted parent becomes one
//! whole-subtree insert, and deletes inside a fully-deleted parent vanish
//! behind the parent's delete. Inserts and deletes share no other
//! combination rules.

use crate::chawathe::{Action, NodeRef};
use crate::tree::Tree;
use indextree::NodeId;
use rapidhash::RapidHashMap;

/// Simplify an edit script by collapsing subtree inserts and deletes.
///
/// An insert is dropped when its parent is also inserted and *all* of the
/// parent's proper pre-order descendants are inserted; the parent's insert
/// then covers the whole subtree and is flagged accordingly. Deletes
/// collapse symmetrically (no flag needed: deleting a node discards its
/// subtree). Updates and moves always survive.
pub fn simplify_edit_script<R>(
    actions: Vec<Action>,
    src: &Tree<R>,
    dst: &Tree<R>,
) -> Vec<Action> {
    // Action index per inserted destination node / deleted source node.
    let mut inserted: RapidHashMap<NodeId, usize> = RapidHashMap::default();
    let mut deleted: RapidHashMap<NodeId, usize> = RapidHashMap::default();
    for (idx, action) in actions.iter().enumerate() {
        match action {
            Action::Insert {
                node: NodeRef::Dst(id),
                ..
            } => {
                inserted.insert(*id, idx);
            }
            Action::Delete {
                node: NodeRef::Src(id),
            } => {
                deleted.insert(*id, idx);
            }
            _ => {}
        }
    }

    let mut dropped = vec![false; actions.len()];
    let mut covers_subtree: Vec<usize> = Vec::new();

    for (idx, action) in actions.iter().enumerate() {
        match action {
            Action::Insert {
                node: NodeRef::Dst(id),
                ..
            } => {
                if let Some(parent) = dst.parent(*id)
                    && inserted.contains_key(&parent)
                    && dst.pre_order(parent).skip(1).all(|d| inserted.contains_key(&d))
                {
                    dropped[idx] = true;
                    covers_subtree.push(inserted[&parent]);
                }
            }
            Action::Delete {
                node: NodeRef::Src(id),
            } => {
                if let Some(parent) = src.parent(*id)
                    && deleted.contains_key(&parent)
                    && src.pre_order(parent).skip(1).all(|d| deleted.contains_key(&d))
                {
                    dropped[idx] = true;
                }
            }
            _ => {}
        }
    }

    let mut actions = actions;
    for idx in covers_subtree {
        if let Action::Insert { whole_subtree, .. } = &mut actions[idx] {
            *whole_subtree = true;
        }
    }

    actions
        .into_iter()
        .enumerate()
        .filter_map(|(idx, action)| (!dropped[idx]).then_some(action))
        .collect()
}
