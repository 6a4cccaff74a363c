//! # Cambium
//!
//! Tree diffing for ordered, labeled trees: computes a compact edit script
//! (insert / update / move / delete) transforming a source tree into a
//! destination tree. Named after the cambium layer, the part of a tree
//! where the growing happens.
//!
//! ## Algorithm Overview
//!
//! The pipeline follows the two-phase design of:
//! - **GumTree** (Falleri et al., ASE 2014) for node matching: a greedy
//!   top-down pass maps isomorphic subtrees of maximal height, then a
//!   bottom-up pass maps container nodes by Dice similarity over mapped
//!   descendants, with an optimal tree-edit-distance pass (Zhang's
//!   dynamic program) as the last chance on small subtrees;
//! - **Chawathe** (1996) for edit-script generation, followed by a
//!   simplification pass that collapses operations on fully-inserted or
//!   fully-deleted subtrees.
//!
//! The pipeline is synchronous, single-threaded, and deterministic: equal
//! inputs produce byte-for-byte equal edit scripts.
//!
//! ## Usage
//!
//! ```
//! use cambium::{diff_trees, NodeData, Tree};
//!
//! let mut src: Tree<()> = Tree::new(NodeData::new("root"));
//! src.add_child(src.root(), NodeData::leaf("identifier", "counter"));
//!
//! let mut dst: Tree<()> = Tree::new(NodeData::new("root"));
//! dst.add_child(dst.root(), NodeData::leaf("identifier", "counters"));
//!
//! let script = diff_trees(&src, &dst).unwrap();
//! assert_eq!(script.len(), 1);
//! ```
//!
//! Trees usually come from an external parser; implement
//! [`SourceNode`] for its AST type and use [`tree_diff`] (or
//! [`from_source`] directly) to load them through the per-language
//! flatten/alias/ignore rules.

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

pub use indextree;

mod chawathe;
mod error;
/// Language rules and the default parser adapter.
pub mod loader;
/// Node mapping store shared by the matchers.
pub mod mapping;
/// GumTree matching phases and the matcher pipeline.
pub mod matching;
mod queue;
mod rted;
/// String distances used as update-cost proxies.
pub mod similarity;
mod simplify;
mod tracing_macros;
/// Tree representation with cached statistics.
pub mod tree;

pub use chawathe::*;
pub use error::Error;
pub use loader::*;
pub use mapping::*;
pub use matching::*;
pub use queue::*;
pub use rted::*;
pub use similarity::*;
pub use simplify::*;
pub use tree::*;

/// A caller-supplied tree loader: turns a raw parser object into a
/// [`Tree`], optionally consulting loader arguments.
pub type Loader<S, R> =
    fn(&S, Option<&LoaderArgs<'_>>) -> Result<Tree<R>, Error>;

/// A loader-driven diff: the loaded trees plus the edit script relating
/// them. Keeping the trees alongside the actions lets callers resolve
/// [`Action::orig_ref`] back to their parser objects.
#[derive(Debug)]
pub struct DiffResult<R> {
    /// The loaded source tree.
    pub src: Tree<R>,
    /// The loaded destination tree.
    pub dst: Tree<R>,
    /// The simplified edit script from `src` to `dst`.
    pub actions: Vec<Action>,
}

/// Compute a simplified edit script between two pre-built trees.
///
/// Runs the default matcher pipeline, generates the Chawathe edit script,
/// and simplifies it.
pub fn diff_trees<R: Clone>(src: &Tree<R>, dst: &Tree<R>) -> Result<Vec<Action>, Error> {
    let (actions, _mappings) = diff_trees_with_mappings(src, dst)?;
    Ok(actions)
}

/// Like [`diff_trees`], but also returns the node mapping.
///
/// Useful when edit operations need to be translated into some other
/// addressing scheme: the mapping says which source node each destination
/// node corresponds to.
pub fn diff_trees_with_mappings<R: Clone>(
    src: &Tree<R>,
    dst: &Tree<R>,
) -> Result<(Vec<Action>, MappingStore), Error> {
    let mappings = generate_mappings(src, dst, None)?;
    let actions = generate_edit_script(src, dst, &mappings)?;
    let actions = simplify_edit_script(actions, src, dst);
    Ok((actions, mappings))
}

/// Diff two raw parser trees.
///
/// With a `loader`, both inputs are loaded through it (forwarding
/// `loader_args` as-is). Without one, `loader_args` must also be absent —
/// anything else is a validation error — and the default adapter loads
/// both inputs with the bundled rules for [`DEFAULT_LANGUAGE`].
pub fn tree_diff<S: SourceNode>(
    src: &S,
    dst: &S,
    loader: Option<Loader<S, S::Handle>>,
    loader_args: Option<&LoaderArgs<'_>>,
) -> Result<DiffResult<S::Handle>, Error> {
    let (src_tree, dst_tree) = match loader {
        Some(load) => (load(src, loader_args)?, load(dst, loader_args)?),
        None => {
            if loader_args.is_some() {
                return Err(Error::LoaderArgsWithoutLoader);
            }
            let args = LoaderArgs::Language(DEFAULT_LANGUAGE);
            (from_source(src, Some(&args))?, from_source(dst, Some(&args))?)
        }
    };

    let actions = diff_trees(&src_tree, &dst_tree)?;
    Ok(DiffResult {
        src: src_tree,
        dst: dst_tree,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indextree::NodeId;
    use rapidhash::RapidHashMap;

    /// Apply an edit script to a fresh copy of `src`, obeying positions and
    /// resolving each action's node references in the working copy.
    fn apply_edit_script<R: Clone>(src: &Tree<R>, dst: &Tree<R>, actions: &[Action]) -> Tree<R> {
        let mut work = src.deep_copy();

        let mut resolve: RapidHashMap<NodeRef, NodeId> = RapidHashMap::default();
        let src_nodes: Vec<NodeId> = src.pre_order(src.root()).collect();
        let work_nodes: Vec<NodeId> = work.pre_order(work.root()).collect();
        for (&s, &w) in src_nodes.iter().zip(work_nodes.iter()) {
            resolve.insert(NodeRef::Src(s), w);
        }

        fn copy_from_dst<R: Clone>(
            work: &mut Tree<R>,
            dst: &Tree<R>,
            dst_id: NodeId,
            recurse: bool,
            resolve: &mut RapidHashMap<NodeRef, NodeId>,
        ) -> NodeId {
            let mut data = NodeData::new(dst.kind(dst_id));
            if let Some(label) = dst.label(dst_id) {
                data = data.with_label(label);
            }
            let id = work.new_orphan(data);
            resolve.insert(NodeRef::Dst(dst_id), id);
            if recurse {
                let children: Vec<NodeId> = dst.children(dst_id).collect();
                for child in children {
                    let child_id = copy_from_dst(work, dst, child, true, resolve);
                    work.append_child(id, child_id);
                }
            }
            id
        }

        for action in actions {
            match action {
                Action::Insert {
                    node: NodeRef::Dst(dst_id),
                    parent,
                    pos,
                    whole_subtree,
                } => {
                    let parent_id = resolve[parent];
                    let new_id = copy_from_dst(&mut work, dst, *dst_id, *whole_subtree, &mut resolve);
                    work.insert_child(parent_id, *pos, new_id);
                }
                Action::Insert { .. } => panic!("insert of a source node"),
                Action::Update {
                    node, new_label, ..
                } => {
                    work.set_label(resolve[node], new_label.clone());
                }
                Action::Move { node, parent, pos } => {
                    let id = resolve[node];
                    let parent_id = resolve[parent];
                    let old_parent = work.parent(id).expect("moved node has a parent");
                    work.remove_child(old_parent, id);
                    work.insert_child(parent_id, *pos, id);
                }
                Action::Delete { node } => {
                    let id = resolve[node];
                    let parent = work.parent(id).expect("deleted node has a parent");
                    work.remove_child(parent, id);
                }
            }
        }
        work
    }

    fn assert_round_trip(src: &Tree<()>, dst: &Tree<()>) {
        let actions = diff_trees(src, dst).unwrap();
        let applied = apply_edit_script(src, dst, &actions);
        assert_eq!(
            applied.subtree_hash(applied.root()),
            dst.subtree_hash(dst.root()),
            "applying the script must reproduce the destination:\n{applied}vs\n{dst}"
        );
    }

    /// root[f[x, y], g[z], d]
    fn rich_tree() -> Tree<()> {
        let mut tree: Tree<()> = Tree::new(NodeData::new("root"));
        let f = tree.add_child(tree.root(), NodeData::new("f"));
        tree.add_child(f, NodeData::leaf("id", "x"));
        tree.add_child(f, NodeData::leaf("id", "y"));
        let g = tree.add_child(tree.root(), NodeData::new("g"));
        tree.add_child(g, NodeData::leaf("id", "z"));
        tree.add_child(tree.root(), NodeData::leaf("marker", "d"));
        tree
    }

    #[test]
    fn identical_trees_produce_an_empty_script() {
        let tree = rich_tree();
        let copy = tree.deep_copy();
        let actions = diff_trees(&tree, &copy).unwrap();
        assert!(actions.is_empty(), "got {actions:?}");
    }

    #[test]
    fn equal_inputs_produce_identical_scripts() {
        let src = rich_tree();
        let mut dst = rich_tree();
        let dst_g = dst.pre_order(dst.root()).find(|&n| dst.kind(n) == "g").unwrap();
        dst.add_child(dst_g, NodeData::leaf("id", "w"));

        let first = diff_trees(&src, &dst).unwrap();
        let second = diff_trees(&src, &dst).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn insert_between_siblings_full_pipeline() {
        let mut src: Tree<()> = Tree::new(NodeData::new("root"));
        src.add_child(src.root(), NodeData::new("a"));
        src.add_child(src.root(), NodeData::new("b"));

        let mut dst: Tree<()> = Tree::new(NodeData::new("root"));
        dst.add_child(dst.root(), NodeData::new("a"));
        let dst_c = dst.add_child(dst.root(), NodeData::new("c"));
        dst.add_child(dst.root(), NodeData::new("b"));

        let actions = diff_trees(&src, &dst).unwrap();
        assert_eq!(
            actions,
            vec![Action::Insert {
                node: NodeRef::Dst(dst_c),
                parent: NodeRef::Src(src.root()),
                pos: 1,
                whole_subtree: true,
            }]
        );
        assert_round_trip(&src, &dst);
    }

    #[test]
    fn label_update_full_pipeline() {
        let mut src: Tree<()> = Tree::new(NodeData::new("p"));
        let src_id = src.add_child(src.root(), NodeData::leaf("id", "x"));

        let mut dst: Tree<()> = Tree::new(NodeData::new("p"));
        dst.add_child(dst.root(), NodeData::leaf("id", "y"));

        let actions = diff_trees(&src, &dst).unwrap();
        assert_eq!(
            actions,
            vec![Action::Update {
                node: NodeRef::Src(src_id),
                old_label: Some("x".to_string()),
                new_label: Some("y".to_string()),
            }]
        );
        assert_round_trip(&src, &dst);
    }

    #[test]
    fn whole_subtree_delete_full_pipeline() {
        let mut src: Tree<()> = Tree::new(NodeData::new("p"));
        let src_q = src.add_child(src.root(), NodeData::new("q"));
        src.add_child(src_q, NodeData::leaf("id", "r"));
        src.add_child(src_q, NodeData::leaf("id", "s"));

        let dst: Tree<()> = Tree::new(NodeData::new("p"));

        let actions = diff_trees(&src, &dst).unwrap();
        assert_eq!(actions, vec![Action::Delete { node: NodeRef::Src(src_q) }]);
        assert_round_trip(&src, &dst);
    }

    #[test]
    fn whole_subtree_insert_collapses_to_one_action() {
        let src: Tree<()> = Tree::new(NodeData::new("root"));

        let mut dst: Tree<()> = Tree::new(NodeData::new("root"));
        let dst_p = dst.add_child(dst.root(), NodeData::new("p"));
        dst.add_child(dst_p, NodeData::leaf("id", "c1"));
        dst.add_child(dst_p, NodeData::leaf("id", "c2"));

        let actions = diff_trees(&src, &dst).unwrap();
        assert_eq!(
            actions,
            vec![Action::Insert {
                node: NodeRef::Dst(dst_p),
                parent: NodeRef::Src(src.root()),
                pos: 0,
                whole_subtree: true,
            }]
        );
        assert_round_trip(&src, &dst);
    }

    #[test]
    fn round_trip_under_application() {
        // Moves, an update, an insert, and a delete in one pair.
        let src = rich_tree();

        let mut dst: Tree<()> = Tree::new(NodeData::new("root"));
        let g = dst.add_child(dst.root(), NodeData::new("g"));
        dst.add_child(g, NodeData::leaf("id", "z"));
        let f = dst.add_child(dst.root(), NodeData::new("f"));
        dst.add_child(f, NodeData::leaf("id", "x"));
        dst.add_child(f, NodeData::leaf("id", "renamed"));
        let h = dst.add_child(dst.root(), NodeData::new("h"));
        dst.add_child(h, NodeData::leaf("id", "fresh"));

        assert_round_trip(&src, &dst);
    }

    #[test]
    fn mappings_are_bijective_and_kind_compatible() {
        let src = rich_tree();
        let mut dst = rich_tree();
        let dst_f = dst.pre_order(dst.root()).find(|&n| dst.kind(n) == "f").unwrap();
        dst.add_child(dst_f, NodeData::leaf("id", "extra"));

        let (_, mappings) = diff_trees_with_mappings(&src, &dst).unwrap();
        let mut seen_src = Vec::new();
        let mut seen_dst = Vec::new();
        for (s, d) in mappings.iter() {
            assert_eq!(mappings.get_src(d), Some(s));
            assert_eq!(mappings.get_dst(s), Some(d));
            assert_eq!(src.kind(s), dst.kind(d));
            assert!(!seen_src.contains(&s), "source mapped twice");
            assert!(!seen_dst.contains(&d), "destination mapped twice");
            seen_src.push(s);
            seen_dst.push(d);
        }
    }

    mod loading {
        use super::*;

        struct Raw {
            id: usize,
            kind: &'static str,
            text: Option<&'static str>,
            children: Vec<Raw>,
        }

        impl SourceNode for Raw {
            type Handle = usize;

            fn kind(&self) -> &str {
                self.kind
            }

            fn text(&self) -> Option<String> {
                self.text.map(str::to_owned)
            }

            fn children(&self) -> Vec<&Raw> {
                self.children.iter().collect()
            }

            fn handle(&self) -> usize {
                self.id
            }
        }

        fn raw(id: usize, kind: &'static str, text: Option<&'static str>) -> Raw {
            Raw {
                id,
                kind,
                text,
                children: Vec::new(),
            }
        }

        fn program(leaf_text: &'static str) -> Raw {
            let mut root = raw(0, "program", None);
            root.children.push(raw(1, "identifier", Some(leaf_text)));
            root
        }

        #[test]
        fn loader_args_without_loader_is_an_error() {
            let args = LoaderArgs::Language("java");
            let result = tree_diff(&program("a"), &program("b"), None, Some(&args));
            assert!(matches!(result, Err(Error::LoaderArgsWithoutLoader)));
        }

        #[test]
        fn default_adapter_diffs_and_resolves_handles() {
            let result = tree_diff(&program("before"), &program("after"), None, None).unwrap();
            assert_eq!(result.actions.len(), 1);
            let action = &result.actions[0];
            assert!(matches!(action, Action::Update { .. }));
            // Read-through to the parser handle of the updated node.
            assert_eq!(action.orig_ref(&result.src, &result.dst), Some(&1));
        }

        #[test]
        fn custom_loader_is_used_for_both_sides() {
            fn bare_loader(
                raw: &Raw,
                _args: Option<&LoaderArgs<'_>>,
            ) -> Result<Tree<usize>, Error> {
                from_source(raw, None)
            }

            let result =
                tree_diff(&program("same"), &program("same"), Some(bare_loader), None).unwrap();
            assert!(result.actions.is_empty());
            assert_eq!(result.src.size(result.src.root()), 2);
        }
    }
}
