//! Language-rule configuration and the default tree adapter.
//!
//! The adapter turns an external parser tree into a [`Tree`], driven by
//! per-language rules: *flattened* kinds become single labeled leaves
//! carrying their subtree text, *aliased* kinds are renamed while loading,
//! and *ignored* kinds are dropped entirely. Rules are persisted as a JSON
//! document mapping language names to rule sets and validated on load; a
//! bundled table ships with the crate.

use crate::error::Error;
use crate::tree::{NodeData, Tree};
use indextree::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Language assumed when no loader and no loader arguments are given.
pub const DEFAULT_LANGUAGE: &str = "java";

/// Loading rules for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanguageRules {
    /// Kinds whose whole subtree is loaded as a single labeled leaf.
    pub flattened: Vec<String>,
    /// Kind renames applied while loading.
    pub aliased: BTreeMap<String, String>,
    /// Kinds dropped entirely, subtree included.
    pub ignored: Vec<String>,
}

impl LanguageRules {
    /// Whether nodes of this kind collapse into a labeled leaf.
    pub fn is_flattened(&self, kind: &str) -> bool {
        self.flattened.iter().any(|k| k == kind)
    }

    /// The canonical kind to load this kind as.
    pub fn alias<'a>(&'a self, kind: &'a str) -> &'a str {
        self.aliased.get(kind).map(String::as_str).unwrap_or(kind)
    }

    /// Whether nodes of this kind are dropped while loading.
    pub fn is_ignored(&self, kind: &str) -> bool {
        self.ignored.iter().any(|k| k == kind)
    }
}

/// A validated table of per-language loading rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageRuleSet {
    languages: BTreeMap<String, LanguageRules>,
}

impl LanguageRuleSet {
    /// Parse and validate a rule document.
    pub fn from_json(document: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(document)?)
    }

    /// Rules for a language, if the table has an entry for it.
    pub fn get(&self, language: &str) -> Option<&LanguageRules> {
        self.languages.get(language)
    }

    /// The rule table bundled with the crate.
    pub fn bundled() -> &'static LanguageRuleSet {
        static BUNDLED: OnceLock<LanguageRuleSet> = OnceLock::new();
        BUNDLED.get_or_init(|| {
            Self::from_json(include_str!("../rules.json"))
                .expect("bundled rule table is valid")
        })
    }
}

/// Arguments for the default adapter: either a language resolved through
/// the bundled table, or a rule set supplied directly.
#[derive(Debug, Clone, Copy)]
pub enum LoaderArgs<'a> {
    /// Look the rules up in the bundled table; unknown languages error.
    Language(&'a str),
    /// Use these rules as-is.
    Rules(&'a LanguageRules),
}

/// The surface the default adapter needs from an external parser node.
pub trait SourceNode {
    /// Opaque handle stored as each loaded node's original reference.
    type Handle: Clone;

    /// The parser's node kind.
    fn kind(&self) -> &str;

    /// The source text this node spans, if available.
    fn text(&self) -> Option<String>;

    /// Child nodes, in order.
    fn children(&self) -> Vec<&Self>;

    /// The handle to store as the loaded node's original reference.
    fn handle(&self) -> Self::Handle;
}

/// Load a parser tree into a [`Tree`] using the default adapter.
///
/// `None` arguments mean empty rules: every node is loaded as-is, with
/// leaves labeled by their text.
pub fn from_source<S: SourceNode>(
    root: &S,
    args: Option<&LoaderArgs<'_>>,
) -> Result<Tree<S::Handle>, Error> {
    let empty;
    let rules = match args {
        None => {
            empty = LanguageRules::default();
            &empty
        }
        Some(LoaderArgs::Language(language)) => LanguageRuleSet::bundled()
            .get(language)
            .ok_or_else(|| Error::UnsupportedLanguage((*language).to_string()))?,
        Some(LoaderArgs::Rules(rules)) => rules,
    };

    let mut tree = Tree::new(node_data(root, rules));
    let root_id = tree.root();
    load_children(&mut tree, root_id, root, rules);
    Ok(tree)
}

fn node_data<S: SourceNode>(node: &S, rules: &LanguageRules) -> NodeData<S::Handle> {
    // Flattening and labeling look at the parser's kind; the alias only
    // affects the kind the node is loaded as.
    let label = if node.children().is_empty() || rules.is_flattened(node.kind()) {
        node.text()
    } else {
        None
    };

    let mut data = NodeData::new(rules.alias(node.kind()));
    if let Some(label) = label {
        data = data.with_label(label);
    }
    data.with_orig(node.handle())
}

fn load_children<S: SourceNode>(
    tree: &mut Tree<S::Handle>,
    parent: NodeId,
    node: &S,
    rules: &LanguageRules,
) {
    if rules.is_flattened(node.kind()) {
        return;
    }
    for child in node.children() {
        if rules.is_ignored(child.kind()) {
            continue;
        }
        let id = tree.add_child(parent, node_data(child, rules));
        load_children(tree, id, child, rules);
    }
}
