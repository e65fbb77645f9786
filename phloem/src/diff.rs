//! Diff entry points.
//!
//! All of these run the [`Walk`] to completion without yielding. Callers that
//! need time slicing drive a [`Walk`] themselves (or use the scheduler crate).

use crate::fiber::{Step, Walk};
use crate::node::{AttrValue, Attributes, Node};
use crate::patch::{NodePath, PatchList, PatchOp};
use crate::tree::Tree;
use crate::debug;
use std::collections::{BTreeMap, BTreeSet};

/// What to do when a child list is malformed (duplicate or mixed keys).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Skip that parent's children, report the error, keep going elsewhere.
    #[default]
    Contain,
    /// Stop the whole diff at the first error.
    Abort,
}

/// Configuration for the diff walk.
#[derive(Debug, Clone, Default)]
pub struct DiffConfig {
    /// Handling of malformed child lists
    pub error_policy: ErrorPolicy,
}

/// Diff two optional tree snapshots.
///
/// The roots are treated as child 0 of a mount container:
/// - only `new` → one `Insert`,
/// - only `old` → one `Remove`,
/// - different root types → one `Replace`, children untouched,
/// - same root type → attribute update, then children, recursively.
///
/// # Example
///
/// ```
/// use phloem::{Node, PatchOp, diff};
///
/// let old = Node::element("ul").with_children(["a", "b", "c"].map(|k| Node::element("li").with_key(k)));
/// let new = Node::element("ul").with_children(["d", "a", "b", "c"].map(|k| Node::element("li").with_key(k)));
///
/// let patches = diff(Some(&old), Some(&new));
/// assert_eq!(patches.ops.len(), 1);
/// assert!(matches!(patches.ops[0], PatchOp::Insert { index: 0, .. }));
/// ```
pub fn diff(old: Option<&Node>, new: Option<&Node>) -> PatchList {
    diff_with_config(old, new, &DiffConfig::default())
}

/// Like [`diff`], with an explicit configuration.
pub fn diff_with_config(old: Option<&Node>, new: Option<&Node>, config: &DiffConfig) -> PatchList {
    let current = old.map(Tree::from_node);
    let mut wip = new.map(Tree::from_node);
    diff_trees(current.as_ref(), wip.as_mut(), config)
}

/// Diff two arena trees.
///
/// `wip` gets its `alternate` links recorded, and parents whose children
/// could not be reconciled get the old children copied back in.
pub fn diff_trees(current: Option<&Tree>, wip: Option<&mut Tree>, config: &DiffConfig) -> PatchList {
    let mut walk = Walk::new(config.clone());
    walk.mount(current.map(|t| t.root), wip.as_ref().map(|t| t.root));
    finish(walk, current, wip)
}

/// Reconcile two child lists as if they belonged to the same parent.
///
/// Ops address the children as `[i]` relative to that parent.
///
/// If either list carries a key, both must be fully keyed. A parent cannot
/// switch its children between keyed and unkeyed in place: the old list is
/// reported as [`MixedKeying`](crate::ReconcileError::MixedKeying), and under
/// [`ErrorPolicy::Contain`] it stays committed, so later keyed renders of the
/// same parent fail the same way. Give the parent a new key or type to
/// replace it along with its children.
pub fn reconcile_children(old_children: &[Node], new_children: &[Node]) -> PatchList {
    reconcile_children_with_config(old_children, new_children, &DiffConfig::default())
}

/// Like [`reconcile_children`], with an explicit configuration.
pub fn reconcile_children_with_config(
    old_children: &[Node],
    new_children: &[Node],
    config: &DiffConfig,
) -> PatchList {
    let current = Tree::fragment(old_children);
    let mut wip = Tree::fragment(new_children);
    let mut walk = Walk::new(config.clone());
    walk.children_of(current.root, wip.root);
    finish(walk, Some(&current), Some(&mut wip))
}

fn finish(mut walk: Walk, current: Option<&Tree>, wip: Option<&mut Tree>) -> PatchList {
    let mut ops = Vec::new();
    let step = walk.run(current, wip, &mut |op| ops.push(op), &mut || false);
    debug!(
        ?step,
        units = walk.units(),
        ops = ops.len(),
        errors = walk.errors().len(),
        "diff done"
    );
    debug_assert!(step != Step::Continue);
    PatchList {
        ops,
        errors: walk.take_errors(),
    }
}

/// Set difference of two attribute mappings.
///
/// Returns the added or changed attributes with their new values, and the
/// names of removed ones. Values are compared structurally, without coercion.
pub fn diff_attributes(
    old: &Attributes,
    new: &Attributes,
) -> (BTreeMap<String, AttrValue>, BTreeSet<String>) {
    let changed = new
        .iter()
        .filter(|(name, value)| old.get(name) != Some(*value))
        .map(|(name, value)| (name.to_owned(), value.clone()))
        .collect();
    let removed = old
        .iter()
        .filter(|(name, _)| new.get(name).is_none())
        .map(|(name, _)| name.to_owned())
        .collect();
    (changed, removed)
}

/// `UpdateAttributes` for the node at `path`, if anything changed.
pub(crate) fn attribute_patch(path: &NodePath, old: &Attributes, new: &Attributes) -> Option<PatchOp> {
    if old == new {
        return None;
    }
    let (changed, removed) = diff_attributes(old, new);
    if changed.is_empty() && removed.is_empty() {
        return None;
    }
    Some(PatchOp::UpdateAttributes {
        path: path.clone(),
        changed,
        removed,
    })
}
