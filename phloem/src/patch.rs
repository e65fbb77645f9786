//! Patch operations emitted by the diff.

use crate::error::ReconcileError;
use crate::node::{AttrValue, Node};
use core::fmt;
use facet::Facet;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

/// A path to a node in the live host tree.
///
/// Each element is a child index, starting from the mount container. In a
/// whole-tree diff the root node is `[0]`; when reconciling a bare child list
/// the children are `[i]`.
///
/// Uses `SmallVec<[u32; 16]>` so typical depths stay off the heap. Child
/// lists are therefore limited to `u32::MAX` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Facet)]
#[facet(transparent)]
pub struct NodePath(pub SmallVec<[u32; 16]>);

impl NodePath {
    /// The mount container.
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Path of the `index`th child of this node.
    ///
    /// `index` must fit in a `u32`; see [`try_child`](Self::try_child).
    pub fn child(&self, index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "child index {index} overflows u32");
        let mut path = self.clone();
        path.0.push(index as u32);
        path
    }

    /// Path of the `index`th child, or `None` if `index` does not fit in a `u32`.
    pub fn try_child(&self, index: usize) -> Option<Self> {
        let index = u32::try_from(index).ok()?;
        let mut path = self.clone();
        path.0.push(index);
        Some(path)
    }

    /// Split into parent path and last index.
    pub fn split_last(&self) -> Option<(&[u32], u32)> {
        self.0.split_last().map(|(last, rest)| (rest, *last))
    }

    /// Number of steps from the mount container.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the mount container itself.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", idx)?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[u32; N]> for NodePath {
    fn from(indices: [u32; N]) -> Self {
        Self(indices.into_iter().collect())
    }
}

/// A primitive host mutation.
///
/// Indices are relative to the host state after every previously emitted op
/// has been applied, so ops must be applied in emission order.
#[derive(Debug, Clone, PartialEq, Facet)]
#[repr(u8)]
pub enum PatchOp {
    /// Insert a new subtree as child `index` of `parent`.
    Insert {
        /// Parent node
        parent: NodePath,
        /// Position the node occupies once inserted
        index: usize,
        /// The subtree to create
        node: Node,
    },

    /// Remove child `at_old_index` of `parent` along with its subtree.
    Remove {
        /// Parent node
        parent: NodePath,
        /// Position of the child being removed
        at_old_index: usize,
    },

    /// Move a child of `parent` to a new position among its siblings.
    Move {
        /// Parent node
        parent: NodePath,
        /// Current position of the child
        from_old_index: usize,
        /// Position of the child after the move
        to_new_index: usize,
    },

    /// Update the attributes of the node at `path`.
    UpdateAttributes {
        /// The node
        path: NodePath,
        /// Added or changed attributes with their new values
        changed: BTreeMap<String, AttrValue>,
        /// Attributes to remove
        removed: BTreeSet<String>,
    },

    /// Discard the subtree at `path` and build `new` in its place.
    Replace {
        /// The node being replaced
        path: NodePath,
        /// The subtree being discarded
        old: Node,
        /// The subtree replacing it
        new: Node,
    },
}

impl PatchOp {
    /// Whether this op changes the child list of a parent.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PatchOp::Insert { .. } | PatchOp::Remove { .. } | PatchOp::Move { .. }
        )
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOp::Insert {
                parent,
                index,
                node,
            } => write!(f, "Insert({} @{} under {})", node.type_id, index, parent),
            PatchOp::Remove {
                parent,
                at_old_index,
            } => write!(f, "Remove(@{} under {})", at_old_index, parent),
            PatchOp::Move {
                parent,
                from_old_index,
                to_new_index,
            } => write!(
                f,
                "Move(@{} → @{} under {})",
                from_old_index, to_new_index, parent
            ),
            PatchOp::UpdateAttributes {
                path,
                changed,
                removed,
            } => {
                write!(f, "UpdateAttrs({}", path)?;
                for (name, value) in changed {
                    write!(f, " {}={}", name, value)?;
                }
                for name in removed {
                    write!(f, " -{}", name)?;
                }
                write!(f, ")")
            }
            PatchOp::Replace { path, old, new } => {
                write!(f, "Replace({} {} → {})", path, old.type_id, new.type_id)
            }
        }
    }
}

/// Output of a diff: the ops to apply plus any contained errors.
///
/// When `errors` is non-empty, the parents it names were left alone; every op
/// in `ops` is still valid to apply.
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct PatchList {
    /// Ops in emission order
    pub ops: Vec<PatchOp>,
    /// Per-subtree errors
    pub errors: Vec<ReconcileError>,
}

impl PatchList {
    /// Whether there are no ops and no errors.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.errors.is_empty()
    }

    /// Whether any subtree failed to reconcile.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Iterate over the ops.
    pub fn iter(&self) -> core::slice::Iter<'_, PatchOp> {
        self.ops.iter()
    }
}

impl<'a> IntoIterator for &'a PatchList {
    type Item = &'a PatchOp;
    type IntoIter = core::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
