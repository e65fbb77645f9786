//! # Phloem
//!
//! Incremental tree reconciliation: diff two snapshots of an abstract node
//! tree and get back the minimal-ish list of host mutations that turns one
//! into the other.
//!
//! Named after the living tissue that carries sap down from the leaves.
//!
//! ## Algorithm Overview
//!
//! - Roots (and any two nodes at the same position) are compared by type.
//!   Different types mean the whole subtree is replaced.
//! - Same types get an attribute set-difference, then their children are
//!   reconciled.
//! - Child lists where every child has a key are matched by key, with moves
//!   for reordered children. Unkeyed lists are matched by position.
//! - Duplicate keys, or keyed and unkeyed children under one parent across
//!   the old and new lists, are errors.
//!   By default they are contained to the parent that has them.
//!
//! The walk is resumable ([`Walk`]): it does one unit of work per step and
//! can be paused between any two steps. The `phloem-scheduler` crate builds
//! prioritized, interruptible render passes on top of it.
//!
//! ## Usage
//!
//! ```
//! use phloem::{Node, apply_patches, diff};
//!
//! let old = Node::element("ul").with_children(["a", "b", "c"].map(|k| Node::element("li").with_key(k)));
//! let new = Node::element("ul").with_children(["c", "a", "b"].map(|k| Node::element("li").with_key(k)));
//!
//! let patches = diff(Some(&old), Some(&new));
//! for op in &patches {
//!     println!("{op}");
//! }
//!
//! let mut host = vec![old];
//! apply_patches(&mut host, &patches).unwrap();
//! assert_eq!(host, vec![new]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

pub use indextree;

mod tracing_macros;
pub(crate) use tracing_macros::{debug, trace, warn};

mod apply;
mod diff;
/// Errors reported by the diff and the reference applier
pub mod error;
/// Resumable diff walk
pub mod fiber;
mod keyed;
/// Abstract node model
pub mod node;
/// Patch operations
pub mod patch;
/// Arena representation of a node tree
pub mod tree;

pub use apply::{apply_patch, apply_patches};
pub use diff::{
    DiffConfig, ErrorPolicy, diff, diff_attributes, diff_trees, diff_with_config,
    reconcile_children, reconcile_children_with_config,
};
pub use error::{ApplyError, ErrorKind, ReconcileError, Snapshot};
pub use fiber::{Step, Walk, WorkItem};
pub use node::{AttrValue, Attributes, Key, Node, NodeType, TEXT_ATTR};
pub use patch::{NodePath, PatchList, PatchOp};
pub use tree::{NodeData, Tree};
