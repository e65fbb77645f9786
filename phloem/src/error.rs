//! Errors reported by the diff and the reference applier.

use crate::node::Key;
use crate::patch::NodePath;
use core::fmt;
use facet::Facet;

/// Which snapshot a structural error was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Snapshot {
    /// The tree being diffed from
    Old,
    /// The tree being diffed to
    New,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Old => write!(f, "old"),
            Snapshot::New => write!(f, "new"),
        }
    }
}

/// Kind of a [`ReconcileError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Two siblings share a key
    DuplicateKey,
    /// Some but not all siblings carry a key
    MixedKeying,
}

/// A malformed child list. The parent it names is left unreconciled.
#[derive(Facet, Debug, Clone, PartialEq)]
#[facet(derive(Error))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum ReconcileError {
    /// duplicate key {key} among the children of {parent} in the {snapshot} tree
    DuplicateKey {
        parent: NodePath,
        snapshot: Snapshot,
        key: Key,
        affected_children: Vec<usize>,
    },

    /// unkeyed children under {parent} in the {snapshot} tree while other children there are keyed
    MixedKeying {
        parent: NodePath,
        snapshot: Snapshot,
        affected_children: Vec<usize>,
    },
}

impl ReconcileError {
    /// The parent whose children were not reconciled.
    pub fn parent(&self) -> &NodePath {
        match self {
            ReconcileError::DuplicateKey { parent, .. }
            | ReconcileError::MixedKeying { parent, .. } => parent,
        }
    }

    /// What went wrong.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            ReconcileError::MixedKeying { .. } => ErrorKind::MixedKeying,
        }
    }

    /// The snapshot holding the malformed list.
    pub fn snapshot(&self) -> Snapshot {
        match self {
            ReconcileError::DuplicateKey { snapshot, .. }
            | ReconcileError::MixedKeying { snapshot, .. } => *snapshot,
        }
    }

    /// Indices of the offending children within their snapshot's list.
    ///
    /// For duplicate keys, every child carrying the key. For mixed keying,
    /// the unkeyed children. Keying is checked across both snapshots, so a
    /// fully unkeyed old list reports all of its children when the new list
    /// is keyed.
    pub fn affected_children(&self) -> &[usize] {
        match self {
            ReconcileError::DuplicateKey {
                affected_children, ..
            }
            | ReconcileError::MixedKeying {
                affected_children, ..
            } => affected_children,
        }
    }
}

/// Errors from [`apply_patches`](crate::apply_patches).
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum ApplyError {
    /// path index {index} out of bounds
    PathOutOfBounds { index: u32 },

    /// child index {index} out of bounds for {len} children
    IndexOutOfBounds { index: usize, len: usize },

    /// cannot replace the mount container
    EmptyPath,
}
