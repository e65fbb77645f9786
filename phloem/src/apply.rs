//! Apply patches to a plain [`Node`] host.
//!
//! This is the reference host: `apply(A, diff(A, B)) == B`. Real hosts map
//! the same ops onto their own tree (a DOM, a widget toolkit, a terminal
//! buffer), but should end up in the same shape.

use crate::error::ApplyError;
use crate::node::Node;
use crate::patch::{NodePath, PatchOp};

/// Apply `ops` in order to the children of a mount container.
///
/// For a whole-tree diff the container holds at most one node, the root.
///
/// ```
/// use phloem::{Node, apply_patches, diff};
///
/// let old = Node::element("p").with_child(Node::text("hi"));
/// let new = Node::element("p").with_attr("class", "greeting").with_child(Node::text("hello"));
///
/// let mut host = vec![old.clone()];
/// apply_patches(&mut host, &diff(Some(&old), Some(&new))).unwrap();
/// assert_eq!(host, vec![new]);
/// ```
pub fn apply_patches<'a>(
    container: &mut Vec<Node>,
    ops: impl IntoIterator<Item = &'a PatchOp>,
) -> Result<(), ApplyError> {
    for op in ops {
        apply_patch(container, op)?;
    }
    Ok(())
}

/// Apply one op to the children of a mount container.
pub fn apply_patch(container: &mut Vec<Node>, op: &PatchOp) -> Result<(), ApplyError> {
    match op {
        PatchOp::Insert {
            parent,
            index,
            node,
        } => {
            let children = children_mut(container, parent)?;
            if *index > children.len() {
                return Err(ApplyError::IndexOutOfBounds {
                    index: *index,
                    len: children.len(),
                });
            }
            children.insert(*index, node.clone());
        }
        PatchOp::Remove {
            parent,
            at_old_index,
        } => {
            let children = children_mut(container, parent)?;
            check_index(children, *at_old_index)?;
            children.remove(*at_old_index);
        }
        PatchOp::Move {
            parent,
            from_old_index,
            to_new_index,
        } => {
            let children = children_mut(container, parent)?;
            check_index(children, *from_old_index)?;
            // `to_new_index` counts positions with the moved child taken out.
            let remaining = children.len() - 1;
            if *to_new_index > remaining {
                return Err(ApplyError::IndexOutOfBounds {
                    index: *to_new_index,
                    len: remaining,
                });
            }
            let node = children.remove(*from_old_index);
            children.insert(*to_new_index, node);
        }
        PatchOp::UpdateAttributes {
            path,
            changed,
            removed,
        } => {
            let node = node_mut(container, path)?;
            for name in removed {
                node.attributes.remove(name);
            }
            for (name, value) in changed {
                node.attributes.set(name.clone(), value.clone());
            }
        }
        PatchOp::Replace { path, new, .. } => {
            *node_mut(container, path)? = new.clone();
        }
    }
    Ok(())
}

fn check_index(children: &[Node], index: usize) -> Result<(), ApplyError> {
    if index < children.len() {
        Ok(())
    } else {
        Err(ApplyError::IndexOutOfBounds {
            index,
            len: children.len(),
        })
    }
}

fn children_mut<'a>(container: &'a mut Vec<Node>, path: &NodePath) -> Result<&'a mut Vec<Node>, ApplyError> {
    let mut children = container;
    for &index in path.0.iter() {
        children = &mut children
            .get_mut(index as usize)
            .ok_or(ApplyError::PathOutOfBounds { index })?
            .children;
    }
    Ok(children)
}

fn node_mut<'a>(container: &'a mut Vec<Node>, path: &NodePath) -> Result<&'a mut Node, ApplyError> {
    let (parent, index) = path.split_last().ok_or(ApplyError::EmptyPath)?;
    let mut children = container;
    for &step in parent {
        children = &mut children
            .get_mut(step as usize)
            .ok_or(ApplyError::PathOutOfBounds { index: step })?
            .children;
    }
    children
        .get_mut(index as usize)
        .ok_or(ApplyError::PathOutOfBounds { index })
}
