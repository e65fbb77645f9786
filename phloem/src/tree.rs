//! Arena-backed trees.
//!
//! Current and Work-In-Progress are both [`Tree`]s. Referring to nodes by
//! [`NodeId`] keeps the walk free of borrows into either tree, which is what
//! lets a pass be suspended and resumed between calls.

use crate::node::{Attributes, Key, Node, NodeType};
use indextree::{Arena, NodeId};
use smallvec::SmallVec;

/// Data stored per arena node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    /// Node type
    pub type_id: NodeType,
    /// Sibling key
    pub key: Option<Key>,
    /// Attributes
    pub attributes: Attributes,
    /// The Current-tree node this node was matched against in the last pass.
    pub alternate: Option<NodeId>,
}

impl NodeData {
    fn from_node(node: &Node) -> Self {
        Self {
            type_id: node.type_id.clone(),
            key: node.key.clone(),
            attributes: node.attributes.clone(),
            alternate: None,
        }
    }
}

/// Child id list, inline for typical fan-out.
pub type ChildIds = SmallVec<[NodeId; 8]>;

/// A tree stored in an [`indextree::Arena`].
#[derive(Debug, Clone)]
pub struct Tree {
    arena: Arena<NodeData>,
    /// Root node
    pub root: NodeId,
}

impl Tree {
    /// Create a tree holding a single node.
    pub fn new(data: NodeData) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(data);
        Self { arena, root }
    }

    /// Build a tree from a node snapshot.
    pub fn from_node(node: &Node) -> Self {
        let mut arena = Arena::with_capacity(node.subtree_len());
        let root = arena.new_node(NodeData::from_node(node));
        let mut tree = Self { arena, root };
        tree.add_children(root, &node.children);
        tree
    }

    /// Build a tree whose root is a [`NodeType::Fragment`] holding `children`.
    pub fn fragment(children: &[Node]) -> Self {
        let mut tree = Self::new(NodeData::from_node(&Node::fragment()));
        let root = tree.root;
        tree.add_children(root, children);
        tree
    }

    fn add_children(&mut self, parent: NodeId, children: &[Node]) {
        for child in children {
            let id = self.add_child(parent, NodeData::from_node(child));
            self.add_children(id, &child.children);
        }
    }

    /// Append a new node as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.arena.new_node(data);
        parent.append(id, &mut self.arena);
        id
    }

    /// Get a node's data.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    pub fn get(&self, id: NodeId) -> &NodeData {
        self.arena[id].get()
    }

    /// Get a node's data mutably.
    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.arena[id].get_mut()
    }

    /// Iterate over the children of `id` in order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Collect the children of `id`.
    pub fn child_ids(&self, id: NodeId) -> ChildIds {
        self.children(id).collect()
    }

    /// Number of children of `id`.
    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).count()
    }

    /// Parent of `id`, if any.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    /// Number of live nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.root.descendants(&self.arena).count()
    }

    /// Rebuild the owned snapshot for the subtree at `id`.
    pub fn to_node(&self, id: NodeId) -> Node {
        let data = self.get(id);
        Node {
            type_id: data.type_id.clone(),
            key: data.key.clone(),
            attributes: data.attributes.clone(),
            children: self.children(id).map(|c| self.to_node(c)).collect(),
        }
    }

    /// Snapshot of the whole tree.
    pub fn to_root_node(&self) -> Node {
        self.to_node(self.root)
    }

    /// Replace the children of `parent` with copies of the children of
    /// `source_parent` in `source`.
    ///
    /// Copied nodes get their source node as `alternate`.
    pub fn graft_children(&mut self, parent: NodeId, source: &Tree, source_parent: NodeId) {
        for child in self.child_ids(parent) {
            child.remove_subtree(&mut self.arena);
        }
        for child in source.children(source_parent) {
            self.copy_subtree(parent, source, child);
        }
    }

    fn copy_subtree(&mut self, parent: NodeId, source: &Tree, source_id: NodeId) {
        let mut data = source.get(source_id).clone();
        data.alternate = Some(source_id);
        let id = self.add_child(parent, data);
        for child in source.children(source_id) {
            self.copy_subtree(id, source, child);
        }
    }

    /// Clear every `alternate` link.
    pub fn clear_alternates(&mut self) {
        let ids: Vec<NodeId> = self.root.descendants(&self.arena).collect();
        for id in ids {
            self.get_mut(id).alternate = None;
        }
    }
}

impl From<&Node> for Tree {
    fn from(node: &Node) -> Self {
        Tree::from_node(node)
    }
}
