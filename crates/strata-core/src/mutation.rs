//! Mutation descriptions.
//!
//! A [`Mutation`] is a value describing one change to the tree. The drag
//! engine and the UI produce them; the sync coordinator applies them locally
//! and pushes them to the layer service. Nothing in this module performs I/O.

use std::fmt;

use crate::error::{InvalidMutation, Result};
use crate::node::{LayerNode, NewGroup, NodeId};
use crate::tree::LayerTree;
use crate::visibility;

/// Detach `moved_id` from `from_parent_id` and insert it under
/// `to_parent_id` at `to_index`.
///
/// `to_index` counts positions in the destination list after the node has
/// been detached. `None` parents address the root list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOp {
    pub moved_id: NodeId,
    pub from_parent_id: Option<NodeId>,
    pub to_parent_id: Option<NodeId>,
    pub to_index: usize,
}

/// Kind tag of a mutation, used in idempotency tokens and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Visibility,
    Opacity,
    Rename,
    Reorder,
    Move,
    Wrap,
    Add,
    Delete,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visibility => "visibility",
            Self::Opacity => "opacity",
            Self::Rename => "rename",
            Self::Reorder => "reorder",
            Self::Move => "move",
            Self::Wrap => "wrap",
            Self::Add => "add",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of the tree a mutation addresses, used in idempotency tokens
/// and failure reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncKey {
    /// The root-level sibling list.
    Root,
    /// A node, or the child list of a group for reorders.
    Node(NodeId),
}

impl SyncKey {
    fn parent(parent: &Option<NodeId>) -> Self {
        parent.clone().map_or(Self::Root, Self::Node)
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("<root>"),
            Self::Node(id) => write!(f, "{id}"),
        }
    }
}

/// One change to the layer tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Show or hide a leaf, or every leaf under a group.
    SetVisibility { id: NodeId, visible: bool },
    /// Change a leaf's opacity.
    SetOpacity { id: NodeId, opacity: f32 },
    /// Change a node's display name.
    Rename { id: NodeId, name: String },
    /// Replace the child order of a group or of the root list.
    Reorder {
        parent_id: Option<NodeId>,
        ordered_ids: Vec<NodeId>,
    },
    /// Move a node to another position, possibly under another parent.
    Move(MoveOp),
    /// Put a node into a new group created at the node's position.
    Wrap { moved_id: NodeId, group: NewGroup },
    /// Create a node. `index: None` appends.
    Add {
        node: LayerNode,
        parent_id: Option<NodeId>,
        index: Option<usize>,
    },
    /// Remove a node and its subtree.
    Delete { id: NodeId },
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::SetVisibility { .. } => MutationKind::Visibility,
            Self::SetOpacity { .. } => MutationKind::Opacity,
            Self::Rename { .. } => MutationKind::Rename,
            Self::Reorder { .. } => MutationKind::Reorder,
            Self::Move(_) => MutationKind::Move,
            Self::Wrap { .. } => MutationKind::Wrap,
            Self::Add { .. } => MutationKind::Add,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }

    /// The key whose latest sequence number decides staleness.
    pub fn sync_key(&self) -> SyncKey {
        match self {
            Self::SetVisibility { id, .. }
            | Self::SetOpacity { id, .. }
            | Self::Rename { id, .. }
            | Self::Delete { id } => SyncKey::Node(id.clone()),
            Self::Reorder { parent_id, .. } => SyncKey::parent(parent_id),
            Self::Move(op) => SyncKey::Node(op.moved_id.clone()),
            Self::Wrap { moved_id, .. } => SyncKey::Node(moved_id.clone()),
            Self::Add { node, .. } => SyncKey::Node(node.id.clone()),
        }
    }

    /// Apply this mutation to `tree`, returning the resulting tree.
    pub fn apply_to(&self, tree: &LayerTree) -> Result<LayerTree> {
        match self {
            Self::SetVisibility { id, visible } => {
                visibility::toggle_visibility(tree, id.as_str(), *visible).map(|(tree, _)| tree)
            }
            Self::SetOpacity { id, opacity } => visibility::set_opacity(tree, id.as_str(), *opacity),
            Self::Rename { id, name } => tree.rename(id.as_str(), name),
            Self::Reorder {
                parent_id,
                ordered_ids,
            } => tree.set_child_order(parent_id.as_ref().map(NodeId::as_str), ordered_ids),
            Self::Move(op) => tree.move_node(op),
            Self::Wrap { moved_id, group } => tree.wrap_in_group(moved_id.as_str(), group.clone()),
            Self::Add {
                node,
                parent_id,
                index,
            } => tree.insert_node(node.clone(), parent_id.as_ref().map(NodeId::as_str), *index),
            Self::Delete { id } => tree.remove_node(id.as_str()).map(|(tree, _)| tree),
        }
    }
}

/// Check that `ordered_ids` lists every current child of `parent` exactly once.
pub fn validate_permutation(tree: &LayerTree, parent: Option<&str>, ordered_ids: &[NodeId]) -> Result<()> {
    let children = tree.children_of(parent)?;
    let mut seen = std::collections::HashSet::with_capacity(ordered_ids.len());
    let mut unknown = 0;
    for id in ordered_ids {
        let is_child = children.iter().any(|c| c.id == *id);
        if !is_child || !seen.insert(id.as_str()) {
            unknown += 1;
        }
    }
    let missing = children.len() - seen.len();
    if missing > 0 || unknown > 0 {
        return Err(InvalidMutation::IncompletePermutation {
            parent: crate::error::ParentLabel(parent.map(NodeId::from)),
            missing,
            unknown,
        }
        .into());
    }
    Ok(())
}

/// Move the element at `from` to index `to`, keeping every other element's
/// relative order.
pub fn array_move<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut result = items.to_vec();
    if from >= result.len() {
        return result;
    }
    let item = result.remove(from);
    result.insert(to.min(result.len()), item);
    result
}
