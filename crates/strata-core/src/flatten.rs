//! Flattening for virtualized list rendering.
//!
//! [`flatten`] turns the nested tree plus the expansion state into the flat,
//! ordered row list a virtualized or sortable list widget consumes. Large
//! sibling sets are truncated behind a synthetic [`LoadMoreItem`] until the
//! user asks for the rest.
//!
//! # Example
//!
//! ```
//! use std::collections::HashSet;
//! use strata_core::flatten::{flatten, FlattenOptions};
//! use strata_core::{LayerNode, LayerTree, NodeId};
//!
//! let children = (0..120).map(|i| LayerNode::raster(format!("tile-{i}"), format!("Tile {i}"))).collect();
//! let tree = LayerTree::from_roots(vec![LayerNode::group("tiles", "Tiles", children)]).unwrap();
//!
//! let expanded: HashSet<NodeId> = [NodeId::from("tiles")].into();
//! let rows = flatten(&tree, &expanded, &HashSet::new(), &FlattenOptions::default());
//!
//! // The group, 50 children, then one "load more" row.
//! assert_eq!(rows.len(), 52);
//! assert_eq!(rows[51].as_load_more().map(|m| m.remaining_count), Some(70));
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::EngineConfig;
use crate::logging::targets;
use crate::node::{LayerNode, NodeId, NodeType};
use crate::tree::LayerTree;
use crate::visibility::{self, CheckState};

/// Truncation thresholds for large groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenOptions {
    /// Children emitted before the "load more" row.
    pub max_initial_children: usize,
    /// Groups with at most this many children are never truncated.
    pub lazy_load_threshold: usize,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            max_initial_children: 50,
            lazy_load_threshold: 100,
        }
    }
}

impl From<&EngineConfig> for FlattenOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_initial_children: config.max_initial_children,
            lazy_load_threshold: config.lazy_load_threshold,
        }
    }
}

/// Stable key of a flattened row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    /// A real node.
    Node(NodeId),
    /// The "load more" row of a group.
    LoadMore(NodeId),
}

impl ItemKey {
    /// The node id, or `None` for a placeholder.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::Node(id) => Some(id),
            Self::LoadMore(_) => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::LoadMore(_))
    }
}

impl From<NodeId> for ItemKey {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<&str> for ItemKey {
    fn from(id: &str) -> Self {
        Self::Node(NodeId::from(id))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "{id}"),
            Self::LoadMore(parent) => write!(f, "{parent}-load-more"),
        }
    }
}

/// A real node row.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatNode {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    pub parent_id: Option<NodeId>,
    pub depth: usize,
    /// Index among all siblings, not only the emitted ones.
    pub index: usize,
    pub has_children: bool,
    pub is_expanded: bool,
    pub is_last_child: bool,
    /// Checkbox state; a leaf's own visibility for leaves.
    pub check_state: CheckState,
    /// Leaf opacity. Groups have none.
    pub opacity: Option<f32>,
}

/// Placeholder standing in for the children not yet shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreItem {
    pub parent_id: NodeId,
    /// Depth of the hidden children.
    pub depth: usize,
    pub remaining_count: usize,
}

/// One row of the flattened list.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatItem {
    Node(FlatNode),
    LoadMore(LoadMoreItem),
}

impl FlatItem {
    pub fn key(&self) -> ItemKey {
        match self {
            Self::Node(node) => ItemKey::Node(node.id.clone()),
            Self::LoadMore(item) => ItemKey::LoadMore(item.parent_id.clone()),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Node(node) => node.depth,
            Self::LoadMore(item) => item.depth,
        }
    }

    /// Parent of the row. For a placeholder, the group it belongs to.
    pub fn parent_id(&self) -> Option<&NodeId> {
        match self {
            Self::Node(node) => node.parent_id.as_ref(),
            Self::LoadMore(item) => Some(&item.parent_id),
        }
    }

    pub fn as_node(&self) -> Option<&FlatNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::LoadMore(_) => None,
        }
    }

    pub fn as_load_more(&self) -> Option<&LoadMoreItem> {
        match self {
            Self::LoadMore(item) => Some(item),
            Self::Node(_) => None,
        }
    }
}

/// Ids of the real node rows, placeholders excluded.
pub fn item_ids(items: &[FlatItem]) -> Vec<NodeId> {
    items
        .iter()
        .filter_map(|item| item.as_node().map(|node| node.id.clone()))
        .collect()
}

struct Flattener<'a> {
    expanded: &'a HashSet<NodeId>,
    loaded: &'a HashSet<NodeId>,
    options: &'a FlattenOptions,
    states: HashMap<NodeId, CheckState>,
    rows: Vec<FlatItem>,
}

impl Flattener<'_> {
    fn emit_level(&mut self, siblings: &[LayerNode], parent_id: Option<&NodeId>, depth: usize) {
        let count = siblings.len();
        for (index, node) in siblings.iter().enumerate() {
            self.emit_node(node, parent_id, depth, index, index + 1 == count);
        }
    }

    fn emit_node(&mut self, node: &LayerNode, parent_id: Option<&NodeId>, depth: usize, index: usize, is_last: bool) {
        let children = node.children();
        let is_expanded = node.is_group() && self.expanded.contains(&node.id);
        let check_state = match node.visible() {
            Some(visible) => {
                if visible {
                    CheckState::AllOn
                } else {
                    CheckState::AllOff
                }
            }
            None => self.states.get(&node.id).copied().unwrap_or(CheckState::AllOff),
        };

        self.rows.push(FlatItem::Node(FlatNode {
            id: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type(),
            parent_id: parent_id.cloned(),
            depth,
            index,
            has_children: !children.is_empty(),
            is_expanded,
            is_last_child: is_last,
            check_state,
            opacity: node.opacity(),
        }));

        if !is_expanded || children.is_empty() {
            return;
        }

        let show_all = children.len() <= self.options.lazy_load_threshold || self.loaded.contains(&node.id);
        if show_all {
            self.emit_level(children, Some(&node.id), depth + 1);
            return;
        }

        let shown = self.options.max_initial_children.min(children.len());
        for (index, child) in children[..shown].iter().enumerate() {
            self.emit_node(child, Some(&node.id), depth + 1, index, index + 1 == children.len());
        }
        let remaining_count = children.len() - shown;
        if remaining_count > 0 {
            self.rows.push(FlatItem::LoadMore(LoadMoreItem {
                parent_id: node.id.clone(),
                depth: depth + 1,
                remaining_count,
            }));
        }
    }
}

/// Flatten `tree` depth-first into list rows.
///
/// Children of a group are emitted only when the group is in `expanded`.
/// Groups with more than `lazy_load_threshold` children that are not in
/// `loaded` show their first `max_initial_children` children followed by
/// one [`LoadMoreItem`].
#[tracing::instrument(skip_all, target = "strata_core::flatten", level = "trace")]
pub fn flatten(
    tree: &LayerTree,
    expanded: &HashSet<NodeId>,
    loaded: &HashSet<NodeId>,
    options: &FlattenOptions,
) -> Vec<FlatItem> {
    let mut flattener = Flattener {
        expanded,
        loaded,
        options,
        states: visibility::state_map(tree),
        rows: Vec::with_capacity(tree.roots().len()),
    };
    flattener.emit_level(tree.roots(), None, 0);
    tracing::trace!(target: targets::FLATTEN, rows = flattener.rows.len(), "flattened tree");
    flattener.rows
}
