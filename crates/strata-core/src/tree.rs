//! The canonical layer tree.
//!
//! [`LayerTree`] owns the root-level sibling list together with an index from
//! node id to [`NodeLocation`]. The index makes lookups O(1) and answers
//! "who is the parent of X" without storing parents on nodes.
//!
//! Every mutator borrows the tree and returns a new one, so the previous
//! snapshot stays valid for rollback. Structural mutators rebuild the index
//! and renormalize `order` for every sibling list they touch.
//!
//! # Example
//!
//! ```
//! use strata_core::{LayerNode, LayerTree, NodeId};
//!
//! let tree = LayerTree::from_roots(vec![
//!     LayerNode::group("base", "Base maps", vec![
//!         LayerNode::raster("osm", "OpenStreetMap"),
//!         LayerNode::raster("sat", "Satellite"),
//!     ]),
//! ])?;
//!
//! assert_eq!(tree.path_to("sat"), vec!["Base maps", "Satellite"]);
//!
//! let reordered = tree.set_child_order(Some("base"), &[NodeId::from("sat"), NodeId::from("osm")])?;
//! assert_eq!(reordered.find("osm").map(|n| n.order), Some(1));
//! # Ok::<(), strata_core::TreeError>(())
//! ```

use std::collections::HashMap;

use crate::error::{InvalidMutation, Result, TreeError};
use crate::logging::targets;
use crate::mutation::MoveOp;
use crate::node::{LayerNode, NewGroup, NodeId};

/// Position of a node in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocation {
    /// Parent group, or `None` at root level.
    pub parent: Option<NodeId>,
    /// Child indices from the root list down to the node.
    pub path: Vec<usize>,
}

impl NodeLocation {
    /// Zero-based depth (root-level nodes are at depth 0).
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Index among siblings.
    pub fn index(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }
}

/// A node removed from the tree, with the placement it had.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    /// The detached subtree.
    pub node: LayerNode,
    /// Parent it was removed from.
    pub parent_id: Option<NodeId>,
    /// Index it held among its siblings.
    pub index: usize,
}

/// A singly-rooted, id-indexed layer tree.
#[derive(Debug, Clone, Default)]
pub struct LayerTree {
    roots: Vec<LayerNode>,
    index: HashMap<NodeId, NodeLocation>,
}

impl PartialEq for LayerTree {
    fn eq(&self, other: &Self) -> bool {
        self.roots == other.roots
    }
}

impl LayerTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from root-level siblings.
    ///
    /// Array position is authoritative: `order` is rewritten to match it at
    /// every level. Fails with [`InvalidMutation::DuplicateId`] when two
    /// nodes share an id.
    #[tracing::instrument(skip_all, target = "strata_core::tree", level = "trace")]
    pub fn from_roots(mut roots: Vec<LayerNode>) -> Result<Self> {
        normalize_all(&mut roots);
        Self::indexed(roots)
    }

    fn indexed(roots: Vec<LayerNode>) -> Result<Self> {
        let mut index = HashMap::new();
        let mut duplicate = None;
        collect_locations(&roots, None, &mut Vec::new(), &mut index, &mut duplicate);
        if let Some(id) = duplicate {
            return Err(InvalidMutation::DuplicateId(id).into());
        }
        tracing::trace!(target: targets::TREE, nodes = index.len(), "rebuilt layer index");
        Ok(Self { roots, index })
    }

    /// Rebuild for a tree whose ids are known to be unique.
    fn indexed_subset(roots: Vec<LayerNode>) -> Self {
        let mut index = HashMap::new();
        collect_locations(&roots, None, &mut Vec::new(), &mut index, &mut None);
        Self { roots, index }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Root-level siblings in order.
    pub fn roots(&self) -> &[LayerNode] {
        &self.roots
    }

    /// Consume the tree, returning its root-level siblings.
    pub fn into_roots(self) -> Vec<LayerNode> {
        self.roots
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Index lookup of a node.
    pub fn find(&self, id: &str) -> Option<&LayerNode> {
        let location = self.index.get(id)?;
        node_at(&self.roots, &location.path)
    }

    /// Depth-first search without the index.
    ///
    /// Prefer [`find`](Self::find) on hot paths; this walks the whole tree.
    pub fn find_by_id(&self, id: &str) -> Result<&LayerNode> {
        self.roots
            .iter()
            .find_map(|root| root.find(id))
            .ok_or_else(|| TreeError::not_found(id))
    }

    /// Where a node sits in the tree.
    pub fn location(&self, id: &str) -> Option<&NodeLocation> {
        self.index.get(id)
    }

    /// Parent of a node, `Ok(None)` at root level.
    pub fn parent_of(&self, id: &str) -> Result<Option<&NodeId>> {
        self.index
            .get(id)
            .map(|location| location.parent.as_ref())
            .ok_or_else(|| TreeError::not_found(id))
    }

    /// Index of a node among its siblings.
    pub fn index_in_parent(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .map(NodeLocation::index)
            .ok_or_else(|| TreeError::not_found(id))
    }

    /// Children of a group, or the root list for `None`.
    pub fn children_of(&self, parent: Option<&str>) -> Result<&[LayerNode]> {
        let Some(parent_id) = parent else {
            return Ok(&self.roots);
        };
        let node = self.find(parent_id).ok_or_else(|| TreeError::not_found(parent_id))?;
        if !node.is_group() {
            return Err(InvalidMutation::NotAGroup(node.id.clone()).into());
        }
        Ok(node.children())
    }

    /// Names from the root down to `id`, or empty if `id` is unknown.
    pub fn path_to(&self, id: &str) -> Vec<String> {
        let Some(location) = self.index.get(id) else {
            return Vec::new();
        };
        let mut names = Vec::with_capacity(location.path.len());
        let mut level = self.roots.as_slice();
        for &i in &location.path {
            let Some(node) = level.get(i) else {
                break;
            };
            names.push(node.name.clone());
            level = node.children();
        }
        names
    }

    /// Ancestor ids, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.index.get(id).and_then(|l| l.parent.as_ref());
        while let Some(parent) = current {
            ancestors.push(parent.clone());
            current = self.index.get(parent.as_str()).and_then(|l| l.parent.as_ref());
        }
        ancestors
    }

    /// Whether `id` lies strictly inside the subtree of `ancestor`.
    pub fn is_descendant_of(&self, id: &str, ancestor: &str) -> bool {
        let mut current = self.index.get(id).and_then(|l| l.parent.as_ref());
        while let Some(parent) = current {
            if parent.as_str() == ancestor {
                return true;
            }
            current = self.index.get(parent.as_str()).and_then(|l| l.parent.as_ref());
        }
        false
    }

    /// Ids of every node below `id`, in pre-order.
    pub fn descendant_ids(&self, id: &str) -> Result<Vec<NodeId>> {
        let node = self.find(id).ok_or_else(|| TreeError::not_found(id))?;
        let mut ids = Vec::new();
        for child in node.children() {
            child.visit(&mut |n| ids.push(n.id.clone()));
        }
        Ok(ids)
    }

    /// Leaf ids in the subtree of `id`, including `id` when it is a leaf.
    pub fn leaf_ids(&self, id: &str) -> Result<Vec<NodeId>> {
        let node = self.find(id).ok_or_else(|| TreeError::not_found(id))?;
        let mut ids = Vec::new();
        node.visit(&mut |n| {
            if !n.is_group() {
                ids.push(n.id.clone());
            }
        });
        Ok(ids)
    }

    /// Ids of every group in the tree, in pre-order.
    pub fn group_ids(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.is_group())
            .map(|n| n.id.clone())
            .collect()
    }

    /// Pre-order iterator over every node.
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes {
            stack: self.roots.iter().rev().collect(),
        }
    }

    /// Keep nodes whose name contains `query` (ignoring case), plus their
    /// ancestors.
    ///
    /// Matching groups keep only matching or match-containing children. A
    /// blank query returns the tree unchanged.
    #[tracing::instrument(skip_all, target = "strata_core::tree", level = "trace")]
    pub fn filter_by_substring(&self, query: &str) -> LayerTree {
        let query = query.trim();
        if query.is_empty() {
            return self.clone();
        }
        let needle = query.to_lowercase();
        let mut roots: Vec<LayerNode> = self
            .roots
            .iter()
            .filter_map(|node| filter_node(node, &needle))
            .collect();
        renormalize(&mut roots);
        let filtered = Self::indexed_subset(roots);
        tracing::trace!(target: targets::TREE, query, kept = filtered.len(), total = self.len(), "filtered tree");
        filtered
    }

    // ========================================================================
    // Structural mutators
    // ========================================================================

    /// Replace the children of `parent` (or the root list) in the given order.
    ///
    /// Current children missing from `ordered_ids` are dropped; ids that are
    /// not current children are ignored. Callers pass a complete permutation.
    #[tracing::instrument(skip_all, target = "strata_core::tree", level = "trace")]
    pub fn set_child_order(&self, parent: Option<&str>, ordered_ids: &[NodeId]) -> Result<LayerTree> {
        self.children_of(parent)?;
        let mut roots = self.roots.clone();
        let children = child_list_mut(&mut roots, parent)?;

        let mut pool: HashMap<NodeId, LayerNode> =
            children.drain(..).map(|n| (n.id.clone(), n)).collect();
        children.extend(ordered_ids.iter().filter_map(|id| pool.remove(id.as_str())));
        renormalize(children);

        if !pool.is_empty() {
            tracing::debug!(
                target: targets::TREE,
                parent = ?parent,
                dropped = pool.len(),
                "child order omitted current children"
            );
        }
        Self::indexed(roots)
    }

    /// Detach a node and attach it under another parent.
    ///
    /// `to_index` is measured after the detach and clamped to the length of
    /// the destination list. Moving a node into itself or its own subtree
    /// fails with [`InvalidMutation::Cycle`].
    #[tracing::instrument(skip_all, target = "strata_core::tree", level = "trace")]
    pub fn move_node(&self, op: &MoveOp) -> Result<LayerTree> {
        let moved = op.moved_id.as_str();
        let location = self.index.get(moved).ok_or_else(|| TreeError::not_found(moved))?;
        let target = op.to_parent_id.as_ref().map(NodeId::as_str);

        if let Some(target) = target {
            if target == moved || self.is_descendant_of(target, moved) {
                return Err(InvalidMutation::Cycle {
                    moved: op.moved_id.clone(),
                    target: NodeId::from(target),
                }
                .into());
            }
            self.children_of(Some(target))?;
        }

        let mut roots = self.roots.clone();
        let node = detach(&mut roots, location).ok_or_else(|| TreeError::not_found(moved))?;
        let destination = child_list_mut(&mut roots, target)?;
        let at = op.to_index.min(destination.len());
        destination.insert(at, node);
        renormalize(destination);

        tracing::trace!(target: targets::TREE, moved, to = ?target, index = at, "moved node");
        Self::indexed(roots)
    }

    /// Insert a new subtree under `parent`, appending when `index` is `None`.
    #[tracing::instrument(skip_all, target = "strata_core::tree", level = "trace")]
    pub fn insert_node(&self, mut node: LayerNode, parent: Option<&str>, index: Option<usize>) -> Result<LayerTree> {
        let mut clash = None;
        node.visit(&mut |n| {
            if clash.is_none() && self.contains(n.id.as_str()) {
                clash = Some(n.id.clone());
            }
        });
        if let Some(id) = clash {
            return Err(InvalidMutation::DuplicateId(id).into());
        }
        self.children_of(parent)?;

        if let Some(children) = node.children_mut() {
            normalize_all(children);
        }

        let mut roots = self.roots.clone();
        let list = child_list_mut(&mut roots, parent)?;
        let at = match index {
            Some(i) if i > list.len() => {
                return Err(InvalidMutation::IndexOutOfRange {
                    index: i,
                    len: list.len(),
                }
                .into());
            }
            Some(i) => i,
            None => list.len(),
        };
        list.insert(at, node);
        renormalize(list);
        Self::indexed(roots)
    }

    /// Remove a node and its subtree.
    #[tracing::instrument(skip_all, target = "strata_core::tree", level = "trace")]
    pub fn remove_node(&self, id: &str) -> Result<(LayerTree, RemovedNode)> {
        let location = self.index.get(id).ok_or_else(|| TreeError::not_found(id))?;
        let mut roots = self.roots.clone();
        let node = detach(&mut roots, location).ok_or_else(|| TreeError::not_found(id))?;
        let removed = RemovedNode {
            node,
            parent_id: location.parent.clone(),
            index: location.index(),
        };
        Ok((Self::indexed_subset(roots), removed))
    }

    /// Replace a node with a new group that contains it, at the same position.
    #[tracing::instrument(skip_all, target = "strata_core::tree", level = "trace")]
    pub fn wrap_in_group(&self, id: &str, group: NewGroup) -> Result<LayerTree> {
        if self.contains(group.id.as_str()) {
            return Err(InvalidMutation::DuplicateId(group.id).into());
        }
        let location = self.index.get(id).ok_or_else(|| TreeError::not_found(id))?;
        let mut roots = self.roots.clone();
        let mut node = detach(&mut roots, location).ok_or_else(|| TreeError::not_found(id))?;
        node.order = 0;

        let mut wrapper = group.into_node();
        if let Some(children) = wrapper.children_mut() {
            children.push(node);
        }
        let list = child_list_mut(&mut roots, location.parent.as_ref().map(NodeId::as_str))?;
        list.insert(location.index().min(list.len()), wrapper);
        renormalize(list);
        Self::indexed(roots)
    }

    /// Swap in a new version of an existing subtree, keeping its position.
    pub fn replace_subtree(&self, mut node: LayerNode) -> Result<LayerTree> {
        let location = self
            .index
            .get(node.id.as_str())
            .ok_or_else(|| TreeError::not_found(node.id.clone()))?;
        let mut roots = self.roots.clone();
        let slot = node_at_mut(&mut roots, &location.path)
            .ok_or_else(|| TreeError::not_found(node.id.clone()))?;
        node.order = slot.order;
        if let Some(children) = node.children_mut() {
            normalize_all(children);
        }
        *slot = node;
        Self::indexed(roots)
    }

    /// Change a node's id, e.g. to the id the server assigned on creation.
    pub fn replace_id(&self, old: &str, new: NodeId) -> Result<LayerTree> {
        if old == new.as_str() {
            return Ok(self.clone());
        }
        if self.contains(new.as_str()) {
            return Err(InvalidMutation::DuplicateId(new).into());
        }
        let mut tree = self.map_node(old, |node| {
            node.id = new;
            Ok(())
        })?;
        // Parent references of the children change too.
        tree = Self::indexed_subset(tree.roots);
        Ok(tree)
    }

    /// Change a node's display name.
    pub fn rename(&self, id: &str, name: &str) -> Result<LayerTree> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InvalidMutation::EmptyName.into());
        }
        self.map_node(id, |node| {
            node.name = name.to_string();
            Ok(())
        })
    }

    /// Apply an in-place edit that leaves the tree's shape unchanged.
    pub(crate) fn map_node<F>(&self, id: &str, f: F) -> Result<LayerTree>
    where
        F: FnOnce(&mut LayerNode) -> Result<()>,
    {
        let location = self.index.get(id).ok_or_else(|| TreeError::not_found(id))?;
        let mut roots = self.roots.clone();
        let node = node_at_mut(&mut roots, &location.path).ok_or_else(|| TreeError::not_found(id))?;
        f(node)?;
        Ok(Self {
            roots,
            index: self.index.clone(),
        })
    }

    /// Apply an in-place edit to every node in a single copy of the tree.
    ///
    /// `f` must not change ids or children.
    pub(crate) fn map_each<F>(&self, mut f: F) -> LayerTree
    where
        F: FnMut(&mut LayerNode),
    {
        let mut roots = self.roots.clone();
        for root in &mut roots {
            root.visit_mut(&mut f);
        }
        Self {
            roots,
            index: self.index.clone(),
        }
    }
}

/// Pre-order iterator over a [`LayerTree`].
pub struct Nodes<'a> {
    stack: Vec<&'a LayerNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a LayerNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn collect_locations(
    nodes: &[LayerNode],
    parent: Option<&NodeId>,
    path: &mut Vec<usize>,
    index: &mut HashMap<NodeId, NodeLocation>,
    duplicate: &mut Option<NodeId>,
) {
    for (i, node) in nodes.iter().enumerate() {
        path.push(i);
        let location = NodeLocation {
            parent: parent.cloned(),
            path: path.clone(),
        };
        if index.insert(node.id.clone(), location).is_some() && duplicate.is_none() {
            *duplicate = Some(node.id.clone());
        }
        collect_locations(node.children(), Some(&node.id), path, index, duplicate);
        path.pop();
    }
}

fn renormalize(nodes: &mut [LayerNode]) {
    for (i, node) in nodes.iter_mut().enumerate() {
        node.order = i;
    }
}

fn normalize_all(nodes: &mut [LayerNode]) {
    renormalize(nodes);
    for node in nodes.iter_mut() {
        if let Some(children) = node.children_mut() {
            normalize_all(children);
        }
    }
}

fn node_at<'a>(roots: &'a [LayerNode], path: &[usize]) -> Option<&'a LayerNode> {
    let (first, rest) = path.split_first()?;
    let mut node = roots.get(*first)?;
    for &i in rest {
        node = node.children().get(i)?;
    }
    Some(node)
}

fn node_at_mut<'a>(roots: &'a mut [LayerNode], path: &[usize]) -> Option<&'a mut LayerNode> {
    let (first, rest) = path.split_first()?;
    let mut node = roots.get_mut(*first)?;
    for &i in rest {
        node = node.children_mut()?.get_mut(i)?;
    }
    Some(node)
}

fn child_list_mut<'a>(roots: &'a mut Vec<LayerNode>, parent: Option<&str>) -> Result<&'a mut Vec<LayerNode>> {
    let Some(parent_id) = parent else {
        return Ok(roots);
    };
    roots
        .iter_mut()
        .find_map(|root| root.find_mut(parent_id))
        .ok_or_else(|| TreeError::not_found(parent_id))?
        .children_mut()
        .ok_or_else(|| InvalidMutation::NotAGroup(NodeId::from(parent_id)).into())
}

fn detach(roots: &mut Vec<LayerNode>, location: &NodeLocation) -> Option<LayerNode> {
    let (&index, parent_path) = location.path.split_last()?;
    let list = if parent_path.is_empty() {
        roots
    } else {
        node_at_mut(roots, parent_path)?.children_mut()?
    };
    if index >= list.len() {
        return None;
    }
    let node = list.remove(index);
    renormalize(list);
    Some(node)
}

fn filter_node(node: &LayerNode, needle: &str) -> Option<LayerNode> {
    let matches = node.name.to_lowercase().contains(needle);
    if !node.is_group() {
        return matches.then(|| node.clone());
    }

    let mut kept: Vec<LayerNode> = node
        .children()
        .iter()
        .filter_map(|child| filter_node(child, needle))
        .collect();
    if kept.is_empty() && !matches {
        return None;
    }
    renormalize(&mut kept);
    Some(LayerNode {
        kind: crate::node::NodeKind::Group(kept),
        ..node_shell(node)
    })
}

/// Copy of a node's attributes with an empty group body.
fn node_shell(node: &LayerNode) -> LayerNode {
    LayerNode {
        id: node.id.clone(),
        name: node.name.clone(),
        order: node.order,
        min_zoom: node.min_zoom,
        max_zoom: node.max_zoom,
        legend_url: node.legend_url.clone(),
        kind: crate::node::NodeKind::Group(Vec::new()),
    }
}
