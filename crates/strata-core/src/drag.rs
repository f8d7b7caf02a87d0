//! Drag reorder engine.
//!
//! [`DragEngine::classify_and_resolve`] interprets a finished drag gesture
//! (source row, target row, pointer travel) as exactly one [`Mutation`]:
//!
//! 1. **Folder operation**: mostly horizontal travel past the threshold.
//!    Right packs the source into the nearest preceding sibling group; left
//!    unpacks it to the front of its grandparent's children.
//! 2. **Reorder**: source and target share a parent.
//! 3. **Move**: source and target have different parents. Dropping on a
//!    group inserts at the top of that group; dropping on a leaf inserts
//!    before it.
//!
//! Everything else, including gestures touching a "load more" placeholder,
//! is a no-op. The engine never talks to the network.
//!
//! # Example
//!
//! ```
//! use strata_core::drag::{DragDelta, DragEngine, DragGesture, DragKind};
//! use strata_core::{LayerNode, LayerTree};
//!
//! let tree = LayerTree::from_roots(vec![
//!     LayerNode::group("group_a", "Group A", vec![LayerNode::raster("leaf1", "Leaf 1")]),
//!     LayerNode::raster("leaf2", "Leaf 2"),
//! ]).unwrap();
//!
//! let gesture = DragGesture::new("leaf2", Some("group_a"), DragDelta::new(40.0, 0.0));
//! let resolution = DragEngine::default().classify_and_resolve(&tree, &gesture).unwrap().unwrap();
//! assert_eq!(resolution.kind, DragKind::Pack);
//! ```

use crate::config::EngineConfig;
use crate::error::{InvalidMutation, Result, TreeError};
use crate::flatten::ItemKey;
use crate::logging::targets;
use crate::mutation::{MoveOp, Mutation, array_move};
use crate::node::{LayerNode, NewGroup, NodeId};
use crate::tree::{LayerTree, NodeLocation};

/// Pointer travel since the drag started, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DragDelta {
    pub x: f64,
    pub y: f64,
}

impl DragDelta {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// A completed drag gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct DragGesture {
    /// Row being dragged.
    pub active: ItemKey,
    /// Row under the pointer on release; `None` when the drag was cancelled.
    pub over: Option<ItemKey>,
    pub delta: DragDelta,
}

impl DragGesture {
    pub fn new(active: impl Into<ItemKey>, over: Option<impl Into<ItemKey>>, delta: DragDelta) -> Self {
        Self {
            active: active.into(),
            over: over.map(Into::into),
            delta,
        }
    }

    /// Whether the pointer moved far enough for the press to count as a drag.
    pub fn exceeds_activation(&self, distance: f64) -> bool {
        self.delta.distance() >= distance
    }
}

/// Horizontal direction of a folder operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

/// How a gesture was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    Reorder,
    Move,
    Pack,
    Unpack,
}

/// A classified gesture and the mutation it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub kind: DragKind,
    pub mutation: Mutation,
}

/// Decides what happens when a node is packed but has no preceding group.
pub trait PackPolicy {
    /// The group to create around `moved`, or `None` to ignore the gesture.
    fn new_group(&self, tree: &LayerTree, moved: &LayerNode) -> Option<NewGroup>;
}

/// Never creates a group; packing without a preceding group is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNewGroup;

impl PackPolicy for NoNewGroup {
    fn new_group(&self, _tree: &LayerTree, _moved: &LayerNode) -> Option<NewGroup> {
        None
    }
}

impl<F> PackPolicy for F
where
    F: Fn(&LayerTree, &LayerNode) -> Option<NewGroup>,
{
    fn new_group(&self, tree: &LayerTree, moved: &LayerNode) -> Option<NewGroup> {
        self(tree, moved)
    }
}

/// Classifies drag gestures into mutations.
#[derive(Debug, Clone)]
pub struct DragEngine<P = NoNewGroup> {
    horizontal_threshold: f64,
    policy: P,
}

impl Default for DragEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default().horizontal_threshold)
    }
}

impl DragEngine {
    /// Engine with the given horizontal threshold and no group creation.
    pub fn new(horizontal_threshold: f64) -> Self {
        Self {
            horizontal_threshold,
            policy: NoNewGroup,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.horizontal_threshold)
    }
}

impl<P: PackPolicy> DragEngine<P> {
    /// Replace the policy used when packing without a preceding group.
    pub fn with_pack_policy<Q: PackPolicy>(self, policy: Q) -> DragEngine<Q> {
        DragEngine {
            horizontal_threshold: self.horizontal_threshold,
            policy,
        }
    }

    pub fn horizontal_threshold(&self) -> f64 {
        self.horizontal_threshold
    }

    /// Direction of a folder operation, if the travel qualifies as one.
    pub fn folder_direction(&self, delta: DragDelta) -> Option<Direction> {
        if delta.x.abs() > delta.y.abs() && delta.x.abs() > self.horizontal_threshold {
            Some(if delta.x > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            })
        } else {
            None
        }
    }

    /// Turn a gesture into at most one mutation.
    ///
    /// `Ok(None)` is a no-op: cancelled drags, drops onto self, placeholder
    /// rows, and gestures that would leave the tree unchanged. Dragging a
    /// group onto its own subtree fails with [`InvalidMutation::Cycle`].
    #[tracing::instrument(skip_all, target = "strata_core::drag", level = "trace")]
    pub fn classify_and_resolve(&self, tree: &LayerTree, gesture: &DragGesture) -> Result<Option<Resolution>> {
        let Some(over) = &gesture.over else {
            tracing::trace!(target: targets::DRAG, "drag cancelled");
            return Ok(None);
        };
        let (ItemKey::Node(active_id), ItemKey::Node(over_id)) = (&gesture.active, over) else {
            tracing::debug!(target: targets::DRAG, active = %gesture.active, over = %over, "ignoring placeholder drag");
            return Ok(None);
        };
        if active_id == over_id {
            return Ok(None);
        }

        let active_loc = tree
            .location(active_id.as_str())
            .ok_or_else(|| TreeError::not_found(active_id))?;
        let over_loc = tree
            .location(over_id.as_str())
            .ok_or_else(|| TreeError::not_found(over_id))?;

        if tree.is_descendant_of(over_id.as_str(), active_id.as_str()) {
            return Err(InvalidMutation::Cycle {
                moved: active_id.clone(),
                target: over_id.clone(),
            }
            .into());
        }

        let resolution = match self.folder_direction(gesture.delta) {
            Some(Direction::Right) => self.pack(tree, active_id, active_loc)?,
            Some(Direction::Left) => unpack(tree, active_id, active_loc)?,
            None if active_loc.parent == over_loc.parent => reorder(tree, active_id, over_id, active_loc, over_loc)?,
            None => cross_parent(tree, active_id, over_id, active_loc, over_loc)?,
        };

        match &resolution {
            Some(r) => tracing::debug!(target: targets::DRAG, active = %active_id, over = %over_id, kind = ?r.kind, "classified drag"),
            None => tracing::trace!(target: targets::DRAG, active = %active_id, over = %over_id, "drag is a no-op"),
        }
        Ok(resolution)
    }

    fn pack(&self, tree: &LayerTree, active_id: &NodeId, location: &NodeLocation) -> Result<Option<Resolution>> {
        let parent = location.parent.as_ref().map(NodeId::as_str);
        let siblings = tree.children_of(parent)?;
        let preceding_group = siblings[..location.index().min(siblings.len())]
            .iter()
            .rev()
            .find(|node| node.is_group());

        if let Some(group) = preceding_group {
            return Ok(Some(Resolution {
                kind: DragKind::Pack,
                mutation: Mutation::Move(MoveOp {
                    moved_id: active_id.clone(),
                    from_parent_id: location.parent.clone(),
                    to_parent_id: Some(group.id.clone()),
                    to_index: group.children().len(),
                }),
            }));
        }

        let Some(node) = tree.find(active_id.as_str()) else {
            return Err(TreeError::not_found(active_id));
        };
        let Some(group) = self.policy.new_group(tree, node) else {
            tracing::debug!(target: targets::DRAG, active = %active_id, "no preceding group and no group created");
            return Ok(None);
        };
        if tree.contains(group.id.as_str()) {
            return Err(InvalidMutation::DuplicateId(group.id).into());
        }
        Ok(Some(Resolution {
            kind: DragKind::Pack,
            mutation: Mutation::Wrap {
                moved_id: active_id.clone(),
                group,
            },
        }))
    }
}

fn unpack(tree: &LayerTree, active_id: &NodeId, location: &NodeLocation) -> Result<Option<Resolution>> {
    let Some(parent_id) = &location.parent else {
        return Ok(None);
    };
    let grandparent = tree.parent_of(parent_id.as_str())?.cloned();
    Ok(Some(Resolution {
        kind: DragKind::Unpack,
        mutation: Mutation::Move(MoveOp {
            moved_id: active_id.clone(),
            from_parent_id: Some(parent_id.clone()),
            to_parent_id: grandparent,
            to_index: 0,
        }),
    }))
}

fn reorder(
    tree: &LayerTree,
    active_id: &NodeId,
    over_id: &NodeId,
    active_loc: &NodeLocation,
    over_loc: &NodeLocation,
) -> Result<Option<Resolution>> {
    let parent = active_loc.parent.as_ref().map(NodeId::as_str);
    let current: Vec<NodeId> = tree.children_of(parent)?.iter().map(|n| n.id.clone()).collect();
    let reordered = array_move(&current, active_loc.index(), over_loc.index());
    if reordered == current {
        return Ok(None);
    }
    tracing::trace!(target: targets::DRAG, active = %active_id, over = %over_id, "same-parent reorder");
    Ok(Some(Resolution {
        kind: DragKind::Reorder,
        mutation: Mutation::Reorder {
            parent_id: active_loc.parent.clone(),
            ordered_ids: reordered,
        },
    }))
}

fn cross_parent(
    tree: &LayerTree,
    active_id: &NodeId,
    over_id: &NodeId,
    active_loc: &NodeLocation,
    over_loc: &NodeLocation,
) -> Result<Option<Resolution>> {
    let over_node = tree.find(over_id.as_str()).ok_or_else(|| TreeError::not_found(over_id))?;
    let (to_parent_id, to_index) = if over_node.is_group() {
        (Some(over_id.clone()), 0)
    } else {
        (over_loc.parent.clone(), over_loc.index())
    };

    if to_parent_id == active_loc.parent && to_index == active_loc.index() {
        return Ok(None);
    }
    Ok(Some(Resolution {
        kind: DragKind::Move,
        mutation: Mutation::Move(MoveOp {
            moved_id: active_id.clone(),
            from_parent_id: active_loc.parent.clone(),
            to_parent_id,
            to_index,
        }),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> LayerTree {
        LayerTree::from_roots(vec![
            LayerNode::group("group_a", "Group A", vec![LayerNode::raster("leaf1", "Leaf 1")]),
            LayerNode::raster("leaf2", "Leaf 2"),
            LayerNode::group(
                "group_b",
                "Group B",
                vec![
                    LayerNode::raster("b1", "B1"),
                    LayerNode::group("nested", "Nested", vec![LayerNode::raster("n1", "N1")]),
                    LayerNode::raster("b2", "B2"),
                ],
            ),
            LayerNode::raster("leaf3", "Leaf 3"),
        ])
        .unwrap()
    }

    fn resolve(active: &str, over: Option<&str>, x: f64, y: f64) -> Result<Option<Resolution>> {
        DragEngine::default().classify_and_resolve(&tree(), &DragGesture::new(active, over, DragDelta::new(x, y)))
    }

    #[test]
    fn test_pack_into_preceding_group() {
        let resolution = resolve("leaf2", Some("group_a"), 40.0, 0.0).unwrap().unwrap();
        assert_eq!(resolution.kind, DragKind::Pack);
        let result = resolution.mutation.apply_to(&tree()).unwrap();
        let ids: Vec<&str> = result.find("group_a").unwrap().children().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["leaf1", "leaf2"]);
        assert_eq!(result.parent_of("leaf2").unwrap().map(NodeId::as_str), Some("group_a"));
        assert_eq!(result.roots().len(), 3);
    }

    #[test]
    fn test_pack_skips_leaf_siblings_to_nearest_group() {
        let resolution = resolve("leaf3", Some("leaf2"), 45.0, 3.0).unwrap().unwrap();
        assert_eq!(
            resolution.mutation,
            Mutation::Move(MoveOp {
                moved_id: "leaf3".into(),
                from_parent_id: None,
                to_parent_id: Some("group_b".into()),
                to_index: 3,
            })
        );
    }

    #[test]
    fn test_pack_without_group_uses_policy() {
        let tree = tree();
        let gesture = DragGesture::new("group_a", Some("leaf2"), DragDelta::new(50.0, 0.0));
        assert_eq!(DragEngine::default().classify_and_resolve(&tree, &gesture).unwrap(), None);

        let engine = DragEngine::default().with_pack_policy(|_: &LayerTree, moved: &LayerNode| {
            Some(NewGroup::new(format!("{}-folder", moved.id), "New group"))
        });
        let resolution = engine.classify_and_resolve(&tree, &gesture).unwrap().unwrap();
        assert_eq!(resolution.kind, DragKind::Pack);
        let wrapped = resolution.mutation.apply_to(&tree).unwrap();
        assert_eq!(wrapped.parent_of("group_a").unwrap().map(NodeId::as_str), Some("group_a-folder"));
        assert_eq!(wrapped.index_in_parent("group_a-folder").unwrap(), 0);
    }

    #[test]
    fn test_unpack_to_grandparent_front() {
        let resolution = resolve("n1", Some("b1"), -35.0, 2.0).unwrap().unwrap();
        assert_eq!(resolution.kind, DragKind::Unpack);
        let result = resolution.mutation.apply_to(&tree()).unwrap();
        assert_eq!(result.parent_of("n1").unwrap().map(NodeId::as_str), Some("group_b"));
        assert_eq!(result.index_in_parent("n1").unwrap(), 0);

        let resolution = resolve("leaf1", Some("leaf2"), -35.0, 0.0).unwrap().unwrap();
        let result = resolution.mutation.apply_to(&tree()).unwrap();
        assert_eq!(result.parent_of("leaf1").unwrap(), None);
        assert_eq!(result.index_in_parent("leaf1").unwrap(), 0);
    }

    #[test]
    fn test_unpack_at_root_is_noop() {
        assert_eq!(resolve("leaf2", Some("leaf3"), -60.0, 0.0).unwrap(), None);
    }

    #[test]
    fn test_horizontal_under_threshold_is_not_folder_op() {
        let resolution = resolve("leaf3", Some("leaf2"), 30.0, 0.0).unwrap().unwrap();
        assert_eq!(resolution.kind, DragKind::Reorder);
    }

    #[test]
    fn test_same_parent_reorder() {
        let resolution = resolve("leaf3", Some("group_a"), 0.0, -90.0).unwrap().unwrap();
        assert_eq!(
            resolution.mutation,
            Mutation::Reorder {
                parent_id: None,
                ordered_ids: vec!["leaf3".into(), "group_a".into(), "leaf2".into(), "group_b".into()],
            }
        );
        let result = resolution.mutation.apply_to(&tree()).unwrap();
        let orders: Vec<usize> = result.roots().iter().map(|n| n.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cross_parent_onto_leaf_inserts_before() {
        let resolution = resolve("leaf2", Some("b2"), 0.0, 60.0).unwrap().unwrap();
        assert_eq!(resolution.kind, DragKind::Move);
        let result = resolution.mutation.apply_to(&tree()).unwrap();
        let ids: Vec<&str> = result.find("group_b").unwrap().children().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "nested", "leaf2", "b2"]);
    }

    #[test]
    fn test_cross_parent_onto_group_inserts_first() {
        let resolution = resolve("b2", Some("group_a"), 0.0, -60.0).unwrap().unwrap();
        assert_eq!(
            resolution.mutation,
            Mutation::Move(MoveOp {
                moved_id: "b2".into(),
                from_parent_id: Some("group_b".into()),
                to_parent_id: Some("group_a".into()),
                to_index: 0,
            })
        );
    }

    #[test]
    fn test_drop_on_own_parent_when_already_first_is_noop() {
        assert_eq!(resolve("b1", Some("group_b"), 0.0, -20.0).unwrap(), None);
    }

    #[test]
    fn test_noops() {
        assert_eq!(resolve("leaf2", None, 10.0, 10.0).unwrap(), None);
        assert_eq!(resolve("leaf2", Some("leaf2"), 0.0, 40.0).unwrap(), None);

        let gesture = DragGesture {
            active: ItemKey::LoadMore("group_b".into()),
            over: Some(ItemKey::from("leaf2")),
            delta: DragDelta::new(0.0, 30.0),
        };
        assert_eq!(DragEngine::default().classify_and_resolve(&tree(), &gesture).unwrap(), None);

        let gesture = DragGesture {
            active: ItemKey::from("leaf2"),
            over: Some(ItemKey::LoadMore("group_b".into())),
            delta: DragDelta::new(0.0, 30.0),
        };
        assert_eq!(DragEngine::default().classify_and_resolve(&tree(), &gesture).unwrap(), None);
    }

    #[test]
    fn test_cycle_rejected_before_classification() {
        for (x, y) in [(0.0, 50.0), (50.0, 0.0), (-50.0, 0.0)] {
            let err = resolve("group_b", Some("n1"), x, y).unwrap_err();
            assert!(matches!(err, TreeError::InvalidMutation(InvalidMutation::Cycle { .. })));
        }
    }

    #[test]
    fn test_unknown_ids() {
        assert!(resolve("ghost", Some("leaf2"), 0.0, 10.0).unwrap_err().is_not_found());
        assert!(resolve("leaf2", Some("ghost"), 0.0, 10.0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_activation_distance() {
        let gesture = DragGesture::new("leaf2", None::<&str>, DragDelta::new(3.0, 4.0));
        assert!(!gesture.exceeds_activation(8.0));
        assert!(gesture.exceeds_activation(5.0));
    }
}
