//! Visibility and opacity propagation.
//!
//! Leaves store their own `visible` flag and opacity. Groups store neither:
//! a group's checkbox state is derived from its leaves every time it is
//! needed, and toggling a group writes the new value to every leaf below it.

use std::collections::HashMap;

use crate::error::{InvalidMutation, Result};
use crate::logging::targets;
use crate::node::{LayerNode, NodeId, NodeKind, clamp_opacity};
use crate::tree::LayerTree;

/// Tri-state checkbox value of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckState {
    /// Every leaf below is visible.
    AllOn,
    /// No leaf below is visible, or there are no leaves.
    AllOff,
    /// Some leaves are visible and some are not.
    Mixed,
}

impl CheckState {
    pub fn is_checked(self) -> bool {
        self == Self::AllOn
    }

    pub fn is_indeterminate(self) -> bool {
        self == Self::Mixed
    }

    fn of_leaf(visible: bool) -> Self {
        if visible { Self::AllOn } else { Self::AllOff }
    }
}

/// Combine the states of a group's direct children.
///
/// `None` entries are children without any leaf below them; they do not
/// take part. Returns `None` when no child contributes.
pub fn combine_child_states<I>(states: I) -> Option<CheckState>
where
    I: IntoIterator<Item = Option<CheckState>>,
{
    let mut combined = None;
    for state in states.into_iter().flatten() {
        combined = match combined {
            None => Some(state),
            Some(current) if current == state => Some(current),
            Some(_) => return Some(CheckState::Mixed),
        };
    }
    combined
}

fn aggregate(node: &LayerNode) -> Option<CheckState> {
    match &node.kind {
        NodeKind::Layer(props) => Some(CheckState::of_leaf(props.visible)),
        NodeKind::Group(children) => combine_child_states(children.iter().map(aggregate)),
    }
}

/// Checkbox state of a node. For a leaf this is its own visibility.
pub fn compute_group_state(node: &LayerNode) -> CheckState {
    aggregate(node).unwrap_or(CheckState::AllOff)
}

/// States of every group in one bottom-up pass.
#[tracing::instrument(skip_all, target = "strata_core::visibility", level = "trace")]
pub fn state_map(tree: &LayerTree) -> HashMap<NodeId, CheckState> {
    fn walk(node: &LayerNode, states: &mut HashMap<NodeId, CheckState>) -> Option<CheckState> {
        match &node.kind {
            NodeKind::Layer(props) => Some(CheckState::of_leaf(props.visible)),
            NodeKind::Group(children) => {
                let child_states: Vec<Option<CheckState>> =
                    children.iter().map(|child| walk(child, states)).collect();
                let combined = combine_child_states(child_states);
                states.insert(node.id.clone(), combined.unwrap_or(CheckState::AllOff));
                combined
            }
        }
    }

    let mut states = HashMap::new();
    for root in tree.roots() {
        walk(root, &mut states);
    }
    states
}

/// Whether any node below `node` is a visible leaf.
pub fn has_visible_descendants(node: &LayerNode) -> bool {
    node.children()
        .iter()
        .any(|child| child.visible() == Some(true) || has_visible_descendants(child))
}

/// Set `visible` on a leaf, or on every leaf under a group.
///
/// Returns the new tree and the ids of leaves whose value actually changed.
#[tracing::instrument(skip_all, target = "strata_core::visibility", level = "trace")]
pub fn toggle_visibility(tree: &LayerTree, id: &str, visible: bool) -> Result<(LayerTree, Vec<NodeId>)> {
    let mut changed = Vec::new();
    let updated = tree.map_node(id, |node| {
        node.visit_mut(&mut |n| {
            if n.visible() == Some(!visible) {
                if let Some(props) = n.layer_mut() {
                    props.visible = visible;
                }
                changed.push(n.id.clone());
            }
        });
        Ok(())
    })?;
    tracing::debug!(target: targets::VISIBILITY, id, visible, changed = changed.len(), "toggled visibility");
    Ok((updated, changed))
}

/// Restore individual leaves to the given visibility values.
///
/// All leaves are written in one pass. Ids no longer in the tree are skipped.
pub fn restore_visibility(tree: &LayerTree, leaves: &[(NodeId, bool)]) -> LayerTree {
    if leaves.is_empty() {
        return tree.clone();
    }
    let wanted: HashMap<&NodeId, bool> = leaves.iter().map(|(id, visible)| (id, *visible)).collect();
    tree.map_each(|node| {
        if let Some(visible) = wanted.get(&node.id) {
            if let Some(props) = node.layer_mut() {
                props.visible = *visible;
            }
        }
    })
}

/// Set a leaf's opacity, clamped to `[0, 1]`.
///
/// Groups have no opacity; addressing one fails with
/// [`InvalidMutation::OpacityOnGroup`].
pub fn set_opacity(tree: &LayerTree, id: &str, opacity: f32) -> Result<LayerTree> {
    tree.map_node(id, |node| match node.layer_mut() {
        Some(props) => {
            props.opacity = clamp_opacity(opacity);
            Ok(())
        }
        None => Err(InvalidMutation::OpacityOnGroup(node.id.clone()).into()),
    })
}

/// Effective state of one leaf, as pushed to a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafState {
    pub id: NodeId,
    pub visible: bool,
    pub opacity: f32,
}

/// Visibility and opacity of every leaf, in pre-order.
pub fn leaf_states(tree: &LayerTree) -> Vec<LeafState> {
    tree.nodes()
        .filter_map(|node| {
            node.layer_props().map(|props| LeafState {
                id: node.id.clone(),
                visible: props.visible,
                opacity: props.opacity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;

    fn tree() -> LayerTree {
        LayerTree::from_roots(vec![
            LayerNode::group(
                "group_a",
                "Group A",
                vec![
                    LayerNode::raster("leaf1", "Leaf 1").with_visible(true),
                    LayerNode::raster("leaf2", "Leaf 2").with_visible(false),
                ],
            ),
            LayerNode::group("empty", "Empty", vec![]),
        ])
        .unwrap()
    }

    #[test]
    fn test_group_toggle_sets_every_leaf() {
        let tree = tree();
        assert_eq!(compute_group_state(tree.find("group_a").unwrap()), CheckState::Mixed);

        let (on, changed) = toggle_visibility(&tree, "group_a", true).unwrap();
        assert_eq!(changed, vec![NodeId::from("leaf2")]);
        assert_eq!(on.find("leaf1").unwrap().visible(), Some(true));
        assert_eq!(on.find("leaf2").unwrap().visible(), Some(true));
        assert_eq!(compute_group_state(on.find("group_a").unwrap()), CheckState::AllOn);

        let (off, changed) = toggle_visibility(&on, "group_a", false).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(compute_group_state(off.find("group_a").unwrap()), CheckState::AllOff);
    }

    #[test]
    fn test_leaf_toggle_only_touches_leaf() {
        let (updated, changed) = toggle_visibility(&tree(), "leaf1", false).unwrap();
        assert_eq!(changed, vec![NodeId::from("leaf1")]);
        assert_eq!(updated.find("leaf2").unwrap().visible(), Some(false));
    }

    #[test]
    fn test_toggle_unknown_id() {
        assert!(toggle_visibility(&tree(), "ghost", true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_empty_group_is_all_off() {
        let tree = tree();
        assert_eq!(compute_group_state(tree.find("empty").unwrap()), CheckState::AllOff);
        assert_eq!(state_map(&tree).get("empty"), Some(&CheckState::AllOff));
    }

    #[test]
    fn test_nested_groups_ignore_leafless_children() {
        let node = LayerNode::group(
            "outer",
            "Outer",
            vec![
                LayerNode::group("hollow", "Hollow", vec![]),
                LayerNode::group("inner", "Inner", vec![LayerNode::raster("x", "X")]),
            ],
        );
        assert_eq!(compute_group_state(&node), CheckState::AllOn);
    }

    #[test]
    fn test_state_map_matches_compute_group_state() {
        let tree = LayerTree::from_roots(vec![LayerNode::group(
            "outer",
            "Outer",
            vec![
                LayerNode::group("on", "On", vec![LayerNode::raster("a", "A")]),
                LayerNode::group("off", "Off", vec![LayerNode::raster("b", "B").with_visible(false)]),
            ],
        )])
        .unwrap();
        let states = state_map(&tree);
        for id in ["outer", "on", "off"] {
            assert_eq!(states[id], compute_group_state(tree.find(id).unwrap()), "group {id}");
        }
        assert_eq!(states["outer"], CheckState::Mixed);
    }

    #[test]
    fn test_set_opacity_clamps_and_rejects_groups() {
        let tree = tree();
        let updated = set_opacity(&tree, "leaf1", 1.5).unwrap();
        assert_eq!(updated.find("leaf1").unwrap().opacity(), Some(1.0));

        let err = set_opacity(&tree, "group_a", 0.5).unwrap_err();
        assert_eq!(err, TreeError::from(InvalidMutation::OpacityOnGroup(NodeId::from("group_a"))));
    }

    #[test]
    fn test_restore_visibility_skips_missing() {
        let (on, _) = toggle_visibility(&tree(), "group_a", true).unwrap();
        let restored = restore_visibility(&on, &[(NodeId::from("leaf2"), false), (NodeId::from("gone"), true)]);
        assert_eq!(restored, tree());
    }

    #[test]
    fn test_restore_visibility_sets_many_leaves() {
        let (on, _) = toggle_visibility(&tree(), "group_a", true).unwrap();
        let (off, changed) = toggle_visibility(&on, "group_a", false).unwrap();
        assert_eq!(changed.len(), 2);
        let restored: Vec<(NodeId, bool)> = changed.into_iter().map(|id| (id, true)).collect();
        let back = restore_visibility(&off, &restored);
        assert_eq!(back, on);
        assert_eq!(restore_visibility(&back, &[]), back);
    }

    #[test]
    fn test_has_visible_descendants_and_leaf_states() {
        let tree = tree();
        assert!(has_visible_descendants(tree.find("group_a").unwrap()));
        assert!(!has_visible_descendants(tree.find("empty").unwrap()));
        let states = leaf_states(&tree);
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].id, "leaf2");
        assert!(!states[1].visible);
    }
}
