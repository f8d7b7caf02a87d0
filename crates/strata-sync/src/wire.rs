//! JSON shapes exchanged with the layer service.
//!
//! The tree comes over the wire as loosely typed nodes:
//!
//! ```json
//! { "id": "osm", "name": "OpenStreetMap", "type": "raster",
//!   "visible": true, "opacity": 0.8, "minZoom": 3, "legendUrl": "https://..." }
//! ```
//!
//! A missing `visible` means visible and a missing `opacity` means opaque.
//! Children are kept in array order; the `order` field is informational.

use serde::{Deserialize, Serialize};
use strata_core::node::clamp_opacity;
use strata_core::{LayerNode, LayerProps, MoveOp, NodeId, NodeKind, NodeType};
use url::Url;

use crate::error::{Result, SyncError};

/// A layer node as serialized by the layer service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<WireNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<usize>,
}

impl From<&LayerNode> for WireNode {
    fn from(node: &LayerNode) -> Self {
        let (visible, opacity, children, source) = match &node.kind {
            NodeKind::Group(children) => (None, None, Some(children.iter().map(WireNode::from).collect()), None),
            NodeKind::Layer(props) => (
                Some(props.visible),
                Some(props.opacity),
                None,
                (!props.descriptor.is_null()).then(|| props.descriptor.clone()),
            ),
        };
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type().as_str().to_string(),
            visible,
            opacity,
            children,
            legend_url: node.legend_url.as_ref().map(Url::to_string),
            source,
            min_zoom: node.min_zoom,
            max_zoom: node.max_zoom,
            order: Some(node.order),
        }
    }
}

impl TryFrom<WireNode> for LayerNode {
    type Error = SyncError;

    fn try_from(wire: WireNode) -> Result<Self> {
        let node_type = NodeType::parse(&wire.node_type).ok_or_else(|| {
            SyncError::InvalidResponse(format!("unknown layer type '{}' on '{}'", wire.node_type, wire.id))
        })?;

        let mut node = match node_type.source() {
            None => {
                let children = wire
                    .children
                    .unwrap_or_default()
                    .into_iter()
                    .map(LayerNode::try_from)
                    .collect::<Result<Vec<_>>>()?;
                LayerNode::group(wire.id, wire.name, children)
            }
            Some(source) => {
                let mut props = LayerProps::new(source);
                props.visible = wire.visible.unwrap_or(true);
                props.opacity = clamp_opacity(wire.opacity.unwrap_or(1.0));
                props.descriptor = wire.source.unwrap_or(serde_json::Value::Null);
                let mut node = LayerNode::layer(wire.id, wire.name, source);
                node.kind = NodeKind::Layer(props);
                node
            }
        };

        node.min_zoom = wire.min_zoom;
        node.max_zoom = wire.max_zoom;
        node.order = wire.order.unwrap_or(0);
        node.legend_url = wire.legend_url.as_deref().and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::debug!(target: strata_core::logging::targets::HTTP, id = %node.id, "ignoring legend url: {}", e);
                None
            }
        });
        Ok(node)
    }
}

/// Decode a list of root nodes.
pub fn decode_tree(nodes: Vec<WireNode>) -> Result<Vec<LayerNode>> {
    nodes.into_iter().map(LayerNode::try_from).collect()
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct VisibilityBody<'a> {
    pub id: &'a NodeId,
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpacityBody<'a> {
    pub id: &'a NodeId,
    pub opacity: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReorderBody<'a> {
    pub parent_id: Option<&'a NodeId>,
    pub ordered_ids: &'a [NodeId],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MoveBody<'a> {
    pub moved_id: &'a NodeId,
    pub from_parent_id: Option<&'a NodeId>,
    pub to_parent_id: Option<&'a NodeId>,
    pub to_index: usize,
}

impl<'a> From<&'a MoveOp> for MoveBody<'a> {
    fn from(op: &'a MoveOp) -> Self {
        Self {
            moved_id: &op.moved_id,
            from_parent_id: op.from_parent_id.as_ref(),
            to_parent_id: op.to_parent_id.as_ref(),
            to_index: op.to_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RenameBody<'a> {
    pub id: &'a NodeId,
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddBody<'a> {
    #[serde(flatten)]
    pub node: WireNode,
    pub parent_id: Option<&'a NodeId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddGroupBody<'a> {
    pub id: &'a NodeId,
    pub name: &'a str,
    pub parent_id: Option<&'a NodeId>,
}
