//! Layer tree node types.
//!
//! A [`LayerNode`] is either a group, which only holds children, or a leaf
//! layer carrying its own visibility, opacity and source description.
//!
//! # Example
//!
//! ```
//! use strata_core::node::{LayerNode, VectorService};
//!
//! let tree = LayerNode::group("base", "Base maps", vec![
//!     LayerNode::raster("osm", "OpenStreetMap"),
//!     LayerNode::vector("parcels", "Parcels", VectorService::Wfs).with_visible(false),
//! ]);
//!
//! assert!(tree.is_group());
//! assert_eq!(tree.children().len(), 2);
//! assert_eq!(tree.find("parcels").and_then(|n| n.visible()), Some(false));
//! ```

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Opaque, tree-wide unique identifier of a layer node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create an id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Protocol of a vector-capable map service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorService {
    /// OGC Web Map Service.
    Wms,
    /// OGC Web Feature Service.
    Wfs,
    /// Mapbox vector tiles.
    Mvt,
}

/// Where a leaf layer's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerSource {
    /// Raster imagery or tiles.
    Raster,
    /// A vector service.
    Vector(VectorService),
}

/// Flat type tag for a node, used on the wire and in flattened rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Group,
    Raster,
    Wms,
    Wfs,
    Mvt,
}

impl NodeType {
    /// Lowercase tag as exchanged with the layer service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Raster => "raster",
            Self::Wms => "wms",
            Self::Wfs => "wfs",
            Self::Mvt => "mvt",
        }
    }

    /// Parse a tag, ignoring ASCII case.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "group" => Some(Self::Group),
            "raster" => Some(Self::Raster),
            "wms" => Some(Self::Wms),
            "wfs" => Some(Self::Wfs),
            "mvt" => Some(Self::Mvt),
            _ => None,
        }
    }

    /// The leaf source for this tag, or `None` for groups.
    pub fn source(self) -> Option<LayerSource> {
        match self {
            Self::Group => None,
            Self::Raster => Some(LayerSource::Raster),
            Self::Wms => Some(LayerSource::Vector(VectorService::Wms)),
            Self::Wfs => Some(LayerSource::Vector(VectorService::Wfs)),
            Self::Mvt => Some(LayerSource::Vector(VectorService::Mvt)),
        }
    }
}

impl From<LayerSource> for NodeType {
    fn from(source: LayerSource) -> Self {
        match source {
            LayerSource::Raster => Self::Raster,
            LayerSource::Vector(VectorService::Wms) => Self::Wms,
            LayerSource::Vector(VectorService::Wfs) => Self::Wfs,
            LayerSource::Vector(VectorService::Mvt) => Self::Mvt,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State stored on a leaf layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerProps {
    /// Data source kind.
    pub source: LayerSource,
    /// Whether the layer is drawn.
    pub visible: bool,
    /// Draw opacity in `[0, 1]`.
    pub opacity: f32,
    /// Connection details for the renderer. Opaque to the engine.
    pub descriptor: serde_json::Value,
}

impl LayerProps {
    /// Visible, fully opaque layer with an empty descriptor.
    pub fn new(source: LayerSource) -> Self {
        Self {
            source,
            visible: true,
            opacity: 1.0,
            descriptor: serde_json::Value::Null,
        }
    }
}

/// Variant-specific part of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Ordered children. An empty group is still a group.
    Group(Vec<LayerNode>),
    /// A drawable layer.
    Layer(LayerProps),
}

/// A node in the layer tree.
///
/// The parent is never stored on the node. It follows from tree position and
/// is resolved through [`LayerTree`](crate::tree::LayerTree)'s index.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNode {
    /// Unique id across the whole tree.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// Zero-based rank among siblings.
    pub order: usize,
    /// Minimum zoom level at which the layer is drawn.
    pub min_zoom: Option<u8>,
    /// Maximum zoom level at which the layer is drawn.
    pub max_zoom: Option<u8>,
    /// Legend image reference.
    pub legend_url: Option<Url>,
    /// Group children or leaf properties.
    pub kind: NodeKind,
}

impl LayerNode {
    /// Create a group node.
    pub fn group(id: impl Into<NodeId>, name: impl Into<String>, children: Vec<LayerNode>) -> Self {
        Self::with_kind(id, name, NodeKind::Group(children))
    }

    /// Create a leaf layer node.
    pub fn layer(id: impl Into<NodeId>, name: impl Into<String>, source: LayerSource) -> Self {
        Self::with_kind(id, name, NodeKind::Layer(LayerProps::new(source)))
    }

    /// Create a raster leaf.
    pub fn raster(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::layer(id, name, LayerSource::Raster)
    }

    /// Create a vector service leaf.
    pub fn vector(id: impl Into<NodeId>, name: impl Into<String>, service: VectorService) -> Self {
        Self::layer(id, name, LayerSource::Vector(service))
    }

    fn with_kind(id: impl Into<NodeId>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order: 0,
            min_zoom: None,
            max_zoom: None,
            legend_url: None,
            kind,
        }
    }

    /// Set leaf visibility. Has no effect on groups.
    pub fn with_visible(mut self, visible: bool) -> Self {
        if let Some(props) = self.layer_mut() {
            props.visible = visible;
        }
        self
    }

    /// Set leaf opacity, clamped to `[0, 1]`. Has no effect on groups.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        if let Some(props) = self.layer_mut() {
            props.opacity = clamp_opacity(opacity);
        }
        self
    }

    /// Set the zoom range.
    pub fn with_zoom_range(mut self, min_zoom: Option<u8>, max_zoom: Option<u8>) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Set the legend reference.
    pub fn with_legend_url(mut self, url: Url) -> Self {
        self.legend_url = Some(url);
        self
    }

    /// Set the opaque source descriptor. Has no effect on groups.
    pub fn with_descriptor(mut self, descriptor: serde_json::Value) -> Self {
        if let Some(props) = self.layer_mut() {
            props.descriptor = descriptor;
        }
        self
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    /// Flat type tag of this node.
    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Group(_) => NodeType::Group,
            NodeKind::Layer(props) => props.source.into(),
        }
    }

    /// Children of a group, or an empty slice for leaves.
    pub fn children(&self) -> &[LayerNode] {
        match &self.kind {
            NodeKind::Group(children) => children,
            NodeKind::Layer(_) => &[],
        }
    }

    /// Mutable children of a group.
    pub fn children_mut(&mut self) -> Option<&mut Vec<LayerNode>> {
        match &mut self.kind {
            NodeKind::Group(children) => Some(children),
            NodeKind::Layer(_) => None,
        }
    }

    /// Leaf properties, or `None` for groups.
    pub fn layer_props(&self) -> Option<&LayerProps> {
        match &self.kind {
            NodeKind::Layer(props) => Some(props),
            NodeKind::Group(_) => None,
        }
    }

    /// Mutable leaf properties.
    pub fn layer_mut(&mut self) -> Option<&mut LayerProps> {
        match &mut self.kind {
            NodeKind::Layer(props) => Some(props),
            NodeKind::Group(_) => None,
        }
    }

    /// Stored visibility of a leaf. Groups have none.
    pub fn visible(&self) -> Option<bool> {
        self.layer_props().map(|p| p.visible)
    }

    /// Stored opacity of a leaf. Groups have none.
    pub fn opacity(&self) -> Option<f32> {
        self.layer_props().map(|p| p.opacity)
    }

    /// Depth-first search of this subtree, including the node itself.
    pub fn find(&self, id: &str) -> Option<&LayerNode> {
        if self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(id))
    }

    /// Mutable depth-first search of this subtree.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut LayerNode> {
        if self.id == id {
            return Some(self);
        }
        match &mut self.kind {
            NodeKind::Group(children) => children.iter_mut().find_map(|child| child.find_mut(id)),
            NodeKind::Layer(_) => None,
        }
    }

    /// Visit this node and every descendant in pre-order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a LayerNode)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Visit this node and every descendant in pre-order, mutably.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut LayerNode)) {
        f(self);
        if let NodeKind::Group(children) = &mut self.kind {
            for child in children {
                child.visit_mut(f);
            }
        }
    }

    /// Number of nodes in this subtree, including the node itself.
    pub fn subtree_len(&self) -> usize {
        1 + self.children().iter().map(LayerNode::subtree_len).sum::<usize>()
    }
}

/// A group to be created by a pack gesture or an add-group call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    /// Client-side id; the server may replace it.
    pub id: NodeId,
    /// Display name.
    pub name: String,
}

impl NewGroup {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// An empty group node with this id and name.
    pub fn into_node(self) -> LayerNode {
        LayerNode::group(self.id, self.name, Vec::new())
    }
}

/// Clamp an opacity into `[0, 1]`, mapping NaN to fully opaque.
pub fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        1.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}
