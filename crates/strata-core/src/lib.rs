//! Layer tree engine for Strata.
//!
//! This crate holds the synchronous, I/O-free half of the GIS layer panel:
//!
//! - **Tree Model**: an immutable-by-convention tree of groups and leaf layers
//!   with an id index
//! - **Visibility/Opacity Propagator**: tri-state group checkboxes derived
//!   from leaves, and group toggles written down to every leaf
//! - **Flattening Adapter**: the nested tree as a flat row list for a
//!   virtualized list widget, with "load more" rows for large groups
//! - **Drag Reorder Engine**: drag gestures classified into reorder, move,
//!   pack and unpack mutations
//! - **Selection/Expansion Store**: expanded and selected ids, mirrored to a
//!   durable key-value store
//!
//! Remote synchronization lives in `strata-sync`.
//!
//! # Example
//!
//! ```
//! use std::collections::HashSet;
//! use strata_core::{LayerNode, LayerTree, NodeId, flatten, visibility};
//! use strata_core::flatten::FlattenOptions;
//!
//! let tree = LayerTree::from_roots(vec![
//!     LayerNode::group("base", "Base maps", vec![
//!         LayerNode::raster("osm", "OpenStreetMap"),
//!         LayerNode::raster("ortho", "Orthophoto").with_visible(false),
//!     ]),
//!     LayerNode::raster("parcels", "Parcels"),
//! ])?;
//!
//! let (tree, changed) = visibility::toggle_visibility(&tree, "base", true)?;
//! assert_eq!(changed, vec![NodeId::from("ortho")]);
//!
//! let expanded: HashSet<NodeId> = [NodeId::from("base")].into();
//! let rows = flatten::flatten(&tree, &expanded, &HashSet::new(), &FlattenOptions::default());
//! assert_eq!(rows.len(), 4);
//! # Ok::<(), strata_core::TreeError>(())
//! ```

pub mod config;
pub mod drag;
mod error;
pub mod flatten;
pub mod logging;
pub mod mutation;
pub mod node;
pub mod prefs;
pub mod selection;
pub mod signal;
pub mod tree;
pub mod visibility;

pub use config::EngineConfig;
pub use drag::{DragDelta, DragEngine, DragGesture, DragKind, NoNewGroup, PackPolicy, Resolution};
pub use error::{InvalidMutation, ParentLabel, PrefsError, PrefsResult, Result, TreeError};
pub use flatten::{FlatItem, FlatNode, FlattenOptions, ItemKey, LoadMoreItem};
pub use logging::{LayerTreeDebug, TreeFormatOptions, TreeStyle};
pub use mutation::{MoveOp, Mutation, MutationKind, SyncKey};
pub use node::{LayerNode, LayerProps, LayerSource, NewGroup, NodeId, NodeKind, NodeType, VectorService};
pub use prefs::{KeyValueStore, MemoryStore, PreferenceStore, PrefsFormat};
pub use selection::{SelectionChange, SelectionStore};
pub use signal::{ConnectionId, Signal};
pub use tree::{LayerTree, NodeLocation, RemovedNode};
pub use visibility::{CheckState, LeafState};
