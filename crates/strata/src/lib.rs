//! Strata - a hierarchical layer tree engine for GIS editors.
//!
//! This is the umbrella crate that re-exports all public APIs.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata::prelude::*;
//! use strata::sync::http::HttpLayerService;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = HttpLayerService::builder("https://gis.example.com").build()?;
//! let store = Arc::new(PreferenceStore::open(PreferenceStore::default_path()?)?);
//! let session = LayerTreeSession::new(service, store, EngineConfig::default());
//!
//! session.refresh().await?;
//! session.toggle_visibility("parcels", false).await?;
//! # Ok(())
//! # }
//! ```

pub use strata_core::*;

/// Remote layer service, sync coordinator and session.
#[cfg(feature = "remote")]
pub mod sync {
    pub use strata_sync::*;
}

/// The types most applications need.
pub mod prelude {
    pub use strata_core::{
        CheckState, DragDelta, DragEngine, DragGesture, EngineConfig, FlatItem, ItemKey, LayerNode, LayerTree,
        MemoryStore, Mutation, NewGroup, NodeId, PreferenceStore, SelectionStore, TreeError,
    };

    #[cfg(feature = "remote")]
    pub use strata_sync::{
        ApplyOutcome, HttpLayerService, LayerService, LayerTreeSession, RendererSink, SyncCoordinator, SyncError,
    };
}
