//! The layer panel's state service.
//!
//! [`LayerTreeSession`] wires a [`SyncCoordinator`] to a [`SelectionStore`]
//! and the set of groups whose children were fully loaded. UI code talks to
//! the session only: it reads rows from [`LayerTreeSession::flatten`] and
//! sends user actions through the remaining methods, each of which ends in a
//! single coordinator call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_core::{EngineConfig, MemoryStore};
//! use strata_sync::LayerTreeSession;
//! use strata_sync::http::HttpLayerService;
//!
//! # async fn run() -> strata_sync::Result<()> {
//! let service = HttpLayerService::builder("https://gis.example.com").build()?;
//! let session = LayerTreeSession::new(service, Arc::new(MemoryStore::new()), EngineConfig::default());
//!
//! session.refresh().await?;
//! for row in session.flatten() {
//!     println!("{:indent$}{}", "", row.key(), indent = row.depth() * 2);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use strata_core::flatten::flatten;
use strata_core::logging::targets;
use strata_core::{
    DragEngine, DragGesture, DragKind, EngineConfig, FlatItem, FlattenOptions, KeyValueStore, LayerNode, LayerTree,
    Mutation, NewGroup, NoNewGroup, NodeId, PackPolicy, SelectionStore,
};

use crate::coordinator::{ApplyOutcome, SyncCoordinator};
use crate::error::Result;
use crate::renderer::{NullRenderer, RendererSink};
use crate::service::{ExportFormat, ImportFile, LayerService};

/// Owned layer tree state: the synced tree, the selection store and the
/// lazy-load bookkeeping.
pub struct LayerTreeSession<S, R = NullRenderer, P = NoNewGroup> {
    coordinator: SyncCoordinator<S, R>,
    selection: SelectionStore,
    loaded_ids: Mutex<HashSet<NodeId>>,
    drag: DragEngine<P>,
    options: FlattenOptions,
    config: EngineConfig,
}

impl<S, R, P> std::fmt::Debug for LayerTreeSession<S, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerTreeSession")
            .field("coordinator", &self.coordinator)
            .field("selection", &self.selection)
            .field("loaded_ids", &self.loaded_ids.lock().len())
            .field("config", &self.config)
            .finish()
    }
}

impl<S: LayerService> LayerTreeSession<S> {
    /// Session without a renderer. Expansion and selection persist to `store`.
    pub fn new(service: S, store: Arc<dyn KeyValueStore>, config: EngineConfig) -> Self {
        Self::from_parts(SyncCoordinator::new(service), SelectionStore::from_config(store, &config), config)
    }
}

impl<S: LayerService, R: RendererSink> LayerTreeSession<S, R> {
    /// Assemble a session from an existing coordinator and store.
    pub fn from_parts(coordinator: SyncCoordinator<S, R>, selection: SelectionStore, config: EngineConfig) -> Self {
        Self {
            coordinator,
            selection,
            loaded_ids: Mutex::new(HashSet::new()),
            drag: DragEngine::from_config(&config),
            options: FlattenOptions::from(&config),
            config,
        }
    }
}

impl<S: LayerService, R: RendererSink, P: PackPolicy> LayerTreeSession<S, R, P> {
    /// Use `policy` to create a group when a node is packed with no group
    /// above it.
    pub fn with_pack_policy<Q: PackPolicy>(self, policy: Q) -> LayerTreeSession<S, R, Q> {
        LayerTreeSession {
            coordinator: self.coordinator,
            selection: self.selection,
            loaded_ids: self.loaded_ids,
            drag: self.drag.with_pack_policy(policy),
            options: self.options,
            config: self.config,
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator<S, R> {
        &self.coordinator
    }

    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A copy of the current tree.
    pub fn tree(&self) -> LayerTree {
        self.coordinator.snapshot()
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Fetch the tree and drop stale expansion and selection entries.
    #[tracing::instrument(skip_all, target = "strata_sync::session", level = "trace")]
    pub async fn refresh(&self) -> Result<()> {
        self.coordinator.hydrate().await?;
        self.after_replace();
        Ok(())
    }

    /// Visible rows, filtered by the current search query.
    pub fn flatten(&self) -> Vec<FlatItem> {
        let query = self.selection.search_query();
        let expanded = self.selection.expanded();
        let loaded = self.loaded_ids.lock().clone();
        self.coordinator.with_current(|tree| {
            if query.trim().is_empty() {
                flatten(tree, &expanded, &loaded, &self.options)
            } else {
                flatten(&tree.filter_by_substring(&query), &expanded, &loaded, &self.options)
            }
        })
    }

    /// Show every child of `parent_id` instead of the first page.
    pub fn load_more(&self, parent_id: impl Into<NodeId>) {
        let parent_id = parent_id.into();
        tracing::debug!(target: targets::SESSION, parent = %parent_id, "loading all children");
        self.loaded_ids.lock().insert(parent_id);
    }

    pub fn is_loaded(&self, parent_id: &str) -> bool {
        self.loaded_ids.lock().contains(parent_id)
    }

    // ========================================================================
    // Editing
    // ========================================================================

    pub async fn toggle_visibility(&self, id: impl Into<NodeId>, visible: bool) -> Result<ApplyOutcome> {
        let id = id.into();
        self.coordinator.apply(Mutation::SetVisibility { id, visible }).await
    }

    pub async fn set_opacity(&self, id: impl Into<NodeId>, opacity: f32) -> Result<ApplyOutcome> {
        let id = id.into();
        self.coordinator.apply(Mutation::SetOpacity { id, opacity }).await
    }

    pub async fn rename(&self, id: impl Into<NodeId>, name: impl Into<String>) -> Result<ApplyOutcome> {
        let mutation = Mutation::Rename {
            id: id.into(),
            name: name.into(),
        };
        self.coordinator.apply(mutation).await
    }

    /// Add a layer under `parent_id` (the root list for `None`), appending when
    /// `index` is `None`. Returns the id the service assigned.
    pub async fn add_layer(&self, node: LayerNode, parent_id: Option<NodeId>, index: Option<usize>) -> Result<NodeId> {
        let temp_id = node.id.clone();
        let outcome = self
            .apply_revealing(
                Mutation::Add {
                    node,
                    parent_id: parent_id.clone(),
                    index,
                },
                parent_id,
            )
            .await?;
        Ok(created_id(outcome, temp_id))
    }

    /// Add an empty group. Returns the id the service assigned.
    pub async fn add_group(&self, group: NewGroup, parent_id: Option<NodeId>) -> Result<NodeId> {
        self.add_layer(group.into_node(), parent_id, None).await
    }

    /// Delete a node and its subtree.
    pub async fn delete(&self, id: impl Into<NodeId>) -> Result<ApplyOutcome> {
        let id = id.into();
        let mut removed = self.coordinator.with_current(|tree| tree.descendant_ids(id.as_str()))?;
        removed.push(id.clone());

        let outcome = self.coordinator.apply(Mutation::Delete { id }).await?;
        self.selection.prune(&removed);
        let mut loaded = self.loaded_ids.lock();
        for id in &removed {
            loaded.remove(id);
        }
        Ok(outcome)
    }

    /// Finish a drag gesture. Returns `None` when the gesture was a no-op.
    #[tracing::instrument(skip_all, target = "strata_sync::session", level = "trace")]
    pub async fn drag_end(&self, gesture: DragGesture) -> Result<Option<ApplyOutcome>> {
        if !gesture.exceeds_activation(self.config.drag_activation_distance) {
            tracing::trace!(target: targets::SESSION, "pointer never activated a drag");
            return Ok(None);
        }
        let resolution = self
            .coordinator
            .with_current(|tree| self.drag.classify_and_resolve(tree, &gesture))?;
        let Some(resolution) = resolution else {
            return Ok(None);
        };

        tracing::debug!(target: targets::SESSION, kind = ?resolution.kind, "drag resolved");
        let reveal = match (&resolution.kind, &resolution.mutation) {
            (DragKind::Pack, Mutation::Move(op)) => op.to_parent_id.clone(),
            (DragKind::Pack, Mutation::Wrap { group, .. }) => Some(group.id.clone()),
            _ => None,
        };
        self.apply_revealing(resolution.mutation, reveal).await.map(Some)
    }

    // ========================================================================
    // Whole-tree operations
    // ========================================================================

    pub async fn import(&self, file: ImportFile) -> Result<()> {
        self.coordinator.import(file).await?;
        self.after_replace();
        Ok(())
    }

    pub async fn export(&self, format: ExportFormat) -> Result<Bytes> {
        self.coordinator.export(format).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.coordinator.reset().await?;
        self.after_replace();
        Ok(())
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Apply a mutation that puts something under `group`, expanding the
    /// group so the result is in view.
    async fn apply_revealing(&self, mutation: Mutation, group: Option<NodeId>) -> Result<ApplyOutcome> {
        let outcome = self.coordinator.apply(mutation).await?;
        if let ApplyOutcome::Created { temp_id, server_id } = &outcome {
            if temp_id != server_id {
                self.selection.remap(temp_id.as_str(), server_id);
            }
        }
        if let Some(group) = group {
            let group = match &outcome {
                ApplyOutcome::Created { temp_id, server_id } if *temp_id == group => server_id.clone(),
                _ => group,
            };
            if self.coordinator.with_current(|tree| tree.contains(group.as_str())) {
                self.selection.expand(group);
            }
        }
        Ok(outcome)
    }

    fn after_replace(&self) {
        // Store slots may call back into the session, so work on a copy.
        let tree = self.coordinator.snapshot();
        self.selection.reconcile(&tree);
        self.loaded_ids.lock().retain(|id| tree.contains(id.as_str()));
    }
}

fn created_id(outcome: ApplyOutcome, temp_id: NodeId) -> NodeId {
    match outcome {
        ApplyOutcome::Created { server_id, .. } => server_id,
        _ => temp_id,
    }
}
