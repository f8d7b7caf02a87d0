//! Selection and expansion state.
//!
//! [`SelectionStore`] tracks which nodes are expanded and which are selected,
//! plus the current search query and the active layer. It knows nothing
//! about the tree's content beyond ids; after a tree fetch,
//! [`SelectionStore::reconcile`] drops ids that no longer exist.
//!
//! The expanded and selected sets are mirrored to a [`KeyValueStore`] on
//! every write, under `<namespace>.expanded` and `<namespace>.selected`.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::logging::targets;
use crate::node::NodeId;
use crate::prefs::{KeyValueStore, MemoryStore};
use crate::signal::Signal;
use crate::tree::LayerTree;

/// What part of the store changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    Expanded,
    Selected,
    SearchQuery,
    Active,
}

#[derive(Debug, Default)]
struct SelectionState {
    expanded: HashSet<NodeId>,
    selected: HashSet<NodeId>,
    search_query: String,
    active: Option<NodeId>,
    /// Set when nothing was persisted; the next reconcile expands every group.
    expand_on_reconcile: bool,
}

/// Expanded/selected id sets with durable mirroring.
pub struct SelectionStore {
    state: RwLock<SelectionState>,
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    changed: Signal<SelectionChange>,
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStore")
            .field("namespace", &self.namespace)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl SelectionStore {
    /// Read persisted state from `store` under `namespace`.
    pub fn open(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let expanded = store.get_value(&key(&namespace, "expanded"));
        let selected = store.get_value(&key(&namespace, "selected"));
        let expand_on_reconcile = expanded.is_none() && selected.is_none();

        let state = SelectionState {
            expanded: expanded.as_ref().map(read_ids).unwrap_or_default(),
            selected: selected.as_ref().map(read_ids).unwrap_or_default(),
            expand_on_reconcile,
            ..SelectionState::default()
        };
        tracing::debug!(
            target: targets::SELECTION,
            namespace = %namespace,
            expanded = state.expanded.len(),
            selected = state.selected.len(),
            "opened selection store"
        );

        Self {
            state: RwLock::new(state),
            store,
            namespace,
            changed: Signal::new(),
        }
    }

    /// Store using the namespace from `config`.
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &EngineConfig) -> Self {
        Self::open(store, config.preferences_namespace.clone())
    }

    /// Store backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStore::new()), EngineConfig::default().preferences_namespace)
    }

    pub fn changed(&self) -> &Signal<SelectionChange> {
        &self.changed
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn expanded(&self) -> HashSet<NodeId> {
        self.state.read().expanded.clone()
    }

    pub fn selected(&self) -> HashSet<NodeId> {
        self.state.read().selected.clone()
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.state.read().expanded.contains(id)
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.state.read().selected.contains(id)
    }

    pub fn search_query(&self) -> String {
        self.state.read().search_query.clone()
    }

    pub fn active(&self) -> Option<NodeId> {
        self.state.read().active.clone()
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    pub fn expand(&self, id: impl Into<NodeId>) {
        let id = id.into();
        self.update_expanded(|set| set.insert(id));
    }

    pub fn collapse(&self, id: &str) {
        self.update_expanded(|set| set.remove(id));
    }

    /// Flip expansion of `id`. Returns whether it is now expanded.
    pub fn toggle_expanded(&self, id: impl Into<NodeId>) -> bool {
        let id = id.into();
        let mut now_expanded = false;
        self.update_expanded(|set| {
            now_expanded = !set.remove(&id);
            if now_expanded {
                set.insert(id);
            }
            true
        });
        now_expanded
    }

    /// Replace the expanded set.
    pub fn set_expanded<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        let ids: HashSet<NodeId> = ids.into_iter().map(Into::into).collect();
        self.update_expanded(|set| {
            let changed = *set != ids;
            *set = ids;
            changed
        });
    }

    /// Expand every group in `tree`.
    pub fn expand_all(&self, tree: &LayerTree) {
        let groups = tree.group_ids();
        self.update_expanded(|set| {
            let before = set.len();
            set.extend(groups);
            set.len() != before
        });
    }

    pub fn collapse_all(&self) {
        self.update_expanded(|set| {
            let changed = !set.is_empty();
            set.clear();
            changed
        });
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn select(&self, id: impl Into<NodeId>) {
        let id = id.into();
        self.update_selected(|set| set.insert(id));
    }

    pub fn deselect(&self, id: &str) {
        self.update_selected(|set| set.remove(id));
    }

    /// Flip selection of `id`. Returns whether it is now selected.
    pub fn toggle_selected(&self, id: impl Into<NodeId>) -> bool {
        let id = id.into();
        let mut now_selected = false;
        self.update_selected(|set| {
            now_selected = !set.remove(&id);
            if now_selected {
                set.insert(id);
            }
            true
        });
        now_selected
    }

    /// Replace the selected set.
    pub fn set_selected<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        let ids: HashSet<NodeId> = ids.into_iter().map(Into::into).collect();
        self.update_selected(|set| {
            let changed = *set != ids;
            *set = ids;
            changed
        });
    }

    pub fn clear_selection(&self) {
        self.update_selected(|set| {
            let changed = !set.is_empty();
            set.clear();
            changed
        });
    }

    // ========================================================================
    // Search and active layer
    // ========================================================================

    /// Set the filter query. Not persisted.
    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        let changed = {
            let mut state = self.state.write();
            let changed = state.search_query != query;
            state.search_query = query;
            changed
        };
        if changed {
            self.changed.emit(SelectionChange::SearchQuery);
        }
    }

    pub fn set_active(&self, id: Option<NodeId>) {
        let changed = {
            let mut state = self.state.write();
            let changed = state.active != id;
            state.active = id;
            changed
        };
        if changed {
            self.changed.emit(SelectionChange::Active);
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop ids that are not in `tree`.
    ///
    /// On the first reconcile after opening a store with nothing persisted,
    /// every group is expanded instead.
    #[tracing::instrument(skip_all, target = "strata_core::selection", level = "trace")]
    pub fn reconcile(&self, tree: &LayerTree) {
        let first_load = std::mem::take(&mut self.state.write().expand_on_reconcile);
        if first_load {
            tracing::debug!(target: targets::SELECTION, "nothing persisted, expanding all groups");
            self.expand_all(tree);
        }

        self.update_expanded(|set| retain_existing(set, tree));
        self.update_selected(|set| retain_existing(set, tree));

        let active_missing = self
            .state
            .read()
            .active
            .as_ref()
            .is_some_and(|id| !tree.contains(id.as_str()));
        if active_missing {
            self.set_active(None);
        }
    }

    /// Remove `ids` from every set, e.g. after deleting a subtree.
    pub fn prune(&self, ids: &[NodeId]) {
        self.update_expanded(|set| ids.iter().fold(false, |changed, id| set.remove(id) | changed));
        self.update_selected(|set| ids.iter().fold(false, |changed, id| set.remove(id) | changed));
        let active_pruned = self.state.read().active.as_ref().is_some_and(|a| ids.contains(a));
        if active_pruned {
            self.set_active(None);
        }
    }

    /// Replace `old` with `new` wherever it appears.
    pub fn remap(&self, old: &str, new: &NodeId) {
        self.update_expanded(|set| replace_in(set, old, new));
        self.update_selected(|set| replace_in(set, old, new));
        let is_active = self.state.read().active.as_ref().is_some_and(|a| a == old);
        if is_active {
            self.set_active(Some(new.clone()));
        }
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn update_expanded(&self, f: impl FnOnce(&mut HashSet<NodeId>) -> bool) {
        let snapshot = {
            let mut state = self.state.write();
            if !f(&mut state.expanded) {
                return;
            }
            state.expanded.clone()
        };
        self.persist("expanded", &snapshot);
        self.changed.emit(SelectionChange::Expanded);
    }

    fn update_selected(&self, f: impl FnOnce(&mut HashSet<NodeId>) -> bool) {
        let snapshot = {
            let mut state = self.state.write();
            if !f(&mut state.selected) {
                return;
            }
            state.selected.clone()
        };
        self.persist("selected", &snapshot);
        self.changed.emit(SelectionChange::Selected);
    }

    fn persist(&self, name: &str, ids: &HashSet<NodeId>) {
        let mut sorted: Vec<&str> = ids.iter().map(NodeId::as_str).collect();
        sorted.sort_unstable();
        let value = Value::Array(sorted.into_iter().map(|id| Value::String(id.to_string())).collect());
        self.store.set_value(&key(&self.namespace, name), value);
        tracing::trace!(target: targets::SELECTION, set = name, len = ids.len(), "persisted");
    }
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}.{name}")
}

fn read_ids(value: &Value) -> HashSet<NodeId> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(NodeId::from).collect())
        .unwrap_or_default()
}

fn retain_existing(set: &mut HashSet<NodeId>, tree: &LayerTree) -> bool {
    let before = set.len();
    set.retain(|id| tree.contains(id.as_str()));
    set.len() != before
}

fn replace_in(set: &mut HashSet<NodeId>, old: &str, new: &NodeId) -> bool {
    if set.remove(old) {
        set.insert(new.clone());
        true
    } else {
        false
    }
}
