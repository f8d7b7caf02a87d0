//! Optimistic mutation with rollback.
//!
//! [`SyncCoordinator::apply`] runs every tree mutation through the same
//! sequence:
//!
//! 1. Validate and apply the mutation to the local tree, recording a compact
//!    snapshot of what it replaced.
//! 2. Forward changed leaf state to the renderer.
//! 3. Push the mutation to the layer service with an idempotency token.
//! 4. On failure, restore the snapshot and emit [`SyncCoordinator::failed`].
//!
//! Every mutation takes a fresh sequence number and registers an undo record
//! for each aspect of the tree it changes: a leaf's visibility or opacity, a
//! node's name, a child list, or a node's existence and position. Records
//! for one aspect form a stack, oldest first.
//!
//! - A success drops its own record and every older one on the aspect.
//! - A failure of the newest record restores it.
//! - A failure of an older record hands its undo to the next newer
//!   mutation, which then restores past both if it fails too.
//!
//! A response that finds none of its records newest is stale and leaves
//! local state alone.
//!
//! The tree lock is only held for synchronous work, never across an
//! `.await`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use strata_core::logging::targets;
use strata_core::mutation::validate_permutation;
use strata_core::visibility::{self, leaf_states};
use strata_core::{
    LayerNode, LayerTree, MoveOp, Mutation, MutationKind, NodeId, RemovedNode, Signal, SyncKey, TreeError,
};

use crate::error::{Result, SyncError};
use crate::renderer::{NullRenderer, RendererSink};
use crate::service::{ExportFormat, IdempotencyToken, ImportFile, LayerService};

/// How a successful [`SyncCoordinator::apply`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The service accepted the mutation.
    Confirmed,
    /// A newer mutation for the same key was applied before the response
    /// arrived; the response was discarded.
    Superseded,
    /// The service created a node. `server_id` equals `temp_id` when the
    /// service kept the client id.
    Created { temp_id: NodeId, server_id: NodeId },
}

/// A rolled-back mutation, for the UI's transient notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub kind: MutationKind,
    pub key: SyncKey,
    pub error: SyncError,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not save {} of '{}': {}", self.kind, self.key, self.error)
    }
}

/// Where a node sat before it was moved.
#[derive(Debug, Clone, PartialEq)]
struct Placement {
    parent: Option<NodeId>,
    index: usize,
}

/// One independently owned part of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Aspect {
    Visibility(NodeId),
    Opacity(NodeId),
    Name(NodeId),
    /// The child list of a group or of the root.
    Children(SyncKey),
    /// Existence and position of a node.
    Structure(NodeId),
}

/// What a mutation replaced in one aspect, enough to put it back.
#[derive(Debug, Clone)]
enum Undo {
    Visible { id: NodeId, visible: bool },
    Opacity { id: NodeId, opacity: f32 },
    Name { id: NodeId, name: String },
    ChildOrder { parent: Option<NodeId>, ids: Vec<NodeId> },
    Placement { id: NodeId, from: Placement },
    Wrapped { id: NodeId, group_id: NodeId, from: Placement },
    Inserted(NodeId),
    Removed(RemovedNode),
}

impl Undo {
    fn aspect(&self) -> Aspect {
        match self {
            Self::Visible { id, .. } => Aspect::Visibility(id.clone()),
            Self::Opacity { id, .. } => Aspect::Opacity(id.clone()),
            Self::Name { id, .. } => Aspect::Name(id.clone()),
            Self::ChildOrder { parent, .. } => Aspect::Children(parent.clone().map_or(SyncKey::Root, SyncKey::Node)),
            Self::Placement { id, .. } | Self::Wrapped { id, .. } | Self::Inserted(id) => Aspect::Structure(id.clone()),
            Self::Removed(removed) => Aspect::Structure(removed.node.id.clone()),
        }
    }
}

/// An undo record waiting for its mutation's response.
struct InFlight {
    seq: u64,
    undo: Undo,
}

/// Leaf state changes to forward to the renderer.
#[derive(Debug, Default)]
struct RenderEffects {
    visibility: Vec<(NodeId, bool)>,
    opacity: Vec<(NodeId, f32)>,
}

impl RenderEffects {
    fn hide_leaves(node: &LayerNode) -> Self {
        let mut effects = Self::default();
        node.visit(&mut |n| {
            if n.visible() == Some(true) {
                effects.visibility.push((n.id.clone(), false));
            }
        });
        effects
    }

    fn show_leaves(node: &LayerNode) -> Self {
        let mut effects = Self::default();
        node.visit(&mut |n| {
            if let Some(props) = n.layer_props() {
                effects.visibility.push((n.id.clone(), props.visible));
                effects.opacity.push((n.id.clone(), props.opacity));
            }
        });
        effects
    }

    fn extend(&mut self, other: Self) {
        self.visibility.extend(other.visibility);
        self.opacity.extend(other.opacity);
    }
}

/// A mutation applied locally and waiting for the service.
struct Pending {
    seq: u64,
    key: SyncKey,
    kind: MutationKind,
    aspects: Vec<Aspect>,
    /// Original position of a wrapped node.
    origin: Option<Placement>,
}

/// Owns the layer tree and keeps it in step with the layer service.
pub struct SyncCoordinator<S, R = NullRenderer> {
    service: S,
    renderer: R,
    tree: Mutex<LayerTree>,
    next_seq: AtomicU64,
    in_flight: Mutex<HashMap<Aspect, Vec<InFlight>>>,
    failed: Signal<SyncFailure>,
    id_reconciled: Signal<(NodeId, NodeId)>,
    tree_replaced: Signal<()>,
}

impl<S, R> fmt::Debug for SyncCoordinator<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("nodes", &self.tree.lock().len())
            .field("in_flight_aspects", &self.in_flight.lock().len())
            .finish()
    }
}

impl<S: LayerService> SyncCoordinator<S> {
    /// Coordinator with an empty tree and no renderer.
    pub fn new(service: S) -> Self {
        Self::with_renderer(service, NullRenderer)
    }
}

impl<S: LayerService, R: RendererSink> SyncCoordinator<S, R> {
    pub fn with_renderer(service: S, renderer: R) -> Self {
        Self {
            service,
            renderer,
            tree: Mutex::new(LayerTree::new()),
            next_seq: AtomicU64::new(1),
            in_flight: Mutex::new(HashMap::new()),
            failed: Signal::new(),
            id_reconciled: Signal::new(),
            tree_replaced: Signal::new(),
        }
    }

    /// Start from an already loaded tree instead of an empty one.
    pub fn with_tree(self, tree: LayerTree) -> Self {
        *self.tree.lock() = tree;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// A copy of the current tree.
    pub fn snapshot(&self) -> LayerTree {
        self.tree.lock().clone()
    }

    /// Run `f` against the current tree without copying it.
    pub fn with_current<T>(&self, f: impl FnOnce(&LayerTree) -> T) -> T {
        f(&self.tree.lock())
    }

    /// Emitted after a remote failure was rolled back.
    pub fn failed(&self) -> &Signal<SyncFailure> {
        &self.failed
    }

    /// Emitted with `(temp_id, server_id)` when a created node's id changed.
    pub fn id_reconciled(&self) -> &Signal<(NodeId, NodeId)> {
        &self.id_reconciled
    }

    /// Emitted after hydrate, import or reset replaced the whole tree.
    pub fn tree_replaced(&self) -> &Signal<()> {
        &self.tree_replaced
    }

    // ========================================================================
    // Whole-tree operations
    // ========================================================================

    /// Fetch the tree from the service and make it current.
    #[tracing::instrument(skip_all, target = "strata_sync::coordinator", level = "trace")]
    pub async fn hydrate(&self) -> Result<()> {
        let roots = self.service.fetch_tree().await?;
        self.replace_tree(roots)
    }

    /// Upload a configuration file and make the returned tree current.
    pub async fn import(&self, file: ImportFile) -> Result<()> {
        let roots = self.service.push_import(file).await?;
        self.replace_tree(roots)
    }

    /// Restore the service's default tree and make it current.
    pub async fn reset(&self) -> Result<()> {
        let roots = self.service.push_reset().await?;
        self.replace_tree(roots)
    }

    pub async fn export(&self, format: ExportFormat) -> Result<Bytes> {
        self.service.push_export(format).await
    }

    fn replace_tree(&self, roots: Vec<LayerNode>) -> Result<()> {
        let tree = LayerTree::from_roots(roots)?;
        let states = leaf_states(&tree);
        *self.tree.lock() = tree;
        // Responses still in flight belong to the old tree.
        self.in_flight.lock().clear();

        tracing::debug!(target: targets::COORDINATOR, leaves = states.len(), "tree replaced");
        for state in &states {
            self.renderer.apply_state(state);
        }
        self.tree_replaced.emit(());
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Apply `mutation` optimistically and push it to the service.
    ///
    /// Local rejections (`SyncError::Tree`) leave the tree untouched and call
    /// nothing. Remote failures are rolled back, reported through
    /// [`failed`](Self::failed), and returned. A response that arrives after
    /// newer mutations took over everything it changed yields
    /// [`ApplyOutcome::Superseded`].
    #[tracing::instrument(skip_all, target = "strata_sync::coordinator", level = "trace", fields(kind = %mutation.kind()))]
    pub async fn apply(&self, mutation: Mutation) -> Result<ApplyOutcome> {
        let pending = self.apply_local(&mutation)?;
        let token = IdempotencyToken::new(pending.key.to_string(), pending.kind, pending.seq);

        match self.push(&mutation, &pending, &token).await {
            Ok(created) => Ok(self.confirm(&pending, created)),
            Err(error) => self.fail(pending, error),
        }
    }

    fn apply_local(&self, mutation: &Mutation) -> Result<Pending> {
        let mut tree = self.tree.lock();
        let (updated, undo, effects) = optimistic(&tree, mutation).map_err(|e| {
            tracing::debug!(target: targets::COORDINATOR, kind = %mutation.kind(), "rejected locally: {}", e);
            SyncError::Tree(e)
        })?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let key = mutation.sync_key();
        let origin = undo.iter().find_map(|record| match record {
            Undo::Wrapped { from, .. } => Some(from.clone()),
            _ => None,
        });
        let mut aspects = Vec::with_capacity(undo.len());
        {
            let mut in_flight = self.in_flight.lock();
            for record in undo {
                let aspect = record.aspect();
                in_flight.entry(aspect.clone()).or_default().push(InFlight { seq, undo: record });
                aspects.push(aspect);
            }
        }
        *tree = updated;
        drop(tree);

        self.render(&effects);
        tracing::trace!(target: targets::COORDINATOR, seq, key = %key, "applied optimistically");
        Ok(Pending {
            seq,
            key,
            kind: mutation.kind(),
            aspects,
            origin,
        })
    }

    /// Send the mutation. Returns the created node for adds and wraps.
    ///
    /// Follow-up requests of one mutation each carry their own token step.
    async fn push(
        &self,
        mutation: &Mutation,
        pending: &Pending,
        token: &IdempotencyToken,
    ) -> Result<Option<(NodeId, NodeId)>> {
        let service = &self.service;
        match mutation {
            Mutation::SetVisibility { id, visible } => service.push_visibility(token, id, *visible).await.map(|()| None),
            Mutation::SetOpacity { id, opacity } => service.push_opacity(token, id, *opacity).await.map(|()| None),
            Mutation::Rename { id, name } => service.push_rename(token, id, name.trim()).await.map(|()| None),
            Mutation::Reorder {
                parent_id,
                ordered_ids,
            } => service
                .push_reorder(token, parent_id.as_ref(), ordered_ids)
                .await
                .map(|()| None),
            Mutation::Move(op) => service.push_move(token, op).await.map(|()| None),
            Mutation::Add {
                node,
                parent_id,
                index,
            } => {
                let created = service.push_add(token, node, parent_id.as_ref()).await?;
                if let Some(index) = index {
                    let op = MoveOp {
                        moved_id: created.id.clone(),
                        from_parent_id: parent_id.clone(),
                        to_parent_id: parent_id.clone(),
                        to_index: *index,
                    };
                    service.push_move(&token.step("place"), &op).await?;
                }
                Ok(Some((node.id.clone(), created.id)))
            }
            Mutation::Wrap { moved_id, group } => {
                let Placement { parent, index } = pending
                    .origin
                    .clone()
                    .ok_or_else(|| SyncError::Tree(TreeError::not_found(moved_id)))?;
                let created = service.push_add(token, &group.clone().into_node(), parent.as_ref()).await?;
                let place_group = MoveOp {
                    moved_id: created.id.clone(),
                    from_parent_id: parent.clone(),
                    to_parent_id: parent.clone(),
                    to_index: index,
                };
                service.push_move(&token.step("place"), &place_group).await?;
                let pack = MoveOp {
                    moved_id: moved_id.clone(),
                    from_parent_id: parent,
                    to_parent_id: Some(created.id.clone()),
                    to_index: 0,
                };
                service.push_move(&token.step("pack"), &pack).await?;
                Ok(Some((group.id.clone(), created.id)))
            }
            Mutation::Delete { id } => service.push_delete(token, id).await.map(|()| None),
        }
    }

    /// Drop the records of `pending` and everything older on its aspects.
    ///
    /// Returns true when `pending` was still the newest mutation on every
    /// aspect it found.
    fn release_confirmed(&self, pending: &Pending) -> bool {
        if pending.aspects.is_empty() {
            return true;
        }
        let mut in_flight = self.in_flight.lock();
        let mut found = false;
        let mut newest = true;
        for aspect in &pending.aspects {
            if let Some(stack) = in_flight.get_mut(aspect) {
                if let Some(pos) = stack.iter().position(|entry| entry.seq == pending.seq) {
                    found = true;
                    newest &= pos + 1 == stack.len();
                    stack.drain(..=pos);
                }
                if stack.is_empty() {
                    in_flight.remove(aspect);
                }
            }
        }
        found && newest
    }

    /// Drop the records of a failed `pending`.
    ///
    /// Returns the undo records of aspects where it was newest. On the other
    /// aspects its undo replaces that of the next newer mutation.
    fn release_failed(&self, pending: &Pending) -> Vec<Undo> {
        let mut in_flight = self.in_flight.lock();
        let mut owned = Vec::new();
        for aspect in &pending.aspects {
            if let Some(stack) = in_flight.get_mut(aspect) {
                if let Some(pos) = stack.iter().position(|entry| entry.seq == pending.seq) {
                    let failed = stack.remove(pos);
                    match stack.get_mut(pos) {
                        Some(newer) => newer.undo = failed.undo,
                        None => owned.push(failed.undo),
                    }
                }
                if stack.is_empty() {
                    in_flight.remove(aspect);
                }
            }
        }
        owned
    }

    fn confirm(&self, pending: &Pending, created: Option<(NodeId, NodeId)>) -> ApplyOutcome {
        let newest = self.release_confirmed(pending);
        if let Some((temp_id, server_id)) = created {
            return self.reconcile_id(temp_id, server_id);
        }
        if !newest {
            tracing::debug!(target: targets::COORDINATOR, seq = pending.seq, key = %pending.key, "discarding stale success");
            return ApplyOutcome::Superseded;
        }
        ApplyOutcome::Confirmed
    }

    fn reconcile_id(&self, temp_id: NodeId, server_id: NodeId) -> ApplyOutcome {
        if temp_id != server_id {
            let mut tree = self.tree.lock();
            match tree.replace_id(temp_id.as_str(), server_id.clone()) {
                Ok(updated) => {
                    *tree = updated;
                    drop(tree);
                    tracing::debug!(target: targets::COORDINATOR, temp = %temp_id, server = %server_id, "reconciled created id");
                    self.id_reconciled.emit((temp_id.clone(), server_id.clone()));
                }
                Err(e) => {
                    tracing::debug!(target: targets::COORDINATOR, temp = %temp_id, "created node no longer present: {}", e);
                }
            }
        }
        ApplyOutcome::Created { temp_id, server_id }
    }

    fn fail(&self, pending: Pending, error: SyncError) -> Result<ApplyOutcome> {
        let undo = self.release_failed(&pending);
        if undo.is_empty() && !pending.aspects.is_empty() {
            tracing::debug!(
                target: targets::COORDINATOR,
                seq = pending.seq,
                key = %pending.key,
                "failure handed to newer mutations: {}",
                error
            );
            return Ok(ApplyOutcome::Superseded);
        }

        tracing::warn!(
            target: targets::COORDINATOR,
            kind = %pending.kind,
            key = %pending.key,
            "layer service call failed, rolling back: {}",
            error
        );
        self.rollback(pending.seq, undo);

        self.failed.emit(SyncFailure {
            kind: pending.kind,
            key: pending.key,
            error: error.clone(),
        });
        Err(error)
    }

    fn rollback(&self, seq: u64, undo: Vec<Undo>) {
        let mut tree = self.tree.lock();
        let mut current: Option<LayerTree> = None;
        let mut effects = RenderEffects::default();
        let mut leaves = Vec::new();

        for record in undo {
            if let Undo::Visible { id, visible } = record {
                leaves.push((id, visible));
                continue;
            }
            let base = current.as_ref().unwrap_or(&*tree);
            match restore(base, record) {
                Ok((updated, restored)) => {
                    current = Some(updated);
                    effects.extend(restored);
                }
                Err(e) => {
                    tracing::warn!(target: targets::COORDINATOR, seq, "rollback not possible: {}", e);
                }
            }
        }

        if !leaves.is_empty() {
            let base = current.as_ref().unwrap_or(&*tree);
            let changed: Vec<(NodeId, bool)> = leaves
                .into_iter()
                .filter(|(id, visible)| base.find(id.as_str()).and_then(LayerNode::visible).is_some_and(|v| v != *visible))
                .collect();
            if !changed.is_empty() {
                current = Some(visibility::restore_visibility(base, &changed));
                effects.visibility.extend(changed);
            }
        }

        if let Some(updated) = current {
            *tree = updated;
        }
        drop(tree);
        self.render(&effects);
        tracing::debug!(target: targets::COORDINATOR, seq, "rolled back");
    }

    fn render(&self, effects: &RenderEffects) {
        for (id, visible) in &effects.visibility {
            self.renderer.apply_visibility(id, *visible);
        }
        for (id, opacity) in &effects.opacity {
            self.renderer.apply_opacity(id, *opacity);
        }
    }
}

/// Apply `mutation` to `tree`, returning the new tree, the undo records per
/// aspect, and the renderer updates it causes.
fn optimistic(tree: &LayerTree, mutation: &Mutation) -> strata_core::Result<(LayerTree, Vec<Undo>, RenderEffects)> {
    match mutation {
        Mutation::SetVisibility { id, visible } => {
            let before = tree.find_by_id(id.as_str())?;
            // Every leaf below is set, including those already at `visible`.
            let mut undo = Vec::new();
            before.visit(&mut |n| {
                if let Some(previous) = n.visible() {
                    undo.push(Undo::Visible {
                        id: n.id.clone(),
                        visible: previous,
                    });
                }
            });
            let (updated, changed) = visibility::toggle_visibility(tree, id.as_str(), *visible)?;
            let effects = RenderEffects {
                visibility: changed.into_iter().map(|leaf| (leaf, *visible)).collect(),
                opacity: Vec::new(),
            };
            Ok((updated, undo, effects))
        }
        Mutation::SetOpacity { id, opacity } => {
            let previous = tree.find_by_id(id.as_str())?.opacity();
            let updated = visibility::set_opacity(tree, id.as_str(), *opacity)?;
            let applied = updated.find(id.as_str()).and_then(LayerNode::opacity).unwrap_or(*opacity);
            let effects = RenderEffects {
                visibility: Vec::new(),
                opacity: vec![(id.clone(), applied)],
            };
            let undo = Undo::Opacity {
                id: id.clone(),
                opacity: previous.unwrap_or(applied),
            };
            Ok((updated, vec![undo], effects))
        }
        Mutation::Rename { id, name } => {
            let previous = tree.find_by_id(id.as_str())?.name.clone();
            let updated = tree.rename(id.as_str(), name)?;
            let undo = Undo::Name {
                id: id.clone(),
                name: previous,
            };
            Ok((updated, vec![undo], RenderEffects::default()))
        }
        Mutation::Reorder {
            parent_id,
            ordered_ids,
        } => {
            let parent = parent_id.as_ref().map(NodeId::as_str);
            validate_permutation(tree, parent, ordered_ids)?;
            let ids = tree.children_of(parent)?.iter().map(|n| n.id.clone()).collect();
            let updated = tree.set_child_order(parent, ordered_ids)?;
            let undo = Undo::ChildOrder {
                parent: parent_id.clone(),
                ids,
            };
            Ok((updated, vec![undo], RenderEffects::default()))
        }
        Mutation::Move(op) => {
            let from = placement_of(tree, &op.moved_id)?;
            let undo = Undo::Placement {
                id: op.moved_id.clone(),
                from,
            };
            Ok((tree.move_node(op)?, vec![undo], RenderEffects::default()))
        }
        Mutation::Wrap { moved_id, group } => {
            let undo = Undo::Wrapped {
                id: moved_id.clone(),
                group_id: group.id.clone(),
                from: placement_of(tree, moved_id)?,
            };
            let updated = tree.wrap_in_group(moved_id.as_str(), group.clone())?;
            Ok((updated, vec![undo], RenderEffects::default()))
        }
        Mutation::Add {
            node,
            parent_id,
            index,
        } => {
            let updated = tree.insert_node(node.clone(), parent_id.as_ref().map(NodeId::as_str), *index)?;
            Ok((updated, vec![Undo::Inserted(node.id.clone())], RenderEffects::show_leaves(node)))
        }
        Mutation::Delete { id } => {
            let (updated, removed) = tree.remove_node(id.as_str())?;
            let effects = RenderEffects::hide_leaves(&removed.node);
            Ok((updated, vec![Undo::Removed(removed)], effects))
        }
    }
}

fn placement_of(tree: &LayerTree, id: &NodeId) -> strata_core::Result<Placement> {
    let location = tree.location(id.as_str()).ok_or_else(|| TreeError::not_found(id))?;
    Ok(Placement {
        parent: location.parent.clone(),
        index: location.index(),
    })
}

/// Undo one structural or value record against the current tree.
fn restore(tree: &LayerTree, undo: Undo) -> strata_core::Result<(LayerTree, RenderEffects)> {
    match undo {
        Undo::Visible { id, visible } => {
            let effects = RenderEffects {
                visibility: vec![(id.clone(), visible)],
                opacity: Vec::new(),
            };
            Ok((visibility::restore_visibility(tree, &[(id, visible)]), effects))
        }
        Undo::Opacity { id, opacity } => {
            let updated = visibility::set_opacity(tree, id.as_str(), opacity)?;
            let effects = RenderEffects {
                visibility: Vec::new(),
                opacity: vec![(id, opacity)],
            };
            Ok((updated, effects))
        }
        Undo::Name { id, name } => Ok((tree.rename(id.as_str(), &name)?, RenderEffects::default())),
        Undo::ChildOrder { parent, ids } => {
            let parent = parent.as_ref().map(NodeId::as_str);
            Ok((restore_order(tree, parent, &ids)?, RenderEffects::default()))
        }
        Undo::Placement { id, from } => Ok((move_back(tree, &id, &from)?, RenderEffects::default())),
        Undo::Wrapped { id, group_id, from } => {
            let moved = move_back(tree, &id, &from)?;
            let updated = if moved.children_of(Some(group_id.as_str()))?.is_empty() {
                moved.remove_node(group_id.as_str())?.0
            } else {
                moved
            };
            Ok((updated, RenderEffects::default()))
        }
        // Already gone when a newer delete of the same node went through first.
        Undo::Inserted(id) => match tree.remove_node(id.as_str()) {
            Ok((updated, removed)) => Ok((updated, RenderEffects::hide_leaves(&removed.node))),
            Err(e) if e.is_not_found() => Ok((tree.clone(), RenderEffects::default())),
            Err(e) => Err(e),
        },
        Undo::Removed(removed) => {
            let parent = removed.parent_id.as_ref().map(NodeId::as_str);
            let index = removed.index.min(tree.children_of(parent).map_or(0, <[LayerNode]>::len));
            let effects = RenderEffects::show_leaves(&removed.node);
            Ok((tree.insert_node(removed.node, parent, Some(index))?, effects))
        }
    }
}

/// Put the children of `parent` back into `previous` order. Children added
/// since keep their relative order at the end.
fn restore_order(tree: &LayerTree, parent: Option<&str>, previous: &[NodeId]) -> strata_core::Result<LayerTree> {
    let current: Vec<NodeId> = tree.children_of(parent)?.iter().map(|n| n.id.clone()).collect();
    let present: HashSet<&NodeId> = current.iter().collect();
    let mut order: Vec<NodeId> = previous.iter().filter(|id| present.contains(id)).cloned().collect();
    let listed: HashSet<NodeId> = order.iter().cloned().collect();
    order.extend(current.into_iter().filter(|id| !listed.contains(id)));
    tree.set_child_order(parent, &order)
}

fn move_back(tree: &LayerTree, id: &NodeId, to: &Placement) -> strata_core::Result<LayerTree> {
    let from_parent_id = tree.parent_of(id.as_str())?.cloned();
    tree.move_node(&MoveOp {
        moved_id: id.clone(),
        from_parent_id,
        to_parent_id: to.parent.clone(),
        to_index: to.index,
    })
}
