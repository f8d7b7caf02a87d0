//! Scripted layer service and recording renderer shared by the sync tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use strata_core::{LayerNode, LayerTree, MoveOp, NodeId};
use strata_sync::{
    ExportFormat, IdempotencyToken, ImportFile, LayerService, RendererSink, Result, SyncCoordinator, SyncError,
};
use tokio::sync::oneshot;

/// A layer service whose replies are released by the test.
///
/// Mutating calls look up a gate by the token's sequence number. Ungated
/// calls succeed immediately; gated calls wait until the test sends a result.
#[derive(Default)]
pub struct ScriptedService {
    calls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<String>>,
    gates: Mutex<HashMap<u64, oneshot::Receiver<Result<()>>>>,
    server_ids: Mutex<HashMap<String, String>>,
    trees: Mutex<VecDeque<Vec<LayerNode>>>,
}

impl ScriptedService {
    /// Hold the reply for mutation number `seq` until the sender fires.
    pub fn gate(&self, seq: u64) -> oneshot::Sender<Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(seq, rx);
        tx
    }

    /// Fail mutation number `seq` immediately with `error`.
    pub fn fail(&self, seq: u64, error: SyncError) {
        let tx = self.gate(seq);
        let _ = tx.send(Err(error));
    }

    /// Make `push_add` answer with `server_id` for `temp_id`.
    pub fn assign_id(&self, temp_id: &str, server_id: &str) {
        self.server_ids.lock().insert(temp_id.to_string(), server_id.to_string());
    }

    /// Queue a tree for the next fetch, import or reset.
    pub fn queue_tree(&self, roots: Vec<LayerNode>) {
        self.trees.lock().push_back(roots);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }

    /// Wait until at least `n` calls were recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls.lock().len() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("service was never called");
    }

    async fn record(&self, token: &IdempotencyToken, call: String) -> Result<()> {
        self.calls.lock().push(call);
        self.tokens.lock().push(token.to_string());
        let gate = self.gates.lock().remove(&token.seq);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(SyncError::RemoteUnreachable("gate dropped".into()))),
            None => Ok(()),
        }
    }

    fn next_tree(&self, call: &str) -> Result<Vec<LayerNode>> {
        self.calls.lock().push(call.to_string());
        Ok(self.trees.lock().pop_front().unwrap_or_default())
    }
}

impl LayerService for ScriptedService {
    async fn fetch_tree(&self) -> Result<Vec<LayerNode>> {
        self.next_tree("fetch")
    }

    async fn push_visibility(&self, token: &IdempotencyToken, id: &NodeId, visible: bool) -> Result<()> {
        self.record(token, format!("visibility {id}={visible}")).await
    }

    async fn push_opacity(&self, token: &IdempotencyToken, id: &NodeId, opacity: f32) -> Result<()> {
        self.record(token, format!("opacity {id}={opacity}")).await
    }

    async fn push_reorder(
        &self,
        token: &IdempotencyToken,
        parent_id: Option<&NodeId>,
        ordered_ids: &[NodeId],
    ) -> Result<()> {
        let parent = parent_id.map_or("<root>".to_string(), NodeId::to_string);
        let ids: Vec<&str> = ordered_ids.iter().map(NodeId::as_str).collect();
        self.record(token, format!("reorder {parent} [{}]", ids.join(","))).await
    }

    async fn push_move(&self, token: &IdempotencyToken, op: &MoveOp) -> Result<()> {
        let to = op.to_parent_id.as_ref().map_or("<root>".to_string(), NodeId::to_string);
        self.record(token, format!("move {} -> {to}@{}", op.moved_id, op.to_index))
            .await
    }

    async fn push_rename(&self, token: &IdempotencyToken, id: &NodeId, name: &str) -> Result<()> {
        self.record(token, format!("rename {id}={name}")).await
    }

    async fn push_add(&self, token: &IdempotencyToken, node: &LayerNode, parent_id: Option<&NodeId>) -> Result<LayerNode> {
        let parent = parent_id.map_or("<root>".to_string(), NodeId::to_string);
        self.record(token, format!("add {} under {parent}", node.id)).await?;
        let mut created = node.clone();
        if let Some(server_id) = self.server_ids.lock().get(node.id.as_str()) {
            created.id = NodeId::from(server_id.as_str());
        }
        Ok(created)
    }

    async fn push_delete(&self, token: &IdempotencyToken, id: &NodeId) -> Result<()> {
        self.record(token, format!("delete {id}")).await
    }

    async fn push_import(&self, file: ImportFile) -> Result<Vec<LayerNode>> {
        self.next_tree(&format!("import {}", file.file_name))
    }

    async fn push_export(&self, format: ExportFormat) -> Result<Bytes> {
        self.calls.lock().push(format!("export {format}"));
        Ok(Bytes::from_static(b"{}"))
    }

    async fn push_reset(&self) -> Result<Vec<LayerNode>> {
        self.next_tree("reset")
    }
}

/// What the renderer was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Visibility(String, bool),
    Opacity(String, f32),
}

#[derive(Debug, Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl RendererSink for RecordingRenderer {
    fn apply_visibility(&self, id: &NodeId, visible: bool) {
        self.events.lock().push(RenderEvent::Visibility(id.to_string(), visible));
    }

    fn apply_opacity(&self, id: &NodeId, opacity: f32) {
        self.events.lock().push(RenderEvent::Opacity(id.to_string(), opacity));
    }
}

/// base { osm, ortho }, roads, parcels
pub fn sample_tree() -> LayerTree {
    LayerTree::from_roots(vec![
        LayerNode::group(
            "base",
            "Base maps",
            vec![
                LayerNode::raster("osm", "OpenStreetMap"),
                LayerNode::raster("ortho", "Orthophoto").with_opacity(0.6),
            ],
        ),
        LayerNode::raster("roads", "Roads"),
        LayerNode::raster("parcels", "Parcels").with_visible(false),
    ])
    .unwrap()
}

pub type TestCoordinator = SyncCoordinator<ScriptedService, Arc<RecordingRenderer>>;

pub fn coordinator(tree: LayerTree) -> (Arc<TestCoordinator>, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let coordinator = SyncCoordinator::with_renderer(ScriptedService::default(), renderer.clone()).with_tree(tree);
    (Arc::new(coordinator), renderer)
}

/// Ids of the children of `parent`, or of the root list.
pub fn child_ids(tree: &LayerTree, parent: Option<&str>) -> Vec<String> {
    tree.children_of(parent)
        .unwrap()
        .iter()
        .map(|n| n.id.to_string())
        .collect()
}
