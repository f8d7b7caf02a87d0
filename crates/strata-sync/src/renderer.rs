//! One-way notifications to the map renderer.

use strata_core::{LeafState, NodeId};

/// Receives effective leaf state whenever it changes.
///
/// Calls are fire-and-forget. The renderer maps layer ids onto its own draw
/// layers.
pub trait RendererSink: Send + Sync {
    fn apply_visibility(&self, id: &NodeId, visible: bool);

    fn apply_opacity(&self, id: &NodeId, opacity: f32);

    /// Push a full leaf state, e.g. after the whole tree was replaced.
    fn apply_state(&self, state: &LeafState) {
        self.apply_visibility(&state.id, state.visible);
        self.apply_opacity(&state.id, state.opacity);
    }
}

/// A renderer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl RendererSink for NullRenderer {
    fn apply_visibility(&self, _id: &NodeId, _visible: bool) {}

    fn apply_opacity(&self, _id: &NodeId, _opacity: f32) {}
}

impl<R: RendererSink + ?Sized> RendererSink for std::sync::Arc<R> {
    fn apply_visibility(&self, id: &NodeId, visible: bool) {
        (**self).apply_visibility(id, visible);
    }

    fn apply_opacity(&self, id: &NodeId, opacity: f32) {
        (**self).apply_opacity(id, opacity);
    }
}
