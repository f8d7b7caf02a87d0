//! The remote layer service contract.
//!
//! [`LayerService`] is everything the coordinator needs from the backend.
//! [`HttpLayerService`](crate::http::HttpLayerService) implements it over
//! REST; tests implement it with scripted fakes.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use strata_core::{LayerNode, MoveOp, MutationKind, NodeId};

use crate::error::Result;

/// Identifies one remote call for server-side deduplication.
///
/// Displayed as `"<node>:<kind>:<seq>"`. Mutations that need several
/// requests give each follow-up request its own step, displayed as
/// `"<node>:<kind>:<seq>.<step>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyToken {
    pub node_id: NodeId,
    pub kind: MutationKind,
    pub seq: u64,
    pub step: Option<&'static str>,
}

impl IdempotencyToken {
    pub fn new(node_id: impl Into<NodeId>, kind: MutationKind, seq: u64) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            seq,
            step: None,
        }
    }

    /// The token for a follow-up request of the same mutation.
    pub fn step(&self, step: &'static str) -> Self {
        Self {
            step: Some(step),
            ..self.clone()
        }
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.node_id, self.kind, self.seq)?;
        if let Some(step) = self.step {
            write!(f, ".{step}")?;
        }
        Ok(())
    }
}

/// Layer configuration export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Xml,
    Qgis,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Qgis => "qgis",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A layer configuration file to import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFile {
    pub file_name: String,
    pub content: Bytes,
}

impl ImportFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// Remote operations on the layer tree.
///
/// Every call is independent; the service does not retry. Mutating calls
/// carry an [`IdempotencyToken`].
pub trait LayerService: Send + Sync {
    /// The root-level nodes of the current tree.
    fn fetch_tree(&self) -> impl Future<Output = Result<Vec<LayerNode>>> + Send;

    fn push_visibility(
        &self,
        token: &IdempotencyToken,
        id: &NodeId,
        visible: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    fn push_opacity(
        &self,
        token: &IdempotencyToken,
        id: &NodeId,
        opacity: f32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replace the child order of `parent_id`, or of the root list for `None`.
    fn push_reorder(
        &self,
        token: &IdempotencyToken,
        parent_id: Option<&NodeId>,
        ordered_ids: &[NodeId],
    ) -> impl Future<Output = Result<()>> + Send;

    fn push_move(&self, token: &IdempotencyToken, op: &MoveOp) -> impl Future<Output = Result<()>> + Send;

    fn push_rename(
        &self,
        token: &IdempotencyToken,
        id: &NodeId,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create `node` (a layer or an empty group) and return it as stored.
    ///
    /// The returned node may carry a server-assigned id.
    fn push_add(
        &self,
        token: &IdempotencyToken,
        node: &LayerNode,
        parent_id: Option<&NodeId>,
    ) -> impl Future<Output = Result<LayerNode>> + Send;

    fn push_delete(&self, token: &IdempotencyToken, id: &NodeId) -> impl Future<Output = Result<()>> + Send;

    /// Upload a configuration file; the returned tree replaces the current one.
    fn push_import(&self, file: ImportFile) -> impl Future<Output = Result<Vec<LayerNode>>> + Send;

    fn push_export(&self, format: ExportFormat) -> impl Future<Output = Result<Bytes>> + Send;

    /// Restore the server's default tree and return it.
    fn push_reset(&self) -> impl Future<Output = Result<Vec<LayerNode>>> + Send;
}
