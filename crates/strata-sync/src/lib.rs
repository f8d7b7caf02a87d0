//! Remote synchronization for Strata.
//!
//! This crate keeps a [`LayerTree`](strata_core::LayerTree) in step with a
//! remote layer service:
//!
//! - **Layer service**: the [`LayerService`] trait and its REST
//!   implementation, [`HttpLayerService`]
//! - **Sync Coordinator**: optimistic local mutation, remote push with an
//!   idempotency token, rollback on failure, and stale response discard
//! - **Renderer sink**: leaf visibility and opacity changes forwarded to the
//!   map renderer
//! - **Session**: [`LayerTreeSession`], the owned state object a layer panel
//!   talks to
//!
//! # Optimistic updates
//!
//! ```no_run
//! use strata_core::Mutation;
//! use strata_sync::{ApplyOutcome, SyncCoordinator};
//! use strata_sync::http::HttpLayerService;
//!
//! # async fn run() -> strata_sync::Result<()> {
//! let service = HttpLayerService::builder("https://gis.example.com").build()?;
//! let coordinator = SyncCoordinator::new(service);
//! coordinator.hydrate().await?;
//!
//! coordinator.failed().connect(|failure| {
//!     eprintln!("{}", failure);
//! });
//!
//! let outcome = coordinator
//!     .apply(Mutation::SetVisibility { id: "parcels".into(), visible: false })
//!     .await?;
//! assert_ne!(outcome, ApplyOutcome::Superseded);
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
mod error;
pub mod http;
pub mod renderer;
pub mod service;
pub mod session;
pub mod wire;

pub use coordinator::{ApplyOutcome, SyncCoordinator, SyncFailure};
pub use error::{Result, SyncError};
pub use http::{AuthScheme, HttpLayerService, HttpLayerServiceBuilder};
pub use renderer::{NullRenderer, RendererSink};
pub use service::{ExportFormat, IdempotencyToken, ImportFile, LayerService};
pub use session::LayerTreeSession;
pub use wire::WireNode;
