//! REST implementation of [`LayerService`](crate::service::LayerService).
//!
//! All endpoints live under `<base_url>/api/layers`:
//!
//! | Call | Request |
//! |---|---|
//! | `fetch_tree` | `GET /tree` |
//! | `push_visibility` | `POST /visibility {id, visible}` |
//! | `push_opacity` | `POST /opacity {id, opacity}` |
//! | `push_reorder` | `POST /reorder {parentId, orderedIds}` |
//! | `push_move` | `POST /move {movedId, fromParentId, toParentId, toIndex}` |
//! | `push_rename` | `PATCH /{id} {id, name}` |
//! | `push_add` | `POST /add {..node, parentId}` or `POST /add-group {id, name, parentId}` |
//! | `push_delete` | `DELETE /{id}` |
//! | `push_import` | `POST /import` (multipart field `file`) |
//! | `push_export` | `GET /export?format=json\|xml\|qgis` |
//! | `push_reset` | `POST /reset` |
//!
//! Mutating calls send their idempotency token in the `Idempotency-Key`
//! header.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use strata_sync::http::{AuthScheme, HttpLayerService};
//!
//! let service = HttpLayerService::builder("https://gis.example.com")
//!     .auth(AuthScheme::Token, "secret")
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//! # Ok::<(), strata_sync::SyncError>(())
//! ```

mod client;

pub use client::{API_PREFIX, AuthScheme, HttpLayerService, HttpLayerServiceBuilder, IDEMPOTENCY_HEADER};
