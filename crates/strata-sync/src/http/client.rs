//! HTTP layer service client and builder.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use strata_core::logging::targets;
use strata_core::{LayerNode, MoveOp, NodeId};
use url::Url;

use crate::error::{Result, SyncError};
use crate::service::{ExportFormat, IdempotencyToken, ImportFile, LayerService};
use crate::wire::{
    AddBody, AddGroupBody, MoveBody, OpacityBody, RenameBody, ReorderBody, VisibilityBody, WireNode, decode_tree,
};

/// Path under the base URL where the layer endpoints live.
pub const API_PREFIX: &str = "/api/layers";

/// Header carrying the idempotency token of a mutating call.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Scheme word placed before the token in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    #[default]
    Bearer,
    /// `Authorization: Token <token>`
    Token,
}

impl AuthScheme {
    fn header_value(self, token: &str) -> String {
        match self {
            Self::Bearer => format!("Bearer {token}"),
            Self::Token => format!("Token {token}"),
        }
    }
}

/// Builder for [`HttpLayerService`].
pub struct HttpLayerServiceBuilder {
    base_url: String,
    api_prefix: String,
    auth: Option<(AuthScheme, String)>,
    timeout: Option<Duration>,
    default_headers: http::HeaderMap,
    http_client: Option<reqwest::Client>,
}

impl HttpLayerServiceBuilder {
    /// Start a builder for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: API_PREFIX.to_string(),
            auth: None,
            timeout: None,
            default_headers: http::HeaderMap::new(),
            http_client: None,
        }
    }

    /// Serve the endpoints from another path than [`API_PREFIX`].
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Send `Authorization: <scheme> <token>` with every request.
    pub fn auth(mut self, scheme: AuthScheme, token: impl Into<String>) -> Self {
        self.auth = Some((scheme, token.into()));
        self
    }

    /// Shorthand for [`AuthScheme::Bearer`].
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.auth(AuthScheme::Bearer, token)
    }

    /// Per-request timeout. A timed-out call fails as unreachable.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a header sent with every request. Invalid names or values are ignored.
    pub fn default_header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Self {
        if let (Ok(name), Ok(value)) = (name.try_into(), value.try_into()) {
            self.default_headers.insert(name, value);
        }
        self
    }

    /// Use an existing `reqwest` client. Timeout and default headers set on
    /// this builder still apply per request.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<HttpLayerService> {
        let base = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        );
        let base_url = Url::parse(base.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!("'{base_url}' cannot be used as a base URL")));
        }

        let mut headers = self.default_headers;
        headers.insert(http::header::ACCEPT, http::HeaderValue::from_static("application/json"));
        if let Some((scheme, token)) = &self.auth {
            let mut value = http::HeaderValue::try_from(scheme.header_value(token))?;
            value.set_sensitive(true);
            headers.insert(http::header::AUTHORIZATION, value);
        }

        let client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build()?,
        };

        Ok(HttpLayerService {
            inner: Arc::new(Inner {
                client,
                base_url,
                headers,
                timeout: self.timeout,
            }),
        })
    }
}

struct Inner {
    client: reqwest::Client,
    base_url: Url,
    headers: http::HeaderMap,
    timeout: Option<Duration>,
}

/// Layer service backed by the REST API.
#[derive(Clone)]
pub struct HttpLayerService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HttpLayerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLayerService")
            .field("base_url", &self.inner.base_url.as_str())
            .field("has_auth", &self.inner.headers.contains_key(http::header::AUTHORIZATION))
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl HttpLayerService {
    pub fn builder(base_url: impl Into<String>) -> HttpLayerServiceBuilder {
        HttpLayerServiceBuilder::new(base_url)
    }

    /// Endpoint root, e.g. `https://gis.example.com/api/layers`.
    pub fn base_url(&self) -> &str {
        self.inner.base_url.as_str()
    }

    /// Full URL for `segments` below the endpoint root. Segments are
    /// percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::Config(format!("'{}' cannot be used as a base URL", self.inner.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url, token: Option<&IdempotencyToken>) -> reqwest::RequestBuilder {
        let mut request = self
            .inner
            .client
            .request(method, url)
            .headers(self.inner.headers.clone());
        if let Some(timeout) = self.inner.timeout {
            request = request.timeout(timeout);
        }
        if let Some(token) = token {
            request = request.header(IDEMPOTENCY_HEADER, token.to_string());
        }
        request
    }

    /// Send and turn non-2xx statuses into [`SyncError::RemoteRejected`].
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::trace!(target: targets::HTTP, url = %response.url(), status = status.as_u16(), "layer service response");
            return Ok(response);
        }
        let message = response.text().await.ok().filter(|body| !body.trim().is_empty());
        tracing::debug!(target: targets::HTTP, status = status.as_u16(), "layer service rejected request");
        Err(SyncError::rejected(status.as_u16(), message))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, token: &IdempotencyToken, body: &B) -> Result<()> {
        let url = self.endpoint(&[path])?;
        self.send(self.request(reqwest::Method::POST, url, Some(token)).json(body))
            .await
            .map(drop)
    }

    async fn json_response<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    async fn tree_response(&self, request: reqwest::RequestBuilder) -> Result<Vec<LayerNode>> {
        let nodes: Vec<WireNode> = self.json_response(request).await?;
        decode_tree(nodes)
    }
}

impl LayerService for HttpLayerService {
    #[tracing::instrument(skip_all, target = "strata_sync::http", level = "trace")]
    async fn fetch_tree(&self) -> Result<Vec<LayerNode>> {
        let url = self.endpoint(&["tree"])?;
        self.tree_response(self.request(reqwest::Method::GET, url, None)).await
    }

    async fn push_visibility(&self, token: &IdempotencyToken, id: &NodeId, visible: bool) -> Result<()> {
        self.post_json("visibility", token, &VisibilityBody { id, visible }).await
    }

    async fn push_opacity(&self, token: &IdempotencyToken, id: &NodeId, opacity: f32) -> Result<()> {
        self.post_json("opacity", token, &OpacityBody { id, opacity }).await
    }

    async fn push_reorder(
        &self,
        token: &IdempotencyToken,
        parent_id: Option<&NodeId>,
        ordered_ids: &[NodeId],
    ) -> Result<()> {
        self.post_json("reorder", token, &ReorderBody { parent_id, ordered_ids })
            .await
    }

    async fn push_move(&self, token: &IdempotencyToken, op: &MoveOp) -> Result<()> {
        self.post_json("move", token, &MoveBody::from(op)).await
    }

    async fn push_rename(&self, token: &IdempotencyToken, id: &NodeId, name: &str) -> Result<()> {
        let url = self.endpoint(&[id.as_str()])?;
        let request = self
            .request(reqwest::Method::PATCH, url, Some(token))
            .json(&RenameBody { id, name });
        self.send(request).await.map(drop)
    }

    async fn push_add(&self, token: &IdempotencyToken, node: &LayerNode, parent_id: Option<&NodeId>) -> Result<LayerNode> {
        let request = if node.is_group() {
            let url = self.endpoint(&["add-group"])?;
            self.request(reqwest::Method::POST, url, Some(token))
                .json(&AddGroupBody {
                    id: &node.id,
                    name: &node.name,
                    parent_id,
                })
        } else {
            let url = self.endpoint(&["add"])?;
            self.request(reqwest::Method::POST, url, Some(token))
                .json(&AddBody {
                    node: WireNode::from(node),
                    parent_id,
                })
        };
        let created: WireNode = self.json_response(request).await?;
        LayerNode::try_from(created)
    }

    async fn push_delete(&self, token: &IdempotencyToken, id: &NodeId) -> Result<()> {
        let url = self.endpoint(&[id.as_str()])?;
        self.send(self.request(reqwest::Method::DELETE, url, Some(token)))
            .await
            .map(drop)
    }

    async fn push_import(&self, file: ImportFile) -> Result<Vec<LayerNode>> {
        let url = self.endpoint(&["import"])?;
        let part = Part::bytes(file.content.to_vec()).file_name(file.file_name);
        let form = Form::new().part("file", part);
        self.tree_response(self.request(reqwest::Method::POST, url, None).multipart(form))
            .await
    }

    async fn push_export(&self, format: ExportFormat) -> Result<Bytes> {
        let mut url = self.endpoint(&["export"])?;
        url.query_pairs_mut().append_pair("format", format.as_str());
        let response = self.send(self.request(reqwest::Method::GET, url, None)).await?;
        Ok(response.bytes().await?)
    }

    async fn push_reset(&self) -> Result<Vec<LayerNode>> {
        let url = self.endpoint(&["reset"])?;
        self.tree_response(self.request(reqwest::Method::POST, url, None)).await
    }
}
