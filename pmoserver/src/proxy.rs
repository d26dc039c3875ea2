//! Proxy audio pour les renderers DLNA.
//!
//! Un renderer ne sait pas ajouter d'en-têtes HTTP à ses requêtes : chaque
//! piste est donc enregistrée ici avec sa source amont (`TrackSource`) et
//! exposée sous `GET /stream/{token}`, le jeton étant un UUID v4 aléatoire.
//! Chaque GET déclenche une nouvelle requête amont ; rien n'est mis en cache.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source amont d'une piste, fournie par le composant d'authentification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSource {
    pub uri: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl TrackSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Renouvelle une source dont l'URL a expiré.
#[async_trait]
pub trait SourceRefresher: Send + Sync {
    async fn refresh(&self, track_id: &str) -> anyhow::Result<TrackSource>;

    /// Appelé quand plus aucun jeton ne référence `track_id`.
    async fn forget(&self, _track_id: &str) {}
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("unknown stream token {0}")]
    UnknownToken(String),

    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("failed to refresh stream source: {0}")]
    Refresh(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnknownToken(_) => StatusCode::NOT_FOUND,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamStatus(_) | ProxyError::Upstream(_) | ProxyError::Refresh(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string()
        }));
        (self.status(), body).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Âge au-delà duquel l'URL amont est renouvelée (si un `SourceRefresher` est fourni).
    pub url_max_age: Duration,
    /// Délai maximal pour obtenir les en-têtes de la réponse amont.
    pub upstream_timeout: Duration,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            url_max_age: Duration::from_secs(240),
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&pmoconfig::ServerConfig> for ProxyOptions {
    fn from(config: &pmoconfig::ServerConfig) -> Self {
        Self {
            url_max_age: config.url_max_age(),
            upstream_timeout: config.upstream_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
struct ProxyEntry {
    track_id: String,
    source: TrackSource,
    content_type: String,
    fetched_at: Instant,
}

struct ProxyInner {
    base_url: String,
    options: ProxyOptions,
    client: reqwest::Client,
    entries: RwLock<HashMap<String, ProxyEntry>>,
    refresher: Option<Arc<dyn SourceRefresher>>,
}

/// Registre des pistes exposées et serveur HTTP associé.
#[derive(Clone)]
pub struct AudioProxy {
    inner: Arc<ProxyInner>,
}

impl AudioProxy {
    pub fn new(base_url: impl Into<String>, options: ProxyOptions) -> Result<Self, ProxyError> {
        Self::build(base_url.into(), options, None)
    }

    /// Proxy dont les sources expirées sont renouvelées par `refresher`.
    pub fn with_refresher(
        base_url: impl Into<String>,
        options: ProxyOptions,
        refresher: Arc<dyn SourceRefresher>,
    ) -> Result<Self, ProxyError> {
        Self::build(base_url.into(), options, Some(refresher))
    }

    fn build(
        base_url: String,
        options: ProxyOptions,
        refresher: Option<Arc<dyn SourceRefresher>>,
    ) -> Result<Self, ProxyError> {
        // Pas de timeout global : un flux peut durer toute la piste.
        let client = reqwest::Client::builder()
            .connect_timeout(options.upstream_timeout)
            .build()?;
        Ok(Self {
            inner: Arc::new(ProxyInner {
                base_url: base_url.trim_end_matches('/').to_string(),
                options,
                client,
                entries: RwLock::new(HashMap::new()),
                refresher,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Enregistre une piste et retourne l'URL locale à donner au renderer.
    pub async fn register(&self, track_id: &str, source: TrackSource, content_type: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let entry = ProxyEntry {
            track_id: track_id.to_string(),
            source,
            content_type: content_type.to_string(),
            fetched_at: Instant::now(),
        };
        self.inner.entries.write().await.insert(token.clone(), entry);
        let url = self.stream_url(&token);
        debug!(track_id, url = %url, "Registered track in audio proxy");
        url
    }

    pub fn stream_url(&self, token: &str) -> String {
        format!("{}/stream/{}", self.inner.base_url, token)
    }

    pub async fn unregister(&self, token: &str) -> bool {
        let orphan = {
            let mut entries = self.inner.entries.write().await;
            let Some(entry) = entries.remove(token) else {
                return false;
            };
            let still_used = entries.values().any(|e| e.track_id == entry.track_id);
            (!still_used).then_some(entry.track_id)
        };
        if let Some(track_id) = orphan {
            self.forget(&track_id).await;
        }
        true
    }

    /// Oublie toutes les pistes (fin de session).
    pub async fn clear(&self) {
        let removed: Vec<ProxyEntry> = self
            .inner
            .entries
            .write()
            .await
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in removed {
            self.forget(&entry.track_id).await;
        }
    }

    async fn forget(&self, track_id: &str) {
        if let Some(refresher) = &self.inner.refresher {
            refresher.forget(track_id).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/stream/{token}", get(stream_track))
            .with_state(self.clone())
    }

    /// Sert le proxy sur `listener` jusqu'à l'annulation de `cancel`.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("🎧 Audio proxy listening on {} (public base {})", addr, self.inner.base_url);
        }
        axum::serve(listener, self.router())
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
    }

    /// Retourne la source à utiliser pour `token`, renouvelée si elle a expiré.
    async fn resolve(&self, token: &str) -> Result<ProxyEntry, ProxyError> {
        let entry = self
            .inner
            .entries
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| ProxyError::UnknownToken(token.to_string()))?;

        let Some(refresher) = &self.inner.refresher else {
            return Ok(entry);
        };
        if entry.fetched_at.elapsed() < self.inner.options.url_max_age {
            return Ok(entry);
        }

        info!(track_id = %entry.track_id, "Refreshing expired stream URL");
        let source = refresher
            .refresh(&entry.track_id)
            .await
            .map_err(|e| ProxyError::Refresh(e.to_string()))?;

        let mut entries = self.inner.entries.write().await;
        let Some(stored) = entries.get_mut(token) else {
            return Err(ProxyError::UnknownToken(token.to_string()));
        };
        stored.source = source;
        stored.fetched_at = Instant::now();
        Ok(stored.clone())
    }
}

const RELAYED_HEADERS: [header::HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

/// GET /stream/{token}
async fn stream_track(
    State(proxy): State<AudioProxy>,
    Path(token): Path<String>,
    request_headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let entry = proxy.resolve(&token).await.inspect_err(|e| {
        warn!(token = %token, "Audio proxy request rejected: {}", e);
    })?;

    let mut request = proxy.inner.client.get(&entry.source.uri);
    for (name, value) in &entry.source.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(range) = request_headers.get(header::RANGE) {
        debug!(track_id = %entry.track_id, range = ?range, "Forwarding Range header");
        request = request.header(header::RANGE, range.clone());
    }

    let upstream = match tokio::time::timeout(proxy.inner.options.upstream_timeout, request.send()).await {
        Err(_) => {
            warn!(track_id = %entry.track_id, "Upstream did not answer in time");
            return Err(ProxyError::UpstreamTimeout);
        }
        Ok(Err(e)) if e.is_timeout() => return Err(ProxyError::UpstreamTimeout),
        Ok(Err(e)) => {
            warn!(track_id = %entry.track_id, "Upstream request failed: {}", e);
            return Err(ProxyError::Upstream(e.to_string()));
        }
        Ok(Ok(response)) => response,
    };

    let status = upstream.status();
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        warn!(track_id = %entry.track_id, status = %status, "Upstream error");
        return Err(ProxyError::UpstreamStatus(status.as_u16()));
    }

    let mut headers = HeaderMap::new();
    for name in RELAYED_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers
        .entry(header::ACCEPT_RANGES)
        .or_insert(HeaderValue::from_static("bytes"));

    let content_type = HeaderValue::from_str(&entry.content_type)
        .ok()
        .filter(|_| !entry.content_type.is_empty())
        .or_else(|| upstream.headers().get(header::CONTENT_TYPE).cloned());
    if let Some(content_type) = content_type {
        headers.insert(header::CONTENT_TYPE, content_type);
    }

    debug!(track_id = %entry.track_id, status = %status, "Streaming upstream body");
    let stream = upstream
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));

    Ok((status, headers, Body::from_stream(stream)).into_response())
}
