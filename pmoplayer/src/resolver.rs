//! Résolution d'une entrée de file en piste jouable.
//!
//! La signature des requêtes vers le service de streaming reste hors de ce
//! pont : [`HttpTrackResolver`] interroge un point d'accès JSON qui renvoie
//! l'URL et les en-têtes à injecter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use pmoconfig::ResolverConfig;
use pmocontrol::{QualityTier, Track, TrackSource};
use pmoserver::SourceRefresher;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::debug;

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Piste `track_id` au palier `max_quality` au plus.
    async fn resolve(&self, track_id: &str, max_quality: QualityTier) -> Result<Track>;
}

#[derive(Debug, Deserialize)]
struct ResolvedTrack {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    album: String,
    duration_ms: Option<u64>,
    cover_url: Option<String>,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    mime_type: Option<String>,
    quality: Option<u32>,
}

impl ResolvedTrack {
    fn into_track(self, requested: QualityTier) -> Track {
        // Le palier annoncé ne dépasse jamais celui demandé
        let quality = self
            .quality
            .and_then(QualityTier::from_code)
            .map(|q| q.min(requested))
            .or_else(|| match self.mime_type.as_deref() {
                Some("audio/mpeg") => Some(QualityTier::Mp3),
                _ => None,
            })
            .unwrap_or(requested);

        Track {
            id: self.id,
            title: self.title,
            artist: self.artist,
            album: self.album,
            duration_ms: self.duration_ms,
            cover_url: self.cover_url,
            source: TrackSource {
                uri: self.url,
                headers: self.headers,
            },
            quality,
        }
    }
}

/// Client du point d'accès `GET {url}/{track_id}?quality={tier}`.
pub struct HttpTrackResolver {
    client: reqwest::Client,
    base_url: String,
    /// Qualité demandée par piste, tant que le proxy référence la piste.
    last_quality: Mutex<HashMap<String, QualityTier>>,
}

impl HttpTrackResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("resolver.url is not configured"));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid resolver header name {name}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for resolver header {name}"))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            last_quality: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl TrackResolver for HttpTrackResolver {
    async fn resolve(&self, track_id: &str, max_quality: QualityTier) -> Result<Track> {
        let url = format!("{}/{}", self.base_url, track_id);
        debug!(track_id, %max_quality, "Resolving track");

        let response = self
            .client
            .get(&url)
            .query(&[("quality", max_quality.code())])
            .send()
            .await
            .with_context(|| format!("resolver request for track {track_id}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "resolver returned HTTP {} for track {}",
                response.status(),
                track_id
            ));
        }

        let resolved: ResolvedTrack = response
            .json()
            .await
            .with_context(|| format!("invalid resolver response for track {track_id}"))?;

        if let Ok(mut last) = self.last_quality.lock() {
            last.insert(track_id.to_string(), max_quality);
        }
        Ok(resolved.into_track(max_quality))
    }
}

#[async_trait]
impl SourceRefresher for HttpTrackResolver {
    async fn refresh(&self, track_id: &str) -> Result<TrackSource> {
        let quality = self
            .last_quality
            .lock()
            .ok()
            .and_then(|last| last.get(track_id).copied())
            .unwrap_or(QualityTier::Cd);
        Ok(self.resolve(track_id, quality).await?.source)
    }

    async fn forget(&self, track_id: &str) {
        if let Ok(mut last) = self.last_quality.lock() {
            last.remove(track_id);
        }
    }
}
