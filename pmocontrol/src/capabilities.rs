//! Capability negotiation: parses a renderer's `GetProtocolInfo` Sink string
//! and derives the highest streaming quality the device can play.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::model::QualityTier;

/// Hints (bit depth, sample rate) attached to known DLNA.ORG_PN profiles.
fn profile_hint(profile: &str) -> Option<(u8, u32)> {
    match profile {
        "FLAC" => Some((16, 44_100)),
        "FLAC_24" | "FLAC_96" => Some((24, 96_000)),
        "FLAC_192" => Some((24, 192_000)),
        "MP3" => Some((16, 44_100)),
        _ => None,
    }
}

fn additional_token_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?P<k>[^=;]+)=(?P<v>[^;]*)").ok())
        .as_ref()
}

/// One `protocol:network:contentFormat:additional` entry of a Sink string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEntry {
    pub protocol: String,
    pub network: String,
    pub content_format: String,
    /// Tokens of the additional field, in their original order.
    pub additional: Vec<(String, String)>,
    pub profile: Option<String>,
    pub op: Option<String>,
    pub flags: Option<u128>,
    /// Lowercased mime type, without parameters.
    pub mime: String,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u8>,
    pub channels: Option<u8>,
}

impl SinkEntry {
    pub fn parse(raw: &str) -> Option<SinkEntry> {
        let raw = raw.trim();
        let mut parts = raw.splitn(4, ':');
        let protocol = parts.next()?.trim();
        let network = parts.next()?.trim();
        let content_format = parts.next()?.trim();
        let additional_str = parts.next()?.trim();
        if protocol.is_empty() || content_format.is_empty() {
            return None;
        }

        let additional: Vec<(String, String)> = additional_token_regex()
            .map(|re| {
                re.captures_iter(additional_str)
                    .map(|c| (c["k"].trim().to_string(), c["v"].trim().to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let token = |name: &str| {
            additional
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        let profile = token("DLNA.ORG_PN");
        let op = token("DLNA.ORG_OP");
        let flags = token("DLNA.ORG_FLAGS").and_then(|f| u128::from_str_radix(&f, 16).ok());
        let mime = content_format
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let (mut sample_rate, mut bit_depth, channels) = parse_format_params(content_format);
        sample_rate = sample_rate.or_else(|| {
            token("sampleRate")
                .or_else(|| token("samplerate"))
                .and_then(|v| v.parse().ok())
        });
        bit_depth = bit_depth.or_else(|| {
            token("bitsPerSample")
                .or_else(|| token("bitdepth"))
                .and_then(|v| v.parse().ok())
        });
        if let Some((hint_bd, hint_sr)) = profile.as_deref().and_then(profile_hint) {
            sample_rate = sample_rate.or(Some(hint_sr));
            bit_depth = bit_depth.or(Some(hint_bd));
        }

        Some(SinkEntry {
            protocol: protocol.to_string(),
            network: network.to_string(),
            content_format: content_format.to_string(),
            additional,
            profile,
            op,
            flags,
            mime,
            sample_rate,
            bit_depth,
            channels,
        })
    }

    pub fn is_flac(&self) -> bool {
        self.mime == "audio/flac" || self.mime == "audio/x-flac"
    }

    /// Re-emits the entry as a `res@protocolInfo` value.
    pub fn to_protocol_info(&self) -> String {
        let additional = if self.additional.is_empty() {
            "*".to_string()
        } else {
            self.additional
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(";")
        };
        format!(
            "{}:{}:{}:{}",
            self.protocol, self.network, self.content_format, additional
        )
    }
}

/// `audio/L16;rate=44100;channels=2` carries its format inline.
fn parse_format_params(content_format: &str) -> (Option<u32>, Option<u8>, Option<u8>) {
    if !content_format.to_lowercase().contains("audio/l16") {
        return (None, None, None);
    }
    let mut sample_rate = None;
    let mut channels = None;
    for part in content_format.split(';').skip(1) {
        if let Some((k, v)) = part.split_once('=') {
            match k.trim().to_lowercase().as_str() {
                "rate" => sample_rate = v.trim().parse().ok(),
                "channels" => channels = v.trim().parse().ok(),
                _ => {}
            }
        }
    }
    (sample_rate, Some(16), channels)
}

/// Supported profiles of a renderer and the quality derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapability {
    pub entries: Vec<SinkEntry>,
    pub supports_flac: bool,
    pub supports_mp3: bool,
    pub max_sample_rate: u32,
    pub max_bit_depth: u8,
}

impl Default for DeviceCapability {
    /// Capability used when detection fails: CD quality.
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            supports_flac: false,
            supports_mp3: false,
            max_sample_rate: 44_100,
            max_bit_depth: 16,
        }
    }
}

impl DeviceCapability {
    /// Parses a comma-separated Sink string. Malformed entries are skipped.
    pub fn from_sink(sink: &str) -> Self {
        let mut caps = DeviceCapability::default();

        for entry in sink.split(',').filter_map(SinkEntry::parse) {
            if entry.is_flac() {
                caps.supports_flac = true;
                caps.max_sample_rate = caps.max_sample_rate.max(entry.sample_rate.unwrap_or(44_100));
                caps.max_bit_depth = caps.max_bit_depth.max(entry.bit_depth.unwrap_or(16));
            } else if entry.mime == "audio/mpeg" {
                caps.supports_mp3 = true;
            }
            caps.entries.push(entry);
        }

        debug!(
            flac = caps.supports_flac,
            mp3 = caps.supports_mp3,
            max_sample_rate = caps.max_sample_rate,
            max_bit_depth = caps.max_bit_depth,
            "Parsed renderer capabilities"
        );
        caps
    }

    /// Highest tier the device can play.
    ///
    /// FLAC decides between 27, 7 and 6; MP3 alone gives 5; nothing
    /// recognizable falls back to 6.
    pub fn max_quality(&self) -> QualityTier {
        if self.supports_flac {
            if self.max_bit_depth >= 24 && self.max_sample_rate >= 192_000 {
                QualityTier::HiRes192
            } else if self.max_bit_depth >= 24 && self.max_sample_rate >= 96_000 {
                QualityTier::HiRes96
            } else {
                QualityTier::Cd
            }
        } else if self.supports_mp3 {
            QualityTier::Mp3
        } else {
            QualityTier::Cd
        }
    }

    /// Quality to request: the configured tier wins when set.
    pub fn effective_quality(&self, configured: Option<QualityTier>) -> QualityTier {
        configured.unwrap_or_else(|| self.max_quality())
    }

    /// Conservative limits for devices known to over-advertise.
    pub fn apply_device_overrides(&mut self, manufacturer: &str, model: &str) {
        let device = format!("{} {}", manufacturer, model).to_lowercase();
        if device.contains("sonos") {
            info!("Applying Sonos overrides: 48 kHz / 16 bit");
            self.max_sample_rate = 48_000;
            self.max_bit_depth = 16;
        }
    }

    /// Best Sink entry for a media type: profile-tagged entries first, then
    /// the highest sample rate. Entries too weak for the media are skipped.
    pub fn best_entry_for_media(
        &self,
        mime: &str,
        sample_rate: Option<u32>,
        bit_depth: Option<u8>,
    ) -> Option<&SinkEntry> {
        self.entries
            .iter()
            .filter(|e| e.mime == mime)
            .filter(|e| match (sample_rate, e.sample_rate) {
                (Some(wanted), Some(offered)) => offered >= wanted,
                _ => true,
            })
            .filter(|e| match (bit_depth, e.bit_depth) {
                (Some(wanted), Some(offered)) => offered >= wanted,
                _ => true,
            })
            .max_by_key(|e| (e.profile.is_some(), e.sample_rate.unwrap_or(0)))
    }

    /// `res@protocolInfo` for the media, mirroring the device's own entry.
    pub fn build_protocol_info(&self, mime: &str, sample_rate: Option<u32>, bit_depth: Option<u8>) -> String {
        match self.best_entry_for_media(mime, sample_rate, bit_depth) {
            Some(entry) => entry.to_protocol_info(),
            None => format!("http-get:*:{}:DLNA.ORG_OP=01", mime),
        }
    }
}

struct CacheEntry {
    capability: DeviceCapability,
    fetched_at: Instant,
}

/// Capabilities keyed by device identifier (UDN or address), with a TTL.
#[derive(Clone)]
pub struct CapabilityCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }
}

impl CapabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, device_id: &str) -> Option<DeviceCapability> {
        let mut entries = self.entries.write().await;
        let expired = entries
            .get(device_id)
            .map(|e| e.fetched_at.elapsed() > self.ttl)?;
        if expired {
            entries.remove(device_id);
            return None;
        }
        entries.get(device_id).map(|e| e.capability.clone())
    }

    pub async fn set(&self, device_id: &str, capability: DeviceCapability) {
        self.entries.write().await.insert(
            device_id.to_string(),
            CacheEntry {
                capability,
                fetched_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, device_id: &str) {
        self.entries.write().await.remove(device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIRES_SINK: &str = "http-get:*:audio/flac:DLNA.ORG_PN=FLAC;DLNA.ORG_OP=01;DLNA.ORG_FLAGS=01700000000000000000000000000000,\
http-get:*:audio/flac:DLNA.ORG_PN=FLAC_192;DLNA.ORG_OP=01,\
http-get:*:audio/mpeg:DLNA.ORG_PN=MP3";

    #[test]
    fn parse_entry_tokens() {
        let entry = SinkEntry::parse(
            "http-get:*:audio/flac:DLNA.ORG_PN=FLAC;DLNA.ORG_OP=01;DLNA.ORG_FLAGS=01700000000000000000000000000000",
        )
        .unwrap();
        assert_eq!(entry.protocol, "http-get");
        assert_eq!(entry.network, "*");
        assert_eq!(entry.mime, "audio/flac");
        assert_eq!(entry.profile.as_deref(), Some("FLAC"));
        assert_eq!(entry.op.as_deref(), Some("01"));
        assert_eq!(entry.flags, Some(0x0170_0000_0000_0000_0000_0000_0000_0000));
        assert_eq!(entry.bit_depth, Some(16));
        assert_eq!(entry.sample_rate, Some(44_100));
    }

    #[test]
    fn parse_l16_inline_format() {
        let entry = SinkEntry::parse("http-get:*:audio/L16;rate=48000;channels=2:*").unwrap();
        assert_eq!(entry.mime, "audio/l16");
        assert_eq!(entry.sample_rate, Some(48_000));
        assert_eq!(entry.channels, Some(2));
        assert_eq!(entry.bit_depth, Some(16));
    }

    #[test]
    fn parse_explicit_sample_rate_tokens() {
        let entry = SinkEntry::parse("http-get:*:audio/flac:sampleRate=96000;bitsPerSample=24").unwrap();
        assert_eq!(entry.sample_rate, Some(96_000));
        assert_eq!(entry.bit_depth, Some(24));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        assert!(SinkEntry::parse("garbage").is_none());
        assert!(SinkEntry::parse("http-get:*:audio/flac").is_none());
        let caps = DeviceCapability::from_sink("garbage,,http-get:*");
        assert!(caps.entries.is_empty());
    }

    #[test]
    fn hires_192_descriptor_gives_tier_27() {
        let caps = DeviceCapability::from_sink(HIRES_SINK);
        assert!(caps.supports_flac);
        assert_eq!(caps.max_sample_rate, 192_000);
        assert_eq!(caps.max_quality(), QualityTier::HiRes192);
    }

    #[test]
    fn hires_96_descriptor_gives_tier_7() {
        let caps = DeviceCapability::from_sink("http-get:*:audio/flac:DLNA.ORG_PN=FLAC_96");
        assert_eq!(caps.max_quality(), QualityTier::HiRes96);
    }

    #[test]
    fn plain_flac_gives_cd() {
        let caps = DeviceCapability::from_sink("http-get:*:audio/flac:*");
        assert_eq!(caps.max_quality(), QualityTier::Cd);
    }

    #[test]
    fn mp3_only_gives_tier_5() {
        let caps = DeviceCapability::from_sink("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3");
        assert_eq!(caps.max_quality(), QualityTier::Mp3);
    }

    #[test]
    fn unrecognized_or_empty_sink_gives_tier_6() {
        assert_eq!(DeviceCapability::from_sink("").max_quality(), QualityTier::Cd);
        assert_eq!(
            DeviceCapability::from_sink("http-get:*:video/mp4:*,http-get:*:image/jpeg:*").max_quality(),
            QualityTier::Cd
        );
        assert_eq!(DeviceCapability::default().max_quality(), QualityTier::Cd);
    }

    #[test]
    fn sonos_override_caps_quality() {
        let mut caps = DeviceCapability::from_sink(HIRES_SINK);
        caps.apply_device_overrides("Sonos, Inc.", "Sonos One");
        assert_eq!(caps.max_sample_rate, 48_000);
        assert_eq!(caps.max_quality(), QualityTier::Cd);
    }

    #[test]
    fn configured_quality_overrides_negotiation() {
        let caps = DeviceCapability::from_sink("http-get:*:audio/flac:*");
        assert_eq!(caps.effective_quality(None), QualityTier::Cd);
        assert_eq!(
            caps.effective_quality(Some(QualityTier::HiRes192)),
            QualityTier::HiRes192
        );
    }

    #[test]
    fn protocol_info_prefers_profiled_entry() {
        let caps = DeviceCapability::from_sink(
            "http-get:*:audio/flac:*,http-get:*:audio/flac:DLNA.ORG_PN=FLAC;DLNA.ORG_OP=01",
        );
        assert_eq!(
            caps.build_protocol_info("audio/flac", None, None),
            "http-get:*:audio/flac:DLNA.ORG_PN=FLAC;DLNA.ORG_OP=01"
        );
        assert_eq!(
            caps.build_protocol_info("audio/mpeg", None, None),
            "http-get:*:audio/mpeg:DLNA.ORG_OP=01"
        );
    }

    #[test]
    fn protocol_info_skips_too_weak_entries() {
        let caps = DeviceCapability::from_sink("http-get:*:audio/flac:DLNA.ORG_PN=FLAC");
        assert_eq!(
            caps.build_protocol_info("audio/flac", Some(192_000), Some(24)),
            "http-get:*:audio/flac:DLNA.ORG_OP=01"
        );
    }

    #[tokio::test]
    async fn cache_expires_entries() {
        let cache = CapabilityCache::new(Duration::from_millis(20));
        cache.set("uuid:1", DeviceCapability::from_sink(HIRES_SINK)).await;
        assert!(cache.get("uuid:1").await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("uuid:1").await.is_none());

        cache.set("uuid:2", DeviceCapability::default()).await;
        cache.invalidate("uuid:2").await;
        assert!(cache.get("uuid:2").await.is_none());
    }
}
