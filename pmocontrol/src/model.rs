//! Types partagés entre le backend, le lecteur et le protocole.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use pmoserver::proxy::TrackSource;

/// Streaming quality tier, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum QualityTier {
    /// MP3 320 kbps
    Mp3 = 5,
    /// FLAC 16 bit / 44.1 kHz
    Cd = 6,
    /// FLAC 24 bit / 96 kHz
    HiRes96 = 7,
    /// FLAC 24 bit / 192 kHz
    HiRes192 = 27,
}

/// Sample format of a quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProperties {
    pub sample_rate: u32,
    pub bit_depth: u8,
    pub channels: u8,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Mp3,
        QualityTier::Cd,
        QualityTier::HiRes96,
        QualityTier::HiRes192,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            5 => Some(QualityTier::Mp3),
            6 => Some(QualityTier::Cd),
            7 => Some(QualityTier::HiRes96),
            27 => Some(QualityTier::HiRes192),
            _ => None,
        }
    }

    pub fn properties(self) -> AudioProperties {
        match self {
            QualityTier::Mp3 | QualityTier::Cd => AudioProperties {
                sample_rate: 44_100,
                bit_depth: 16,
                channels: 2,
            },
            QualityTier::HiRes96 => AudioProperties {
                sample_rate: 96_000,
                bit_depth: 24,
                channels: 2,
            },
            QualityTier::HiRes192 => AudioProperties {
                sample_rate: 192_000,
                bit_depth: 24,
                channels: 2,
            },
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            QualityTier::Mp3 => "audio/mpeg",
            _ => "audio/flac",
        }
    }
}

impl From<QualityTier> for u32 {
    fn from(tier: QualityTier) -> Self {
        tier.code()
    }
}

impl TryFrom<u32> for QualityTier {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        QualityTier::from_code(code).ok_or_else(|| format!("unknown quality tier {}", code))
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Position captured at a wall-clock instant.
///
/// The receiver computes the live position as `value + (now - timestamp)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub timestamp_ms: u64,
    pub value_ms: u64,
}

impl PositionSnapshot {
    pub fn new(timestamp_ms: u64, value_ms: u64) -> Self {
        Self {
            timestamp_ms,
            value_ms,
        }
    }

    /// Snapshot stamped with the current wall-clock time.
    pub fn captured_now(value_ms: u64) -> Self {
        Self::new(now_ms(), value_ms)
    }

    /// Live position at `now_ms`. A clock going backwards never moves the
    /// position before `value_ms`.
    pub fn interpolate(&self, now_ms: u64) -> u64 {
        self.value_ms + now_ms.saturating_sub(self.timestamp_ms)
    }
}

/// Playback state owned by the player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Error,
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Buffering | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "IDLE",
            PlaybackState::Buffering => "BUFFERING",
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
            PlaybackState::Stopped => "STOPPED",
            PlaybackState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Transport state as seen on the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Playing,
    Paused,
    Stopped,
    Loading,
}

/// Result of one renderer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    pub transport: TransportState,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
}

/// A playable track, resolved from the controller's queue entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: Option<u64>,
    pub cover_url: Option<String>,
    pub source: TrackSource,
    pub quality: QualityTier,
}

impl Track {
    pub fn mime_type(&self) -> &'static str {
        self.quality.mime_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_interpolation() {
        let snapshot = PositionSnapshot::new(1000, 5000);
        assert_eq!(snapshot.interpolate(1500), 5500);
        assert_eq!(snapshot.interpolate(1000), 5000);
        assert_eq!(snapshot.interpolate(900), 5000);
    }

    #[test]
    fn test_quality_tier_codes_and_order() {
        for tier in QualityTier::ALL {
            assert_eq!(QualityTier::from_code(tier.code()), Some(tier));
        }
        assert_eq!(QualityTier::from_code(4), None);
        assert!(QualityTier::Mp3 < QualityTier::Cd);
        assert!(QualityTier::HiRes96 < QualityTier::HiRes192);
    }

    #[test]
    fn test_quality_tier_properties() {
        assert_eq!(QualityTier::Cd.properties().sample_rate, 44_100);
        assert_eq!(QualityTier::HiRes96.properties().bit_depth, 24);
        assert_eq!(QualityTier::HiRes192.properties().sample_rate, 192_000);
        assert_eq!(QualityTier::Mp3.mime_type(), "audio/mpeg");
        assert_eq!(QualityTier::HiRes192.mime_type(), "audio/flac");
    }
}
