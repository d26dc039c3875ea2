//! Renderer, résolveur et lien simulés.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pmoconfig::PlayerConfig;
use pmoconnect::{Command, TrackRef, decode_batch};
use pmocontrol::{
    Backend, BackendAction, BackendError, BackendStatus, DeviceCapability, PositionSnapshot,
    QualityTier, Track, TrackSource, TransportState,
};
use pmoplayer::{Outbound, TrackResolver};
use tokio::sync::{Notify, mpsc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Load(String),
    Play,
    Pause,
    Stop,
    Seek(u64),
    SetVolume(u8),
}

#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<Call>>,
    /// Echecs restants par action ; `u32::MAX` pour toujours.
    failures: Mutex<HashMap<BackendAction, u32>>,
    volume: Mutex<u8>,
    position: Mutex<u64>,
    pub fixed_volume: bool,
    pub load_gate: Option<Arc<Notify>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed() -> Self {
        Self {
            fixed_volume: true,
            ..Self::default()
        }
    }

    /// `load` attend `gate` avant de répondre.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            load_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail(&self, action: BackendAction, times: u32) {
        self.failures.lock().unwrap().insert(action, times);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Load(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, action: BackendAction, call: Call) -> Result<(), BackendError> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&action) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(BackendError::timeout(action));
            }
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "Mock renderer"
    }

    fn fixed_volume(&self) -> bool {
        self.fixed_volume
    }

    async fn load(&self, track: &Track) -> Result<(), BackendError> {
        if let Some(gate) = &self.load_gate {
            gate.notified().await;
        }
        self.record(BackendAction::Load, Call::Load(track.id.clone()))
    }

    async fn play(&self) -> Result<(), BackendError> {
        self.record(BackendAction::Play, Call::Play)
    }

    async fn pause(&self) -> Result<(), BackendError> {
        self.record(BackendAction::Pause, Call::Pause)
    }

    async fn stop(&self) -> Result<(), BackendError> {
        self.record(BackendAction::Stop, Call::Stop)
    }

    async fn seek(&self, position_ms: u64) -> Result<(), BackendError> {
        self.record(BackendAction::Seek, Call::Seek(position_ms))?;
        *self.position.lock().unwrap() = position_ms;
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> Result<(), BackendError> {
        self.record(BackendAction::SetVolume, Call::SetVolume(volume))?;
        *self.volume.lock().unwrap() = volume;
        Ok(())
    }

    async fn get_volume(&self) -> Result<u8, BackendError> {
        Ok(*self.volume.lock().unwrap())
    }

    async fn get_position(&self) -> Result<PositionSnapshot, BackendError> {
        Ok(PositionSnapshot::captured_now(*self.position.lock().unwrap()))
    }

    async fn get_status(&self) -> Result<BackendStatus, BackendError> {
        Ok(BackendStatus {
            transport: TransportState::Playing,
            position_ms: *self.position.lock().unwrap(),
            duration_ms: None,
        })
    }

    async fn get_capabilities(&self) -> Result<DeviceCapability, BackendError> {
        Ok(DeviceCapability::default())
    }
}

/// Résout `track_id` en une piste de trois minutes.
#[derive(Default)]
pub struct StaticResolver {
    pub requested: Mutex<Vec<(String, QualityTier)>>,
}

#[async_trait]
impl TrackResolver for StaticResolver {
    async fn resolve(&self, track_id: &str, max_quality: QualityTier) -> anyhow::Result<Track> {
        self.requested
            .lock()
            .unwrap()
            .push((track_id.to_string(), max_quality));
        Ok(track(track_id, max_quality))
    }
}

pub fn track(id: &str, quality: QualityTier) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        duration_ms: Some(180_000),
        cover_url: None,
        source: TrackSource::new(format!("https://streaming.example/{id}.flac"))
            .with_header("Authorization", "Bearer secret"),
        quality,
    }
}

/// Lien simulé : les trames envoyées arrivent sur un canal.
pub struct MockOutbound {
    pub connected: Mutex<bool>,
    frames: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockOutbound {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (frames, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                connected: Mutex::new(true),
                frames,
            }),
            rx,
        )
    }

    pub fn set_connected(&self, connected: bool) {
        *self.connected.lock().unwrap() = connected;
    }
}

impl Outbound for MockOutbound {
    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn send(&self, frame: Vec<u8>) -> bool {
        self.is_connected() && self.frames.send(frame).is_ok()
    }
}

pub fn fast_config() -> PlayerConfig {
    PlayerConfig {
        retry_delay_ms: 5,
        end_grace_ms: 0,
        ..PlayerConfig::default()
    }
}

pub fn track_ref(queue_item_id: u64, track_id: u32) -> TrackRef {
    TrackRef::new(queue_item_id, track_id)
}

pub fn load_queue(ids: &[(u64, u32)]) -> Command {
    Command::LoadQueue {
        tracks: ids.iter().map(|&(q, t)| track_ref(q, t)).collect(),
        start_index: 0,
        version: pmoconnect::QueueVersion::new(1, 0),
        shuffle: false,
    }
}

/// Types de message d'une trame sortante.
pub fn message_types(frame: &[u8]) -> Vec<i32> {
    decode_batch(frame)
        .map(|batch| {
            batch
                .messages
                .iter()
                .filter_map(|m| m.message_type)
                .collect()
        })
        .unwrap_or_default()
}
