//! Messages protobuf du protocole Connect.
//!
//! Deux couches : l'enveloppe (`Authenticate`, `Subscribe`, `Payload`,
//! `Error`, `Disconnect`) portée par la trame externe, et le lot
//! `QConnectBatch` transporté dans `Payload.payload`. Dans `QConnectMessage`,
//! le tag de chaque sous-message est égal à son type de message.

/// Types de message du lot interne.
pub mod message_type {
    pub const RNDR_SRVR_JOIN_SESSION: i32 = 21;
    pub const RNDR_SRVR_DEVICE_INFO_UPDATED: i32 = 22;
    pub const RNDR_SRVR_STATE_UPDATED: i32 = 23;
    pub const RNDR_SRVR_VOLUME_CHANGED: i32 = 25;
    pub const RNDR_SRVR_FILE_AUDIO_QUALITY_CHANGED: i32 = 26;
    pub const RNDR_SRVR_DEVICE_AUDIO_QUALITY_CHANGED: i32 = 27;
    pub const RNDR_SRVR_MAX_AUDIO_QUALITY_CHANGED: i32 = 28;

    pub const SRVR_RNDR_SET_STATE: i32 = 41;
    pub const SRVR_RNDR_SET_VOLUME: i32 = 42;
    pub const SRVR_RNDR_SET_ACTIVE: i32 = 43;
    pub const SRVR_RNDR_SET_MAX_AUDIO_QUALITY: i32 = 44;
    pub const SRVR_RNDR_SET_LOOP_MODE: i32 = 45;
    pub const SRVR_RNDR_SET_SHUFFLE_MODE: i32 = 46;
    pub const SRVR_RNDR_SET_AUTOPLAY_MODE: i32 = 47;

    pub const SRVR_CTRL_VOLUME_CHANGED: i32 = 87;
    pub const SRVR_CTRL_QUEUE_STATE: i32 = 90;
    pub const SRVR_CTRL_QUEUE_TRACKS_LOADED: i32 = 91;
}

pub const QP_QCONNECT: i32 = 1;

// ---------------------------------------------------------------------------
// Enveloppe
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Authenticate {
    #[prost(uint32, optional, tag = "1")]
    pub msg_id: Option<u32>,
    #[prost(uint64, optional, tag = "2")]
    pub msg_date: Option<u64>,
    #[prost(string, optional, tag = "3")]
    pub jwt: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Subscribe {
    #[prost(uint32, optional, tag = "1")]
    pub msg_id: Option<u32>,
    #[prost(uint64, optional, tag = "2")]
    pub msg_date: Option<u64>,
    #[prost(int32, optional, tag = "3")]
    pub proto: Option<i32>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub channels: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Payload {
    #[prost(uint32, optional, tag = "1")]
    pub msg_id: Option<u32>,
    #[prost(uint64, optional, tag = "2")]
    pub msg_date: Option<u64>,
    #[prost(int32, optional, tag = "3")]
    pub proto: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub src: Option<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub dests: Vec<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub payload: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(uint32, optional, tag = "1")]
    pub msg_id: Option<u32>,
    #[prost(uint64, optional, tag = "2")]
    pub msg_date: Option<u64>,
    #[prost(int32, optional, tag = "3")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "4")]
    pub message: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Disconnect {
    #[prost(uint32, optional, tag = "1")]
    pub msg_id: Option<u32>,
    #[prost(uint64, optional, tag = "2")]
    pub msg_date: Option<u64>,
}

// ---------------------------------------------------------------------------
// Types communs
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Position {
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    #[prost(uint32, optional, tag = "2")]
    pub value: Option<u32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct QueueVersion {
    #[prost(uint64, optional, tag = "1")]
    pub major: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub minor: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueueTrackRef {
    #[prost(uint64, optional, tag = "1")]
    pub queue_item_id: Option<u64>,
    #[prost(uint32, optional, tag = "2")]
    pub track_id: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub context_uuid: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueueRendererState {
    #[prost(int32, optional, tag = "1")]
    pub playing_state: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub buffer_state: Option<i32>,
    #[prost(message, optional, tag = "3")]
    pub current_position: Option<Position>,
    #[prost(uint32, optional, tag = "4")]
    pub duration: Option<u32>,
    #[prost(message, optional, tag = "5")]
    pub queue_version: Option<QueueVersion>,
    #[prost(uint64, optional, tag = "6")]
    pub current_queue_item_id: Option<u64>,
    #[prost(uint64, optional, tag = "7")]
    pub next_queue_item_id: Option<u64>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeviceCapabilities {
    #[prost(int32, optional, tag = "1")]
    pub min_audio_quality: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub max_audio_quality: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub volume_remote_control: Option<i32>,
}

pub const DEVICE_TYPE_SPEAKER: i32 = 1;
pub const VOLUME_REMOTE_CONTROL_ALLOWED: i32 = 2;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceInfo {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub device_uuid: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    pub friendly_name: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub brand: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub model: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub serial_number: Option<String>,
    #[prost(int32, optional, tag = "6")]
    pub r#type: Option<i32>,
    #[prost(message, optional, tag = "7")]
    pub capabilities: Option<DeviceCapabilities>,
    #[prost(string, optional, tag = "8")]
    pub software_version: Option<String>,
}

// ---------------------------------------------------------------------------
// Renderer → serveur
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RndrSrvrJoinSession {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub session_uuid: Option<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub device_info: Option<DeviceInfo>,
    #[prost(int32, optional, tag = "3")]
    pub reason: Option<i32>,
    #[prost(message, optional, tag = "4")]
    pub initial_state: Option<QueueRendererState>,
    #[prost(bool, optional, tag = "5")]
    pub is_active: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RndrSrvrDeviceInfoUpdated {
    #[prost(message, optional, tag = "1")]
    pub device_info: Option<DeviceInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RndrSrvrStateUpdated {
    #[prost(message, optional, tag = "1")]
    pub state: Option<QueueRendererState>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct RndrSrvrVolumeChanged {
    #[prost(uint32, optional, tag = "1")]
    pub volume: Option<u32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct RndrSrvrFileAudioQualityChanged {
    #[prost(uint32, optional, tag = "1")]
    pub sampling_rate: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub bit_depth: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub nb_channels: Option<u32>,
    #[prost(int32, optional, tag = "4")]
    pub audio_quality: Option<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct RndrSrvrDeviceAudioQualityChanged {
    #[prost(uint32, optional, tag = "1")]
    pub sampling_rate: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub bit_depth: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub nb_channels: Option<u32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct RndrSrvrMaxAudioQualityChanged {
    #[prost(int32, optional, tag = "1")]
    pub audio_quality: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub network_type: Option<i32>,
}

// ---------------------------------------------------------------------------
// Serveur → renderer
// ---------------------------------------------------------------------------

pub const SKIP_NEXT: i32 = 1;
pub const SKIP_PREVIOUS: i32 = 2;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SrvrRndrSetState {
    #[prost(int32, optional, tag = "1")]
    pub playing_state: Option<i32>,
    #[prost(uint32, optional, tag = "2")]
    pub current_position: Option<u32>,
    #[prost(message, optional, tag = "3")]
    pub queue_version: Option<QueueVersion>,
    #[prost(message, optional, tag = "4")]
    pub current_queue_item: Option<QueueTrackRef>,
    #[prost(message, optional, tag = "5")]
    pub next_queue_item: Option<QueueTrackRef>,
    /// Saut relatif demandé par le contrôleur (`SKIP_NEXT`, `SKIP_PREVIOUS`).
    #[prost(int32, optional, tag = "100")]
    pub skip: Option<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SrvrRndrSetVolume {
    #[prost(uint32, optional, tag = "1")]
    pub volume: Option<u32>,
    #[prost(int32, optional, tag = "2")]
    pub volume_delta: Option<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SrvrRndrSetActive {
    #[prost(bool, optional, tag = "1")]
    pub active: Option<bool>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SrvrRndrSetMaxAudioQuality {
    #[prost(int32, optional, tag = "1")]
    pub max_audio_quality: Option<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SrvrRndrSetLoopMode {
    #[prost(int32, optional, tag = "1")]
    pub mode: Option<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SrvrRndrSetShuffleMode {
    #[prost(bool, optional, tag = "1")]
    pub shuffle_on: Option<bool>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SrvrRndrSetAutoplayMode {
    #[prost(bool, optional, tag = "1")]
    pub autoplay_on: Option<bool>,
}

/// Volume changé par un autre contrôleur, diffusé à toute la session.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SrvrCtrlVolumeChanged {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub renderer_id: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "2")]
    pub volume: Option<u32>,
}

/// Contenu de la file, diffusé par `QUEUE_STATE` et `QUEUE_TRACKS_LOADED`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SrvrCtrlQueueTracks {
    #[prost(message, optional, tag = "1")]
    pub queue_version: Option<QueueVersion>,
    #[prost(message, repeated, tag = "2")]
    pub tracks: Vec<QueueTrackRef>,
    #[prost(uint32, optional, tag = "3")]
    pub queue_position: Option<u32>,
    #[prost(bool, optional, tag = "4")]
    pub shuffle_mode: Option<bool>,
    #[prost(uint64, optional, tag = "5")]
    pub pivot_queue_item_id: Option<u64>,
}

// ---------------------------------------------------------------------------
// Lot
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QConnectMessage {
    #[prost(int32, optional, tag = "1")]
    pub message_type: Option<i32>,

    #[prost(message, optional, tag = "21")]
    pub rndr_srvr_join_session: Option<RndrSrvrJoinSession>,
    #[prost(message, optional, tag = "22")]
    pub rndr_srvr_device_info_updated: Option<RndrSrvrDeviceInfoUpdated>,
    #[prost(message, optional, tag = "23")]
    pub rndr_srvr_state_updated: Option<RndrSrvrStateUpdated>,
    #[prost(message, optional, tag = "25")]
    pub rndr_srvr_volume_changed: Option<RndrSrvrVolumeChanged>,
    #[prost(message, optional, tag = "26")]
    pub rndr_srvr_file_audio_quality_changed: Option<RndrSrvrFileAudioQualityChanged>,
    #[prost(message, optional, tag = "27")]
    pub rndr_srvr_device_audio_quality_changed: Option<RndrSrvrDeviceAudioQualityChanged>,
    #[prost(message, optional, tag = "28")]
    pub rndr_srvr_max_audio_quality_changed: Option<RndrSrvrMaxAudioQualityChanged>,

    #[prost(message, optional, tag = "41")]
    pub srvr_rndr_set_state: Option<SrvrRndrSetState>,
    #[prost(message, optional, tag = "42")]
    pub srvr_rndr_set_volume: Option<SrvrRndrSetVolume>,
    #[prost(message, optional, tag = "43")]
    pub srvr_rndr_set_active: Option<SrvrRndrSetActive>,
    #[prost(message, optional, tag = "44")]
    pub srvr_rndr_set_max_audio_quality: Option<SrvrRndrSetMaxAudioQuality>,
    #[prost(message, optional, tag = "45")]
    pub srvr_rndr_set_loop_mode: Option<SrvrRndrSetLoopMode>,
    #[prost(message, optional, tag = "46")]
    pub srvr_rndr_set_shuffle_mode: Option<SrvrRndrSetShuffleMode>,
    #[prost(message, optional, tag = "47")]
    pub srvr_rndr_set_autoplay_mode: Option<SrvrRndrSetAutoplayMode>,

    #[prost(message, optional, tag = "87")]
    pub srvr_ctrl_volume_changed: Option<SrvrCtrlVolumeChanged>,
    #[prost(message, optional, tag = "90")]
    pub srvr_ctrl_queue_state: Option<SrvrCtrlQueueTracks>,
    #[prost(message, optional, tag = "91")]
    pub srvr_ctrl_queue_tracks_loaded: Option<SrvrCtrlQueueTracks>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QConnectBatch {
    #[prost(uint64, optional, tag = "1")]
    pub messages_time: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub messages_id: Option<i32>,
    #[prost(message, repeated, tag = "3")]
    pub messages: Vec<QConnectMessage>,
}
