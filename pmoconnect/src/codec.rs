//! Codec du protocole Connect.
//!
//! Trame externe : `[type: u8][longueur: varint][payload]`. Les trames
//! `PAYLOAD` portent une enveloppe protobuf dont le contenu est un lot de
//! messages typés ([`proto::QConnectBatch`]).
//!
//! Le décodage est une fonction pure des octets reçus ; l'encodage passe par
//! [`ProtocolCodec`], qui porte le compteur `msg_id` partagé par tous les
//! émetteurs de la session.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use md5::{Digest, Md5};
use pmoconfig::DeviceConfig;
use pmocontrol::{PlaybackState, PositionSnapshot, QualityTier, now_ms};
use prost::Message;
use prost::encoding::{decode_varint, encode_varint};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::proto::{self, message_type as mt};

// ============================================================================
// Trame externe
// ============================================================================

/// Type de la trame externe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Authenticate = 1,
    Subscribe = 2,
    Unsubscribe = 3,
    Payload = 6,
    Error = 9,
    Disconnect = 10,
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameType::Authenticate),
            2 => Some(FrameType::Subscribe),
            3 => Some(FrameType::Unsubscribe),
            6 => Some(FrameType::Payload),
            9 => Some(FrameType::Error),
            10 => Some(FrameType::Disconnect),
            _ => None,
        }
    }
}

/// Trame externe découpée.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

/// Assemble une trame externe.
pub fn encode_frame(frame_type: FrameType, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 10 + payload.len());
    buf.push(frame_type as u8);
    encode_varint(payload.len() as u64, &mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// Découpe une trame externe. Les octets au-delà de la longueur annoncée
/// sont ignorés.
pub fn decode_frame(data: &[u8]) -> Result<Frame, DecodeError> {
    let (&kind, rest) = data.split_first().ok_or(DecodeError::Empty)?;
    let frame_type = FrameType::from_byte(kind).ok_or(DecodeError::UnknownFrameType(kind))?;

    let mut cursor = rest;
    let len = decode_varint(&mut cursor).map_err(|_| DecodeError::InvalidLength)?;
    let len = usize::try_from(len).map_err(|_| DecodeError::InvalidLength)?;
    if cursor.len() < len {
        return Err(DecodeError::Truncated {
            expected: len,
            got: cursor.len(),
        });
    }

    Ok(Frame {
        frame_type,
        payload: Bytes::copy_from_slice(&cursor[..len]),
    })
}

// ============================================================================
// Modèle des commandes
// ============================================================================

/// Entrée de la file telle que le contrôleur la désigne.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef {
    pub queue_item_id: u64,
    pub track_id: u32,
    pub context_uuid: Option<Vec<u8>>,
}

impl TrackRef {
    pub fn new(queue_item_id: u64, track_id: u32) -> Self {
        Self {
            queue_item_id,
            track_id,
            context_uuid: None,
        }
    }

    fn from_wire(wire: proto::QueueTrackRef) -> Option<Self> {
        Some(Self {
            queue_item_id: wire.queue_item_id.unwrap_or_default(),
            track_id: wire.track_id?,
            context_uuid: wire.context_uuid,
        })
    }

    fn to_wire(&self) -> proto::QueueTrackRef {
        proto::QueueTrackRef {
            queue_item_id: Some(self.queue_item_id),
            track_id: Some(self.track_id),
            context_uuid: self.context_uuid.clone(),
        }
    }
}

/// Version de la file, renvoyée telle quelle dans les rapports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueVersion {
    pub major: u64,
    pub minor: i32,
}

impl QueueVersion {
    pub fn new(major: u64, minor: i32) -> Self {
        Self { major, minor }
    }

    fn from_wire(wire: Option<proto::QueueVersion>) -> Self {
        wire.map(|v| Self {
            major: v.major.unwrap_or_default(),
            minor: v.minor.unwrap_or_default(),
        })
        .unwrap_or_default()
    }

    fn to_wire(self) -> proto::QueueVersion {
        proto::QueueVersion {
            major: Some(self.major),
            minor: Some(self.minor),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl RepeatMode {
    /// 0 et toute valeur inconnue valent OFF.
    pub fn from_wire(value: i32) -> Self {
        match value {
            2 => RepeatMode::Track,
            3 => RepeatMode::Queue,
            _ => RepeatMode::Off,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            RepeatMode::Off => 1,
            RepeatMode::Track => 2,
            RepeatMode::Queue => 3,
        }
    }
}

/// Commande décodée, dans l'ordre où le contrôleur l'a émise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play { track: TrackRef, position_ms: u64 },
    Cue { track: TrackRef, position_ms: u64 },
    Pause,
    Resume,
    Stop,
    Seek { position_ms: u64 },
    Next,
    Previous,
    SetVolume { volume: u8 },
    AdjustVolume { delta: i32 },
    LoadQueue {
        tracks: Vec<TrackRef>,
        start_index: usize,
        version: QueueVersion,
        shuffle: bool,
    },
    SetNextTrack(TrackRef),
    SetRepeatMode(RepeatMode),
    SetShuffle(bool),
    SetActive(bool),
    SetMaxAudioQuality(QualityTier),
    SetAutoplay(bool),
}

// ============================================================================
// Correspondances de valeurs
// ============================================================================

pub const PLAYING_STATE_STOPPED: i32 = 1;
pub const PLAYING_STATE_PLAYING: i32 = 2;
pub const PLAYING_STATE_PAUSED: i32 = 3;
pub const BUFFER_STATE_BUFFERING: i32 = 1;
pub const BUFFER_STATE_OK: i32 = 2;
pub const BUFFER_STATE_ERROR: i32 = 3;

/// Etat de lecture tel que le protocole le connaît.
pub fn wire_playing_state(state: PlaybackState) -> i32 {
    match state {
        PlaybackState::Playing => PLAYING_STATE_PLAYING,
        PlaybackState::Paused => PLAYING_STATE_PAUSED,
        PlaybackState::Idle
        | PlaybackState::Buffering
        | PlaybackState::Stopped
        | PlaybackState::Error => PLAYING_STATE_STOPPED,
    }
}

pub fn wire_buffer_state(state: PlaybackState) -> i32 {
    match state {
        PlaybackState::Buffering => BUFFER_STATE_BUFFERING,
        PlaybackState::Error => BUFFER_STATE_ERROR,
        _ => BUFFER_STATE_OK,
    }
}

pub fn quality_to_protocol(tier: QualityTier) -> i32 {
    match tier {
        QualityTier::Mp3 => 1,
        QualityTier::Cd => 2,
        QualityTier::HiRes96 => 3,
        QualityTier::HiRes192 => 4,
    }
}

/// Valeur protocole vers palier ; une valeur inconnue donne le palier maximal.
pub fn quality_from_protocol(value: i32) -> QualityTier {
    match value {
        1 => QualityTier::Mp3,
        2 => QualityTier::Cd,
        3 => QualityTier::HiRes96,
        _ => QualityTier::HiRes192,
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Identifiant binaire du device : l'UUID configuré, ou l'empreinte md5 de
/// la chaîne quand elle n'est pas un UUID.
pub fn device_uuid_bytes(value: &str) -> [u8; 16] {
    match Uuid::parse_str(value.trim()) {
        Ok(uuid) => *uuid.as_bytes(),
        Err(_) => {
            let digest = Md5::digest(value.as_bytes());
            let mut out = [0u8; 16];
            out.copy_from_slice(&digest);
            out
        }
    }
}

/// Identifiant de session ; `None` s'il est vide ou invalide (canal par
/// défaut, déduit du jeton par le serveur).
pub fn session_uuid_bytes(value: &str) -> Option<[u8; 16]> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Uuid::parse_str(value).ok().map(|uuid| *uuid.as_bytes())
}

// ============================================================================
// Rapports sortants
// ============================================================================

/// Instantané de l'état du renderer envoyé au contrôleur.
#[derive(Debug, Clone, PartialEq)]
pub struct StateReport {
    pub playback_state: PlaybackState,
    pub position: PositionSnapshot,
    pub duration_ms: Option<u64>,
    pub current_queue_item_id: Option<u64>,
    pub next_queue_item_id: Option<u64>,
    pub queue_version: QueueVersion,
    pub volume: u8,
    pub device_name: String,
    pub max_quality: QualityTier,
}

impl StateReport {
    fn to_wire(&self) -> proto::QueueRendererState {
        proto::QueueRendererState {
            playing_state: Some(wire_playing_state(self.playback_state)),
            buffer_state: Some(wire_buffer_state(self.playback_state)),
            current_position: Some(proto::Position {
                timestamp: Some(self.position.timestamp_ms),
                value: Some(clamp_u32(self.position.value_ms)),
            }),
            duration: self.duration_ms.map(clamp_u32),
            queue_version: Some(self.queue_version.to_wire()),
            current_queue_item_id: self.current_queue_item_id,
            next_queue_item_id: self.next_queue_item_id,
        }
    }
}

/// Identité annoncée à la jonction de session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub uuid: [u8; 16],
    pub name: String,
    pub brand: String,
    pub model: String,
    pub software_version: String,
}

impl DeviceIdentity {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            uuid: device_uuid_bytes(&config.uuid),
            name: config.name.clone(),
            brand: config.brand.clone(),
            model: config.model.clone(),
            software_version: config.software_version.clone(),
        }
    }

    fn to_wire(&self, max_quality: QualityTier) -> proto::DeviceInfo {
        proto::DeviceInfo {
            device_uuid: Some(self.uuid.to_vec()),
            friendly_name: Some(self.name.clone()),
            brand: Some(self.brand.clone()),
            model: Some(self.model.clone()),
            serial_number: None,
            r#type: Some(proto::DEVICE_TYPE_SPEAKER),
            capabilities: Some(proto::DeviceCapabilities {
                min_audio_quality: Some(quality_to_protocol(QualityTier::Mp3)),
                max_audio_quality: Some(quality_to_protocol(max_quality)),
                volume_remote_control: Some(proto::VOLUME_REMOTE_CONTROL_ALLOWED),
            }),
            software_version: Some(self.software_version.clone()),
        }
    }
}

// ============================================================================
// Décodage
// ============================================================================

/// Contenu utile d'une trame entrante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Commands(Vec<Command>),
    ServerError { code: Option<i32>, message: String },
    Disconnect,
    /// Trame sans effet côté renderer (accusés, abonnements).
    Ignored(FrameType),
}

/// Décode une trame entrante complète.
pub fn decode_inbound(data: &[u8]) -> Result<Inbound, DecodeError> {
    let frame = decode_frame(data)?;
    trace!(frame_type = ?frame.frame_type, len = frame.payload.len(), "RX: frame");

    match frame.frame_type {
        FrameType::Payload => {
            let envelope = proto::Payload::decode(frame.payload)?;
            let inner = envelope.payload.ok_or(DecodeError::EmptyPayload)?;
            let batch = proto::QConnectBatch::decode(inner.as_slice())?;
            Ok(Inbound::Commands(commands_from_batch(batch)?))
        }
        FrameType::Error => {
            let err = proto::Error::decode(frame.payload)?;
            Ok(Inbound::ServerError {
                code: err.code,
                message: err.message.unwrap_or_default(),
            })
        }
        FrameType::Disconnect => Ok(Inbound::Disconnect),
        other => Ok(Inbound::Ignored(other)),
    }
}

/// Toutes les commandes portées par une trame `PAYLOAD`.
pub fn decode_commands(data: &[u8]) -> Result<Vec<Command>, DecodeError> {
    match decode_inbound(data)? {
        Inbound::Commands(commands) => Ok(commands),
        Inbound::Disconnect => Err(DecodeError::UnexpectedFrame(FrameType::Disconnect)),
        Inbound::ServerError { .. } => Err(DecodeError::UnexpectedFrame(FrameType::Error)),
        Inbound::Ignored(frame_type) => Err(DecodeError::UnexpectedFrame(frame_type)),
    }
}

/// La commande unique portée par une trame.
pub fn decode_command(data: &[u8]) -> Result<Command, DecodeError> {
    let mut commands = decode_commands(data)?;
    if commands.len() != 1 {
        return Err(DecodeError::CommandCount(commands.len()));
    }
    commands.pop().ok_or(DecodeError::CommandCount(0))
}

/// Un lot ne contenant que des types inconnus est une erreur
/// `UnknownMessageType` ; mêlés à des types connus, ils sont ignorés.
fn commands_from_batch(batch: proto::QConnectBatch) -> Result<Vec<Command>, DecodeError> {
    let mut commands = Vec::new();
    let mut unknown = None;

    for message in batch.messages {
        match commands_from_message(message, &mut commands) {
            Ok(()) => {}
            Err(DecodeError::UnknownMessageType(kind)) => {
                debug!(message_type = kind, "RX: unhandled message type");
                unknown.get_or_insert(kind);
            }
            Err(e) => return Err(e),
        }
    }

    match unknown {
        Some(kind) if commands.is_empty() => Err(DecodeError::UnknownMessageType(kind)),
        _ => Ok(commands),
    }
}

fn commands_from_message(
    message: proto::QConnectMessage,
    out: &mut Vec<Command>,
) -> Result<(), DecodeError> {
    let kind = message.message_type.unwrap_or_default();
    let missing = || DecodeError::MissingBody(kind);

    match kind {
        mt::SRVR_RNDR_SET_STATE => {
            expand_set_state(message.srvr_rndr_set_state.ok_or_else(missing)?, out);
        }
        mt::SRVR_RNDR_SET_VOLUME => {
            let body = message.srvr_rndr_set_volume.ok_or_else(missing)?;
            if let Some(volume) = body.volume {
                out.push(Command::SetVolume {
                    volume: volume.min(100) as u8,
                });
            } else if let Some(delta) = body.volume_delta {
                out.push(Command::AdjustVolume { delta });
            }
        }
        mt::SRVR_RNDR_SET_ACTIVE => {
            let body = message.srvr_rndr_set_active.ok_or_else(missing)?;
            out.push(Command::SetActive(body.active.unwrap_or(false)));
        }
        mt::SRVR_RNDR_SET_MAX_AUDIO_QUALITY => {
            let body = message.srvr_rndr_set_max_audio_quality.ok_or_else(missing)?;
            out.push(Command::SetMaxAudioQuality(quality_from_protocol(
                body.max_audio_quality.unwrap_or_default(),
            )));
        }
        mt::SRVR_RNDR_SET_LOOP_MODE => {
            let body = message.srvr_rndr_set_loop_mode.ok_or_else(missing)?;
            out.push(Command::SetRepeatMode(RepeatMode::from_wire(
                body.mode.unwrap_or_default(),
            )));
        }
        mt::SRVR_RNDR_SET_SHUFFLE_MODE => {
            let body = message.srvr_rndr_set_shuffle_mode.ok_or_else(missing)?;
            out.push(Command::SetShuffle(body.shuffle_on.unwrap_or(false)));
        }
        mt::SRVR_RNDR_SET_AUTOPLAY_MODE => {
            let body = message.srvr_rndr_set_autoplay_mode.ok_or_else(missing)?;
            out.push(Command::SetAutoplay(body.autoplay_on.unwrap_or(false)));
        }
        mt::SRVR_CTRL_VOLUME_CHANGED => {
            let body = message.srvr_ctrl_volume_changed.ok_or_else(missing)?;
            if let Some(volume) = body.volume {
                out.push(Command::SetVolume {
                    volume: volume.min(100) as u8,
                });
            }
        }
        mt::SRVR_CTRL_QUEUE_STATE => {
            out.push(load_queue(message.srvr_ctrl_queue_state.ok_or_else(missing)?));
        }
        mt::SRVR_CTRL_QUEUE_TRACKS_LOADED => {
            out.push(load_queue(
                message.srvr_ctrl_queue_tracks_loaded.ok_or_else(missing)?,
            ));
        }
        other => return Err(DecodeError::UnknownMessageType(other)),
    }
    Ok(())
}

fn load_queue(body: proto::SrvrCtrlQueueTracks) -> Command {
    Command::LoadQueue {
        tracks: body
            .tracks
            .into_iter()
            .filter_map(TrackRef::from_wire)
            .collect(),
        start_index: body.queue_position.unwrap_or_default() as usize,
        version: QueueVersion::from_wire(body.queue_version),
        shuffle: body.shuffle_mode.unwrap_or(false),
    }
}

/// Un `SET_STATE` se déplie dans l'ordre : piste suivante annoncée, saut,
/// lecture ou préparation d'une piste, changement d'état, position.
fn expand_set_state(body: proto::SrvrRndrSetState, out: &mut Vec<Command>) {
    let state = body.playing_state;
    let position = body.current_position.map(u64::from);

    if let Some(next) = body.next_queue_item.and_then(TrackRef::from_wire) {
        out.push(Command::SetNextTrack(next));
    }

    match body.skip {
        Some(proto::SKIP_NEXT) => out.push(Command::Next),
        Some(proto::SKIP_PREVIOUS) => out.push(Command::Previous),
        _ => {}
    }

    if let Some(track) = body.current_queue_item.and_then(TrackRef::from_wire) {
        let position_ms = position.unwrap_or(0);
        if state == Some(PLAYING_STATE_PLAYING) {
            out.push(Command::Play { track, position_ms });
        } else {
            out.push(Command::Cue { track, position_ms });
        }
        return;
    }

    match state {
        Some(PLAYING_STATE_PLAYING) => out.push(Command::Resume),
        Some(PLAYING_STATE_PAUSED) => out.push(Command::Pause),
        Some(PLAYING_STATE_STOPPED) => {
            out.push(Command::Stop);
            return;
        }
        _ => {}
    }

    if let Some(position_ms) = position {
        out.push(Command::Seek { position_ms });
    }
}

// ============================================================================
// Encodage
// ============================================================================

/// Encodeur des trames sortantes. Partagé (`Arc`) entre la session et le
/// reporter : le compteur `msg_id` est atomique.
#[derive(Debug)]
pub struct ProtocolCodec {
    device_uuid: [u8; 16],
    msg_id: AtomicU32,
}

impl ProtocolCodec {
    pub fn new(device_uuid: [u8; 16]) -> Self {
        Self {
            device_uuid,
            msg_id: AtomicU32::new(0),
        }
    }

    pub fn device_uuid(&self) -> &[u8; 16] {
        &self.device_uuid
    }

    fn next_msg_id(&self) -> u32 {
        self.msg_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub fn encode_authenticate(&self, jwt: &str) -> Vec<u8> {
        let msg = proto::Authenticate {
            msg_id: Some(self.next_msg_id()),
            msg_date: Some(now_ms()),
            jwt: Some(jwt.to_string()),
        };
        encode_frame(FrameType::Authenticate, &msg.encode_to_vec())
    }

    /// Abonnement au canal de la session, ou au canal par défaut.
    pub fn encode_subscribe(&self, session_uuid: Option<&[u8; 16]>) -> Vec<u8> {
        let msg = proto::Subscribe {
            msg_id: Some(self.next_msg_id()),
            msg_date: Some(now_ms()),
            proto: Some(proto::QP_QCONNECT),
            channels: session_uuid.map(|s| vec![s.to_vec()]).unwrap_or_default(),
        };
        encode_frame(FrameType::Subscribe, &msg.encode_to_vec())
    }

    pub fn encode_join_session(
        &self,
        device: &DeviceIdentity,
        session_uuid: Option<&[u8; 16]>,
        max_quality: QualityTier,
        initial_state: Option<&StateReport>,
    ) -> Vec<u8> {
        let join = proto::RndrSrvrJoinSession {
            session_uuid: session_uuid.map(|s| s.to_vec()),
            device_info: Some(device.to_wire(max_quality)),
            reason: Some(1),
            initial_state: initial_state.map(StateReport::to_wire),
            is_active: Some(true),
        };
        self.encode_message(proto::QConnectMessage {
            message_type: Some(mt::RNDR_SRVR_JOIN_SESSION),
            rndr_srvr_join_session: Some(join),
            ..Default::default()
        })
    }

    pub fn encode_state_update(&self, report: &StateReport) -> Vec<u8> {
        self.encode_message(proto::QConnectMessage {
            message_type: Some(mt::RNDR_SRVR_STATE_UPDATED),
            rndr_srvr_state_updated: Some(proto::RndrSrvrStateUpdated {
                state: Some(report.to_wire()),
            }),
            ..Default::default()
        })
    }

    pub fn encode_volume_changed(&self, volume: u8) -> Vec<u8> {
        self.encode_message(proto::QConnectMessage {
            message_type: Some(mt::RNDR_SRVR_VOLUME_CHANGED),
            rndr_srvr_volume_changed: Some(proto::RndrSrvrVolumeChanged {
                volume: Some(u32::from(volume.min(100))),
            }),
            ..Default::default()
        })
    }

    pub fn encode_max_audio_quality_changed(&self, tier: QualityTier) -> Vec<u8> {
        self.encode_message(proto::QConnectMessage {
            message_type: Some(mt::RNDR_SRVR_MAX_AUDIO_QUALITY_CHANGED),
            rndr_srvr_max_audio_quality_changed: Some(proto::RndrSrvrMaxAudioQualityChanged {
                audio_quality: Some(quality_to_protocol(tier)),
                network_type: Some(1),
            }),
            ..Default::default()
        })
    }

    /// Format du fichier en cours de lecture.
    pub fn encode_file_audio_quality_changed(&self, tier: QualityTier) -> Vec<u8> {
        let props = tier.properties();
        self.encode_message(proto::QConnectMessage {
            message_type: Some(mt::RNDR_SRVR_FILE_AUDIO_QUALITY_CHANGED),
            rndr_srvr_file_audio_quality_changed: Some(proto::RndrSrvrFileAudioQualityChanged {
                sampling_rate: Some(props.sample_rate),
                bit_depth: Some(u32::from(props.bit_depth)),
                nb_channels: Some(u32::from(props.channels)),
                audio_quality: Some(quality_to_protocol(tier)),
            }),
            ..Default::default()
        })
    }

    /// Format maximal accepté par le renderer.
    pub fn encode_device_audio_quality_changed(&self, tier: QualityTier) -> Vec<u8> {
        let props = tier.properties();
        self.encode_message(proto::QConnectMessage {
            message_type: Some(mt::RNDR_SRVR_DEVICE_AUDIO_QUALITY_CHANGED),
            rndr_srvr_device_audio_quality_changed: Some(
                proto::RndrSrvrDeviceAudioQualityChanged {
                    sampling_rate: Some(props.sample_rate),
                    bit_depth: Some(u32::from(props.bit_depth)),
                    nb_channels: Some(u32::from(props.channels)),
                },
            ),
            ..Default::default()
        })
    }

    pub fn encode_device_info_updated(
        &self,
        device: &DeviceIdentity,
        max_quality: QualityTier,
    ) -> Vec<u8> {
        self.encode_message(proto::QConnectMessage {
            message_type: Some(mt::RNDR_SRVR_DEVICE_INFO_UPDATED),
            rndr_srvr_device_info_updated: Some(proto::RndrSrvrDeviceInfoUpdated {
                device_info: Some(device.to_wire(max_quality)),
            }),
            ..Default::default()
        })
    }

    /// Encodage côté serveur d'une commande. Sert aux outils de test et aux
    /// contrôleurs simulés : `decode_command(encode_command(c)) == c`.
    pub fn encode_command(&self, command: &Command) -> Vec<u8> {
        self.encode_message(command_to_message(command))
    }

    fn encode_message(&self, message: proto::QConnectMessage) -> Vec<u8> {
        self.encode_batch(vec![message])
    }

    /// Enveloppe plusieurs messages dans un seul lot.
    pub fn encode_batch(&self, messages: Vec<proto::QConnectMessage>) -> Vec<u8> {
        let msg_id = self.next_msg_id();
        let date = now_ms();
        let batch = proto::QConnectBatch {
            messages_time: Some(date),
            messages_id: Some(msg_id as i32),
            messages,
        };
        let payload = proto::Payload {
            msg_id: Some(msg_id),
            msg_date: Some(date),
            proto: Some(proto::QP_QCONNECT),
            src: Some(self.device_uuid.to_vec()),
            dests: Vec::new(),
            payload: Some(batch.encode_to_vec()),
        };
        encode_frame(FrameType::Payload, &payload.encode_to_vec())
    }
}

fn set_state(body: proto::SrvrRndrSetState) -> proto::QConnectMessage {
    proto::QConnectMessage {
        message_type: Some(mt::SRVR_RNDR_SET_STATE),
        srvr_rndr_set_state: Some(body),
        ..Default::default()
    }
}

/// Forme serveur d'une commande.
pub fn command_to_message(command: &Command) -> proto::QConnectMessage {
    match command {
        Command::Play { track, position_ms } => set_state(proto::SrvrRndrSetState {
            playing_state: Some(PLAYING_STATE_PLAYING),
            current_position: Some(clamp_u32(*position_ms)),
            current_queue_item: Some(track.to_wire()),
            ..Default::default()
        }),
        Command::Cue { track, position_ms } => set_state(proto::SrvrRndrSetState {
            playing_state: Some(PLAYING_STATE_PAUSED),
            current_position: Some(clamp_u32(*position_ms)),
            current_queue_item: Some(track.to_wire()),
            ..Default::default()
        }),
        Command::Pause => set_state(proto::SrvrRndrSetState {
            playing_state: Some(PLAYING_STATE_PAUSED),
            ..Default::default()
        }),
        Command::Resume => set_state(proto::SrvrRndrSetState {
            playing_state: Some(PLAYING_STATE_PLAYING),
            ..Default::default()
        }),
        Command::Stop => set_state(proto::SrvrRndrSetState {
            playing_state: Some(PLAYING_STATE_STOPPED),
            ..Default::default()
        }),
        Command::Seek { position_ms } => set_state(proto::SrvrRndrSetState {
            current_position: Some(clamp_u32(*position_ms)),
            ..Default::default()
        }),
        Command::Next => set_state(proto::SrvrRndrSetState {
            skip: Some(proto::SKIP_NEXT),
            ..Default::default()
        }),
        Command::Previous => set_state(proto::SrvrRndrSetState {
            skip: Some(proto::SKIP_PREVIOUS),
            ..Default::default()
        }),
        Command::SetNextTrack(track) => set_state(proto::SrvrRndrSetState {
            next_queue_item: Some(track.to_wire()),
            ..Default::default()
        }),
        Command::SetVolume { volume } => proto::QConnectMessage {
            message_type: Some(mt::SRVR_RNDR_SET_VOLUME),
            srvr_rndr_set_volume: Some(proto::SrvrRndrSetVolume {
                volume: Some(u32::from(*volume)),
                volume_delta: None,
            }),
            ..Default::default()
        },
        Command::AdjustVolume { delta } => proto::QConnectMessage {
            message_type: Some(mt::SRVR_RNDR_SET_VOLUME),
            srvr_rndr_set_volume: Some(proto::SrvrRndrSetVolume {
                volume: None,
                volume_delta: Some(*delta),
            }),
            ..Default::default()
        },
        Command::LoadQueue {
            tracks,
            start_index,
            version,
            shuffle,
        } => proto::QConnectMessage {
            message_type: Some(mt::SRVR_CTRL_QUEUE_TRACKS_LOADED),
            srvr_ctrl_queue_tracks_loaded: Some(proto::SrvrCtrlQueueTracks {
                queue_version: Some(version.to_wire()),
                tracks: tracks.iter().map(TrackRef::to_wire).collect(),
                queue_position: Some(clamp_u32(*start_index as u64)),
                shuffle_mode: Some(*shuffle),
                pivot_queue_item_id: None,
            }),
            ..Default::default()
        },
        Command::SetRepeatMode(mode) => proto::QConnectMessage {
            message_type: Some(mt::SRVR_RNDR_SET_LOOP_MODE),
            srvr_rndr_set_loop_mode: Some(proto::SrvrRndrSetLoopMode {
                mode: Some(mode.to_wire()),
            }),
            ..Default::default()
        },
        Command::SetShuffle(on) => proto::QConnectMessage {
            message_type: Some(mt::SRVR_RNDR_SET_SHUFFLE_MODE),
            srvr_rndr_set_shuffle_mode: Some(proto::SrvrRndrSetShuffleMode {
                shuffle_on: Some(*on),
            }),
            ..Default::default()
        },
        Command::SetActive(active) => proto::QConnectMessage {
            message_type: Some(mt::SRVR_RNDR_SET_ACTIVE),
            srvr_rndr_set_active: Some(proto::SrvrRndrSetActive {
                active: Some(*active),
            }),
            ..Default::default()
        },
        Command::SetMaxAudioQuality(tier) => proto::QConnectMessage {
            message_type: Some(mt::SRVR_RNDR_SET_MAX_AUDIO_QUALITY),
            srvr_rndr_set_max_audio_quality: Some(proto::SrvrRndrSetMaxAudioQuality {
                max_audio_quality: Some(quality_to_protocol(*tier)),
            }),
            ..Default::default()
        },
        Command::SetAutoplay(on) => proto::QConnectMessage {
            message_type: Some(mt::SRVR_RNDR_SET_AUTOPLAY_MODE),
            srvr_rndr_set_autoplay_mode: Some(proto::SrvrRndrSetAutoplayMode {
                autoplay_on: Some(*on),
            }),
            ..Default::default()
        },
    }
}

/// Décode un lot sortant (trame `PAYLOAD`), pour inspection.
pub fn decode_batch(data: &[u8]) -> Result<proto::QConnectBatch, DecodeError> {
    let frame = decode_frame(data)?;
    if frame.frame_type != FrameType::Payload {
        return Err(DecodeError::UnexpectedFrame(frame.frame_type));
    }
    let envelope = proto::Payload::decode(frame.payload)?;
    let inner = envelope.payload.ok_or(DecodeError::EmptyPayload)?;
    Ok(proto::QConnectBatch::decode(inner.as_slice())?)
}
