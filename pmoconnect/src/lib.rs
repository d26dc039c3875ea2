//! # pmoconnect - Protocole Connect
//!
//! Côté renderer du protocole de contrôle à distance :
//!
//! - [`proto`] : messages protobuf de l'enveloppe et du lot ;
//! - [`codec`] : découpage des trames, décodage des commandes et encodage
//!   des rapports d'état ;
//! - [`session`] : lien websocket persistant (poignée de main, keepalive,
//!   reconnexion avec backoff).

pub mod codec;
pub mod error;
pub mod proto;
pub mod session;

pub use codec::{
    BUFFER_STATE_BUFFERING, BUFFER_STATE_ERROR, BUFFER_STATE_OK, Command, DeviceIdentity, Frame,
    FrameType, Inbound, PLAYING_STATE_PAUSED, PLAYING_STATE_PLAYING, PLAYING_STATE_STOPPED,
    ProtocolCodec, QueueVersion, RepeatMode, StateReport, TrackRef, decode_batch, decode_command,
    decode_commands, decode_frame, decode_inbound, quality_from_protocol, quality_to_protocol,
};
pub use error::{DecodeError, SessionError};
pub use session::{Backoff, ConnectSession, LinkState, SessionConfig, SessionEvent, SessionHandle};
