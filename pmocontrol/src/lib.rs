//! # pmocontrol - Pilotage des renderers DLNA
//!
//! Cette crate fournit le backend de rendu du pont PMOConnect :
//!
//! - clients SOAP des services AVTransport, RenderingControl et ConnectionManager
//! - lecture de la description du device et négociation des capacités audio
//! - trait [`Backend`] et son implémentation DLNA, qui sert les pistes au
//!   renderer à travers le proxy audio de `pmoserver`
//! - types partagés ([`Track`], [`QualityTier`], [`PlaybackState`], …)

pub mod avtransport_client;
pub mod backend;
pub mod capabilities;
pub mod connection_manager_client;
pub mod description;
pub mod didl;
pub mod dlna;
pub mod errors;
pub mod model;
pub mod rendering_control_client;
pub mod soap;
pub mod time_utils;

pub use avtransport_client::{AvTransportClient, PositionInfo, TransportInfo};
pub use backend::{Backend, RendererBackend};
pub use capabilities::{CapabilityCache, DeviceCapability, SinkEntry};
pub use connection_manager_client::{ConnectionManagerClient, ProtocolInfo};
pub use description::{DeviceDescription, ServiceEndpoint, fetch_description};
pub use dlna::DlnaBackend;
pub use errors::{BackendAction, BackendError, ControlPointError};
pub use model::{
    AudioProperties, BackendStatus, PlaybackState, PositionSnapshot, QualityTier, Track,
    TrackSource, TransportState, now_ms,
};
pub use rendering_control_client::RenderingControlClient;
pub use soap::SoapClient;
