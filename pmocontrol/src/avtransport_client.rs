use crate::errors::ControlPointError;
use crate::model::TransportState;
use crate::soap::{SoapClient, SoapEnvelope, action_response, extract_child_text, extract_child_text_allow_empty};
use crate::time_utils::{format_rel_time_ms, parse_time_ms};

pub const AVTRANSPORT_SERVICE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

#[derive(Debug, Clone)]
pub struct AvTransportClient {
    pub control_url: String,
    pub service_type: String,
    soap: SoapClient,
}

#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub current_transport_state: String,
    pub current_transport_status: String,
    pub current_speed: String,
}

impl TransportInfo {
    /// PLAYING → Playing, PAUSED_PLAYBACK → Paused, TRANSITIONING → Loading,
    /// tout le reste (STOPPED, NO_MEDIA_PRESENT, …) → Stopped.
    pub fn transport_state(&self) -> TransportState {
        match self.current_transport_state.as_str() {
            "PLAYING" => TransportState::Playing,
            "PAUSED_PLAYBACK" => TransportState::Paused,
            "TRANSITIONING" => TransportState::Loading,
            _ => TransportState::Stopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionInfo {
    pub track_uri: String,
    pub rel_time_ms: Option<u64>,
    pub track_duration_ms: Option<u64>,
}

impl AvTransportClient {
    pub fn new(control_url: String, service_type: String, soap: SoapClient) -> Self {
        Self {
            control_url,
            service_type,
            soap,
        }
    }

    async fn call(&self, action: &str, args: &[(&str, &str)]) -> Result<SoapEnvelope, ControlPointError> {
        self.soap
            .call(&self.control_url, &self.service_type, action, args)
            .await
    }

    pub async fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> Result<(), ControlPointError> {
        self.call(
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", uri),
                ("CurrentURIMetaData", metadata),
            ],
        )
        .await
        .map(|_| ())
    }

    pub async fn play(&self) -> Result<(), ControlPointError> {
        self.call("Play", &[("InstanceID", "0"), ("Speed", "1")])
            .await
            .map(|_| ())
    }

    pub async fn pause(&self) -> Result<(), ControlPointError> {
        self.call("Pause", &[("InstanceID", "0")]).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<(), ControlPointError> {
        self.call("Stop", &[("InstanceID", "0")]).await.map(|_| ())
    }

    pub async fn seek_rel_time(&self, position_ms: u64) -> Result<(), ControlPointError> {
        let target = format_rel_time_ms(position_ms);
        self.call(
            "Seek",
            &[("InstanceID", "0"), ("Unit", "REL_TIME"), ("Target", &target)],
        )
        .await
        .map(|_| ())
    }

    pub async fn get_transport_info(&self) -> Result<TransportInfo, ControlPointError> {
        let envelope = self.call("GetTransportInfo", &[("InstanceID", "0")]).await?;
        parse_transport_info(&envelope)
    }

    pub async fn get_position_info(&self) -> Result<PositionInfo, ControlPointError> {
        let envelope = self.call("GetPositionInfo", &[("InstanceID", "0")]).await?;
        parse_position_info(&envelope)
    }
}

fn parse_transport_info(envelope: &SoapEnvelope) -> Result<TransportInfo, ControlPointError> {
    let response = action_response(envelope, "GetTransportInfo")?;

    let current_transport_state = extract_child_text(response, "CurrentTransportState")?;
    let current_transport_status =
        extract_child_text_allow_empty(response, "CurrentTransportStatus").unwrap_or_default();
    let current_speed = extract_child_text_allow_empty(response, "CurrentSpeed").unwrap_or_default();

    Ok(TransportInfo {
        current_transport_state,
        current_transport_status,
        current_speed,
    })
}

fn parse_position_info(envelope: &SoapEnvelope) -> Result<PositionInfo, ControlPointError> {
    let response = action_response(envelope, "GetPositionInfo")?;

    let rel_time = extract_child_text_allow_empty(response, "RelTime")?;
    let duration = extract_child_text_allow_empty(response, "TrackDuration").unwrap_or_default();
    let track_uri = extract_child_text_allow_empty(response, "TrackURI").unwrap_or_default();

    // "NOT_IMPLEMENTED" ou vide : valeur inconnue plutôt qu'erreur
    Ok(PositionInfo {
        track_uri,
        rel_time_ms: parse_time_ms(&rel_time).ok(),
        track_duration_ms: parse_time_ms(&duration).ok().filter(|d| *d > 0),
    })
}
