use crate::errors::ControlPointError;
use crate::soap::{SoapClient, SoapEnvelope, action_response, extract_child_text_allow_empty};

pub const CONNECTION_MANAGER_SERVICE: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

#[derive(Debug, Clone)]
pub struct ConnectionManagerClient {
    pub control_url: String,
    pub service_type: String,
    soap: SoapClient,
}

/// Raw `Source`/`Sink` strings returned by GetProtocolInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub source: String,
    pub sink: String,
}

impl ProtocolInfo {
    pub fn sink_entries(&self) -> Vec<String> {
        split_list(&self.sink)
    }
}

impl ConnectionManagerClient {
    pub fn new(control_url: String, service_type: String, soap: SoapClient) -> Self {
        Self {
            control_url,
            service_type,
            soap,
        }
    }

    pub async fn get_protocol_info(&self) -> Result<ProtocolInfo, ControlPointError> {
        let envelope = self
            .soap
            .call(&self.control_url, &self.service_type, "GetProtocolInfo", &[])
            .await?;
        parse_protocol_info(&envelope)
    }
}

fn parse_protocol_info(envelope: &SoapEnvelope) -> Result<ProtocolInfo, ControlPointError> {
    let response = action_response(envelope, "GetProtocolInfo")?;
    let source = extract_child_text_allow_empty(response, "Source").unwrap_or_default();
    let sink = extract_child_text_allow_empty(response, "Sink")?;
    Ok(ProtocolInfo { source, sink })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::tests::response_envelope;

    #[test]
    fn parse_protocol_info_splits_sink() {
        let envelope = response_envelope(
            "GetProtocolInfo",
            &[
                ("Source", ""),
                (
                    "Sink",
                    "http-get:*:audio/flac:*, http-get:*:audio/mpeg:DLNA.ORG_PN=MP3,,",
                ),
            ],
        );

        let info = parse_protocol_info(&envelope).unwrap();
        assert_eq!(info.source, "");
        assert_eq!(
            info.sink_entries(),
            vec![
                "http-get:*:audio/flac:*".to_string(),
                "http-get:*:audio/mpeg:DLNA.ORG_PN=MP3".to_string()
            ]
        );
    }

    #[test]
    fn parse_protocol_info_requires_sink() {
        let envelope = response_envelope("GetProtocolInfo", &[("Source", "")]);
        assert!(parse_protocol_info(&envelope).is_err());
    }
}
