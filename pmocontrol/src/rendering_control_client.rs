use crate::errors::ControlPointError;
use crate::soap::{SoapClient, SoapEnvelope, action_response, extract_child_text};

pub const RENDERING_CONTROL_SERVICE: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

#[derive(Debug, Clone)]
pub struct RenderingControlClient {
    pub control_url: String,
    pub service_type: String,
    soap: SoapClient,
}

impl RenderingControlClient {
    pub fn new(control_url: String, service_type: String, soap: SoapClient) -> Self {
        Self {
            control_url,
            service_type,
            soap,
        }
    }

    pub async fn get_volume(&self) -> Result<u32, ControlPointError> {
        let envelope = self
            .soap
            .call(
                &self.control_url,
                &self.service_type,
                "GetVolume",
                &[("InstanceID", "0"), ("Channel", "Master")],
            )
            .await?;
        parse_volume(&envelope)
    }

    pub async fn set_volume(&self, volume: u32) -> Result<(), ControlPointError> {
        let desired = volume.to_string();
        self.soap
            .call(
                &self.control_url,
                &self.service_type,
                "SetVolume",
                &[
                    ("InstanceID", "0"),
                    ("Channel", "Master"),
                    ("DesiredVolume", &desired),
                ],
            )
            .await
            .map(|_| ())
    }
}

fn parse_volume(envelope: &SoapEnvelope) -> Result<u32, ControlPointError> {
    let response = action_response(envelope, "GetVolume")?;
    let value = extract_child_text(response, "CurrentVolume")?;
    value
        .parse::<u32>()
        .map_err(|_| ControlPointError::upnp_bad_return_value("CurrentVolume", &value))
}
