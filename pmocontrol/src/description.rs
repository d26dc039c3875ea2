//! Récupération et parsing du `description.xml` d'un renderer UPnP.

use std::io::BufReader;

use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::connection_manager_client::CONNECTION_MANAGER_SERVICE;
use crate::errors::ControlPointError;
use crate::rendering_control_client::RENDERING_CONTROL_SERVICE;

/// Chemins de description connus, essayés dans l'ordre.
pub const KNOWN_DESCRIPTION_PATHS: [&str; 6] = [
    "/xml/device_description.xml",
    "/description.xml",
    "/DeviceDescription.xml",
    "/upnp/desc/aios_device/aios_device.xml",
    "/dmr/SamsungMRDesc.xml",
    "/rootDesc.xml",
];

/// Endpoint d'un service UPnP, URL de contrôle déjà absolue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service_type: String,
    pub control_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    /// URL à laquelle la description a été trouvée.
    pub location: String,
    pub udn: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub avtransport: ServiceEndpoint,
    pub rendering_control: Option<ServiceEndpoint>,
    pub connection_manager: Option<ServiceEndpoint>,
}

/// Résout une URL de contrôle relative contre une base (`URLBase` ou URL de la description).
pub fn resolve_control_url(base_url: &str, control_url: &str) -> String {
    if control_url.starts_with("http://") || control_url.starts_with("https://") {
        return control_url.to_string();
    }

    if let Some((scheme, rest)) = base_url.split_once("://") {
        let authority = rest.split('/').next().unwrap_or(rest);
        let base = format!("{}://{}", scheme, authority);
        return if control_url.starts_with('/') {
            format!("{}{}", base, control_url)
        } else {
            format!("{}/{}", base, control_url)
        };
    }

    control_url.to_string()
}

fn child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name == name => Some(elem),
        _ => None,
    })
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    child(parent, name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn children<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(elem) if elem.name == name => Some(elem),
        _ => None,
    })
}

/// Services de tous les devices, embarqués compris (parcours en profondeur).
fn collect_services(device: &Element, out: &mut Vec<(String, String)>) {
    if let Some(list) = child(device, "serviceList") {
        for service in children(list, "service") {
            if let (Some(st), Some(url)) = (child_text(service, "serviceType"), child_text(service, "controlURL")) {
                out.push((st, url));
            }
        }
    }
    if let Some(list) = child(device, "deviceList") {
        for embedded in children(list, "device") {
            collect_services(embedded, out);
        }
    }
}

fn service_type_name(service_type: &str) -> &str {
    // urn:schemas-upnp-org:service:AVTransport:1 → AVTransport
    service_type
        .rsplit(':')
        .nth(1)
        .unwrap_or(service_type)
}

fn find_service(services: &[(String, String)], name: &str, base: &str) -> Option<ServiceEndpoint> {
    services
        .iter()
        .find(|(st, _)| service_type_name(st) == name)
        .map(|(st, url)| ServiceEndpoint {
            service_type: st.clone(),
            control_url: resolve_control_url(base, url),
        })
}

/// Parse un document de description. `location` sert de base quand `URLBase` est absent.
pub fn parse_description(xml: &[u8], location: &str) -> Result<DeviceDescription, ControlPointError> {
    let root = Element::parse(BufReader::new(xml))
        .map_err(|e| ControlPointError::Description(format!("invalid XML at {}: {}", location, e)))?;

    let device = child(&root, "device")
        .ok_or_else(|| ControlPointError::Description(format!("no <device> at {}", location)))?;
    let base = child_text(&root, "URLBase").unwrap_or_else(|| location.to_string());

    let mut services = Vec::new();
    collect_services(device, &mut services);

    let avtransport = find_service(&services, "AVTransport", &base).ok_or_else(|| {
        ControlPointError::Description(format!("{} has no AVTransport service", location))
    })?;
    let rendering_control = find_service(&services, "RenderingControl", &base)
        .or_else(|| find_service(&services, "GroupRenderingControl", &base));
    let connection_manager = find_service(&services, "ConnectionManager", &base);

    debug!(
        location,
        avtransport = %avtransport.control_url,
        rendering_control = ?rendering_control.as_ref().map(|s| &s.control_url),
        "Parsed device description"
    );

    Ok(DeviceDescription {
        location: location.to_string(),
        udn: child_text(device, "UDN").unwrap_or_default(),
        friendly_name: child_text(device, "friendlyName").unwrap_or_else(|| "DLNA renderer".to_string()),
        manufacturer: child_text(device, "manufacturer").unwrap_or_default(),
        model_name: child_text(device, "modelName").unwrap_or_default(),
        avtransport,
        rendering_control,
        connection_manager,
    })
}

impl DeviceDescription {
    /// Identifiant stable du device : l'UDN, sinon l'URL de la description.
    pub fn device_id(&self) -> &str {
        if self.udn.is_empty() { &self.location } else { &self.udn }
    }

    pub fn avtransport_service_type(&self) -> &str {
        &self.avtransport.service_type
    }

    pub fn rendering_control_service_type(&self) -> &str {
        self.rendering_control
            .as_ref()
            .map(|s| s.service_type.as_str())
            .unwrap_or(RENDERING_CONTROL_SERVICE)
    }

    pub fn connection_manager_service_type(&self) -> &str {
        self.connection_manager
            .as_ref()
            .map(|s| s.service_type.as_str())
            .unwrap_or(CONNECTION_MANAGER_SERVICE)
    }
}

/// Essaie `preferred_path` puis les chemins connus sur `http://ip:port`.
pub async fn fetch_description(
    http: &reqwest::Client,
    ip: &str,
    port: u16,
    preferred_path: Option<&str>,
) -> Result<DeviceDescription, ControlPointError> {
    let host = if ip.contains(':') && !ip.starts_with('[') {
        format!("[{}]", ip)
    } else {
        ip.to_string()
    };

    let mut paths: Vec<String> = Vec::new();
    if let Some(path) = preferred_path.filter(|p| !p.is_empty()) {
        paths.push(if path.starts_with('/') { path.to_string() } else { format!("/{}", path) });
    }
    for path in KNOWN_DESCRIPTION_PATHS {
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }

    let mut last_error = None;
    for path in paths {
        let url = format!("http://{}:{}{}", host, port, path);
        debug!(%url, "Trying device description");

        let response = match http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(ControlPointError::from_reqwest(&url, e));
                continue;
            }
        };
        if !response.status().is_success() {
            last_error = Some(ControlPointError::Description(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
            continue;
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| ControlPointError::from_reqwest(&url, e))?;

        match parse_description(&body, &url) {
            Ok(desc) => return Ok(desc),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ControlPointError::Description(format!("no description found on {}:{}", ip, port))
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const RENDERER_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:ZonePlayer:1</deviceType>
    <friendlyName>Living Room</friendlyName>
    <manufacturer>Sonos, Inc.</manufacturer>
    <modelName>Sonos One</modelName>
    <UDN>uuid:RINCON_000E58A0B1C201400</UDN>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
        <friendlyName>Living Room - Media Renderer</friendlyName>
        <UDN>uuid:RINCON_000E58A0B1C201400_MR</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:GroupRenderingControl:1</serviceType>
            <controlURL>/MediaRenderer/GroupRenderingControl/Control</controlURL>
          </service>
          <service>
            <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
            <controlURL>/MediaRenderer/RenderingControl/Control</controlURL>
          </service>
          <service>
            <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
            <controlURL>/MediaRenderer/ConnectionManager/Control</controlURL>
          </service>
          <service>
            <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
            <controlURL>MediaRenderer/AVTransport/Control</controlURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    #[test]
    fn parse_embedded_renderer_services() {
        let desc = parse_description(
            RENDERER_DESCRIPTION.as_bytes(),
            "http://192.168.1.20:1400/xml/device_description.xml",
        )
        .unwrap();

        assert_eq!(desc.friendly_name, "Living Room");
        assert_eq!(desc.manufacturer, "Sonos, Inc.");
        assert_eq!(desc.model_name, "Sonos One");
        assert_eq!(desc.udn, "uuid:RINCON_000E58A0B1C201400");
        assert_eq!(
            desc.avtransport.control_url,
            "http://192.168.1.20:1400/MediaRenderer/AVTransport/Control"
        );
        let rc = desc.rendering_control.unwrap();
        assert_eq!(rc.service_type, "urn:schemas-upnp-org:service:RenderingControl:1");
        assert_eq!(
            rc.control_url,
            "http://192.168.1.20:1400/MediaRenderer/RenderingControl/Control"
        );
        assert!(desc.connection_manager.is_some());
    }

    #[test]
    fn url_base_takes_precedence() {
        let xml = r#"<root>
  <URLBase>http://10.0.0.5:49152/</URLBase>
  <device>
    <friendlyName>Kitchen</friendlyName>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <controlURL>/upnp/control/avt</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;
        let desc = parse_description(xml.as_bytes(), "http://10.0.0.5:8080/description.xml").unwrap();
        assert_eq!(desc.avtransport.control_url, "http://10.0.0.5:49152/upnp/control/avt");
        assert!(desc.rendering_control.is_none());
        assert_eq!(desc.device_id(), "http://10.0.0.5:8080/description.xml");
        assert_eq!(desc.rendering_control_service_type(), RENDERING_CONTROL_SERVICE);
    }

    #[test]
    fn missing_avtransport_is_an_error() {
        let xml = "<root><device><friendlyName>TV</friendlyName></device></root>";
        assert!(matches!(
            parse_description(xml.as_bytes(), "http://tv/desc.xml"),
            Err(ControlPointError::Description(_))
        ));
    }

    #[test]
    fn resolve_relative_urls() {
        assert_eq!(
            resolve_control_url("http://h:1400/xml/desc.xml", "/ctl"),
            "http://h:1400/ctl"
        );
        assert_eq!(resolve_control_url("http://h:1400", "ctl"), "http://h:1400/ctl");
        assert_eq!(
            resolve_control_url("http://h:1400/x", "http://other/ctl"),
            "http://other/ctl"
        );
    }
}
