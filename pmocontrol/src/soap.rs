//! Client SOAP minimal pour piloter un renderer UPnP.
//!
//! - construction de l'enveloppe (une seule ligne, arguments échappés par xmltree)
//! - envoi asynchrone avec timeout borné
//! - parsing de l'enveloppe et des fautes UPnP

use std::io::BufReader;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::errors::ControlPointError;

/// Enveloppe SOAP parsée.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub header: Option<SoapHeader>,
    pub body: SoapBody,
}

#[derive(Debug, Clone)]
pub struct SoapHeader {
    pub content: Element,
}

#[derive(Debug, Clone)]
pub struct SoapBody {
    pub content: Element,
}

/// Erreur UPnP extraite d'une faute SOAP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpError {
    pub code: u32,
    pub description: String,
}

/// Construit une requête SOAP UPnP
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, ControlPointError> {
    let mut request_elem = Element::new(&format!("u:{}", action));
    request_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text((*value).to_string()));
        request_elem.children.push(XMLNode::Element(child));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(request_elem));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.attributes.insert(
        "s:encodingStyle".to_string(),
        "http://schemas.xmlsoap.org/soap/encoding/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(false);
    envelope
        .write_with_config(&mut buf, config)
        .map_err(|e| ControlPointError::SoapBuild(action.to_string(), e.to_string()))?;

    String::from_utf8(buf).map_err(|e| ControlPointError::SoapBuild(action.to_string(), e.to_string()))
}

/// Parse une enveloppe SOAP complète
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, ControlPointError> {
    let root = Element::parse(BufReader::new(xml))
        .map_err(|e| ControlPointError::ParsingError(format!("Invalid SOAP XML: {}", e)))?;

    if !root.name.ends_with("Envelope") {
        return Err(ControlPointError::ParsingError(
            "Missing SOAP Envelope".to_string(),
        ));
    }

    let header = find_child_with_suffix(&root, "Header").map(|e| SoapHeader { content: e.clone() });
    let body = find_child_with_suffix(&root, "Body")
        .ok_or_else(|| ControlPointError::ParsingError("Missing SOAP Body".to_string()))?;

    Ok(SoapEnvelope {
        header,
        body: SoapBody {
            content: body.clone(),
        },
    })
}

/// Extrait `errorCode`/`errorDescription` d'une faute SOAP.
pub fn parse_upnp_error(envelope: &SoapEnvelope) -> Option<UpnpError> {
    let fault = find_child_with_suffix(&envelope.body.content, "Fault")?;
    let detail = find_child_with_suffix(fault, "detail")?;
    let upnp_error = find_child_with_suffix(detail, "UPnPError")?;

    let code = find_child_with_suffix(upnp_error, "errorCode")?
        .get_text()?
        .trim()
        .parse::<u32>()
        .ok()?;
    let description = find_child_with_suffix(upnp_error, "errorDescription")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    Some(UpnpError { code, description })
}

pub fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}

pub fn extract_child_text(parent: &Element, suffix: &str) -> Result<String, ControlPointError> {
    let text = extract_child_text_allow_empty(parent, suffix)?;
    if text.is_empty() {
        return Err(ControlPointError::upnp_bad_return_value(suffix, ""));
    }
    Ok(text)
}

pub fn extract_child_text_allow_empty(
    parent: &Element,
    suffix: &str,
) -> Result<String, ControlPointError> {
    let child = find_child_with_suffix(parent, suffix)
        .ok_or_else(|| ControlPointError::upnp_missing_return_value(suffix))?;
    Ok(child
        .get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default())
}

/// Result of a SOAP call:
/// - HTTP status code
/// - raw XML body (always)
/// - parsed SOAP envelope if parsing succeeded
#[derive(Debug)]
pub struct SoapCallResult {
    pub status: StatusCode,
    pub raw_body: String,
    pub envelope: Option<SoapEnvelope>,
}

/// Client HTTP partagé par les clients de services UPnP.
#[derive(Debug, Clone)]
pub struct SoapClient {
    http: reqwest::Client,
}

impl SoapClient {
    pub fn new(timeout: Duration) -> Result<Self, ControlPointError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlPointError::from_reqwest("SOAP client", e))?;
        Ok(Self { http })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Invoke a UPnP SOAP action on a control URL.
    ///
    /// HTTP error statuses are not turned into errors here: a UPnP fault comes
    /// back as HTTP 500 with a SOAP body worth reading.
    pub async fn invoke(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<SoapCallResult, ControlPointError> {
        let body_xml = build_soap_request(service_type, action, args)?;
        let soap_action_header = format!(r#""{}#{}""#, service_type, action);

        debug!(action, control_url, "Sending SOAP request");
        let response = self
            .http
            .post(control_url)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("SOAPAction", soap_action_header)
            .body(body_xml)
            .send()
            .await
            .map_err(|e| ControlPointError::from_reqwest(action, e))?;

        let status = response.status();
        let raw_body = response
            .text()
            .await
            .map_err(|e| ControlPointError::from_reqwest(action, e))?;
        let envelope = parse_soap_envelope(raw_body.as_bytes()).ok();

        Ok(SoapCallResult {
            status,
            raw_body,
            envelope,
        })
    }

    /// Invokes an action and returns the envelope of a successful response.
    pub async fn call(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<SoapEnvelope, ControlPointError> {
        let result = self.invoke(control_url, service_type, action, args).await?;
        ensure_success(action, result)
    }
}

fn ensure_success(action: &str, call_result: SoapCallResult) -> Result<SoapEnvelope, ControlPointError> {
    let status = call_result.status.as_u16() as u32;

    if !call_result.status.is_success() {
        if let Some(err) = call_result.envelope.as_ref().and_then(parse_upnp_error) {
            return Err(ControlPointError::SoapUpnpParseError(
                action.to_string(),
                err.code,
                err.description,
                status,
            ));
        }
        return Err(ControlPointError::SoapActionWrongBody(
            action.to_string(),
            status,
            call_result.raw_body,
        ));
    }

    call_result
        .envelope
        .ok_or_else(|| ControlPointError::SoapNoEnvelop(action.to_string()))
}

/// Retourne l'élément `{action}Response` du corps SOAP.
pub fn action_response<'a>(
    envelope: &'a SoapEnvelope,
    action: &str,
) -> Result<&'a Element, ControlPointError> {
    let name = format!("{}Response", action);
    find_child_with_suffix(&envelope.body.content, &name)
        .ok_or_else(|| ControlPointError::upnp_missing_return_value(&name))
}
