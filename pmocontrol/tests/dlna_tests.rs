//! Backend DLNA contre un renderer simulé (description + actions SOAP).

use std::time::Duration;

use pmoconfig::DlnaConfig;
use pmocontrol::{
    Backend, BackendAction, CapabilityCache, ControlPointError, DlnaBackend, QualityTier, Track,
    TrackSource, TransportState,
};
use pmoserver::{AudioProxy, ProxyOptions};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

const AVT: &str = "urn:schemas-upnp-org:service:AVTransport:1";
const RC: &str = "urn:schemas-upnp-org:service:RenderingControl:1";
const CM: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

fn description_xml() -> String {
    format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Salon</friendlyName>
    <manufacturer>WiiM</manufacturer>
    <modelName>WiiM Pro</modelName>
    <UDN>uuid:4b1d3d6e-0000-1000-8000-00e04c680001</UDN>
    <serviceList>
      <service><serviceType>{AVT}</serviceType><controlURL>/upnp/control/avt</controlURL></service>
      <service><serviceType>{RC}</serviceType><controlURL>/upnp/control/rc</controlURL></service>
      <service><serviceType>{CM}</serviceType><controlURL>/upnp/control/cm</controlURL></service>
    </serviceList>
  </device>
</root>"#
    )
}

fn soap_response(service: &str, action: &str, values: &[(&str, &str)]) -> String {
    let fields: String = values
        .iter()
        .map(|(k, v)| format!("<{k}>{v}</{k}>"))
        .collect();
    format!(
        r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action}Response xmlns:u="{service}">{fields}</u:{action}Response></s:Body></s:Envelope>"#
    )
}

fn soap_fault(code: u32, description: &str) -> String {
    format!(
        r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring><detail><UPnPError xmlns="urn:schemas-upnp-org:control-1-0"><errorCode>{code}</errorCode><errorDescription>{description}</errorDescription></UPnPError></detail></s:Fault></s:Body></s:Envelope>"#
    )
}

fn soap_action(service: &str, action: &str) -> String {
    format!("\"{}#{}\"", service, action)
}

async fn mount_action(server: &MockServer, control: &str, service: &str, action: &str, body: String) {
    Mock::given(method("POST"))
        .and(path(control))
        .and(header("SOAPAction", soap_action(service, action).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn renderer() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/description.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(description_xml()))
        .mount(&server)
        .await;
    mount_action(
        &server,
        "/upnp/control/cm",
        CM,
        "GetProtocolInfo",
        soap_response(
            CM,
            "GetProtocolInfo",
            &[
                ("Source", ""),
                (
                    "Sink",
                    "http-get:*:audio/flac:DLNA.ORG_PN=FLAC_192;DLNA.ORG_OP=01,http-get:*:audio/mpeg:DLNA.ORG_PN=MP3",
                ),
            ],
        ),
    )
    .await;
    server
}

fn config_for(server: &MockServer) -> DlnaConfig {
    DlnaConfig {
        ip: "127.0.0.1".to_string(),
        port: server.address().port(),
        request_timeout_ms: 500,
        volume_debounce_ms: 100,
        ..DlnaConfig::default()
    }
}

fn proxy() -> AudioProxy {
    AudioProxy::new("http://10.0.0.2:7120", ProxyOptions::default()).unwrap()
}

fn track() -> Track {
    Track {
        id: "59954869".to_string(),
        title: "So What".to_string(),
        artist: "Miles Davis".to_string(),
        album: "Kind of Blue".to_string(),
        duration_ms: Some(545_000),
        cover_url: None,
        source: TrackSource::new("https://streaming.example/file.flac").with_header("X-App-Id", "1"),
        quality: QualityTier::HiRes192,
    }
}

#[tokio::test]
async fn test_connect_walks_known_description_paths() -> anyhow::Result<()> {
    let server = renderer().await;
    let backend = DlnaBackend::connect(&config_for(&server), proxy(), &CapabilityCache::default()).await?;

    assert_eq!(backend.name(), "Salon");
    let desc = backend.description();
    assert_eq!(desc.model_name, "WiiM Pro");
    assert_eq!(
        desc.avtransport.control_url,
        format!("{}/upnp/control/avt", server.uri())
    );
    Ok(())
}

#[tokio::test]
async fn test_connect_fails_without_description() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let err = DlnaBackend::connect(&config_for(&server), proxy(), &CapabilityCache::default())
        .await
        .err()
        .expect("connect should fail");
    assert_eq!(err.action, BackendAction::Connect);
    Ok(())
}

#[tokio::test]
async fn test_capabilities_are_negotiated_and_cached() -> anyhow::Result<()> {
    let server = renderer().await;
    let cache = CapabilityCache::default();
    let backend = DlnaBackend::connect(&config_for(&server), proxy(), &cache).await?;

    let caps = backend.get_capabilities().await?;
    assert_eq!(caps.max_quality(), QualityTier::HiRes192);

    let cached = cache
        .get("uuid:4b1d3d6e-0000-1000-8000-00e04c680001")
        .await
        .expect("capabilities should be cached");
    assert_eq!(cached, caps);
    Ok(())
}

#[tokio::test]
async fn test_load_registers_proxy_url_and_sets_transport_uri() -> anyhow::Result<()> {
    let server = renderer().await;
    Mock::given(method("POST"))
        .and(path("/upnp/control/avt"))
        .and(header("SOAPAction", soap_action(AVT, "SetAVTransportURI").as_str()))
        .and(body_string_contains("http://10.0.0.2:7120/stream/"))
        .and(body_string_contains("DLNA.ORG_PN=FLAC_192"))
        .respond_with(ResponseTemplate::new(200).set_body_string(soap_response(AVT, "SetAVTransportURI", &[])))
        .expect(2)
        .mount(&server)
        .await;

    let proxy = proxy();
    let backend = DlnaBackend::connect(&config_for(&server), proxy.clone(), &CapabilityCache::default()).await?;

    backend.load(&track()).await?;
    assert_eq!(proxy.len().await, 1);

    // Le jeton de la piste précédente est libéré
    backend.load(&track()).await?;
    assert_eq!(proxy.len().await, 1);

    backend.disconnect().await;
    assert!(proxy.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_status_and_position_are_parsed() -> anyhow::Result<()> {
    let server = renderer().await;
    mount_action(
        &server,
        "/upnp/control/avt",
        AVT,
        "GetTransportInfo",
        soap_response(
            AVT,
            "GetTransportInfo",
            &[
                ("CurrentTransportState", "PLAYING"),
                ("CurrentTransportStatus", "OK"),
                ("CurrentSpeed", "1"),
            ],
        ),
    )
    .await;
    mount_action(
        &server,
        "/upnp/control/avt",
        AVT,
        "GetPositionInfo",
        soap_response(
            AVT,
            "GetPositionInfo",
            &[
                ("Track", "1"),
                ("TrackDuration", "0:09:05"),
                ("TrackURI", ""),
                ("RelTime", "0:01:02.250"),
            ],
        ),
    )
    .await;

    let backend = DlnaBackend::connect(&config_for(&server), proxy(), &CapabilityCache::default()).await?;
    let status = backend.get_status().await?;
    assert_eq!(status.transport, TransportState::Playing);
    assert_eq!(status.position_ms, 62_250);
    assert_eq!(status.duration_ms, Some(545_000));

    let position = backend.get_position().await?;
    assert_eq!(position.value_ms, 62_250);
    Ok(())
}

#[tokio::test]
async fn test_upnp_fault_is_reported_with_action() -> anyhow::Result<()> {
    let server = renderer().await;
    Mock::given(method("POST"))
        .and(path("/upnp/control/avt"))
        .and(header("SOAPAction", soap_action(AVT, "Play").as_str()))
        .respond_with(ResponseTemplate::new(500).set_body_string(soap_fault(701, "Transition not available")))
        .mount(&server)
        .await;

    let backend = DlnaBackend::connect(&config_for(&server), proxy(), &CapabilityCache::default()).await?;
    let err = backend.play().await.err().expect("play should fail");
    assert_eq!(err.action, BackendAction::Play);
    assert!(matches!(
        err.source,
        ControlPointError::SoapUpnpParseError(_, 701, _, 500)
    ));
    Ok(())
}

#[tokio::test]
async fn test_slow_renderer_times_out() -> anyhow::Result<()> {
    let server = renderer().await;
    Mock::given(method("POST"))
        .and(path("/upnp/control/avt"))
        .and(header("SOAPAction", soap_action(AVT, "Pause").as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(soap_response(AVT, "Pause", &[]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let backend = DlnaBackend::connect(&config_for(&server), proxy(), &CapabilityCache::default()).await?;
    let err = backend.pause().await.err().expect("pause should time out");
    assert!(err.is_timeout());
    Ok(())
}

/// Actions SOAP reçues par le renderer, dans l'ordre d'arrivée.
async fn received_actions(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| {
            let action = r
                .headers
                .get("SOAPAction")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim_matches('"').rsplit('#').next().map(str::to_string))
                .unwrap_or_default();
            let body = String::from_utf8_lossy(&r.body);
            match body
                .split("<DesiredVolume>")
                .nth(1)
                .and_then(|rest| rest.split('<').next())
            {
                Some(volume) => format!("{action}{volume}"),
                None => action,
            }
        })
        .collect()
}

#[tokio::test]
async fn test_volume_calls_are_spaced_and_ordered_with_transport() -> anyhow::Result<()> {
    let server = renderer().await;
    mount_action(&server, "/upnp/control/rc", RC, "SetVolume", soap_response(RC, "SetVolume", &[])).await;
    mount_action(&server, "/upnp/control/avt", AVT, "Pause", soap_response(AVT, "Pause", &[])).await;

    let mut config = config_for(&server);
    config.max_volume = 50;
    let backend = DlnaBackend::connect(&config, proxy(), &CapabilityCache::default()).await?;

    let started = std::time::Instant::now();
    backend.set_volume(10).await?;
    backend.set_volume(80).await?;
    assert!(started.elapsed() >= Duration::from_millis(100));
    backend.pause().await?;

    // 80 % de 50
    assert_eq!(
        received_actions(&server).await,
        vec!["SetVolume5", "SetVolume40", "Pause"]
    );
    Ok(())
}

#[tokio::test]
async fn test_set_volume_fault_is_reported_with_action() -> anyhow::Result<()> {
    let server = renderer().await;
    Mock::given(method("POST"))
        .and(path("/upnp/control/rc"))
        .and(header("SOAPAction", soap_action(RC, "SetVolume").as_str()))
        .respond_with(ResponseTemplate::new(500).set_body_string(soap_fault(501, "Action Failed")))
        .mount(&server)
        .await;

    let backend = DlnaBackend::connect(&config_for(&server), proxy(), &CapabilityCache::default()).await?;
    let err = backend.set_volume(30).await.err().expect("set_volume should fail");
    assert_eq!(err.action, BackendAction::SetVolume);
    assert!(matches!(
        err.source,
        ControlPointError::SoapUpnpParseError(_, 501, _, 500)
    ));
    Ok(())
}

#[tokio::test]
async fn test_fixed_volume_never_calls_renderer() -> anyhow::Result<()> {
    let server = renderer().await;
    let mut config = config_for(&server);
    config.fixed_volume = true;
    let backend = DlnaBackend::connect(&config, proxy(), &CapabilityCache::default()).await?;

    backend.set_volume(10).await?;
    assert_eq!(backend.get_volume().await?, 100);

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.iter().all(|r| r.url.path() != "/upnp/control/rc"));
    Ok(())
}
