//! Résolveur HTTP contre un service simulé.

use std::collections::BTreeMap;

use pmoconfig::ResolverConfig;
use pmocontrol::QualityTier;
use pmoplayer::{HttpTrackResolver, TrackResolver};
use pmoserver::SourceRefresher;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

fn config(server: &MockServer) -> ResolverConfig {
    let mut headers = BTreeMap::new();
    headers.insert("X-App-Id".to_string(), "pmoconnect".to_string());
    ResolverConfig {
        url: format!("{}/tracks/", server.uri()),
        timeout_ms: 2_000,
        headers,
    }
}

fn body(quality: u32) -> serde_json::Value {
    json!({
        "id": "12345",
        "title": "So What",
        "artist": "Miles Davis",
        "album": "Kind of Blue",
        "duration_ms": 545000,
        "cover_url": "https://covers.example/kob.jpg",
        "url": "https://streaming.example/file/12345?sig=abc",
        "headers": { "X-Session": "s3cr3t" },
        "mime_type": "audio/flac",
        "quality": quality
    })
}

#[tokio::test]
async fn test_resolve_builds_track_with_source_headers() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/12345"))
        .and(query_param("quality", "7"))
        .and(header("X-App-Id", "pmoconnect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(7)))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = HttpTrackResolver::new(&config(&server))?;
    let track = resolver.resolve("12345", QualityTier::HiRes96).await?;

    assert_eq!(track.id, "12345");
    assert_eq!(track.title, "So What");
    assert_eq!(track.duration_ms, Some(545_000));
    assert_eq!(track.quality, QualityTier::HiRes96);
    assert_eq!(track.source.uri, "https://streaming.example/file/12345?sig=abc");
    assert_eq!(
        track.source.headers.get("X-Session").map(String::as_str),
        Some("s3cr3t")
    );
    Ok(())
}

#[tokio::test]
async fn test_returned_quality_never_exceeds_request() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(27)))
        .mount(&server)
        .await;

    let resolver = HttpTrackResolver::new(&config(&server))?;
    let track = resolver.resolve("12345", QualityTier::Cd).await?;
    assert_eq!(track.quality, QualityTier::Cd);
    Ok(())
}

#[tokio::test]
async fn test_http_error_is_reported() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolver = HttpTrackResolver::new(&config(&server))?;
    let err = resolver
        .resolve("999", QualityTier::Cd)
        .await
        .expect_err("404 must fail");
    assert!(err.to_string().contains("404"));
    Ok(())
}

#[tokio::test]
async fn test_refresh_reuses_last_requested_quality() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/12345"))
        .and(query_param("quality", "27"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(27)))
        .expect(2)
        .mount(&server)
        .await;

    let resolver = HttpTrackResolver::new(&config(&server))?;
    resolver.resolve("12345", QualityTier::HiRes192).await?;
    let source = resolver.refresh("12345").await?;
    assert_eq!(source.uri, "https://streaming.example/file/12345?sig=abc");
    Ok(())
}

#[tokio::test]
async fn test_forgotten_track_refreshes_at_default_quality() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/12345"))
        .and(query_param("quality", "27"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(27)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tracks/12345"))
        .and(query_param("quality", "6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(6)))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = HttpTrackResolver::new(&config(&server))?;
    resolver.resolve("12345", QualityTier::HiRes192).await?;
    resolver.forget("12345").await;
    resolver.refresh("12345").await?;
    Ok(())
}

#[test]
fn test_missing_url_is_rejected() {
    assert!(HttpTrackResolver::new(&ResolverConfig::default()).is_err());
}
