use std::sync::Arc;

use anyhow::{Context, bail};
use pmoconfig::Config;
use pmoplayer::{ConnectContext, HttpTrackResolver};
use pmoserver::{AudioProxy, ProxyOptions, logs::init_logging};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Configuration ==========

    // Répertoire de configuration optionnel en premier argument
    let config_dir = std::env::args().nth(1).unwrap_or_default();
    let config = Config::load_config(&config_dir)?;
    let settings = config.settings();
    let _log_handle = init_logging(&settings.logging)?;

    info!("🎶 PMOConnect {} starting", env!("CARGO_PKG_VERSION"));
    info!(config_dir = %config.config_dir().display(), "Configuration loaded");

    if settings.connect.token.trim().is_empty() {
        bail!("connect.token is not configured");
    }

    // ========== PHASE 2 : Proxy audio ==========

    let resolver = Arc::new(HttpTrackResolver::new(&settings.resolver)?);
    let proxy = AudioProxy::with_refresher(
        settings.server.proxy_base_url(),
        ProxyOptions::from(&settings.server),
        resolver.clone(),
    )?;

    let bind = format!(
        "{}:{}",
        settings.server.bind_address, settings.server.proxy_port
    );
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot bind audio proxy on {bind}"))?;

    let cancel = CancellationToken::new();
    let server = tokio::spawn(proxy.clone().serve(listener, cancel.clone()));

    // ========== PHASE 3 : Session Connect ==========

    info!("🔌 Connecting renderer and Connect session...");
    let context = ConnectContext::start(settings, proxy, resolver, cancel.child_token()).await?;

    info!("✅ PMOConnect is ready!");
    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    info!("🛑 Shutdown requested");
    context.shutdown().await;
    cancel.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Audio proxy stopped with an error"),
        Err(e) => warn!(error = %e, "Audio proxy task failed"),
    }

    info!("👋 PMOConnect stopped");
    Ok(())
}
