//! Contexte d'une session Connect.
//!
//! Le [`ConnectContext`] possède la session, le lecteur, la file, le backend
//! et le cache des capacités. Il lance les tâches (session, routeur, poller,
//! rapports) et les arrête ensemble.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use pmoconfig::Settings;
use pmoconnect::{ConnectSession, DeviceIdentity, ProtocolCodec, SessionConfig, SessionEvent, SessionHandle};
use pmocontrol::{Backend, CapabilityCache, DeviceCapability, QualityTier, RendererBackend};
use pmoserver::AudioProxy;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::player::Player;
use crate::poller::PositionPoller;
use crate::quality::QualityPolicy;
use crate::queue::PlayQueue;
use crate::reporter::StateReporter;
use crate::resolver::TrackResolver;
use crate::router::{CommandRouter, RouterMessage, SharedQueue};

const ROUTER_CAPACITY: usize = 64;

pub struct ConnectContext<B: Backend> {
    session: SessionHandle,
    player: Arc<Player<B>>,
    queue: SharedQueue,
    quality: Arc<QualityPolicy>,
    capabilities: CapabilityCache,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ConnectContext<RendererBackend> {
    /// Connecte le renderer configuré puis démarre la session.
    pub async fn start(
        settings: &Settings,
        proxy: AudioProxy,
        resolver: Arc<dyn TrackResolver>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let capabilities = CapabilityCache::default();
        let backend = RendererBackend::from_config(&settings.backend, proxy, &capabilities).await?;
        info!(renderer = backend.name(), "🔈 Renderer connected");
        Self::start_with_backend(settings, Arc::new(backend), capabilities, resolver, cancel).await
    }
}

impl<B: Backend> ConnectContext<B> {
    pub async fn start_with_backend(
        settings: &Settings,
        backend: Arc<B>,
        capabilities: CapabilityCache,
        resolver: Arc<dyn TrackResolver>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let capability = match backend.get_capabilities().await {
            Ok(capability) => capability,
            Err(e) => {
                warn!(error = %e, "Capability detection failed, assuming CD quality");
                DeviceCapability::default()
            }
        };
        let configured = settings
            .qobuz
            .quality_override()
            .and_then(QualityTier::from_code);
        let quality = Arc::new(QualityPolicy::new(&capability, configured));
        info!(max_quality = %quality.max_quality(), "Audio quality negotiated");

        let report = Arc::new(Notify::new());
        let player = Arc::new(Player::new(
            backend.clone(),
            settings.player.clone(),
            report.clone(),
        ));
        if let Err(e) = player.sync_volume().await {
            warn!(error = %e, "Cannot read renderer volume");
        }

        let queue: SharedQueue = Arc::new(Mutex::new(PlayQueue::new()));
        let device = DeviceIdentity::from_config(&settings.device);
        let codec = Arc::new(ProtocolCodec::new(device.uuid));
        let (messages_tx, messages_rx) = mpsc::channel::<RouterMessage>(ROUTER_CAPACITY);

        let (session, session_task) = ConnectSession::spawn(
            SessionConfig::from_config(&settings.connect),
            device,
            codec.clone(),
            quality.subscribe(),
            messages_tx.clone(),
            cancel.clone(),
        );
        let outbound = Arc::new(session.clone());

        let router = CommandRouter::new(
            player.clone(),
            queue.clone(),
            resolver,
            quality.clone(),
            outbound.clone(),
            codec.clone(),
            settings.player.previous_restart_threshold_ms,
        );
        let poller = PositionPoller::new(
            player.clone(),
            settings.backend.dlna.poll_interval(),
            messages_tx,
        );
        let reporter = StateReporter::new(
            player.clone(),
            queue.clone(),
            quality.clone(),
            codec,
            outbound,
            report.clone(),
            settings.device.name.clone(),
            &settings.player,
        );

        let tasks = vec![
            session_task,
            tokio::spawn(router.run(messages_rx, cancel.clone())),
            tokio::spawn(poller.run(cancel.clone())),
            tokio::spawn(reporter.run(cancel.clone())),
            tokio::spawn(watch_session(session.subscribe(), report, cancel.clone())),
        ];

        info!(device = %settings.device.name, "🚀 Connect context started");
        Ok(Self {
            session,
            player,
            queue,
            quality,
            capabilities,
            cancel,
            tasks,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn player(&self) -> &Arc<Player<B>> {
        &self.player
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }

    pub fn quality(&self) -> &Arc<QualityPolicy> {
        &self.quality
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    /// Arrête toutes les tâches, puis le renderer.
    pub async fn shutdown(self) {
        info!("Stopping Connect context");
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Context task ended abnormally");
            }
        }
        self.player.shutdown().await;
        crate::router::lock_queue(&self.queue).clear();
        info!("✅ Connect context stopped");
    }
}

/// Suit les événements de la session ; un nouveau lien reçoit aussitôt
/// l'état courant.
async fn watch_session(
    mut events: broadcast::Receiver<SessionEvent>,
    report: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };
        match event {
            Ok(SessionEvent::Connected) => report.notify_one(),
            Ok(SessionEvent::Disconnected { reason }) => info!(%reason, "Connect link down"),
            Ok(SessionEvent::ServerError { code, message }) => {
                warn!(?code, %message, "Connect server error")
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Session events lagged")
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
