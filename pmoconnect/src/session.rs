//! Session Connect persistante.
//!
//! Une tâche unique porte le lien websocket : réception, émission et
//! keepalive dans la même boucle `tokio::select!`. Sur perte du lien, la
//! tâche se reconnecte avec un backoff exponentiel ; l'état du lecteur n'est
//! pas touché.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pmoconfig::ConnectConfig;
use pmocontrol::QualityTier;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest, http::HeaderValue, protocol::Message as WsMessage,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Command, DeviceIdentity, Inbound, ProtocolCodec, session_uuid_bytes};
use crate::error::SessionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 16;

/// Etat du lien websocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications de la session vers le contexte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Poignée de main terminée (première connexion ou reconnexion).
    Connected,
    Disconnected { reason: String },
    ServerError { code: Option<i32>, message: String },
}

/// Paramètres de connexion, en durées.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint: String,
    pub token: String,
    pub session_uuid: Option<[u8; 16]>,
    pub origin: String,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl SessionConfig {
    pub fn from_config(config: &ConnectConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            session_uuid: session_uuid_bytes(&config.session_id),
            origin: config.origin.clone(),
            connect_timeout: config.connect_timeout(),
            keepalive_interval: config.keepalive_interval(),
            keepalive_timeout: config.keepalive_timeout(),
            backoff_initial: Duration::from_millis(config.backoff_initial_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

/// Backoff exponentiel (×2, plafonné) avec un jitter aléatoire d'au plus
/// 10 % ajouté à chaque délai.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial.min(max),
        }
    }

    /// Délai de base de la prochaine tentative, sans jitter.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);

        let spread = (base.as_millis() / 10) as u64;
        let jitter = if spread == 0 {
            0
        } else {
            rand::rng().random_range(0..=spread)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Poignée partagée sur la session.
#[derive(Clone)]
pub struct SessionHandle {
    outbound: mpsc::Sender<Vec<u8>>,
    link: watch::Receiver<LinkState>,
    events: broadcast::Sender<SessionEvent>,
    codec: Arc<ProtocolCodec>,
}

impl SessionHandle {
    /// Envoi au mieux : sans lien actif, ou file pleine, la trame est
    /// abandonnée. Retourne `true` si elle a été mise en file.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        if !self.is_connected() {
            trace!("TX: dropped, link down");
            return false;
        }
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.link.borrow() == LinkState::Connected
    }

    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn codec(&self) -> &Arc<ProtocolCodec> {
        &self.codec
    }
}

/// Tâche de session. Les commandes décodées sont transmises dans l'ordre
/// d'arrivée sur `commands`.
pub struct ConnectSession<T> {
    config: SessionConfig,
    device: DeviceIdentity,
    codec: Arc<ProtocolCodec>,
    max_quality: watch::Receiver<QualityTier>,
    commands: mpsc::Sender<T>,
    outbound: mpsc::Receiver<Vec<u8>>,
    link: watch::Sender<LinkState>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl<T> ConnectSession<T>
where
    T: From<Command> + Send + 'static,
{
    /// Lance la tâche de session et retourne sa poignée.
    pub fn spawn(
        config: SessionConfig,
        device: DeviceIdentity,
        codec: Arc<ProtocolCodec>,
        max_quality: watch::Receiver<QualityTier>,
        commands: mpsc::Sender<T>,
        cancel: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (link_tx, link_rx) = watch::channel(LinkState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SessionHandle {
            outbound: outbound_tx,
            link: link_rx,
            events: events_tx.clone(),
            codec: codec.clone(),
        };

        let session = ConnectSession {
            config,
            device,
            codec,
            max_quality,
            commands,
            outbound: outbound_rx,
            link: link_tx,
            events: events_tx,
            cancel,
        };

        let task = tokio::spawn(session.run());
        (handle, task)
    }

    async fn run(mut self) {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);

        while !self.cancel.is_cancelled() {
            self.link.send_replace(LinkState::Connecting);
            // Les trames d'un lien mort ne sont jamais rejouées
            while self.outbound.try_recv().is_ok() {}

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connect() => result,
            };

            match attempt {
                Ok(ws) => {
                    self.link.send_replace(LinkState::Connected);
                    let _ = self.events.send(SessionEvent::Connected);
                    info!(endpoint = %self.config.endpoint, "Connect session established");

                    let outcome = self.serve(ws, &mut backoff).await;
                    self.link.send_replace(LinkState::Disconnected);
                    match outcome {
                        Ok(()) => break,
                        Err(e) => {
                            warn!(error = %e, "Connect link lost");
                            let _ = self.events.send(SessionEvent::Disconnected {
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => {
                    self.link.send_replace(LinkState::Disconnected);
                    warn!(error = %e, "Connect handshake failed");
                }
            }

            let delay = backoff.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting to Connect server");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.link.send_replace(LinkState::Disconnected);
        debug!("Connect session stopped");
    }

    /// Ouverture du websocket puis authentification, abonnement et jonction,
    /// le tout borné par `connect_timeout`.
    async fn connect(&self) -> Result<WsStream, SessionError> {
        let limit = self.config.connect_timeout;
        timeout(limit, self.open_and_join())
            .await
            .map_err(|_| SessionError::Timeout(limit.as_millis() as u64))?
    }

    async fn open_and_join(&self) -> Result<WsStream, SessionError> {
        let mut request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::InvalidEndpoint(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static("qws"));
        if !self.config.origin.is_empty() {
            match HeaderValue::from_str(&self.config.origin) {
                Ok(origin) => {
                    headers.insert("Origin", origin);
                }
                Err(_) => warn!(origin = %self.config.origin, "Ignoring invalid origin header"),
            }
        }

        debug!(endpoint = %self.config.endpoint, "Connecting to websocket");
        let (mut ws, response) = connect_async(request).await?;
        trace!(status = ?response.status(), "Websocket connected");

        ws.send(WsMessage::Binary(self.codec.encode_authenticate(&self.config.token)))
            .await?;
        debug!("TX: Authenticate");

        ws.send(WsMessage::Binary(
            self.codec.encode_subscribe(self.config.session_uuid.as_ref()),
        ))
        .await?;
        debug!("TX: Subscribe");

        let max_quality = *self.max_quality.borrow();
        ws.send(WsMessage::Binary(self.codec.encode_join_session(
            &self.device,
            self.config.session_uuid.as_ref(),
            max_quality,
            None,
        )))
        .await?;
        debug!(name = %self.device.name, %max_quality, "TX: JoinSession");

        Ok(ws)
    }

    /// Boucle d'un lien établi. `Ok(())` signifie un arrêt demandé.
    ///
    /// Le backoff n'est remis à zéro qu'une fois le lien éprouvé : premières
    /// commandes reçues, ou lien resté ouvert pendant `keepalive_interval`.
    async fn serve(&mut self, ws: WsStream, backoff: &mut Backoff) -> Result<(), SessionError> {
        let (mut sink, mut stream) = ws.split();
        let interval = self.config.keepalive_interval;
        let mut next_ping = Instant::now() + interval;
        let mut last_rx = Instant::now();
        let mut healthy_at = Instant::now() + interval;
        let mut proven = false;

        loop {
            let deadline = last_rx + self.config.keepalive_timeout;

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
                incoming = stream.next() => {
                    let message = match incoming {
                        None => return Err(SessionError::ConnectionLost),
                        Some(result) => result?,
                    };
                    last_rx = Instant::now();

                    match message {
                        WsMessage::Binary(data) => match self.handle_frame(&data).await? {
                            ControlFlow::Break(()) => {
                                let _ = sink.send(WsMessage::Close(None)).await;
                                return Ok(());
                            }
                            ControlFlow::Continue(true) if !proven => healthy_at = Instant::now(),
                            ControlFlow::Continue(_) => {}
                        },
                        WsMessage::Ping(payload) => {
                            trace!("RX: Ping");
                            sink.send(WsMessage::Pong(payload)).await?;
                        }
                        WsMessage::Pong(_) => trace!("RX: Pong"),
                        WsMessage::Close(_) => return Err(SessionError::ConnectionLost),
                        WsMessage::Text(text) => debug!(text = %text, "RX: unexpected text message"),
                        WsMessage::Frame(_) => {}
                    }
                }
                frame = self.outbound.recv() => match frame {
                    Some(frame) => {
                        trace!(len = frame.len(), "TX: frame");
                        sink.send(WsMessage::Binary(frame)).await?;
                    }
                    None => return Ok(()),
                },
                _ = sleep_until(next_ping) => {
                    next_ping = Instant::now() + interval;
                    sink.send(WsMessage::Ping(Vec::new())).await?;
                    trace!("TX: Ping");
                }
                _ = sleep_until(healthy_at), if !proven => {
                    proven = true;
                    backoff.reset();
                    debug!("Connect link healthy, backoff reset");
                }
                _ = sleep_until(deadline) => {
                    return Err(SessionError::KeepaliveExpired(
                        self.config.keepalive_timeout.as_millis() as u64,
                    ));
                }
            }
        }
    }

    /// `Continue(true)` quand la trame portait au moins une commande.
    async fn handle_frame(&self, data: &[u8]) -> Result<ControlFlow<(), bool>, SessionError> {
        match codec::decode_inbound(data) {
            Ok(Inbound::Commands(commands)) => {
                let delivered = !commands.is_empty();
                for command in commands {
                    debug!(?command, "RX: command");
                    if self.commands.send(T::from(command)).await.is_err() {
                        debug!("Command consumer gone, closing session");
                        return Ok(ControlFlow::Break(()));
                    }
                }
                return Ok(ControlFlow::Continue(delivered));
            }
            Ok(Inbound::ServerError { code, message }) => {
                warn!(?code, message = %message, "RX: error from server");
                let _ = self.events.send(SessionEvent::ServerError { code, message });
            }
            Ok(Inbound::Disconnect) => return Err(SessionError::Disconnected),
            Ok(Inbound::Ignored(frame_type)) => trace!(?frame_type, "RX: ignored frame"),
            Err(e) if e.is_unknown_message() => debug!(error = %e, "RX: ignored message"),
            Err(e) => warn!(error = %e, len = data.len(), "RX: dropping undecodable frame"),
        }
        Ok(ControlFlow::Continue(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let expected = [1u64, 2, 4, 8, 16, 32, 60, 60];
        for base in expected {
            let delay = backoff.next_delay();
            let base = Duration::from_secs(base);
            assert!(delay >= base, "{delay:?} < {base:?}");
            assert!(delay <= base + base / 10, "{delay:?} too much jitter");
        }
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_secs(4));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(1));
    }

    #[test]
    fn test_session_config_from_settings() {
        let config = ConnectConfig {
            endpoint: "wss://example.test/ws".to_string(),
            session_id: "4b1d3d6e-0000-1000-8000-00e04c680001".to_string(),
            ..ConnectConfig::default()
        };
        let session = SessionConfig::from_config(&config);
        assert!(session.session_uuid.is_some());
        assert_eq!(session.backoff_initial, Duration::from_secs(1));
        assert_eq!(session.backoff_max, Duration::from_secs(60));
        assert_eq!(session.keepalive_timeout, Duration::from_secs(30));
    }
}
