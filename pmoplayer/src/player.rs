//! Machine d'état du lecteur.
//!
//! Le [`Player`] possède l'unique backend de la session. Les transitions
//! passent toutes par la table de [`crate::state`] ; chaque action du
//! backend est retentée puis comptée dans la politique d'échec.
//!
//! L'état interne est protégé par un `std::sync::Mutex` jamais tenu à
//! travers un `.await`.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use pmoconfig::PlayerConfig;
use pmocontrol::{
    Backend, BackendAction, BackendError, BackendStatus, PlaybackState, PositionSnapshot,
    QualityTier, Track, TransportState, now_ms,
};
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::errors::PlayerError;
use crate::state::{PlayerEvent, Transition};

/// Ce que le poller a observé sur le renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// La piste est arrivée à son terme.
    Ended,
    /// Le renderer a été mis en pause hors du contrôleur.
    ExternalPause,
}

/// Vue figée du lecteur, pour les rapports d'état.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub position: PositionSnapshot,
    pub duration_ms: Option<u64>,
    pub volume: u8,
    pub track_id: Option<String>,
    pub quality: Option<QualityTier>,
}

#[derive(Debug, Default)]
struct FailureCounter {
    action: Option<BackendAction>,
    count: u32,
}

impl FailureCounter {
    /// Compte un échec ; une autre action repart de un.
    fn record(&mut self, action: BackendAction) -> u32 {
        if self.action != Some(action) {
            self.action = Some(action);
            self.count = 0;
        }
        self.count += 1;
        self.count
    }

    fn reset(&mut self) {
        self.action = None;
        self.count = 0;
    }
}

#[derive(Debug)]
struct PlayerInner {
    state: PlaybackState,
    track: Option<Track>,
    /// Position de départ d'une piste chargée sans lecture.
    cued_position_ms: Option<u64>,
    position: PositionSnapshot,
    duration_ms: Option<u64>,
    volume: u8,
    started_at: Option<Instant>,
    end_pending: bool,
    failures: FailureCounter,
}

impl PlayerInner {
    /// Nouvelle position ; l'horodatage ne recule jamais.
    fn set_position(&mut self, timestamp_ms: u64, value_ms: u64) {
        let timestamp_ms = timestamp_ms.max(self.position.timestamp_ms);
        self.position = PositionSnapshot::new(timestamp_ms, value_ms);
    }

    fn live_position(&self) -> u64 {
        if self.state == PlaybackState::Playing {
            self.position.interpolate(now_ms())
        } else {
            self.position.value_ms
        }
    }
}

pub struct Player<B: Backend> {
    backend: Arc<B>,
    config: PlayerConfig,
    inner: Mutex<PlayerInner>,
    state_tx: watch::Sender<PlaybackState>,
    report: Arc<Notify>,
}

impl<B: Backend> Player<B> {
    pub fn new(backend: Arc<B>, config: PlayerConfig, report: Arc<Notify>) -> Self {
        let volume = if backend.fixed_volume() { 100 } else { 0 };
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        Self {
            backend,
            config,
            inner: Mutex::new(PlayerInner {
                state: PlaybackState::Idle,
                track: None,
                cued_position_ms: None,
                position: PositionSnapshot::captured_now(0),
                duration_ms: None,
                volume,
                started_at: None,
                end_pending: false,
                failures: FailureCounter::default(),
            }),
            state_tx,
            report,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn lock(&self) -> MutexGuard<'_, PlayerInner> {
        // Un panic pendant une mise à jour laisse un état cohérent champ par champ
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    /// Suivi de l'état, utilisé par le poller.
    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.lock().track.clone()
    }

    /// Position courante, interpolée en lecture.
    pub fn position_ms(&self) -> u64 {
        self.lock().live_position()
    }

    pub fn volume(&self) -> u8 {
        if self.backend.fixed_volume() {
            100
        } else {
            self.lock().volume
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let volume = self.volume();
        let inner = self.lock();
        PlayerSnapshot {
            state: inner.state,
            position: inner.position,
            duration_ms: inner.duration_ms,
            volume,
            track_id: inner.track.as_ref().map(|t| t.id.clone()),
            quality: inner.track.as_ref().map(|t| t.quality),
        }
    }

    /// Demande un rapport d'état hors cycle.
    pub fn request_report(&self) {
        self.report.notify_one();
    }

    fn transition(
        &self,
        inner: &mut PlayerInner,
        event: PlayerEvent,
    ) -> Result<PlaybackState, PlayerError> {
        let from = inner.state;
        match from.on(event) {
            Some(to) => {
                if from != to {
                    debug!(%from, %to, %event, "Playback state");
                }
                inner.state = to;
                self.state_tx.send_replace(to);
                Ok(to)
            }
            None => {
                warn!(%from, %event, "Invalid transition ignored");
                Err(PlayerError::InvalidTransition { from, event })
            }
        }
    }

    fn ensure(&self, event: PlayerEvent) -> Result<(), PlayerError> {
        let from = self.lock().state;
        match from.on(event) {
            Some(_) => Ok(()),
            None => {
                warn!(%from, %event, "Invalid transition ignored");
                Err(PlayerError::InvalidTransition { from, event })
            }
        }
    }

    /// Compte un échec et bascule en erreur au seuil.
    fn record_failure(&self, err: &BackendError) {
        let mut inner = self.lock();
        let count = inner.failures.record(err.action);
        warn!(action = %err.action, count, error = %err, "Backend action failed");

        if count >= self.config.failure_threshold && inner.state.is_active() {
            error!(action = %err.action, count, "❌ Renderer failure threshold reached");
            if self.transition(&mut inner, PlayerEvent::Failure).is_ok() {
                inner.started_at = None;
                drop(inner);
                self.report.notify_one();
            }
        }
    }

    fn record_success(&self) {
        self.lock().failures.reset();
    }

    /// Exécute une action du backend avec `retry_attempts` essais.
    async fn attempt<T, F, Fut>(&self, action: BackendAction, op: F) -> Result<T, PlayerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let attempts = self.config.retry_attempts.max(1);
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    self.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    self.record_failure(&err);
                    if attempt >= attempts || self.state() == PlaybackState::Error {
                        return Err(err.into());
                    }
                    debug!(%action, attempt, "Retrying backend action");
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Lit le volume du renderer.
    pub async fn sync_volume(&self) -> Result<u8, PlayerError> {
        if self.backend.fixed_volume() {
            return Ok(100);
        }
        let volume = self.backend.get_volume().await?.min(100);
        self.lock().volume = volume;
        Ok(volume)
    }

    /// Lance `track` à `position_ms`.
    pub async fn play(&self, track: Track, position_ms: u64) -> Result<(), PlayerError> {
        {
            let mut inner = self.lock();
            self.transition(&mut inner, PlayerEvent::Play)?;
            inner.failures.reset();
            inner.duration_ms = track.duration_ms;
            inner.track = Some(track.clone());
            inner.cued_position_ms = None;
            inner.end_pending = false;
            inner.started_at = None;
            inner.set_position(now_ms(), position_ms);
        }
        info!(track = %track.id, title = %track.title, position_ms, "▶️ Play");
        self.report.notify_one();

        let started = async {
            self.attempt(BackendAction::Load, || self.backend.load(&track))
                .await?;
            self.attempt(BackendAction::Play, || self.backend.play())
                .await
        }
        .await;

        if let Err(err) = started {
            let mut inner = self.lock();
            if inner.state == PlaybackState::Buffering {
                let _ = self.transition(&mut inner, PlayerEvent::Stop);
            }
            return Err(err);
        }

        {
            let mut inner = self.lock();
            self.transition(&mut inner, PlayerEvent::Started)?;
            inner.started_at = Some(Instant::now());
            inner.set_position(now_ms(), 0);
        }

        if position_ms > 0 {
            self.seek(position_ms).await?;
        }
        self.report.notify_one();
        Ok(())
    }

    /// Charge `track` sans la lire ; `resume` la démarrera.
    pub async fn cue(&self, track: Track, position_ms: u64) -> Result<(), PlayerError> {
        match self.state() {
            PlaybackState::Error => self.stop().await?,
            state if state.is_active() => self.stop().await?,
            _ => {}
        }

        self.attempt(BackendAction::Load, || self.backend.load(&track))
            .await?;

        info!(track = %track.id, position_ms, "Cued");
        let mut inner = self.lock();
        inner.duration_ms = track.duration_ms;
        inner.track = Some(track);
        inner.cued_position_ms = Some(position_ms);
        inner.set_position(now_ms(), position_ms);
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), PlayerError> {
        self.ensure(PlayerEvent::Pause)?;
        self.attempt(BackendAction::Pause, || self.backend.pause())
            .await?;

        let mut inner = self.lock();
        let position = inner.live_position();
        self.transition(&mut inner, PlayerEvent::Pause)?;
        inner.set_position(now_ms(), position);
        info!(position_ms = position, "⏸️ Pause");
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), PlayerError> {
        let (state, cued) = {
            let inner = self.lock();
            let cued = inner
                .track
                .clone()
                .map(|t| (t, inner.cued_position_ms.unwrap_or(0)));
            (inner.state, cued)
        };

        match state {
            PlaybackState::Paused => {
                self.attempt(BackendAction::Play, || self.backend.play())
                    .await?;
                let mut inner = self.lock();
                let position = inner.position.value_ms;
                self.transition(&mut inner, PlayerEvent::Resume)?;
                inner.set_position(now_ms(), position);
                info!(position_ms = position, "▶️ Resume");
                Ok(())
            }
            PlaybackState::Stopped | PlaybackState::Idle => match cued {
                Some((track, position_ms)) => self.play(track, position_ms).await,
                None => Err(PlayerError::NoTrack),
            },
            from => {
                warn!(%from, "Invalid transition ignored");
                Err(PlayerError::InvalidTransition {
                    from,
                    event: PlayerEvent::Resume,
                })
            }
        }
    }

    /// Arrête la lecture ; depuis l'état d'erreur, revient à IDLE.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        if self.state() == PlaybackState::Error {
            let mut inner = self.lock();
            self.transition(&mut inner, PlayerEvent::Reset)?;
            inner.failures.reset();
            info!("Recovered from renderer error");
            return Ok(());
        }

        self.ensure(PlayerEvent::Stop)?;
        self.attempt(BackendAction::Stop, || self.backend.stop())
            .await?;

        let mut inner = self.lock();
        self.transition(&mut inner, PlayerEvent::Stop)?;
        inner.started_at = None;
        inner.end_pending = false;
        inner.set_position(now_ms(), 0);
        info!("⏹️ Stop");
        Ok(())
    }

    /// Déplace la lecture, bornée à `duration - 1000` quand la durée est
    /// connue.
    pub async fn seek(&self, position_ms: u64) -> Result<(), PlayerError> {
        let (state, duration) = {
            let inner = self.lock();
            (inner.state, inner.duration_ms)
        };
        if !matches!(state, PlaybackState::Playing | PlaybackState::Paused) {
            return Err(PlayerError::NotSeekable(state));
        }

        let target = match duration {
            Some(duration) => position_ms.min(duration.saturating_sub(1_000)),
            None => position_ms,
        };
        self.attempt(BackendAction::Seek, || self.backend.seek(target))
            .await?;

        self.lock().set_position(now_ms(), target);
        debug!(position_ms = target, "Seek");
        self.report.notify_one();
        Ok(())
    }

    /// Reprend la piste courante au début (répétition d'une piste).
    pub async fn restart_track(&self) -> Result<(), PlayerError> {
        self.attempt(BackendAction::Seek, || self.backend.seek(0))
            .await?;
        self.attempt(BackendAction::Play, || self.backend.play())
            .await?;

        let mut inner = self.lock();
        inner.end_pending = false;
        inner.started_at = Some(Instant::now());
        inner.set_position(now_ms(), 0);
        info!("🔁 Track restarted");
        Ok(())
    }

    /// Fin naturelle de la piste courante.
    pub fn finish_track(&self) -> Result<(), PlayerError> {
        let mut inner = self.lock();
        inner.end_pending = false;
        self.transition(&mut inner, PlayerEvent::Ended)?;
        inner.started_at = None;
        let end = inner.duration_ms.unwrap_or(inner.position.value_ms);
        inner.set_position(now_ms(), end);
        Ok(())
    }

    pub async fn set_volume(&self, volume: u8) -> Result<u8, PlayerError> {
        if self.backend.fixed_volume() {
            debug!("Fixed volume, ignoring set");
            return Ok(100);
        }
        let volume = volume.min(100);
        self.attempt(BackendAction::SetVolume, || self.backend.set_volume(volume))
            .await?;
        self.lock().volume = volume;
        debug!(volume, "🔊 Volume");
        Ok(volume)
    }

    pub async fn adjust_volume(&self, delta: i32) -> Result<u8, PlayerError> {
        let target = (i32::from(self.volume()) + delta).clamp(0, 100);
        self.set_volume(target as u8).await
    }

    /// Relit la position sur le renderer, sans attendre plus de `wait`.
    /// En cas d'échec, la dernière position connue est conservée.
    pub async fn refresh_position(&self, wait: Duration) -> PositionSnapshot {
        let state = self.state();
        if matches!(state, PlaybackState::Playing | PlaybackState::Paused) {
            match tokio::time::timeout(wait, self.backend.get_position()).await {
                Ok(Ok(snapshot)) => {
                    let mut inner = self.lock();
                    if inner.state == state {
                        inner.set_position(snapshot.timestamp_ms, snapshot.value_ms);
                    }
                }
                Ok(Err(err)) => debug!(error = %err, "Position read failed"),
                Err(_) => debug!("Position read timed out"),
            }
        }
        self.lock().position
    }

    /// Interroge le renderer pendant la lecture.
    pub async fn poll(&self) -> Option<StatusOutcome> {
        if self.state() != PlaybackState::Playing {
            return None;
        }
        match self.backend.get_status().await {
            Ok(status) => {
                self.record_success();
                self.apply_status(status)
            }
            Err(err) => {
                self.record_failure(&err);
                None
            }
        }
    }

    /// Intègre un relevé du renderer.
    pub fn apply_status(&self, status: BackendStatus) -> Option<StatusOutcome> {
        let mut inner = self.lock();
        if inner.state != PlaybackState::Playing || inner.end_pending {
            return None;
        }
        if status.duration_ms.is_some() {
            inner.duration_ms = status.duration_ms;
        }

        match status.transport {
            TransportState::Playing => {
                inner.set_position(now_ms(), status.position_ms);
                None
            }
            TransportState::Loading => None,
            TransportState::Paused => {
                inner.set_position(now_ms(), status.position_ms);
                self.transition(&mut inner, PlayerEvent::Pause).ok()?;
                info!("Renderer paused outside the controller");
                drop(inner);
                self.report.notify_one();
                Some(StatusOutcome::ExternalPause)
            }
            TransportState::Stopped => {
                let grace = Duration::from_millis(self.config.end_grace_ms);
                let within_grace = inner
                    .started_at
                    .is_some_and(|started| started.elapsed() < grace);
                if within_grace {
                    debug!("Renderer stopped within start grace period");
                    return None;
                }
                inner.end_pending = true;
                info!(track = ?inner.track.as_ref().map(|t| &t.id), "Track ended");
                Some(StatusOutcome::Ended)
            }
        }
    }

    /// Fin de session : arrêt du renderer et retour à IDLE.
    pub async fn shutdown(&self) {
        if self.state().is_active() {
            if let Err(e) = self.backend.stop().await {
                debug!(error = %e, "Stop at shutdown failed");
            }
        }
        {
            let mut inner = self.lock();
            inner.state = PlaybackState::Idle;
            inner.track = None;
            inner.cued_position_ms = None;
            inner.started_at = None;
            inner.end_pending = false;
            inner.failures.reset();
        }
        self.state_tx.send_replace(PlaybackState::Idle);
        self.backend.disconnect().await;
    }
}
