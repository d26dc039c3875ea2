//! Aiguillage des commandes du contrôleur.
//!
//! Un seul consommateur traite les messages dans leur ordre d'arrivée,
//! chacun jusqu'à son terme. La fin de piste détectée par le poller passe
//! par le même canal.

use std::sync::{Arc, Mutex, MutexGuard};

use pmoconnect::{Command, ProtocolCodec, RepeatMode, SessionHandle, TrackRef};
use pmocontrol::{Backend, PlaybackState, Track};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::PlayerError;
use crate::player::Player;
use crate::quality::QualityPolicy;
use crate::queue::PlayQueue;
use crate::resolver::TrackResolver;

/// Message traité par le routeur.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterMessage {
    Command(Command),
    /// La piste courante est terminée sur le renderer.
    TrackEnded,
}

impl From<Command> for RouterMessage {
    fn from(command: Command) -> Self {
        RouterMessage::Command(command)
    }
}

/// Voie de sortie vers le contrôleur.
pub trait Outbound: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Envoi au mieux, `false` si la trame est abandonnée.
    fn send(&self, frame: Vec<u8>) -> bool;
}

impl Outbound for SessionHandle {
    fn is_connected(&self) -> bool {
        SessionHandle::is_connected(self)
    }

    fn send(&self, frame: Vec<u8>) -> bool {
        SessionHandle::send(self, frame)
    }
}

pub type SharedQueue = Arc<Mutex<PlayQueue>>;

pub(crate) fn lock_queue(queue: &SharedQueue) -> MutexGuard<'_, PlayQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct CommandRouter<B: Backend, O: Outbound> {
    player: Arc<Player<B>>,
    queue: SharedQueue,
    resolver: Arc<dyn TrackResolver>,
    quality: Arc<QualityPolicy>,
    outbound: Arc<O>,
    codec: Arc<ProtocolCodec>,
    previous_restart_threshold_ms: u64,
    autoplay: bool,
}

impl<B: Backend, O: Outbound> CommandRouter<B, O> {
    pub fn new(
        player: Arc<Player<B>>,
        queue: SharedQueue,
        resolver: Arc<dyn TrackResolver>,
        quality: Arc<QualityPolicy>,
        outbound: Arc<O>,
        codec: Arc<ProtocolCodec>,
        previous_restart_threshold_ms: u64,
    ) -> Self {
        Self {
            player,
            queue,
            resolver,
            quality,
            outbound,
            codec,
            previous_restart_threshold_ms,
            autoplay: false,
        }
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    /// Boucle du routeur, jusqu'à l'annulation ou la fermeture du canal.
    pub async fn run(mut self, mut messages: mpsc::Receiver<RouterMessage>, cancel: CancellationToken) {
        info!("Command router started");
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.dispatch(message).await;
        }
        info!("Command router stopped");
    }

    /// Traite un message. Les erreurs sont journalisées, jamais propagées.
    pub async fn dispatch(&mut self, message: RouterMessage) {
        debug!(?message, "Dispatch");
        let result = match message {
            RouterMessage::Command(command) => self.handle_command(command).await,
            RouterMessage::TrackEnded => self.handle_track_end().await,
        };
        if let Err(e) = result {
            match e {
                PlayerError::InvalidTransition { .. } => debug!(error = %e, "Command ignored"),
                e => warn!(error = %e, "Command failed"),
            }
        }
        self.player.request_report();
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), PlayerError> {
        match command {
            Command::Play { track, position_ms } => {
                lock_queue(&self.queue).jump_to_item(track.queue_item_id);
                self.play_ref(track, position_ms).await
            }
            Command::Cue { track, position_ms } => {
                lock_queue(&self.queue).jump_to_item(track.queue_item_id);
                let resolved = self.resolve(&track).await?;
                self.player.cue(resolved, position_ms).await
            }
            Command::Pause => self.player.pause().await,
            Command::Resume => self.player.resume().await,
            Command::Stop => self.player.stop().await,
            Command::Seek { position_ms } => self.player.seek(position_ms).await,
            Command::Next => {
                let next = lock_queue(&self.queue).next().cloned();
                self.play_or_stop(next).await
            }
            Command::Previous => {
                let restart = matches!(
                    self.player.state(),
                    PlaybackState::Playing | PlaybackState::Paused
                ) && self.player.position_ms() > self.previous_restart_threshold_ms;
                if restart {
                    debug!("Previous restarts the current track");
                    return self.player.seek(0).await;
                }
                let previous = lock_queue(&self.queue).previous().cloned();
                self.play_or_stop(previous).await
            }
            Command::SetVolume { volume } => self.player.set_volume(volume).await.map(|_| ()),
            Command::AdjustVolume { delta } => self.player.adjust_volume(delta).await.map(|_| ()),
            Command::LoadQueue {
                tracks,
                start_index,
                version,
                shuffle,
            } => {
                let mut queue = lock_queue(&self.queue);
                if queue.is_same_load(&tracks, version) {
                    debug!(?version, "Queue already loaded");
                } else {
                    queue.load_queue(tracks, start_index, version);
                    queue.set_shuffle(shuffle);
                }
                Ok(())
            }
            Command::SetNextTrack(track) => {
                lock_queue(&self.queue).set_next_hint(Some(track));
                Ok(())
            }
            Command::SetRepeatMode(mode) => {
                lock_queue(&self.queue).set_repeat_mode(mode);
                Ok(())
            }
            Command::SetShuffle(enabled) => {
                lock_queue(&self.queue).set_shuffle(enabled);
                Ok(())
            }
            Command::SetActive(active) => {
                info!(active, "Renderer activation");
                if !active && self.player.state().is_active() {
                    self.player.stop().await?;
                }
                Ok(())
            }
            Command::SetMaxAudioQuality(tier) => {
                let effective = self.quality.set_controller_cap(tier);
                self.outbound
                    .send(self.codec.encode_max_audio_quality_changed(effective));
                Ok(())
            }
            Command::SetAutoplay(enabled) => {
                info!(enabled, "Autoplay");
                self.autoplay = enabled;
                Ok(())
            }
        }
    }

    async fn handle_track_end(&mut self) -> Result<(), PlayerError> {
        if lock_queue(&self.queue).repeat_mode() == RepeatMode::Track {
            return self.player.restart_track().await;
        }

        self.player.finish_track()?;
        let next = {
            let mut queue = lock_queue(&self.queue);
            match queue.take_next_hint() {
                Some(hint) => {
                    queue.jump_to_item(hint.queue_item_id);
                    Some(hint)
                }
                None => queue.next().cloned(),
            }
        };

        match next {
            Some(track) => self.play_ref(track, 0).await,
            None => {
                info!("End of queue");
                Ok(())
            }
        }
    }

    async fn play_or_stop(&self, track: Option<TrackRef>) -> Result<(), PlayerError> {
        match track {
            Some(track) => self.play_ref(track, 0).await,
            None if self.player.state().is_active() => {
                info!("End of queue");
                self.player.stop().await
            }
            None => Ok(()),
        }
    }

    async fn resolve(&self, track: &TrackRef) -> Result<Track, PlayerError> {
        let track_id = track.track_id.to_string();
        let quality = self.quality.streaming_quality();
        self.resolver
            .resolve(&track_id, quality)
            .await
            .map_err(|e| PlayerError::Resolve {
                track_id,
                reason: format!("{e:#}"),
            })
    }

    async fn play_ref(&self, track: TrackRef, position_ms: u64) -> Result<(), PlayerError> {
        let resolved = self.resolve(&track).await?;
        let quality = resolved.quality;
        self.player.play(resolved, position_ms).await?;
        self.outbound
            .send(self.codec.encode_file_audio_quality_changed(quality));
        Ok(())
    }
}
