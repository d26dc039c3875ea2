//! Relevé périodique du renderer, actif seulement en lecture.

use std::sync::Arc;
use std::time::Duration;

use pmocontrol::{Backend, PlaybackState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::player::{Player, StatusOutcome};
use crate::router::RouterMessage;

pub struct PositionPoller<B: Backend> {
    player: Arc<Player<B>>,
    interval: Duration,
    events: mpsc::Sender<RouterMessage>,
}

impl<B: Backend> PositionPoller<B> {
    pub fn new(player: Arc<Player<B>>, interval: Duration, events: mpsc::Sender<RouterMessage>) -> Self {
        Self {
            player,
            interval,
            events,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut state = self.player.subscribe_state();
        loop {
            let playing = tokio::select! {
                _ = cancel.cancelled() => return,
                playing = state.wait_for(|s| *s == PlaybackState::Playing) => playing.is_ok(),
            };
            if !playing {
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Some(StatusOutcome::Ended) = self.player.poll().await {
                debug!("Forwarding track end to the router");
                if self.events.send(RouterMessage::TrackEnded).await.is_err() {
                    return;
                }
            }
        }
    }
}
