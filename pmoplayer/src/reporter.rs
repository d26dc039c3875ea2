//! Rapports d'état vers le contrôleur.
//!
//! Un rapport part à chaque tick et à chaque demande hors cycle. Le volume
//! n'est renvoyé que lorsqu'il a changé, ou après une reconnexion.

use std::sync::Arc;
use std::time::Duration;

use pmoconfig::PlayerConfig;
use pmoconnect::{ProtocolCodec, StateReport};
use pmocontrol::Backend;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::player::Player;
use crate::quality::QualityPolicy;
use crate::router::{Outbound, SharedQueue, lock_queue};

pub struct StateReporter<B: Backend, O: Outbound> {
    player: Arc<Player<B>>,
    queue: SharedQueue,
    quality: Arc<QualityPolicy>,
    codec: Arc<ProtocolCodec>,
    outbound: Arc<O>,
    report: Arc<Notify>,
    device_name: String,
    interval: Duration,
    position_timeout: Duration,
    last_volume: Option<u8>,
}

impl<B: Backend, O: Outbound> StateReporter<B, O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        player: Arc<Player<B>>,
        queue: SharedQueue,
        quality: Arc<QualityPolicy>,
        codec: Arc<ProtocolCodec>,
        outbound: Arc<O>,
        report: Arc<Notify>,
        device_name: String,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            player,
            queue,
            quality,
            codec,
            outbound,
            report,
            device_name,
            interval: Duration::from_millis(config.report_interval_ms.max(1)),
            position_timeout: Duration::from_millis(config.position_read_timeout_ms),
            last_volume: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.report.notified() => trace!("Immediate report requested"),
            }
            self.report_once().await;
        }
        debug!("State reporter stopped");
    }

    /// Construit le rapport courant.
    pub async fn build_report(&self) -> StateReport {
        let position = self.player.refresh_position(self.position_timeout).await;
        let snapshot = self.player.snapshot();
        let queue = lock_queue(&self.queue);

        StateReport {
            playback_state: snapshot.state,
            position,
            duration_ms: snapshot.duration_ms,
            current_queue_item_id: queue.current().map(|t| t.queue_item_id),
            next_queue_item_id: queue.peek_next().map(|t| t.queue_item_id),
            queue_version: queue.version(),
            volume: snapshot.volume,
            device_name: self.device_name.clone(),
            max_quality: self.quality.max_quality(),
        }
    }

    /// Envoie un rapport ; retourne `false` si le lien est coupé.
    pub async fn report_once(&mut self) -> bool {
        if !self.outbound.is_connected() {
            // Le volume sera renvoyé au prochain lien
            self.last_volume = None;
            return false;
        }

        let report = self.build_report().await;
        trace!(state = %report.playback_state, position_ms = report.position.value_ms, "Report");
        if !self.outbound.send(self.codec.encode_state_update(&report)) {
            return false;
        }

        if self.last_volume != Some(report.volume)
            && self.outbound.send(self.codec.encode_volume_changed(report.volume))
        {
            self.last_volume = Some(report.volume);
        }
        true
    }
}
