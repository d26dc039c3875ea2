//! Machine d'état du lecteur contre un renderer simulé.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Call, MockBackend, MockOutbound, fast_config, track};
use pmoconfig::PlayerConfig;
use pmoconnect::proto::message_type;
use pmoconnect::{BUFFER_STATE_ERROR, ProtocolCodec, QueueVersion, decode_batch};
use pmocontrol::{
    BackendAction, BackendStatus, DeviceCapability, PlaybackState, QualityTier, TransportState,
};
use pmoplayer::{PlayQueue, Player, PlayerError, QualityPolicy, StateReporter, StatusOutcome};
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn player(backend: MockBackend, config: PlayerConfig) -> (Arc<Player<MockBackend>>, Arc<Notify>) {
    let report = Arc::new(Notify::new());
    let player = Arc::new(Player::new(Arc::new(backend), config, report.clone()));
    (player, report)
}

#[tokio::test]
async fn test_play_passes_through_buffering() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let (player, _) = player(MockBackend::gated(gate.clone()), fast_config());
    let mut state = player.subscribe_state();

    let task = tokio::spawn({
        let player = player.clone();
        async move { player.play(track("1", QualityTier::Cd), 0).await }
    });

    timeout(WAIT, state.wait_for(|s| *s == PlaybackState::Buffering)).await??;
    assert_eq!(player.state(), PlaybackState::Buffering);
    assert!(player.backend().calls().is_empty());

    gate.notify_one();
    timeout(WAIT, task).await???;
    assert_eq!(player.state(), PlaybackState::Playing);
    assert_eq!(
        player.backend().calls(),
        vec![Call::Load("1".to_string()), Call::Play]
    );
    Ok(())
}

#[tokio::test]
async fn test_play_with_offset_seeks_once_playing() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::new(), fast_config());
    player.play(track("1", QualityTier::Cd), 42_000).await?;

    assert_eq!(
        player.backend().calls(),
        vec![Call::Load("1".to_string()), Call::Play, Call::Seek(42_000)]
    );
    assert!(player.position_ms() >= 42_000);
    Ok(())
}

#[tokio::test]
async fn test_three_timeouts_reach_error_with_immediate_report() -> anyhow::Result<()> {
    let backend = MockBackend::new();
    backend.fail(BackendAction::Load, u32::MAX);
    let (player, report) = player(backend, fast_config());

    let (outbound, mut frames) = MockOutbound::new();
    let quality = Arc::new(QualityPolicy::new(&DeviceCapability::default(), None));
    let config = PlayerConfig {
        report_interval_ms: 60_000,
        ..fast_config()
    };
    let reporter = StateReporter::new(
        player.clone(),
        Arc::new(std::sync::Mutex::new(PlayQueue::new())),
        quality,
        Arc::new(ProtocolCodec::new([1; 16])),
        outbound,
        report,
        "Salon".to_string(),
        &config,
    );
    let cancel = CancellationToken::new();
    let reporter_task = tokio::spawn(reporter.run(cancel.clone()));

    let result = player.play(track("1", QualityTier::Cd), 0).await;
    assert!(matches!(result, Err(PlayerError::Backend(ref e)) if e.is_timeout()));
    assert_eq!(player.state(), PlaybackState::Error);
    assert!(player.backend().calls().is_empty());

    // Le rapport d'erreur part sans attendre le tick suivant
    let reported_error = timeout(WAIT, async {
        while let Some(frame) = frames.recv().await {
            let batch = decode_batch(&frame).ok()?;
            let buffer_state = batch
                .messages
                .first()
                .filter(|m| m.message_type == Some(message_type::RNDR_SRVR_STATE_UPDATED))
                .and_then(|m| m.rndr_srvr_state_updated.as_ref())
                .and_then(|s| s.state.as_ref())
                .and_then(|s| s.buffer_state);
            if buffer_state == Some(BUFFER_STATE_ERROR) {
                return Some(());
            }
        }
        None
    })
    .await?;
    assert_eq!(reported_error, Some(()));

    cancel.cancel();
    reporter_task.await?;
    Ok(())
}

#[tokio::test]
async fn test_success_after_retry_keeps_playing() -> anyhow::Result<()> {
    let backend = MockBackend::new();
    backend.fail(BackendAction::Play, 2);
    let (player, _) = player(backend, fast_config());

    player.play(track("1", QualityTier::Cd), 0).await?;
    assert_eq!(player.state(), PlaybackState::Playing);
    Ok(())
}

#[tokio::test]
async fn test_failed_play_below_threshold_stops() -> anyhow::Result<()> {
    let backend = MockBackend::new();
    backend.fail(BackendAction::Play, u32::MAX);
    let config = PlayerConfig {
        retry_attempts: 2,
        failure_threshold: 5,
        ..fast_config()
    };
    let (player, _) = player(backend, config);

    assert!(player.play(track("1", QualityTier::Cd), 0).await.is_err());
    assert_eq!(player.state(), PlaybackState::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_stop_from_error_resets_to_idle() -> anyhow::Result<()> {
    let backend = MockBackend::new();
    backend.fail(BackendAction::Load, u32::MAX);
    let (player, _) = player(backend, fast_config());

    let _ = player.play(track("1", QualityTier::Cd), 0).await;
    assert_eq!(player.state(), PlaybackState::Error);

    player.stop().await?;
    assert_eq!(player.state(), PlaybackState::Idle);
    assert!(player.backend().calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pause_resume_and_stop() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::new(), fast_config());
    player.play(track("1", QualityTier::Cd), 0).await?;

    player.pause().await?;
    assert_eq!(player.state(), PlaybackState::Paused);
    assert!(matches!(
        player.pause().await,
        Err(PlayerError::InvalidTransition { .. })
    ));

    player.resume().await?;
    assert_eq!(player.state(), PlaybackState::Playing);

    player.stop().await?;
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.position_ms(), 0);
    assert_eq!(
        player.backend().calls(),
        vec![
            Call::Load("1".to_string()),
            Call::Play,
            Call::Pause,
            Call::Play,
            Call::Stop
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_cue_then_resume_starts_cued_track() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::new(), fast_config());

    player.cue(track("7", QualityTier::Cd), 10_000).await?;
    assert_eq!(player.state(), PlaybackState::Idle);
    assert_eq!(player.backend().calls(), vec![Call::Load("7".to_string())]);

    player.resume().await?;
    assert_eq!(player.state(), PlaybackState::Playing);
    let calls = player.backend().calls();
    assert_eq!(
        &calls[1..],
        &[Call::Load("7".to_string()), Call::Play, Call::Seek(10_000)]
    );
    Ok(())
}

#[tokio::test]
async fn test_seek_is_clamped_and_requires_playback() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::new(), fast_config());
    assert!(matches!(
        player.seek(1_000).await,
        Err(PlayerError::NotSeekable(PlaybackState::Idle))
    ));

    player.play(track("1", QualityTier::Cd), 0).await?;
    player.seek(500_000).await?;
    assert_eq!(player.backend().calls().last(), Some(&Call::Seek(179_000)));
    Ok(())
}

#[tokio::test]
async fn test_volume_is_clamped() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::new(), fast_config());
    assert_eq!(player.set_volume(150).await?, 100);
    assert_eq!(player.adjust_volume(-30).await?, 70);
    assert_eq!(player.adjust_volume(-200).await?, 0);
    assert_eq!(player.volume(), 0);
    Ok(())
}

#[tokio::test]
async fn test_failing_set_volume_counts_toward_error() -> anyhow::Result<()> {
    let backend = MockBackend::new();
    backend.fail(BackendAction::SetVolume, u32::MAX);
    let (player, _) = player(backend, fast_config());
    player.play(track("1", QualityTier::Cd), 0).await?;
    let before = player.volume();

    let result = player.set_volume(30).await;
    assert!(matches!(
        result,
        Err(PlayerError::Backend(ref e)) if e.action == BackendAction::SetVolume
    ));
    assert_eq!(player.state(), PlaybackState::Error);
    assert_eq!(player.volume(), before);
    assert!(
        !player
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::SetVolume(_)))
    );
    Ok(())
}

#[tokio::test]
async fn test_fixed_volume_never_reaches_backend() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::fixed(), fast_config());
    assert_eq!(player.set_volume(20).await?, 100);
    assert_eq!(player.volume(), 100);
    assert!(player.backend().calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_renderer_stop_ends_track_once() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::new(), fast_config());
    player.play(track("1", QualityTier::Cd), 0).await?;

    let stopped = BackendStatus {
        transport: TransportState::Stopped,
        position_ms: 0,
        duration_ms: Some(180_000),
    };
    assert_eq!(player.apply_status(stopped), Some(StatusOutcome::Ended));
    assert_eq!(player.apply_status(stopped), None);

    player.finish_track()?;
    assert_eq!(player.state(), PlaybackState::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_renderer_stop_within_grace_is_ignored() -> anyhow::Result<()> {
    let config = PlayerConfig {
        end_grace_ms: 60_000,
        ..fast_config()
    };
    let (player, _) = player(MockBackend::new(), config);
    player.play(track("1", QualityTier::Cd), 0).await?;

    let stopped = BackendStatus {
        transport: TransportState::Stopped,
        position_ms: 0,
        duration_ms: None,
    };
    assert_eq!(player.apply_status(stopped), None);
    assert_eq!(player.state(), PlaybackState::Playing);
    Ok(())
}

#[tokio::test]
async fn test_external_pause_is_tracked() -> anyhow::Result<()> {
    let (player, _) = player(MockBackend::new(), fast_config());
    player.play(track("1", QualityTier::Cd), 0).await?;

    let paused = BackendStatus {
        transport: TransportState::Paused,
        position_ms: 30_000,
        duration_ms: Some(180_000),
    };
    assert_eq!(player.apply_status(paused), Some(StatusOutcome::ExternalPause));
    assert_eq!(player.state(), PlaybackState::Paused);
    assert_eq!(player.position_ms(), 30_000);
    Ok(())
}

#[tokio::test]
async fn test_report_reflects_queue_and_player() -> anyhow::Result<()> {
    let (player, report) = player(MockBackend::new(), fast_config());
    player.set_volume(40).await?;
    player.play(track("1", QualityTier::Cd), 0).await?;

    let mut queue = PlayQueue::new();
    queue.load_queue(
        vec![common::track_ref(10, 1), common::track_ref(11, 2)],
        0,
        QueueVersion::new(4, 2),
    );

    let (outbound, mut frames) = MockOutbound::new();
    let mut reporter = StateReporter::new(
        player,
        Arc::new(std::sync::Mutex::new(queue)),
        Arc::new(QualityPolicy::new(&DeviceCapability::default(), None)),
        Arc::new(ProtocolCodec::new([1; 16])),
        outbound.clone(),
        report,
        "Salon".to_string(),
        &fast_config(),
    );

    let built = reporter.build_report().await;
    assert_eq!(built.playback_state, PlaybackState::Playing);
    assert_eq!(built.current_queue_item_id, Some(10));
    assert_eq!(built.next_queue_item_id, Some(11));
    assert_eq!(built.queue_version, QueueVersion::new(4, 2));
    assert_eq!(built.volume, 40);

    assert!(reporter.report_once().await);
    let first = frames.try_recv()?;
    assert_eq!(common::message_types(&first), vec![message_type::RNDR_SRVR_STATE_UPDATED]);
    let volume = frames.try_recv()?;
    assert_eq!(common::message_types(&volume), vec![message_type::RNDR_SRVR_VOLUME_CHANGED]);

    // Volume inchangé : seul l'état repart
    assert!(reporter.report_once().await);
    assert!(frames.try_recv().is_ok());
    assert!(frames.try_recv().is_err());

    // Lien coupé puis rétabli : le volume est renvoyé
    outbound.set_connected(false);
    assert!(!reporter.report_once().await);
    outbound.set_connected(true);
    assert!(reporter.report_once().await);
    assert!(frames.try_recv().is_ok());
    assert!(frames.try_recv().is_ok());
    Ok(())
}
