//! Backend DLNA : pilotage d'un renderer UPnP AV par SOAP.
//!
//! - description du device récupérée sur `ip:port` (chemins connus)
//! - pistes servies au renderer à travers l'[`AudioProxy`]
//! - appels mutants sérialisés par `op_lock` ; les lectures concurrentes
//!   renvoient les dernières valeurs connues
//! - SetVolume espacés d'au moins `volume_debounce_ms`, envoyés sous le même
//!   verrou que les autres appels mutants

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pmoconfig::DlnaConfig;
use pmoserver::AudioProxy;

use crate::avtransport_client::AvTransportClient;
use crate::backend::Backend;
use crate::capabilities::{CapabilityCache, DeviceCapability};
use crate::connection_manager_client::ConnectionManagerClient;
use crate::description::{DeviceDescription, fetch_description};
use crate::didl::build_track_metadata;
use crate::errors::{BackendAction, BackendError, ControlPointError, WithAction};
use crate::model::{BackendStatus, PositionSnapshot, Track, TransportState};
use crate::rendering_control_client::RenderingControlClient;
use crate::soap::SoapClient;

/// Dernières valeurs lues ou écrites sur le renderer.
#[derive(Debug, Clone)]
struct CachedState {
    status: BackendStatus,
    position: PositionSnapshot,
    volume: u8,
    /// Jeton du proxy pour la piste chargée.
    token: Option<String>,
}

impl Default for CachedState {
    fn default() -> Self {
        Self {
            status: BackendStatus {
                transport: TransportState::Stopped,
                position_ms: 0,
                duration_ms: None,
            },
            position: PositionSnapshot::default(),
            volume: 100,
            token: None,
        }
    }
}

pub struct DlnaBackend {
    description: DeviceDescription,
    avtransport: AvTransportClient,
    rendering: Option<RenderingControlClient>,
    connection_manager: Option<ConnectionManagerClient>,
    proxy: AudioProxy,
    cache: CapabilityCache,
    config: DlnaConfig,
    op_lock: Mutex<()>,
    state: Mutex<CachedState>,
    /// Instant du dernier SetVolume envoyé.
    last_volume_sent: Mutex<Option<Instant>>,
}

impl DlnaBackend {
    /// Récupère la description du renderer configuré et prépare les clients.
    pub async fn connect(
        config: &DlnaConfig,
        proxy: AudioProxy,
        cache: &CapabilityCache,
    ) -> Result<Self, BackendError> {
        if config.ip.trim().is_empty() {
            return Err(BackendError::new(
                BackendAction::Connect,
                ControlPointError::Description("backend.dlna.ip is not configured".to_string()),
            ));
        }

        let soap = SoapClient::new(config.request_timeout()).for_action(BackendAction::Connect)?;
        let description = fetch_description(
            soap.http(),
            config.ip.trim(),
            config.port,
            Some(config.description_path.as_str()),
        )
        .await
        .for_action(BackendAction::Connect)?;

        info!(
            "DLNA renderer '{}' ({} {}) found at {}",
            description.friendly_name,
            description.manufacturer,
            description.model_name,
            description.location
        );

        Ok(Self::from_description(description, soap, config, proxy, cache.clone()))
    }

    pub fn from_description(
        description: DeviceDescription,
        soap: SoapClient,
        config: &DlnaConfig,
        proxy: AudioProxy,
        cache: CapabilityCache,
    ) -> Self {
        let avtransport = AvTransportClient::new(
            description.avtransport.control_url.clone(),
            description.avtransport.service_type.clone(),
            soap.clone(),
        );
        let rendering = description.rendering_control.as_ref().map(|rc| {
            RenderingControlClient::new(rc.control_url.clone(), rc.service_type.clone(), soap.clone())
        });
        let connection_manager = description.connection_manager.as_ref().map(|cm| {
            ConnectionManagerClient::new(cm.control_url.clone(), cm.service_type.clone(), soap.clone())
        });

        Self {
            description,
            avtransport,
            rendering,
            connection_manager,
            proxy,
            cache,
            config: config.clone(),
            op_lock: Mutex::new(()),
            state: Mutex::new(CachedState::default()),
            last_volume_sent: Mutex::new(None),
        }
    }

    pub fn description(&self) -> &DeviceDescription {
        &self.description
    }

    fn max_native_volume(&self) -> u32 {
        if self.config.max_volume == 0 { 100 } else { self.config.max_volume }
    }

    fn to_native_volume(&self, volume: u8) -> u32 {
        let max = self.max_native_volume();
        (u32::from(volume.min(100)) * max + 50) / 100
    }

    fn to_logical_volume(&self, native: u32) -> u8 {
        let max = self.max_native_volume();
        ((native.min(max) * 100 + max / 2) / max).min(100) as u8
    }

    /// Un appel mutant est en cours.
    fn busy(&self) -> bool {
        self.op_lock.try_lock().is_err()
    }

    /// Attend que l'intervalle minimal depuis le dernier SetVolume soit écoulé.
    async fn wait_volume_slot(&self) {
        let remaining = self
            .last_volume_sent
            .lock()
            .await
            .map(|at| self.config.volume_debounce().saturating_sub(at.elapsed()))
            .unwrap_or_default();
        if !remaining.is_zero() {
            debug!(?remaining, "SetVolume rate limited");
            tokio::time::sleep(remaining).await;
        }
    }

    async fn detect_capabilities(&self) -> Result<DeviceCapability, ControlPointError> {
        let client = self.connection_manager.as_ref().ok_or_else(|| {
            ControlPointError::CapabilityDetection("no ConnectionManager service".to_string())
        })?;
        let info = client.get_protocol_info().await?;
        let mut caps = DeviceCapability::from_sink(&info.sink);
        caps.apply_device_overrides(&self.description.manufacturer, &self.description.model_name);
        Ok(caps)
    }

    async fn release_token(&self, token: Option<String>) {
        if let Some(token) = token {
            self.proxy.unregister(&token).await;
        }
    }
}

#[async_trait]
impl Backend for DlnaBackend {
    fn name(&self) -> &str {
        &self.description.friendly_name
    }

    fn fixed_volume(&self) -> bool {
        self.config.fixed_volume || self.rendering.is_none()
    }

    async fn load(&self, track: &Track) -> Result<(), BackendError> {
        let caps = self.get_capabilities().await?;
        let props = track.quality.properties();
        let protocol_info = caps.build_protocol_info(
            track.mime_type(),
            Some(props.sample_rate),
            Some(props.bit_depth),
        );

        let _guard = self.op_lock.lock().await;

        let url = self
            .proxy
            .register(&track.id, track.source.clone(), track.mime_type())
            .await;
        let token = url.rsplit('/').next().map(str::to_string);

        let metadata = match build_track_metadata(track, &url, &protocol_info) {
            Ok(m) => m,
            Err(e) => {
                self.release_token(token).await;
                return Err(BackendError::new(BackendAction::Load, e));
            }
        };

        debug!(track_id = %track.id, %url, %protocol_info, "SetAVTransportURI");
        if let Err(e) = self.avtransport.set_av_transport_uri(&url, &metadata).await {
            self.release_token(token).await;
            return Err(BackendError::new(BackendAction::Load, e));
        }

        let previous = {
            let mut state = self.state.lock().await;
            state.status = BackendStatus {
                transport: TransportState::Stopped,
                position_ms: 0,
                duration_ms: track.duration_ms,
            };
            state.position = PositionSnapshot::captured_now(0);
            std::mem::replace(&mut state.token, token)
        };
        self.release_token(previous).await;
        Ok(())
    }

    async fn play(&self) -> Result<(), BackendError> {
        let _guard = self.op_lock.lock().await;
        self.avtransport.play().await.for_action(BackendAction::Play)?;
        self.state.lock().await.status.transport = TransportState::Playing;
        Ok(())
    }

    async fn pause(&self) -> Result<(), BackendError> {
        let _guard = self.op_lock.lock().await;
        self.avtransport.pause().await.for_action(BackendAction::Pause)?;
        self.state.lock().await.status.transport = TransportState::Paused;
        Ok(())
    }

    async fn stop(&self) -> Result<(), BackendError> {
        let _guard = self.op_lock.lock().await;
        self.avtransport.stop().await.for_action(BackendAction::Stop)?;
        let mut state = self.state.lock().await;
        state.status.transport = TransportState::Stopped;
        state.status.position_ms = 0;
        state.position = PositionSnapshot::captured_now(0);
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> Result<(), BackendError> {
        let _guard = self.op_lock.lock().await;
        self.avtransport
            .seek_rel_time(position_ms)
            .await
            .for_action(BackendAction::Seek)?;
        let mut state = self.state.lock().await;
        state.status.position_ms = position_ms;
        state.position = PositionSnapshot::captured_now(position_ms);
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> Result<(), BackendError> {
        let volume = volume.min(100);
        let client = match &self.rendering {
            Some(client) if !self.config.fixed_volume => client,
            _ => {
                debug!(volume, "Fixed volume, SetVolume suppressed");
                return Ok(());
            }
        };
        let native = self.to_native_volume(volume);

        let _guard = self.op_lock.lock().await;
        self.wait_volume_slot().await;
        debug!(volume, native, "SetVolume");
        let result = client.set_volume(native).await;
        *self.last_volume_sent.lock().await = Some(Instant::now());
        result.for_action(BackendAction::SetVolume)?;
        self.state.lock().await.volume = volume;
        Ok(())
    }

    async fn get_volume(&self) -> Result<u8, BackendError> {
        if self.fixed_volume() {
            return Ok(100);
        }
        let Some(client) = &self.rendering else {
            return Ok(100);
        };
        if self.busy() {
            return Ok(self.state.lock().await.volume);
        }
        let native = client.get_volume().await.for_action(BackendAction::GetVolume)?;
        let volume = self.to_logical_volume(native);
        self.state.lock().await.volume = volume;
        Ok(volume)
    }

    async fn get_position(&self) -> Result<PositionSnapshot, BackendError> {
        if self.busy() {
            return Ok(self.state.lock().await.position);
        }
        let info = self
            .avtransport
            .get_position_info()
            .await
            .for_action(BackendAction::GetPosition)?;

        let mut state = self.state.lock().await;
        if let Some(rel_ms) = info.rel_time_ms {
            state.position = PositionSnapshot::captured_now(rel_ms);
            state.status.position_ms = rel_ms;
        }
        if info.track_duration_ms.is_some() {
            state.status.duration_ms = info.track_duration_ms;
        }
        Ok(state.position)
    }

    async fn get_status(&self) -> Result<BackendStatus, BackendError> {
        if self.busy() {
            return Ok(self.state.lock().await.status);
        }
        let transport = self
            .avtransport
            .get_transport_info()
            .await
            .for_action(BackendAction::GetStatus)?
            .transport_state();
        let info = self
            .avtransport
            .get_position_info()
            .await
            .for_action(BackendAction::GetStatus)?;

        let mut state = self.state.lock().await;
        state.status.transport = transport;
        if let Some(rel_ms) = info.rel_time_ms {
            state.status.position_ms = rel_ms;
            state.position = PositionSnapshot::captured_now(rel_ms);
        }
        if info.track_duration_ms.is_some() {
            state.status.duration_ms = info.track_duration_ms;
        }
        Ok(state.status)
    }

    async fn get_capabilities(&self) -> Result<DeviceCapability, BackendError> {
        let device_id = self.description.device_id().to_string();
        if let Some(caps) = self.cache.get(&device_id).await {
            return Ok(caps);
        }

        match self.detect_capabilities().await {
            Ok(caps) => {
                info!(
                    device = %self.description.friendly_name,
                    max_quality = %caps.max_quality(),
                    "Renderer capabilities detected"
                );
                self.cache.set(&device_id, caps.clone()).await;
                Ok(caps)
            }
            Err(e) => {
                warn!("Capability detection failed, assuming CD quality: {}", e);
                Ok(DeviceCapability::default())
            }
        }
    }

    async fn disconnect(&self) {
        let token = self.state.lock().await.token.take();
        self.release_token(token).await;
    }
}
