//! Abstraction du renderer piloté par le lecteur.
//!
//! Le lecteur est générique sur [`Backend`] ; [`RendererBackend`] est
//! l'énumération fermée des implémentations disponibles, choisie à la
//! construction.

use async_trait::async_trait;

use pmoconfig::BackendConfig;
use pmoserver::AudioProxy;

use crate::capabilities::{CapabilityCache, DeviceCapability};
use crate::dlna::DlnaBackend;
use crate::errors::BackendError;
use crate::model::{BackendStatus, PositionSnapshot, Track};

/// Opérations d'un renderer. Les opérations mutantes sont sérialisées par
/// l'implémentation ; les lectures ne les attendent jamais.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Nom lisible du renderer (friendlyName pour un device DLNA).
    fn name(&self) -> &str;

    /// Volume fixe : `set_volume` n'est jamais appelé et le volume vaut 100.
    fn fixed_volume(&self) -> bool {
        false
    }

    /// Prépare la piste sans lancer la lecture.
    async fn load(&self, track: &Track) -> Result<(), BackendError>;

    async fn play(&self) -> Result<(), BackendError>;

    async fn pause(&self) -> Result<(), BackendError>;

    async fn stop(&self) -> Result<(), BackendError>;

    async fn seek(&self, position_ms: u64) -> Result<(), BackendError>;

    /// Volume logique 0–100.
    async fn set_volume(&self, volume: u8) -> Result<(), BackendError>;

    async fn get_volume(&self) -> Result<u8, BackendError>;

    async fn get_position(&self) -> Result<PositionSnapshot, BackendError>;

    async fn get_status(&self) -> Result<BackendStatus, BackendError>;

    async fn get_capabilities(&self) -> Result<DeviceCapability, BackendError>;

    /// Libère les ressources de session (URLs du proxy, tâches internes).
    async fn disconnect(&self) {}
}

/// Renderers pris en charge.
pub enum RendererBackend {
    /// Renderer UPnP AV / DLNA (AVTransport + RenderingControl).
    Dlna(DlnaBackend),
}

impl RendererBackend {
    /// Construit le backend décrit par la configuration.
    pub async fn from_config(
        config: &BackendConfig,
        proxy: AudioProxy,
        cache: &CapabilityCache,
    ) -> Result<Self, BackendError> {
        let dlna = DlnaBackend::connect(&config.dlna, proxy, cache).await?;
        Ok(RendererBackend::Dlna(dlna))
    }
}

#[async_trait]
impl Backend for RendererBackend {
    fn name(&self) -> &str {
        match self {
            RendererBackend::Dlna(dlna) => dlna.name(),
        }
    }

    fn fixed_volume(&self) -> bool {
        match self {
            RendererBackend::Dlna(dlna) => dlna.fixed_volume(),
        }
    }

    async fn load(&self, track: &Track) -> Result<(), BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.load(track).await,
        }
    }

    async fn play(&self) -> Result<(), BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.play().await,
        }
    }

    async fn pause(&self) -> Result<(), BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.pause().await,
        }
    }

    async fn stop(&self) -> Result<(), BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.stop().await,
        }
    }

    async fn seek(&self, position_ms: u64) -> Result<(), BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.seek(position_ms).await,
        }
    }

    async fn set_volume(&self, volume: u8) -> Result<(), BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.set_volume(volume).await,
        }
    }

    async fn get_volume(&self) -> Result<u8, BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.get_volume().await,
        }
    }

    async fn get_position(&self) -> Result<PositionSnapshot, BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.get_position().await,
        }
    }

    async fn get_status(&self) -> Result<BackendStatus, BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.get_status().await,
        }
    }

    async fn get_capabilities(&self) -> Result<DeviceCapability, BackendError> {
        match self {
            RendererBackend::Dlna(dlna) => dlna.get_capabilities().await,
        }
    }

    async fn disconnect(&self) {
        match self {
            RendererBackend::Dlna(dlna) => dlna.disconnect().await,
        }
    }
}
