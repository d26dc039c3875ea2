//! Palier de qualité annoncé et demandé.
//!
//! Le palier maximal vient des capacités du renderer, sauf surcharge par
//! `qobuz.max_quality`. Le contrôleur peut ensuite imposer un plafond plus
//! bas pour la session (`SET_MAX_AUDIO_QUALITY`).

use std::sync::Mutex;

use pmocontrol::{DeviceCapability, QualityTier};
use tokio::sync::watch;
use tracing::info;

pub struct QualityPolicy {
    max_quality: QualityTier,
    controller_cap: Mutex<Option<QualityTier>>,
    advertised: watch::Sender<QualityTier>,
}

impl QualityPolicy {
    pub fn new(capability: &DeviceCapability, configured: Option<QualityTier>) -> Self {
        let max_quality = capability.effective_quality(configured);
        if let Some(tier) = configured {
            info!(%tier, detected = %capability.max_quality(), "Quality overridden by configuration");
        }
        let (advertised, _) = watch::channel(max_quality);
        Self {
            max_quality,
            controller_cap: Mutex::new(None),
            advertised,
        }
    }

    /// Palier annoncé au contrôleur.
    pub fn max_quality(&self) -> QualityTier {
        self.max_quality
    }

    /// Palier demandé à la résolution des pistes.
    pub fn streaming_quality(&self) -> QualityTier {
        match self.controller_cap.lock().ok().and_then(|cap| *cap) {
            Some(cap) => cap.min(self.max_quality),
            None => self.max_quality,
        }
    }

    /// Enregistre le plafond du contrôleur et retourne le palier effectif.
    pub fn set_controller_cap(&self, tier: QualityTier) -> QualityTier {
        if let Ok(mut cap) = self.controller_cap.lock() {
            *cap = Some(tier);
        }
        let effective = self.streaming_quality();
        info!(requested = %tier, %effective, "Controller quality cap");
        effective
    }

    /// Palier annoncé à chaque jonction de session.
    pub fn subscribe(&self) -> watch::Receiver<QualityTier> {
        self.advertised.subscribe()
    }
}
