//! Sections typées de la configuration.
//!
//! Chaque section porte `#[serde(default)]` : une clé absente du YAML prend
//! la valeur de [`Default`], qui reprend celle du fichier embarqué.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceConfig,
    pub connect: ConnectConfig,
    pub qobuz: QobuzConfig,
    pub backend: BackendConfig,
    pub server: ServerConfig,
    pub player: PlayerConfig,
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,
}

/// Identité annoncée au contrôleur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    /// Vide tant qu'aucun identifiant n'a été généré.
    pub uuid: String,
    pub brand: String,
    pub model: String,
    pub software_version: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "PMOConnect".to_string(),
            uuid: String::new(),
            brand: "PMOMusic".to_string(),
            model: "PMOConnect".to_string(),
            software_version: "pmoconnect-0.1.0".to_string(),
        }
    }
}

/// Session de contrôle. Le jeton et l'identifiant de session sont fournis
/// par le composant d'authentification externe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    pub endpoint: String,
    pub token: String,
    pub session_id: String,
    pub origin: String,
    pub connect_timeout_ms: u64,
    pub keepalive_interval_ms: u64,
    pub keepalive_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            session_id: String::new(),
            origin: "https://play.qobuz.com".to_string(),
            connect_timeout_ms: 10_000,
            keepalive_interval_ms: 10_000,
            keepalive_timeout_ms: 30_000,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

impl ConnectConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QobuzConfig {
    /// 0 laisse la négociation avec le renderer décider.
    pub max_quality: u32,
}

impl QobuzConfig {
    /// Plafond explicite, `None` en mode automatique.
    pub fn quality_override(&self) -> Option<u32> {
        (self.max_quality != 0).then_some(self.max_quality)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub dlna: DlnaConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DlnaConfig {
    pub ip: String,
    pub port: u16,
    /// Chemin de la description du device, essayé avant les chemins connus.
    pub description_path: String,
    pub fixed_volume: bool,
    pub max_volume: u32,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub volume_debounce_ms: u64,
}

impl Default for DlnaConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 1400,
            description_path: String::new(),
            fixed_volume: false,
            max_volume: 100,
            poll_interval_ms: 2_000,
            request_timeout_ms: 10_000,
            volume_debounce_ms: 200,
        }
    }
}

impl DlnaConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn volume_debounce(&self) -> Duration {
        Duration::from_millis(self.volume_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Hôte annoncé aux renderers ; vide = IP locale devinée.
    pub public_host: String,
    pub proxy_port: u16,
    pub url_max_age_secs: u64,
    pub upstream_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            public_host: String::new(),
            proxy_port: 7120,
            url_max_age_secs: 240,
            upstream_timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    /// URL de base du proxy audio telle que les renderers la voient.
    pub fn proxy_base_url(&self) -> String {
        let host = if self.public_host.trim().is_empty() {
            pmoutils::advertised_host(&self.bind_address)
        } else {
            self.public_host.trim().to_string()
        };
        pmoutils::http_base_url(&host, self.proxy_port)
    }

    pub fn url_max_age(&self) -> Duration {
        Duration::from_secs(self.url_max_age_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub report_interval_ms: u64,
    pub position_read_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub failure_threshold: u32,
    pub end_grace_ms: u64,
    pub previous_restart_threshold_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 1_000,
            position_read_timeout_ms: 250,
            retry_attempts: 3,
            retry_delay_ms: 2_000,
            failure_threshold: 3,
            end_grace_ms: 5_000,
            previous_restart_threshold_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub headers: BTreeMap<String, String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: 10_000,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}
