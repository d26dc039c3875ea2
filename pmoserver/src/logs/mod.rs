// logs.rs
//! Initialisation du système de traces.
//!
//! Le niveau vient de la configuration (`logging.level`) sauf si `RUST_LOG`
//! est défini. Le filtre est rechargeable à chaud via [`LogHandle`].

use pmoconfig::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

pub const AVAILABLE_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Error)]
pub enum LogError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Poignée de rechargement du filtre global.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Change le niveau minimal des traces.
    pub fn set_level(&self, level: &str) -> Result<(), LogError> {
        let directive = normalize_level(level)?;
        self.handle.reload(EnvFilter::new(directive))?;
        tracing::info!("Log level changed to: {}", directive);
        Ok(())
    }
}

/// Valide un niveau de log et le ramène à sa forme canonique.
pub fn normalize_level(level: &str) -> Result<&'static str, LogError> {
    let lower = level.trim().to_lowercase();
    AVAILABLE_LEVELS
        .iter()
        .find(|l| **l == lower)
        .copied()
        .ok_or_else(|| LogError::UnknownLevel(level.to_string()))
}

/// Construit le filtre initial : `RUST_LOG` prioritaire, sinon le niveau configuré.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = normalize_level(&config.level).unwrap_or("info");
    EnvFilter::new(level)
}

/// Installe le subscriber global (filtre rechargeable + sortie console).
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle, LogError> {
    let (filter, handle) = reload::Layer::new(build_filter(config));

    Registry::default()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(config.ansi),
        )
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)?;

    Ok(LogHandle { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("DEBUG").unwrap(), "debug");
        assert_eq!(normalize_level(" warn ").unwrap(), "warn");
        assert!(matches!(
            normalize_level("verbose"),
            Err(LogError::UnknownLevel(_))
        ));
    }

    #[test]
    fn test_build_filter_falls_back_to_info() {
        let config = LoggingConfig {
            level: "chatty".to_string(),
            ansi: false,
        };
        // Ne doit pas paniquer sur un niveau inconnu
        let _ = build_filter(&config);
    }
}
