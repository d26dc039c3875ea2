//! # PMOConnect Configuration Module
//!
//! This module provides configuration management for PMOConnect, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Typed access through [`Settings`]
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let port = config.settings().server.proxy_port;
//! println!("Audio proxy port: {}", port);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Il n'y a pas de singleton : le binaire charge la configuration une fois
//! et passe les sections dont chaque composant a besoin.

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;
use uuid::Uuid;

mod settings;

pub use settings::{
    BackendConfig, ConnectConfig, DeviceConfig, DlnaConfig, LoggingConfig, PlayerConfig,
    QobuzConfig, ResolverConfig, ServerConfig, Settings,
};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmoconnect.yaml");

const ENV_CONFIG_DIR: &str = "PMOCONNECT_CONFIG";
const ENV_PREFIX: &str = "PMOCONNECT_CONFIG__";
const DEFAULT_DIR_NAME: &str = ".pmoconnect";

/// Configuration chargée : l'arbre YAML fusionné et sa vue typée.
#[derive(Debug, Clone)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Value,
    settings: Settings,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        // 1. Try provided directory
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        // 3. Try current directory
        if Path::new(DEFAULT_DIR_NAME).exists() {
            return PathBuf::from(DEFAULT_DIR_NAME);
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(DEFAULT_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(DEFAULT_DIR_NAME)
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!(
                "Le chemin spécifié n'est pas un répertoire: {}",
                path.display()
            ));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOCONNECT_CONFIG` environment variable
    /// 3. `.pmoconnect` in the current directory
    /// 4. `.pmoconnect` in the user's home directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present, then
    /// `PMOCONNECT_CONFIG__SECTION__KEY` variables are applied. A device uuid
    /// is generated on first run, and the merged result is written back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(&config_dir)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join("config.yaml");
        let external = match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                Some(serde_yaml::from_slice::<Value>(&data)?)
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using default embedded config");
                None
            }
        };

        let mut config = Self::from_layers(config_dir, path, external.as_ref(), env::vars())?;
        config.ensure_device_uuid()?;
        config.save()?;
        Ok(config)
    }

    /// Construit une configuration à partir des couches déjà lues.
    fn from_layers<I>(
        config_dir: PathBuf,
        path: PathBuf,
        external: Option<&Value>,
        vars: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if let Some(external) = external {
            merge_yaml(&mut value, external);
        }
        let mut value = lower_keys_value(value);
        apply_env_overrides(&mut value, vars);

        let settings = serde_yaml::from_value(value.clone())?;
        Ok(Self {
            config_dir,
            path,
            data: value,
            settings,
        })
    }

    /// Typed view of the merged configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and refreshes the
    /// typed settings. The file is not written until [`Config::save`].
    pub fn set_value(&mut self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.clone();
        set_value_internal(&mut data, path, value)?;
        self.settings = serde_yaml::from_value(data.clone())?;
        self.data = data;
        Ok(())
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let mut current = &self.data;
        for (i, key) in path.iter().enumerate() {
            match current {
                Value::Mapping(map) => match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                },
                _ => return Err(anyhow!("Path {} is not a mapping", path[..i].join("."))),
            }
        }
        Ok(current.clone())
    }

    /// Génère et mémorise l'UUID du device s'il n'existe pas encore.
    fn ensure_device_uuid(&mut self) -> Result<()> {
        if !self.settings.device.uuid.trim().is_empty() {
            return Ok(());
        }
        let uuid = Uuid::new_v4().to_string();
        info!(uuid = %uuid, "Generated a new device uuid");
        self.set_value(&["device", "uuid"], Value::String(uuid))
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key_value = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map
                .entry(key_value)
                .or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn apply_env_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = convert_env_value(&value);
            if let Err(e) = set_value_internal(config, &key_path, yaml_value) {
                tracing::warn!(variable = %key, "Ignoring config override: {}", e);
            }
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(key, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(external: Option<&str>, vars: Vec<(&str, &str)>) -> Config {
        let external = external.map(|s| serde_yaml::from_str::<Value>(s).unwrap());
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>();
        Config::from_layers(
            PathBuf::from("/tmp"),
            PathBuf::from("/tmp/config.yaml"),
            external.as_ref(),
            vars,
        )
        .unwrap()
    }

    #[test]
    fn test_embedded_defaults_match_struct_defaults() {
        let config = layers(None, vec![]);
        assert_eq!(config.settings(), &Settings::default());
    }

    #[test]
    fn test_external_file_overrides_defaults() {
        let config = layers(
            Some("Backend:\n  DLNA:\n    ip: 192.168.1.30\n    fixed_volume: true\n"),
            vec![],
        );
        let dlna = &config.settings().backend.dlna;
        assert_eq!(dlna.ip, "192.168.1.30");
        assert!(dlna.fixed_volume);
        assert_eq!(dlna.port, 1400);
    }

    #[test]
    fn test_env_overrides_are_parsed_as_yaml() {
        let config = layers(
            None,
            vec![
                ("PMOCONNECT_CONFIG__QOBUZ__MAX_QUALITY", "7"),
                ("PMOCONNECT_CONFIG__DEVICE__NAME", "Salon"),
                ("UNRELATED", "1"),
            ],
        );
        assert_eq!(config.settings().qobuz.max_quality, 7);
        assert_eq!(config.settings().qobuz.quality_override(), Some(7));
        assert_eq!(config.settings().device.name, "Salon");
    }

    #[test]
    fn test_get_and_set_value() {
        let mut config = layers(None, vec![]);
        assert_eq!(
            config.get_value(&["server", "proxy_port"]).unwrap(),
            Value::Number(7120.into())
        );
        config
            .set_value(&["Server", "Proxy_Port"], Value::Number(8000.into()))
            .unwrap();
        assert_eq!(config.settings().server.proxy_port, 8000);
        assert!(config.get_value(&["server", "missing"]).is_err());
    }

    #[test]
    fn test_load_config_generates_and_persists_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let first = Config::load_config(&dir_str).unwrap();
        let uuid = first.settings().device.uuid.clone();
        assert!(Uuid::parse_str(&uuid).is_ok());
        assert!(dir.path().join("config.yaml").exists());

        let second = Config::load_config(&dir_str).unwrap();
        assert_eq!(second.settings().device.uuid, uuid);
    }

    #[test]
    fn test_proxy_base_url_uses_public_host() {
        let mut config = layers(None, vec![]);
        config
            .set_value(&["server", "public_host"], Value::String("10.0.0.5".into()))
            .unwrap();
        assert_eq!(
            config.settings().server.proxy_base_url(),
            "http://10.0.0.5:7120"
        );
    }
}
