/// Utilitaires réseau partagés par les crates PMOConnect.
///
/// # Fonctions principales
///
/// - [`guess_local_ip`] : devine l'adresse IP locale utilisée pour les connexions sortantes
/// - [`advertised_host`] : adresse à annoncer aux renderers pour un bind donné
/// - [`http_base_url`] : construit une URL de base `http://host:port`
mod ip_utils;

pub use ip_utils::{advertised_host, guess_local_ip, http_base_url};
