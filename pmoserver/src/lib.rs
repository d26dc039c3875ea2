//! # pmoserver - Serveurs HTTP de PMOConnect
//!
//! Cette crate regroupe la partie HTTP "sortante" du pont :
//!
//! - [`proxy`] : le proxy audio qui relaie le flux amont vers le renderer
//!   DLNA en injectant les en-têtes d'autorisation ;
//! - [`logs`] : l'initialisation du système de traces (`tracing`).
//!
//! ```rust,no_run
//! use pmoserver::proxy::{AudioProxy, ProxyOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:7120").await?;
//! let proxy = AudioProxy::new("http://192.168.1.10:7120", ProxyOptions::default())?;
//! proxy.clone().serve(listener, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod logs;
pub mod proxy;

pub use proxy::{AudioProxy, ProxyError, ProxyOptions, SourceRefresher, TrackSource};
