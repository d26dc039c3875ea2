//! # pmoplayer - Lecteur du pont PMOConnect
//!
//! Côté "métier" de la session Connect :
//!
//! - [`player`] : machine d'état de lecture et politique d'échec ;
//! - [`queue`] : file de lecture, répétition et mode aléatoire ;
//! - [`router`] : application des commandes du contrôleur, dans l'ordre ;
//! - [`reporter`] et [`poller`] : rapports d'état et relevés du renderer ;
//! - [`resolver`] : résolution des pistes auprès du service de streaming ;
//! - [`context`] : assemblage de l'ensemble pour une session.

pub mod context;
pub mod errors;
pub mod player;
pub mod poller;
pub mod quality;
pub mod queue;
pub mod reporter;
pub mod resolver;
pub mod router;
pub mod state;

pub use context::ConnectContext;
pub use errors::PlayerError;
pub use player::{Player, PlayerSnapshot, StatusOutcome};
pub use poller::PositionPoller;
pub use quality::QualityPolicy;
pub use queue::PlayQueue;
pub use reporter::StateReporter;
pub use resolver::{HttpTrackResolver, TrackResolver};
pub use router::{CommandRouter, Outbound, RouterMessage, SharedQueue};
pub use state::{PlayerEvent, Transition};
