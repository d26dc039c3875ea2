//! Table de transitions de l'état de lecture.

use std::fmt;

use pmocontrol::PlaybackState;

/// Evénements du lecteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerEvent {
    /// Demande de lecture d'une piste.
    Play,
    /// Le renderer a confirmé la lecture.
    Started,
    Pause,
    Resume,
    Stop,
    /// Seuil d'échecs consécutifs atteint.
    Failure,
    /// Fin naturelle de la piste.
    Ended,
    /// Sortie de l'état d'erreur.
    Reset,
}

impl fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub trait Transition {
    /// Etat atteint sur `event`, `None` si la transition n'existe pas.
    fn on(self, event: PlayerEvent) -> Option<PlaybackState>;
}

impl Transition for PlaybackState {
    fn on(self, event: PlayerEvent) -> Option<PlaybackState> {
        use PlaybackState::*;
        use PlayerEvent as E;

        match (self, event) {
            (_, E::Play) => Some(Buffering),
            (Buffering, E::Started) => Some(Playing),
            (Playing, E::Pause) => Some(Paused),
            (Paused, E::Resume) => Some(Playing),
            (Buffering | Playing | Paused, E::Stop) => Some(Stopped),
            (Buffering | Playing | Paused, E::Failure) => Some(Error),
            (Playing, E::Ended) => Some(Stopped),
            (Error, E::Reset) => Some(Idle),
            _ => None,
        }
    }
}
