use pmocontrol::{BackendError, PlaybackState};
use thiserror::Error;

use crate::state::PlayerEvent;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("invalid transition: {event} from {from}")]
    InvalidTransition {
        from: PlaybackState,
        event: PlayerEvent,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("no track loaded")]
    NoTrack,

    #[error("seek is not possible while {0}")]
    NotSeekable(PlaybackState),

    #[error("cannot resolve track {track_id}: {reason}")]
    Resolve { track_id: String, reason: String },
}
