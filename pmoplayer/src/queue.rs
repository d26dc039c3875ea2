//! File de lecture locale.
//!
//! La file garde l'ordre d'insertion des entrées et une permutation
//! d'ordre de lecture (`order`), identité hors mode aléatoire. La position
//! courante est un indice dans `order` ; `None` si et seulement si la file
//! est vide.

use pmoconnect::{QueueVersion, RepeatMode, TrackRef};
use rand::seq::SliceRandom;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    tracks: Vec<TrackRef>,
    order: Vec<usize>,
    position: Option<usize>,
    repeat: RepeatMode,
    shuffle: bool,
    version: QueueVersion,
    next_hint: Option<TrackRef>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Entrées dans l'ordre d'insertion.
    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    /// Entrées dans l'ordre de lecture.
    pub fn play_order(&self) -> Vec<&TrackRef> {
        self.order.iter().map(|&i| &self.tracks[i]).collect()
    }

    pub fn version(&self) -> QueueVersion {
        self.version
    }

    pub fn set_version(&mut self, version: QueueVersion) {
        self.version = version;
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        info!(?mode, "Repeat mode");
        self.repeat = mode;
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// Indice (ordre d'insertion) de l'entrée courante.
    pub fn current_index(&self) -> Option<usize> {
        self.position.map(|p| self.order[p])
    }

    pub fn current(&self) -> Option<&TrackRef> {
        self.current_index().map(|i| &self.tracks[i])
    }

    /// Remplace la file. `start_index` est ramené dans l'intervalle valide.
    pub fn load_queue(&mut self, tracks: Vec<TrackRef>, start_index: usize, version: QueueVersion) {
        self.tracks = tracks;
        self.order = (0..self.tracks.len()).collect();
        self.position = if self.tracks.is_empty() {
            None
        } else {
            Some(start_index.min(self.tracks.len() - 1))
        };
        self.version = version;
        self.next_hint = None;
        if self.shuffle {
            self.shuffle_around_current();
        }
        debug!(
            len = self.tracks.len(),
            current = ?self.current_index(),
            major = version.major,
            minor = version.minor,
            "Queue loaded"
        );
    }

    /// Même contenu et même version : rien à recharger.
    pub fn is_same_load(&self, tracks: &[TrackRef], version: QueueVersion) -> bool {
        self.version == version && self.tracks == tracks
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.order.clear();
        self.position = None;
        self.next_hint = None;
    }

    /// Avance dans l'ordre de lecture. `None` en fin de file sans répétition.
    pub fn next(&mut self) -> Option<&TrackRef> {
        let position = self.position?;
        match self.repeat {
            RepeatMode::Track => {}
            _ if position + 1 < self.order.len() => self.position = Some(position + 1),
            RepeatMode::Queue => {
                debug!("Queue wrapped to beginning");
                self.position = Some(0);
            }
            RepeatMode::Off => return None,
        }
        self.current()
    }

    /// Recule dans l'ordre de lecture. Sans répétition, reste sur la
    /// première entrée.
    pub fn previous(&mut self) -> Option<&TrackRef> {
        let position = self.position?;
        match self.repeat {
            RepeatMode::Track => {}
            _ if position > 0 => self.position = Some(position - 1),
            RepeatMode::Queue => {
                debug!("Queue wrapped to end");
                self.position = Some(self.order.len() - 1);
            }
            RepeatMode::Off => {}
        }
        self.current()
    }

    /// Entrée qui suivra la courante, sans déplacer la position.
    pub fn peek_next(&self) -> Option<&TrackRef> {
        if let Some(hint) = &self.next_hint {
            return Some(hint);
        }
        let position = self.position?;
        let next = match self.repeat {
            RepeatMode::Track => position,
            _ if position + 1 < self.order.len() => position + 1,
            RepeatMode::Queue => 0,
            RepeatMode::Off => return None,
        };
        Some(&self.tracks[self.order[next]])
    }

    /// Positionne la file sur l'entrée `queue_item_id`.
    pub fn jump_to_item(&mut self, queue_item_id: u64) -> bool {
        let Some(index) = self
            .tracks
            .iter()
            .position(|t| t.queue_item_id == queue_item_id)
        else {
            return false;
        };
        self.position = self.order.iter().position(|&i| i == index);
        true
    }

    pub fn set_next_hint(&mut self, track: Option<TrackRef>) {
        self.next_hint = track;
    }

    pub fn take_next_hint(&mut self) -> Option<TrackRef> {
        self.next_hint.take()
    }

    /// Insère des entrées à `index` (ordre d'insertion). En mode aléatoire,
    /// elles sont jouées après la permutation existante.
    pub fn insert(&mut self, index: usize, tracks: Vec<TrackRef>) {
        if tracks.is_empty() {
            return;
        }
        let index = index.min(self.tracks.len());
        let count = tracks.len();
        let current = self.current_index().map(|c| if c >= index { c + count } else { c });

        self.tracks.splice(index..index, tracks);
        if self.shuffle {
            for slot in self.order.iter_mut() {
                if *slot >= index {
                    *slot += count;
                }
            }
            self.order.extend(index..index + count);
        } else {
            self.order = (0..self.tracks.len()).collect();
        }

        self.position = match current {
            Some(c) => self.order.iter().position(|&i| i == c),
            None => Some(0),
        };
    }

    pub fn append(&mut self, tracks: Vec<TrackRef>) {
        let len = self.tracks.len();
        self.insert(len, tracks);
    }

    /// Retire l'entrée `index` (ordre d'insertion). Retirer l'entrée
    /// courante avance sur la suivante selon le mode de répétition.
    pub fn remove(&mut self, index: usize) -> Option<TrackRef> {
        if index >= self.tracks.len() {
            return None;
        }
        let removed_at = self.order.iter().position(|&i| i == index)?;
        let position = self.position;

        let removed = self.tracks.remove(index);
        self.order.remove(removed_at);
        for slot in self.order.iter_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }

        let len = self.order.len();
        self.position = match position {
            _ if len == 0 => None,
            Some(p) if p > removed_at => Some(p - 1),
            Some(p) if p == removed_at => {
                if p < len {
                    Some(p)
                } else if self.repeat == RepeatMode::Queue {
                    Some(0)
                } else {
                    Some(len - 1)
                }
            }
            other => other,
        };
        if self
            .next_hint
            .as_ref()
            .is_some_and(|h| h.queue_item_id == removed.queue_item_id)
        {
            self.next_hint = None;
        }
        Some(removed)
    }

    /// Active ou désactive l'ordre aléatoire. A l'activation, l'entrée
    /// courante passe en tête de la permutation ; à la désactivation, elle
    /// reste l'entrée courante.
    pub fn set_shuffle(&mut self, enabled: bool) {
        if enabled == self.shuffle {
            return;
        }
        self.shuffle = enabled;
        info!(enabled, "Shuffle mode");
        if enabled {
            self.shuffle_around_current();
        } else {
            let current = self.current_index();
            self.order = (0..self.tracks.len()).collect();
            self.position = current;
        }
    }

    fn shuffle_around_current(&mut self) {
        let current = self.current_index();
        let mut rng = rand::rng();
        self.order.shuffle(&mut rng);
        let pivot = current.and_then(|c| self.order.iter().position(|&i| i == c));
        if let Some(at) = pivot {
            self.order.swap(0, at);
            self.position = Some(0);
        }
    }
}
