use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::{collections::VecDeque, sync::Arc, time::Instant};
use tracing::{debug, info};

use crate::{audio::catalog::Clip, error::PlaybackError};

/// Capacidad por defecto de la cola de cada guild.
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub clip: Arc<Clip>,
    pub requested_by: UserId,
    pub added_at: Instant,
}

impl QueueItem {
    pub fn new(clip: Arc<Clip>, requested_by: UserId) -> Self {
        Self {
            clip,
            requested_by,
            added_at: Instant::now(),
        }
    }
}

/// Bounded FIFO of clips for one guild.
///
/// Many command handlers enqueue while a single drain loop dequeues. The
/// mutex is only held for the push/pop itself, so `enqueue` never waits on
/// playback: a full queue rejects the clip instead of blocking the caller.
#[derive(Debug)]
pub struct PlaybackQueue {
    items: Mutex<VecDeque<QueueItem>>,
    capacity: usize,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Agrega un clip al final de la cola. Devuelve su posición (1 = siguiente).
    pub fn enqueue(&self, item: QueueItem) -> Result<usize, PlaybackError> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            info!(
                "🚫 Cola llena ({} clips), se descarta: {}",
                items.len(),
                item.clip.name
            );
            return Err(PlaybackError::QueueFull {
                capacity: self.capacity,
            });
        }

        debug!("➕ Agregado a la cola: {}", item.clip.name);
        items.push_back(item);
        Ok(items.len())
    }

    /// Saca el siguiente clip (FIFO).
    pub fn dequeue(&self) -> Option<QueueItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Vacía la cola y devuelve cuántos clips se descartaron.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }
}
