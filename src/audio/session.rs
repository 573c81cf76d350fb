use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        catalog::Clip,
        queue::{PlaybackQueue, QueueItem},
        voice::VoiceConnection,
    },
    error::{PlaybackError, VoiceError},
};

/// Frame and clip pacing for the drain loop.
///
/// Every frame is followed by a wait until its real-time slot, measured from
/// a running deadline so that slow sends do not accumulate drift. After each
/// clip the loop pauses for `clip_gap`. A zero duration disables that wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub frame_interval: Duration,
    pub clip_gap: Duration,
}

impl Pacing {
    /// Sin esperas: útil en tests.
    pub const fn none() -> Self {
        Self {
            frame_interval: Duration::ZERO,
            clip_gap: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(20), // 960 samples @ 48kHz
            clip_gap: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// How a drain episode ended. `clips` counts fully sent clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained { clips: usize },
    ConnectionLost { clips: usize },
    Cancelled { clips: usize },
}

/// Result of a successful `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStatus {
    /// This call won the Idle → Playing transition and spawned the drain loop.
    Started,
    /// A drain loop is already running; it will reach the clip at `position`.
    Queued { position: usize },
}

enum Interrupted {
    Cancelled,
    Lost(VoiceError),
}

/// One guild's voice connection, playback queue and single-drain flag.
///
/// `playing` is the only synchronization for the drain loop: whoever flips it
/// from `false` to `true` owns the connection until it flips it back. Leaving
/// cancels `cancel`, which the drain loop observes before every send.
pub struct GuildSession {
    guild_id: GuildId,
    channel_id: ChannelId,
    connection: Arc<dyn VoiceConnection>,
    queue: PlaybackQueue,
    playing: AtomicBool,
    cancel: CancellationToken,
    pacing: Pacing,
}

impl GuildSession {
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        connection: Arc<dyn VoiceConnection>,
        queue_capacity: usize,
        pacing: Pacing,
    ) -> Self {
        Self {
            guild_id,
            channel_id,
            connection,
            queue: PlaybackQueue::new(queue_capacity),
            playing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            pacing,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn state(&self) -> PlaybackState {
        if self.playing.load(Ordering::SeqCst) {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Encola un clip y dispara la reproducción si está inactiva.
    ///
    /// A session closed by `leave` rejects the clip with `NotJoined`, even when
    /// the close lands between the enqueue and the drain trigger.
    pub fn play(
        self: &Arc<Self>,
        clip: Arc<Clip>,
        requested_by: UserId,
    ) -> Result<(PlayStatus, Option<JoinHandle<DrainOutcome>>), PlaybackError> {
        if self.is_closed() {
            return Err(PlaybackError::NotJoined);
        }
        let position = self.queue.enqueue(QueueItem::new(clip, requested_by))?;
        if self.is_closed() {
            self.queue.clear();
            return Err(PlaybackError::NotJoined);
        }
        match self.start_drain() {
            Some(handle) => Ok((PlayStatus::Started, Some(handle))),
            None => Ok((PlayStatus::Queued { position }, None)),
        }
    }

    /// Spawns the drain loop if this call wins the Idle → Playing
    /// compare-and-set. Every other caller gets `None` and relies on the
    /// running loop to reach its clip.
    pub fn start_drain(self: &Arc<Self>) -> Option<JoinHandle<DrainOutcome>> {
        if self.is_closed() || self.queue.is_empty() || !self.try_acquire() {
            return None;
        }
        Some(tokio::spawn(self.clone().drain()))
    }

    /// Stops playback for good: cancels the drain loop, drops queued clips
    /// and releases the connection handle.
    pub async fn close(&self) -> Result<(), VoiceError> {
        self.cancel.cancel();
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!("🗑️ {} clips descartados en guild {}", dropped, self.guild_id);
        }
        self.connection.disconnect().await
    }

    fn try_acquire(&self) -> bool {
        self.playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    async fn drain(self: Arc<Self>) -> DrainOutcome {
        let mut clips = 0;
        info!("▶️ Reproducción iniciada en guild {}", self.guild_id);

        loop {
            if self.is_closed() {
                self.release();
                return DrainOutcome::Cancelled { clips };
            }

            if let Err(e) = self.connection.set_speaking(true).await {
                warn!("❌ No se pudo activar speaking en guild {}: {}", self.guild_id, e);
                self.release();
                return DrainOutcome::ConnectionLost { clips };
            }

            while let Some(item) = self.queue.dequeue() {
                debug!(
                    "🎵 Reproduciendo {} ({} frames) en guild {}, pedido por {} hace {:?}",
                    item.clip.name,
                    item.clip.frames.len(),
                    self.guild_id,
                    item.requested_by,
                    item.added_at.elapsed()
                );

                match self.stream_clip(&item.clip).await {
                    Ok(()) => clips += 1,
                    Err(Interrupted::Cancelled) => {
                        info!("⏹️ Reproducción cancelada en guild {}", self.guild_id);
                        self.release();
                        return DrainOutcome::Cancelled { clips };
                    }
                    Err(Interrupted::Lost(e)) => {
                        warn!(
                            "❌ {} abandonado en guild {}: {}",
                            item.clip.name, self.guild_id, e
                        );
                        let _ = self.connection.set_speaking(false).await;
                        self.release();
                        return DrainOutcome::ConnectionLost { clips };
                    }
                }

                if self.pause(self.pacing.clip_gap).await.is_err() {
                    self.release();
                    return DrainOutcome::Cancelled { clips };
                }
            }

            if let Err(e) = self.connection.set_speaking(false).await {
                debug!("No se pudo desactivar speaking en guild {}: {}", self.guild_id, e);
            }
            self.release();

            // Un clip encolado justo antes de soltar el flag no tiene quien lo
            // reproduzca: se vuelve a mirar la cola bajo el mismo CAS.
            if self.queue.is_empty() || self.is_closed() || !self.try_acquire() {
                info!(
                    "📭 Cola vacía en guild {}, {} clips reproducidos",
                    self.guild_id, clips
                );
                return DrainOutcome::Drained { clips };
            }
            debug!("🔁 Llegó un clip mientras terminaba en guild {}", self.guild_id);
        }
    }

    async fn stream_clip(&self, clip: &Clip) -> Result<(), Interrupted> {
        let interval = self.pacing.frame_interval;
        let mut deadline = Instant::now();

        for frame in &clip.frames {
            if self.is_closed() {
                return Err(Interrupted::Cancelled);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Interrupted::Cancelled),
                sent = self.connection.send_frame(frame.clone()) => sent.map_err(Interrupted::Lost)?,
            }

            if !interval.is_zero() {
                deadline += interval;
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Interrupted::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
        }

        Ok(())
    }

    async fn pause(&self, duration: Duration) -> Result<(), Interrupted> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl std::fmt::Debug for GuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildSession")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
