//! Songbird and serenity implementations of the voice seams.
//!
//! Each speaking episode becomes one songbird track. The track reads a live
//! DCA1 stream: a JSON header followed by the same length-prefixed frames the
//! clips are stored in, fed one frame at a time over a bounded channel so the
//! drain loop feels backpressure from the mixer.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serenity::{
    async_trait,
    cache::Cache,
    model::id::{ChannelId, GuildId, UserId},
};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    Call, Songbird,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
    time::Duration,
};
use symphonia::core::{io::MediaSource, probe::Hint};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        codec,
        voice::{PresenceLookup, VoiceConnection, VoiceConnector},
    },
    error::VoiceError,
};

/// Presence from serenity's gateway cache.
pub struct CachePresence {
    cache: Arc<Cache>,
}

impl CachePresence {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

impl PresenceLookup for CachePresence {
    fn voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = self.cache.guild(guild_id)?;
        guild.voice_states.get(&user_id)?.channel_id
    }
}

/// Joins voice channels through the songbird manager registered on the client.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    frame_buffer: usize,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, frame_buffer: usize) -> Self {
        Self {
            manager,
            frame_buffer: frame_buffer.max(1),
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))?;

        // Sordo: el bot nunca escucha el canal
        if let Err(e) = call.lock().await.deafen(true).await {
            warn!("No se pudo ensordecer el bot en guild {}: {:?}", guild_id, e);
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdConnection {
            guild_id,
            manager: self.manager.clone(),
            call,
            frames: Mutex::new(None),
            frame_buffer: self.frame_buffer,
        }))
    }
}

/// One joined voice channel.
pub struct SongbirdConnection {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    /// Present while speaking; dropping it ends the current track.
    frames: Mutex<Option<flume::Sender<Bytes>>>,
    frame_buffer: usize,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn send_frame(&self, frame: Bytes) -> Result<(), VoiceError> {
        let sender = self
            .frames
            .lock()
            .clone()
            .ok_or_else(|| VoiceError::ConnectionLost("no hay pista activa".into()))?;

        sender
            .send_async(frame)
            .await
            .map_err(|_| VoiceError::ConnectionLost("la pista de voz se cerró".into()))
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
        if !speaking {
            if self.frames.lock().take().is_some() {
                debug!("🔇 Fin de pista en guild {}", self.guild_id);
            }
            return Ok(());
        }

        let (sender, receiver) = flume::bounded(self.frame_buffer);
        let stream = AudioStream {
            input: Box::new(DcaStream::new(receiver)) as Box<dyn MediaSource>,
            hint: Some(dca_hint()),
        };

        let mut call = self.call.lock().await;
        if call.current_connection().is_none() {
            return Err(VoiceError::ConnectionLost("sin conexión de voz".into()));
        }
        call.play_only_input(Input::Live(LiveInput::Raw(stream), None));
        *self.frames.lock() = Some(sender);

        debug!("🔈 Nueva pista en guild {}", self.guild_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.frames.lock().take();
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| VoiceError::ConnectionLost(e.to_string()))
    }
}

fn dca_hint() -> Hint {
    let mut hint = Hint::new();
    hint.with_extension("dca");
    hint
}

/// DCA1 header announcing 48kHz stereo Opus in 20ms frames.
fn dca_header() -> Vec<u8> {
    let metadata = serde_json::json!({
        "dca": {
            "version": 1,
            "tool": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "url": null,
                "author": null,
            },
        },
        "opus": {
            "mode": "music",
            "sample_rate": 48000,
            "frame_size": 960,
            "abr": null,
            "vbr": true,
            "channels": 2,
        },
    })
    .to_string();

    let mut header = Vec::with_capacity(8 + metadata.len());
    header.extend_from_slice(b"DCA1");
    header.extend_from_slice(&(metadata.len() as i32).to_le_bytes());
    header.extend_from_slice(metadata.as_bytes());
    header
}

/// Opus frame the decoder reads as 20ms of silence.
const SILENCE_FRAME: &[u8] = &[0xF8, 0xFF, 0xFE];

/// Longest a read waits for a frame before handing the mixer silence.
const FRAME_WAIT: Duration = Duration::from_millis(20);

/// Reader over the frame channel. Ends when the sender is dropped.
///
/// Songbird reads this on the call's mixer thread. Between paced frames and
/// during the gap between clips a read waits at most [`FRAME_WAIT`] and then
/// yields a silence frame, so the mixer keeps ticking and handles control
/// events for the call.
struct DcaStream {
    pending: Bytes,
    frames: flume::Receiver<Bytes>,
}

impl DcaStream {
    fn new(frames: flume::Receiver<Bytes>) -> Self {
        Self {
            pending: Bytes::from(dca_header()),
            frames,
        }
    }
}

impl Read for DcaStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            let frame = match self.frames.recv_timeout(FRAME_WAIT) {
                Ok(frame) => frame,
                Err(flume::RecvTimeoutError::Timeout) => Bytes::from_static(SILENCE_FRAME),
                Err(flume::RecvTimeoutError::Disconnected) => return Ok(0),
            };
            let mut record = BytesMut::with_capacity(codec::LENGTH_PREFIX + frame.len());
            codec::put_frame(&mut record, &frame)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.pending = record.freeze();
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        Ok(n)
    }
}

impl Seek for DcaStream {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream en vivo sin seek",
        ))
    }
}

impl MediaSource for DcaStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
