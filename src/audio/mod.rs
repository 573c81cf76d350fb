//! # Audio Module
//!
//! Playback core of the voice memo bot.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! ### [`codec`] - Frame Container
//! - Decodes the length-prefixed Opus frame container used on disk
//! - Malformed input returns the frames decoded so far plus the error
//!
//! ### [`catalog`] - Clip Catalog
//! - Named clips loaded from the clips directory at startup
//! - Extended at runtime after an upload is converted
//!
//! ### [`queue`] - Playback Queue
//! - Bounded FIFO per guild, non-blocking enqueue
//!
//! ### [`session`] - Guild Session
//! - Owns the voice connection and queue of one guild
//! - Single drain loop guarded by a compare-and-set flag
//!
//! ### [`voice`] - Transport Seams
//! - Traits implemented by the songbird adapter and by test doubles
//!
//! ## Audio Format
//!
//! - **Codec**: Opus, passed through untouched
//! - **Frame**: 20ms (960 samples @ 48kHz, stereo)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_memo_bot::audio::{catalog::ClipCatalog, session::{GuildSession, Pacing}};
//! # use voice_memo_bot::audio::voice::VoiceConnection;
//! # use serenity::all::{ChannelId, GuildId, UserId};
//!
//! # async fn example(connection: Arc<dyn VoiceConnection>) -> anyhow::Result<()> {
//! let catalog = ClipCatalog::new("voicememo_files", "dca");
//! catalog.load_all().await?;
//!
//! let session = Arc::new(GuildSession::new(
//!     GuildId::new(1),
//!     ChannelId::new(2),
//!     connection,
//!     10,
//!     Pacing::default(),
//! ));
//! if let Some(clip) = catalog.get("hola") {
//!     session.play(clip, UserId::new(3))?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod codec;
pub mod queue;
pub mod session;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
