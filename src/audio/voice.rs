//! Voice transport seams.
//!
//! The core never talks to Discord directly. It receives a connection handle
//! from a [`VoiceConnector`] and asks a [`PresenceLookup`] where the requesting
//! user is sitting. The songbird/serenity implementations live in
//! [`crate::bot::voice`].

use async_trait::async_trait;
use bytes::Bytes;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;

use crate::error::VoiceError;

/// Handle to one live voice connection.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Sends one encoded frame. May wait while the transport applies
    /// backpressure.
    async fn send_frame(&self, frame: Bytes) -> Result<(), VoiceError>;

    async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError>;

    async fn disconnect(&self) -> Result<(), VoiceError>;
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;
}

/// Busca el canal de voz en el que está un usuario dentro de una guild.
#[cfg_attr(test, mockall::automock)]
pub trait PresenceLookup: Send + Sync {
    fn voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
}
