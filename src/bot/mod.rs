//! # Bot Module
//!
//! Discord side of the voice memo bot.
//!
//! - [`commands`]: closed set of chat commands and their parser
//! - [`dispatcher`]: maps each command to the core and produces a [`Reply`]
//! - [`registry`]: one [`GuildSession`](crate::audio::session::GuildSession) per guild
//! - [`voice`]: serenity/songbird implementations of the voice seams
//!
//! [`VoiceMemoBot`] implements serenity's [`EventHandler`]: it reads prefixed
//! chat messages, hands them to the dispatcher and renders the reply.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, CreateMessage, EventHandler, Message, Ready, VoiceState},
    async_trait,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};

pub mod commands;
pub mod dispatcher;
pub mod registry;
pub mod voice;

use crate::{
    config::Config,
    ui::embeds::create_catalog_embed,
    upload::Attachment,
};
use commands::Command;
use dispatcher::{CommandRequest, Dispatcher, Reply};
use voice::CachePresence;

pub struct VoiceMemoBot {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
}

impl VoiceMemoBot {
    pub fn new(config: Arc<Config>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { config, dispatcher }
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.config.frame_duration_ms)
    }

    async fn send_reply(&self, ctx: &Context, channel_id: ChannelId, reply: Reply) -> Result<()> {
        match reply {
            Reply::Catalog(clips) => {
                let embed = create_catalog_embed(&clips, self.frame_duration());
                channel_id
                    .send_message(&ctx.http, CreateMessage::new().embed(embed))
                    .await?;
            }
            other => {
                channel_id.say(&ctx.http, other.to_string()).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for VoiceMemoBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!(
            "📚 {} clips disponibles, prefijo {:?}",
            self.dispatcher.catalog().len(),
            self.config.command_prefix
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(parsed) = Command::from_message(&msg.content, &self.config.command_prefix) else {
            return;
        };

        let reply = match parsed {
            Ok(command) => {
                let request = CommandRequest {
                    command,
                    sender: msg.author.id,
                    channel: msg.channel_id,
                    guild: guild_id,
                    guild_name: guild_id.name(&ctx.cache).unwrap_or_default(),
                    attachment: msg.attachments.first().map(|a| Attachment {
                        url: a.url.clone(),
                        filename: a.filename.clone(),
                        size: u64::from(a.size),
                    }),
                };
                let presence = CachePresence::new(ctx.cache.clone());
                self.dispatcher.handle(request, &presence).await
            }
            Err(e) => {
                debug!("Comando inválido de {}: {:?}", msg.author.id, e);
                Reply::from(e)
            }
        };

        if let Err(e) = self.send_reply(&ctx, msg.channel_id, reply).await {
            error!("Error al responder en canal {}: {:?}", msg.channel_id, e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado por otro usuario
        if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() || old.is_none() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let registry = self.dispatcher.registry();
        if registry.get(guild_id).is_ok() {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            let _ = registry.leave(guild_id).await;
        }
    }
}
