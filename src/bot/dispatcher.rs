use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{fmt, sync::Arc};
use tracing::{info, warn};

use crate::{
    audio::{
        catalog::{ClipCatalog, ClipSummary},
        session::PlayStatus,
        voice::{PresenceLookup, VoiceConnector},
    },
    bot::{
        commands::{Command, ParseError},
        registry::SessionRegistry,
    },
    error::{PlaybackError, SessionError, UploadError},
    upload::{Attachment, Uploader},
};

/// A parsed command plus who sent it and where.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: Command,
    pub sender: UserId,
    pub channel: ChannelId,
    pub guild: GuildId,
    pub guild_name: String,
    pub attachment: Option<Attachment>,
}

/// User-visible outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Joined { guild_name: String },
    AlreadyJoined,
    NotInVoice,
    JoinFailed(String),
    Left,
    NotJoined,
    Playing { clip: String },
    Queued { clip: String, position: usize },
    ClipNotFound { clip: String },
    QueueFull { capacity: usize },
    Catalog(Vec<ClipSummary>),
    Uploaded { clip: String, frames: usize },
    UploadFailed(String),
    MissingAttachment,
    Usage(&'static str),
    Unrecognized(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Joined { guild_name } => write!(f, "¡Hola {}! 👋", guild_name),
            Reply::AlreadyJoined => f.write_str("Ya estoy en un canal de voz de este servidor."),
            Reply::NotInVoice => f.write_str("Primero tienes que entrar a un canal de voz."),
            Reply::JoinFailed(reason) => write!(f, "❌ No pude entrar al canal de voz: {}", reason),
            Reply::Left => f.write_str("👋 ¡Adiós!"),
            Reply::NotJoined => f.write_str("No estoy en ningún canal de voz. Usa `join` primero."),
            Reply::Playing { clip } => write!(f, "▶️ Reproduciendo **{}**", clip),
            Reply::Queued { clip, position } => {
                write!(f, "📋 **{}** agregado a la cola (posición {})", clip, position)
            }
            Reply::ClipNotFound { clip } => write!(f, "No encuentro {}", clip),
            Reply::QueueFull { capacity } => write!(
                f,
                "🚫 La cola está llena ({} clips). Inténtalo más tarde.",
                capacity
            ),
            Reply::Catalog(clips) => {
                let names: Vec<String> = clips.iter().map(|c| format!("-{}", c.name)).collect();
                write!(f, "{}", names.join(" "))
            }
            Reply::Uploaded { clip, .. } => write!(f, "✅ {} subido correctamente", clip),
            Reply::UploadFailed(reason) => write!(f, "❌ No se pudo subir el archivo: {}", reason),
            Reply::MissingAttachment => f.write_str("Adjunta un archivo de audio."),
            Reply::Usage(usage) => write!(f, "Uso: `{}`", usage),
            Reply::Unrecognized(_) => f.write_str("Comando no reconocido"),
        }
    }
}

impl From<ParseError> for Reply {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Unrecognized(name) => Reply::Unrecognized(name),
            ParseError::MissingArgument { usage, .. } => Reply::Usage(usage),
        }
    }
}

impl From<SessionError> for Reply {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AlreadyJoined => Reply::AlreadyJoined,
            SessionError::NotJoined => Reply::NotJoined,
            SessionError::NotInVoice => Reply::NotInVoice,
            SessionError::Connect(e) => Reply::JoinFailed(e.to_string()),
        }
    }
}

impl From<PlaybackError> for Reply {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::NotJoined => Reply::NotJoined,
            PlaybackError::ClipNotFound(clip) => Reply::ClipNotFound { clip },
            PlaybackError::QueueFull { capacity } => Reply::QueueFull { capacity },
        }
    }
}

impl From<UploadError> for Reply {
    fn from(e: UploadError) -> Self {
        Reply::UploadFailed(e.to_string())
    }
}

/// Routes commands to the registry, catalog and uploader.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    catalog: Arc<ClipCatalog>,
    uploader: Uploader,
    connector: Arc<dyn VoiceConnector>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        catalog: Arc<ClipCatalog>,
        uploader: Uploader,
        connector: Arc<dyn VoiceConnector>,
    ) -> Self {
        Self {
            registry,
            catalog,
            uploader,
            connector,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<ClipCatalog> {
        &self.catalog
    }

    /// Maneja un comando y devuelve la respuesta para el usuario.
    pub async fn handle(&self, request: CommandRequest, presence: &dyn PresenceLookup) -> Reply {
        info!(
            "📝 Comando {} usado por {} en guild {}",
            request.command, request.sender, request.guild
        );

        match request.command {
            Command::Join => self.join(request.guild, request.sender, request.guild_name, presence).await,
            Command::Leave => match self.registry.leave(request.guild).await {
                Ok(()) => Reply::Left,
                Err(e) => e.into(),
            },
            Command::Play { clip } => match self.play(request.guild, request.sender, clip) {
                Ok(reply) => reply,
                Err(e) => e.into(),
            },
            Command::List => Reply::Catalog(self.catalog.list()),
            Command::Upload => self.upload(request.attachment).await,
        }
    }

    async fn join(
        &self,
        guild: GuildId,
        sender: UserId,
        guild_name: String,
        presence: &dyn PresenceLookup,
    ) -> Reply {
        match self
            .registry
            .join(guild, sender, presence, self.connector.as_ref())
            .await
        {
            Ok(_) => Reply::Joined { guild_name },
            Err(e) => {
                if let SessionError::Connect(reason) = &e {
                    warn!("Error al unirse a voz en guild {}: {}", guild, reason);
                }
                e.into()
            }
        }
    }

    fn play(&self, guild: GuildId, sender: UserId, name: String) -> Result<Reply, PlaybackError> {
        let session = self.registry.get(guild)?;
        let clip = self
            .catalog
            .get(&name)
            .ok_or_else(|| PlaybackError::ClipNotFound(name.clone()))?;

        // El drain loop sigue solo; su resultado queda en los logs
        let (status, _drain) = session.play(clip, sender)?;
        Ok(match status {
            PlayStatus::Started => Reply::Playing { clip: name },
            PlayStatus::Queued { position } => Reply::Queued {
                clip: name,
                position,
            },
        })
    }

    async fn upload(&self, attachment: Option<Attachment>) -> Reply {
        let Some(attachment) = attachment else {
            return Reply::MissingAttachment;
        };

        match self.uploader.upload(&attachment).await {
            Ok(clip) => Reply::Uploaded {
                clip: clip.name.clone(),
                frames: clip.frames.len(),
            },
            Err(e) => {
                warn!("❌ Falló la subida de {}: {}", attachment.filename, e);
                e.into()
            }
        }
    }
}
