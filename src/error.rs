//! Error types for the voice memo bot.
//!
//! Each layer has its own `thiserror` enum so the command layer can turn any
//! failure into a user-facing reply without string matching. None of these
//! errors is fatal to the process.

use bytes::Bytes;
use thiserror::Error;

/// Why a container stopped decoding before a clean record boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    /// End of stream inside the 2-byte length prefix.
    TruncatedLength { offset: usize },
    /// End of stream inside a payload whose prefix was read.
    TruncatedPayload {
        offset: usize,
        expected: usize,
        available: usize,
    },
}

impl std::fmt::Display for Malformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Malformation::TruncatedLength { offset } => {
                write!(f, "prefijo de longitud truncado en el byte {}", offset)
            }
            Malformation::TruncatedPayload {
                offset,
                expected,
                available,
            } => write!(
                f,
                "frame truncado en el byte {}: se esperaban {} bytes, quedan {}",
                offset, expected, available
            ),
        }
    }
}

/// Frame codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The container ended mid-record. `partial` holds every frame decoded
    /// before the damage; callers decide whether that is usable.
    #[error("contenedor malformado tras {} frames: {reason}", .partial.len())]
    MalformedContainer {
        partial: Vec<Bytes>,
        reason: Malformation,
    },

    #[error("frame de {0} bytes excede el máximo de {max}", max = u16::MAX)]
    FrameTooLarge(usize),

    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a voice connection handle or its factory.
#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    #[error("conexión de voz perdida: {0}")]
    ConnectionLost(String),

    #[error("no se pudo conectar al canal de voz: {0}")]
    Connect(String),
}

/// Session registry errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("ya hay una sesión de voz activa en este servidor")]
    AlreadyJoined,

    #[error("el bot no está en un canal de voz de este servidor")]
    NotJoined,

    #[error("el usuario no está en ningún canal de voz")]
    NotInVoice,

    #[error(transparent)]
    Connect(#[from] VoiceError),
}

/// Errors raised while handling `play`.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("el bot no está en un canal de voz de este servidor")]
    NotJoined,

    #[error("no se encontró el clip {0}")]
    ClipNotFound(String),

    #[error("la cola está llena (máximo {capacity} clips)")]
    QueueFull { capacity: usize },
}

impl From<SessionError> for PlaybackError {
    fn from(_: SessionError) -> Self {
        PlaybackError::NotJoined
    }
}

/// Upload pipeline errors. None of them registers a clip.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("nombre de archivo no válido: {0}")]
    InvalidName(String),

    #[error("el archivo pesa {size} bytes, el máximo es {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("error al descargar el adjunto: {0}")]
    Download(String),

    #[error("error al convertir el audio: {0}")]
    Transcode(String),

    #[error("el archivo convertido no es válido: {0}")]
    Decode(#[from] CodecError),

    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Download(e.to_string())
    }
}
