//! Upload pipeline.
//!
//! An uploaded attachment is downloaded, converted to the frame container by
//! the external `ffmpeg | dca` pair, decoded, and only then registered in the
//! catalog. Every upload converts into its own temporary file in the clips
//! directory and persists it over `<name>.<ext>` after it decodes, so two
//! uploads of the same name never share a file, a bad conversion never
//! replaces a good clip on disk, and a partial one is never registered.

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, LazyLock},
};
use tokio::{fs, io::AsyncWriteExt, process::Command};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        catalog::{Clip, ClipCatalog},
        codec,
    },
    config::Config,
    error::UploadError,
};

static CLIP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("regex de nombre de clip"));

/// Adjunto de un mensaje de Discord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub size: u64,
}

/// Produces a frame container at `destination` from an attachment.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, attachment: &Attachment, destination: &Path) -> Result<(), UploadError>;
}

/// Clip name for an uploaded file: everything before the first `.`.
pub fn clip_name_from_filename(filename: &str) -> Result<String, UploadError> {
    let name = filename.split('.').next().unwrap_or_default().trim();
    if CLIP_NAME.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(UploadError::InvalidName(filename.to_string()))
    }
}

pub struct Uploader {
    catalog: Arc<ClipCatalog>,
    transcoder: Arc<dyn Transcoder>,
}

impl Uploader {
    pub fn new(catalog: Arc<ClipCatalog>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            catalog,
            transcoder,
        }
    }

    /// Convierte y registra un adjunto como clip nuevo.
    pub async fn upload(&self, attachment: &Attachment) -> Result<Arc<Clip>, UploadError> {
        let name = clip_name_from_filename(&attachment.filename)?;
        let destination = self.catalog.path_for(&name);

        info!("⬆️ Subiendo {} como clip {}", attachment.filename, name);

        // Se borra sola si algo falla antes del persist
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".part")
            .tempfile_in(self.catalog.dir())?;

        self.transcoder.transcode(attachment, staging.path()).await?;
        let frames = codec::decode_file(staging.path()).await?;

        staging
            .persist(&destination)
            .map_err(|e| UploadError::Io(e.error))?;
        let clip = Arc::new(Clip::new(name, frames));
        self.catalog.insert(clip.clone());

        info!("✅ Clip {} listo ({} frames)", clip.name, clip.frames.len());
        Ok(clip)
    }
}

/// Downloads over HTTP and converts with `ffmpeg -f s16le -ar 48000 -ac 2 | dca`.
pub struct FfmpegTranscoder {
    http: reqwest::Client,
    ffmpeg: String,
    dca: String,
    work_dir: PathBuf,
    max_bytes: u64,
}

impl FfmpegTranscoder {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            ffmpeg: config.ffmpeg_bin.clone(),
            dca: config.dca_bin.clone(),
            work_dir: config.clips_dir.clone(),
            max_bytes: config.max_upload_bytes,
        }
    }

    async fn download(&self, url: &str, path: &Path) -> Result<(), UploadError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let mut file = fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(UploadError::TooLarge {
                    size: written,
                    max: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        debug!("📥 Descargados {} bytes en {}", written, path.display());
        Ok(())
    }

    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), UploadError> {
        let output = std::fs::File::create(destination)?;

        let mut ffmpeg = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(source)
            .args(["-f", "s16le", "-ar", "48000", "-ac", "2", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| UploadError::Transcode(format!("no se pudo ejecutar {}: {}", self.ffmpeg, e)))?;

        let pcm: Stdio = ffmpeg
            .stdout
            .take()
            .ok_or_else(|| UploadError::Transcode("ffmpeg sin stdout".into()))?
            .try_into()?;

        let mut dca = Command::new(&self.dca)
            .stdin(pcm)
            .stdout(Stdio::from(output))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| UploadError::Transcode(format!("no se pudo ejecutar {}: {}", self.dca, e)))?;

        let (ffmpeg_status, dca_status) = tokio::try_join!(ffmpeg.wait(), dca.wait())?;
        if !ffmpeg_status.success() {
            return Err(UploadError::Transcode(format!("ffmpeg terminó con {}", ffmpeg_status)));
        }
        if !dca_status.success() {
            return Err(UploadError::Transcode(format!("dca terminó con {}", dca_status)));
        }
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, attachment: &Attachment, destination: &Path) -> Result<(), UploadError> {
        if attachment.size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: attachment.size,
                max: self.max_bytes,
            });
        }

        let download = tempfile::Builder::new()
            .prefix(".subida.")
            .suffix(".download")
            .tempfile_in(&self.work_dir)?;

        self.download(&attachment.url, download.path()).await?;
        let result = self.convert(download.path(), destination).await;

        if let Err(e) = download.close() {
            warn!("No se pudo borrar la descarga: {}", e);
        }
        result
    }
}
