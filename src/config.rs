use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::{queue::DEFAULT_CAPACITY, session::Pacing};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Clips
    pub clips_dir: PathBuf,
    pub clip_extension: String,

    // Reproducción
    pub max_queue_size: usize,
    pub frame_duration_ms: u64,
    pub clip_gap_ms: u64,
    pub voice_frame_buffer: usize,

    // Subidas
    pub ffmpeg_bin: String,
    pub dca_bin: String,
    pub max_upload_bytes: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            // Clips
            clips_dir: std::env::var("CLIPS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.clips_dir),
            clip_extension: std::env::var("CLIP_EXTENSION").unwrap_or(defaults.clip_extension),

            // Reproducción
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| defaults.max_queue_size.to_string())
                .parse()?,
            frame_duration_ms: std::env::var("FRAME_DURATION_MS")
                .unwrap_or_else(|_| defaults.frame_duration_ms.to_string()) // 20ms @ 48kHz
                .parse()?,
            clip_gap_ms: std::env::var("CLIP_GAP_MS")
                .unwrap_or_else(|_| defaults.clip_gap_ms.to_string())
                .parse()?,
            voice_frame_buffer: std::env::var("VOICE_FRAME_BUFFER")
                .unwrap_or_else(|_| defaults.voice_frame_buffer.to_string())
                .parse()?,

            // Subidas
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            dca_bin: std::env::var("DCA_BIN").unwrap_or(defaults.dca_bin),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| defaults.max_upload_bytes.to_string())
                .parse()?,
        };

        // Create the clips directory if it doesn't exist
        std::fs::create_dir_all(&config.clips_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue size and voice frame buffer must be greater than 0
    /// - Command prefix and clip extension must not be empty
    /// - Frame duration must not exceed 120ms (largest Opus frame)
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.voice_frame_buffer == 0 {
            anyhow::bail!("Voice frame buffer must be greater than 0");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        if self.clip_extension.is_empty() || self.clip_extension.contains('.') {
            anyhow::bail!("Clip extension must be non-empty and without dots, got: {:?}", self.clip_extension);
        }

        if self.frame_duration_ms > 120 {
            anyhow::bail!("Frame duration cannot exceed 120ms, got: {}", self.frame_duration_ms);
        }

        Ok(())
    }

    /// Pacing derived from the frame duration and clip gap.
    pub fn pacing(&self) -> Pacing {
        Pacing {
            frame_interval: Duration::from_millis(self.frame_duration_ms),
            clip_gap: Duration::from_millis(self.clip_gap_ms),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix {:?}\n  \
            Clips: {} (*.{})\n  \
            Playback: {} queue, {}ms frames, {}ms gap, {} frame buffer\n  \
            Uploads: {} | {}, max {} bytes",
            self.command_prefix,
            self.clips_dir.display(),
            self.clip_extension,
            self.max_queue_size,
            self.frame_duration_ms,
            self.clip_gap_ms,
            self.voice_frame_buffer,
            self.ffmpeg_bin,
            self.dca_bin,
            self.max_upload_bytes
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (token must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            clips_dir: "voicememo_files".into(),
            clip_extension: "dca".to_string(),

            max_queue_size: DEFAULT_CAPACITY,
            frame_duration_ms: 20,
            clip_gap_ms: 100,
            voice_frame_buffer: 50, // ~1s de audio

            ffmpeg_bin: "ffmpeg".to_string(),
            dca_bin: "dca".to_string(),
            max_upload_bytes: 8 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(config.pacing(), Pacing::default());
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            Config { max_queue_size: 0, ..Config::default() },
            Config { voice_frame_buffer: 0, ..Config::default() },
            Config { command_prefix: " ".into(), ..Config::default() },
            Config { clip_extension: ".dca".into(), ..Config::default() },
            Config { frame_duration_ms: 500, ..Config::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{}", config.summary());
        }
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secreto".into(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secreto"));
    }
}
