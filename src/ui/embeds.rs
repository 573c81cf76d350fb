use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::catalog::ClipSummary;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const INFO_CYAN: Colour = Colour::from_rgb(0, 255, 255);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎙️ Voice Memo Bot";

/// Discord corta la descripción de un embed en 4096 caracteres.
const MAX_DESCRIPTION: usize = 4000;

/// Crea el embed con la lista de clips
pub fn create_catalog_embed(clips: &[ClipSummary], frame_duration: Duration) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📼 Lista de todos los clips")
        .timestamp(Timestamp::now());

    if clips.is_empty() {
        return embed
            .description("😴 **No hay clips todavía**\n\n💡 Usa `upload` con un archivo de audio adjunto")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let (description, shown) = catalog_description(clips, frame_duration);
    let footer = if shown < clips.len() {
        format!("{} • mostrando {} de {} clips", STANDARD_FOOTER, shown, clips.len())
    } else {
        format!("{} • {} clips", STANDARD_FOOTER, clips.len())
    };

    embed
        .description(description)
        .color(colors::INFO_CYAN)
        .footer(CreateEmbedFooter::new(footer))
}

/// One line per clip, `-name` as typed in `play`. Stops before the embed
/// limit and returns how many clips made it in.
fn catalog_description(clips: &[ClipSummary], frame_duration: Duration) -> (String, usize) {
    let mut description = String::new();
    let mut shown = 0;

    for clip in clips {
        let line = format!(
            "`-{}` • {}\n",
            clip.name,
            format_duration(clip.duration(frame_duration))
        );
        if description.len() + line.len() > MAX_DESCRIPTION {
            break;
        }
        description.push_str(&line);
        shown += 1;
    }

    (description, shown)
}

/// Formatea una duración en formato legible
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(name: &str, frames: usize) -> ClipSummary {
        ClipSummary {
            name: name.to_string(),
            frames,
        }
    }

    #[test]
    fn lists_names_with_dash_and_duration() {
        let clips = [summary("hola", 150), summary("adios", 3050)];
        let (text, shown) = catalog_description(&clips, Duration::from_millis(20));

        assert_eq!(shown, 2);
        assert_eq!(text, "`-hola` • 0:03\n`-adios` • 1:01\n");
    }

    #[test]
    fn long_catalogs_are_cut_before_the_limit() {
        let clips: Vec<_> = (0..500).map(|i| summary(&format!("clip_numero_{}", i), 50)).collect();
        let (text, shown) = catalog_description(&clips, Duration::from_millis(20));

        assert!(text.len() <= MAX_DESCRIPTION);
        assert!(shown < clips.len());
        assert_eq!(text.lines().count(), shown);
    }

    #[test]
    fn formats_hours() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }
}
