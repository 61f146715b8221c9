use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        clock::format_duration,
        queue::page_of,
        Requester, SessionSnapshot, SessionStatus, Track,
    },
    storage::HistoryEntry,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

const ITEMS_PER_PAGE: usize = 10;
const PROGRESS_SEGMENTS: usize = 20;

fn requester_label(requester: Requester) -> String {
    match requester {
        Requester::User(id) => format!("<@{}>", id),
        Requester::Recommendation => "✨ Recomendación".to_string(),
    }
}

fn duration_label(secs: u64) -> String {
    if secs == 0 {
        "🔴 En vivo".to_string()
    } else {
        format_duration(secs)
    }
}

/// Barra de progreso; sin duración conocida queda vacía
pub fn progress_bar(elapsed: Duration, duration_secs: u64) -> String {
    let filled = if duration_secs == 0 {
        0
    } else {
        let ratio = elapsed.as_secs_f64() / duration_secs as f64;
        ((ratio.min(1.0)) * PROGRESS_SEGMENTS as f64) as usize
    };

    let bar = "█".repeat(filled) + &"▒".repeat(PROGRESS_SEGMENTS - filled);
    format!("`[{}]`", bar)
}

fn status_header(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Playing => "▶️ Reproduciendo",
        SessionStatus::Paused => "⏸️ En pausa",
        SessionStatus::Connecting => "🔌 Conectando",
        SessionStatus::Idle => "😴 Sin reproducción",
    }
}

fn track_line(position: usize, track: &Track) -> String {
    format!(
        "**{}**. {} `[{}]` · {}\n",
        position,
        track.title(),
        duration_label(track.duration_secs()),
        requester_label(track.requester())
    )
}

/// Estado de la sesión: track actual, progreso, cola paginada y ajustes
pub fn create_status_embed(snapshot: &SessionSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(match snapshot.status {
            SessionStatus::Playing => colors::SUCCESS_GREEN,
            SessionStatus::Paused => colors::WARNING_ORANGE,
            SessionStatus::Connecting => colors::INFO_BLUE,
            SessionStatus::Idle => colors::NEUTRAL_GRAY,
        });

    match &snapshot.current {
        Some(current) => {
            let mut now_playing = format!(
                "**{}**\n{} {} / {}",
                current.title(),
                progress_bar(snapshot.elapsed, current.duration_secs()),
                format_duration(snapshot.elapsed.as_secs()),
                duration_label(current.duration_secs())
            );
            if let Some(remaining) = snapshot.remaining {
                now_playing.push_str(&format!("\n⏳ Restante: {}", format_duration(remaining.as_secs())));
            }
            now_playing.push_str(&format!("\n👤 {}", requester_label(current.requester())));

            embed = embed.field(status_header(snapshot.status), now_playing, false);
        }
        None if snapshot.queue.is_empty() => {
            let mut description = "😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música".to_string();
            if snapshot.awaiting_recommendation {
                description.push_str("\n\n✨ Esperando que elijas una recomendación");
            }
            return embed
                .description(description)
                .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
                .timestamp(Timestamp::now());
        }
        None => {
            embed = embed.field(status_header(snapshot.status), "Nada sonando ahora", false);
        }
    }

    let queue_page = page_of(&snapshot.queue, page, ITEMS_PER_PAGE);
    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, track)| track_line(queue_page.first_index + i + 1, track))
            .collect();
        embed = embed.field("Próximas canciones", description, false);
    }

    let total_secs: u64 = snapshot.queue.iter().map(Track::duration_secs).sum();
    let mut info = format!("**Total:** {} canciones", snapshot.queue.len());
    if total_secs > 0 {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total_secs)));
    }
    info.push_str(&format!(" • 🔊 {}%", snapshot.volume));
    if !snapshot.filters.is_empty() {
        info.push_str(&format!(
            " • 🎛️ `{}`{}",
            snapshot.filters.join(","),
            if snapshot.persist_filters { " (fijo)" } else { "" }
        ));
    }
    if let Some(channel) = snapshot.channel {
        info.push_str(&format!(" • <#{}>", channel));
    }
    embed = embed.field("Información", info, false);

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • Guild Jukebox",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola de reproducción", track.title()))
        .field("⏱️ Duración", duration_label(track.duration_secs()), true)
        .field("📍 Posición", (position + 1).to_string(), true)
        .field("👤 Solicitado por", requester_label(track.requester()), true)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("🎵 Se reproducirá automáticamente cuando le toque"))
}

/// Crea un embed para una playlist cargada
pub fn create_playlist_added_embed(added: usize, skipped: usize) -> CreateEmbed {
    let mut description = format!("📋 **{}** canciones agregadas a la cola", added);
    if skipped > 0 {
        description.push_str(&format!("\n⚠️ {} no entraron (cola llena)", skipped));
    }

    CreateEmbed::default()
        .title("✅ Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Últimas reproducciones del servidor
pub fn create_history_embed(entries: &[HistoryEntry]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🕘 Historial de Reproducción")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now());

    if entries.is_empty() {
        return embed.description("Todavía no se reprodujo nada en este servidor");
    }

    let description: String = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "**{}**. [{}]({}) · {} · <t:{}:R>\n",
                i + 1,
                entry.title,
                entry.source_ref,
                requester_label(entry.requester),
                entry.played_at.timestamp()
            )
        })
        .collect();

    embed.description(description)
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
