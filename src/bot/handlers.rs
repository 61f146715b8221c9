use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{ControlOutcome, Enqueued, PlayerError, Requester, Track},
    bot::JukeboxBot,
    ui::embeds,
};

/// Canciones mostradas por `/history`
const HISTORY_PAGE: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => {
            let outcome = bot.registry.get(guild_id).pause().await;
            reply_outcome(ctx, &command, outcome, "⏸️ Reproducción pausada").await?
        }
        "resume" => {
            let outcome = bot.registry.get(guild_id).resume().await;
            reply_outcome(ctx, &command, outcome, "▶️ Reproducción reanudada").await?
        }
        "skip" => {
            let outcome = bot.registry.get(guild_id).skip().await;
            reply_outcome(ctx, &command, outcome, "⏭️ Canción saltada").await?
        }
        "stop" => {
            bot.registry.get(guild_id).stop().await;
            reply(ctx, &command, "⏹️ Reproducción detenida y cola vaciada").await?
        }
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "clear" => {
            let cleared = bot.registry.get(guild_id).clear_queue().await;
            reply(ctx, &command, &format!("🗑️ Cola limpiada: {} canciones removidas", cleared)).await?
        }
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "filter" => handle_filter(ctx, &command, bot, guild_id).await?,
        "history" => {
            let entries = bot.history.recent(guild_id, HISTORY_PAGE).await;
            reply_embed(ctx, &command, embeds::create_history_embed(&entries), false).await?
        }
        _ => {
            reply_embed(
                ctx,
                &command,
                embeds::create_error_embed("Comando no reconocido", "Ese comando no existe"),
                true,
            )
            .await?
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot, guild_id: GuildId) -> Result<()> {
    let query = string_option(command, "query").ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    let Some(voice_channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_embed(
            ctx,
            command,
            embeds::create_error_embed("Sin canal de voz", "Debes estar en un canal de voz"),
            true,
        )
        .await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let entries = match bot.lookup.lookup(&query).await {
        Ok(entries) if !entries.is_empty() => entries,
        Ok(_) => {
            return edit_embed(ctx, command, embeds::create_error_embed("Sin resultados", "No se encontró nada para esa búsqueda")).await;
        }
        Err(e) => {
            warn!("⚠️ Búsqueda fallida para {}: {:#}", query, e);
            return edit_embed(ctx, command, embeds::create_error_embed("Error de búsqueda", "No se pudo obtener el audio")).await;
        }
    };

    let session = bot.registry.get(guild_id);
    if let Err(e) = session.connect(voice_channel_id).await {
        return edit_embed(ctx, command, embeds::create_error_embed("Error de conexión", &e.to_string())).await;
    }

    let tracks: Vec<Track> = entries
        .into_iter()
        .map(|entry| {
            Track::new(entry.url, entry.title, Requester::User(command.user.id))
                .with_duration(entry.duration_secs)
                .with_notify(command.channel_id)
        })
        .collect();

    if let [track] = tracks.as_slice() {
        let embed = match session.enqueue(track.clone()).await {
            Ok(Enqueued::Started) => embeds::create_success_embed("Reproduciendo", &format!("**{}**", track.title())),
            Ok(Enqueued::Queued(position)) => embeds::create_track_added_embed(track, position),
            Err(e) => embeds::create_error_embed("No se pudo agregar", &e.to_string()),
        };
        return edit_embed(ctx, command, embed).await;
    }

    let mut added = 0;
    let mut skipped = 0;
    for track in tracks {
        match session.enqueue(track).await {
            Ok(_) => added += 1,
            Err(PlayerError::QueueFull(_)) => skipped += 1,
            Err(e) => {
                warn!("⚠️ Error agregando track de playlist en guild {}: {}", guild_id, e);
                skipped += 1;
            }
        }
    }

    info!("📋 Playlist en guild {}: {} agregadas, {} descartadas", guild_id, added, skipped);
    edit_embed(ctx, command, embeds::create_playlist_added_embed(added, skipped)).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot, guild_id: GuildId) -> Result<()> {
    let page = integer_option(command, "page")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(1);

    let snapshot = bot.registry.get(guild_id).snapshot().await;
    reply_embed(ctx, command, embeds::create_status_embed(&snapshot, page), false).await
}

async fn handle_volume(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot, guild_id: GuildId) -> Result<()> {
    let level = integer_option(command, "level")
        .ok_or_else(|| anyhow::anyhow!("Nivel de volumen no especificado"))?
        .clamp(0, 100) as u8;

    let applied = bot.registry.get(guild_id).set_volume(level).await;
    reply(ctx, command, &format!("🔊 Volumen ajustado a {}%", applied)).await
}

async fn handle_filter(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot, guild_id: GuildId) -> Result<()> {
    let spec = string_option(command, "tipo").ok_or_else(|| anyhow::anyhow!("Filtro no especificado"))?;
    let persist = bool_option(command, "mantener").unwrap_or(false);

    let outcome = bot.registry.get(guild_id).apply_filter(&spec, persist).await;
    let message = if persist {
        "🎛️ Filtro aplicado (se mantiene en las siguientes canciones)"
    } else {
        "🎛️ Filtro aplicado a la canción actual"
    };
    reply_outcome(ctx, command, outcome, message).await
}

// Funciones auxiliares

fn option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a CommandDataOptionValue> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .map(|opt| &opt.value)
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    option(command, name).and_then(|v| v.as_str()).map(str::to_string)
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    option(command, name).and_then(|v| v.as_i64())
}

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    option(command, name).and_then(|v| v.as_bool())
}

/// Canal de voz del usuario según la caché; la guarda se suelta al salir
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;
    Ok(())
}

async fn reply_outcome(
    ctx: &Context,
    command: &CommandInteraction,
    outcome: ControlOutcome,
    applied: &str,
) -> Result<()> {
    if outcome.applied() {
        reply(ctx, command, applied).await
    } else {
        reply_embed(
            ctx,
            command,
            embeds::create_error_embed("Nada que hacer", "No hay nada reproduciéndose ahora"),
            true,
        )
        .await
    }
}

async fn reply_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn edit_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}
