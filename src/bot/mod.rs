//! # Bot Module
//!
//! Discord-facing adapters for the playback core.
//!
//! - [`JukeboxBot`] implements Serenity's [`EventHandler`]: it registers the
//!   slash commands, routes interactions to [`handlers`] and watches voice
//!   state updates for the empty-channel teardown.
//! - [`voice`] implements the voice transport on top of Songbird.
//! - [`notifier`] sends text notices and runs the select-menu prompt used by
//!   the recommendation flow.
//!
//! The handler holds no playback state of its own; everything goes through
//! the [`SessionRegistry`].

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;
pub mod voice;

use crate::{
    audio::SessionRegistry,
    config::Config,
    sources::YtDlpResolver,
    storage::JsonHistory,
};
use notifier::DiscordNotifier;

/// Handler principal del bot
pub struct JukeboxBot {
    config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub history: Arc<JsonHistory>,
    /// Expande búsquedas y playlists en tracks
    pub lookup: Arc<YtDlpResolver>,
    notifier: Arc<DiscordNotifier>,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        history: Arc<JsonHistory>,
        lookup: Arc<YtDlpResolver>,
        notifier: Arc<DiscordNotifier>,
    ) -> Self {
        Self {
            config,
            registry,
            history,
            lookup,
            notifier,
        }
    }

    /// Registra los comandos slash, por guild si hay `GUILD_ID` configurado.
    ///
    /// Los comandos de guild se propagan en segundos; los globales pueden
    /// tardar hasta una hora.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

/// Personas (sin contar al bot) en el canal de voz del bot.
///
/// `None` si el bot no está en un canal o la guild no está en caché.
fn listeners_with_bot(ctx: &Context, guild_id: GuildId, bot_id: UserId) -> Option<(ChannelId, usize)> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild.voice_states.get(&bot_id)?.channel_id?;

    let listeners = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .count();
    Some((channel_id, listeners))
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        self.notifier.attach(ctx.clone());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        // los menús de selección los consume el collector del notificador
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(session) = self.registry.existing(guild_id) else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        // Bot desconectado desde afuera
        if new.user_id == bot_id && new.channel_id.is_none() && old.is_some() {
            if session.snapshot().await.channel.is_some() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                session.stop().await;
            }
            return;
        }

        let Some((channel_id, listeners)) = listeners_with_bot(&ctx, guild_id, bot_id) else {
            return;
        };

        if listeners == 0 {
            debug!("🚪 Canal {} quedó vacío en guild {}", channel_id, guild_id);
            session.handle_channel_empty().await;
        }
    }
}
