use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::debug;

use super::session::{PlaybackSession, SessionDeps};

/// Una sesión por guild, creada en el primer acceso y retenida mientras
/// viva el proceso.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<PlaybackSession>>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// Busca o crea la sesión del guild. Nunca falla.
    pub fn get(&self, guild_id: GuildId) -> Arc<PlaybackSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Nueva sesión para guild {}", guild_id);
                PlaybackSession::new(guild_id, self.deps.clone())
            })
            .clone()
    }

    /// Sesión existente, sin crearla
    pub fn existing(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Todos los guilds vistos
    pub fn guilds(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
