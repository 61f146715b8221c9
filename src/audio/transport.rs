use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};

use super::{error::PlayerError, transcoder::AudioStream};

/// Aviso de fin de stream etiquetado con la época del pipeline.
///
/// La sesión descarta avisos de épocas viejas, así que un pipeline
/// cancelado no puede provocar un avance extra.
#[derive(Clone)]
pub struct StreamEndSignal {
    epoch: u64,
    notify: Arc<dyn Fn(u64) + Send + Sync>,
}

impl StreamEndSignal {
    pub fn new(epoch: u64, notify: Arc<dyn Fn(u64) + Send + Sync>) -> Self {
        Self { epoch, notify }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Fin natural, error del reproductor o stream cortado
    pub fn notify(&self) {
        (self.notify)(self.epoch)
    }
}

impl fmt::Debug for StreamEndSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEndSignal")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Conexión de voz de un guild con su reproductor
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel(&self) -> ChannelId;

    /// Reemplaza lo que esté sonando por `stream`
    async fn play(&self, stream: AudioStream, gain: f32, on_end: StreamEndSignal) -> Result<(), PlayerError>;

    async fn pause(&self) -> Result<(), PlayerError>;

    async fn unpause(&self) -> Result<(), PlayerError>;

    async fn set_volume(&self, gain: f32) -> Result<(), PlayerError>;

    async fn stop(&self);

    async fn destroy(&self);
}

/// Transporte de voz (gateway de Discord)
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Puede tardar; la sesión le pone el límite de tiempo
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn VoiceConnection>, PlayerError>;

    /// Libera lo que haya quedado de un join fallido
    async fn leave(&self, guild_id: GuildId);
}
