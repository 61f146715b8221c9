use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream as RawStream, Input, LiveInput},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use symphonia::core::{
    io::{MediaSource, ReadOnlySource},
    probe::Hint,
};
use tracing::{debug, info, warn};

use crate::audio::{
    error::PlayerError,
    transcoder::AudioStream,
    transport::{StreamEndSignal, VoiceConnection, VoiceTransport},
};

type Connections = Arc<DashMap<GuildId, Arc<SongbirdConnection>>>;

/// Transporte de voz sobre songbird. Mantiene una conexión por guild.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    connections: Connections,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            connections: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn VoiceConnection>, PlayerError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::Connection(e.to_string()))?;

        // songbird mueve la llamada existente; se reutiliza la conexión para
        // no perder el handle del track que está sonando
        if let Some(existing) = self.connections.get(&guild_id) {
            *existing.channel.lock() = channel_id;
            info!("🔀 Conexión movida al canal {} en guild {}", channel_id, guild_id);
            let connection: Arc<dyn VoiceConnection> = existing.clone();
            return Ok(connection);
        }

        let connection = Arc::new(SongbirdConnection {
            guild_id,
            channel: Mutex::new(channel_id),
            call,
            current: Mutex::new(None),
            manager: self.manager.clone(),
            connections: self.connections.clone(),
        });
        self.connections.insert(guild_id, connection.clone());

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        let connection: Arc<dyn VoiceConnection> = connection;
        Ok(connection)
    }

    async fn leave(&self, guild_id: GuildId) {
        self.connections.remove(&guild_id);
        if let Err(e) = self.manager.remove(guild_id).await {
            debug!("Nada que liberar en guild {}: {:?}", guild_id, e);
        }
    }
}

/// Llamada de songbird más el handle del track que está sonando
pub struct SongbirdConnection {
    guild_id: GuildId,
    channel: Mutex<ChannelId>,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Mutex<Option<TrackHandle>>,
    manager: Arc<Songbird>,
    connections: Connections,
}

impl SongbirdConnection {
    fn current(&self) -> Result<TrackHandle, PlayerError> {
        self.current.lock().clone().ok_or(PlayerError::NotConnected)
    }

    fn stop_current(&self) {
        if let Some(handle) = self.current.lock().take() {
            // el End que dispara trae una época vieja y la sesión lo ignora
            if let Err(e) = handle.stop() {
                debug!("Track ya terminado en guild {}: {:?}", self.guild_id, e);
            }
        }
    }
}

/// Ogg/Opus desde ffmpeg como entrada en vivo para el driver
fn into_input(stream: AudioStream) -> Input {
    let mut hint = Hint::new();
    hint.with_extension(stream.container());

    let source: Box<dyn MediaSource> = Box::new(ReadOnlySource::new(stream.into_reader()));
    Input::Live(
        LiveInput::Raw(RawStream {
            input: source,
            hint: Some(hint),
        }),
        None,
    )
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel(&self) -> ChannelId {
        *self.channel.lock()
    }

    async fn play(&self, stream: AudioStream, gain: f32, on_end: StreamEndSignal) -> Result<(), PlayerError> {
        self.stop_current();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(into_input(stream))
        };

        if let Err(e) = handle.set_volume(gain) {
            warn!("⚠️ Volumen inicial no aplicado en guild {}: {:?}", self.guild_id, e);
        }

        *self.current.lock() = Some(handle.clone());

        let epoch = on_end.epoch();
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    StreamEndHandler {
                        guild_id: self.guild_id,
                        signal: on_end.clone(),
                    },
                )
                .map_err(|e| PlayerError::Pipeline(format!("no se pudo registrar el evento: {}", e)))?;
        }

        debug!("▶️ Track #{} entregado al driver en guild {}", epoch, self.guild_id);
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.current()?
            .pause()
            .map_err(|e| PlayerError::Pipeline(e.to_string()))
    }

    async fn unpause(&self) -> Result<(), PlayerError> {
        self.current()?
            .play()
            .map_err(|e| PlayerError::Pipeline(e.to_string()))
    }

    async fn set_volume(&self, gain: f32) -> Result<(), PlayerError> {
        self.current()?
            .set_volume(gain)
            .map_err(|e| PlayerError::Pipeline(e.to_string()))
    }

    async fn stop(&self) {
        self.stop_current();
    }

    async fn destroy(&self) {
        self.stop_current();
        self.connections.remove(&self.guild_id);

        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("⚠️ Error al salir del canal en guild {}: {:?}", self.guild_id, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        }
    }
}

/// Fin o error de un track: ambos avisan a la sesión con la época del pipeline
struct StreamEndHandler {
    guild_id: GuildId,
    signal: StreamEndSignal,
}

#[async_trait]
impl VoiceEventHandler for StreamEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                debug!(
                    "🏁 Track #{} terminó en guild {}: {:?}",
                    self.signal.epoch(),
                    self.guild_id,
                    state.playing
                );
            }
        }

        self.signal.notify();
        None
    }
}
