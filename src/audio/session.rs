use chrono::Utc;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    clock::{format_duration, PlaybackClock},
    error::{ControlOutcome, PlayerError},
    filters::FilterChain,
    idle::IdleTimer,
    notify::Notifier,
    queue::TrackQueue,
    recommendation::Recommender,
    track::Track,
    transcoder::{PipelineCancel, TranscoderGateway},
    transport::{StreamEndSignal, VoiceConnection, VoiceTransport},
};
use crate::storage::{HistoryEntry, HistoryStore};

/// Exponente de la curva de volumen (≈ 50 dB de rango útil)
const VOLUME_CURVE: f32 = 1.660964;

/// Ganancia logarítmica para un nivel 0–100
pub fn volume_gain(level: u8) -> f32 {
    (f32::from(level.min(100)) / 100.0).powf(VOLUME_CURVE)
}

/// Parámetros de sesión que vienen de la configuración
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub idle_grace: Duration,
    pub max_queue_size: usize,
    pub default_volume: u8,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            idle_grace: Duration::from_secs(5),
            max_queue_size: 1000,
            default_volume: 100,
        }
    }
}

/// Colaboradores compartidos por todas las sesiones
#[derive(Clone)]
pub struct SessionDeps {
    pub gateway: Arc<dyn TranscoderGateway>,
    pub transport: Arc<dyn VoiceTransport>,
    pub history: Arc<dyn HistoryStore>,
    pub notifier: Arc<dyn Notifier>,
    pub recommender: Option<Arc<dyn Recommender>>,
    pub settings: SessionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Playing,
    Paused,
}

/// Vista de sólo lectura para renderizar el estado
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub status: SessionStatus,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub elapsed: Duration,
    /// `None` si la duración del track es desconocida
    pub remaining: Option<Duration>,
    pub filters: Vec<String>,
    pub persist_filters: bool,
    pub volume: u8,
    pub channel: Option<ChannelId>,
    pub awaiting_recommendation: bool,
}

/// Resultado de `enqueue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Empezó a sonar de inmediato
    Started,
    /// Quedó en la cola en esta posición (0 = siguiente)
    Queued(usize),
}

struct ActivePipeline {
    epoch: u64,
    cancel: PipelineCancel,
}

struct SessionInner {
    queue: TrackQueue,
    current: Option<Track>,
    connection: Option<Arc<dyn VoiceConnection>>,
    /// Join en curso: canal y generación en la que empezó
    connecting: Option<(ChannelId, u64)>,
    /// Se incrementa en cada `stop`; invalida joins en curso
    generation: u64,
    pipeline: Option<ActivePipeline>,
    epoch: u64,
    clock: PlaybackClock,
    filters: FilterChain,
    persist_filters: bool,
    volume: u8,
    idle: IdleTimer,
    recommendation: Option<CancellationToken>,
    notify_target: Option<ChannelId>,
}

/// Sesión de reproducción de un guild.
///
/// Todas las operaciones toman el mismo lock, así que dentro de un guild se
/// ejecutan de a una. Los avisos de fin de stream, el temporizador de
/// inactividad y el flujo de recomendación corren en tareas propias y
/// vuelven a entrar por ese lock.
pub struct PlaybackSession {
    guild_id: GuildId,
    deps: SessionDeps,
    inner: Mutex<SessionInner>,
    me: Weak<PlaybackSession>,
}

impl PlaybackSession {
    pub fn new(guild_id: GuildId, deps: SessionDeps) -> Arc<Self> {
        let inner = SessionInner {
            queue: TrackQueue::new(deps.settings.max_queue_size),
            current: None,
            connection: None,
            connecting: None,
            generation: 0,
            pipeline: None,
            epoch: 0,
            clock: PlaybackClock::default(),
            filters: FilterChain::new(),
            persist_filters: false,
            volume: deps.settings.default_volume.min(100),
            idle: IdleTimer::default(),
            recommendation: None,
            notify_target: None,
        };

        Arc::new_cyclic(|me| Self {
            guild_id,
            deps,
            inner: Mutex::new(inner),
            me: me.clone(),
        })
    }

    /// Abre la conexión de voz si no existe.
    ///
    /// El lock se suelta mientras dura el join; un `stop` en ese intervalo
    /// gana y la conexión recién abierta se destruye.
    pub async fn connect(&self, channel_id: ChannelId) -> Result<(), PlayerError> {
        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.connection.as_ref().is_some_and(|c| c.channel() == channel_id) {
                return Ok(());
            }
            if inner.connecting == Some((channel_id, inner.generation)) {
                debug!("🔌 Join a {} ya en curso en guild {}", channel_id, self.guild_id);
                return Ok(());
            }
            inner.connecting = Some((channel_id, inner.generation));
            inner.generation
        };

        info!("🔌 Conectando al canal {} en guild {}", channel_id, self.guild_id);
        let timeout = self.deps.settings.connect_timeout;
        let joined = tokio::time::timeout(timeout, self.deps.transport.join(self.guild_id, channel_id)).await;

        let mut inner = self.inner.lock().await;
        if inner.connecting == Some((channel_id, generation)) {
            inner.connecting = None;
        }

        let connection = match joined {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                error!("❌ Error al conectar en guild {}: {}", self.guild_id, e);
                if inner.connection.is_none() && inner.connecting.is_none() {
                    self.deps.transport.leave(self.guild_id).await;
                }
                return Err(e);
            }
            Err(_) => {
                error!("❌ Timeout de conexión ({}s) en guild {}", timeout.as_secs(), self.guild_id);
                if inner.connection.is_none() && inner.connecting.is_none() {
                    self.deps.transport.leave(self.guild_id).await;
                }
                return Err(PlayerError::Connection(format!(
                    "el canal no estuvo listo en {}s",
                    timeout.as_secs()
                )));
            }
        };

        if inner.generation != generation {
            warn!("🛑 Stop durante la conexión en guild {}, se descarta", self.guild_id);
            // un join posterior reutiliza la misma llamada del guild
            if inner.connecting.is_none() {
                connection.destroy().await;
            }
            return Err(PlayerError::Connection("conexión cancelada".into()));
        }

        inner.connection = Some(connection);
        info!("✅ Conectado al canal {} en guild {}", channel_id, self.guild_id);

        if inner.current.is_none() && inner.pipeline.is_none() && !inner.queue.is_empty() {
            self.play_next_or_idle(&mut inner, None).await;
        }
        Ok(())
    }

    /// Agrega a la cola y arranca si no hay nada sonando
    pub async fn enqueue(&self, track: Track) -> Result<Enqueued, PlayerError> {
        let mut inner = self.inner.lock().await;
        let position = inner.queue.push(track)?;

        // la entrada del usuario reemplaza a una recomendación pendiente
        if let Some(token) = inner.recommendation.take() {
            debug!("✋ Recomendación pendiente cancelada en guild {}", self.guild_id);
            token.cancel();
        }
        inner.idle.cancel();

        if inner.current.is_none() && inner.pipeline.is_none() && inner.connection.is_some() {
            self.play_next_or_idle(&mut inner, None).await;
            if position == 0 && inner.current.is_some() {
                return Ok(Enqueued::Started);
            }
        }

        Ok(Enqueued::Queued(position))
    }

    pub async fn pause(&self) -> ControlOutcome {
        let mut inner = self.inner.lock().await;
        if inner.current.is_none() || inner.clock.is_paused() {
            return ControlOutcome::NotApplicable;
        }
        let Some(connection) = inner.connection.clone() else {
            return ControlOutcome::NotApplicable;
        };

        if let Err(e) = connection.pause().await {
            warn!("⚠️ No se pudo pausar en guild {}: {}", self.guild_id, e);
            return ControlOutcome::NotApplicable;
        }

        inner.clock.pause(Instant::now());
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        ControlOutcome::Applied
    }

    pub async fn resume(&self) -> ControlOutcome {
        let mut inner = self.inner.lock().await;
        if inner.current.is_none() || !inner.clock.is_paused() {
            return ControlOutcome::NotApplicable;
        }
        let Some(connection) = inner.connection.clone() else {
            return ControlOutcome::NotApplicable;
        };

        if let Err(e) = connection.unpause().await {
            warn!("⚠️ No se pudo reanudar en guild {}: {}", self.guild_id, e);
            return ControlOutcome::NotApplicable;
        }

        inner.clock.resume(Instant::now());
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        ControlOutcome::Applied
    }

    /// Corta el pipeline actual y avanza igual que en un fin natural
    pub async fn skip(&self) -> ControlOutcome {
        let mut inner = self.inner.lock().await;
        let Some(current) = inner.current.as_ref() else {
            return ControlOutcome::NotApplicable;
        };

        info!("⏭️ Saltando {} en guild {}", current.title(), self.guild_id);
        self.finish_current(&mut inner).await;
        ControlOutcome::Applied
    }

    /// Vacía todo y se desconecta. Seguro desde cualquier estado.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
    }

    /// Reinicia el track actual en la posición actual con la nueva cadena
    pub async fn apply_filter(&self, spec: &str, persist: bool) -> ControlOutcome {
        let mut inner = self.inner.lock().await;
        let Some(track) = inner.current.clone() else {
            return ControlOutcome::NotApplicable;
        };

        let now = Instant::now();
        let offset = inner.clock.elapsed(now).as_secs();
        let was_paused = inner.clock.is_paused();

        inner.filters.apply(spec);
        inner.persist_filters = persist;
        info!(
            "🎛️ Filtro {:?} en guild {} (persistente: {}), reinicio en {}s",
            inner.filters.as_slice(),
            self.guild_id,
            persist,
            offset
        );

        match self.start_track(&mut inner, track, offset, true).await {
            Ok(()) => {
                if was_paused {
                    self.repause(&mut inner).await;
                }
            }
            Err(e) => {
                warn!("⚠️ Falló el reinicio con filtro en guild {}: {}", self.guild_id, e);
                self.finish_current(&mut inner).await;
            }
        }

        ControlOutcome::Applied
    }

    /// Ajusta el volumen (0–100) del track actual y los siguientes
    pub async fn set_volume(&self, level: u8) -> u8 {
        let mut inner = self.inner.lock().await;
        let level = level.min(100);
        inner.volume = level;

        if inner.current.is_some() {
            if let Some(connection) = inner.connection.clone() {
                if let Err(e) = connection.set_volume(volume_gain(level)).await {
                    warn!("⚠️ No se pudo ajustar el volumen en guild {}: {}", self.guild_id, e);
                }
            }
        }

        info!("🔊 Volumen ajustado a {}% en guild {}", level, self.guild_id);
        level
    }

    pub async fn clear_queue(&self) -> usize {
        self.inner.lock().await.queue.clear()
    }

    pub async fn remove(&self, index: usize) -> Result<Track, PlayerError> {
        self.inner.lock().await.queue.remove(index)
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<(), PlayerError> {
        self.inner.lock().await.queue.move_track(from, to)
    }

    /// El canal de voz quedó sólo con el bot
    pub async fn handle_channel_empty(&self) {
        let mut inner = self.inner.lock().await;
        if inner.connection.is_none() {
            return;
        }

        info!("👋 Canal vacío en guild {}, deteniendo", self.guild_id);
        if let Some(target) = inner.notify_target {
            self.notify(target, "👋 Todos se fueron del canal, así que me voy también.".to_string());
        }
        self.stop_locked(&mut inner).await;
    }

    /// Punto de entrada para los avisos de fin de stream del transporte
    pub async fn on_stream_end(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.pipeline.as_ref().map(|p| p.epoch) != Some(epoch) {
            debug!("🗑️ Fin de stream viejo (#{}) ignorado en guild {}", epoch, self.guild_id);
            return;
        }

        debug!("🏁 Fin de stream (#{}) en guild {}", epoch, self.guild_id);
        self.finish_current(&mut inner).await;
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let now = Instant::now();

        let status = match (&inner.current, &inner.connection) {
            (Some(_), _) if inner.clock.is_paused() => SessionStatus::Paused,
            (Some(_), _) => SessionStatus::Playing,
            (None, None) if inner.connecting.is_some() => SessionStatus::Connecting,
            _ => SessionStatus::Idle,
        };

        let (elapsed, remaining) = match &inner.current {
            Some(track) => (
                inner.clock.elapsed(now),
                inner.clock.remaining(now, track.duration_secs()),
            ),
            None => (Duration::ZERO, None),
        };

        SessionSnapshot {
            guild_id: self.guild_id,
            status,
            current: inner.current.clone(),
            queue: inner.queue.tracks(),
            elapsed,
            remaining,
            filters: inner.filters.as_slice().to_vec(),
            persist_filters: inner.persist_filters,
            volume: inner.volume,
            channel: inner.connection.as_ref().map(|c| c.channel()),
            awaiting_recommendation: inner.recommendation.is_some(),
        }
    }

    // --- transiciones internas, siempre con el lock tomado ---

    /// Fin natural, skip o error de pipeline: los tres terminan acá
    async fn finish_current(&self, inner: &mut SessionInner) {
        let finished = inner.current.take();
        Self::cancel_pipeline(inner);
        inner.clock.reset();

        if !inner.persist_filters && !inner.filters.is_empty() {
            debug!("🎛️ Filtro no persistente limpiado en guild {}", self.guild_id);
            inner.filters.clear();
        }

        self.play_next_or_idle(inner, finished).await;
    }

    /// Toma la cabeza de la cola; si falla, prueba con la siguiente
    async fn play_next_or_idle(&self, inner: &mut SessionInner, finished: Option<Track>) {
        if inner.connection.is_none() {
            return;
        }

        while let Some(next) = inner.queue.pop_next() {
            let title = next.title().to_string();
            match self.start_track(inner, next, 0, false).await {
                Ok(()) => return,
                Err(e) => warn!("⚠️ Saltando {} en guild {}: {}", title, self.guild_id, e),
            }
        }

        if let Some(connection) = inner.connection.clone() {
            connection.stop().await;
        }

        match (&self.deps.recommender, finished) {
            (Some(recommender), Some(last)) => self.spawn_recommendation(inner, recommender.clone(), last),
            _ => self.queue_exhausted(inner),
        }
    }

    async fn start_track(
        &self,
        inner: &mut SessionInner,
        mut track: Track,
        offset_secs: u64,
        restart: bool,
    ) -> Result<(), PlayerError> {
        let connection = inner.connection.clone().ok_or(PlayerError::NotConnected)?;
        Self::cancel_pipeline(inner);

        let requested_at = Instant::now();
        let opened = self
            .deps
            .gateway
            .open_stream(track.source_ref(), offset_secs, &inner.filters)
            .await?;

        inner.epoch += 1;
        let epoch = inner.epoch;
        let signal = self.end_signal(epoch);

        if let Err(e) = connection.play(opened.stream, volume_gain(inner.volume), signal).await {
            opened.cancel.cancel();
            return Err(e);
        }

        track.absorb(&opened.metadata);
        inner.pipeline = Some(ActivePipeline {
            epoch,
            cancel: opened.cancel,
        });
        inner.clock.start(Instant::now(), Duration::from_secs(offset_secs));

        if let Some(target) = track.notify_target() {
            inner.notify_target = Some(target);
        }

        if !restart {
            info!(
                "🎵 Reproduciendo: {} en guild {} (pedido por {})",
                track.title(),
                self.guild_id,
                track.requester()
            );
            self.record_history(&track);

            if let Some(target) = track.notify_target() {
                let latency = requested_at.elapsed().as_millis();
                self.notify(
                    target,
                    format!(
                        "🎶 Reproduciendo: **{}** `[{}]` | ⏱️ Latencia: `{}ms`",
                        track.title(),
                        format_duration(track.duration_secs()),
                        latency
                    ),
                );
            }
        }

        inner.current = Some(track);
        Ok(())
    }

    async fn repause(&self, inner: &mut SessionInner) {
        let Some(connection) = inner.connection.clone() else {
            return;
        };
        match connection.pause().await {
            Ok(()) => {
                inner.clock.pause(Instant::now());
            }
            Err(e) => warn!("⚠️ No se pudo volver a pausar en guild {}: {}", self.guild_id, e),
        }
    }

    async fn stop_locked(&self, inner: &mut SessionInner) {
        let cleared = inner.queue.clear();
        if let Some(token) = inner.recommendation.take() {
            token.cancel();
        }
        inner.idle.cancel();
        Self::cancel_pipeline(inner);
        inner.current = None;
        inner.clock.reset();
        inner.generation += 1;
        inner.connecting = None;

        if let Some(connection) = inner.connection.take() {
            connection.stop().await;
            connection.destroy().await;
            info!("⏹️ Sesión detenida en guild {} ({} en cola descartados)", self.guild_id, cleared);
        }
    }

    fn cancel_pipeline(inner: &mut SessionInner) {
        if let Some(pipeline) = inner.pipeline.take() {
            pipeline.cancel.cancel();
        }
    }

    fn queue_exhausted(&self, inner: &mut SessionInner) {
        info!("📭 Cola terminada en guild {}", self.guild_id);
        if let Some(target) = inner.notify_target {
            self.notify(target, "📭 La cola terminó.".to_string());
        }

        let me = self.me.clone();
        inner.idle.arm(self.deps.settings.idle_grace, move |seq| async move {
            if let Some(session) = me.upgrade() {
                session.on_idle_timeout(seq).await;
            }
        });
    }

    async fn on_idle_timeout(&self, seq: u64) {
        let mut inner = self.inner.lock().await;
        if !inner.idle.is_current(seq) {
            return;
        }
        inner.idle.disarm();

        // se revisa al disparar, no al armar
        if !inner.queue.is_empty() || inner.current.is_some() || inner.recommendation.is_some() {
            debug!("⏲️ Inactividad cancelada en guild {}: hay actividad", self.guild_id);
            return;
        }

        if let Some(connection) = inner.connection.take() {
            connection.destroy().await;
            info!("💤 Desconectado por inactividad en guild {}", self.guild_id);
        }
    }

    fn spawn_recommendation(&self, inner: &mut SessionInner, recommender: Arc<dyn Recommender>, last: Track) {
        let token = CancellationToken::new();
        inner.recommendation = Some(token.clone());
        let me = self.me.clone();

        debug!("✨ Buscando recomendación tras {} en guild {}", last.title(), self.guild_id);
        tokio::spawn(async move {
            // el recomendador cierra su propio prompt al cancelarse
            let picked = recommender.suggest(&last, token.clone()).await;
            if token.is_cancelled() {
                return;
            }
            if let Some(session) = me.upgrade() {
                session.on_recommendation(token, picked).await;
            }
        });
    }

    async fn on_recommendation(&self, token: CancellationToken, picked: Option<Track>) {
        let mut inner = self.inner.lock().await;
        if token.is_cancelled() {
            return;
        }
        inner.recommendation = None;

        match picked {
            Some(track) => {
                info!("✨ Continuando con recomendación {} en guild {}", track.title(), self.guild_id);
                if let Err(e) = inner.queue.push(track) {
                    warn!("⚠️ No se pudo encolar la recomendación en guild {}: {}", self.guild_id, e);
                }
                if inner.current.is_none() {
                    self.play_next_or_idle(&mut inner, None).await;
                }
            }
            None => self.queue_exhausted(&mut inner),
        }
    }

    fn end_signal(&self, epoch: u64) -> StreamEndSignal {
        let me = self.me.clone();
        StreamEndSignal::new(
            epoch,
            Arc::new(move |epoch| {
                if let Some(session) = me.upgrade() {
                    tokio::spawn(async move {
                        session.on_stream_end(epoch).await;
                    });
                }
            }),
        )
    }

    fn record_history(&self, track: &Track) {
        let history = self.deps.history.clone();
        let guild_id = self.guild_id;
        let entry = HistoryEntry {
            title: track.title().to_string(),
            source_ref: track.source_ref().to_string(),
            requester: track.requester(),
            played_at: Utc::now(),
        };

        tokio::spawn(async move {
            if let Err(e) = history.append(guild_id, entry).await {
                warn!("⚠️ No se pudo guardar el historial de guild {}: {:#}", guild_id, e);
            }
        });
    }

    fn notify(&self, target: ChannelId, text: String) {
        let notifier = self.deps.notifier.clone();
        tokio::spawn(async move {
            notifier.send(target, &text).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        testing::{harness, Harness, ScriptedRecommender},
        track::Requester,
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    const CHANNEL: ChannelId = ChannelId::new(10);

    fn track(name: &str, duration: u64) -> Track {
        Track::new(format!("https://youtu.be/{}", name), name, Requester::User(UserId::new(1)))
            .with_duration(duration)
            .with_notify(ChannelId::new(77))
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(Track::title).collect()
    }

    /// Deja correr las tareas lanzadas sin mover el reloj de forma visible
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn connected(h: &Harness) -> Arc<PlaybackSession> {
        let session = h.session();
        session.connect(CHANNEL).await.unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn tracks_play_in_fifo_order() {
        let h = harness();
        let session = connected(&h).await;
        for name in ["a", "b", "c", "d"] {
            session.enqueue(track(name, 60)).await.unwrap();
        }

        for _ in 0..3 {
            h.connection().end_current();
            settle().await;
        }

        let started: Vec<String> = h.gateway.calls().into_iter().map(|c| c.source_ref).collect();
        assert_eq!(
            started,
            vec![
                "https://youtu.be/a",
                "https://youtu.be/b",
                "https://youtu.be/c",
                "https://youtu.be/d",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_waits_for_a_connection() {
        let h = harness();
        let session = h.session();

        assert_eq!(session.enqueue(track("a", 30)).await.unwrap(), Enqueued::Queued(0));
        assert!(h.gateway.calls().is_empty());

        session.connect(CHANNEL).await.unwrap();
        let snap = session.snapshot().await;
        assert_eq!(snap.current.map(|t| t.title().to_string()), Some("a".to_string()));
        assert_eq!(snap.status, SessionStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_for_the_same_channel() {
        let h = harness();
        let session = connected(&h).await;
        session.connect(CHANNEL).await.unwrap();

        assert_eq!(h.transport.join_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_times_out_and_releases_the_handle() {
        let h = harness();
        h.transport.hang_joins();
        let session = h.session();

        let err = session.connect(CHANNEL).await.unwrap_err();
        assert!(matches!(err, PlayerError::Connection(_)));
        assert_eq!(h.transport.leave_count(), 1);
        assert_eq!(session.snapshot().await.channel, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_join_reports_idle_and_discards_the_connection() {
        let h = harness();
        h.transport.slow_joins(Duration::from_secs(2));
        let session = h.session();

        let joining = tokio::spawn({
            let session = session.clone();
            async move { session.connect(CHANNEL).await }
        });
        settle().await;
        assert_eq!(session.snapshot().await.status, SessionStatus::Connecting);

        session.stop().await;
        assert_eq!(session.snapshot().await.status, SessionStatus::Idle);

        let err = joining.await.unwrap().unwrap_err();
        assert!(matches!(err, PlayerError::Connection(_)));
        assert_eq!(h.connection().destroy_count(), 1);
        assert_eq!(session.snapshot().await.channel, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_after_stop_during_join_plays_the_queue() {
        let h = harness();
        h.transport.slow_joins(Duration::from_secs(2));
        let session = h.session();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.connect(CHANNEL).await }
        });
        settle().await;
        session.stop().await;

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.connect(CHANNEL).await }
        });
        settle().await;
        assert_eq!(session.enqueue(track("a", 30)).await.unwrap(), Enqueued::Queued(0));

        assert!(first.await.unwrap().is_err());
        second.await.unwrap().unwrap();

        let snap = session.snapshot().await;
        assert_eq!(snap.status, SessionStatus::Playing);
        assert_eq!(snap.current.as_ref().map(Track::title), Some("a"));
        assert_eq!(snap.channel, Some(CHANNEL));
        assert_eq!(h.transport.join_count(), 2);
        assert_eq!(h.connection().destroy_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_then_resume_keeps_elapsed() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 300)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(session.pause().await.applied());
        assert_eq!(session.snapshot().await.status, SessionStatus::Paused);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(session.resume().await.applied());

        let snap = session.snapshot().await;
        assert_eq!(snap.elapsed, Duration::from_secs(10));
        assert_eq!(snap.remaining, Some(Duration::from_secs(290)));
        assert_eq!(snap.status, SessionStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_out_of_state_are_not_applicable() {
        let h = harness();
        let session = connected(&h).await;

        assert_eq!(session.pause().await, ControlOutcome::NotApplicable);
        assert_eq!(session.resume().await, ControlOutcome::NotApplicable);

        session.enqueue(track("a", 30)).await.unwrap();
        assert_eq!(session.resume().await, ControlOutcome::NotApplicable);
        assert!(session.pause().await.applied());
        assert_eq!(session.pause().await, ControlOutcome::NotApplicable);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_plays_previous_head_and_ignores_late_end() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        session.enqueue(track("b", 30)).await.unwrap();
        let stale = h.connection().last_signal();

        assert!(session.skip().await.applied());
        assert_eq!(h.gateway.cancelled(), 1);

        // el transporte avisa el fin del pipeline cortado
        stale.notify();
        settle().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current.map(|t| t.title().to_string()), Some("b".to_string()));
        assert!(snap.queue.is_empty());
        assert_eq!(h.gateway.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_with_nothing_playing_is_not_applicable() {
        let h = harness();
        let session = connected(&h).await;
        assert_eq!(session.skip().await, ControlOutcome::NotApplicable);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_tracks_are_skipped() {
        let h = harness();
        h.gateway.fail_on("https://youtu.be/broken");
        let session = connected(&h).await;
        session.enqueue(track("broken", 30)).await.unwrap();
        assert_eq!(session.snapshot().await.current, None);

        session.enqueue(track("broken", 30)).await.unwrap();
        session.enqueue(track("ok", 30)).await.unwrap();
        let snap = session.snapshot().await;
        assert_eq!(snap.current.map(|t| t.title().to_string()), Some("ok".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_everything_and_is_idempotent() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        session.enqueue(track("b", 30)).await.unwrap();

        session.stop().await;
        session.stop().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.status, SessionStatus::Idle);
        assert!(snap.queue.is_empty());
        assert_eq!(snap.current, None);
        assert_eq!(snap.channel, None);
        assert_eq!(h.connection().destroy_count(), 1);
        assert_eq!(h.gateway.cancelled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_restarts_at_elapsed_offset() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 120)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(37)).await;
        assert!(session.apply_filter("bass=g=5:f=100:w=0.6", true).await.applied());

        let calls = h.gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].offset_secs, 37);
        assert_eq!(calls[1].filters, vec!["bass=g=5:f=100:w=0.6".to_string()]);
        assert_eq!(h.gateway.cancelled(), 1);

        // un reinicio no vuelve a registrar historial
        settle().await;
        assert_eq!(h.history.len(), 1);

        let snap = session.snapshot().await;
        assert_eq!(snap.elapsed.as_secs(), 37);

        assert!(session.apply_filter("off", true).await.applied());
        assert!(session.snapshot().await.filters.is_empty());
        assert!(h.gateway.calls()[2].filters.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn filter_while_paused_stays_paused() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 120)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(session.pause().await.applied());
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(session.apply_filter("apulsator=hz=0.125", true).await.applied());
        assert_eq!(h.gateway.calls()[1].offset_secs, 20);

        let snap = session.snapshot().await;
        assert_eq!(snap.status, SessionStatus::Paused);
        assert_eq!(snap.elapsed, Duration::from_secs(20));
        assert!(h.connection().is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn filter_with_nothing_playing_is_a_no_op() {
        let h = harness();
        let session = connected(&h).await;

        assert_eq!(session.apply_filter("bass=g=5:f=100:w=0.6", true).await, ControlOutcome::NotApplicable);
        assert!(h.gateway.calls().is_empty());
        assert!(session.snapshot().await.filters.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_persistent_filter_resets_on_advance() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 60)).await.unwrap();
        session.enqueue(track("b", 60)).await.unwrap();

        assert!(session.apply_filter("apulsator=hz=0.125", false).await.applied());
        assert!(session.skip().await.applied());

        assert!(h.gateway.calls()[2].filters.is_empty());
        assert!(session.snapshot().await.filters.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn volume_is_clamped_and_applied_logarithmically() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 60)).await.unwrap();

        assert_eq!(session.set_volume(150).await, 100);
        assert_eq!(session.set_volume(50).await, 50);

        let gain = h.connection().last_volume().unwrap();
        assert!((gain - 0.3162).abs() < 0.001);
        assert_eq!(volume_gain(0), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn history_and_now_playing_on_fresh_start() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 185)).await.unwrap();
        settle().await;

        assert_eq!(h.history.titles(), vec!["a".to_string()]);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChannelId::new(77));
        assert!(sent[0].1.starts_with("🎶 Reproduciendo: **a** `[3:05]`"));
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_queue_then_idle_teardown() {
        let h = harness();
        let session = connected(&h).await;

        for (name, duration) in [("t1", 30), ("t2", 0), ("t3", 45)] {
            session.enqueue(track(name, duration)).await.unwrap();
        }
        let snap = session.snapshot().await;
        assert_eq!(snap.current.as_ref().map(Track::title), Some("t1"));
        assert_eq!(titles(&snap.queue), vec!["t2", "t3"]);

        h.connection().end_current();
        settle().await;
        let snap = session.snapshot().await;
        assert_eq!(snap.current.as_ref().map(Track::title), Some("t2"));
        assert_eq!(snap.remaining, None);
        assert_eq!(titles(&snap.queue), vec!["t3"]);

        assert!(session.skip().await.applied());
        let snap = session.snapshot().await;
        assert_eq!(snap.current.as_ref().map(Track::title), Some("t3"));
        assert!(snap.queue.is_empty());

        h.connection().end_current();
        settle().await;
        let snap = session.snapshot().await;
        assert_eq!(snap.current, None);
        assert!(snap.channel.is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(session.snapshot().await.channel, None);
        assert_eq!(h.connection().destroy_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_track_during_grace_keeps_the_connection() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        h.connection().end_current();
        settle().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        session.enqueue(track("b", 30)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snap = session.snapshot().await;
        assert!(snap.channel.is_some());
        assert_eq!(snap.current.as_ref().map(Track::title), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_rechecks_the_queue_when_it_fires() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        h.connection().end_current();
        settle().await;

        // entra a la cola sin pasar por enqueue, así el timer sigue armado
        session.inner.lock().await.queue.push(track("late", 30)).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let snap = session.snapshot().await;
        assert!(snap.channel.is_some());
        assert_eq!(titles(&snap.queue), vec!["late"]);
        assert_eq!(h.connection().destroy_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recommendation_continues_playback() {
        let pick = Track::new("https://youtu.be/rec", "rec", Requester::Recommendation);
        let h = harness().with_recommender(ScriptedRecommender::replying(Some(pick), Duration::from_secs(8)));
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();

        h.connection().end_current();
        settle().await;
        assert!(session.snapshot().await.awaiting_recommendation);

        // la espera supera el periodo de gracia sin desconectar
        tokio::time::sleep(Duration::from_secs(10)).await;
        let snap = session.snapshot().await;
        assert!(!snap.awaiting_recommendation);
        assert!(snap.channel.is_some());
        assert_eq!(snap.current.as_ref().map(Track::title), Some("rec"));
        assert_eq!(h.recommender_calls(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn declined_recommendation_arms_idle_timer() {
        let h = harness().with_recommender(ScriptedRecommender::replying(None, Duration::from_secs(2)));
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();

        h.connection().end_current();
        settle().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(session.snapshot().await.channel.is_some());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.snapshot().await.channel, None);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_cancels_a_pending_recommendation() {
        let pick = Track::new("https://youtu.be/rec", "rec", Requester::Recommendation);
        let h = harness().with_recommender(ScriptedRecommender::replying(Some(pick), Duration::from_secs(8)));
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        h.connection().end_current();
        settle().await;

        session.enqueue(track("b", 30)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current.as_ref().map(Track::title), Some("b"));
        assert!(snap.queue.is_empty());
        assert!(!snap.awaiting_recommendation);
        assert_eq!(h.recommendations_withdrawn(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_withdraws_a_pending_recommendation() {
        let pick = Track::new("https://youtu.be/rec", "rec", Requester::Recommendation);
        let h = harness().with_recommender(ScriptedRecommender::replying(Some(pick), Duration::from_secs(8)));
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        h.connection().end_current();
        settle().await;

        session.stop().await;
        settle().await;

        assert_eq!(h.recommendations_withdrawn(), 1);
        assert_eq!(session.snapshot().await.status, SessionStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn recommendation_arriving_after_cancel_is_dropped() {
        let pick = Track::new("https://youtu.be/rec", "rec", Requester::Recommendation);
        let h = harness().with_recommender(
            ScriptedRecommender::replying(Some(pick.clone()), Duration::from_secs(8)).ignoring_cancel(),
        );
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        h.connection().end_current();
        settle().await;

        session.enqueue(track("b", 30)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current.as_ref().map(Track::title), Some("b"));
        assert!(snap.queue.is_empty());

        // la respuesta gana la carrera contra el lock pero su token ya fue cancelado
        let token = CancellationToken::new();
        token.cancel();
        session.on_recommendation(token, Some(pick)).await;

        let snap = session.snapshot().await;
        assert_eq!(snap.current.as_ref().map(Track::title), Some("b"));
        assert!(snap.queue.is_empty());
        assert_eq!(h.gateway.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_notifies_and_stops() {
        let h = harness();
        let session = connected(&h).await;
        session.enqueue(track("a", 30)).await.unwrap();
        session.enqueue(track("b", 30)).await.unwrap();

        session.handle_channel_empty().await;
        settle().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.channel, None);
        assert!(snap.queue.is_empty());
        assert!(h.notifier.sent().iter().any(|(_, text)| text.contains("Todos se fueron")));
    }

    #[tokio::test(start_paused = true)]
    async fn queue_editing() {
        let h = harness();
        let session = h.session();
        for name in ["a", "b", "c"] {
            session.enqueue(track(name, 30)).await.unwrap();
        }

        session.move_track(2, 0).await.unwrap();
        assert_eq!(session.remove(1).await.unwrap().title(), "a");
        assert!(matches!(session.remove(5).await, Err(PlayerError::InvalidIndex(5))));
        assert_eq!(titles(&session.snapshot().await.queue), vec!["c", "b"]);
        assert_eq!(session.clear_queue().await, 2);
    }
}
