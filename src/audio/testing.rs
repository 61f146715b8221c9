//! Dobles de prueba para los colaboradores de la sesión.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

use super::{
    error::PlayerError,
    filters::FilterChain,
    notify::Notifier,
    recommendation::Recommender,
    session::{PlaybackSession, SessionDeps, SessionSettings},
    track::Track,
    transcoder::{AudioStream, OpenedStream, PipelineCancel, TranscoderGateway},
    transport::{StreamEndSignal, VoiceConnection, VoiceTransport},
};
use crate::{
    sources::ResolvedSource,
    storage::{HistoryEntry, HistoryStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub source_ref: String,
    pub offset_secs: u64,
    pub filters: Vec<String>,
}

#[derive(Default)]
pub struct FakeGateway {
    calls: Mutex<Vec<GatewayCall>>,
    failing: Mutex<HashSet<String>>,
    cancelled: Arc<AtomicUsize>,
}

impl FakeGateway {
    pub fn fail_on(&self, source_ref: &str) {
        self.failing.lock().insert(source_ref.to_string());
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Pipelines cancelados hasta ahora
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscoderGateway for FakeGateway {
    async fn open_stream(
        &self,
        source_ref: &str,
        offset_secs: u64,
        filters: &FilterChain,
    ) -> Result<OpenedStream, PlayerError> {
        if self.failing.lock().contains(source_ref) {
            return Err(PlayerError::resolution(source_ref, "video no disponible"));
        }

        self.calls.lock().push(GatewayCall {
            source_ref: source_ref.to_string(),
            offset_secs,
            filters: filters.as_slice().to_vec(),
        });

        let cancelled = self.cancelled.clone();
        Ok(OpenedStream {
            stream: AudioStream::new(Box::new(std::io::empty()), "opus"),
            cancel: PipelineCancel::new(move || {
                cancelled.fetch_add(1, Ordering::SeqCst);
            }),
            metadata: ResolvedSource {
                title: String::new(),
                duration_secs: 0,
                media_url: format!("{}#media", source_ref),
            },
        })
    }
}

pub struct FakeConnection {
    channel: ChannelId,
    signals: Mutex<Vec<StreamEndSignal>>,
    volumes: Mutex<Vec<f32>>,
    paused: AtomicBool,
    destroyed: AtomicUsize,
}

impl FakeConnection {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            signals: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
            paused: AtomicBool::new(false),
            destroyed: AtomicUsize::new(0),
        }
    }

    pub fn last_signal(&self) -> StreamEndSignal {
        self.signals.lock().last().cloned().expect("nada se reprodujo")
    }

    /// Simula el fin natural del stream actual
    pub fn end_current(&self) {
        self.last_signal().notify();
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.volumes.lock().last().copied()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn play(&self, _stream: AudioStream, _gain: f32, on_end: StreamEndSignal) -> Result<(), PlayerError> {
        self.paused.store(false, Ordering::SeqCst);
        self.signals.lock().push(on_end);
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unpause(&self) -> Result<(), PlayerError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, gain: f32) -> Result<(), PlayerError> {
        self.volumes.lock().push(gain);
        Ok(())
    }

    async fn stop(&self) {}

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeTransport {
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    hang: AtomicBool,
    delay: Mutex<Option<Duration>>,
    leaves: AtomicUsize,
}

impl FakeTransport {
    /// Los próximos joins nunca terminan
    pub fn hang_joins(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Los próximos joins tardan `delay`
    pub fn slow_joins(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn join_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn leave_count(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn last_connection(&self) -> Arc<FakeConnection> {
        self.connections.lock().last().cloned().expect("no hubo join")
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn join(&self, _guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn VoiceConnection>, PlayerError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let connection = Arc::new(FakeConnection::new(channel_id));
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }

    async fn leave(&self, _guild_id: GuildId) {
        self.leaves.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, target: ChannelId, text: &str) {
        self.sent.lock().push((target, text.to_string()));
    }

    async fn ask_choice(
        &self,
        _: ChannelId,
        _: &str,
        _: &[String],
        _: Duration,
        _: CancellationToken,
    ) -> Option<usize> {
        None
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<(GuildId, HistoryEntry)>>,
}

impl MemoryHistory {
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(_, e)| e.title.clone()).collect()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, guild_id: GuildId, entry: HistoryEntry) -> anyhow::Result<()> {
        self.entries.lock().push((guild_id, entry));
        Ok(())
    }
}

/// Responde siempre lo mismo después de `delay`
pub struct ScriptedRecommender {
    reply: Option<Track>,
    delay: Duration,
    heeds_cancel: bool,
    calls: Mutex<Vec<String>>,
    withdrawn: AtomicUsize,
}

impl ScriptedRecommender {
    pub fn replying(reply: Option<Track>, delay: Duration) -> Self {
        Self {
            reply,
            delay,
            heeds_cancel: true,
            calls: Mutex::new(Vec::new()),
            withdrawn: AtomicUsize::new(0),
        }
    }

    /// Responde aunque lo cancelen, como una respuesta que llega tarde
    pub fn ignoring_cancel(mut self) -> Self {
        self.heeds_cancel = false;
        self
    }
}

#[async_trait]
impl Recommender for ScriptedRecommender {
    async fn suggest(&self, last: &Track, cancel: CancellationToken) -> Option<Track> {
        self.calls.lock().push(last.title().to_string());
        if !self.heeds_cancel {
            tokio::time::sleep(self.delay).await;
            return self.reply.clone();
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.withdrawn.fetch_add(1, Ordering::SeqCst);
                None
            }
            _ = tokio::time::sleep(self.delay) => self.reply.clone(),
        }
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub transport: Arc<FakeTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub history: Arc<MemoryHistory>,
    recommender: Option<Arc<ScriptedRecommender>>,
}

pub fn harness() -> Harness {
    Harness {
        gateway: Arc::default(),
        transport: Arc::default(),
        notifier: Arc::default(),
        history: Arc::default(),
        recommender: None,
    }
}

impl Harness {
    pub fn with_recommender(mut self, recommender: ScriptedRecommender) -> Self {
        self.recommender = Some(Arc::new(recommender));
        self
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            gateway: self.gateway.clone(),
            transport: self.transport.clone(),
            history: self.history.clone(),
            notifier: self.notifier.clone(),
            recommender: self
                .recommender
                .clone()
                .map(|r| r as Arc<dyn Recommender>),
            settings: SessionSettings::default(),
        }
    }

    pub fn session(&self) -> Arc<PlaybackSession> {
        PlaybackSession::new(GuildId::new(1), self.deps())
    }

    pub fn connection(&self) -> Arc<FakeConnection> {
        self.transport.last_connection()
    }

    /// Prompts retirados por cancelación
    pub fn recommendations_withdrawn(&self) -> usize {
        self.recommender
            .as_ref()
            .map(|r| r.withdrawn.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    pub fn recommender_calls(&self) -> Vec<String> {
        self.recommender
            .as_ref()
            .map(|r| r.calls.lock().clone())
            .unwrap_or_default()
    }
}
