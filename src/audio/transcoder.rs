use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    fmt,
    io::Read,
    process::{Child, Command, Stdio},
    sync::Arc,
};
use tracing::{debug, info, warn};

use super::{error::PlayerError, filters::FilterChain};
use crate::sources::{MetadataResolver, ResolvedSource};

/// Flujo de bytes ya transcodificado (Opus en contenedor Ogg, 48kHz estéreo)
pub struct AudioStream {
    reader: Box<dyn Read + Send + Sync>,
    container: &'static str,
}

impl AudioStream {
    pub fn new(reader: Box<dyn Read + Send + Sync>, container: &'static str) -> Self {
        Self { reader, container }
    }

    /// Extensión para el probe de symphonia
    pub fn container(&self) -> &'static str {
        self.container
    }

    pub fn into_reader(self) -> Box<dyn Read + Send + Sync> {
        self.reader
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle que termina el pipeline externo. Idempotente: sólo la primera
/// llamada hace algo.
#[derive(Clone)]
pub struct PipelineCancel {
    action: Arc<Mutex<Option<CancelFn>>>,
}

impl PipelineCancel {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    pub fn cancel(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl fmt::Debug for PipelineCancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCancel")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Pipeline abierto: stream, handle de cancelación y metadata canónica
#[derive(Debug)]
pub struct OpenedStream {
    pub stream: AudioStream,
    pub cancel: PipelineCancel,
    pub metadata: ResolvedSource,
}

/// Resuelve y transcodifica una referencia a un stream cancelable
#[async_trait]
pub trait TranscoderGateway: Send + Sync {
    async fn open_stream(
        &self,
        source_ref: &str,
        offset_secs: u64,
        filters: &FilterChain,
    ) -> Result<OpenedStream, PlayerError>;
}

/// Argumentos de ffmpeg. El seek va antes de `-i` (seek de entrada, rápido).
pub fn build_ffmpeg_args(
    media_url: &str,
    offset_secs: u64,
    filters: &FilterChain,
    bitrate: u32,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if offset_secs > 0 {
        args.push("-ss".into());
        args.push(offset_secs.to_string());
    }

    args.push("-i".into());
    args.push(media_url.to_string());

    if let Some(expression) = filters.to_expression() {
        args.push("-af".into());
        args.push(expression);
    }

    args.extend(
        [
            "-vn", "-ac", "2", "-ar", "48000", "-c:a", "libopus", "-b:a",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(bitrate.to_string());
    args.extend(["-f", "opus", "pipe:1"].iter().map(|s| s.to_string()));
    args
}

/// Gateway de producción: yt-dlp (vía resolver) + un proceso ffmpeg por track
pub struct FfmpegGateway {
    resolver: Arc<dyn MetadataResolver>,
    ffmpeg_path: String,
    bitrate: u32,
}

impl FfmpegGateway {
    pub fn new(resolver: Arc<dyn MetadataResolver>, ffmpeg_path: impl Into<String>, bitrate: u32) -> Self {
        Self {
            resolver,
            ffmpeg_path: ffmpeg_path.into(),
            bitrate,
        }
    }
}

#[async_trait]
impl TranscoderGateway for FfmpegGateway {
    async fn open_stream(
        &self,
        source_ref: &str,
        offset_secs: u64,
        filters: &FilterChain,
    ) -> Result<OpenedStream, PlayerError> {
        let metadata = self.resolver.resolve(source_ref).await?;
        let args = build_ffmpeg_args(&metadata.media_url, offset_secs, filters, self.bitrate);

        debug!("🎛️ ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlayerError::Spawn(e.to_string()))?;

        let Some(stdout) = child.stdout.take() else {
            kill_and_reap(child);
            return Err(PlayerError::Spawn("ffmpeg sin stdout".into()));
        };

        info!(
            "🎬 Pipeline iniciado para {} (offset {}s, pid {})",
            metadata.title,
            offset_secs,
            child.id()
        );

        Ok(OpenedStream {
            stream: AudioStream::new(Box::new(stdout), "opus"),
            cancel: PipelineCancel::new(move || kill_and_reap(child)),
            metadata,
        })
    }
}

/// Mata el proceso y lo recoge fuera del runtime si lo hay
fn kill_and_reap(mut child: Child) {
    if let Err(e) = child.kill() {
        // ya terminó solo
        debug!("ffmpeg {} no se pudo matar: {}", child.id(), e);
    }

    let mut reap = move || match child.wait() {
        Ok(status) => debug!("🧹 ffmpeg {} terminado ({})", child.id(), status),
        Err(e) => warn!("⚠️ No se pudo esperar a ffmpeg {}: {}", child.id(), e),
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(reap);
        }
        Err(_) => reap(),
    }
}
