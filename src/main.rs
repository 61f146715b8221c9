use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod sources;
mod storage;
mod ui;

use crate::audio::{
    recommendation::{RecommendationFlow, Recommender},
    transcoder::FfmpegGateway,
    SessionDeps, SessionRegistry,
};
use crate::bot::{notifier::DiscordNotifier, voice::SongbirdTransport, JukeboxBot};
use crate::config::Config;
use crate::sources::{CachedResolver, MetadataResolver, YouTubeApiClient, YtDlpResolver};
use crate::storage::JsonHistory;

/// Límite para cada llamada a yt-dlp
const YTDLP_TIMEOUT: Duration = Duration::from_secs(45);
/// Entradas en el cache de resolución
const RESOLVE_CACHE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Fuentes: yt-dlp para buscar y resolver, con cache de resolución
    let ytdlp = Arc::new(YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.cookies_path.clone(),
        YTDLP_TIMEOUT,
    ));
    let resolver: Arc<dyn MetadataResolver> = Arc::new(CachedResolver::new(
        ytdlp.clone(),
        RESOLVE_CACHE_CAPACITY,
        Duration::from_secs(config.resolve_cache_ttl_secs),
    ));
    let gateway = Arc::new(FfmpegGateway::new(resolver, config.ffmpeg_path.clone(), config.opus_bitrate));

    // Inicializar historial JSON
    let history = Arc::new(JsonHistory::new(config.data_dir.clone(), config.history_limit).await?);

    let notifier = Arc::new(DiscordNotifier::new());

    let recommender: Option<Arc<dyn Recommender>> = match &config.youtube_api_key {
        Some(api_key) if config.recommendations_enabled() => {
            let search = Arc::new(YouTubeApiClient::new(api_key.clone(), config.recommendation_limit * 3)?);
            info!("✨ Recomendaciones activadas");
            Some(Arc::new(RecommendationFlow::new(
                search,
                notifier.clone(),
                config.recommendation_limit,
                Duration::from_secs(config.recommendation_timeout_secs),
            )))
        }
        _ => {
            if config.enable_recommendations {
                warn!("⚠️ ENABLE_RECOMMENDATIONS sin YOUTUBE_API_KEY, recomendaciones desactivadas");
            }
            None
        }
    };

    // Transporte de voz compartido con el cliente
    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));

    let registry = Arc::new(SessionRegistry::new(SessionDeps {
        gateway,
        transport,
        history: history.clone(),
        notifier: notifier.clone(),
        recommender,
        settings: config.session_settings(),
    }));

    // Intents mínimos: guilds y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(config.clone(), registry.clone(), history, ytdlp, notifier);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando {} sesiones...", registry.len());
                // cada stop mata el ffmpeg activo y sale del canal
                for guild_id in registry.guilds() {
                    registry.get(guild_id).stop().await;
                }
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
