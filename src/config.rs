use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::SessionSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub opus_bitrate: u32,

    // Tiempos (segundos)
    pub connect_timeout_secs: u64,
    pub idle_grace_secs: u64,
    pub recommendation_timeout_secs: u64,
    pub resolve_cache_ttl_secs: u64,

    // Recomendaciones
    pub enable_recommendations: bool,
    pub recommendation_limit: usize,
    pub youtube_api_key: Option<String>,

    // Herramientas externas
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub cookies_path: Option<String>,

    // Paths
    pub data_dir: PathBuf,
    pub history_limit: usize,
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: var_or("DEFAULT_VOLUME", "100").parse().context("DEFAULT_VOLUME")?,
            max_queue_size: var_or("MAX_QUEUE_SIZE", "1000").parse().context("MAX_QUEUE_SIZE")?,
            opus_bitrate: var_or("OPUS_BITRATE", "96000") // 96kbps (Discord default)
                .parse()
                .context("OPUS_BITRATE")?,

            // Tiempos
            connect_timeout_secs: var_or("CONNECT_TIMEOUT_SECS", "30")
                .parse()
                .context("CONNECT_TIMEOUT_SECS")?,
            idle_grace_secs: var_or("IDLE_GRACE_SECS", "5").parse().context("IDLE_GRACE_SECS")?,
            recommendation_timeout_secs: var_or("RECOMMENDATION_TIMEOUT_SECS", "30")
                .parse()
                .context("RECOMMENDATION_TIMEOUT_SECS")?,
            resolve_cache_ttl_secs: var_or("RESOLVE_CACHE_TTL_SECS", "600")
                .parse()
                .context("RESOLVE_CACHE_TTL_SECS")?,

            // Recomendaciones
            enable_recommendations: var_or("ENABLE_RECOMMENDATIONS", "false")
                .parse()
                .context("ENABLE_RECOMMENDATIONS")?,
            recommendation_limit: var_or("RECOMMENDATION_LIMIT", "5")
                .parse()
                .context("RECOMMENDATION_LIMIT")?,
            youtube_api_key: optional_var("YOUTUBE_API_KEY"),

            // Herramientas externas
            ytdlp_path: var_or("YTDLP_PATH", "yt-dlp"),
            ffmpeg_path: var_or("FFMPEG_PATH", "ffmpeg"),
            cookies_path: optional_var("COOKIES_PATH"),

            // Paths
            data_dir: var_or("DATA_DIR", "./data").into(),
            history_limit: var_or("HISTORY_LIMIT", "200").parse().context("HISTORY_LIMIT")?,
        };

        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("no se pudo crear {}", config.data_dir.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Opus bitrate must be within 8kbps..=510kbps (Discord limits)
    /// - Queue size, history size, timeouts and the recommendation limit must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.opus_bitrate > 510000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.history_limit == 0 {
            anyhow::bail!("History limit must be greater than 0");
        }

        if self.connect_timeout_secs == 0 || self.idle_grace_secs == 0 || self.recommendation_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        if self.recommendation_limit == 0 {
            anyhow::bail!("Recommendation limit must be greater than 0");
        }

        Ok(())
    }

    /// Recomendaciones activas sólo si están habilitadas y hay API key
    pub fn recommendations_enabled(&self) -> bool {
        self.enable_recommendations && self.youtube_api_key.is_some()
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            idle_grace: Duration::from_secs(self.idle_grace_secs),
            max_queue_size: self.max_queue_size,
            default_volume: self.default_volume,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and API keys are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {}kbps, {} max queue\n  \
            Timers: connect {}s, idle {}s, recommendation {}s\n  \
            Recommendations: {} (limit {})\n  \
            Storage: {} ({} history entries per guild)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.opus_bitrate / 1000,
            self.max_queue_size,
            self.connect_timeout_secs,
            self.idle_grace_secs,
            self.recommendation_timeout_secs,
            self.recommendations_enabled(),
            self.recommendation_limit,
            self.data_dir.display(),
            self.history_limit
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 100,
            max_queue_size: 1000,
            opus_bitrate: 96000,

            connect_timeout_secs: 30,
            idle_grace_secs: 5,
            recommendation_timeout_secs: 30,
            resolve_cache_ttl_secs: 600,

            enable_recommendations: false,
            recommendation_limit: 5,
            youtube_api_key: None,

            ytdlp_path: "yt-dlp".into(),
            ffmpeg_path: "ffmpeg".into(),
            cookies_path: None,

            data_dir: "./data".into(),
            history_limit: 200,
        }
    }
}
