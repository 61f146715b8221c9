use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{is_url, MetadataResolver, ResolvedSource};
use crate::audio::error::PlayerError;

/// Máximo de entradas que se expanden de una playlist
const PLAYLIST_LIMIT: usize = 100;

/// Entrada devuelta por [`YtDlpResolver::lookup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    pub title: String,
    pub url: String,
    pub duration_secs: u64,
}

/// Resolver basado en yt-dlp.
///
/// Las entradas que no son URL se buscan como `ytsearch1:<query>`.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    ytdlp_path: String,
    cookies_path: Option<String>,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(ytdlp_path: impl Into<String>, cookies_path: Option<String>, timeout: Duration) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            cookies_path,
            timeout,
        }
    }

    /// Normaliza la entrada del usuario a algo que yt-dlp entiende
    pub fn target_for(input: &str) -> String {
        let input = input.trim();
        if is_url(input) {
            input.to_string()
        } else {
            format!("ytsearch1:{}", input)
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ytdlp_path);
        cmd.args(["--no-warnings", "--socket-timeout", "15", "--retries", "3"]);

        if let Some(cookies) = &self.cookies_path {
            cmd.args(["--cookies", cookies]);
        }

        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<String> {
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .context("yt-dlp excedió el tiempo límite")?
            .context("no se pudo ejecutar yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp falló: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Lista los tracks detrás de una entrada (video, búsqueda o playlist).
    ///
    /// Lo usa la capa de comandos para crear un `Track` por entrada.
    pub async fn lookup(&self, input: &str) -> Result<Vec<LookupEntry>> {
        let target = Self::target_for(input);
        let mut cmd = self.command();
        cmd.args([
            "--flat-playlist",
            "--playlist-end",
            &PLAYLIST_LIMIT.to_string(),
            "--print",
            "%(duration)s|%(webpage_url,url)s|%(title)s",
        ])
        .arg(&target);

        let stdout = self.run(cmd).await?;
        let entries = parse_lookup(&stdout);

        info!("🔍 {} entradas encontradas para: {}", entries.len(), input);
        Ok(entries)
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn resolve(&self, source_ref: &str) -> Result<ResolvedSource, PlayerError> {
        let target = Self::target_for(source_ref);
        debug!("🔎 Resolviendo con yt-dlp: {}", target);

        let mut cmd = self.command();
        cmd.args([
            "-f",
            "bestaudio/best",
            "--no-playlist",
            "--print",
            "%(duration)s|%(url)s|%(title)s",
        ])
        .arg(&target);

        let stdout = self
            .run(cmd)
            .await
            .map_err(|e| PlayerError::resolution(source_ref, format!("{:#}", e)))?;

        parse_resolution(&stdout).ok_or_else(|| {
            warn!("⚠️ Salida de yt-dlp sin URL para {}", source_ref);
            PlayerError::resolution(source_ref, "yt-dlp no devolvió una URL de audio")
        })
    }
}

/// `duration|url|title`; el título va último porque puede contener `|`
fn split_line(line: &str) -> Option<(u64, &str, &str)> {
    let mut parts = line.trim().splitn(3, '|');
    let duration = parse_duration(parts.next()?);
    let url = parts.next()?.trim();
    let title = parts.next().unwrap_or_default().trim();

    if url.is_empty() || url == "NA" {
        return None;
    }
    Some((duration, url, title))
}

fn parse_duration(raw: &str) -> u64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d.round() as u64)
        .unwrap_or(0)
}

fn parse_resolution(stdout: &str) -> Option<ResolvedSource> {
    stdout
        .lines()
        .find_map(split_line)
        .map(|(duration_secs, url, title)| ResolvedSource {
            title: title.to_string(),
            duration_secs,
            media_url: url.to_string(),
        })
}

fn parse_lookup(stdout: &str) -> Vec<LookupEntry> {
    stdout
        .lines()
        .filter_map(split_line)
        .map(|(duration_secs, url, title)| LookupEntry {
            title: if title.is_empty() { url.to_string() } else { title.to_string() },
            url: url.to_string(),
            duration_secs,
        })
        .collect()
}
