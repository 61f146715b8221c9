use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use crate::audio::track::Requester;

/// Registro de una reproducción
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    pub source_ref: String,
    pub requester: Requester,
    pub played_at: DateTime<Utc>,
}

/// Destino del historial; la sesión no espera el resultado
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, guild_id: GuildId, entry: HistoryEntry) -> Result<()>;
}

/// Historial en archivos JSON, uno por guild
pub struct JsonHistory {
    dir: PathBuf,
    limit: usize,
    cache: Mutex<HashMap<GuildId, VecDeque<HistoryEntry>>>,
}

impl JsonHistory {
    pub async fn new(data_dir: PathBuf, limit: usize) -> Result<Self> {
        let dir = data_dir.join("history");
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("no se pudo crear {}", dir.display()))?;

        let storage = Self {
            dir,
            limit: limit.max(1),
            cache: Mutex::new(HashMap::new()),
        };
        storage.load_all().await?;

        info!("📁 Historial inicializado en: {}", storage.dir.display());
        Ok(storage)
    }

    /// Últimas `n` reproducciones, la más reciente primero
    pub async fn recent(&self, guild_id: GuildId, n: usize) -> Vec<HistoryEntry> {
        let cache = self.cache.lock().await;
        cache
            .get(&guild_id)
            .map(|entries| entries.iter().rev().take(n).cloned().collect())
            .unwrap_or_default()
    }

    async fn load_all(&self) -> Result<()> {
        let mut files = fs::read_dir(&self.dir).await?;
        let mut cache = self.cache.lock().await;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let Some(guild_id) = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
                .filter(|id| *id != 0)
            else {
                continue;
            };

            match Self::read_file(&path).await {
                Ok(entries) => {
                    cache.insert(GuildId::new(guild_id), entries);
                }
                Err(e) => warn!("Error cargando historial para guild {}: {:#}", guild_id, e),
            }
        }

        if !cache.is_empty() {
            info!("📂 Cargado el historial de {} servidores", cache.len());
        }
        Ok(())
    }

    async fn read_file(path: &Path) -> Result<VecDeque<HistoryEntry>> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    fn file_path(&self, guild_id: GuildId) -> PathBuf {
        self.dir.join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl HistoryStore for JsonHistory {
    async fn append(&self, guild_id: GuildId, entry: HistoryEntry) -> Result<()> {
        // el lock cubre la escritura para no intercalar archivos
        let mut cache = self.cache.lock().await;
        let entries = cache.entry(guild_id).or_default();

        entries.push_back(entry);
        while entries.len() > self.limit {
            entries.pop_front();
        }

        let content = serde_json::to_string_pretty(entries)?;
        let path = self.file_path(guild_id);
        fs::write(&path, content)
            .await
            .with_context(|| format!("no se pudo escribir {}", path.display()))?;

        debug!("💾 Historial actualizado para guild {} ({} entradas)", guild_id, entries.len());
        Ok(())
    }
}
