//! # Sources Module
//!
//! Contracts for the external collaborators that turn user input into
//! something playable, plus their production implementations:
//!
//! - [`MetadataResolver`]: source reference → canonical title, duration and
//!   direct media URL. Implemented by [`YtDlpResolver`] and memoized by
//!   [`CachedResolver`].
//! - [`SearchProvider`]: free-text query → candidate list. Implemented by
//!   [`YouTubeApiClient`] and used only by the recommendation flow.

pub mod youtube_api;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::{audio::error::PlayerError, cache::TtlCache};

pub use youtube_api::YouTubeApiClient;
pub use ytdlp::YtDlpResolver;

/// Resultado de resolver una referencia de fuente
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub title: String,
    /// 0 = desconocida (streams en vivo)
    pub duration_secs: u64,
    pub media_url: String,
}

/// Candidato devuelto por un proveedor de búsqueda
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    pub title: String,
    pub url: String,
    pub channel: String,
}

/// Resuelve una referencia (URL o búsqueda) a una URL de medio directa
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, source_ref: &str) -> Result<ResolvedSource, PlayerError>;
}

/// Busca candidatos por texto libre
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Puede devolver una lista vacía
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>>;
}

/// Verifica si la entrada es una URL http(s)
pub fn is_url(input: &str) -> bool {
    url::Url::parse(input.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Memoiza `resolve()` durante un TTL.
///
/// Un reinicio por cambio de filtro vuelve a resolver el mismo track; con el
/// cache se evita lanzar yt-dlp otra vez.
pub struct CachedResolver {
    inner: Arc<dyn MetadataResolver>,
    cache: TtlCache<String, ResolvedSource>,
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn MetadataResolver>, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(capacity, ttl),
        }
    }
}

#[async_trait]
impl MetadataResolver for CachedResolver {
    async fn resolve(&self, source_ref: &str) -> Result<ResolvedSource, PlayerError> {
        let key = source_ref.to_string();
        if let Some(hit) = self.cache.get(&key) {
            debug!("💾 Cache hit para {}", source_ref);
            return Ok(hit);
        }

        let resolved = self.inner.resolve(source_ref).await?;
        self.cache.insert(key, resolved.clone());
        debug!("💾 Resolución guardada ({} en cache)", self.cache.len());
        Ok(resolved)
    }
}
