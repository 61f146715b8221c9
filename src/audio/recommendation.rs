use async_trait::async_trait;
use regex::Regex;
use std::{sync::{Arc, OnceLock}, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    notify::Notifier,
    track::{Requester, Track},
};
use crate::sources::{SearchCandidate, SearchProvider};

const SEPARATORS: [&str; 5] = [" - ", " – ", " — ", " | ", ":"];

/// Elige un track para continuar cuando la cola se vacía.
///
/// Devuelve `None` en cuanto `cancel` se dispara.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn suggest(&self, last: &Track, cancel: CancellationToken) -> Option<Track>;
}

/// Sujeto derivado de un título: artista (consulta) y canción si se pudo separar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub artist: String,
    pub song: Option<String>,
}

fn decorations() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").ok()).as_ref()
}

/// "Artista - Canción (Official Video)" → artista + canción
pub fn derive_subject(title: &str) -> Subject {
    let cleaned = match decorations() {
        Some(re) => re.replace_all(title, " ").into_owned(),
        None => title.to_string(),
    };
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    let split = SEPARATORS
        .iter()
        .filter_map(|sep| cleaned.find(sep).map(|at| (at, *sep)))
        .min_by_key(|(at, _)| *at);

    match split {
        Some((at, sep)) => {
            let artist = cleaned[..at].trim();
            let song = cleaned[at + sep.len()..].trim();
            if artist.is_empty() {
                Subject { artist: song.to_string(), song: None }
            } else {
                Subject {
                    artist: artist.to_string(),
                    song: (!song.is_empty()).then(|| song.to_string()),
                }
            }
        }
        None => Subject { artist: cleaned, song: None },
    }
}

/// Descarta candidatos que repiten lo que acaba de sonar y corta en `limit`
pub fn filter_candidates(
    candidates: Vec<SearchCandidate>,
    last_title: &str,
    subject: &Subject,
    limit: usize,
) -> Vec<SearchCandidate> {
    let last_title = last_title.to_lowercase();
    let song = subject.song.as_deref().map(str::to_lowercase);

    let overlaps = |a: &str, b: &str| !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a));

    candidates
        .into_iter()
        .filter(|c| {
            let title = c.title.to_lowercase();
            !overlaps(&title, &last_title) && !song.as_deref().is_some_and(|s| overlaps(&title, s))
        })
        .take(limit)
        .collect()
}

/// Flujo de recomendación: busca "<artista> mix" y deja elegir al usuario
pub struct RecommendationFlow {
    search: Arc<dyn SearchProvider>,
    notifier: Arc<dyn Notifier>,
    limit: usize,
    timeout: Duration,
}

impl RecommendationFlow {
    pub fn new(search: Arc<dyn SearchProvider>, notifier: Arc<dyn Notifier>, limit: usize, timeout: Duration) -> Self {
        Self {
            search,
            notifier,
            limit,
            timeout,
        }
    }
}

#[async_trait]
impl Recommender for RecommendationFlow {
    async fn suggest(&self, last: &Track, cancel: CancellationToken) -> Option<Track> {
        if last.is_recommendation() {
            debug!("🔁 {} ya era una recomendación, no se encadena otra", last.title());
            return None;
        }

        let target = last.notify_target()?;
        let subject = derive_subject(last.title());
        let query = format!("{} mix", subject.artist);

        let searched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("✋ Búsqueda de recomendaciones cancelada");
                return None;
            }
            searched = self.search.search(&query) => searched,
        };
        let candidates = match searched {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("⚠️ Búsqueda de recomendaciones falló: {:#}", e);
                return None;
            }
        };

        let survivors = filter_candidates(candidates, last.title(), &subject, self.limit);
        if survivors.is_empty() {
            debug!("🤷 Sin recomendaciones para {}", last.title());
            return None;
        }

        let options: Vec<String> = survivors
            .iter()
            .map(|c| format!("{} · {}", c.title, c.channel))
            .collect();
        let prompt = format!(
            "🎧 La cola terminó. ¿Seguimos con algo parecido a **{}**?",
            last.title()
        );

        let picked = self
            .notifier
            .ask_choice(target, &prompt, &options, self.timeout, cancel)
            .await?;
        let chosen = survivors.into_iter().nth(picked)?;

        info!("✨ Recomendación elegida: {}", chosen.title);
        Some(Track::new(chosen.url, chosen.title, Requester::Recommendation).with_notify(target))
    }
}
