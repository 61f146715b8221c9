use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, UserId};
use std::fmt;

use crate::sources::ResolvedSource;

/// Quién pidió un track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requester {
    User(UserId),
    /// Elegido por el flujo de recomendaciones.
    Recommendation,
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requester::User(id) => write!(f, "{}", id),
            Requester::Recommendation => f.write_str("recommendation"),
        }
    }
}

/// Unidad de audio en cola o sonando.
///
/// `source_ref` es fijo desde la creación; título y duración pueden
/// completarse cuando el resolver devuelve la metadata canónica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    source_ref: String,
    title: String,
    duration_secs: u64,
    requester: Requester,
    notify: Option<ChannelId>,
}

impl Track {
    pub fn new(source_ref: impl Into<String>, title: impl Into<String>, requester: Requester) -> Self {
        Self {
            source_ref: source_ref.into(),
            title: title.into(),
            duration_secs: 0,
            requester,
            notify: None,
        }
    }

    pub fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_notify(mut self, channel_id: ChannelId) -> Self {
        self.notify = Some(channel_id);
        self
    }

    // Getters
    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    /// 0 = desconocida
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
    pub fn requester(&self) -> Requester {
        self.requester
    }
    pub fn notify_target(&self) -> Option<ChannelId> {
        self.notify
    }

    pub fn is_recommendation(&self) -> bool {
        self.requester == Requester::Recommendation
    }

    /// Aplica la metadata canónica del resolver sin tocar `source_ref`.
    pub fn absorb(&mut self, resolved: &ResolvedSource) {
        if !resolved.title.trim().is_empty() {
            self.title = resolved.title.clone();
        }
        if resolved.duration_secs > 0 {
            self.duration_secs = resolved.duration_secs;
        }
    }
}
