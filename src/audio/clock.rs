use std::time::Duration;
use tokio::time::Instant;

/// Reloj de reproducción que descuenta las pausas.
///
/// Es la única fuente del tiempo transcurrido: lo usan tanto el snapshot de
/// estado como el offset de reinicio al cambiar filtros.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackClock {
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    offset: Duration,
}

impl PlaybackClock {
    /// Arranca el reloj en `offset` segundos del track.
    pub fn start(&mut self, now: Instant, offset: Duration) {
        self.started_at = Some(now);
        self.paused_at = None;
        self.offset = offset;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Devuelve false si no hay reproducción o ya estaba pausado.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.started_at.is_none() || self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    /// Desplaza el inicio por la duración de la pausa.
    pub fn resume(&mut self, now: Instant) -> bool {
        match (self.started_at, self.paused_at.take()) {
            (Some(started), Some(paused)) => {
                self.started_at = Some(started + now.saturating_duration_since(paused));
                true
            }
            _ => false,
        }
    }

    /// Tiempo transcurrido; congelado en el instante de pausa si está pausado.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };
        let reference = self.paused_at.unwrap_or(now);
        self.offset + reference.saturating_duration_since(started)
    }

    /// Restante según la duración conocida del track (0 = desconocida).
    pub fn remaining(&self, now: Instant, duration_secs: u64) -> Option<Duration> {
        if duration_secs == 0 {
            return None;
        }
        Some(Duration::from_secs(duration_secs).saturating_sub(self.elapsed(now)))
    }
}

/// Formatea segundos como `m:ss` o `h:mm:ss`.
pub fn format_duration(total_secs: u64) -> String {
    if total_secs == 0 {
        return "00:00".to_string();
    }
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
