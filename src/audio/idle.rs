use std::{future::Future, time::Duration};
use tokio::task::JoinHandle;
use tracing::debug;

/// Temporizador de desconexión por inactividad.
///
/// Sólo el último `arm` está vivo: cada arm o cancel invalida la secuencia
/// anterior, así que un disparo que ya salió del sleep pero todavía espera
/// el lock de la sesión se reconoce como viejo con [`IdleTimer::is_current`].
#[derive(Debug, Default)]
pub struct IdleTimer {
    seq: u64,
    handle: Option<JoinHandle<()>>,
}

impl IdleTimer {
    pub fn arm<F, Fut>(&mut self, grace: Duration, fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let seq = self.seq;

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            fire(seq).await;
        }));

        debug!("⏲️ Temporizador de inactividad armado ({}s, #{})", grace.as_secs(), seq);
        seq
    }

    /// Devuelve true si había un temporizador armado
    pub fn cancel(&mut self) -> bool {
        self.seq += 1;
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Lo llama el propio disparo: suelta el handle sin abortarse a sí mismo
    pub fn disarm(&mut self) {
        self.seq += 1;
        self.handle = None;
    }

    pub fn is_current(&self, seq: u64) -> bool {
        self.handle.is_some() && self.seq == seq
    }
}
