use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Los cuatro primeros se recuperan localmente avanzando la cola; el resto
/// son errores de operación que el llamador reporta al usuario.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no se pudo resolver `{source_ref}`: {reason}")]
    Resolution { source_ref: String, reason: String },

    #[error("no se pudo iniciar el transcodificador: {0}")]
    Spawn(String),

    #[error("no se pudo conectar al canal de voz: {0}")]
    Connection(String),

    #[error("fallo en el pipeline de audio: {0}")]
    Pipeline(String),

    #[error("no hay conexión de voz activa")]
    NotConnected,

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("índice fuera de rango: {0}")]
    InvalidIndex(usize),
}

impl PlayerError {
    pub fn resolution(source_ref: &str, reason: impl ToString) -> Self {
        Self::Resolution {
            source_ref: source_ref.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Resultado de operaciones de control que pueden no aplicar en el estado actual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ControlOutcome {
    Applied,
    NotApplicable,
}

impl ControlOutcome {
    pub fn applied(self) -> bool {
        self == Self::Applied
    }
}
