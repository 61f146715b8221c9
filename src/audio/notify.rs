use async_trait::async_trait;
use serenity::model::id::ChannelId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Canal de avisos hacia los usuarios. Todo es best-effort: los fallos se
/// registran y se tragan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, target: ChannelId, text: &str);

    /// Muestra opciones numeradas más una de cancelar y espera una elección.
    ///
    /// `None` si se cancela, vence el plazo o no se puede preguntar. Si
    /// `cancel` se dispara antes de la respuesta, el prompt se retira.
    async fn ask_choice(
        &self,
        target: ChannelId,
        prompt: &str,
        options: &[String],
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Option<usize>;
}
