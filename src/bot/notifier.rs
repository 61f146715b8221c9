use async_trait::async_trait;
use serenity::{
    all::{
        ChannelId, ComponentInteractionDataKind, Context, CreateActionRow, CreateInteractionResponse,
        CreateInteractionResponseMessage, CreateMessage, CreateSelectMenu, CreateSelectMenuKind,
        CreateSelectMenuOption, EditMessage,
    },
};
use std::{sync::OnceLock, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::notify::Notifier;

const CHOICE_MENU_ID: &str = "recommendation_choice";
const CANCEL_VALUE: &str = "cancel";
/// Límite de Discord para etiquetas de opciones
const MAX_LABEL_CHARS: usize = 100;
const EXPIRED_TEXT: &str = "⌛ Se acabó el tiempo para elegir.";
const WITHDRAWN_TEXT: &str = "✋ Recomendación descartada: ya hay otra canción en camino.";

/// Avisos a canales de texto. Hasta que llega `ready` no hay contexto y los
/// avisos se descartan.
#[derive(Default)]
pub struct DiscordNotifier {
    ctx: OnceLock<Context>,
}

impl DiscordNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, ctx: Context) {
        if self.ctx.set(ctx).is_err() {
            debug!("Contexto del notificador ya asignado");
        }
    }

    fn context(&self) -> Option<&Context> {
        let ctx = self.ctx.get();
        if ctx.is_none() {
            warn!("⚠️ Aviso descartado: el bot todavía no está listo");
        }
        ctx
    }
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_CHARS {
        return label.to_string();
    }
    let mut short: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
    short.push('…');
    short
}

fn choice_menu(options: &[String]) -> CreateSelectMenu {
    let mut entries: Vec<CreateSelectMenuOption> = options
        .iter()
        .enumerate()
        .map(|(i, label)| CreateSelectMenuOption::new(truncate_label(&format!("{}. {}", i + 1, label)), i.to_string()))
        .collect();
    entries.push(CreateSelectMenuOption::new("❌ Cancelar", CANCEL_VALUE));

    CreateSelectMenu::new(CHOICE_MENU_ID, CreateSelectMenuKind::String { options: entries })
        .placeholder("Elige una canción")
}

/// Índice elegido; `None` para cancelar o valores desconocidos
fn parse_choice(value: &str, option_count: usize) -> Option<usize> {
    if value == CANCEL_VALUE {
        return None;
    }
    value.parse::<usize>().ok().filter(|i| *i < option_count)
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, target: ChannelId, text: &str) {
        let Some(ctx) = self.context() else {
            return;
        };
        if let Err(e) = target.say(&ctx.http, text).await {
            warn!("⚠️ No se pudo enviar mensaje a {}: {:?}", target, e);
        }
    }

    async fn ask_choice(
        &self,
        target: ChannelId,
        prompt: &str,
        options: &[String],
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Option<usize> {
        let ctx = self.context()?;

        let message = CreateMessage::new()
            .content(prompt)
            .components(vec![CreateActionRow::SelectMenu(choice_menu(options))]);
        let mut message = match target.send_message(&ctx.http, message).await {
            Ok(message) => message,
            Err(e) => {
                warn!("⚠️ No se pudo mostrar la recomendación en {}: {:?}", target, e);
                return None;
            }
        };

        let collector = async {
            message
                .await_component_interaction(&ctx.shard)
                .custom_ids(vec![CHOICE_MENU_ID.to_string()])
                .timeout(timeout)
                .await
        };

        let answered = tokio::select! {
            _ = cancel.cancelled() => Err(WITHDRAWN_TEXT),
            answered = collector => answered.ok_or(EXPIRED_TEXT),
        };

        let interaction = match answered {
            Ok(interaction) => interaction,
            Err(closing) => {
                debug!("Menú de recomendación cerrado en {}: {}", target, closing);
                let closed = EditMessage::new().content(closing).components(vec![]);
                if let Err(e) = message.edit(&ctx.http, closed).await {
                    debug!("No se pudo cerrar el menú: {:?}", e);
                }
                return None;
            }
        };

        let choice = match &interaction.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => {
                values.first().and_then(|v| parse_choice(v, options.len()))
            }
            _ => None,
        };

        let reply = match choice.and_then(|i| options.get(i)) {
            Some(label) => format!("✅ Elegiste: **{}**", label),
            None => "❌ Recomendación cancelada.".to_string(),
        };
        let response = CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .content(reply)
                .components(vec![]),
        );
        if let Err(e) = interaction.create_response(&ctx.http, response).await {
            debug!("No se pudo responder a la selección: {:?}", e);
        }

        choice
    }
}
